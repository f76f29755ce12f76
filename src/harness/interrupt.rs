//! Operator interrupt.
//!
//! A Ctrl-C raises the interrupt; every blocked wait races [`Interrupt::triggered`] in a `tokio::select!` and
//! the perf iteration loop checks [`Interrupt::is_triggered`] before each case.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared, cloneable interrupt signal.
#[derive(Debug, Clone)]
pub struct Interrupt {
    raised: Arc<watch::Sender<bool>>,
}

impl Default for Interrupt {
    fn default() -> Self {
        let (raised, _) = watch::channel(false);
        Self {
            raised: Arc::new(raised),
        }
    }
}

impl Interrupt {
    /// A signal that is only raised by [`trigger`](Self::trigger).
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal raised by Ctrl-C.
    ///
    /// Installing a handler twice in one process fails; the error is logged and the returned signal then only
    /// responds to [`trigger`](Self::trigger).
    pub fn install_ctrlc() -> Self {
        let interrupt = Self::new();
        let handle = interrupt.clone();
        if let Err(e) = ctrlc::set_handler(move || handle.trigger()) {
            tracing::warn!("failed to install Ctrl-C handler: {}", e);
        }
        interrupt
    }

    pub fn trigger(&self) {
        self.raised.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.raised.borrow()
    }

    /// Resolves once the signal is raised, immediately if it already is.
    pub async fn triggered(&self) {
        let mut rx = self.raised.subscribe();
        if rx.wait_for(|raised| *raised).await.is_err() {
            // Only reachable once the sender is gone, and `self` holds it.
            std::future::pending::<()>().await;
        }
    }
}
