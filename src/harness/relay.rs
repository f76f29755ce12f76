//! Verbatim relaying of child output.

use std::io::Write;

use super::error::HarnessError;
use super::stream::{Deadline, LineStream};

/// Copy every line of `stream` to `sink` until end-of-stream; returns the number of lines.
///
/// Lines are written unchanged and the sink is flushed after each one so the operator sees client output as it
/// is produced.
pub async fn relay<W: Write>(role: &str, stream: &mut LineStream, sink: &mut W, deadline: Deadline) -> Result<usize, HarnessError> {
    let mut count = 0;
    while let Some(line) = stream
        .next_line(deadline)
        .await
        .map_err(|e| e.into_harness(role, "end of output"))?
    {
        sink.write_all(line.as_bytes())?;
        sink.flush()?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_relay_copies_lines_verbatim() {
        let mut stream = LineStream::from_reader(Cursor::new("first line\n  second\tline\n"));
        let mut sink = Vec::new();
        let count = relay("client", &mut stream, &mut sink, Deadline::none()).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(sink).unwrap(), "first line\n  second\tline\n");
    }

    #[tokio::test]
    async fn test_relay_of_empty_stream_writes_nothing() {
        let mut stream = LineStream::from_reader(Cursor::new(""));
        let mut sink = Vec::new();
        assert_eq!(relay("client", &mut stream, &mut sink, Deadline::none()).await.unwrap(), 0);
        assert!(sink.is_empty());
    }
}
