//! Human and machine renderings of [`AllResults`].

use crate::results::AllResults;
use crate::stats::Summary;

/// Output format for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderFormat {
    /// Aligned columns, one per host, cells `mean (best)`.
    #[default]
    Table,
    /// `test,host,mean,best,samples` rows.
    Csv,
}

pub fn render(results: &AllResults, format: RenderFormat) -> String {
    match format {
        RenderFormat::Table => render_table(results),
        RenderFormat::Csv => render_csv(results),
    }
}

fn format_value(value: f64) -> String {
    format!("{value:.3}")
}

fn table_cell(summary: Option<Summary>) -> String {
    match summary {
        Some(s) => format!("{} ({})", format_value(s.mean), format_value(s.best)),
        None => "-".to_string(),
    }
}

fn render_table(results: &AllResults) -> String {
    let hosts: Vec<&str> = results.hosts().collect();
    let tests = results.tests();

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(tests.len() + 1);
    let mut header = vec!["test".to_string()];
    header.extend(hosts.iter().map(|h| h.to_string()));
    rows.push(header);

    for test in &tests {
        let mut row = vec![test.to_string()];
        row.extend(hosts.iter().map(|host| table_cell(results.summary(test, host))));
        rows.push(row);
    }

    let columns = hosts.len() + 1;
    let widths: Vec<usize> = (0..columns)
        .map(|c| rows.iter().map(|r| r[c].chars().count()).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    for row in &rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn render_csv(results: &AllResults) -> String {
    let mut out = String::from("test,host,mean,best,samples\n");
    for test in results.tests() {
        for host in results.hosts() {
            if let Some(s) = results.summary(test, host) {
                out.push_str(&format!(
                    "{},{},{},{},{}\n",
                    csv_field(test),
                    csv_field(host),
                    format_value(s.mean),
                    format_value(s.best),
                    s.count
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AllResults {
        let mut all = AllResults::new();
        all.record("h1", "IceTests latency twoway", 10.0);
        all.record("h1", "IceTests latency twoway", 20.0);
        all.record("h2", "IceTests latency twoway", 12.5);
        all.record("h2", "IceTests latency oneway", 3.0);
        all
    }

    #[test]
    fn test_table_has_one_column_per_host() {
        let table = render(&sample(), RenderFormat::Table);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("test"));
        assert!(lines[0].contains("h1") && lines[0].contains("h2"));
        assert!(lines[1].starts_with("IceTests latency oneway"));
        assert!(lines[1].contains("  -  ") || lines[1].contains(" - "));
        assert!(lines[2].contains("15.000 (10.000)"));
        assert!(lines[2].ends_with("12.500 (12.500)"));
    }

    #[test]
    fn test_table_columns_are_aligned() {
        let table = render(&sample(), RenderFormat::Table);
        let lines: Vec<&str> = table.lines().collect();
        let h2_col = lines[0].find("h2").unwrap();
        assert_eq!(lines[2].find("12.500").unwrap(), h2_col);
    }

    #[test]
    fn test_csv_rows() {
        let csv = render(&sample(), RenderFormat::Csv);
        insta::assert_snapshot!(csv, @r"
        test,host,mean,best,samples
        IceTests latency oneway,h2,3.000,3.000,1
        IceTests latency twoway,h1,15.000,10.000,2
        IceTests latency twoway,h2,12.500,12.500,1
        ");
    }

    #[test]
    fn test_csv_quotes_fields_with_commas() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("plain"), "plain");
    }

    #[test]
    fn test_empty_results_render_header_only() {
        let all = AllResults::new();
        assert_eq!(render(&all, RenderFormat::Csv), "test,host,mean,best,samples\n");
        assert_eq!(render(&all, RenderFormat::Table), "test\n");
    }
}
