//! Rendering of reducer rows as a text table or JSON.

use crate::formatter::ReportRow;
use crate::trace::EventTrace;

use serde::Serialize;
use std::fmt::Write as _;

const FIXED_COLUMNS: [&str; 3] = ["subsequence", "# inputs", "MCS size"];

/// The full reducer output: one column per full-trace event after the
/// fixed columns, one row per considered subsequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub columns: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl Report {
    /// Empty report whose event columns follow `full_trace`.
    pub fn new(full_trace: &EventTrace) -> Self {
        let columns = FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(full_trace.labels().map(str::to_string))
            .collect();
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: ReportRow) {
        self.rows.push(row);
    }

    /// Cell text of every row, in column order.
    pub fn cells(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                [row.label.clone(), row.inputs.to_string(), row.mcs_size.to_string()]
                    .into_iter()
                    .chain(row.included.iter().map(|&i| u8::from(i).to_string()))
                    .collect()
            })
            .collect()
    }

    /// Left-aligned, space-padded table with a header line.
    pub fn render_table(&self) -> String {
        let cells = self.cells();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                cells
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(column.chars().count()))
                    .max()
                    .unwrap_or_default()
            })
            .collect();

        let mut out = String::new();
        write_line(&mut out, self.columns.iter(), &widths);
        for row in &cells {
            write_line(&mut out, row.iter(), &widths);
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn write_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a String>, widths: &[usize]) {
    let line = cells
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        let mut report = Report::new(&EventTrace::from_labels(["A", "B"]));
        report.push(ReportRow {
            label: "1".to_string(),
            inputs: 1,
            mcs_size: 1,
            included: vec![true, false],
        });
        report
    }

    #[test]
    fn test_columns_follow_full_trace() {
        assert_eq!(
            report().columns,
            vec!["subsequence", "# inputs", "MCS size", "A", "B"]
        );
    }

    #[test]
    fn test_table_rendering() {
        let table = report().render_table();
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "subsequence  # inputs  MCS size  A  B");
        assert_eq!(lines[1], "1            1         1         1  0");
    }

    #[test]
    fn test_table_pads_by_character_count() {
        let mut report = Report::new(&EventTrace::from_labels(["é1", "B"]));
        report.push(ReportRow {
            label: "1".to_string(),
            inputs: 2,
            mcs_size: 2,
            included: vec![true, true],
        });
        let table = report.render_table();
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "subsequence  # inputs  MCS size  é1  B");
        assert_eq!(lines[1], "1            2         2         1   1");
    }

    #[test]
    fn test_header_only_when_no_rows() {
        let report = Report::new(&EventTrace::from_labels(["A"]));
        assert_eq!(report.render_table().lines().count(), 1);
    }

    #[test]
    fn test_json_has_rows() {
        let json: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();
        assert_eq!(json["rows"][0]["mcs_size"], 1);
        assert_eq!(json["rows"][0]["included"][1], false);
    }
}
