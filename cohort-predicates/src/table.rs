//! The predicate table handed to downstream windowing logic
//!
//! One row per distinct (subject_id, timestamp), one column per predicate.
//! Static rows are kept apart from the timestamped matrix.

use crate::types::{PredicateError, PredicateRow, Result, SubjectId};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::Write;

/// Final output of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateTable {
    /// Predicate column names (plain first, then derived)
    pub columns: Vec<String>,
    /// Timestamped rows, unique on (subject_id, timestamp)
    pub rows: Vec<PredicateRow>,
    /// At most one static row per subject (empty unless static handling is `separate`)
    pub static_rows: Vec<PredicateRow>,
}

/// Summary numbers for a predicate table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub subjects: usize,
    pub rows: usize,
    pub static_rows: usize,
    /// (column, number of timestamped rows where the column is > 0)
    pub nonzero_rows: Vec<(String, usize)>,
}

impl PredicateTable {
    /// Position of a column
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of a named column in a row
    pub fn value(&self, row: &PredicateRow, name: &str) -> Option<u64> {
        self.column(name).and_then(|idx| row.counts.get(idx).copied())
    }

    /// All timestamped rows of one subject
    pub fn subject_rows(&self, subject_id: SubjectId) -> impl Iterator<Item = &PredicateRow> {
        self.rows.iter().filter(move |r| r.subject_id == subject_id)
    }

    /// Keep only the timestamped rows where a predicate fired
    ///
    /// Used to select trigger rows for windowing. Static rows are kept as is.
    pub fn filter_by(&self, name: &str) -> Result<PredicateTable> {
        let idx = self
            .column(name)
            .ok_or_else(|| PredicateError::UnknownColumn(name.to_string()))?;

        let (kept, dropped) = self.partition_on(idx);

        if !dropped.is_empty() {
            log::info!(
                "{} subjects lost {} rows to trigger predicate '{}'",
                count_subjects(&dropped),
                dropped.len(),
                name
            );
        }

        Ok(PredicateTable {
            columns: self.columns.clone(),
            rows: kept,
            static_rows: self.static_rows.clone(),
        })
    }

    /// Split timestamped rows into (fired, not fired) for a column
    fn partition_on(&self, idx: usize) -> (Vec<PredicateRow>, Vec<PredicateRow>) {
        self.rows.iter().cloned().partition(|r| r.counts[idx] > 0)
    }

    /// Compute summary statistics
    pub fn stats(&self) -> TableStats {
        let subjects: HashSet<SubjectId> = self
            .rows
            .iter()
            .chain(&self.static_rows)
            .map(|r| r.subject_id)
            .collect();

        let nonzero_rows = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let n = self.rows.iter().filter(|r| r.counts[idx] > 0).count();
                (name.clone(), n)
            })
            .collect();

        TableStats {
            subjects: subjects.len(),
            rows: self.rows.len(),
            static_rows: self.static_rows.len(),
            nonzero_rows,
        }
    }

    /// Write static rows then timestamped rows as tab-separated values
    ///
    /// Static rows have an empty timestamp field.
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> Result<()> {
        write!(writer, "subject_id\ttimestamp")?;
        for column in &self.columns {
            write!(writer, "\t{}", column)?;
        }
        writeln!(writer)?;

        for row in self.static_rows.iter().chain(&self.rows) {
            let ts = row.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();
            write!(writer, "{}\t{}", row.subject_id, ts)?;
            for count in &row.counts {
                write!(writer, "\t{}", count)?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Write static rows then timestamped rows as a JSON array of objects
    pub fn write_json<W: Write>(&self, writer: &mut W) -> Result<()> {
        let records: Vec<Value> = self
            .static_rows
            .iter()
            .chain(&self.rows)
            .map(|row| self.row_to_json(row))
            .collect();
        serde_json::to_writer_pretty(&mut *writer, &records)?;
        writeln!(writer)?;
        Ok(())
    }

    fn row_to_json(&self, row: &PredicateRow) -> Value {
        let mut object = Map::new();
        object.insert("subject_id".to_string(), Value::from(row.subject_id));
        object.insert(
            "timestamp".to_string(),
            row.timestamp
                .map(|t| Value::String(t.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
        for (name, count) in self.columns.iter().zip(&row.counts) {
            object.insert(name.clone(), Value::from(*count));
        }
        Value::Object(object)
    }
}

/// Number of distinct subjects among the rows
fn count_subjects(rows: &[PredicateRow]) -> usize {
    rows.iter().map(|r| r.subject_id).collect::<HashSet<SubjectId>>().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn table() -> PredicateTable {
        let t = |h| Some(Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap());
        PredicateTable {
            columns: vec!["admission".to_string(), "discharge".to_string()],
            rows: vec![
                PredicateRow { subject_id: 1, timestamp: t(0), counts: vec![1, 0] },
                PredicateRow { subject_id: 1, timestamp: t(2), counts: vec![0, 1] },
                PredicateRow { subject_id: 2, timestamp: t(5), counts: vec![0, 0] },
            ],
            static_rows: vec![PredicateRow { subject_id: 1, timestamp: None, counts: vec![0, 0] }],
        }
    }

    #[test]
    fn test_column_lookup() {
        let table = table();
        assert_eq!(table.column("discharge"), Some(1));
        assert_eq!(table.column("death"), None);
        assert_eq!(table.value(&table.rows[1], "discharge"), Some(1));
        assert_eq!(table.subject_rows(1).count(), 2);
    }

    #[test]
    fn test_filter_by() {
        let table = table();
        let triggers = table.filter_by("admission").unwrap();
        assert_eq!(triggers.rows.len(), 1);
        assert_eq!(triggers.rows[0].subject_id, 1);
        assert_eq!(triggers.static_rows.len(), 1);

        assert!(matches!(
            table.filter_by("death"),
            Err(PredicateError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_filter_counts_every_subject_losing_rows() {
        let table = table();
        let (kept, dropped) = table.partition_on(0);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped.len(), 2);
        // Subject 1 keeps its admission row but still loses the 02:00 row
        assert_eq!(count_subjects(&dropped), 2);
        assert_eq!(count_subjects(&kept), 1);
    }

    #[test]
    fn test_stats() {
        let stats = table().stats();
        assert_eq!(stats.subjects, 2);
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.static_rows, 1);
        assert_eq!(
            stats.nonzero_rows,
            vec![("admission".to_string(), 1), ("discharge".to_string(), 1)]
        );
    }

    #[test]
    fn test_write_tsv() {
        let mut out = Vec::new();
        table().write_tsv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "subject_id\ttimestamp\tadmission\tdischarge");
        assert_eq!(lines[1], "1\t\t0\t0");
        assert_eq!(lines[2], "1\t2024-01-01T00:00:00+00:00\t1\t0");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_write_json() {
        let mut out = Vec::new();
        table().write_json(&mut out).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        let records = parsed.as_array().unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["timestamp"], Value::Null);
        assert_eq!(records[2]["discharge"], Value::from(1));
    }
}
