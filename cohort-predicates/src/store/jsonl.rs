//! JSON-lines event reader
//!
//! One JSON object per line:
//!
//! ```text
//! {"subject_id": 1, "timestamp": null, "code": "SEX//male", "numeric_value": null}
//! {"subject_id": 1, "timestamp": "2024-01-01T01:00:00Z", "code": "LAB//HR", "numeric_value": 90}
//! ```
//!
//! `value` is accepted as an alias of `numeric_value`. Blank lines are skipped.

use super::{EventLog, EventSource};
use crate::types::{Event, PredicateError, Result, SubjectId, Timestamp};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Naive formats tried after RFC 3339, read as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

#[derive(Debug, Deserialize)]
struct EventRecord {
    subject_id: SubjectId,
    #[serde(default)]
    timestamp: Option<String>,
    code: String,
    #[serde(default, alias = "value")]
    numeric_value: Option<f64>,
}

/// Parse a timestamp string in any supported format
pub fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Event source reading JSON lines from any buffered reader
pub struct JsonLinesSource<R: BufRead> {
    reader: R,
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a JSON-lines file
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Opening event log: {:?}", path);
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self { reader }
    }

    fn parse_line(line_no: usize, line: &str) -> Result<Event> {
        let record: EventRecord =
            serde_json::from_str(line).map_err(|e| PredicateError::EventLogParse {
                line: line_no,
                message: e.to_string(),
            })?;

        let timestamp = match record.timestamp.as_deref() {
            None => None,
            Some(text) if text.trim().is_empty() => None,
            Some(text) => Some(parse_timestamp(text).ok_or_else(|| PredicateError::EventLogParse {
                line: line_no,
                message: format!("unrecognized timestamp {:?}", text),
            })?),
        };

        Ok(Event {
            subject_id: record.subject_id,
            timestamp,
            code: record.code,
            value: record.numeric_value,
        })
    }
}

impl<R: BufRead> EventSource for JsonLinesSource<R> {
    fn read_events(&mut self) -> Result<EventLog> {
        let mut events = Vec::new();
        let mut line = String::new();
        let mut line_no = 0;

        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                break;
            }
            line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            events.push(Self::parse_line(line_no, trimmed)?);
        }

        log::info!("Read {} events from {} lines", events.len(), line_no);
        EventLog::from_events(events)
    }
}
