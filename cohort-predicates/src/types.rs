//! Core types for the cohort predicate engine
//!
//! This module defines the fundamental types that flow through the pipeline:
//! raw events read from an event log, the per-row predicate counts built from
//! them, and the error type shared by every stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Timestamp type used throughout the engine
pub type Timestamp = DateTime<Utc>;

/// Subject (patient) identifier
pub type SubjectId = i64;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, PredicateError>;

/// Name of the implicit plain predicate that matches every event
pub const ANY_EVENT: &str = "_ANY_EVENT";

/// Errors that can occur while validating a configuration or reading events
///
/// Every variant except the I/O and parse failures is raised by a validation
/// pass before any row is processed.
#[derive(Debug, thiserror::Error)]
pub enum PredicateError {
    #[error("Configuration error: plain predicate '{predicate}' matches no event in the data ({rule})")]
    Configuration { predicate: String, rule: String },

    #[error("Unknown predicate '{reference}' referenced by derived predicate '{predicate}'")]
    UnknownPredicate { predicate: String, reference: String },

    #[error("Cyclic dependency between derived predicates: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Failed to parse expression for '{name}': {message}")]
    ExpressionParse { name: String, message: String },

    #[error("Predicate '{0}' is declared as both plain and derived")]
    DuplicatePredicate(String),

    #[error("Invalid code regex for predicate '{predicate}': {source}")]
    InvalidRegex {
        predicate: String,
        #[source]
        source: regex::Error,
    },

    #[error("No predicate column named '{0}'")]
    UnknownColumn(String),

    #[error("Event log contains no events")]
    EmptyEventLog,

    #[error("Failed to parse event log at line {line}: {message}")]
    EventLogParse { line: usize, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A single raw event from the event log
///
/// Events with no timestamp are static facts about the subject (for example
/// sex or date of birth) and are never merged with timestamped rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Subject the event belongs to
    pub subject_id: SubjectId,
    /// Event time (None = static event)
    pub timestamp: Option<Timestamp>,
    /// Event code, e.g. "ADMISSION" or "LAB//HR"
    pub code: String,
    /// Optional numeric value attached to the event
    pub value: Option<f64>,
}

impl Event {
    /// Create a timestamped event without a value
    pub fn new(subject_id: SubjectId, timestamp: Timestamp, code: impl Into<String>) -> Self {
        Self {
            subject_id,
            timestamp: Some(timestamp),
            code: code.into(),
            value: None,
        }
    }

    /// Create a static (untimed) event
    pub fn static_fact(subject_id: SubjectId, code: impl Into<String>) -> Self {
        Self {
            subject_id,
            timestamp: None,
            code: code.into(),
            value: None,
        }
    }

    /// Builder method: attach a numeric value
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// True if this event has no timestamp
    pub fn is_static(&self) -> bool {
        self.timestamp.is_none()
    }

    /// Row key of this event
    pub fn key(&self) -> RowKey {
        RowKey::new(self.subject_id, self.timestamp)
    }
}

/// The (subject_id, timestamp) key a predicate row is unique on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub subject_id: SubjectId,
    pub timestamp: Option<Timestamp>,
}

impl RowKey {
    pub fn new(subject_id: SubjectId, timestamp: Option<Timestamp>) -> Self {
        Self {
            subject_id,
            timestamp,
        }
    }
}

// Subject first, then the static row, then ascending time. `Option`'s own
// ordering already puts `None` before any `Some`.
impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.subject_id
            .cmp(&other.subject_id)
            .then_with(|| self.timestamp.cmp(&other.timestamp))
    }
}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.timestamp {
            Some(ts) => write!(f, "({}, {})", self.subject_id, ts.to_rfc3339()),
            None => write!(f, "({}, static)", self.subject_id),
        }
    }
}

/// One row of the predicate matrix
///
/// `counts` is positionally aligned with the column list of the stage that
/// produced the row (plain predicates first, derived predicates appended).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateRow {
    pub subject_id: SubjectId,
    pub timestamp: Option<Timestamp>,
    pub counts: Vec<u64>,
}

impl PredicateRow {
    /// Create a row with all counts set to zero
    pub fn zeros(key: RowKey, width: usize) -> Self {
        Self {
            subject_id: key.subject_id,
            timestamp: key.timestamp,
            counts: vec![0; width],
        }
    }

    /// Row key of this row
    pub fn key(&self) -> RowKey {
        RowKey::new(self.subject_id, self.timestamp)
    }

    /// True if this row holds static facts
    pub fn is_static(&self) -> bool {
        self.timestamp.is_none()
    }

    /// Add another row's counts into this one (same width expected)
    pub fn absorb(&mut self, other: &PredicateRow) {
        debug_assert_eq!(self.counts.len(), other.counts.len());
        for (acc, count) in self.counts.iter_mut().zip(&other.counts) {
            *acc += count;
        }
    }
}
