//! Event store adapters
//!
//! An event source delivers the full event log in one go; the pipeline does
//! no I/O after that. Besides the events, the log reports an observed schema
//! (the set of codes seen) which configuration validation checks against.

use crate::types::{Event, PredicateError, Result, SubjectId};
use std::collections::BTreeSet;

pub mod jsonl;

pub use jsonl::{parse_timestamp, JsonLinesSource};

/// Common trait for all event sources
pub trait EventSource {
    /// Read every event from the source
    fn read_events(&mut self) -> Result<EventLog>;
}

/// What an event log contains, as far as validation cares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedSchema {
    /// Every distinct code seen in the log
    pub codes: BTreeSet<String>,
    /// Total number of events
    pub num_events: usize,
    /// Number of distinct subjects
    pub num_subjects: usize,
    /// Number of events without a timestamp
    pub num_static_events: usize,
}

/// A fully loaded event log, sorted by (subject_id, timestamp)
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    schema: ObservedSchema,
}

impl EventLog {
    /// Build a log from in-memory events
    ///
    /// Events are stably sorted by subject, then static first, then time.
    /// An empty event list is rejected.
    pub fn from_events(mut events: Vec<Event>) -> Result<Self> {
        if events.is_empty() {
            return Err(PredicateError::EmptyEventLog);
        }

        events.sort_by_key(|e| e.key());

        let mut schema = ObservedSchema {
            num_events: events.len(),
            ..ObservedSchema::default()
        };
        let mut last_subject: Option<SubjectId> = None;
        for event in &events {
            if !schema.codes.contains(&event.code) {
                schema.codes.insert(event.code.clone());
            }
            if event.is_static() {
                schema.num_static_events += 1;
            }
            if last_subject != Some(event.subject_id) {
                schema.num_subjects += 1;
                last_subject = Some(event.subject_id);
            }
        }

        log::debug!(
            "Event log: {} events, {} subjects, {} codes",
            schema.num_events,
            schema.num_subjects,
            schema.codes.len()
        );

        Ok(Self { events, schema })
    }

    /// All events, sorted
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The observed schema of this log
    pub fn schema(&self) -> &ObservedSchema {
        &self.schema
    }

    /// Split the log into one contiguous slice per subject
    pub fn by_subject(&self) -> Vec<(SubjectId, &[Event])> {
        let mut groups = Vec::with_capacity(self.schema.num_subjects);
        let mut start = 0;
        for i in 1..=self.events.len() {
            if i == self.events.len() || self.events[i].subject_id != self.events[start].subject_id {
                groups.push((self.events[start].subject_id, &self.events[start..i]));
                start = i;
            }
        }
        groups
    }
}
