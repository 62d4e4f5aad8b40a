//! Cohort Predicates Library
//!
//! A stateless, reusable library that turns patient event logs into a
//! predicate matrix: one row per distinct (subject_id, timestamp), one column
//! per named predicate.
//!
//! # Architecture
//!
//! The pipeline is linear and fails fast:
//! - Plain predicates count events by code (exact, regex or list) and value range
//! - Rows are collapsed on (subject_id, timestamp) by summing counts
//! - Static (untimed) facts are kept apart, dropped, or broadcast onto timed rows
//! - Derived predicates (`and(...)` / `or(...)`) are resolved in dependency order
//!
//! Every configuration problem (unknown names, cycles, codes missing from the
//! data) is reported before any row is processed.
//!
//! The library does NOT:
//! - Build windows or query task trees over the predicate matrix
//! - Parse configuration files
//!
//! # Example Usage
//!
//! ```no_run
//! use cohort_predicates::{
//!     EventSource, JsonLinesSource, PlainPredicateSpec, PredicateEngine, PredicatesConfig,
//! };
//! use std::path::Path;
//!
//! let config = PredicatesConfig::new()
//!     .add_plain(PlainPredicateSpec::new("admission", "ADMISSION"))
//!     .add_plain(PlainPredicateSpec::new("discharge", "DISCHARGE"))
//!     .add_plain(PlainPredicateSpec::new("death", "DEATH"))
//!     .add_derived("discharge_or_death", "or(discharge, death)");
//!
//! let engine = PredicateEngine::new(&config).unwrap();
//! let events = JsonLinesSource::open(Path::new("events.jsonl"))
//!     .and_then(|mut source| source.read_events())
//!     .unwrap();
//!
//! let table = engine.extract(&events).unwrap();
//! table.write_tsv(&mut std::io::stdout()).unwrap();
//! ```

// Public modules
pub mod collapse;
pub mod config;
pub mod derived;
pub mod engine;
pub mod evaluator;
pub mod expr;
pub mod store;
pub mod table;
pub mod types;

// Re-export main types for convenience
pub use config::{
    CodeMatcher, DerivedPredicateSpec, PlainPredicateSpec, PredicatesConfig, StaticHandling,
};
pub use engine::PredicateEngine;
pub use expr::PredicateExpr;
pub use store::{EventLog, EventSource, JsonLinesSource, ObservedSchema};
pub use table::{PredicateTable, TableStats};
pub use types::{
    Event, PredicateError, PredicateRow, Result, RowKey, SubjectId, Timestamp, ANY_EVENT,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
