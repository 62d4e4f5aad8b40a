//! Main engine API
//!
//! This module provides the primary interface of the library. The engine is
//! built from a [`PredicatesConfig`], which validates everything that does not
//! depend on the data, and then extracts a [`PredicateTable`] from an
//! [`EventLog`]:
//!
//! 1. Check that every plain predicate matches some event
//! 2. Evaluate plain predicates per event
//! 3. Collapse rows on (subject_id, timestamp)
//! 4. Apply static row handling
//! 5. Resolve derived predicates
//!
//! Steps 2-5 run per subject on the rayon thread pool and the per-subject
//! results are concatenated in subject order.

use crate::collapse::collapse;
use crate::config::{PlainPredicateSpec, PredicatesConfig, StaticHandling};
use crate::derived::{parse_derived, DerivedResolver};
use crate::evaluator::PredicateEvaluator;
use crate::store::EventLog;
use crate::table::PredicateTable;
use crate::types::{Event, PredicateRow, Result, SubjectId, ANY_EVENT};
use rayon::prelude::*;

/// The predicate engine - entry point for all extraction operations
#[derive(Debug, Clone)]
pub struct PredicateEngine {
    evaluator: PredicateEvaluator,
    resolver: DerivedResolver,
    static_handling: StaticHandling,
    static_columns: Vec<usize>,
    columns: Vec<String>,
}

/// Rows produced for one subject
struct SubjectRows {
    rows: Vec<PredicateRow>,
    static_row: Option<PredicateRow>,
}

impl PredicateEngine {
    /// Create an engine from a configuration
    ///
    /// Parses derived expressions and checks names, duplicates and cycles.
    /// Nothing here looks at event data.
    ///
    /// # Example
    /// ```
    /// use cohort_predicates::{PlainPredicateSpec, PredicateEngine, PredicatesConfig};
    ///
    /// let config = PredicatesConfig::new()
    ///     .add_plain(PlainPredicateSpec::new("discharge", "DISCHARGE"))
    ///     .add_plain(PlainPredicateSpec::new("death", "DEATH"))
    ///     .add_derived("discharge_or_death", "or(discharge, death)");
    ///
    /// let engine = PredicateEngine::new(&config).unwrap();
    /// assert_eq!(engine.columns().len(), 3);
    /// ```
    pub fn new(config: &PredicatesConfig) -> Result<Self> {
        log::info!(
            "Building predicate engine: {} plain, {} derived predicates",
            config.plain.len(),
            config.derived.len()
        );

        let derived = parse_derived(&config.derived)?;

        // `_ANY_EVENT` may be used in expressions without being declared
        let mut plain = config.plain.clone();
        let needs_any_event = derived
            .iter()
            .any(|d| d.expr.references().contains(ANY_EVENT));
        if needs_any_event && !config.has_plain(ANY_EVENT) {
            log::debug!("Adding implicit plain predicate {}", ANY_EVENT);
            plain.push(PlainPredicateSpec::new(ANY_EVENT, ANY_EVENT));
        }

        let evaluator = PredicateEvaluator::new(&plain)?;
        let plain_columns = evaluator.columns();
        let resolver = DerivedResolver::new(derived, &plain_columns)?;

        let mut columns = plain_columns;
        columns.extend(resolver.columns().iter().cloned());

        Ok(Self {
            static_columns: evaluator.static_columns(),
            evaluator,
            resolver,
            static_handling: config.static_handling,
            columns,
        })
    }

    /// All output columns (plain then derived)
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Run the full pipeline over an event log, in parallel across subjects
    pub fn extract(&self, event_log: &EventLog) -> Result<PredicateTable> {
        self.evaluator.validate(event_log.events())?;

        let subjects = event_log.by_subject();
        log::info!("Extracting predicates for {} subjects", subjects.len());

        let results: Vec<SubjectRows> = subjects
            .par_iter()
            .map(|(subject_id, events)| self.process_subject(*subject_id, events))
            .collect();

        Ok(self.assemble(results))
    }

    /// Same as [`extract`](Self::extract) on the calling thread only
    pub fn extract_serial(&self, event_log: &EventLog) -> Result<PredicateTable> {
        self.evaluator.validate(event_log.events())?;

        let results: Vec<SubjectRows> = event_log
            .by_subject()
            .iter()
            .map(|(subject_id, events)| self.process_subject(*subject_id, events))
            .collect();

        Ok(self.assemble(results))
    }

    fn process_subject(&self, subject_id: SubjectId, events: &[Event]) -> SubjectRows {
        let evaluated = self.evaluator.evaluate(events);
        let mut collapsed = collapse(evaluated);

        // Collapsed rows put the static row (if any) first
        let static_row = if collapsed.first().is_some_and(PredicateRow::is_static) {
            Some(collapsed.remove(0))
        } else {
            None
        };
        let mut rows = collapsed;

        log::trace!(
            "Subject {}: {} events -> {} rows (static: {})",
            subject_id,
            events.len(),
            rows.len(),
            static_row.is_some()
        );

        let mut static_row = match self.static_handling {
            StaticHandling::Separate => static_row,
            StaticHandling::Drop => None,
            StaticHandling::Broadcast => {
                if let Some(facts) = &static_row {
                    for row in &mut rows {
                        for &col in &self.static_columns {
                            row.counts[col] += facts.counts[col];
                        }
                    }
                }
                None
            }
        };

        self.resolver.resolve(&mut rows);
        if let Some(row) = static_row.as_mut() {
            self.resolver.resolve_row(row);
        }

        SubjectRows { rows, static_row }
    }

    fn assemble(&self, results: Vec<SubjectRows>) -> PredicateTable {
        let mut rows = Vec::with_capacity(results.iter().map(|r| r.rows.len()).sum());
        let mut static_rows = Vec::new();
        for result in results {
            rows.extend(result.rows);
            static_rows.extend(result.static_row);
        }

        log::info!(
            "Predicate table: {} rows, {} static rows, {} columns",
            rows.len(),
            static_rows.len(),
            self.columns.len()
        );

        PredicateTable {
            columns: self.columns.clone(),
            rows,
            static_rows,
        }
    }
}
