//! Plain predicate evaluation
//!
//! Turns each raw event into a predicate row: one column per plain predicate,
//! 1 where the event matches the predicate's code and value rules, else 0.
//! Rows are not deduplicated here; see [`crate::collapse`].

use crate::config::{CodeMatcher, PlainPredicateSpec};
use crate::types::{Event, PredicateError, PredicateRow, Result, ANY_EVENT};
use regex::Regex;
use std::collections::HashSet;

/// Code matcher with regexes compiled and code lists hashed
#[derive(Debug, Clone)]
enum CompiledMatcher {
    AnyEvent,
    Exact(String),
    Regex(Regex),
    Any(HashSet<String>),
}

impl CompiledMatcher {
    fn compile(spec: &PlainPredicateSpec) -> Result<Self> {
        if spec.name == ANY_EVENT {
            return Ok(CompiledMatcher::AnyEvent);
        }
        Ok(match &spec.code {
            CodeMatcher::Exact(code) if code == ANY_EVENT => CompiledMatcher::AnyEvent,
            CodeMatcher::Exact(code) => CompiledMatcher::Exact(code.clone()),
            CodeMatcher::Regex { regex } => {
                let compiled = Regex::new(regex).map_err(|source| PredicateError::InvalidRegex {
                    predicate: spec.name.clone(),
                    source,
                })?;
                CompiledMatcher::Regex(compiled)
            }
            CodeMatcher::Any { any } => CompiledMatcher::Any(any.iter().cloned().collect()),
        })
    }

    fn matches_code(&self, code: &str) -> bool {
        match self {
            CompiledMatcher::AnyEvent => true,
            CompiledMatcher::Exact(expected) => expected == code,
            CompiledMatcher::Regex(regex) => regex.is_match(code),
            CompiledMatcher::Any(codes) => codes.contains(code),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledPredicate {
    spec: PlainPredicateSpec,
    matcher: CompiledMatcher,
}

impl CompiledPredicate {
    fn matches(&self, event: &Event) -> bool {
        self.matcher.matches_code(&event.code) && self.spec.value_in_range(event.value)
    }
}

/// Evaluates plain predicates against raw events
#[derive(Debug, Clone)]
pub struct PredicateEvaluator {
    predicates: Vec<CompiledPredicate>,
}

impl PredicateEvaluator {
    /// Compile plain predicate specs
    ///
    /// Fails on duplicate names and invalid regexes.
    pub fn new(specs: &[PlainPredicateSpec]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut predicates = Vec::with_capacity(specs.len());

        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(PredicateError::DuplicatePredicate(spec.name.clone()));
            }
            let matcher = CompiledMatcher::compile(spec)?;
            log::debug!("Compiled plain predicate '{}': {}", spec.name, spec.code.describe());
            predicates.push(CompiledPredicate {
                spec: spec.clone(),
                matcher,
            });
        }

        Ok(Self { predicates })
    }

    /// Column names, in evaluation order
    pub fn columns(&self) -> Vec<String> {
        self.predicates.iter().map(|p| p.spec.name.clone()).collect()
    }

    /// Number of plain predicate columns
    pub fn width(&self) -> usize {
        self.predicates.len()
    }

    /// Column indices of predicates flagged as static
    pub fn static_columns(&self) -> Vec<usize> {
        self.predicates
            .iter()
            .enumerate()
            .filter(|(_, p)| p.spec.is_static)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Check that every plain predicate matches at least one event
    ///
    /// Both the code rule and the value bounds have to hold for some event,
    /// otherwise the predicate is a configuration error. `_ANY_EVENT` is
    /// exempt. This is a separate pass over the log, run before any rows are
    /// built, and it stops as soon as every predicate has been seen.
    pub fn validate(&self, events: &[Event]) -> Result<()> {
        let mut found: Vec<bool> = self
            .predicates
            .iter()
            .map(|p| matches!(p.matcher, CompiledMatcher::AnyEvent))
            .collect();
        let mut missing = found.iter().filter(|seen| !**seen).count();

        for event in events {
            if missing == 0 {
                break;
            }
            for (seen, predicate) in found.iter_mut().zip(&self.predicates) {
                if !*seen && predicate.matches(event) {
                    *seen = true;
                    missing -= 1;
                }
            }
        }

        if let Some(idx) = found.iter().position(|seen| !seen) {
            let spec = &self.predicates[idx].spec;
            return Err(PredicateError::Configuration {
                predicate: spec.name.clone(),
                rule: spec.describe_rule(),
            });
        }

        log::debug!(
            "All {} plain predicates match at least one event",
            self.predicates.len()
        );
        Ok(())
    }

    /// Evaluate one event into an uncollapsed predicate row
    pub fn evaluate_event(&self, event: &Event) -> PredicateRow {
        let mut row = PredicateRow::zeros(event.key(), self.predicates.len());
        for (count, predicate) in row.counts.iter_mut().zip(&self.predicates) {
            if predicate.matches(event) {
                *count = 1;
            }
        }
        row
    }

    /// Evaluate every event, one row per event
    pub fn evaluate(&self, events: &[Event]) -> Vec<PredicateRow> {
        events.iter().map(|event| self.evaluate_event(event)).collect()
    }
}
