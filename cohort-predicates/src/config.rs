//! Predicate configuration types
//!
//! This module defines the configuration the engine consumes: plain predicates
//! (how an event is matched by code and value) and derived predicates (boolean
//! expressions over other predicates). Loading these from a file is the job of
//! the application layer.

use serde::{Deserialize, Serialize};

/// Configuration for the predicate engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredicatesConfig {
    /// Plain predicates, in column order
    #[serde(default)]
    pub plain: Vec<PlainPredicateSpec>,

    /// Derived predicates, in column order (evaluated in dependency order)
    #[serde(default)]
    pub derived: Vec<DerivedPredicateSpec>,

    /// What to do with static (untimed) rows
    #[serde(default)]
    pub static_handling: StaticHandling,
}

/// How an event code is matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeMatcher {
    /// Exact code, e.g. "ADMISSION"
    Exact(String),
    /// Regular expression searched in the code, e.g. "^LAB//"
    Regex { regex: String },
    /// Any of a list of exact codes
    Any { any: Vec<String> },
}

impl CodeMatcher {
    /// Human-readable description used in error messages
    pub fn describe(&self) -> String {
        match self {
            CodeMatcher::Exact(code) => format!("code == {:?}", code),
            CodeMatcher::Regex { regex } => format!("code =~ /{}/", regex),
            CodeMatcher::Any { any } => format!("code in {:?}", any),
        }
    }
}

/// A predicate read directly from event codes and values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainPredicateSpec {
    /// Predicate (column) name
    pub name: String,

    /// Which codes count toward this predicate
    pub code: CodeMatcher,

    /// Optional lower bound on the event value
    #[serde(default)]
    pub value_min: Option<f64>,

    /// Optional upper bound on the event value
    #[serde(default)]
    pub value_max: Option<f64>,

    /// Whether `value_min` itself matches (default: true)
    #[serde(default = "default_true")]
    pub value_min_inclusive: bool,

    /// Whether `value_max` itself matches (default: true)
    #[serde(default = "default_true")]
    pub value_max_inclusive: bool,

    /// True if this predicate describes static facts (broadcast to every
    /// timestamped row of the subject when static handling is `broadcast`)
    #[serde(default, rename = "static")]
    pub is_static: bool,
}

fn default_true() -> bool {
    true
}

impl PlainPredicateSpec {
    /// Create a plain predicate matching one exact code
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::with_matcher(name, CodeMatcher::Exact(code.into()))
    }

    /// Create a plain predicate matching codes against a regex
    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::with_matcher(
            name,
            CodeMatcher::Regex {
                regex: pattern.into(),
            },
        )
    }

    /// Create a plain predicate matching any of the given codes
    pub fn any_of<S: Into<String>>(name: impl Into<String>, codes: impl IntoIterator<Item = S>) -> Self {
        Self::with_matcher(
            name,
            CodeMatcher::Any {
                any: codes.into_iter().map(Into::into).collect(),
            },
        )
    }

    fn with_matcher(name: impl Into<String>, code: CodeMatcher) -> Self {
        Self {
            name: name.into(),
            code,
            value_min: None,
            value_max: None,
            value_min_inclusive: true,
            value_max_inclusive: true,
            is_static: false,
        }
    }

    /// Builder method: set the lower value bound
    pub fn with_value_min(mut self, min: f64, inclusive: bool) -> Self {
        self.value_min = Some(min);
        self.value_min_inclusive = inclusive;
        self
    }

    /// Builder method: set the upper value bound
    pub fn with_value_max(mut self, max: f64, inclusive: bool) -> Self {
        self.value_max = Some(max);
        self.value_max_inclusive = inclusive;
        self
    }

    /// Builder method: mark as a static predicate
    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Check a value against the configured bounds
    ///
    /// With no bounds every value (including none) passes. With any bound set,
    /// a missing value never passes.
    pub fn value_in_range(&self, value: Option<f64>) -> bool {
        if self.value_min.is_none() && self.value_max.is_none() {
            return true;
        }
        let Some(v) = value else {
            return false;
        };
        if let Some(min) = self.value_min {
            let ok = if self.value_min_inclusive { v >= min } else { v > min };
            if !ok {
                return false;
            }
        }
        if let Some(max) = self.value_max {
            let ok = if self.value_max_inclusive { v <= max } else { v < max };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Human readable code and value rule, e.g. `code == "LAB//HR", value >= 1000`
    pub fn describe_rule(&self) -> String {
        let mut rule = self.code.describe();
        if let Some(min) = self.value_min {
            let op = if self.value_min_inclusive { ">=" } else { ">" };
            rule.push_str(&format!(", value {} {}", op, min));
        }
        if let Some(max) = self.value_max {
            let op = if self.value_max_inclusive { "<=" } else { "<" };
            rule.push_str(&format!(", value {} {}", op, max));
        }
        rule
    }
}

/// A predicate computed from other predicates via and/or
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedPredicateSpec {
    /// Predicate (column) name
    pub name: String,
    /// Expression text, e.g. "or(discharge, death)"
    pub expr: String,
}

impl DerivedPredicateSpec {
    pub fn new(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
        }
    }
}

/// Handling of static (null-timestamp) rows in the final table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaticHandling {
    /// Keep static rows in a separate frame next to the timestamped rows
    #[default]
    Separate,
    /// Discard static rows
    Drop,
    /// Copy static predicate counts onto every timestamped row of the subject
    Broadcast,
}

impl PredicatesConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a plain predicate
    pub fn add_plain(mut self, spec: PlainPredicateSpec) -> Self {
        self.plain.push(spec);
        self
    }

    /// Builder method: add a derived predicate
    pub fn add_derived(mut self, name: impl Into<String>, expr: impl Into<String>) -> Self {
        self.derived.push(DerivedPredicateSpec::new(name, expr));
        self
    }

    /// Builder method: set static row handling
    pub fn with_static_handling(mut self, handling: StaticHandling) -> Self {
        self.static_handling = handling;
        self
    }

    /// Check whether a plain predicate with this name is declared
    pub fn has_plain(&self, name: &str) -> bool {
        self.plain.iter().any(|p| p.name == name)
    }

    /// Check whether a derived predicate with this name is declared
    pub fn has_derived(&self, name: &str) -> bool {
        self.derived.iter().any(|d| d.name == name)
    }
}
