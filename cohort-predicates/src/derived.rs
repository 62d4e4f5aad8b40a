//! Derived predicate resolution
//!
//! Derived predicates are and/or expressions over plain predicates and over
//! other derived predicates. The resolver orders them so every dependency is
//! computed before its dependents, then appends one 0/1 column per derived
//! predicate to each row.

use crate::config::DerivedPredicateSpec;
use crate::expr::{BoundExpr, PredicateExpr};
use crate::types::{PredicateError, PredicateRow, Result};
use std::collections::{HashMap, HashSet, VecDeque};

/// A derived predicate with its expression parsed
#[derive(Debug, Clone)]
pub struct ParsedDerived {
    pub name: String,
    pub expr: PredicateExpr,
}

/// Parse every derived expression, failing on the first malformed one
pub fn parse_derived(specs: &[DerivedPredicateSpec]) -> Result<Vec<ParsedDerived>> {
    specs
        .iter()
        .map(|spec| {
            PredicateExpr::parse(&spec.expr)
                .map(|expr| ParsedDerived {
                    name: spec.name.clone(),
                    expr,
                })
                .map_err(|message| PredicateError::ExpressionParse {
                    name: spec.name.clone(),
                    message,
                })
        })
        .collect()
}

/// Appends derived predicate columns to predicate rows
#[derive(Debug, Clone)]
pub struct DerivedResolver {
    names: Vec<String>,
    /// Column offset of the first derived column
    base: usize,
    /// (derived index, bound expression) in dependency order
    order: Vec<(usize, BoundExpr)>,
}

impl DerivedResolver {
    /// Validate and bind derived predicates against the plain columns
    ///
    /// Checks run in this order: duplicate names, cycles between derived
    /// predicates, then unknown references.
    pub fn new(derived: Vec<ParsedDerived>, plain_columns: &[String]) -> Result<Self> {
        let mut columns: HashMap<String, usize> = plain_columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        let base = plain_columns.len();
        for (idx, d) in derived.iter().enumerate() {
            if columns.insert(d.name.clone(), base + idx).is_some() {
                return Err(PredicateError::DuplicatePredicate(d.name.clone()));
            }
        }

        let sorted = topological_sort(&derived)?;

        let mut order = Vec::with_capacity(sorted.len());
        for idx in sorted {
            let d = &derived[idx];
            let bound = d
                .expr
                .bind(&columns)
                .map_err(|reference| PredicateError::UnknownPredicate {
                    predicate: d.name.clone(),
                    reference,
                })?;
            log::debug!("Derived predicate '{}' = {}", d.name, d.expr);
            order.push((idx, bound));
        }

        Ok(Self {
            names: derived.into_iter().map(|d| d.name).collect(),
            base,
            order,
        })
    }

    /// Derived column names, in column order
    pub fn columns(&self) -> &[String] {
        &self.names
    }

    /// Names in the order they are evaluated
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|(idx, _)| self.names[*idx].as_str())
            .collect()
    }

    /// Append derived columns to one row
    pub fn resolve_row(&self, row: &mut PredicateRow) {
        debug_assert_eq!(row.counts.len(), self.base);
        row.counts.resize(self.base + self.names.len(), 0);
        for (idx, expr) in &self.order {
            let value = expr.evaluate(&row.counts);
            row.counts[self.base + idx] = value;
        }
    }

    /// Append derived columns to every row
    pub fn resolve(&self, rows: &mut [PredicateRow]) {
        for row in rows {
            self.resolve_row(row);
        }
    }
}

/// Order derived predicates so dependencies come first (Kahn's algorithm)
///
/// Only edges between derived predicates matter here; references to plain
/// or unknown names are leaves. Returns indices into `derived`.
fn topological_sort(derived: &[ParsedDerived]) -> Result<Vec<usize>> {
    let index: HashMap<&str, usize> = derived
        .iter()
        .enumerate()
        .map(|(idx, d)| (d.name.as_str(), idx))
        .collect();

    let mut in_degree = vec![0usize; derived.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); derived.len()];

    for (idx, d) in derived.iter().enumerate() {
        let deps: HashSet<usize> = d
            .expr
            .references()
            .into_iter()
            .filter_map(|name| index.get(name).copied())
            .collect();
        for dep in deps {
            dependents[dep].push(idx);
            in_degree[idx] += 1;
        }
    }

    // Seed in declaration order so the result is deterministic
    let mut queue: VecDeque<usize> = (0..derived.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(derived.len());

    while let Some(node) = queue.pop_front() {
        sorted.push(node);
        for &next in &dependents[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if sorted.len() != derived.len() {
        // Nodes left with in-degree > 0 sit on a cycle or downstream of one;
        // only the former are reported
        let stuck: Vec<bool> = in_degree.iter().map(|&deg| deg > 0).collect();
        let mut cyclic: Vec<String> = (0..derived.len())
            .filter(|&idx| stuck[idx] && reaches_itself(idx, &dependents, &stuck))
            .map(|idx| derived[idx].name.clone())
            .collect();
        cyclic.sort();
        return Err(PredicateError::CyclicDependency(cyclic));
    }

    Ok(sorted)
}

/// Depth-first search from `start` along dependent edges within `stuck`
fn reaches_itself(start: usize, dependents: &[Vec<usize>], stuck: &[bool]) -> bool {
    let mut visited = vec![false; dependents.len()];
    let mut stack = vec![start];

    while let Some(node) = stack.pop() {
        for &next in &dependents[node] {
            if next == start {
                return true;
            }
            if stuck[next] && !visited[next] {
                visited[next] = true;
                stack.push(next);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(pairs: &[(&str, &str)]) -> Vec<ParsedDerived> {
        let specs: Vec<DerivedPredicateSpec> = pairs
            .iter()
            .map(|(name, expr)| DerivedPredicateSpec::new(*name, *expr))
            .collect();
        parse_derived(&specs).unwrap()
    }

    fn plain(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_or_is_presence() {
        let resolver = DerivedResolver::new(
            parsed(&[("discharge_or_death", "or(discharge, death)")]),
            &plain(&["discharge", "death"]),
        )
        .unwrap();

        for (a, b) in [(0, 0), (1, 0), (0, 1), (2, 3)] {
            let mut row = PredicateRow {
                subject_id: 1,
                timestamp: None,
                counts: vec![a, b],
            };
            resolver.resolve_row(&mut row);
            let expected = u64::from(a > 0 || b > 0);
            assert_eq!(row.counts, vec![a, b, expected]);
        }
    }

    #[test]
    fn test_dependency_order() {
        // Declared before its dependency
        let resolver = DerivedResolver::new(
            parsed(&[
                ("outer", "and(inner, c)"),
                ("inner", "or(a, b)"),
            ]),
            &plain(&["a", "b", "c"]),
        )
        .unwrap();

        assert_eq!(resolver.evaluation_order(), vec!["inner", "outer"]);
        assert_eq!(resolver.columns(), &["outer".to_string(), "inner".to_string()]);

        let mut row = PredicateRow {
            subject_id: 1,
            timestamp: None,
            counts: vec![0, 1, 1],
        };
        resolver.resolve_row(&mut row);
        assert_eq!(row.counts, vec![0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_cycle_detected_before_unknown_names() {
        let result = DerivedResolver::new(
            parsed(&[("x", "or(y, 1)"), ("y", "or(x, 1)")]),
            &plain(&["a"]),
        );
        match result {
            Err(PredicateError::CyclicDependency(names)) => assert_eq!(names, vec!["x", "y"]),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_error_names_only_cycle_members() {
        let result = DerivedResolver::new(
            parsed(&[
                ("x", "or(y, a)"),
                ("y", "or(x, a)"),
                ("z", "and(x, a)"),
                ("w", "or(z, a)"),
                ("ok", "or(a, a)"),
            ]),
            &plain(&["a"]),
        );
        match result {
            Err(PredicateError::CyclicDependency(names)) => assert_eq!(names, vec!["x", "y"]),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let result = DerivedResolver::new(
            parsed(&[("x", "or(x, a)"), ("y", "and(x, a)")]),
            &plain(&["a"]),
        );
        assert!(matches!(result, Err(PredicateError::CyclicDependency(names)) if names == vec!["x"]));
    }

    #[test]
    fn test_unknown_reference() {
        let result = DerivedResolver::new(
            parsed(&[("discharge_or_death", "or(discharge, death)")]),
            &plain(&["discharge"]),
        );
        match result {
            Err(PredicateError::UnknownPredicate { predicate, reference }) => {
                assert_eq!(predicate, "discharge_or_death");
                assert_eq!(reference, "death");
            }
            other => panic!("expected unknown predicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_with_plain() {
        let result = DerivedResolver::new(parsed(&[("a", "or(b, c)")]), &plain(&["a", "b", "c"]));
        assert!(matches!(result, Err(PredicateError::DuplicatePredicate(name)) if name == "a"));
    }

    #[test]
    fn test_parse_error_names_predicate() {
        let specs = vec![DerivedPredicateSpec::new("broken", "or(a,")];
        match parse_derived(&specs) {
            Err(PredicateError::ExpressionParse { name, .. }) => assert_eq!(name, "broken"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_deep_nesting_is_parse_error() {
        let expr = format!("{}a{}", "or(".repeat(10_000), ", b)".repeat(10_000));
        let specs = vec![DerivedPredicateSpec::new("deep", expr)];
        match parse_derived(&specs) {
            Err(PredicateError::ExpressionParse { name, message }) => {
                assert_eq!(name, "deep");
                assert!(message.contains("nested deeper"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
