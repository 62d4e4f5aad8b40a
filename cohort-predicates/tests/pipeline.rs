// End-to-end tests of the predicate pipeline
use chrono::{TimeZone, Utc};
use cohort_predicates::collapse::{collapse, has_unique_keys, merge};
use cohort_predicates::evaluator::PredicateEvaluator;
use cohort_predicates::{
    Event, EventLog, EventSource, JsonLinesSource, PlainPredicateSpec, PredicateEngine,
    PredicateError, PredicatesConfig, PredicateRow, Timestamp,
};
use std::io::Write;

fn at(hour: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
}

/// Subject 1 is the worked example; subject 2 dies so `death` exists in the data
fn worked_events() -> Vec<Event> {
    vec![
        Event::static_fact(1, "SEX//male"),
        Event::new(1, at(0), "ADMISSION"),
        Event::new(1, at(1), "LAB//HR").with_value(90.0),
        Event::new(1, at(1), "PROCEDURE_START"),
        Event::new(1, at(2), "DISCHARGE"),
        Event::new(1, at(2), "PROCEDURE_END"),
        Event::static_fact(2, "SEX//female"),
        Event::new(2, at(5), "ADMISSION"),
        Event::new(2, at(9), "DEATH"),
    ]
}

fn worked_config() -> PredicatesConfig {
    PredicatesConfig::new()
        .add_plain(PlainPredicateSpec::new("admission", "ADMISSION"))
        .add_plain(PlainPredicateSpec::new("discharge", "DISCHARGE"))
        .add_plain(PlainPredicateSpec::new("death", "DEATH"))
        .add_plain(PlainPredicateSpec::regex("lab", "^LAB//"))
        .add_plain(PlainPredicateSpec::new("procedure_start", "PROCEDURE_START"))
        .add_derived("discharge_or_death", "or(discharge, death)")
}

#[test]
fn test_worked_example() {
    let engine = PredicateEngine::new(&worked_config()).unwrap();
    let log = EventLog::from_events(worked_events()).unwrap();
    let table = engine.extract(&log).unwrap();

    let subject1: Vec<&PredicateRow> = table.subject_rows(1).collect();
    assert_eq!(subject1.len(), 3);
    assert_eq!(
        subject1.iter().map(|r| r.timestamp).collect::<Vec<_>>(),
        vec![Some(at(0)), Some(at(1)), Some(at(2))]
    );

    let admission = subject1[0];
    assert_eq!(table.value(admission, "admission"), Some(1));
    assert_eq!(table.value(admission, "discharge_or_death"), Some(0));

    let procedure = subject1[1];
    assert_eq!(table.value(procedure, "lab"), Some(1));
    assert_eq!(table.value(procedure, "procedure_start"), Some(1));

    let discharge = subject1[2];
    assert_eq!(table.value(discharge, "discharge"), Some(1));
    assert_eq!(table.value(discharge, "death"), Some(0));
    assert_eq!(table.value(discharge, "discharge_or_death"), Some(1));

    // Static facts are folded into their own frame, one row per subject
    assert_eq!(table.static_rows.len(), 2);
    assert!(table.static_rows.iter().all(|r| r.counts.iter().all(|&c| c == 0)));

    assert!(has_unique_keys(&table.rows));
}

#[test]
fn test_unmatched_events_still_produce_rows() {
    let config = PredicatesConfig::new().add_plain(PlainPredicateSpec::new("admission", "ADMISSION"));
    let engine = PredicateEngine::new(&config).unwrap();
    let log = EventLog::from_events(vec![
        Event::new(1, at(0), "ADMISSION"),
        Event::new(1, at(4), "VITALS"),
    ])
    .unwrap();

    let table = engine.extract(&log).unwrap();
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1].counts, vec![0]);
}

#[test]
fn test_or_matches_presence_on_every_row() {
    let engine = PredicateEngine::new(&worked_config()).unwrap();
    let log = EventLog::from_events(worked_events()).unwrap();
    let table = engine.extract(&log).unwrap();

    for row in &table.rows {
        let discharge = table.value(row, "discharge").unwrap();
        let death = table.value(row, "death").unwrap();
        let expected = u64::from(discharge > 0 || death > 0);
        assert_eq!(table.value(row, "discharge_or_death"), Some(expected));
    }
}

#[test]
fn test_cyclic_config_fails_before_rows() {
    let config = PredicatesConfig::new()
        .add_plain(PlainPredicateSpec::new("admission", "ADMISSION"))
        .add_derived("x", "or(y, 1)")
        .add_derived("y", "or(x, 1)");

    match PredicateEngine::new(&config) {
        Err(PredicateError::CyclicDependency(names)) => assert_eq!(names, vec!["x", "y"]),
        other => panic!("expected cyclic dependency error, got {:?}", other),
    }
}

#[test]
fn test_unknown_predicate_fails_at_config_time() {
    let config = PredicatesConfig::new()
        .add_plain(PlainPredicateSpec::new("discharge", "DISCHARGE"))
        .add_derived("discharge_or_death", "or(discharge, death)");

    assert!(matches!(
        PredicateEngine::new(&config),
        Err(PredicateError::UnknownPredicate { .. })
    ));
}

#[test]
fn test_collapse_is_batch_independent() {
    let evaluator = PredicateEvaluator::new(&worked_config().plain).unwrap();
    let mut rows = evaluator.evaluate(&worked_events());
    // Duplicate some rows so collapsing has work to do
    rows.extend(evaluator.evaluate(&worked_events()[1..5]));

    let expected = collapse(rows.clone());
    assert!(has_unique_keys(&expected));

    // Deterministic pseudo-random batch assignment
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    for batch_count in 1..=5 {
        let mut batches: Vec<Vec<PredicateRow>> = vec![Vec::new(); batch_count];
        for row in &rows {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            batches[(seed % batch_count as u64) as usize].push(row.clone());
        }

        let partials: Vec<Vec<PredicateRow>> = batches.into_iter().map(collapse).collect();
        assert_eq!(merge(partials.clone()), expected);
        assert_eq!(merge(partials.into_iter().rev()), expected);
    }
}

#[test]
fn test_jsonl_file_end_to_end() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"subject_id": 1, "timestamp": null, "code": "SEX//male"}}"#).unwrap();
    writeln!(file, r#"{{"subject_id": 1, "timestamp": "2024-01-01T00:00:00Z", "code": "ADMISSION"}}"#).unwrap();
    writeln!(file, r#"{{"subject_id": 1, "timestamp": "2024-01-01T02:00:00Z", "code": "DISCHARGE"}}"#).unwrap();
    writeln!(file, r#"{{"subject_id": 1, "timestamp": "2024-01-01T02:00:00Z", "code": "DISCHARGE"}}"#).unwrap();
    file.flush().unwrap();

    let log = JsonLinesSource::open(file.path())
        .and_then(|mut source| source.read_events())
        .unwrap();

    let config = PredicatesConfig::new()
        .add_plain(PlainPredicateSpec::new("admission", "ADMISSION"))
        .add_plain(PlainPredicateSpec::new("discharge", "DISCHARGE"));
    let table = PredicateEngine::new(&config).unwrap().extract(&log).unwrap();

    assert_eq!(table.rows.len(), 2);
    // Two discharge events at the same instant sum to a count of 2
    assert_eq!(table.value(&table.rows[1], "discharge"), Some(2));

    let mut out = Vec::new();
    table.write_tsv(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("subject_id\ttimestamp\tadmission\tdischarge\n"));
    assert_eq!(text.lines().count(), 4);
}

#[test]
fn test_parallel_and_serial_agree() {
    let mut events = Vec::new();
    for subject in 0..50 {
        events.push(Event::static_fact(subject, "SEX//female"));
        for hour in 0..6 {
            events.push(Event::new(subject, at(hour), "ADMISSION"));
            if (subject + hour as i64) % 3 == 0 {
                events.push(Event::new(subject, at(hour), "DISCHARGE"));
            }
        }
        if subject % 7 == 0 {
            events.push(Event::new(subject, at(20), "DEATH"));
        }
    }
    let log = EventLog::from_events(events).unwrap();

    let config = PredicatesConfig::new()
        .add_plain(PlainPredicateSpec::new("admission", "ADMISSION"))
        .add_plain(PlainPredicateSpec::new("discharge", "DISCHARGE"))
        .add_plain(PlainPredicateSpec::new("death", "DEATH"))
        .add_derived("discharge_or_death", "or(discharge, death)");
    let engine = PredicateEngine::new(&config).unwrap();

    let parallel = engine.extract(&log).unwrap();
    let serial = engine.extract_serial(&log).unwrap();
    assert_eq!(parallel, serial);
    assert_eq!(parallel.static_rows.len(), 50);
    assert!(has_unique_keys(&parallel.rows));
}
