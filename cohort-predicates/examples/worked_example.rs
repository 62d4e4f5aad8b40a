//! Predicate extraction on a small in-memory event log
//!
//! Builds the predicate table for two subjects, prints per-predicate counts
//! and the table itself as TSV.
//!
//! Usage:
//!   cargo run --example worked_example [separate|drop|broadcast]

use chrono::{TimeZone, Utc};
use cohort_predicates::{
    Event, EventLog, PlainPredicateSpec, PredicateEngine, PredicatesConfig, StaticHandling,
    Timestamp,
};
use std::env;

fn at(hour: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let static_handling = match env::args().nth(1).as_deref() {
        Some("drop") => StaticHandling::Drop,
        Some("broadcast") => StaticHandling::Broadcast,
        _ => StaticHandling::Separate,
    };

    let events = vec![
        Event::static_fact(1, "SEX//male"),
        Event::new(1, at(0), "ADMISSION"),
        Event::new(1, at(1), "LAB//HR").with_value(90.0),
        Event::new(1, at(1), "PROCEDURE_START"),
        Event::new(1, at(2), "DISCHARGE"),
        Event::new(1, at(2), "PROCEDURE_END"),
        Event::static_fact(2, "SEX//female"),
        Event::new(2, at(3), "ADMISSION"),
        Event::new(2, at(4), "LAB//HR").with_value(130.0),
        Event::new(2, at(8), "DEATH"),
    ];

    let config = PredicatesConfig::new()
        .add_plain(PlainPredicateSpec::new("admission", "ADMISSION"))
        .add_plain(PlainPredicateSpec::new("discharge", "DISCHARGE"))
        .add_plain(PlainPredicateSpec::new("death", "DEATH"))
        .add_plain(PlainPredicateSpec::regex("lab", "^LAB//"))
        .add_plain(PlainPredicateSpec::new("tachycardia", "LAB//HR").with_value_min(100.0, false))
        .add_plain(PlainPredicateSpec::new("procedure_start", "PROCEDURE_START"))
        .add_plain(PlainPredicateSpec::new("male", "SEX//male").as_static())
        .add_derived("discharge_or_death", "or(discharge, death)")
        .add_derived("male_admission", "and(male, admission)")
        .with_static_handling(static_handling);

    let engine = PredicateEngine::new(&config)?;
    let log = EventLog::from_events(events)?;
    let table = engine.extract(&log)?;

    let stats = table.stats();
    println!("=== PREDICATE SUMMARY ({:?}) ===", static_handling);
    println!("Subjects: {}", stats.subjects);
    println!("Rows: {}", stats.rows);
    println!("Static rows: {}", stats.static_rows);
    for (name, count) in &stats.nonzero_rows {
        println!("  {:<20} {}", name, count);
    }

    println!("\n=== TABLE ===");
    table.write_tsv(&mut std::io::stdout())?;

    Ok(())
}
