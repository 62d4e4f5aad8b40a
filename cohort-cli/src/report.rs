//! Run summary and output writing

use crate::config::OutputFormat;
use anyhow::{Context, Result};
use cohort_predicates::{ObservedSchema, PredicateTable};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Print a short summary of the input and the extracted table to stderr
pub fn print_summary(schema: &ObservedSchema, table: &PredicateTable) {
    let stats = table.stats();

    eprintln!("═══════════════════════════════════════════════");
    eprintln!("  Cohort Predicates - Summary");
    eprintln!("═══════════════════════════════════════════════");
    eprintln!("  Events:       {}", schema.num_events);
    eprintln!("  Codes:        {}", schema.codes.len());
    eprintln!("  Subjects:     {}", stats.subjects);
    eprintln!("  Rows:         {}", stats.rows);
    eprintln!("  Static rows:  {}", stats.static_rows);

    if !stats.nonzero_rows.is_empty() {
        let width = stats
            .nonzero_rows
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0);

        eprintln!("\n  Rows where predicate is set:");
        for (name, count) in &stats.nonzero_rows {
            eprintln!("    {:<width$}  {}", name, count, width = width);
        }
    }
    eprintln!();
}

/// Write the table to a file, or stdout when no path is given
pub fn write_table(table: &PredicateTable, path: Option<&Path>, format: OutputFormat) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?;
            let mut writer = BufWriter::new(file);
            write_format(table, &mut writer, format)?;
            writer.flush()?;
            log::info!("Wrote {} rows to {:?}", table.rows.len() + table.static_rows.len(), path);
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            write_format(table, &mut writer, format)?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn write_format<W: Write>(table: &PredicateTable, writer: &mut W, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Tsv => table.write_tsv(writer)?,
        OutputFormat::Json => table.write_json(writer)?,
    }
    Ok(())
}
