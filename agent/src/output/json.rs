//! JSON output
//!
//! Exports the profile report in JSON format for further analysis

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

use crate::report::ProfileReport;

/// Write the report as pretty-printed JSON
pub fn write_report(report: &ProfileReport, output_path: &Path) -> Result<()> {
    info!("Writing JSON report: {}", output_path.display());

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;

    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, report).context("Failed to serialize report to JSON")?;

    info!("JSON report written to {}", output_path.display());

    Ok(())
}

/// Load a report written by `write_report`
pub fn read_report(path: &Path) -> Result<ProfileReport> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open report: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse report: {}", path.display()))
}
