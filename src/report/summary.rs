//! Summary table CSV output and input.
//!
//! The summary is comma separated with minimal quoting. Quoted cells use
//! `|`, so downstream readers must use the same quote character.

use crate::models::{SummaryPoint, SummaryTable};
use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const QUOTE: u8 = b'|';

/// Default summary path for a results directory: `<dir>_data.csv`, next to it.
pub fn summary_path(directory: &Path) -> Result<PathBuf> {
    let resolved;
    let dir = if directory.file_name().is_some() {
        directory
    } else {
        // "." or "..": name the table after the resolved directory.
        resolved = directory
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", directory.display()))?;
        resolved.as_path()
    };
    let name = dir
        .file_name()
        .with_context(|| format!("Cannot derive a table name from {}", dir.display()))?;

    let mut file_name = name.to_os_string();
    file_name.push("_data.csv");
    Ok(dir.with_file_name(file_name))
}

/// Write the table, header first.
pub fn write_summary<W: Write>(table: &SummaryTable, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b',')
        .quote(QUOTE)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(writer);

    wtr.write_record(table.schema.headers())?;
    for row in &table.rows {
        wtr.write_record(row.fields())?;
    }
    wtr.flush()?;

    Ok(())
}

/// Write the table to a file, replacing any previous table.
pub fn write_summary_file(table: &SummaryTable, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_summary(table, file)
        .with_context(|| format!("Failed to write summary to {}", path.display()))
}

/// Read the plot columns from a summary table. Other columns are ignored.
pub fn read_points<R: Read>(reader: R) -> Result<Vec<SummaryPoint>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b',')
        .quote(QUOTE)
        .from_reader(reader);

    rdr.deserialize()
        .collect::<Result<Vec<SummaryPoint>, csv::Error>>()
        .map_err(Into::into)
}

/// Read the plot columns from a summary table file.
pub fn read_points_file(path: &Path) -> Result<Vec<SummaryPoint>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open summary table {}", path.display()))?;
    read_points(file).with_context(|| format!("Failed to parse summary table {}", path.display()))
}
