//! Reading input tables and writing coded output.

use std::io::{Read, Write};
use std::str::FromStr;

use anyhow::Context;
use serde_json::Value;

use crate::coder::Coded;
use crate::table::{Cell, Table};

/// Output file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Comma-separated values with a header row.
    #[default]
    Csv,
    /// A JSON array of row objects.
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{other}' (expected csv or json)")),
        }
    }
}

/// Reads a CSV table with a header row. Empty fields become `Null`, all
/// other fields text.
///
/// # Errors
///
/// Fails on malformed CSV, ragged rows or duplicate headers.
pub fn read_csv(reader: impl Read) -> anyhow::Result<Table> {
    let mut csv = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = csv
        .headers()
        .context("reading CSV header")?
        .iter()
        .map(ToString::to_string)
        .collect();
    let mut table = Table::new(headers)?;

    for (i, record) in csv.records().enumerate() {
        let record = record.with_context(|| format!("reading CSV record {}", i + 1))?;
        let row = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    Cell::Null
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        table.push_row(row)?;
    }
    Ok(table)
}

/// Reads a JSON array of row objects.
///
/// # Errors
///
/// Fails when the document is not an array of objects.
pub fn read_json(reader: impl Read) -> anyhow::Result<Table> {
    let records: Vec<Value> = serde_json::from_reader(reader).context("parsing JSON input")?;
    Ok(Table::from_records(records)?)
}

/// Writes coded output.
///
/// CSV columns are the table columns, or for bare results the union of
/// result keys in first-seen order. Nested values are written as compact JSON.
///
/// # Errors
///
/// Fails on I/O or serialization errors.
pub fn write_coded(coded: &Coded, format: Format, writer: impl Write) -> anyhow::Result<()> {
    let records = coded.to_records();
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(writer, &records).context("writing JSON output")?;
        }
        Format::Csv => {
            let header: Vec<String> = match coded {
                Coded::Table(table) => table.columns().to_vec(),
                Coded::Results(_) => {
                    let mut keys: Vec<String> = Vec::new();
                    for key in records.iter().flat_map(|r| r.keys()) {
                        if !keys.contains(key) {
                            keys.push(key.clone());
                        }
                    }
                    keys
                }
            };
            let mut csv = csv::Writer::from_writer(writer);
            csv.write_record(&header).context("writing CSV header")?;
            for record in &records {
                let row = header
                    .iter()
                    .map(|key| record.get(key).map(csv_field).unwrap_or_default());
                csv.write_record(row).context("writing CSV record")?;
            }
            csv.flush().context("flushing CSV output")?;
        }
    }
    Ok(())
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
