//! Machine-readable listings: the chosen fields of each item, one row per
//! item, or a JSON array of objects.

use clap::ValueEnum;
use csv::WriterBuilder;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Tsv,
    Json,
}

/// Renders `fields` of every item in `items`. Rows carry no header and the
/// output has no trailing newline.
pub fn format<T: Serialize>(
    items: &[T],
    fields: &[&str],
    format: &OutputFormat,
) -> anyhow::Result<String> {
    let rows = items
        .iter()
        .map(|item| select_fields(item, fields))
        .collect::<anyhow::Result<Vec<_>>>()?;

    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&rows)?),
        OutputFormat::Csv => write_delimited(&rows, fields, b','),
        OutputFormat::Tsv => write_delimited(&rows, fields, b'\t'),
    }
}

/// The named fields of `item`, in `fields` order. Fields the item lacks are
/// left out.
fn select_fields<T: Serialize>(item: &T, fields: &[&str]) -> anyhow::Result<Map<String, Value>> {
    let Value::Object(mut object) = serde_json::to_value(item)? else {
        anyhow::bail!("Only structs can be listed");
    };

    Ok(fields
        .iter()
        .filter_map(|field| object.remove(*field).map(|value| (field.to_string(), value)))
        .collect())
}

fn write_delimited(
    rows: &[Map<String, Value>],
    fields: &[&str],
    delimiter: u8,
) -> anyhow::Result<String> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(Vec::new());

    for row in rows {
        writer.write_record(fields.iter().map(|field| row.get(*field).map(cell).unwrap_or_default()))?;
    }

    let mut output = String::from_utf8(writer.into_inner()?)?;
    output.truncate(output.trim_end_matches('\n').len());

    Ok(output)
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Array(values) => values.iter().map(cell).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
