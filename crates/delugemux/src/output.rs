use std::collections::BTreeSet;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use delugemux_frame::{Event, Value};
use serde::Serialize;

use crate::convert::value_to_json;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    event: &'a str,
    args: Vec<serde_json::Value>,
    timestamp: String,
}

/// Print the result of a call.
pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", value_to_json(value)),
        OutputFormat::Table => println!("{}", value_table(value)),
        OutputFormat::Pretty => {
            let rendered = serde_json::to_string_pretty(&value_to_json(value))
                .unwrap_or_else(|_| value.to_string());
            println!("{rendered}");
        }
        OutputFormat::Raw => match value {
            Value::Bytes(bytes) => print_raw(bytes),
            Value::Str(text) => print_raw(text.as_bytes()),
            other => println!("{other}"),
        },
    }
}

/// Print one pushed event.
pub fn print_event(event: &Event, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                event: &event.name,
                args: event.args.iter().map(value_to_json).collect(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "ARGS"])
                .add_row(vec![event.name.clone(), args_preview(&event.args)]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{} {}", event.name, args_preview(&event.args));
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Lay a value out as a table.
///
/// Dicts become key/value rows and lists of dicts become one row per item
/// with a column per key; anything else is a single cell.
pub fn value_table(value: &Value) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    match value {
        Value::Dict(map) => {
            table.set_header(vec!["KEY", "VALUE"]);
            for (key, item) in map {
                table.add_row(vec![key.clone(), cell(item)]);
            }
        }
        Value::List(items) if !items.is_empty() && items.iter().all(|i| i.as_dict().is_some()) => {
            let columns: BTreeSet<&str> = items
                .iter()
                .filter_map(Value::as_dict)
                .flat_map(|map| map.keys().map(String::as_str))
                .collect();
            table.set_header(columns.iter().map(|c| c.to_uppercase()).collect::<Vec<_>>());
            for map in items.iter().filter_map(Value::as_dict) {
                table.add_row(
                    columns
                        .iter()
                        .map(|c| map.get(*c).map(cell).unwrap_or_default())
                        .collect::<Vec<_>>(),
                );
            }
        }
        Value::List(items) => {
            table.set_header(vec!["#", "VALUE"]);
            for (index, item) in items.iter().enumerate() {
                table.add_row(vec![index.to_string(), cell(item)]);
            }
        }
        other => {
            table.set_header(vec!["VALUE"]);
            table.add_row(vec![cell(other)]);
        }
    }
    table
}

fn cell(value: &Value) -> String {
    match value {
        Value::Str(text) => text.clone(),
        Value::None => String::new(),
        other => value_to_json(other).to_string(),
    }
}

fn args_preview(args: &[Value]) -> String {
    args.iter().map(cell).collect::<Vec<_>>().join(", ")
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
