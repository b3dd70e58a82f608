//! Mapping between JSON (command line, output) and rencode values.

use std::collections::BTreeMap;

use delugemux_frame::Value;
use serde_json::{Map, Number, Value as Json};

use crate::exit::{CliError, CliResult};

/// Parse one command-line argument as JSON. Bare words that are not valid
/// JSON are taken as strings so `call core.get_torrent_status abc` works.
pub fn parse_arg(input: &str) -> CliResult<Value> {
    match serde_json::from_str::<Json>(input) {
        Ok(json) => json_to_value(&json),
        Err(_) if looks_like_bare_word(input) => Ok(Value::Str(input.to_string())),
        Err(err) => Err(CliError::usage(format!(
            "argument {input:?} is not valid JSON: {err}"
        ))),
    }
}

/// Parse a JSON object into keyword arguments.
pub fn parse_kwargs(input: &str) -> CliResult<BTreeMap<String, Value>> {
    let json: Json = serde_json::from_str(input)
        .map_err(|err| CliError::usage(format!("--kwargs is not valid JSON: {err}")))?;
    match json_to_value(&json)? {
        Value::Dict(map) => Ok(map),
        other => Err(CliError::usage(format!(
            "--kwargs must be a JSON object, got {}",
            other.type_name()
        ))),
    }
}

pub fn json_to_value(json: &Json) -> CliResult<Value> {
    Ok(match json {
        Json::Null => Value::None,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if n.is_u64() {
                return Err(CliError::usage(format!("integer {n} is out of range")));
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::List(
            items
                .iter()
                .map(json_to_value)
                .collect::<CliResult<Vec<_>>>()?,
        ),
        Json::Object(map) => Value::Dict(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), json_to_value(v)?)))
                .collect::<CliResult<BTreeMap<_, _>>>()?,
        ),
    })
}

/// Render a value as JSON. Byte strings that are not UTF-8 become arrays of
/// byte values; non-finite floats become `null`.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::None => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Str(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Dict(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect::<Map<_, _>>(),
        ),
    }
}

fn looks_like_bare_word(input: &str) -> bool {
    !input.is_empty()
        && !input.starts_with(['{', '[', '"'])
        && !input.starts_with(|c: char| c.is_ascii_digit() || c == '-')
}
