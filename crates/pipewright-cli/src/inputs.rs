//! Pipeline inputs from the command line.

use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("expected key=value, got '{0}'")]
    Malformed(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} must contain a JSON object")]
    NotAnObject(String),
}

/// Parse one `key=value` pair.
///
/// The value is read as JSON when it parses (`true`, `3`, `["a","b"]`),
/// and as a plain string otherwise.
pub fn parse_pair(pair: &str) -> Result<(String, Value), InputError> {
    let (key, raw) = pair
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| InputError::Malformed(pair.to_string()))?;

    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_))) => value,
        _ => Value::String(raw.to_string()),
    };
    Ok((key.trim().to_string(), value))
}

/// Merge an optional inputs file with `key=value` pairs. Pairs win.
pub fn collect(file: Option<&Path>, pairs: &[String]) -> Result<Value, InputError> {
    let mut inputs = match file {
        Some(path) => read_file(path)?,
        None => Map::new(),
    };
    for pair in pairs {
        let (key, value) = parse_pair(pair)?;
        inputs.insert(key, value);
    }
    Ok(Value::Object(inputs))
}

fn read_file(path: &Path) -> Result<Map<String, Value>, InputError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: display.clone(),
        source,
    })?;
    match serde_json::from_str(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(InputError::NotAnObject(display)),
        Err(source) => Err(InputError::Json { path: display, source }),
    }
}
