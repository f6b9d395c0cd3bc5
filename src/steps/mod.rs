use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use jsonpath_rust::{JsonPath, JsonPathValue};
use serde_json::Value;
use std::{
    hash::{Hash, Hasher},
    str::FromStr,
};

pub mod db_writing_step;
pub mod processor_status_saver_step;
pub mod reduction_step;
pub mod remapper_step;
pub mod remappers;

/// Extracts a string, ensuring proper handling of missing values
pub fn extract_string(paths: &HashableJsonPaths, from: &Value) -> Option<String> {
    paths
        .extract_from(from)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
}

/// Extracts a numeric value. On-chain u64/u128 fields arrive as JSON strings,
/// so both string and number payloads are accepted.
pub fn extract_bigdecimal(paths: &HashableJsonPaths, from: &Value) -> Option<BigDecimal> {
    paths.extract_from(from).ok().and_then(|v| match v {
        Value::String(s) => BigDecimal::from_str(&s).ok(),
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        _ => None,
    })
}

/// A wrapper around multiple JSON paths, supporting fallbacks.
#[derive(Clone, Debug)]
pub struct HashableJsonPaths {
    json_paths: Vec<JsonPath>,
    /// The raw string representations of the JSON paths.
    raw: Vec<String>,
}

impl HashableJsonPaths {
    pub fn new(paths: Vec<String>) -> Result<Self> {
        let mut parsed_paths = Vec::new();
        for path in &paths {
            let json_path = JsonPath::from_str(path)
                .with_context(|| format!("Failed to parse JSON path: {}", path))?;

            parsed_paths.push(json_path);
        }
        Ok(Self {
            json_paths: parsed_paths,
            raw: paths,
        })
    }

    /// Extracts a value by trying multiple JSON paths in order.
    pub fn extract_from(&self, value: &Value) -> Result<Value> {
        for path in self.json_paths.iter() {
            let results = path.find_slice(value);
            for result in results {
                if let JsonPathValue::NoValue = result {
                    continue; // Skip NoValue
                }
                return Ok(result.clone().to_data());
            }
        }

        anyhow::bail!(
            "No valid JSON path found in paths: {:?} for value: {:?}",
            self.raw,
            value
        )
    }
}

impl Hash for HashableJsonPaths {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialEq for HashableJsonPaths {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for HashableJsonPaths {}
