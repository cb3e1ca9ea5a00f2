//! Typed access to tool-use input.

use crate::error::OrbitError;

/// Wrapper around a tool-use input providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, OrbitError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| OrbitError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, OrbitError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| OrbitError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, OrbitError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| OrbitError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the entire input into a typed struct.
    ///
    /// A string input is parsed as JSON first; models occasionally send the
    /// arguments object encoded as a string.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, OrbitError> {
        let value = match &self.value {
            serde_json::Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(trimmed)?
                }
            }
            serde_json::Value::Null => serde_json::json!({}),
            other => other.clone(),
        };
        Ok(serde_json::from_value(value)?)
    }
}
