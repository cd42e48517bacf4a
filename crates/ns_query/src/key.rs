use ns_core::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Canonical identity of a cached query: a resource name plus its
/// parameters, sorted by name, with absent parameters dropped and every
/// scalar rendered as text.
///
/// Two keys built from the same logical parameters compare equal no matter
/// in which order the parameters were supplied or whether a number arrived
/// as `3` or `"3"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    resource: String,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Builds a key from any serializable parameter record. The record must
    /// serialize to a JSON object (or `null` for "no parameters").
    pub fn from_params<P: Serialize + ?Sized>(resource: impl Into<String>, params: &P) -> Result<Self> {
        let mut key = Self::new(resource);
        match serde_json::to_value(params)? {
            Value::Null => {}
            Value::Object(map) => {
                for (name, value) in map {
                    if let Some(text) = canonical(value) {
                        key.params.insert(name, text);
                    }
                }
            }
            other => {
                return Err(Error::Cache(format!(
                    "query parameters for {} must be a record, got {}",
                    key.resource, other
                )))
            }
        }
        Ok(key)
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// True when `self` falls under `prefix`: same resource, and every
    /// parameter pinned by the prefix has the same value here.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.resource == prefix.resource
            && prefix
                .params
                .iter()
                .all(|(name, value)| self.params.get(name) == Some(value))
    }
}

fn canonical(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // serde_json maps are sorted, so nested records serialize canonically too
        nested => Some(nested.to_string()),
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, name, value)?;
        }
        Ok(())
    }
}
