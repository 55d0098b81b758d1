//! Block scripts: ordered RPC calls replayed against a node
//!
//! A script is a JSON array of steps:
//!
//! ```json
//! [
//!   {"method": "createvault", "params": ["$owner", "LOAN150"], "bind": "vault"},
//!   {"method": "deposittovault", "params": ["$vault", "$owner", "100@DFI"]},
//!   {"method": "generate", "params": [6]}
//! ]
//! ```
//!
//! A string parameter of the form `$name` is replaced by the result bound
//! under `name` earlier in the script; `$owner` is the keeper's wallet
//! address.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    /// Store the result under this name
    #[serde(default)]
    pub bind: Option<String>,
    /// The step is expected to be rejected
    #[serde(default)]
    pub expect_error: bool,
}

impl Step {
    /// Whether the step moves the chain and warrants a health refresh
    pub fn changes_height(&self) -> bool {
        matches!(self.method.as_str(), "generate" | "invalidateblock")
    }
}

pub fn parse(text: &str) -> Result<Vec<Step>> {
    serde_json::from_str(text).context("Failed to parse block script")
}

pub fn load(path: &str) -> Result<Vec<Step>> {
    let text = std::fs::read_to_string(path)
        .context(format!("Failed to read block script: {}", path))?;
    parse(&text)
}

/// Results bound by earlier steps
#[derive(Debug, Default)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Bindings {
    pub fn bind(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Substitute `$name` references anywhere inside `value`
    pub fn resolve(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => match s.strip_prefix('$') {
                Some(name) => match self.values.get(name) {
                    Some(bound) => bound.clone(),
                    None => bail!("Unbound script variable ${}", name),
                },
                None => value.clone(),
            },
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.resolve(v))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    let key = match k.strip_prefix('$').and_then(|name| self.values.get(name)) {
                        Some(Value::String(bound)) => bound.clone(),
                        _ => k.clone(),
                    };
                    out.insert(key, self.resolve(v)?);
                }
                Value::Object(out)
            }
            other => other.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_defaults() {
        let steps = parse(r#"[{"method": "generate"}, {"method": "getvault", "params": ["$v"], "bind": "view"}]"#)
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps[0].params.is_empty());
        assert!(steps[0].changes_height());
        assert_eq!(steps[1].bind.as_deref(), Some("view"));
        assert!(!steps[1].expect_error);
    }

    #[test]
    fn test_resolve_nested() {
        let mut b = Bindings::default();
        b.bind("owner", json!("df1qowner"));
        b.bind("vault", json!("ab"));
        let resolved = b
            .resolve(&json!([{"vaultId": "$vault", "$owner": "1@DFI", "n": 3}, "$owner", "plain"]))
            .unwrap();
        assert_eq!(
            resolved,
            json!([{"vaultId": "ab", "df1qowner": "1@DFI", "n": 3}, "df1qowner", "plain"])
        );
        assert!(b.resolve(&json!("$missing")).is_err());
    }
}
