//! Operation parameters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    String,
}

/// Declared parameter of an operation.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

/// JSON object of parameters as received from the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationParams(Map<String, Value>);

impl OperationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Check against the declared parameters. Returns `(name, reason)` of
    /// the first problem.
    pub fn validate(&self, specs: &[ParamSpec]) -> Result<(), (String, String)> {
        for name in self.names() {
            if !specs.iter().any(|spec| spec.name == name) {
                return Err((name.to_string(), "unknown parameter".to_string()));
            }
        }
        for spec in specs {
            match (self.get(spec.name), spec.kind) {
                (None, _) if spec.required => {
                    return Err((spec.name.to_string(), "required".to_string()));
                }
                (None, _) => {}
                (Some(Value::Bool(_)), ParamKind::Bool) => {}
                (Some(Value::String(_)), ParamKind::String) => {}
                (Some(_), ParamKind::Bool) => {
                    return Err((spec.name.to_string(), "expected a boolean".to_string()));
                }
                (Some(_), ParamKind::String) => {
                    return Err((spec.name.to_string(), "expected a string".to_string()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[ParamSpec] = &[
        ParamSpec {
            name: "force",
            kind: ParamKind::Bool,
            required: false,
        },
        ParamSpec {
            name: "command",
            kind: ParamKind::String,
            required: true,
        },
    ];

    #[test]
    fn test_validate() {
        let ok = OperationParams::new().with("command", "list").with("force", true);
        assert!(ok.validate(SPECS).is_ok());

        let missing = OperationParams::new();
        assert_eq!(missing.validate(SPECS).unwrap_err().0, "command");

        let wrong_type = OperationParams::new().with("command", "list").with("force", "yes");
        assert_eq!(wrong_type.validate(SPECS).unwrap_err().1, "expected a boolean");

        let unknown = OperationParams::new().with("command", "list").with("extra", 1);
        assert_eq!(unknown.validate(SPECS).unwrap_err().0, "extra");
    }

    #[test]
    fn test_deserialize_from_object() {
        let params: OperationParams = serde_json::from_str(r#"{"force": true}"#).unwrap();
        assert_eq!(params.bool("force"), Some(true));
        assert_eq!(params.str("force"), None);
    }
}
