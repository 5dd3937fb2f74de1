//! Declared pipeline options and their resolution.
//!
//! Every pipeline requires `projectName`; the rest are documented options
//! with defaults, either free strings or closed sets.

use pipewright_core::DefinitionError;
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
enum OptionKind {
    RequiredString,
    String { default: &'static str },
    OneOf { allowed: &'static [&'static str], default: &'static str },
    SubsetOf { allowed: &'static [&'static str], default: &'static [&'static str] },
}

#[derive(Debug, Clone)]
struct OptionSpec {
    key: &'static str,
    kind: OptionKind,
}

/// Input options of one pipeline.
#[derive(Debug, Clone)]
pub struct InputSpec {
    process: &'static str,
    options: Vec<OptionSpec>,
}

impl InputSpec {
    /// Options of `process`, starting with the required `projectName`.
    pub fn new(process: &'static str) -> Self {
        Self {
            process,
            options: vec![OptionSpec {
                key: "projectName",
                kind: OptionKind::RequiredString,
            }],
        }
    }

    fn with(mut self, key: &'static str, kind: OptionKind) -> Self {
        self.options.push(OptionSpec { key, kind });
        self
    }

    pub fn string(self, key: &'static str, default: &'static str) -> Self {
        self.with(key, OptionKind::String { default })
    }

    /// A single value out of `allowed`.
    pub fn one_of(self, key: &'static str, allowed: &'static [&'static str], default: &'static str) -> Self {
        self.with(key, OptionKind::OneOf { allowed, default })
    }

    /// A non-empty list of distinct values out of `allowed`.
    pub fn subset_of(
        self,
        key: &'static str,
        allowed: &'static [&'static str],
        default: &'static [&'static str],
    ) -> Self {
        self.with(key, OptionKind::SubsetOf { allowed, default })
    }

    /// Resolve `raw` into a complete input object.
    ///
    /// Unknown keys are passed through untouched.
    pub fn resolve(&self, raw: &Value) -> Result<Value, DefinitionError> {
        let mut resolved = match raw {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => return Err(self.error(format!("inputs must be an object, got {}", other))),
        };

        for option in &self.options {
            let value = self.resolve_option(option, resolved.get(option.key))?;
            resolved.insert(option.key.to_string(), value);
        }
        Ok(Value::Object(resolved))
    }

    fn resolve_option(&self, option: &OptionSpec, given: Option<&Value>) -> Result<Value, DefinitionError> {
        let key = option.key;
        let given = given.filter(|v| !v.is_null());

        match (&option.kind, given) {
            (OptionKind::RequiredString, Some(Value::String(s))) if !s.trim().is_empty() => {
                Ok(Value::String(s.clone()))
            }
            (OptionKind::RequiredString, _) => Err(self.error(format!("'{}' is required", key))),

            (OptionKind::String { default }, None) => Ok(Value::from(*default)),
            (OptionKind::String { .. }, Some(v @ Value::String(_))) => Ok(v.clone()),

            (OptionKind::OneOf { default, .. }, None) => Ok(Value::from(*default)),
            (OptionKind::OneOf { allowed, .. }, Some(Value::String(s))) => {
                if allowed.contains(&s.as_str()) {
                    Ok(Value::String(s.clone()))
                } else {
                    Err(self.error(format!(
                        "'{}' must be one of [{}], got '{}'",
                        key,
                        allowed.join(", "),
                        s
                    )))
                }
            }

            (OptionKind::SubsetOf { default, .. }, None) => {
                Ok(Value::from(default.iter().map(|s| s.to_string()).collect::<Vec<_>>()))
            }
            (OptionKind::SubsetOf { allowed, .. }, Some(value)) => self.resolve_subset(key, allowed, value),

            (_, Some(other)) => Err(self.error(format!("'{}' has the wrong type: {}", key, other))),
        }
    }

    fn resolve_subset(
        &self,
        key: &str,
        allowed: &[&str],
        value: &Value,
    ) -> Result<Value, DefinitionError> {
        // A comma separated string is accepted for command-line convenience.
        let items: Vec<String> = match value {
            Value::String(s) => s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect(),
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.error(format!("'{}' entries must be strings", key)))
                })
                .collect::<Result<_, _>>()?,
            other => return Err(self.error(format!("'{}' has the wrong type: {}", key, other))),
        };

        if items.is_empty() {
            return Err(self.error(format!("'{}' must not be empty", key)));
        }

        let mut seen: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            if !allowed.contains(&item.as_str()) {
                return Err(self.error(format!(
                    "'{}' entries must be in [{}], got '{}'",
                    key,
                    allowed.join(", "),
                    item
                )));
            }
            if !seen.contains(&item) {
                seen.push(item);
            }
        }
        Ok(Value::from(seen))
    }

    fn error(&self, message: String) -> DefinitionError {
        DefinitionError::new(self.process, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLATFORMS: &[&str] = &["linux-amd64", "darwin-arm64", "windows-amd64"];

    fn spec() -> InputSpec {
        InputSpec::new("demo")
            .string("outputDir", "dist")
            .one_of("language", &["go", "rust"], "go")
            .subset_of("platforms", PLATFORMS, &["linux-amd64"])
    }

    #[test]
    fn test_defaults_applied() {
        let resolved = spec().resolve(&json!({"projectName": "my-cli-tool"})).unwrap();
        assert_eq!(
            resolved,
            json!({
                "projectName": "my-cli-tool",
                "outputDir": "dist",
                "language": "go",
                "platforms": ["linux-amd64"]
            })
        );
    }

    #[test]
    fn test_project_name_required() {
        assert!(spec().resolve(&json!({})).is_err());
        assert!(spec().resolve(&json!({"projectName": "  "})).is_err());
    }

    #[test]
    fn test_closed_sets_enforced() {
        let err = spec()
            .resolve(&json!({"projectName": "x", "language": "cobol"}))
            .unwrap_err();
        assert!(err.message.contains("cobol"));

        assert!(spec()
            .resolve(&json!({"projectName": "x", "platforms": ["plan9-mips"]}))
            .is_err());
        assert!(spec().resolve(&json!({"projectName": "x", "platforms": []})).is_err());
    }

    #[test]
    fn test_subset_accepts_comma_string_and_dedupes() {
        let resolved = spec()
            .resolve(&json!({"projectName": "x", "platforms": "darwin-arm64, linux-amd64,darwin-arm64"}))
            .unwrap();
        assert_eq!(resolved["platforms"], json!(["darwin-arm64", "linux-amd64"]));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let resolved = spec().resolve(&json!({"projectName": "x", "extra": 1})).unwrap();
        assert_eq!(resolved["extra"], json!(1));
    }
}
