//! Cost-monitor thresholds supplied as JSON on the command line.
//!
//! The accepted document is an array of `[amount]` or `[amount, action]` entries,
//! where `amount` is a non-negative spend in the billing currency and `action` names
//! what the cost monitor should do once it is crossed.

use serde_json::{Value, json};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct CostThreshold {
    pub amount: f64,
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostThresholds {
    entries: Vec<CostThreshold>,
    /// The validated document, re-emitted as written.
    document: Value,
}

fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "array",
        "items": {
            "type": "array",
            "prefixItems": [
                {"type": "number", "minimum": 0},
                {"type": "string"}
            ],
            "items": false,
            "minItems": 1,
            "maxItems": 2
        }
    })
}

impl CostThresholds {
    pub fn parse(document: &str) -> Result<Self> {
        let invalid = |message: String| Error::InvalidCostThresholds { message };
        let value: Value = serde_json::from_str(document)
            .map_err(|err| invalid(format!("not valid JSON: {err}")))?;

        let validator = jsonschema::validator_for(&schema())
            .map_err(|err| invalid(format!("invalid schema: {err}")))?;
        let errors: Vec<String> = validator
            .iter_errors(&value)
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("  {path}: {e}")
            })
            .collect();
        if !errors.is_empty() {
            return Err(invalid(errors.join("\n")));
        }

        let entries = value
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_array)
            .map(|entry| CostThreshold {
                amount: entry.first().and_then(Value::as_f64).unwrap_or_default(),
                action: entry.get(1).and_then(Value::as_str).map(str::to_string),
            })
            .collect();
        Ok(Self {
            entries,
            document: value,
        })
    }

    pub fn entries(&self) -> &[CostThreshold] {
        &self.entries
    }

    /// Compact JSON handed to the cost monitor, numbers kept as the operator wrote them.
    pub fn to_json(&self) -> String {
        self.document.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_amounts_with_and_without_actions() {
        let thresholds = CostThresholds::parse(r#"[[100], [250.5, "shutdown"]]"#).unwrap();
        assert_eq!(
            thresholds.entries(),
            &[
                CostThreshold {
                    amount: 100.0,
                    action: None
                },
                CostThreshold {
                    amount: 250.5,
                    action: Some("shutdown".to_string())
                },
            ]
        );
        assert_eq!(thresholds.to_json(), r#"[[100],[250.5,"shutdown"]]"#);
    }

    #[test]
    fn integer_amounts_stay_integers() {
        let thresholds = CostThresholds::parse("[ [100, \"x\"],\n [250.5] ]").unwrap();
        assert_eq!(thresholds.to_json(), r#"[[100,"x"],[250.5]]"#);
        let reparsed = CostThresholds::parse(&thresholds.to_json()).unwrap();
        assert_eq!(reparsed, thresholds);
    }

    #[test]
    fn empty_list_is_allowed() {
        let thresholds = CostThresholds::parse("[]").unwrap();
        assert!(thresholds.entries().is_empty());
        assert_eq!(thresholds.to_json(), "[]");
    }

    #[test]
    fn schema_violations_name_the_offending_entry() {
        for document in [
            r#"[[-1]]"#,
            r#"[["100"]]"#,
            r#"[[]]"#,
            r#"[[1, "a", "b"]]"#,
            r#"{"amount": 1}"#,
        ] {
            match CostThresholds::parse(document) {
                Err(Error::InvalidCostThresholds { message }) => {
                    assert!(message.contains('/'), "{document}: {message}")
                }
                other => panic!("{document}: unexpected result {other:?}"),
            }
        }
    }

    #[test]
    fn malformed_json_is_rejected() {
        match CostThresholds::parse("[[1,") {
            Err(Error::InvalidCostThresholds { message }) => {
                assert!(message.starts_with("not valid JSON"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
