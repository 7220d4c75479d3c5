//! Structural contracts for values crossing step boundaries.
//!
//! A [`Contract`] describes the shape a JSON value must have. Contracts are
//! checked twice: statically when a graph is built (a consumer's input
//! contract must [`accept`](Contract::accepts) its producer's output
//! contract) and dynamically when a step runs (the actual value must
//! [`validate`](Contract::validate)).

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// A value failed to match a contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at {path}: expected {expected}, found {found}")]
pub struct ContractViolation {
    /// Location of the offending value, e.g. `$.changed_files[2].additions`.
    pub path: String,
    pub expected: String,
    pub found: String,
}

/// One named field of an object contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub contract: Contract,
    pub required: bool,
}

/// Shape of a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Contract {
    /// Anything, including `null`.
    Any,
    Null,
    Bool,
    /// Any JSON number.
    Number,
    /// A number without a fractional part.
    Integer,
    String,
    /// A string with at least one non-whitespace character.
    NonEmptyString,
    /// An absolute URL: scheme, `://`, and a host.
    Url,
    Array(Box<Contract>),
    Object(Vec<Field>),
    /// `null` or the inner contract.
    Nullable(Box<Contract>),
}

fn url_pattern() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^\s/?#@]+(?:[/?#]\S*)?$")
            .unwrap_or_else(|e| panic!("url pattern is a valid regex: {e}"))
    })
}

impl Contract {
    /// Object contract whose fields are all required.
    pub fn object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Contract)>,
        S: Into<String>,
    {
        Self::Object(
            fields
                .into_iter()
                .map(|(name, contract)| Field {
                    name: name.into(),
                    contract,
                    required: true,
                })
                .collect(),
        )
    }

    pub fn array(items: Contract) -> Self {
        Self::Array(Box::new(items))
    }

    pub fn nullable(inner: Contract) -> Self {
        Self::Nullable(Box::new(inner))
    }

    /// Add an optional field to an object contract. No-op on other shapes.
    pub fn with_optional(mut self, name: impl Into<String>, contract: Contract) -> Self {
        if let Self::Object(fields) = &mut self {
            fields.push(Field {
                name: name.into(),
                contract,
                required: false,
            });
        }
        self
    }

    /// Check `value` against this contract.
    pub fn validate(&self, value: &Value) -> Result<(), ContractViolation> {
        self.validate_at("$", value)
    }

    fn validate_at(&self, path: &str, value: &Value) -> Result<(), ContractViolation> {
        let ok = match (self, value) {
            (Self::Any, _) => true,
            (Self::Null, Value::Null) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Number, Value::Number(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::String, Value::String(_)) => true,
            (Self::NonEmptyString, Value::String(s)) => !s.trim().is_empty(),
            (Self::Url, Value::String(s)) => url_pattern().is_match(s),
            (Self::Nullable(_), Value::Null) => true,
            (Self::Nullable(inner), other) => return inner.validate_at(path, other),
            (Self::Array(items), Value::Array(values)) => {
                for (i, item) in values.iter().enumerate() {
                    items.validate_at(&format!("{path}[{i}]"), item)?;
                }
                true
            }
            (Self::Object(fields), Value::Object(map)) => {
                for field in fields {
                    let field_path = format!("{path}.{}", field.name);
                    match map.get(&field.name) {
                        Some(v) => field.contract.validate_at(&field_path, v)?,
                        None if field.required => {
                            return Err(ContractViolation {
                                path: field_path,
                                expected: field.contract.to_string(),
                                found: "missing field".into(),
                            });
                        }
                        None => {}
                    }
                }
                true
            }
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(ContractViolation {
                path: path.to_owned(),
                expected: self.to_string(),
                found: describe_value(value),
            })
        }
    }

    /// Whether every value satisfying `produced` is guaranteed to satisfy
    /// `self`. Used at graph-build time to match a consumer's input contract
    /// against its producer's output contract.
    ///
    /// A producer declared as [`Contract::Any`] is accepted; the value is
    /// still checked when the consumer runs.
    pub fn accepts(&self, produced: &Contract) -> bool {
        match (self, produced) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Nullable(inner), Self::Nullable(p)) => inner.accepts(p),
            (Self::Nullable(_), Self::Null) => true,
            (Self::Nullable(inner), p) => inner.accepts(p),
            (_, Self::Nullable(_)) => false,
            (Self::Null, Self::Null) | (Self::Bool, Self::Bool) => true,
            (Self::Number, Self::Number | Self::Integer) => true,
            (Self::Integer, Self::Integer) => true,
            (Self::String, Self::String | Self::NonEmptyString | Self::Url) => true,
            (Self::NonEmptyString, Self::NonEmptyString | Self::Url) => true,
            (Self::Url, Self::Url) => true,
            (Self::Array(c), Self::Array(p)) => c.accepts(p),
            (Self::Object(wanted), Self::Object(offered)) => wanted.iter().all(|w| {
                match offered.iter().find(|o| o.name == w.name) {
                    Some(o) => (o.required || !w.required) && w.contract.accepts(&o.contract),
                    None => !w.required,
                }
            }),
            _ => false,
        }
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Null => write!(f, "null"),
            Self::Bool => write!(f, "bool"),
            Self::Number => write!(f, "number"),
            Self::Integer => write!(f, "integer"),
            Self::String => write!(f, "string"),
            Self::NonEmptyString => write!(f, "non-empty string"),
            Self::Url => write!(f, "url"),
            Self::Array(items) => write!(f, "array<{items}>"),
            Self::Nullable(inner) => write!(f, "{inner}?"),
            Self::Object(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let marker = if field.required { "" } else { "?" };
                    write!(f, "{}{marker}: {}", field.name, field.contract)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("bool {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) if s.chars().count() > 40 => {
            let head: String = s.chars().take(40).collect();
            format!("string \"{head}...\"")
        }
        Value::String(s) => format!("string \"{s}\""),
        Value::Array(a) => format!("array of {}", a.len()),
        Value::Object(_) => "object".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trigger() -> Contract {
        Contract::object([("url", Contract::Url)])
    }

    #[test]
    fn url_contract_accepts_absolute_urls() {
        assert!(trigger().validate(&json!({ "url": "https://example.com/repo/42" })).is_ok());
        assert!(trigger().validate(&json!({ "url": "http://localhost:8080" })).is_ok());
    }

    #[test]
    fn url_contract_rejects_malformed_input() {
        let err = trigger().validate(&json!({ "url": "not-a-url" })).unwrap_err();
        assert_eq!(err.path, "$.url");
        assert_eq!(err.expected, "url");

        assert!(trigger().validate(&json!({ "url": "https://" })).is_err());
        assert!(trigger().validate(&json!({ "url": 42 })).is_err());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let err = trigger().validate(&json!({})).unwrap_err();
        assert_eq!(err.path, "$.url");
        assert_eq!(err.found, "missing field");
    }

    #[test]
    fn nested_paths_point_at_the_offending_item() {
        let contract = Contract::object([(
            "files",
            Contract::array(Contract::object([("additions", Contract::Integer)])),
        )]);
        let value = json!({ "files": [{ "additions": 1 }, { "additions": "two" }] });
        let err = contract.validate(&value).unwrap_err();
        assert_eq!(err.path, "$.files[1].additions");
    }

    #[test]
    fn optional_and_nullable_fields() {
        let contract = Contract::object([("body", Contract::nullable(Contract::String))])
            .with_optional("labels", Contract::array(Contract::String));
        assert!(contract.validate(&json!({ "body": null })).is_ok());
        assert!(contract.validate(&json!({ "body": "x", "labels": ["a"] })).is_ok());
        assert!(contract.validate(&json!({ "labels": [] })).is_err());
    }

    #[test]
    fn non_empty_string_rejects_whitespace() {
        assert!(Contract::NonEmptyString.validate(&json!("   ")).is_err());
        assert!(Contract::NonEmptyString.validate(&json!("ok")).is_ok());
    }

    #[test]
    fn accepts_is_structural() {
        let produced = Contract::object([
            ("title", Contract::String),
            ("diff", Contract::String),
            ("files", Contract::array(Contract::Integer)),
        ]);
        let wanted = Contract::object([("diff", Contract::String)]);
        assert!(wanted.accepts(&produced));

        let wants_number_files = Contract::object([("files", Contract::array(Contract::Number))]);
        assert!(wants_number_files.accepts(&produced));

        let wants_missing = Contract::object([("author", Contract::String)]);
        assert!(!wants_missing.accepts(&produced));

        assert!(!Contract::Integer.accepts(&Contract::Number));
        assert!(!Contract::String.accepts(&Contract::nullable(Contract::String)));
        assert!(Contract::nullable(Contract::String).accepts(&Contract::Url));
    }

    #[test]
    fn display_is_readable() {
        let contract = Contract::object([("url", Contract::Url)])
            .with_optional("note", Contract::nullable(Contract::String));
        assert_eq!(contract.to_string(), "{url: url, note?: string?}");
    }
}
