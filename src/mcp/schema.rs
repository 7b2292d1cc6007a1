// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Typed input schemas and argument validation.
//!
//! A tool declares its arguments as a list of [`FieldSpec`]s. Incoming JSON
//! arguments are checked against that list before any handler runs, and the
//! handler receives [`Arguments`]: a map of closed [`ArgValue`]s with
//! defaults already filled in. Fields the schema does not declare are
//! ignored so older servers keep working with newer clients.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Wire format for `date` fields.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Declared type of a single argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any JSON string.
    String,
    /// Any JSON number.
    Number,
    /// A JSON number with no fractional part.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// A string in `YYYY-MM-DD` form naming a real calendar date.
    Date,
}

impl FieldKind {
    const fn json_type(self) -> &'static str {
        match self {
            Self::String | Self::Date => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date => f.write_str("date (YYYY-MM-DD)"),
            other => f.write_str(other.json_type()),
        }
    }
}

/// A validated argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// A string.
    String(String),
    /// A floating-point number.
    Number(f64),
    /// An integer.
    Integer(i64),
    /// A boolean.
    Boolean(bool),
    /// A calendar date.
    Date(NaiveDate),
}

impl ArgValue {
    /// Renders the value back to JSON (dates as `YYYY-MM-DD`).
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => json!(n),
            Self::Integer(i) => json!(i),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
        }
    }

    const fn kind(&self) -> FieldKind {
        match self {
            Self::String(_) => FieldKind::String,
            Self::Number(_) => FieldKind::Number,
            Self::Integer(_) => FieldKind::Integer,
            Self::Boolean(_) => FieldKind::Boolean,
            Self::Date(_) => FieldKind::Date,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// Declaration of one argument.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    description: String,
    required: bool,
    default: Option<ArgValue>,
}

impl FieldSpec {
    /// An optional field with no default.
    pub fn new(name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
            default: None,
        }
    }

    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the value used when the caller omits the field.
    ///
    /// The default must have the field's own kind; a mismatched default is
    /// dropped.
    #[must_use]
    pub fn with_default(mut self, value: ArgValue) -> Self {
        if value.kind() == self.kind {
            self.default = Some(value);
        }
        self
    }

    /// The argument name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared kind.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Whether the caller must supply the field.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// The default, if any.
    #[must_use]
    pub const fn default_value(&self) -> Option<&ArgValue> {
        self.default.as_ref()
    }

    fn to_json(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.kind.json_type()));
        prop.insert("description".into(), json!(self.description));
        if self.kind == FieldKind::Date {
            prop.insert("format".into(), json!("date"));
        }
        if let Some(default) = &self.default {
            prop.insert("default".into(), default.to_json());
        }
        Value::Object(prop)
    }

    fn coerce(&self, value: &Value) -> Result<ArgValue, ValidationError> {
        let wrong_type = || ValidationError::WrongType {
            field: self.name.clone(),
            expected: self.kind,
            found: json_type_name(value),
        };

        match self.kind {
            FieldKind::String => value
                .as_str()
                .map(|s| ArgValue::String(s.to_string()))
                .ok_or_else(wrong_type),
            FieldKind::Number => value.as_f64().map(ArgValue::Number).ok_or_else(wrong_type),
            FieldKind::Integer => value.as_i64().map(ArgValue::Integer).ok_or_else(wrong_type),
            FieldKind::Boolean => value.as_bool().map(ArgValue::Boolean).ok_or_else(wrong_type),
            FieldKind::Date => {
                let raw = value.as_str().ok_or_else(wrong_type)?;
                parse_date(raw)
                    .map(ArgValue::Date)
                    .ok_or_else(|| ValidationError::BadDate {
                        field: self.name.clone(),
                        value: raw.to_string(),
                    })
            }
        }
    }
}

/// Strict `YYYY-MM-DD`; chrono alone would accept unpadded fields.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Reasons an argument object can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `arguments` was present but not a JSON object.
    #[error("arguments must be an object, got {0}")]
    NotAnObject(&'static str),
    /// A required field was absent or null.
    #[error("missing required argument '{0}'")]
    Missing(String),
    /// A field had the wrong JSON type.
    #[error("argument '{field}' must be {expected}, got {found}")]
    WrongType {
        /// The field name.
        field: String,
        /// What the schema declares.
        expected: FieldKind,
        /// What the caller sent.
        found: &'static str,
    },
    /// A date field did not name a valid `YYYY-MM-DD` date.
    #[error("argument '{field}' is not a valid date: '{value}' (use YYYY-MM-DD)")]
    BadDate {
        /// The field name.
        field: String,
        /// The rejected input.
        value: String,
    },
}

/// The declared input contract of a tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    /// An empty schema (accepts any object).
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a field declaration.
    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Declared fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Renders the schema as a JSON Schema object for `tools/list`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json()))
            .collect();

        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), Value::Object(properties));

        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        if !required.is_empty() {
            schema.insert("required".into(), json!(required));
        }

        Value::Object(schema)
    }

    /// Checks raw JSON arguments against the schema.
    ///
    /// Missing `arguments` is treated as an empty object. A JSON `null` for
    /// a field counts as absent.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, in declaration order.
    pub fn validate(&self, arguments: Option<&Value>) -> Result<Arguments, ValidationError> {
        let empty = Map::new();
        let object = match arguments {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(other) => return Err(ValidationError::NotAnObject(json_type_name(other))),
        };

        let mut values = BTreeMap::new();
        for spec in &self.fields {
            match object.get(&spec.name).filter(|v| !v.is_null()) {
                Some(raw) => {
                    values.insert(spec.name.clone(), spec.coerce(raw)?);
                }
                None if spec.required => return Err(ValidationError::Missing(spec.name.clone())),
                None => {
                    if let Some(default) = &spec.default {
                        values.insert(spec.name.clone(), default.clone());
                    }
                }
            }
        }

        Ok(Arguments { values })
    }
}

/// Validated arguments handed to a tool handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, ArgValue>,
}

impl Arguments {
    /// Looks up a value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// A string argument, if present and declared as a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// A date argument, if present and declared as a date.
    #[must_use]
    pub fn get_date(&self, name: &str) -> Option<NaiveDate> {
        match self.values.get(name) {
            Some(ArgValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    /// Whether the argument is present (supplied or defaulted).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates over all present arguments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn sample() -> InputSchema {
        InputSchema::new()
            .field(FieldSpec::new("ticker", FieldKind::String, "Symbol").required())
            .field(
                FieldSpec::new("period", FieldKind::String, "Range")
                    .with_default(ArgValue::from("1mo")),
            )
            .field(FieldSpec::new("limit", FieldKind::Integer, "Row cap"))
            .field(FieldSpec::new("adjusted", FieldKind::Boolean, "Adjust prices"))
            .field(FieldSpec::new("start_date", FieldKind::Date, "Start"))
    }

    #[test]
    fn test_defaults_are_applied() -> Result<()> {
        let args = sample().validate(Some(&json!({ "ticker": "AAPL" })))?;
        assert_eq!(args.get_str("ticker"), Some("AAPL"));
        assert_eq!(args.get_str("period"), Some("1mo"));
        assert!(!args.contains("limit"));
        Ok(())
    }

    #[test]
    fn test_supplied_value_overrides_default() -> Result<()> {
        let args = sample().validate(Some(&json!({ "ticker": "AAPL", "period": "5d" })))?;
        assert_eq!(args.get_str("period"), Some("5d"));
        Ok(())
    }

    #[test]
    fn test_missing_required() {
        let err = sample().validate(Some(&json!({ "period": "5d" }))).err();
        assert_eq!(err, Some(ValidationError::Missing("ticker".to_string())));
    }

    #[test]
    fn test_missing_arguments_object_means_empty() {
        let err = sample().validate(None).err();
        assert_eq!(err, Some(ValidationError::Missing("ticker".to_string())));
    }

    #[test]
    fn test_null_counts_as_absent() {
        let err = sample().validate(Some(&json!({ "ticker": null }))).err();
        assert_eq!(err, Some(ValidationError::Missing("ticker".to_string())));
    }

    #[test]
    fn test_wrong_type() {
        let err = sample().validate(Some(&json!({ "ticker": 42 }))).err();
        assert_eq!(
            err,
            Some(ValidationError::WrongType {
                field: "ticker".to_string(),
                expected: FieldKind::String,
                found: "number",
            })
        );

        let err = sample()
            .validate(Some(&json!({ "ticker": "A", "limit": 1.5 })))
            .err();
        assert!(matches!(err, Some(ValidationError::WrongType { .. })));
    }

    #[test]
    fn test_non_object_arguments() {
        let err = sample().validate(Some(&json!(["AAPL"]))).err();
        assert_eq!(err, Some(ValidationError::NotAnObject("array")));
    }

    #[test]
    fn test_unknown_fields_tolerated() -> Result<()> {
        let args = sample().validate(Some(&json!({ "ticker": "AAPL", "currency": "USD" })))?;
        assert!(!args.contains("currency"));
        Ok(())
    }

    #[test]
    fn test_date_parsing() -> Result<()> {
        let args = sample().validate(Some(&json!({ "ticker": "A", "start_date": "2024-02-29" })))?;
        assert_eq!(args.get_date("start_date"), NaiveDate::from_ymd_opt(2024, 2, 29));

        for bad in ["2024-13-01", "2023-02-29", "2024-1-05", "01/05/2024", ""] {
            let err = sample()
                .validate(Some(&json!({ "ticker": "A", "start_date": bad })))
                .err();
            assert!(
                matches!(err, Some(ValidationError::BadDate { .. })),
                "{bad:?} should be rejected, got {err:?}"
            );
        }
        Ok(())
    }

    #[test]
    fn test_schema_json_shape() {
        let schema = sample().to_json();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["ticker"]));
        assert_eq!(schema["properties"]["period"]["default"], "1mo");
        assert_eq!(schema["properties"]["start_date"]["type"], "string");
        assert_eq!(schema["properties"]["start_date"]["format"], "date");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
    }

    #[test]
    fn test_schema_without_required_omits_key() {
        let schema = InputSchema::new()
            .field(FieldSpec::new("verbose", FieldKind::Boolean, "Chatty"))
            .to_json();
        assert!(schema.get("required").is_none());
    }

    #[test]
    fn test_mismatched_default_is_dropped() {
        let spec = FieldSpec::new("limit", FieldKind::Integer, "Row cap")
            .with_default(ArgValue::from("ten"));
        assert!(spec.default_value().is_none());
    }
}
