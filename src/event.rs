// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of graystruct.
//
// graystruct is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// graystruct is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with graystruct.  If not,
// see <http://www.gnu.org/licenses/>.

//! The structured event model consumed by the [encoder](crate::encoder).
//!
//! An [`Event`] is a mapping from field name to [`FieldValue`], together with the name of the
//! logger that produced it & its [`Severity`]. Call-site metadata, if the host environment has any,
//! arrives pre-resolved as a [`CallerInfo`].

use crate::{
    error::{Error, Result},
    level::Severity,
};

use std::{borrow::Cow, collections::BTreeMap};

type StdResult<T, E> = std::result::Result<T, E>;

/// The value of a single event field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Str(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// Convert to a JSON value; `field` is only used to describe the failure.
    ///
    /// JSON has no representation for NaN or the infinities, so those are the one way in which a
    /// field can fail to encode.
    pub fn to_json(&self, field: &str) -> Result<serde_json::Value> {
        use serde_json::Value;
        Ok(match self {
            FieldValue::Str(s) => Value::String(s.clone()),
            FieldValue::I64(n) => Value::from(*n),
            FieldValue::U64(n) => Value::from(*n),
            FieldValue::F64(x) => serde_json::Number::from_f64(*x)
                .map(Value::Number)
                .ok_or_else(|| {
                    Error::encoding(Some(field), format!("{} has no JSON representation", x))
                })?,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Null => Value::Null,
        })
    }
    /// The textual form of this value, as used when assembling `full_message`
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Str(s) => Cow::Borrowed(s),
            other => Cow::Owned(other.to_string()),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        match self {
            FieldValue::Str(s) => write!(f, "{}", s),
            FieldValue::I64(n) => write!(f, "{}", n),
            FieldValue::U64(n) => write!(f, "{}", n),
            FieldValue::F64(x) => write!(f, "{}", x),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::I64(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::I64(n.into())
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::U64(n)
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::U64(n.into())
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        FieldValue::F64(x)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(x: Option<T>) -> Self {
        x.map_or(FieldValue::Null, Into::into)
    }
}

/// Event fields, keyed by name
pub type Fields = BTreeMap<String, FieldValue>;

/// Call-site metadata for an event, already resolved by whoever produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallerInfo {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
}

impl CallerInfo {
    /// Record whatever metadata is present as the `file`, `line` & `function` fields of `fields`.
    pub fn apply(&self, fields: &mut Fields) {
        if let Some(file) = &self.file {
            fields.insert("file".to_string(), FieldValue::from(file.as_str()));
        }
        if let Some(line) = self.line {
            fields.insert("line".to_string(), FieldValue::from(line));
        }
        if let Some(function) = &self.function {
            fields.insert("function".to_string(), FieldValue::from(function.as_str()));
        }
    }
}

/// A single structured log event.
///
/// ```rust
/// use graystruct::{event::Event, level::Severity};
/// let event = Event::new("app.db", Severity::Warning)
///     .with("message", "slow query")
///     .with("elapsed_ms", 1200_u64);
/// assert_eq!(event.fields().len(), 2);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    fields: Fields,
    logger_name: String,
    severity: Severity,
}

impl Event {
    pub fn new<S: Into<String>>(logger_name: S, severity: Severity) -> Event {
        Event::from_fields(Fields::new(), logger_name, severity)
    }
    pub fn from_fields<S: Into<String>>(fields: Fields, logger_name: S, severity: Severity) -> Event {
        Event {
            fields,
            logger_name: logger_name.into(),
            severity,
        }
    }
    /// Add field `key`; a later value for the same key replaces an earlier one
    pub fn with<K: Into<String>, V: Into<FieldValue>>(mut self, key: K, value: V) -> Event {
        self.fields.insert(key.into(), value.into());
        self
    }
    /// Add the `file`, `line` & `function` fields described by `caller`
    pub fn with_caller(mut self, caller: &CallerInfo) -> Event {
        caller.apply(&mut self.fields);
        self
    }
    pub fn fields(&self) -> &Fields {
        &self.fields
    }
    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }
    pub fn severity(&self) -> Severity {
        self.severity
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn non_finite_floats_do_not_encode() {
        assert!(FieldValue::from(f64::NAN).to_json("x").is_err());
        assert!(FieldValue::from(f64::INFINITY)
            .to_json("x")
            .unwrap_err()
            .is_encoding());
        assert_eq!(
            FieldValue::from(1.5).to_json("x").unwrap(),
            serde_json::json!(1.5)
        );
        assert_eq!(
            FieldValue::from(None::<i64>).to_json("x").unwrap(),
            serde_json::Value::Null
        );
    }

    #[test]
    fn caller_info() {
        let caller = CallerInfo {
            file: Some("src/main.rs".to_string()),
            line: Some(55),
            function: None,
        };
        let event = Event::new("test", Severity::Info).with_caller(&caller);
        assert_eq!(event.fields()["file"], FieldValue::from("src/main.rs"));
        assert_eq!(event.fields()["line"], FieldValue::U64(55));
        assert!(!event.fields().contains_key("function"));
    }
}
