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

//! GELF [1.1] encoding.
//!
//! [1.1]: https://go2docs.graylog.org/current/getting_in_log_data/gelf.html
//!
//! [`Encoder`] turns a structured event into the JSON text of a GELF document. The host name is
//! resolved once, when the [`Encoder`] is built, & cached thereafter.
//!
//! # Examples
//!
//! ```rust
//! use graystruct::{encoder::Encoder, event::Event, level::Severity};
//!
//! let encoder = Encoder::builder().use_fqdn(false).local_name("web-1").build();
//! let json = encoder
//!     .encode_event(&Event::new("app", Severity::Info).with("message", "Hello, world!"))
//!     .unwrap();
//! let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
//! assert_eq!(doc["host"], "web-1");
//! assert_eq!(doc["short_message"], "Hello, world!");
//! ```

use crate::{
    error::{Error, Result},
    event::{Event, Fields},
    level::Severity,
    sanitize::{sanitize_with, GELF_1_1_KEYS},
};

use chrono::prelude::*;
use serde_json::{Map, Value};

use std::collections::BTreeSet;

/// The GELF specification version we produce
pub const GELF_VERSION: &str = "1.1";

/// Event field whose value becomes `short_message`
pub const MESSAGE_FIELD: &str = "message";

/// Event field whose value is appended to the message to form `full_message`
pub const EXCEPTION_FIELD: &str = "exception";

/// Attempt to figure-out the fully-qualified domain name of this host.
///
/// The plain host name is resolved to its addresses & each address is reverse-resolved; the first
/// name that contains a dot wins. If there is none, the plain host name is used. Should even that
/// be unavailable, we fall back to an IP address for this host, and failing that "-".
pub fn fqdn() -> String {
    match plain_hostname() {
        Some(name) => dns_lookup::lookup_host(&name)
            .ok()
            .into_iter()
            .flatten()
            .filter_map(|ip| dns_lookup::lookup_addr(&ip).ok())
            .find(|candidate| candidate.contains('.'))
            .unwrap_or(name),
        None => fallback_hostname(),
    }
}

/// The host name of this machine, without any attempt at qualification.
pub fn hostname() -> String {
    plain_hostname().unwrap_or_else(fallback_hostname)
}

fn plain_hostname() -> Option<String> {
    // `hostname::get()` returns an `Result<OsString,_>`, which is really kind of a hassle to work
    // with...
    hostname::get()
        .ok()
        .and_then(|os| os.into_string().ok())
        .filter(|name| !name.is_empty())
}

fn fallback_hostname() -> String {
    local_ip_address::local_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| "-".to_string())
}

/// Encodes structured events as GELF JSON documents.
#[derive(Clone, Debug)]
pub struct Encoder {
    host: String,
    recognized_keys: BTreeSet<String>,
    with_timestamp: bool,
}

impl std::default::Default for Encoder {
    /// An encoder reporting this host's FQDN & recognizing the GELF 1.1 keys
    fn default() -> Self {
        Encoder::builder().build()
    }
}

pub struct EncoderBuilder {
    use_fqdn: bool,
    local_name: Option<String>,
    recognized_keys: BTreeSet<String>,
    with_timestamp: bool,
}

impl EncoderBuilder {
    /// Report the fully-qualified domain name of this host (the default)
    pub fn use_fqdn(mut self, use_fqdn: bool) -> Self {
        self.use_fqdn = use_fqdn;
        self
    }
    /// Report `name` as the host; only consulted when not using the FQDN
    pub fn local_name<S: Into<String>>(mut self, name: S) -> Self {
        self.local_name = Some(name.into());
        self
    }
    /// Replace the set of keys that are emitted without an `_` prefix.
    ///
    /// The default is [`GELF_1_1_KEYS`]; pass [`STANDARD_GELF_KEYS`] to keep the deprecated `line`
    /// & `file` at the top level.
    ///
    /// [`STANDARD_GELF_KEYS`]: crate::sanitize::STANDARD_GELF_KEYS
    pub fn recognized_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recognized_keys = keys.into_iter().map(Into::into).collect();
        self
    }
    /// Stamp each document with the current time, unless the event carries a `timestamp` of its
    /// own
    pub fn with_timestamp(mut self, with_timestamp: bool) -> Self {
        self.with_timestamp = with_timestamp;
        self
    }
    pub fn build(self) -> Encoder {
        let host = match (self.use_fqdn, self.local_name) {
            (true, _) => fqdn(),
            (false, Some(name)) => name,
            (false, None) => hostname(),
        };
        Encoder {
            host,
            recognized_keys: self.recognized_keys,
            with_timestamp: self.with_timestamp,
        }
    }
}

impl Encoder {
    pub fn builder() -> EncoderBuilder {
        EncoderBuilder {
            use_fqdn: true,
            local_name: None,
            recognized_keys: GELF_1_1_KEYS.iter().map(|key| key.to_string()).collect(),
            with_timestamp: false,
        }
    }
    /// The value this encoder places in the `host` field
    pub fn host(&self) -> &str {
        &self.host
    }
    /// Encode `fields`, logged by `logger_name` at `severity`, as a GELF JSON document.
    ///
    /// `fields` is left untouched. The `message` field becomes `short_message`; an `exception`
    /// field is appended to the message (separated by a newline) to form `full_message`. All
    /// other fields are overlaid on the document last, under their sanitized names, so a caller
    /// field named `pid` will replace the `_pid` we compute.
    pub fn encode(&self, fields: &Fields, logger_name: &str, severity: Severity) -> Result<String> {
        let mut doc = Map::new();
        doc.insert("version".to_string(), Value::from(GELF_VERSION));
        doc.insert("host".to_string(), Value::from(self.host.as_str()));
        doc.insert("level".to_string(), Value::from(severity.syslog_level()));

        if self.with_timestamp {
            let now = Utc::now();
            let ts = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;
            doc.insert("timestamp".to_string(), Value::from(ts));
        }

        doc.insert("_pid".to_string(), Value::from(std::process::id()));
        doc.insert("_logger".to_string(), Value::from(logger_name));
        doc.insert("_level_name".to_string(), Value::from(severity.name().into_owned()));

        for (key, value) in fields
            .iter()
            .filter(|(key, _)| *key != MESSAGE_FIELD && *key != EXCEPTION_FIELD)
        {
            doc.insert(
                sanitize_with(key, &self.recognized_keys).into_owned(),
                value.to_json(key)?,
            );
        }

        let message = fields.get(MESSAGE_FIELD);
        if let Some(message) = message {
            doc.insert("short_message".to_string(), message.to_json(MESSAGE_FIELD)?);
        }
        if let Some(exception) = fields.get(EXCEPTION_FIELD) {
            let text = message.map(|m| m.as_text()).unwrap_or_default();
            doc.insert(
                "full_message".to_string(),
                Value::from(format!("{}\n{}", text, exception.as_text())),
            );
        }

        serde_json::to_string(&Value::Object(doc))
            .map_err(|err| Error::encoding(None, err.to_string()))
    }
    /// Encode `event` as a GELF JSON document
    pub fn encode_event(&self, event: &Event) -> Result<String> {
        self.encode(event.fields(), event.logger_name(), event.severity())
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::{event::FieldValue, sanitize::STANDARD_GELF_KEYS};

    use serde_json::json;

    fn local_encoder() -> Encoder {
        Encoder::builder().use_fqdn(false).local_name("my_host").build()
    }

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn no_fqdn_explicit_host() {
        let event = Event::new("test", Severity::Warning)
            .with("message", "answered a question")
            .with("line", 55)
            .with("file", "x.py")
            .with("function", "f")
            .with("user", "simon")
            .with("answer", 42);
        let before = event.clone();

        let doc = parse(&local_encoder().encode_event(&event).unwrap());

        // The caller's event is not mutated
        assert_eq!(event, before);
        assert_eq!(
            doc,
            json!({
                "version": "1.1",
                "host": "my_host",
                "short_message": "answered a question",
                "level": 4,
                "_line": 55,
                "_file": "x.py",
                "_function": "f",
                "_user": "simon",
                "_answer": 42,
                "_level_name": "WARNING",
                "_logger": "test",
                "_pid": std::process::id(),
            })
        );
    }

    #[test]
    fn exception_becomes_full_message() {
        let event = Event::new("test", Severity::Error)
            .with("message", "e")
            .with("exception", "Traceback\nValueError");
        let doc = parse(&local_encoder().encode_event(&event).unwrap());
        assert_eq!(doc["short_message"], "e");
        assert_eq!(doc["full_message"], "e\nTraceback\nValueError");
        assert!(doc.get("_exception").is_none());
        assert!(doc.get("_message").is_none());

        // No message: the exception follows an empty line
        let event = Event::new("test", Severity::Error).with("exception", "boom");
        let doc = parse(&local_encoder().encode_event(&event).unwrap());
        assert_eq!(doc["full_message"], "\nboom");
        assert!(doc.get("short_message").is_none());
    }

    #[test]
    fn key_set() {
        let event = Event::new("svc", Severity::Info);
        let doc = parse(&local_encoder().encode_event(&event).unwrap());
        let keys: BTreeSet<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["version", "host", "level", "_pid", "_logger", "_level_name"]
                .into_iter()
                .collect()
        );
    }

    #[test]
    fn legacy_keys() {
        let encoder = Encoder::builder()
            .use_fqdn(false)
            .local_name("h")
            .recognized_keys(STANDARD_GELF_KEYS.iter().copied())
            .build();
        let event = Event::new("svc", Severity::Debug)
            .with("line", 7)
            .with("file", "lib.rs");
        let doc = parse(&encoder.encode_event(&event).unwrap());
        assert_eq!(doc["line"], 7);
        assert_eq!(doc["file"], "lib.rs");
        assert_eq!(doc["level"], 7);
    }

    #[test]
    fn caller_fields_overlay_metadata() {
        let event = Event::new("svc", Severity::Custom(25))
            .with("pid", 1)
            .with("_logger", "other");
        let doc = parse(&local_encoder().encode_event(&event).unwrap());
        assert_eq!(doc["_pid"], 1);
        assert_eq!(doc["_logger"], "other");
        assert_eq!(doc["level"], 25);
        assert_eq!(doc["_level_name"], "Level 25");
    }

    #[test]
    fn unencodable_value() {
        let event = Event::new("svc", Severity::Info).with("ratio", f64::NAN);
        let err = local_encoder().encode_event(&event).unwrap_err();
        assert!(err.is_encoding());
    }

    #[test]
    fn timestamps() {
        let encoder = Encoder::builder()
            .use_fqdn(false)
            .local_name("h")
            .with_timestamp(true)
            .build();
        let doc = parse(&encoder.encode_event(&Event::new("svc", Severity::Info)).unwrap());
        assert!(doc["timestamp"].as_f64().unwrap() > 1_600_000_000.0);

        let event = Event::new("svc", Severity::Info).with("timestamp", 12.5);
        let doc = parse(&encoder.encode_event(&event).unwrap());
        assert_eq!(doc["timestamp"], 12.5);
    }

    #[test]
    fn host_resolution() {
        assert!(!Encoder::default().host().is_empty());
        let encoder = Encoder::builder().use_fqdn(false).build();
        assert_eq!(encoder.host(), hostname());
        // The local name is only consulted when not using the FQDN
        let encoder = Encoder::builder().local_name("ignored").build();
        assert_eq!(encoder.host(), fqdn());
    }

    #[test]
    fn fields_encode_directly() {
        let mut fields = Fields::new();
        fields.insert("message".to_string(), FieldValue::from("hi"));
        fields.insert("ok".to_string(), FieldValue::from(true));
        let doc = parse(&local_encoder().encode(&fields, "direct", Severity::Info).unwrap());
        assert_eq!(doc["short_message"], "hi");
        assert_eq!(doc["_ok"], true);
        assert_eq!(doc["_logger"], "direct");
        assert_eq!(fields.len(), 2);
    }
}
