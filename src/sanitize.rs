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

//! Mapping arbitrary event field names onto GELF field names.
//!
//! GELF reserves a handful of top-level keys; everything else a client sends is an "additional
//! field" & must begin with an underscore. [`sanitize`] is the pure function enforcing that rule.

use std::borrow::Cow;

/// The top-level keys defined by the GELF payload specification.
///
/// `line` & `file` are deprecated as top-level fields as of GELF 1.1, but still recognized here.
pub const STANDARD_GELF_KEYS: &[&str] = &[
    "version",
    "host",
    "short_message",
    "full_message",
    "timestamp",
    "level",
    "line",
    "file",
];

/// The GELF 1.1 top-level keys that are not deprecated.
pub const GELF_1_1_KEYS: &[&str] = &[
    "version",
    "host",
    "short_message",
    "full_message",
    "timestamp",
    "level",
];

/// A set of field names that pass through [`sanitize_with`] unchanged.
pub trait RecognizedKeys {
    fn recognizes(&self, key: &str) -> bool;
}

impl RecognizedKeys for [&str] {
    fn recognizes(&self, key: &str) -> bool {
        self.iter().any(|known| *known == key)
    }
}

impl RecognizedKeys for std::collections::BTreeSet<String> {
    fn recognizes(&self, key: &str) -> bool {
        self.contains(key)
    }
}

impl RecognizedKeys for std::collections::HashSet<String> {
    fn recognizes(&self, key: &str) -> bool {
        self.contains(key)
    }
}

/// Map `key` to a GELF-compliant field name, treating the members of `recognized` as standard
/// keys.
pub fn sanitize_with<'a, R: RecognizedKeys + ?Sized>(key: &'a str, recognized: &R) -> Cow<'a, str> {
    if key.starts_with('_') || recognized.recognizes(key) {
        Cow::Borrowed(key)
    } else {
        Cow::Owned(format!("_{}", key))
    }
}

/// Map `key` to a GELF-compliant field name.
///
/// Standard GELF keys & keys that already begin with `_` are returned as-is; anything else is
/// prefixed with `_`. The mapping is idempotent.
///
/// ```rust
/// use graystruct::sanitize::sanitize;
/// assert_eq!(sanitize("version"), "version");
/// assert_eq!(sanitize("user"), "_user");
/// assert_eq!(sanitize("_user"), "_user");
/// ```
pub fn sanitize(key: &str) -> Cow<'_, str> {
    sanitize_with(key, STANDARD_GELF_KEYS)
}

#[cfg(test)]
mod test {

    use super::*;

    use proptest::prelude::*;

    #[test]
    fn standard_keys_pass_through() {
        for key in STANDARD_GELF_KEYS {
            assert_eq!(sanitize(key), *key);
        }
        assert_eq!(sanitize("nonstandard"), "_nonstandard");
        assert_eq!(sanitize("_pid"), "_pid");
        assert_eq!(sanitize(""), "_");
    }

    #[test]
    fn custom_key_set() {
        assert_eq!(sanitize_with("line", GELF_1_1_KEYS), "_line");
        assert_eq!(sanitize_with("level", GELF_1_1_KEYS), "level");
        let keys: std::collections::BTreeSet<String> =
            ["answer".to_string()].into_iter().collect();
        assert_eq!(sanitize_with("answer", &keys), "answer");
        assert_eq!(sanitize_with("version", &keys), "_version");
    }

    proptest! {
        #[test]
        fn idempotent(key in "\\PC*") {
            let once = sanitize(&key).into_owned();
            prop_assert_eq!(sanitize(&once).into_owned(), once.clone());
            if !key.starts_with('_') && !STANDARD_GELF_KEYS.contains(&key.as_str()) {
                prop_assert_eq!(once, format!("_{}", key));
            }
        }
    }
}
