//! Drops sensitive fields from rows before they are serialized.

use crate::store::Row;
use regex::Regex;
use std::collections::HashSet;

/// `password`, `passwd`, `passwrd`, `wachtwoord`, `wachtwd` ... in any case.
const PASSWORD_PATTERN: &str = r"(?i)^(pass_?wo?r?d|wacht_?wo?o?r?d?)$";

#[derive(Clone, Debug)]
pub struct Redactor {
    pattern: Regex,
    extra: HashSet<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Redactor::new(Vec::<String>::new())
    }
}

impl Redactor {
    /// Password-like names plus `extra` column names (case-insensitive).
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Redactor {
            pattern: Regex::new(PASSWORD_PATTERN).expect("password pattern compiles"),
            extra: extra.into_iter().map(|s| s.as_ref().to_ascii_lowercase()).collect(),
        }
    }

    pub fn is_sensitive(&self, field: &str) -> bool {
        self.pattern.is_match(field) || self.extra.contains(&field.to_ascii_lowercase())
    }

    pub fn redact_row(&self, row: &mut Row) {
        row.retain(|name, _| !self.is_sensitive(name));
    }

    pub fn redact_rows(&self, rows: &mut [Row]) {
        for row in rows {
            self.redact_row(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: serde_json::Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn password_variants_are_sensitive() {
        let r = Redactor::default();
        for name in ["password", "Password", "PASSWORD", "passwd", "pass_word", "wachtwoord", "Wachtwoord", "wachtwd"] {
            assert!(r.is_sensitive(name), "{}", name);
        }
        for name in ["passport", "password_hint", "compass", "user", "passwords"] {
            assert!(!r.is_sensitive(name), "{}", name);
        }
    }

    #[test]
    fn redacted_value_never_reaches_the_output() {
        let r = Redactor::default();
        let mut out = row(json!({"id": 1, "name": "jan", "password": "s3cr3t\",\"x\":\"y", "Wachtwoord": "geheim"}));
        r.redact_row(&mut out);
        let text = serde_json::to_string(&out).unwrap();
        assert!(!text.contains("s3cr3t"));
        assert!(!text.contains("geheim"));
        assert_eq!(text, r#"{"id":1,"name":"jan"}"#);
    }

    #[test]
    fn legitimate_values_mentioning_passwords_survive() {
        let r = Redactor::default();
        let mut out = row(json!({"note": "\"password\":\"kept\""}));
        r.redact_row(&mut out);
        assert_eq!(out.get("note").and_then(|v| v.as_str()), Some("\"password\":\"kept\""));
    }

    #[test]
    fn extra_columns_are_configurable() {
        let r = Redactor::new(["api_token"]);
        let mut rows = vec![row(json!({"id": 1, "API_TOKEN": "t"})), row(json!({"id": 2}))];
        r.redact_rows(&mut rows);
        assert!(rows.iter().all(|r| !r.contains_key("API_TOKEN")));
        assert_eq!(rows.len(), 2);
    }
}
