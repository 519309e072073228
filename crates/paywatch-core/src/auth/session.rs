use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Session cookies, name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCredentials {
    cookies: BTreeMap<String, String>,
}

impl SessionCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw `Cookie` header as copied from browser devtools
    /// (`name=value; other=value`). Segments without `=` are ignored.
    pub fn from_cookie_header(header: &str) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|segment| segment.split_once('='))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        Self { cookies }
    }

    pub fn from_map<K, V>(cookies: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cookies: cookies
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Render as a `Cookie` header value.
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Apply cookies set by an upstream response; a `None` value deletes the
    /// cookie. Returns true if anything changed.
    pub fn merge<I, K, V>(&mut self, updates: I) -> bool
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut changed = false;
        for (name, value) in updates {
            let name: String = name.into();
            match value.map(Into::<String>::into) {
                Some(value) if self.cookies.get(&name) != Some(&value) => {
                    self.cookies.insert(name, value);
                    changed = true;
                }
                Some(_) => {}
                None => changed |= self.cookies.remove(&name).is_some(),
            }
        }
        changed
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cookie_header() {
        let creds = SessionCredentials::from_cookie_header(
            "__OBANK_session=abc; __OBANK_refresh=def==; junk; =orphan",
        );
        assert_eq!(creds.len(), 2);
        assert_eq!(creds.get("__OBANK_session"), Some("abc"));
        // Base64 padding survives because only the first '=' splits
        assert_eq!(creds.get("__OBANK_refresh"), Some("def=="));
    }

    #[test]
    fn test_header_value_round_trip() {
        let creds = SessionCredentials::from_map([("b", "2"), ("a", "1")]);
        assert_eq!(creds.header_value(), "a=1; b=2");
        assert_eq!(SessionCredentials::from_cookie_header(&creds.header_value()), creds);
    }

    #[test]
    fn test_merge_reports_changes() {
        let mut creds = SessionCredentials::from_map([("session", "old")]);
        assert!(!creds.merge([("session", Some("old"))]));
        assert!(creds.merge([("session", Some("new")), ("refresh", Some("r1"))]));
        assert_eq!(creds.get("session"), Some("new"));
        assert_eq!(creds.get("refresh"), Some("r1"));
    }

    #[test]
    fn test_merge_removes_deleted_cookies() {
        let mut creds = SessionCredentials::from_map([("session", "s"), ("refresh", "r")]);
        assert!(creds.merge([("refresh", None::<&str>)]));
        assert_eq!(creds.get("refresh"), None);
        assert_eq!(creds.header_value(), "session=s");
        // Deleting a cookie that is not there is not a change
        assert!(!creds.merge([("refresh", None::<&str>)]));
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let creds = SessionCredentials::from_map([("a", "1")]);
        assert_eq!(serde_json::to_string(&creds).unwrap(), r#"{"a":"1"}"#);
    }
}
