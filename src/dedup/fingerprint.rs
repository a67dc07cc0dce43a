//! Request fingerprints.
//!
//! Two requests share a fingerprint when method, URL and body are equal,
//! where body equality ignores object key order.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use reqwest::Method;
use serde_json::Value;
use url::Url;

/// Canonical deduplication key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub method: String,
    pub url: String,
    /// Canonical JSON of the body; empty when there is none.
    pub body: String,
}

impl Fingerprint {
    pub fn new(method: &Method, url: &Url, body: Option<&Value>) -> Self {
        Self {
            method: method.as_str().to_ascii_uppercase(),
            url: url.as_str().to_string(),
            body: body.map(canonical_json).unwrap_or_default(),
        }
    }

    /// Operation key naming exactly this request. The body is folded into a
    /// hash so the key is safe to log.
    pub fn operation_key(&self) -> String {
        if self.body.is_empty() {
            return self.to_string();
        }
        let mut hasher = DefaultHasher::new();
        self.body.hash(&mut hasher);
        format!("{self} #{:016x}", hasher.finish())
    }
}

// Bodies can carry credentials; never print them.
impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Serialize `value` with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url() -> Url {
        Url::parse("http://church.local/api/auth/login").unwrap()
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"email":"a@b.com","password":"pw","meta":{"x":1,"y":[{"b":2,"a":1}]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"meta":{"y":[{"a":1,"b":2}],"x":1},"password":"pw","email":"a@b.com"}"#).unwrap();

        assert_eq!(
            Fingerprint::new(&Method::POST, &url(), Some(&a)),
            Fingerprint::new(&Method::POST, &url(), Some(&b))
        );
    }

    #[test]
    fn test_method_url_and_body_distinguish() {
        let body = json!({"email": "a@b.com"});
        let post = Fingerprint::new(&Method::POST, &url(), Some(&body));

        assert_ne!(post, Fingerprint::new(&Method::PUT, &url(), Some(&body)));
        assert_ne!(post, Fingerprint::new(&Method::POST, &url(), None));
        assert_ne!(post, Fingerprint::new(&Method::POST, &url(), Some(&json!({"email": "c@d.com"}))));
        // Array order is significant.
        assert_ne!(canonical_json(&json!([1, 2])), canonical_json(&json!([2, 1])));
    }

    #[test]
    fn test_debug_hides_body() {
        let fp = Fingerprint::new(&Method::POST, &url(), Some(&json!({"password": "hunter2"})));
        let rendered = format!("{fp:?} {fp}");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_operation_key_follows_body() {
        let choir = Fingerprint::new(&Method::POST, &url(), Some(&json!({"title": "Choir", "day": 1})));
        let same = Fingerprint::new(&Method::POST, &url(), Some(&json!({"day": 1, "title": "Choir"})));
        let vigil = Fingerprint::new(&Method::POST, &url(), Some(&json!({"title": "Vigil", "day": 1})));

        assert_eq!(choir.operation_key(), same.operation_key());
        assert_ne!(choir.operation_key(), vigil.operation_key());
        assert!(!choir.operation_key().contains("Choir"));
        assert_eq!(
            Fingerprint::new(&Method::GET, &url(), None).operation_key(),
            "GET http://church.local/api/auth/login"
        );
    }

    #[test]
    fn test_canonical_escapes_keys() {
        let value = json!({"quote\"key": "v"});
        assert_eq!(canonical_json(&value), r#"{"quote\"key":"v"}"#);
    }
}
