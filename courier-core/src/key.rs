//! Canonical request fingerprints.
//!
//! A [`RequestKey`] identifies a logical request for the cache, the
//! debounce/throttle coalescer and refresh de-duplication. Two requests
//! that differ only in mapping key order produce equal keys; requests
//! that differ in semantic content produce distinct keys.
//!
//! ## Format
//!
//! `{METHOD}:{url}:{canonical_params}:{canonical_body}`
//!
//! `canonical` is a stable JSON rendering that sorts object keys
//! recursively and preserves sequence order. Binary payloads contribute
//! their md5 digest instead of their bytes; multipart forms contribute
//! their parts sorted by field name, with blob parts digested.

use std::fmt;

use md5::{Digest, Md5};
use serde_json::Value;
use smol_str::SmolStr;

use crate::body::{Body, FormPart};
use crate::request::Request;

/// A canonical fingerprint of a logical request.
///
/// Cloning is cheap: the key is a small-string handle shared by the
/// cache, the coalescer and the cancellation plumbing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(SmolStr);

impl RequestKey {
    /// Derives the key for a request.
    pub fn of(request: &Request) -> Self {
        let mut out = String::with_capacity(64);
        out.push_str(request.method.as_str());
        out.push(':');
        out.push_str(&request.url);
        out.push(':');
        if !request.params.is_empty() {
            // BTreeMap iteration is already key-ordered; values may nest.
            out.push('{');
            let mut first = true;
            for (key, value) in &request.params {
                if !first {
                    out.push(',');
                }
                first = false;
                push_json_string(&mut out, key);
                out.push(':');
                write_canonical(&mut out, value);
            }
            out.push('}');
        }
        out.push(':');
        match &request.body {
            None => {}
            Some(Body::Json(value)) => write_canonical(&mut out, value),
            Some(Body::Bytes(bytes)) => {
                out.push_str("md5:");
                out.push_str(&hex_digest(bytes));
            }
            Some(Body::Form(form)) => {
                let mut parts: Vec<&FormPart> = form.parts().iter().collect();
                parts.sort_by(|a, b| a.name().cmp(b.name()));
                out.push('{');
                let mut first = true;
                for part in parts {
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    push_json_string(&mut out, part.name());
                    out.push(':');
                    match part {
                        FormPart::Text { value, .. } => push_json_string(&mut out, value),
                        FormPart::Blob { data, .. } => {
                            out.push_str("\"md5:");
                            out.push_str(&hex_digest(data));
                            out.push('"');
                        }
                    }
                }
                out.push('}');
            }
        }
        RequestKey(SmolStr::new(out))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Writes a stable rendering of a JSON value: object keys sorted
/// recursively, sequence order preserved, scalars via serde_json.
fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            let mut first = true;
            for key in keys {
                if !first {
                    out.push(',');
                }
                first = false;
                push_json_string(out, key);
                out.push(':');
                write_canonical(out, &map[key]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            let mut first = true;
            for item in items {
                if !first {
                    out.push(',');
                }
                first = false;
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => {
            // Null, booleans, numbers and strings already serialise stably.
            out.push_str(&scalar.to_string());
        }
    }
}

fn push_json_string(out: &mut String, s: &str) {
    out.push_str(&Value::String(s.to_owned()).to_string());
}

/// Lowercase hex md5 of a byte slice.
pub fn hex_digest(data: &[u8]) -> String {
    use std::fmt::Write;
    let mut hasher = Md5::new();
    hasher.update(data);
    let mut hex = String::with_capacity(32);
    for byte in hasher.finalize().as_slice() {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    use crate::body::MultipartForm;

    #[test]
    fn key_is_order_insensitive_for_objects() {
        let a = Request::post("https://api.example.com/items")
            .body(json!({"a": 1, "b": {"x": true, "y": [1, 2]}}));
        let b = Request::post("https://api.example.com/items")
            .body(json!({"b": {"y": [1, 2], "x": true}, "a": 1}));
        assert_eq!(RequestKey::of(&a), RequestKey::of(&b));
    }

    #[test]
    fn key_distinguishes_semantic_content() {
        let a = Request::post("/items").body(json!({"a": 1}));
        let b = Request::post("/items").body(json!({"a": 2}));
        assert_ne!(RequestKey::of(&a), RequestKey::of(&b));
    }

    #[test]
    fn key_preserves_sequence_order() {
        let a = Request::post("/items").body(json!({"ids": [1, 2]}));
        let b = Request::post("/items").body(json!({"ids": [2, 1]}));
        assert_ne!(RequestKey::of(&a), RequestKey::of(&b));
    }

    #[test]
    fn params_ignore_insertion_order() {
        let a = Request::get("/q").param("page", 2).param("size", 10);
        let b = Request::get("/q").param("size", 10).param("page", 2);
        assert_eq!(RequestKey::of(&a), RequestKey::of(&b));
    }

    #[test]
    fn method_and_url_separate_keys() {
        let get = Request::get("/things");
        let post = Request::post("/things");
        let other = Request::get("/others");
        assert_ne!(RequestKey::of(&get), RequestKey::of(&post));
        assert_ne!(RequestKey::of(&get), RequestKey::of(&other));
    }

    #[test]
    fn binary_bodies_hash_to_byte_identity() {
        let a = Request::put("/blob").body(Bytes::from_static(b"abc"));
        let b = Request::put("/blob").body(Bytes::from_static(b"abc"));
        let c = Request::put("/blob").body(Bytes::from_static(b"abd"));
        assert_eq!(RequestKey::of(&a), RequestKey::of(&b));
        assert_ne!(RequestKey::of(&a), RequestKey::of(&c));
    }

    #[test]
    fn form_parts_sorted_by_name() {
        let a = Request::post("/upload").body(
            MultipartForm::new()
                .text("chunkIndex", "0")
                .text("totalChunks", "3"),
        );
        let b = Request::post("/upload").body(
            MultipartForm::new()
                .text("totalChunks", "3")
                .text("chunkIndex", "0"),
        );
        assert_eq!(RequestKey::of(&a), RequestKey::of(&b));
    }

    #[test]
    fn hex_digest_matches_known_vector() {
        // RFC 1321 test vector for "abc".
        assert_eq!(hex_digest(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
