//! Request and response payload representations.

use bytes::Bytes;
use smol_str::SmolStr;

/// A request payload.
///
/// Structured payloads stay as [`serde_json::Value`] until the transport
/// serialises them; binary payloads use [`Bytes`] for cheap cloning.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Structured JSON payload.
    Json(serde_json::Value),
    /// Opaque binary payload.
    Bytes(Bytes),
    /// `multipart/form-data` payload.
    Form(MultipartForm),
}

impl Body {
    /// Builds a JSON body from any serialisable value.
    ///
    /// # Panics
    ///
    /// Panics if the value cannot be represented as JSON (non-string map
    /// keys); use [`serde_json::to_value`] directly for fallible
    /// conversion.
    pub fn json<T: serde::Serialize>(value: T) -> Self {
        Body::Json(serde_json::to_value(value).expect("value serialisable to JSON"))
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<MultipartForm> for Body {
    fn from(form: MultipartForm) -> Self {
        Body::Form(form)
    }
}

/// An ordered `multipart/form-data` payload.
///
/// Part order is preserved on the wire; the canonical request key sorts
/// parts by name so key derivation stays order-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    /// A plain text field.
    Text {
        /// Field name.
        name: SmolStr,
        /// Field value.
        value: String,
    },
    /// A binary file field.
    Blob {
        /// Field name.
        name: SmolStr,
        /// File content.
        data: Bytes,
        /// Optional filename hint for the transport.
        filename: Option<String>,
    },
}

impl FormPart {
    /// The part's field name.
    pub fn name(&self) -> &str {
        match self {
            FormPart::Text { name, .. } | FormPart::Blob { name, .. } => name,
        }
    }
}

impl MultipartForm {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text field.
    pub fn text(mut self, name: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Appends a binary file field.
    pub fn blob(
        mut self,
        name: impl Into<SmolStr>,
        data: Bytes,
        filename: Option<String>,
    ) -> Self {
        self.parts.push(FormPart::Blob {
            name: name.into(),
            data,
            filename,
        });
        self
    }

    /// The parts in wire order.
    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Looks up the first text field with the given name.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            FormPart::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }
}

/// How the caller wants the response body decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseKind {
    /// Decode as structured JSON (the default).
    #[default]
    Json,
    /// Keep the raw bytes (downloads, chunk uploads).
    Bytes,
    /// Decode as UTF-8 text.
    Text,
}

/// A decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Structured JSON payload.
    Json(serde_json::Value),
    /// Raw bytes.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
}

impl ResponseBody {
    /// The JSON value, when this body is structured.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The raw bytes, when this body is binary.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ResponseBody::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The text, when this body is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }
}
