//! Request body encoding.
//!
//! Turns a logical body description into bytes (or a stream) plus the
//! headers it implies. Explicit caller headers always win.

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;
use crate::headers::Headers;
use crate::request::{ByteStream, RequestBody};

/// Logical body supplied by the caller.
#[derive(Debug, Default)]
pub struct Body {
    body: RequestBody,
    content_type: Option<&'static str>,
}

impl Body {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self {
            body: RequestBody::Bytes(data.into()),
            content_type: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            body: RequestBody::Bytes(Bytes::from(text.into())),
            content_type: Some("text/plain; charset=utf-8"),
        }
    }

    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self {
            body: RequestBody::Bytes(Bytes::from(serde_json::to_vec(value)?)),
            content_type: Some("application/json"),
        })
    }

    /// `application/x-www-form-urlencoded` pairs.
    pub fn form<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
            .finish();
        Self {
            body: RequestBody::Bytes(Bytes::from(encoded)),
            content_type: Some("application/x-www-form-urlencoded"),
        }
    }

    /// Body produced incrementally; length unknown up front.
    pub fn stream(stream: ByteStream) -> Self {
        Self {
            body: RequestBody::Stream(stream),
            content_type: Some("application/octet-stream"),
        }
    }

    /// Produce the wire body and fill in implied headers.
    pub fn encode(self, headers: &mut Headers) -> RequestBody {
        if let Some(content_type) = self.content_type {
            if !headers.contains("content-type") {
                headers.insert("Content-Type", content_type);
            }
        }
        // Streams are framed by the transport.
        if let RequestBody::Bytes(b) = &self.body {
            if !headers.contains("content-length") && !headers.contains("transfer-encoding") {
                headers.insert("Content-Length", b.len().to_string());
            }
        }
        self.body
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::text(s)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Self::bytes(v)
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Self::bytes(b)
    }
}
