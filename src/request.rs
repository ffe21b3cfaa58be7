//! Outgoing request model.

use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use http::Method;
use url::Url;

use crate::error::Result;
use crate::headers::Headers;

/// Boxed source of request body bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Request body: nothing, a buffer, or a one-shot stream.
#[derive(Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Stream(ByteStream),
}

impl RequestBody {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Buffered bytes, if the body is not a stream.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Clone a buffered body. Streams cannot be replayed.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Bytes(b) => Some(Self::Bytes(b.clone())),
            Self::Stream(_) => None,
        }
    }

    /// Drain a streaming body into a buffer so it can be sent more than once.
    pub async fn materialize(&mut self) -> Result<()> {
        if let Self::Stream(stream) = self {
            let mut buf = BytesMut::new();
            while let Some(chunk) = stream.try_next().await? {
                buf.extend_from_slice(&chunk);
            }
            tracing::trace!(len = buf.len(), "materialized streaming request body");
            *self = Self::Bytes(buf.freeze());
        }
        Ok(())
    }

    /// Blocking variant of [`materialize`](Self::materialize).
    pub fn materialize_blocking(&mut self) -> Result<()> {
        if self.is_stream() {
            futures::executor::block_on(self.materialize())?;
        }
        Ok(())
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(v))
    }
}

/// A single candidate request.
///
/// Every pipeline step that changes a request builds a new one; a request
/// handed to the transport is never reused.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: RequestBody,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: RequestBody::Empty,
        }
    }

    /// Parse `url` and create a request.
    pub fn parse(method: Method, url: &str) -> Result<Self> {
        Ok(Self::new(method, Url::parse(url)?))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Copy the request if its body can be replayed.
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            body: self.body.try_clone()?,
            ..self.clone_head()
        })
    }

    /// Copy method, URL and headers, leaving the body empty.
    pub fn clone_head(&self) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: RequestBody::Empty,
        }
    }

    /// Request target used by Digest: path (at least `/`) plus `?query`.
    pub fn digest_uri(&self) -> String {
        let mut uri = match self.url.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };
        if let Some(query) = self.url.query() {
            uri.push('?');
            uri.push_str(query);
        }
        uri
    }
}
