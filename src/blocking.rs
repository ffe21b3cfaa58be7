//! Blocking client.
//!
//! Same configuration, auth negotiation and redirect handling as the async
//! [`Client`](crate::Client); every wait parks the calling thread instead of
//! suspending a task.
//!
//! ```rust,ignore
//! let client = herald::Client::builder().build_blocking()?;
//! let mut resp = client.get("http://localhost:8080/stream-bytes/4096").stream()?;
//! while let Some(chunk) = resp.chunk_blocking()? {
//!     handle(chunk);
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use http::Method;

use crate::client::{ClientBuilder, ClientConfig, RequestBuilder};
use crate::transport::Transport;

/// Blocking HTTP client. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Same builder as the async client; finish with
    /// [`build_blocking`](ClientBuilder::build_blocking).
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(config: Arc<ClientConfig>, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_, Self> {
        RequestBuilder::new(self, &self.config, method, url.into())
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_, Self> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_, Self> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_, Self> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_, Self> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_, Self> {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_, Self> {
        self.request(Method::HEAD, url)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("blocking::Client")
            .field("config", &self.config)
            .finish()
    }
}
