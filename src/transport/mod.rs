//! Transport seam.
//!
//! A transport performs exactly one HTTP exchange per `dispatch`: it never
//! follows redirects and never answers auth challenges, both are handled
//! by the pipeline above it. The response head is returned as soon as it
//! arrives; the body is pushed into a [`ChunkWriter`](crate::stream::ChunkWriter)
//! by a background task and pulled by the caller.
//!
//! - [`HyperTransport`]: HTTP/1.1 and HTTP/2 (prior knowledge) via hyper
//! - [`BlockingTransport`]: any async transport driven from a private runtime
//! - [`MockTransport`]: scripted responses for tests

pub mod blocking;
pub mod h1_h2;
pub mod mock;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;
use crate::stream::DEFAULT_CHUNK_SIZE;
use crate::timeouts::Timeouts;

pub use blocking::BlockingTransport;
pub use h1_h2::HyperTransport;
pub use mock::{MockResponse, MockTransport, RecordedRequest};

/// Per-dispatch knobs handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    pub timeouts: Timeouts,
    /// Size of the chunks the streamed body is cut into.
    pub chunk_size: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::api_defaults(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Transport for the async client.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn dispatch(&self, request: Request, options: &DispatchOptions) -> Result<Response>;
}

/// Transport for the blocking client.
pub trait Transport: Send + Sync {
    fn dispatch(&self, request: Request, options: &DispatchOptions) -> Result<Response>;
}
