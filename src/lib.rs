//! # Herald
//!
//! HTTP client core: authentication negotiation, redirect following and
//! streamed response bodies, with identical behavior for async and
//! blocking callers.
//!
//! - [`auth`]: API key, Basic, Bearer, Digest (RFC 7616) and custom strategies
//! - [`redirect`]: method rewriting, URL resolution, credential stripping
//! - [`pipeline`]: the auth-round / redirect-hop state machine
//! - [`stream`]: push-to-pull body bridge with fixed-size chunks
//! - [`transport`]: hyper-based, blocking and mock transports

pub mod auth;
pub mod blocking;
pub mod client;
pub mod content;
pub mod error;
pub mod headers;
pub mod hooks;
pub mod pipeline;
pub mod redirect;
pub mod request;
pub mod response;
pub mod stream;
pub mod timeouts;
pub mod transport;
pub mod version;

// Re-exports
pub use auth::{Auth, AuthFlow, AuthRound, AuthStrategy, DigestAlgorithm, DigestAuth};
pub use client::{Client, ClientBuilder, ClientConfig, RequestBuilder};
pub use content::Body;
pub use error::{Error, NetworkError, NetworkErrorCode, Result};
pub use headers::Headers;
pub use hooks::EventHooks;
pub use request::{Request, RequestBody};
pub use response::Response;
pub use timeouts::Timeouts;
pub use version::HttpVersion;
