//! Timeout configuration for request dispatch.
//!
//! # Timeout Types
//!
//! - **connect**: connection establishment up to the response head
//! - **read_idle**: maximum time between body chunks (resets on each chunk)
//! - **total**: absolute deadline for one dispatch, body included
//!
//! Expiry of any of them surfaces as [`Error::Network`](crate::Error::Network)
//! with the matching code. Nothing is retried.
//!
//! # Usage
//!
//! ```rust,ignore
//! use herald::{Client, Timeouts};
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .timeouts(Timeouts::streaming_defaults())
//!     .build()?;
//!
//! let resp = client
//!     .get("http://localhost:8080/stream-bytes/4096")
//!     .timeouts(Timeouts::new().read_idle(Duration::from_secs(5)))
//!     .send()
//!     .await?;
//! ```

use std::time::Duration;

/// Timeout configuration for a single dispatch.
///
/// All timeouts are optional. When `None`, no timeout is applied for that phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for connecting and receiving the response head. Does NOT reset.
    pub connect: Option<Duration>,

    /// Maximum wait for the next body chunk.
    ///
    /// **This timeout resets on each chunk received.** It detects hung
    /// streams without killing healthy long-running transfers.
    pub read_idle: Option<Duration>,

    /// Absolute limit for the whole exchange, body download included.
    ///
    /// For streaming responses, you typically want this disabled (None) and
    /// rely on read_idle instead.
    pub total: Option<Duration>,
}

impl Timeouts {
    /// Create a new Timeouts with all timeouts set to None.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sensible defaults for normal API calls.
    ///
    /// - connect: 10s
    /// - read_idle: 30s
    /// - total: 120s
    pub fn api_defaults() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            read_idle: Some(Duration::from_secs(30)),
            total: Some(Duration::from_secs(120)),
        }
    }

    /// Defaults for long-lived streamed downloads.
    ///
    /// - connect: 10s
    /// - read_idle: 120s
    /// - total: None
    pub fn streaming_defaults() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            read_idle: Some(Duration::from_secs(120)),
            total: None,
        }
    }

    /// Set connect timeout.
    pub fn connect(mut self, timeout: Duration) -> Self {
        self.connect = Some(timeout);
        self
    }

    /// Set read idle timeout.
    pub fn read_idle(mut self, timeout: Duration) -> Self {
        self.read_idle = Some(timeout);
        self
    }

    /// Set total deadline.
    pub fn total(mut self, timeout: Duration) -> Self {
        self.total = Some(timeout);
        self
    }

    pub fn no_connect_timeout(mut self) -> Self {
        self.connect = None;
        self
    }

    pub fn no_read_idle_timeout(mut self) -> Self {
        self.read_idle = None;
        self
    }

    pub fn no_total_timeout(mut self) -> Self {
        self.total = None;
        self
    }
}
