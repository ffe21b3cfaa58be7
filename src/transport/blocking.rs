//! Blocking adapter over an async transport.
//!
//! Owns a small multi-threaded tokio runtime. The calling thread parks on
//! a oneshot until the response head is in; the body keeps flowing on the
//! runtime's worker threads while the caller pulls chunks with
//! [`Response::chunk_blocking`].
//!
//! Do not call from inside an async context.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;

use crate::error::{Error, NetworkErrorCode, Result};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{AsyncTransport, DispatchOptions, HyperTransport, Transport};

pub struct BlockingTransport<T = HyperTransport> {
    inner: Arc<T>,
    runtime: Runtime,
}

impl BlockingTransport<HyperTransport> {
    /// Blocking transport over a default [`HyperTransport`].
    pub fn new() -> Result<Self> {
        Self::wrap(HyperTransport::new())
    }
}

impl<T: AsyncTransport + 'static> BlockingTransport<T> {
    /// Drive `inner` from a private runtime.
    pub fn wrap(inner: T) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("herald-blocking")
            .enable_all()
            .build()?;
        Ok(Self {
            inner: Arc::new(inner),
            runtime,
        })
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: AsyncTransport + 'static> Transport for BlockingTransport<T> {
    fn dispatch(&self, request: Request, options: &DispatchOptions) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        let inner = self.inner.clone();
        let options = options.clone();
        self.runtime.spawn(async move {
            let _ = tx.send(inner.dispatch(request, &options).await);
        });
        rx.blocking_recv().map_err(|_| {
            Error::network(NetworkErrorCode::Aborted, "dispatch task ended without a response")
        })?
    }
}

impl<T> fmt::Debug for BlockingTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingTransport").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockResponse, MockTransport};
    use http::Method;

    #[test]
    fn test_dispatch_from_plain_thread() {
        let mock = MockTransport::new(|_| MockResponse::new(204).body("x"));
        let transport = BlockingTransport::wrap(mock.clone()).unwrap();
        let req = Request::parse(Method::GET, "http://h/").unwrap();
        let mut resp = transport.dispatch(req, &DispatchOptions::default()).unwrap();
        assert_eq!(resp.status, 204);
        assert_eq!(resp.read_blocking().unwrap().as_ref(), b"x");
        assert_eq!(mock.request_count(), 1);
    }

    #[test]
    fn test_transport_errors_pass_through() {
        let transport = BlockingTransport::new().unwrap();
        let req = Request::parse(Method::GET, "https://example.com/").unwrap();
        let err = transport.dispatch(req, &DispatchOptions::default()).unwrap_err();
        assert_eq!(err.network_code(), Some(NetworkErrorCode::Connect));
    }
}
