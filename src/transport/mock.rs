//! Scripted in-process transport.
//!
//! Every dispatch is recorded and answered by a caller-supplied closure.
//! Bodies are pushed from a separate thread, piece by piece, so readers
//! exercise the same bridge as with a real connection.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use url::Url;

use crate::error::{NetworkError, Result};
use crate::headers::Headers;
use crate::request::Request;
use crate::response::Response;
use crate::stream;
use crate::transport::{AsyncTransport, DispatchOptions, Transport};

/// Canned answer for one dispatch.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Headers,
    /// Body as pushed by the producer, one write per piece.
    pub pieces: Vec<Bytes>,
    /// Completion error delivered after the pieces.
    pub error: Option<NetworkError>,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            pieces: Vec::new(),
            error: None,
        }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::new(status).header("Location", location)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.pieces = vec![body.into()];
        self
    }

    pub fn pieces<I, B>(mut self, pieces: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.pieces = pieces.into_iter().map(Into::into).collect();
        self
    }

    pub fn fail_with(mut self, error: NetworkError) -> Self {
        self.error = Some(error);
        self
    }
}

/// What the mock saw for one dispatch.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    /// `None` when the body was a stream.
    pub body: Option<Bytes>,
}

type Handler = dyn Fn(&Request) -> MockResponse + Send + Sync;

#[derive(Clone)]
pub struct MockTransport {
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> MockResponse + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Dispatches seen so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().expect("mock log mutex poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().expect("mock log mutex poisoned").len()
    }

    fn respond(&self, request: Request, options: &DispatchOptions) -> Result<Response> {
        self.log
            .lock()
            .expect("mock log mutex poisoned")
            .push(RecordedRequest {
                method: request.method.clone(),
                url: request.url.clone(),
                headers: request.headers.clone(),
                body: match &request.body {
                    crate::request::RequestBody::Empty => Some(Bytes::new()),
                    other => other.as_bytes().cloned(),
                },
            });

        let MockResponse {
            status,
            headers,
            pieces,
            error,
        } = (self.handler)(&request);
        tracing::trace!(method = %request.method, url = %request.url, status, "mock dispatch");

        let (mut writer, reader) = stream::channel(options.chunk_size);
        std::thread::spawn(move || {
            for piece in pieces {
                if writer.write_blocking(&piece).is_err() {
                    return;
                }
            }
            let _ = writer.finish_blocking(error);
        });

        Ok(Response::streaming(status, headers, reader, request.url))
    }
}

#[async_trait]
impl AsyncTransport for MockTransport {
    async fn dispatch(&self, request: Request, options: &DispatchOptions) -> Result<Response> {
        self.respond(request, options)
    }
}

impl Transport for MockTransport {
    fn dispatch(&self, request: Request, options: &DispatchOptions) -> Result<Response> {
        self.respond(request, options)
    }
}
