//! HTTP/1.1 and HTTP/2 transport via hyper.
//!
//! Every dispatch opens its own connection; pooling is left to whoever
//! wraps this transport. Only plain `http://` is spoken here, HTTP/2 by
//! prior knowledge. The response head is returned as soon as it arrives
//! and a spawned task pumps the body into the stream bridge.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::client::conn::{http1, http2};
use hyper::header::{HeaderName, HeaderValue, HOST};
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use url::{Position, Url};

use crate::error::{Error, NetworkError, NetworkErrorCode, Result};
use crate::headers::Headers;
use crate::request::{Request, RequestBody};
use crate::response::Response;
use crate::stream::{self, ChunkWriter};
use crate::transport::{AsyncTransport, DispatchOptions};
use crate::version::HttpVersion;

type OutBody = UnsyncBoxBody<Bytes, io::Error>;

/// Single-exchange HTTP/1.1 and HTTP/2 transport.
#[derive(Debug, Clone, Default)]
pub struct HyperTransport {
    version: HttpVersion,
}

impl HyperTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speak `version` on every connection.
    pub fn with_version(version: HttpVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    fn build_request(&self, request: Request) -> Result<hyper::Request<OutBody>> {
        // HTTP/1.1 wants origin-form; HTTP/2 needs scheme and authority.
        let target = match self.version {
            HttpVersion::Http1_1 => &request.url[Position::BeforePath..Position::AfterQuery],
            HttpVersion::Http2 => &request.url[..Position::AfterQuery],
        };
        let mut builder = hyper::Request::builder()
            .method(request.method.clone())
            .uri(target)
            .version(self.version.to_http());

        let headers = builder
            .headers_mut()
            .ok_or_else(|| Error::invalid_request(format!("invalid request target {:?}", target)))?;
        for (name, value) in request.headers.iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::invalid_request(format!("invalid header name {:?}: {}", name, e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| Error::invalid_request(format!("invalid value for {}: {}", name, e)))?;
            headers.append(header_name, header_value);
        }
        if self.version == HttpVersion::Http1_1 && !headers.contains_key(HOST) {
            let host = HeaderValue::from_str(&host_header(&request.url)?)
                .map_err(|e| Error::invalid_url(e.to_string()))?;
            headers.insert(HOST, host);
        }

        let body: OutBody = match request.body {
            RequestBody::Empty => Empty::<Bytes>::new()
                .map_err(|never: Infallible| -> io::Error { match never {} })
                .boxed_unsync(),
            RequestBody::Bytes(bytes) => Full::new(bytes)
                .map_err(|never: Infallible| -> io::Error { match never {} })
                .boxed_unsync(),
            RequestBody::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync(),
        };

        builder
            .body(body)
            .map_err(|e| Error::invalid_request(format!("Failed to build request: {}", e)))
    }

    async fn send(
        &self,
        stream: TcpStream,
        request: hyper::Request<OutBody>,
    ) -> Result<hyper::Response<Incoming>> {
        let io = TokioIo::new(stream);
        match self.version {
            HttpVersion::Http1_1 => {
                let (mut sender, conn) = http1::handshake(io)
                    .await
                    .map_err(|e| hyper_error("HTTP/1.1 handshake failed", &e))?;
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::debug!("HTTP/1.1 connection error: {}", e);
                    }
                });
                sender
                    .send_request(request)
                    .await
                    .map_err(|e| hyper_error("HTTP/1.1 request failed", &e))
            }
            HttpVersion::Http2 => {
                let (mut sender, conn) = http2::Builder::new(TokioExecutor::new())
                    .handshake(io)
                    .await
                    .map_err(|e| hyper_error("HTTP/2 handshake failed", &e))?;
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::debug!("HTTP/2 connection error: {}", e);
                    }
                });
                sender
                    .send_request(request)
                    .await
                    .map_err(|e| hyper_error("HTTP/2 request failed", &e))
            }
        }
    }
}

#[async_trait]
impl AsyncTransport for HyperTransport {
    async fn dispatch(&self, request: Request, options: &DispatchOptions) -> Result<Response> {
        let timeouts = &options.timeouts;
        let deadline = timeouts.total.map(|total| Instant::now() + total);
        let url = request.url.clone();
        let hyper_request = self.build_request(request)?;

        let head = async {
            let stream = connect(&url).await?;
            self.send(stream, hyper_request).await
        };
        let head = until(
            deadline,
            limited(timeouts.connect, NetworkErrorCode::ConnectTimeout, head),
        )
        .await?;

        let (parts, body) = head.into_parts();
        let mut headers = Headers::new();
        for (name, value) in parts.headers.iter() {
            let value = value.to_str().map_err(|_| {
                Error::invalid_response(format!("non-ASCII value for header {}", name))
            })?;
            headers.append(name.as_str(), value);
        }
        tracing::debug!(status = parts.status.as_u16(), version = ?parts.version, %url, "response head");

        let (writer, reader) = stream::channel(options.chunk_size);
        tokio::spawn(pump(body, writer, timeouts.read_idle, deadline));

        Ok(Response::streaming(parts.status.as_u16(), headers, reader, url).with_version(parts.version))
    }
}

async fn connect(url: &Url) -> Result<TcpStream> {
    match url.scheme() {
        "http" => {}
        "https" => {
            return Err(Error::network(
                NetworkErrorCode::Connect,
                format!("{}: https needs a TLS-capable transport", url),
            ))
        }
        other => return Err(Error::invalid_url(format!("unsupported scheme {:?}", other))),
    }
    let host = url
        .host_str()
        .ok_or_else(|| Error::invalid_url(format!("{} has no host", url)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = url.port_or_known_default().unwrap_or(80);

    let stream = TcpStream::connect((host, port)).await.map_err(|e| {
        Error::network(NetworkErrorCode::Connect, format!("{}:{}: {}", host, port, e))
    })?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::invalid_url(format!("{} has no host", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Push body frames into the bridge until the body ends, fails or the
/// reader goes away.
async fn pump(
    mut body: Incoming,
    mut writer: ChunkWriter,
    read_idle: Option<Duration>,
    deadline: Option<Instant>,
) {
    let outcome = loop {
        let next = until(
            deadline,
            limited(read_idle, NetworkErrorCode::ReadTimeout, async {
                Ok(body.frame().await)
            }),
        )
        .await;
        match next {
            Ok(None) => break None,
            Ok(Some(Ok(frame))) => {
                if let Ok(data) = frame.into_data() {
                    if writer.write(&data).await.is_err() {
                        tracing::trace!("body reader closed, dropping connection");
                        return;
                    }
                }
            }
            Ok(Some(Err(e))) => break Some(network_error("body read failed", &e)),
            Err(Error::Network(e)) => break Some(e),
            Err(e) => break Some(NetworkError::new(NetworkErrorCode::Other, e.to_string())),
        }
    };
    if let Some(e) = &outcome {
        tracing::debug!(error = %e, "response body failed");
    }
    let _ = writer.finish(outcome).await;
}

async fn limited<T, F>(limit: Option<Duration>, code: NetworkErrorCode, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => timeout(limit, future)
            .await
            .map_err(|_| Error::network(code, format!("timed out after {:?}", limit)))?,
        None => future.await,
    }
}

async fn until<T, F>(deadline: Option<Instant>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(deadline) => timeout_at(deadline, future).await.map_err(|_| {
            Error::network(NetworkErrorCode::TotalTimeout, "total deadline exceeded")
        })?,
        None => future.await,
    }
}

fn network_error(context: &str, err: &hyper::Error) -> NetworkError {
    let code = if err.is_timeout() {
        NetworkErrorCode::ReadTimeout
    } else if err.is_incomplete_message() || err.is_closed() {
        NetworkErrorCode::ConnectionReset
    } else if err.is_parse() {
        NetworkErrorCode::Protocol
    } else if err.is_canceled() {
        NetworkErrorCode::Aborted
    } else {
        NetworkErrorCode::Other
    };
    NetworkError::new(code, format!("{}: {}", context, err))
}

fn hyper_error(context: &str, err: &hyper::Error) -> Error {
    Error::Network(network_error(context, err))
}
