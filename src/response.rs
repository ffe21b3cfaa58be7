//! HTTP response: head, body (buffered or pulled), and history.

use std::fmt;
use std::io::Read;

use bytes::Bytes;
use futures::Stream;
use http::Version;
use url::Url;

use crate::error::{Error, NetworkError, Result};
use crate::headers::Headers;
use crate::request::Request;
use crate::stream::ChunkReader;

enum Body {
    Buffered(Bytes),
    Streaming(ChunkReader),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
            Self::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// Response to one dispatch attempt.
///
/// The final response of a `send` carries every earlier response of the
/// same logical request in [`history`](Self::history).
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    url: Url,
    version: Version,
    body: Body,
    history: Vec<Response>,
    next_request: Option<Request>,
    error: Option<NetworkError>,
}

impl Response {
    /// Response with a fully buffered body.
    pub fn new(status: u16, headers: Headers, body: Bytes, url: Url) -> Self {
        Self::with_body(status, headers, Body::Buffered(body), url)
    }

    /// Response whose body arrives through `reader`.
    pub fn streaming(status: u16, headers: Headers, reader: ChunkReader, url: Url) -> Self {
        Self::with_body(status, headers, Body::Streaming(reader), url)
    }

    fn with_body(status: u16, headers: Headers, body: Body, url: Url) -> Self {
        Self {
            status,
            headers,
            url,
            version: Version::HTTP_11,
            body,
            history: Vec::new(),
            next_request: None,
            error: None,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// URL this response was received from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get("Location")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.headers.get("Content-Encoding")
    }

    /// Earlier responses of the same logical request, oldest first.
    pub fn history(&self) -> &[Response] {
        &self.history
    }

    pub(crate) fn set_history(&mut self, history: Vec<Response>) {
        self.history = history;
    }

    /// Redirect that was detected but not followed.
    pub fn next_request(&self) -> Option<&Request> {
        self.next_request.as_ref()
    }

    pub fn take_next_request(&mut self) -> Option<Request> {
        self.next_request.take()
    }

    pub(crate) fn set_next_request(&mut self, request: Request) {
        self.next_request = Some(request);
    }

    /// Transport failure that cut the body short, if any.
    pub fn error(&self) -> Option<&NetworkError> {
        self.error.as_ref()
    }

    /// Error out on 4xx/5xx.
    pub fn error_for_status(self) -> Result<Self> {
        if (400..600).contains(&self.status) {
            let reason = http::StatusCode::from_u16(self.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("error");
            return Err(Error::http_status(self.status, reason));
        }
        Ok(self)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Streaming(_))
    }

    /// Buffered body, once it has been read.
    pub fn body(&self) -> Result<&Bytes> {
        match &self.body {
            Body::Buffered(b) => Ok(b),
            Body::Streaming(_) => Err(Error::ResponseNotRead),
        }
    }

    pub fn into_body(self) -> Result<Bytes> {
        match self.body {
            Body::Buffered(b) => Ok(b),
            Body::Streaming(_) => Err(Error::ResponseNotRead),
        }
    }

    fn record(&mut self, result: Result<Bytes>) -> Result<&Bytes> {
        match result {
            Ok(bytes) => {
                self.body = Body::Buffered(bytes);
                self.body()
            }
            Err(err) => {
                if let Error::Network(net) = &err {
                    self.error = Some(net.clone());
                }
                Err(err)
            }
        }
    }

    /// Read the rest of a streamed body into memory.
    pub async fn read(&mut self) -> Result<&Bytes> {
        if let Body::Streaming(reader) = &mut self.body {
            let result = reader.collect().await;
            return self.record(result);
        }
        self.body()
    }

    /// Blocking variant of [`read`](Self::read).
    pub fn read_blocking(&mut self) -> Result<&Bytes> {
        if let Body::Streaming(reader) = &mut self.body {
            let result = reader.collect_blocking();
            return self.record(result);
        }
        self.body()
    }

    fn pulled(&mut self, result: Result<Option<Bytes>>) -> Result<Option<Bytes>> {
        if let Err(Error::Network(net)) = &result {
            self.error = Some(net.clone());
        }
        result
    }

    /// Pull the next chunk of a streamed body.
    ///
    /// A buffered body is handed out as a single chunk.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        let result = match &mut self.body {
            Body::Buffered(b) => Ok(take_buffered(b)),
            Body::Streaming(reader) => reader.next().await,
        };
        self.pulled(result)
    }

    /// Blocking variant of [`chunk`](Self::chunk).
    pub fn chunk_blocking(&mut self) -> Result<Option<Bytes>> {
        let result = match &mut self.body {
            Body::Buffered(b) => Ok(take_buffered(b)),
            Body::Streaming(reader) => reader.next_blocking(),
        };
        self.pulled(result)
    }

    /// Consume the response as an async stream of chunks.
    pub fn bytes_stream(self) -> impl Stream<Item = Result<Bytes>> + Send {
        futures::stream::unfold(self, |mut resp| async move {
            match resp.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), resp)),
                Ok(None) => None,
                Err(e) => Some((Err(e), resp)),
            }
        })
    }

    /// Stop reading a streamed body; the transport is told to drop the rest.
    pub(crate) fn close_body(&mut self) {
        if let Body::Streaming(reader) = &mut self.body {
            reader.close();
            self.body = Body::Buffered(Bytes::new());
        }
    }

    /// Decode body based on Content-Encoding (gzip, deflate, br, zstd).
    pub fn decoded_body(&self) -> Result<Bytes> {
        let body = self.body()?;
        match self.content_encoding().map(|s| s.to_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => decode_gzip(body),
            Some("deflate") => decode_deflate(body),
            Some("br") => decode_brotli(body),
            Some("zstd") => decode_zstd(body),
            _ => Ok(body.clone()),
        }
    }

    pub fn text(&self) -> Result<String> {
        let decoded = self.decoded_body()?;
        String::from_utf8(decoded.to_vec())
            .map_err(|e| Error::Decompression(format!("UTF-8 decode error: {}", e)))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let decoded = self.decoded_body()?;
        serde_json::from_slice(&decoded).map_err(Error::from)
    }
}

fn take_buffered(b: &mut Bytes) -> Option<Bytes> {
    if b.is_empty() {
        None
    } else {
        Some(std::mem::take(b))
    }
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("gzip: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_deflate(data: &[u8]) -> Result<Bytes> {
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .is_ok()
    {
        return Ok(Bytes::from(decoded));
    }
    // Some servers send raw deflate without the zlib wrapper.
    decoded.clear();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("deflate: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> Result<Bytes> {
    let mut decoder = brotli::Decompressor::new(data, 4096);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("brotli: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_zstd(data: &[u8]) -> Result<Bytes> {
    zstd::stream::decode_all(data)
        .map(Bytes::from)
        .map_err(|e| Error::Decompression(format!("zstd: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkErrorCode;
    use crate::stream;
    use std::io::Write;

    fn url() -> Url {
        Url::parse("http://example.com/").unwrap()
    }

    #[test]
    fn test_gzip_decoding() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"hello gzip").unwrap();
        let compressed = enc.finish().unwrap();

        let mut headers = Headers::new();
        headers.insert("Content-Encoding", "gzip");
        let resp = Response::new(200, headers, Bytes::from(compressed), url());
        assert_eq!(resp.text().unwrap(), "hello gzip");
    }

    #[test]
    fn test_streaming_body_must_be_read_first() {
        let (mut writer, reader) = stream::channel(4);
        let mut resp = Response::streaming(200, Headers::new(), reader, url());
        assert!(matches!(resp.body(), Err(Error::ResponseNotRead)));

        writer.write_blocking(b"abcdef").unwrap();
        writer.finish_blocking(None).unwrap();
        assert_eq!(resp.read_blocking().unwrap().as_ref(), b"abcdef");
        assert_eq!(resp.text().unwrap(), "abcdef");
    }

    #[test]
    fn test_stream_failure_is_attached() {
        let (mut writer, reader) = stream::channel(4);
        let mut resp = Response::streaming(200, Headers::new(), reader, url());
        writer.write_blocking(b"abcd").unwrap();
        writer
            .finish_blocking(Some(NetworkError::new(NetworkErrorCode::ReadTimeout, "idle")))
            .unwrap();

        assert_eq!(resp.chunk_blocking().unwrap().unwrap().as_ref(), b"abcd");
        assert!(resp.chunk_blocking().is_err());
        assert_eq!(resp.error().map(|e| e.code), Some(NetworkErrorCode::ReadTimeout));
    }

    #[test]
    fn test_error_for_status() {
        let resp = Response::new(404, Headers::new(), Bytes::new(), url());
        match resp.error_for_status() {
            Err(Error::HttpStatus { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "Not Found");
            }
            other => panic!("unexpected: {:?}", other),
        }
        let ok = Response::new(204, Headers::new(), Bytes::new(), url());
        assert!(ok.error_for_status().is_ok());
    }

    #[test]
    fn test_buffered_body_is_one_chunk() {
        let mut resp = Response::new(200, Headers::new(), Bytes::from_static(b"xyz"), url());
        assert_eq!(resp.chunk_blocking().unwrap().unwrap().as_ref(), b"xyz");
        assert!(resp.chunk_blocking().unwrap().is_none());
    }
}
