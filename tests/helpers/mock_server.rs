//! Minimal httpbin-style HTTP/1.1 server for integration tests.
//!
//! One request per connection, `Connection: close` on every response.
//!
//! Routes:
//! - `/get`, `/anything/...`: echo method, target, headers and body as JSON
//! - `/status/<code>`
//! - `/absolute-redirect/<n>`, `/relative-redirect/<n>`: 302 chains ending at `/get`
//! - `/redirect-to?url=<u>&status_code=<s>`
//! - `/basic-auth/<user>/<pass>`, `/bearer`
//! - `/digest-auth/<qop>/<user>/<pass>[/<algorithm>]` (MD5 or SHA-256), echoes
//!   method and body once authenticated
//! - `/stream-bytes/<n>?chunk_size=<c>`: chunked body of `n` bytes, byte `i` is `i % 251`
//! - `/stall/<ms>`: writes half the body, sleeps, writes the rest

use std::collections::BTreeMap;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

pub const DIGEST_REALM: &str = "me@herald.test";
const DIGEST_OPAQUE: &str = "5ccc069c403ebaf9f0171e9517f40e41";

pub struct MockHttpServer {
    listener: TcpListener,
    port: u16,
}

impl MockHttpServer {
    /// Create a new mock server bound to a random port.
    pub async fn new() -> std::io::Result<Self> {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    #[allow(dead_code)]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the base URL for this server.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Start the server in a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let base = self.url();
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        tokio::spawn(handle_connection(stream, base.clone()));
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

/// Server running on its own runtime, for blocking-client tests.
#[allow(dead_code)]
pub struct BackgroundServer {
    pub url: String,
    _runtime: tokio::runtime::Runtime,
}

#[allow(dead_code)]
pub fn start_background() -> BackgroundServer {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("server runtime");
    let url = runtime.block_on(async {
        let server = MockHttpServer::new().await.expect("bind mock server");
        let url = server.url();
        server.start();
        url
    });
    BackgroundServer {
        url,
        _runtime: runtime,
    }
}

/// Install a test subscriber honoring `RUST_LOG`; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct ParsedRequest {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl ParsedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("/")
    }

    fn query(&self, key: &str) -> Option<String> {
        let query = self.target.split_once('?')?.1;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Reply {
    fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    fn json(self, value: serde_json::Value) -> Self {
        let mut reply = self.header("Content-Type", "application/json");
        reply.body = value.to_string().into_bytes();
        reply
    }
}

async fn handle_connection(mut stream: TcpStream, base: String) {
    let request = match timeout(Duration::from_secs(5), read_request(&mut stream)).await {
        Ok(Ok(Some(request))) => request,
        Ok(Err(e)) => {
            tracing::error!("Read error: {}", e);
            return;
        }
        _ => return,
    };

    let path = request.path().to_string();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let result = match segments.as_slice() {
        ["stream-bytes", n] => stream_bytes(&mut stream, &request, n).await,
        ["stall", ms] => stall(&mut stream, ms).await,
        _ => {
            let reply = route(&request, &segments, &base);
            write_reply(&mut stream, &request, reply).await
        }
    };
    if let Err(e) = result {
        tracing::debug!("Write error: {}", e);
    }
    let _ = stream.shutdown().await;
}

fn route(request: &ParsedRequest, segments: &[&str], base: &str) -> Reply {
    match segments {
        ["get"] | ["anything", ..] => echo(request),
        ["status", code] => Reply::new(code.parse().unwrap_or(400)),
        ["absolute-redirect", n] => match n.parse::<u32>() {
            Ok(0) | Ok(1) => Reply::new(302).header("Location", format!("{}/get", base)),
            Ok(n) => Reply::new(302).header("Location", format!("{}/absolute-redirect/{}", base, n - 1)),
            Err(_) => Reply::new(400),
        },
        ["relative-redirect", n] => match n.parse::<u32>() {
            Ok(0) | Ok(1) => Reply::new(302).header("Location", "/get"),
            Ok(n) => Reply::new(302).header("Location", format!("/relative-redirect/{}", n - 1)),
            Err(_) => Reply::new(400),
        },
        ["redirect-to"] => match request.query("url") {
            Some(url) => {
                let status = request
                    .query("status_code")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(302);
                Reply::new(status).header("Location", url)
            }
            None => Reply::new(400),
        },
        ["basic-auth", user, pass] => {
            let ok = request
                .header("authorization")
                .and_then(|h| h.strip_prefix("Basic "))
                .and_then(|encoded| BASE64.decode(encoded.trim()).ok())
                .map(|decoded| decoded == format!("{}:{}", user, pass).into_bytes())
                .unwrap_or(false);
            if ok {
                Reply::new(200).json(serde_json::json!({"authenticated": true, "user": user}))
            } else {
                Reply::new(401).header("WWW-Authenticate", "Basic realm=\"Fake Realm\"")
            }
        }
        ["bearer"] => match request.header("authorization") {
            Some(h) if h.starts_with("Bearer ") => {
                Reply::new(200).json(serde_json::json!({"authenticated": true, "token": &h[7..]}))
            }
            _ => Reply::new(401).header("WWW-Authenticate", "Bearer"),
        },
        ["digest-auth", qop, user, pass] => digest_auth(request, qop, user, pass, "MD5"),
        ["digest-auth", qop, user, pass, algorithm] => {
            digest_auth(request, qop, user, pass, algorithm)
        }
        _ => Reply::new(404),
    }
}

fn echo(request: &ParsedRequest) -> Reply {
    let headers: BTreeMap<String, String> = request
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect();
    Reply::new(200).json(serde_json::json!({
        "method": request.method,
        "url": request.target,
        "headers": headers,
        "data": String::from_utf8_lossy(&request.body),
    }))
}

fn hash(algorithm: &str, data: &str) -> String {
    if algorithm.eq_ignore_ascii_case("SHA-256") {
        hex::encode(Sha256::digest(data.as_bytes()))
    } else {
        hex::encode(Md5::digest(data.as_bytes()))
    }
}

fn digest_auth(request: &ParsedRequest, qop: &str, user: &str, pass: &str, algorithm: &str) -> Reply {
    let challenge = || {
        let nonce = hex::encode(rand::random::<[u8; 16]>());
        Reply::new(401).header(
            "WWW-Authenticate",
            format!(
                "Digest realm=\"{}\", nonce=\"{}\", qop=\"{}\", opaque=\"{}\", algorithm={}",
                DIGEST_REALM, nonce, qop, DIGEST_OPAQUE, algorithm
            ),
        )
    };

    let params = match request
        .header("authorization")
        .and_then(|h| h.strip_prefix("Digest "))
        .and_then(|rest| herald::auth::challenge::parse_auth_params(rest).ok())
    {
        Some(params) => params,
        None => return challenge(),
    };
    let get = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    };

    let ha1 = hash(algorithm, &format!("{}:{}:{}", user, DIGEST_REALM, pass));
    let ha2 = hash(algorithm, &format!("{}:{}", request.method, get("uri")));
    let expected = hash(
        algorithm,
        &format!(
            "{}:{}:{}:{}:{}:{}",
            ha1,
            get("nonce"),
            get("nc"),
            get("cnonce"),
            get("qop"),
            ha2
        ),
    );

    let valid = get("username") == user
        && get("uri") == request.target
        && get("opaque") == DIGEST_OPAQUE
        && get("response") == expected;
    if valid {
        Reply::new(200).json(serde_json::json!({
            "authenticated": true,
            "user": user,
            "method": request.method,
            "data": String::from_utf8_lossy(&request.body),
        }))
    } else {
        challenge()
    }
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<ParsedRequest>> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or("/").to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&tmp[..n]);
    }
    body.truncate(content_length);

    Ok(Some(ParsedRequest {
        method,
        target,
        headers,
        body,
    }))
}

fn status_line(status: u16) -> String {
    let reason = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    format!("HTTP/1.1 {} {}\r\n", status, reason)
}

async fn write_reply(stream: &mut TcpStream, request: &ParsedRequest, reply: Reply) -> std::io::Result<()> {
    let mut head = status_line(reply.status);
    for (name, value) in &reply.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        reply.body.len()
    ));
    stream.write_all(head.as_bytes()).await?;
    if request.method != "HEAD" {
        stream.write_all(&reply.body).await?;
    }
    stream.flush().await
}

async fn stream_bytes(stream: &mut TcpStream, request: &ParsedRequest, n: &str) -> std::io::Result<()> {
    let total: usize = n.parse().unwrap_or(0);
    let piece: usize = request
        .query("chunk_size")
        .and_then(|c| c.parse().ok())
        .unwrap_or(10 * 1024)
        .max(1);
    let data: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();

    let head = format!(
        "{}Content-Type: application/octet-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        status_line(200)
    );
    stream.write_all(head.as_bytes()).await?;
    for part in data.chunks(piece) {
        stream.write_all(format!("{:x}\r\n", part.len()).as_bytes()).await?;
        stream.write_all(part).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;
        tokio::task::yield_now().await;
    }
    stream.write_all(b"0\r\n\r\n").await?;
    stream.flush().await
}

async fn stall(stream: &mut TcpStream, ms: &str) -> std::io::Result<()> {
    let pause = Duration::from_millis(ms.parse().unwrap_or(1000));
    let head = format!(
        "{}Content-Length: 10\r\nConnection: close\r\n\r\nhello",
        status_line(200)
    );
    stream.write_all(head.as_bytes()).await?;
    stream.flush().await?;
    tokio::time::sleep(pause).await;
    stream.write_all(b"world").await?;
    stream.flush().await
}
