//! Async client and the configuration shared with [`blocking::Client`].
//!
//! ```rust,ignore
//! use herald::{Auth, Client};
//!
//! let client = Client::builder()
//!     .base_url("http://localhost:8080")
//!     .auth(Auth::digest("user", "pass"))
//!     .follow_redirects(true)
//!     .build()?;
//!
//! let resp = client.post("/digest-auth/auth/user/pass").json(&body).send().await?;
//! println!("{} after {} rounds", resp.status, resp.history().len());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use serde::Serialize;
use url::Url;

use crate::auth::Auth;
use crate::blocking;
use crate::content::Body;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::hooks::EventHooks;
use crate::pipeline::{self, Exchange, PipelineConfig, DEFAULT_MAX_REDIRECTS};
use crate::request::Request;
use crate::response::Response;
use crate::stream::DEFAULT_CHUNK_SIZE;
use crate::timeouts::Timeouts;
use crate::transport::{
    AsyncTransport, BlockingTransport, DispatchOptions, HyperTransport, Transport,
};
use crate::version::HttpVersion;

/// Client-wide defaults applied to every request.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Option<Url>,
    pub headers: Headers,
    pub query: Vec<(String, String)>,
    pub auth: Auth,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub timeouts: Timeouts,
    pub chunk_size: usize,
    pub hooks: EventHooks,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            headers: Headers::new(),
            query: Vec::new(),
            auth: Auth::None,
            follow_redirects: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeouts: Timeouts::api_defaults(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            hooks: EventHooks::new(),
        }
    }
}

impl ClientConfig {
    /// Resolve `url` against the base URL and append the default query.
    fn merge_url(&self, url: &str, query: &[(String, String)]) -> Result<Url> {
        let mut merged = match Url::parse(url) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base.join(url)?,
                None => return Err(Error::invalid_url(format!("relative URL {:?} without base_url", url))),
            },
            Err(e) => return Err(Error::invalid_url(format!("{}: {}", url, e))),
        };
        if !self.query.is_empty() || !query.is_empty() {
            let mut pairs = merged.query_pairs_mut();
            for (k, v) in self.query.iter().chain(query) {
                pairs.append_pair(k, v);
            }
        }
        Ok(merged)
    }
}

/// Builder for [`Client`] and [`blocking::Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    base_url: Option<String>,
    version: HttpVersion,
    transport: Option<Arc<dyn AsyncTransport>>,
    blocking_transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            base_url: None,
            version: HttpVersion::default(),
            transport: None,
            blocking_transport: None,
        }
    }

    /// Resolve relative request URLs against `url`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    pub fn default_headers(mut self, headers: Headers) -> Self {
        self.config.headers.merge(&headers);
        self
    }

    /// Query pair appended to every request URL.
    pub fn default_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.query.push((key.into(), value.into()));
        self
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.config.auth = auth;
        self
    }

    /// Follow redirects instead of returning them. Off by default.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Size of the chunks streamed bodies are delivered in.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size.max(1);
        self
    }

    /// Protocol for the default hyper transport.
    pub fn http_version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    pub fn on_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request) + Send + Sync + 'static,
    {
        self.config.hooks.on_request(hook);
        self
    }

    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Response) + Send + Sync + 'static,
    {
        self.config.hooks.on_response(hook);
        self
    }

    /// Replace the async transport.
    pub fn transport(mut self, transport: impl AsyncTransport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the blocking transport.
    pub fn blocking_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.blocking_transport = Some(Arc::new(transport));
        self
    }

    fn finish_config(&mut self) -> Result<Arc<ClientConfig>> {
        if let Some(base) = self.base_url.take() {
            self.config.base_url = Some(Url::parse(&base)?);
        }
        Ok(Arc::new(self.config.clone()))
    }

    /// Build the async client.
    pub fn build(mut self) -> Result<Client> {
        let config = self.finish_config()?;
        let transport: Arc<dyn AsyncTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::with_version(self.version)),
        };
        Ok(Client { config, transport })
    }

    /// Build the blocking client.
    pub fn build_blocking(mut self) -> Result<blocking::Client> {
        let config = self.finish_config()?;
        let transport: Arc<dyn Transport> = match self.blocking_transport {
            Some(transport) => transport,
            None => Arc::new(BlockingTransport::wrap(HyperTransport::with_version(
                self.version,
            ))?),
        };
        Ok(blocking::Client::from_parts(config, transport))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Async HTTP client. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    transport: Arc<dyn AsyncTransport>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
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
        f.debug_struct("Client").field("config", &self.config).finish()
    }
}

/// Per-call overrides on top of the client configuration.
pub struct RequestBuilder<'a, C> {
    client: &'a C,
    config: &'a ClientConfig,
    method: Method,
    url: String,
    headers: Headers,
    query: Vec<(String, String)>,
    body: Body,
    auth: Option<Auth>,
    timeouts: Option<Timeouts>,
    follow_redirects: Option<bool>,
    max_redirects: Option<usize>,
    error: Option<Error>,
}

impl<'a, C> RequestBuilder<'a, C> {
    pub(crate) fn new(client: &'a C, config: &'a ClientConfig, method: Method, url: String) -> Self {
        Self {
            client,
            config,
            method,
            url,
            headers: Headers::new(),
            query: Vec::new(),
            body: Body::empty(),
            auth: None,
            timeouts: None,
            follow_redirects: None,
            max_redirects: None,
            error: None,
        }
    }

    /// Append a header to the per-call set.
    ///
    /// Repeated calls with one name keep every value. When the request is
    /// sent, the per-call values of a name replace the client default for
    /// that name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers.iter());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body; a serialization failure surfaces from `send`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match Body::json(value) {
            Ok(body) => self.body = body,
            Err(e) => self.error = Some(e),
        }
        self
    }

    pub fn form<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, V)]) -> Self {
        self.body = Body::form(pairs);
        self
    }

    /// Total deadline for each dispatch of this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let base = self.timeouts.take().unwrap_or_else(|| self.config.timeouts.clone());
        self.timeouts = Some(base.total(timeout));
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = Some(max);
        self
    }

    fn into_exchange(self, stream: bool) -> Result<(&'a C, Exchange)> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let config = self.config;
        let url = config.merge_url(&self.url, &self.query)?;

        let mut headers = config.headers.clone();
        headers.merge(&self.headers);
        let body = self.body.encode(&mut headers);

        let mut request = Request::new(self.method, url);
        request.headers = headers;
        request.body = body;

        let exchange = Exchange {
            request,
            auth: self.auth.unwrap_or_else(|| config.auth.clone()),
            config: PipelineConfig {
                follow_redirects: self.follow_redirects.unwrap_or(config.follow_redirects),
                max_redirects: self.max_redirects.unwrap_or(config.max_redirects),
                hooks: config.hooks.clone(),
            },
            dispatch: DispatchOptions {
                timeouts: self.timeouts.unwrap_or_else(|| config.timeouts.clone()),
                chunk_size: config.chunk_size,
            },
            stream,
        };
        Ok((self.client, exchange))
    }
}

impl RequestBuilder<'_, Client> {
    /// Send and read the whole final body.
    pub async fn send(self) -> Result<Response> {
        let (client, exchange) = self.into_exchange(false)?;
        pipeline::execute(client.transport.as_ref(), exchange).await
    }

    /// Send and leave the final body to be pulled with [`Response::chunk`]
    /// or [`Response::bytes_stream`].
    pub async fn stream(self) -> Result<Response> {
        let (client, exchange) = self.into_exchange(true)?;
        pipeline::execute(client.transport.as_ref(), exchange).await
    }
}

impl RequestBuilder<'_, blocking::Client> {
    /// Send and read the whole final body.
    pub fn send(self) -> Result<Response> {
        let (client, exchange) = self.into_exchange(false)?;
        pipeline::execute_blocking(client.transport(), exchange)
    }

    /// Send and leave the final body to be pulled with
    /// [`Response::chunk_blocking`].
    pub fn stream(self) -> Result<Response> {
        let (client, exchange) = self.into_exchange(true)?;
        pipeline::execute_blocking(client.transport(), exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockResponse, MockTransport};

    fn client(mock: &MockTransport) -> Client {
        Client::builder()
            .base_url("http://api.test/v1/")
            .default_header("User-Agent", "herald-test")
            .default_query("key", "k")
            .transport(mock.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_url_and_header_merge() {
        let mock = MockTransport::new(|_| MockResponse::new(200).body("ok"));
        let resp = client(&mock)
            .get("items")
            .query("page", "2")
            .header("user-agent", "override")
            .header("Accept", "text/plain")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text().unwrap(), "ok");

        let sent = &mock.requests()[0];
        assert_eq!(sent.url.as_str(), "http://api.test/v1/items?key=k&page=2");
        assert_eq!(sent.headers.get_all("user-agent"), vec!["override"]);
        assert_eq!(sent.headers.get("accept"), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_repeated_header_keeps_every_value() {
        let mock = MockTransport::new(|_| MockResponse::new(200));
        client(&mock)
            .get("items")
            .header("User-Agent", "first")
            .header("user-agent", "second")
            .send()
            .await
            .unwrap();
        let sent = &mock.requests()[0];
        assert_eq!(sent.headers.get_all("user-agent"), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_json_body_sets_headers() {
        let mock = MockTransport::new(|_| MockResponse::new(201));
        client(&mock)
            .post("http://other.test/things")
            .json(&serde_json::json!({"name": "x"}))
            .send()
            .await
            .unwrap();
        let sent = &mock.requests()[0];
        assert_eq!(sent.url.host_str(), Some("other.test"));
        assert_eq!(sent.headers.get("content-type"), Some("application/json"));
        assert_eq!(sent.headers.get("content-length"), Some("12"));
        assert_eq!(sent.body.as_deref(), Some(&br#"{"name":"x"}"#[..]));
    }

    #[tokio::test]
    async fn test_relative_url_without_base_is_invalid() {
        let mock = MockTransport::new(|_| MockResponse::new(200));
        let client = Client::builder().transport(mock).build().unwrap();
        assert!(matches!(
            client.get("/nowhere").send().await,
            Err(Error::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_per_call_redirect_override() {
        let mock = MockTransport::new(|req| match req.url.path() {
            "/v1/start" => MockResponse::redirect(307, "/v1/end"),
            _ => MockResponse::new(200).body("end"),
        });
        let c = client(&mock);
        let resp = c.get("start").send().await.unwrap();
        assert_eq!(resp.status, 307);
        assert!(resp.next_request().is_some());

        let resp = c.get("start").follow_redirects(true).send().await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.history().len(), 1);
    }

    #[test]
    fn test_timeout_override_keeps_other_defaults() {
        let mock = MockTransport::new(|_| MockResponse::new(200));
        let c = client(&mock);
        let builder = c.get("x").timeout(Duration::from_secs(3));
        let (_, exchange) = builder.into_exchange(false).unwrap();
        assert_eq!(exchange.dispatch.timeouts.total, Some(Duration::from_secs(3)));
        assert_eq!(exchange.dispatch.timeouts.connect, Timeouts::api_defaults().connect);
    }
}
