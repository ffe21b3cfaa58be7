//! Authentication strategies.
//!
//! Each strategy negotiates as an explicit state machine: the pipeline asks
//! an [`AuthFlow`] for the next request, sends it, and feeds the response
//! back into the next round until the flow answers [`AuthRound::Done`] or
//! hands out its [`AuthRound::Last`] request.
//!
//! RFC 7617 (Basic) and RFC 7616 (Digest) are implemented here; Bearer,
//! API key and caller-supplied transforms are single-round header setters.

pub mod challenge;
pub mod digest;
pub mod hash;

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;

pub use challenge::DigestChallenge;
pub use digest::DigestAuth;
pub use hash::DigestAlgorithm;

/// What an auth round decided.
#[derive(Debug)]
pub enum AuthRound {
    /// Send this request and report its response in the next round.
    Continue(Request),
    /// Send this request; its response ends the negotiation.
    Last(Request),
    /// Negotiation is over; the previous response is final.
    Done,
}

/// One in-progress negotiation for a single logical request.
pub trait AuthFlow: Send {
    /// Advance the negotiation.
    ///
    /// The first call receives `None`; every later call receives the
    /// terminal response to the request produced by the previous round.
    fn next_round(&mut self, response: Option<&Response>) -> Result<AuthRound>;
}

/// A pluggable authentication scheme.
pub trait AuthStrategy: Send + Sync {
    /// Buffer a streamed request body before the first round so the
    /// request can be re-sent.
    fn needs_request_body(&self) -> bool {
        false
    }

    /// Drain a streamed response before feeding it into the next round.
    fn needs_response_body(&self) -> bool {
        false
    }

    /// Start negotiating for `request`.
    fn auth_flow(&self, request: Request) -> Box<dyn AuthFlow>;
}

/// Generate Basic Auth header value (RFC 7617).
pub fn basic_auth(username: &str, password: &str) -> String {
    let plain = format!("{}:{}", username, password);
    format!("Basic {}", BASE64.encode(plain))
}

/// Parse a Basic Auth header value.
///
/// Returns (username, password) or None if invalid.
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(BASE64.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Flow that edits the request once and stops.
struct SingleRound<F> {
    request: Option<Request>,
    edit: Option<F>,
}

impl<F> SingleRound<F>
where
    F: FnOnce(Request) -> Request + Send,
{
    fn boxed(request: Request, edit: F) -> Box<dyn AuthFlow>
    where
        F: 'static,
    {
        Box::new(Self {
            request: Some(request),
            edit: Some(edit),
        })
    }
}

impl<F> AuthFlow for SingleRound<F>
where
    F: FnOnce(Request) -> Request + Send,
{
    fn next_round(&mut self, _response: Option<&Response>) -> Result<AuthRound> {
        match (self.request.take(), self.edit.take()) {
            (Some(request), Some(edit)) => Ok(AuthRound::Last(edit(request))),
            _ => Err(Error::invalid_request("auth round has no request")),
        }
    }
}

/// Forwards the request unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthStrategy for NoAuth {
    fn auth_flow(&self, request: Request) -> Box<dyn AuthFlow> {
        SingleRound::boxed(request, |r| r)
    }
}

/// Fixed header carrying an API key.
#[derive(Clone)]
pub struct ApiKeyAuth {
    header: String,
    key: String,
}

impl ApiKeyAuth {
    /// Key sent as `header: key`.
    pub fn new(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            key: key.into(),
        }
    }

    /// Key sent as `X-API-Key`.
    pub fn x_api_key(key: impl Into<String>) -> Self {
        Self::new("X-API-Key", key)
    }
}

impl AuthStrategy for ApiKeyAuth {
    fn auth_flow(&self, request: Request) -> Box<dyn AuthFlow> {
        let (header, key) = (self.header.clone(), self.key.clone());
        SingleRound::boxed(request, move |r| r.with_header(header, key))
    }
}

#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl AuthStrategy for BasicAuth {
    fn auth_flow(&self, request: Request) -> Box<dyn AuthFlow> {
        let value = basic_auth(&self.username, &self.password);
        SingleRound::boxed(request, move |r| r.with_header("Authorization", value))
    }
}

#[derive(Clone)]
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl AuthStrategy for BearerAuth {
    fn auth_flow(&self, request: Request) -> Box<dyn AuthFlow> {
        let value = format!("Bearer {}", self.token);
        SingleRound::boxed(request, move |r| r.with_header("Authorization", value))
    }
}

/// Caller-supplied request transform.
pub type AuthFn = Arc<dyn Fn(Request) -> Request + Send + Sync>;

#[derive(Clone)]
pub struct FunctionAuth {
    transform: AuthFn,
}

impl FunctionAuth {
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(Request) -> Request + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
        }
    }
}

impl AuthStrategy for FunctionAuth {
    fn auth_flow(&self, request: Request) -> Box<dyn AuthFlow> {
        let transform = self.transform.clone();
        SingleRound::boxed(request, move |r| transform(r))
    }
}

/// Authentication configured on a client or a single request.
#[derive(Clone, Default)]
pub enum Auth {
    #[default]
    None,
    ApiKey(ApiKeyAuth),
    Basic(BasicAuth),
    Bearer(BearerAuth),
    Digest(DigestAuth),
    Function(FunctionAuth),
    /// Any other [`AuthStrategy`].
    Custom(Arc<dyn AuthStrategy>),
}

impl Auth {
    pub fn api_key(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ApiKey(ApiKeyAuth::new(header, key))
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic(BasicAuth::new(username, password))
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(BearerAuth::new(token))
    }

    /// Digest credentials with a fresh session.
    ///
    /// Clones of the returned value share the cached challenge and nonce
    /// counter.
    pub fn digest(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Digest(DigestAuth::new(username, password))
    }

    pub fn function<F>(transform: F) -> Self
    where
        F: Fn(Request) -> Request + Send + Sync + 'static,
    {
        Self::Function(FunctionAuth::new(transform))
    }

    pub fn custom(strategy: impl AuthStrategy + 'static) -> Self {
        Self::Custom(Arc::new(strategy))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    fn strategy(&self) -> &dyn AuthStrategy {
        match self {
            Self::None => &NoAuth,
            Self::ApiKey(a) => a,
            Self::Basic(a) => a,
            Self::Bearer(a) => a,
            Self::Digest(a) => a,
            Self::Function(a) => a,
            Self::Custom(a) => a.as_ref(),
        }
    }
}

impl AuthStrategy for Auth {
    fn needs_request_body(&self) -> bool {
        self.strategy().needs_request_body()
    }

    fn needs_response_body(&self) -> bool {
        self.strategy().needs_response_body()
    }

    fn auth_flow(&self, request: Request) -> Box<dyn AuthFlow> {
        self.strategy().auth_flow(request)
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::ApiKey(a) => f.debug_tuple("ApiKey").field(&a.header).finish(),
            Self::Basic(a) => f.debug_tuple("Basic").field(&a.username).finish(),
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::Digest(a) => f.debug_tuple("Digest").field(&a.username()).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
