//! RFC 7616 Digest authentication.
//!
//! One `DigestAuth` instance remembers the last challenge it answered and
//! a nonce counter that only ever grows. Later requests through the same
//! instance send a speculative `Authorization` right away, reusing the
//! cached nonce. Share an instance across sequential requests, not across
//! concurrent ones.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::challenge::{self, DigestChallenge};
use crate::auth::hash::DigestAlgorithm;
use crate::auth::{AuthFlow, AuthRound, AuthStrategy};
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;

/// Values the client contributes to one digest computation.
#[derive(Debug, Clone, Copy)]
pub struct DigestInput<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub method: &'a str,
    pub uri: &'a str,
    pub nonce_count: u32,
    pub cnonce: &'a str,
}

/// Format a nonce count the way it goes on the wire.
pub fn format_nc(nonce_count: u32) -> String {
    format!("{:08x}", nonce_count)
}

/// Client nonce: SHA1 over counter, nonce, wall clock and random bytes,
/// truncated to 16 hex characters.
pub fn make_cnonce(nonce_count: u32, nonce: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut data = format!("{}{}{}", format_nc(nonce_count), nonce, secs).into_bytes();
    data.extend_from_slice(&rand::random::<[u8; 8]>());
    let mut cnonce = DigestAlgorithm::Sha.hash(&data);
    cnonce.truncate(16);
    cnonce
}

impl DigestChallenge {
    /// The `response` value for this challenge.
    pub fn response_digest(&self, input: &DigestInput<'_>, qop: Option<&str>) -> String {
        let h = |s: String| self.algorithm.hash_str(&s);

        let mut ha1 = h(format!("{}:{}:{}", input.username, self.realm, input.password));
        if self.algorithm.is_session() {
            ha1 = h(format!("{}:{}:{}", ha1, self.nonce, input.cnonce));
        }
        let ha2 = h(format!("{}:{}", input.method, input.uri));

        match qop {
            Some(qop) => h(format!(
                "{}:{}:{}:{}:{}:{}",
                ha1,
                self.nonce,
                format_nc(input.nonce_count),
                input.cnonce,
                qop,
                ha2
            )),
            None => h(format!("{}:{}:{}", ha1, self.nonce, ha2)),
        }
    }

    /// Full `Authorization` header value.
    ///
    /// `algorithm`, `qop` and `nc` are tokens and go out unquoted.
    pub fn authorization(&self, input: &DigestInput<'_>) -> Result<String> {
        let qop = self.resolve_qop()?;
        let response = self.response_digest(input, qop);

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm={}",
            quote(input.username),
            quote(&self.realm),
            quote(&self.nonce),
            quote(input.uri),
            response,
            self.algorithm
        );
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{}\"", quote(opaque)));
        }
        if let Some(qop) = qop {
            header.push_str(&format!(
                ", qop={}, nc={}, cnonce=\"{}\"",
                qop,
                format_nc(input.nonce_count),
                quote(input.cnonce)
            ));
        }
        Ok(header)
    }
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug, Default)]
struct DigestState {
    challenge: Option<DigestChallenge>,
    nonce_count: u32,
}

/// Digest credentials plus the per-instance session state.
#[derive(Clone)]
pub struct DigestAuth {
    username: String,
    password: String,
    state: Arc<Mutex<DigestState>>,
}

impl DigestAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            state: Arc::new(Mutex::new(DigestState::default())),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Current nonce count (the last value sent).
    pub fn nonce_count(&self) -> u32 {
        self.state().nonce_count
    }

    /// Challenge the next request will answer speculatively.
    pub fn cached_challenge(&self) -> Option<DigestChallenge> {
        self.state().challenge.clone()
    }

    fn state(&self) -> MutexGuard<'_, DigestState> {
        self.state.lock().expect("digest state mutex poisoned")
    }

    /// Compute and attach `Authorization` for `challenge`, then cache it.
    fn authorize(&self, request: &mut Request, challenge: DigestChallenge) -> Result<()> {
        let mut state = self.state();
        let nonce_count = state.nonce_count + 1;
        let cnonce = make_cnonce(nonce_count, &challenge.nonce);
        let uri = request.digest_uri();
        let header = challenge.authorization(&DigestInput {
            username: &self.username,
            password: &self.password,
            method: request.method.as_str(),
            uri: &uri,
            nonce_count,
            cnonce: &cnonce,
        })?;
        state.nonce_count = nonce_count;
        state.challenge = Some(challenge);
        request.headers.insert("Authorization", header);
        Ok(())
    }
}

impl fmt::Debug for DigestAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl AuthStrategy for DigestAuth {
    fn needs_request_body(&self) -> bool {
        true
    }

    fn auth_flow(&self, request: Request) -> Box<dyn AuthFlow> {
        Box::new(DigestFlow {
            auth: self.clone(),
            request: Some(request),
            stage: Stage::Unchallenged,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Unchallenged,
    AwaitingChallenge,
    Finished,
}

struct DigestFlow {
    auth: DigestAuth,
    /// Pristine request kept for the challenged retry.
    request: Option<Request>,
    stage: Stage,
}

impl DigestFlow {
    fn copy_request(&self) -> Result<Request> {
        self.request
            .as_ref()
            .and_then(Request::try_clone)
            .ok_or_else(|| Error::invalid_request("digest auth needs a replayable request"))
    }

    fn first_round(&mut self) -> Result<AuthRound> {
        let mut request = self.copy_request()?;
        if let Some(challenge) = self.auth.cached_challenge() {
            tracing::debug!(realm = %challenge.realm, "reusing cached digest challenge");
            self.auth.authorize(&mut request, challenge)?;
        }
        self.stage = Stage::AwaitingChallenge;
        Ok(AuthRound::Continue(request))
    }

    fn challenged_round(&mut self, response: &Response) -> Result<AuthRound> {
        self.stage = Stage::Finished;
        if response.status != 401 {
            return Ok(AuthRound::Done);
        }
        let header = match response
            .headers
            .get_all("WWW-Authenticate")
            .into_iter()
            .find(|h| challenge::is_digest(h))
        {
            Some(h) => h,
            None => {
                tracing::debug!("401 without a Digest challenge");
                return Ok(AuthRound::Done);
            }
        };
        let challenge = DigestChallenge::parse(header)?;
        let mut request = self
            .request
            .take()
            .ok_or_else(|| Error::invalid_request("digest request already consumed"))?;
        self.auth.authorize(&mut request, challenge)?;
        tracing::debug!(nc = self.auth.nonce_count(), "answering digest challenge");
        Ok(AuthRound::Last(request))
    }
}

impl AuthFlow for DigestFlow {
    fn next_round(&mut self, response: Option<&Response>) -> Result<AuthRound> {
        match (self.stage, response) {
            (Stage::Unchallenged, _) => self.first_round(),
            (Stage::AwaitingChallenge, Some(response)) => self.challenged_round(response),
            (Stage::AwaitingChallenge, None) => Err(Error::invalid_response(
                "digest round needs the previous response",
            )),
            (Stage::Finished, _) => Ok(AuthRound::Done),
        }
    }
}
