//! Request pipeline: auth rounds wrapped around a bounded redirect loop.
//!
//! [`Pipeline`] holds the state of one logical request and decides what
//! happens after each dispatch. It never touches the network itself, so the
//! async and blocking drivers below share every decision and differ only in
//! how they wait.

use std::mem;

use crate::auth::{Auth, AuthFlow, AuthRound, AuthStrategy};
use crate::error::{Error, Result};
use crate::hooks::EventHooks;
use crate::redirect;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{AsyncTransport, DispatchOptions, Transport};

/// Default redirect budget per auth round.
pub const DEFAULT_MAX_REDIRECTS: usize = 20;

/// Redirect and hook settings for one logical request.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub hooks: EventHooks,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            follow_redirects: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            hooks: EventHooks::new(),
        }
    }
}

/// What the driver does next.
#[derive(Debug)]
pub enum Step {
    Dispatch(Request),
    Complete(Response),
}

pub struct Pipeline {
    flow: Box<dyn AuthFlow>,
    config: PipelineConfig,
    needs_response_body: bool,
    history: Vec<Response>,
    hops: usize,
    /// The auth flow has handed out its last request.
    final_round: bool,
}

impl Pipeline {
    /// Run the first auth round and return the first request to send.
    pub fn start(
        strategy: &dyn AuthStrategy,
        request: Request,
        config: PipelineConfig,
    ) -> Result<(Self, Request)> {
        let mut flow = strategy.auth_flow(request);
        let (first, final_round) = match flow.next_round(None)? {
            AuthRound::Continue(r) => (r, false),
            AuthRound::Last(r) => (r, true),
            AuthRound::Done => {
                return Err(Error::invalid_request(
                    "first auth round produced no request",
                ))
            }
        };
        let pipeline = Self {
            flow,
            config,
            needs_response_body: strategy.needs_response_body(),
            history: Vec::new(),
            hops: 0,
            final_round,
        };
        Ok((pipeline, first))
    }

    /// Request hooks, right before dispatch.
    pub fn prepare(&self, request: &mut Request) {
        self.config.hooks.apply_request(request);
    }

    /// Response hooks, right after the head arrives.
    pub fn observe(&self, response: &mut Response) {
        self.config.hooks.apply_response(response);
    }

    /// Whether the driver must read the whole body before [`advance`](Self::advance).
    pub fn must_drain(&self, response: &Response) -> bool {
        if redirect::is_redirect_eligible(response) && self.config.follow_redirects {
            return true;
        }
        self.needs_response_body && !self.final_round
    }

    /// Feed the response to the last dispatch and decide what comes next.
    pub fn advance(&mut self, sent: Dispatched, mut response: Response) -> Result<Step> {
        if redirect::is_redirect_eligible(&response) {
            if self.config.follow_redirects {
                self.hops += 1;
                if self.hops > self.config.max_redirects {
                    tracing::warn!(max = self.config.max_redirects, "too many redirects");
                    return Err(Error::RedirectLimit {
                        count: self.config.max_redirects,
                    });
                }
                let next = sent.next_request(&response)?;
                response.close_body();
                self.history.push(response);
                return Ok(Step::Dispatch(next));
            }
            match sent.next_request(&response) {
                Ok(next) => response.set_next_request(next),
                Err(err) => tracing::warn!(error = %err, "redirect not followable"),
            }
        }

        self.hops = 0;
        if self.final_round {
            return Ok(self.complete(response));
        }
        match self.flow.next_round(Some(&response))? {
            AuthRound::Done => Ok(self.complete(response)),
            AuthRound::Continue(next) => Ok(self.retry(response, next, false)),
            AuthRound::Last(next) => Ok(self.retry(response, next, true)),
        }
    }

    fn retry(&mut self, mut superseded: Response, next: Request, last: bool) -> Step {
        tracing::debug!(status = superseded.status, "auth round requested another dispatch");
        superseded.close_body();
        self.history.push(superseded);
        self.final_round = last;
        Step::Dispatch(next)
    }

    fn complete(&mut self, mut response: Response) -> Step {
        response.set_history(mem::take(&mut self.history));
        Step::Complete(response)
    }
}

/// What the pipeline keeps of a dispatched request.
///
/// A streamed body cannot be kept; the method, URL and headers still are,
/// which is enough for a redirect that turns the request into a GET.
#[derive(Debug)]
pub struct Dispatched {
    request: Request,
    body_kept: bool,
}

impl Dispatched {
    pub fn of(request: &Request) -> Self {
        match request.try_clone() {
            Some(request) => Self {
                request,
                body_kept: true,
            },
            None => Self {
                request: request.clone_head(),
                body_kept: false,
            },
        }
    }

    fn next_request(&self, response: &Response) -> Result<Request> {
        if !self.body_kept && !redirect::drops_body(&self.request.method, response.status) {
            return Err(Error::invalid_request(
                "streamed request body cannot be replayed on redirect",
            ));
        }
        redirect::next_request(&self.request, response)
    }
}

/// Everything a driver needs for one logical request.
#[derive(Debug)]
pub struct Exchange {
    pub request: Request,
    pub auth: Auth,
    pub config: PipelineConfig,
    pub dispatch: DispatchOptions,
    /// Leave the final body unread for the caller to pull.
    pub stream: bool,
}

impl Exchange {
    fn must_buffer_request(&self) -> bool {
        self.auth.needs_request_body() || self.config.follow_redirects
    }
}

/// Drive an exchange to completion on the current task.
pub async fn execute(transport: &dyn AsyncTransport, exchange: Exchange) -> Result<Response> {
    let buffer = exchange.must_buffer_request();
    let Exchange {
        mut request,
        auth,
        config,
        dispatch,
        stream,
    } = exchange;
    if buffer {
        request.body.materialize().await?;
    }

    let (mut pipeline, mut request) = Pipeline::start(&auth, request, config)?;
    loop {
        pipeline.prepare(&mut request);
        let sent = Dispatched::of(&request);
        tracing::debug!(method = %request.method, url = %request.url, "dispatch");
        let mut response = transport.dispatch(request, &dispatch).await?;
        pipeline.observe(&mut response);
        if pipeline.must_drain(&response) {
            response.read().await?;
        }
        match pipeline.advance(sent, response)? {
            Step::Dispatch(next) => request = next,
            Step::Complete(mut response) => {
                if !stream {
                    response.read().await?;
                }
                return Ok(response);
            }
        }
    }
}

/// Drive an exchange to completion, blocking the current thread.
pub fn execute_blocking(transport: &dyn Transport, exchange: Exchange) -> Result<Response> {
    let buffer = exchange.must_buffer_request();
    let Exchange {
        mut request,
        auth,
        config,
        dispatch,
        stream,
    } = exchange;
    if buffer {
        request.body.materialize_blocking()?;
    }

    let (mut pipeline, mut request) = Pipeline::start(&auth, request, config)?;
    loop {
        pipeline.prepare(&mut request);
        let sent = Dispatched::of(&request);
        tracing::debug!(method = %request.method, url = %request.url, "dispatch");
        let mut response = transport.dispatch(request, &dispatch)?;
        pipeline.observe(&mut response);
        if pipeline.must_drain(&response) {
            response.read_blocking()?;
        }
        match pipeline.advance(sent, response)? {
            Step::Dispatch(next) => request = next,
            Step::Complete(mut response) => {
                if !stream {
                    response.read_blocking()?;
                }
                return Ok(response);
            }
        }
    }
}
