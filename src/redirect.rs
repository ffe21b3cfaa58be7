//! Redirect policy: the next request for a 3xx response.
//!
//! Method rewriting follows browser behavior rather than the letter of
//! RFC 9110: 301/302 turn POST into GET, 303 turns everything but HEAD
//! into GET.

use http::Method;
use url::Url;

use crate::error::{Error, Result};
use crate::request::{Request, RequestBody};
use crate::response::Response;

/// Statuses that may be followed.
pub const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Whether `response` is a redirect we know how to follow.
pub fn is_redirect_eligible(response: &Response) -> bool {
    REDIRECT_STATUSES.contains(&response.status) && response.location().is_some()
}

/// Method to use after a `status` redirect of a `method` request.
pub fn redirect_method(method: &Method, status: u16) -> Method {
    match status {
        302 | 303 if *method != Method::HEAD => Method::GET,
        301 if *method != Method::POST && *method != Method::HEAD => Method::GET,
        _ => method.clone(),
    }
}

/// Resolve `location` against the URL of the redirected request.
///
/// Relative locations resolve against the origin root, not the directory
/// of `previous`: `Location: c` from `/a/b` lands on `/c`.
pub fn resolve_location(previous: &Url, location: &str) -> Result<Url> {
    let mut url = match Url::parse(location) {
        Ok(mut url) => {
            if url.host().is_none() && url.cannot_be_a_base() {
                return Err(Error::InvalidRedirectUrl(location.to_string()));
            }
            if url.host().is_none() {
                url.set_host(previous.host_str())
                    .map_err(|e| Error::InvalidRedirectUrl(format!("{}: {}", location, e)))?;
            }
            url
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let mut base = previous.clone();
            base.set_path("/");
            base.set_query(None);
            base.set_fragment(None);
            base.join(location)
                .map_err(|e| Error::InvalidRedirectUrl(format!("{}: {}", location, e)))?
        }
        Err(e) => return Err(Error::InvalidRedirectUrl(format!("{}: {}", location, e))),
    };

    if url.fragment().is_none() {
        if let Some(fragment) = previous.fragment() {
            url.set_fragment(Some(fragment));
        }
    }

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::InvalidRedirectUrl(format!(
            "unsupported scheme {:?} in {}",
            other, location
        ))),
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// `Url` drops a port equal to the scheme default.
fn is_default_port(url: &Url) -> bool {
    url.port().is_none()
}

/// `http://host` to `https://host` on default ports.
fn is_https_upgrade(from: &Url, to: &Url) -> bool {
    from.scheme() == "http"
        && to.scheme() == "https"
        && from.host_str() == to.host_str()
        && is_default_port(from)
        && is_default_port(to)
}

/// Whether credentials may follow a redirect from `from` to `to`.
pub fn keeps_authorization(from: &Url, to: &Url) -> bool {
    same_origin(from, to) || is_https_upgrade(from, to)
}

/// Whether following `status` turns `method` into a body-less GET.
pub fn drops_body(method: &Method, status: u16) -> bool {
    let next = redirect_method(method, status);
    next != *method && next == Method::GET
}

/// Build the request that follows `response`.
///
/// `previous` is the request that produced `response`. A streamed body
/// must have been buffered by the caller if the method is preserved.
pub fn next_request(previous: &Request, response: &Response) -> Result<Request> {
    let location = response
        .location()
        .ok_or_else(|| Error::InvalidRedirectUrl("missing Location header".to_string()))?;
    let url = resolve_location(&previous.url, location)?;
    let method = redirect_method(&previous.method, response.status);

    let mut headers = previous.headers.clone();
    if !keeps_authorization(&previous.url, &url) && headers.remove("Authorization").is_some() {
        tracing::debug!(from = %previous.url, to = %url, "dropping Authorization on redirect");
    }

    let body = if drops_body(&previous.method, response.status) {
        headers.remove("Content-Length");
        headers.remove("Transfer-Encoding");
        RequestBody::Empty
    } else {
        previous.body.try_clone().ok_or_else(|| {
            Error::invalid_request("streamed request body cannot be replayed on redirect")
        })?
    };

    tracing::debug!(status = response.status, %method, %url, "redirect");
    Ok(Request {
        method,
        url,
        headers,
        body,
    })
}
