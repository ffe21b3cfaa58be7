//! `WWW-Authenticate: Digest ...` challenge parsing.

use crate::auth::hash::DigestAlgorithm;
use crate::error::{Error, Result};

/// Parsed Digest challenge. Replaced wholesale on re-challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub algorithm: DigestAlgorithm,
    pub opaque: Option<String>,
    /// Raw qop list as offered, e.g. `auth,auth-int`.
    pub qop: Option<String>,
}

/// Split a challenge into its scheme token and the parameter list.
pub fn split_scheme(header: &str) -> (&str, &str) {
    let header = header.trim();
    match header.find(|c: char| c.is_ascii_whitespace()) {
        Some(pos) => (&header[..pos], header[pos..].trim_start()),
        None => (header, ""),
    }
}

/// Whether the header value is a Digest challenge.
pub fn is_digest(header: &str) -> bool {
    split_scheme(header).0.eq_ignore_ascii_case("digest")
}

/// Parse comma separated `key=value` / `key="quoted value"` pairs.
///
/// Quoted values may contain commas and backslash escapes. Keys are
/// lowercased; empty list elements are skipped.
pub fn parse_auth_params(input: &str) -> Result<Vec<(String, String)>> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        let key = key.trim().to_ascii_lowercase();

        if chars.next() != Some('=') {
            return Err(Error::invalid_digest(format!(
                "parameter {:?} has no value",
                key
            )));
        }
        while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    _ => value.push(c),
                }
            }
            if !closed {
                return Err(Error::invalid_digest(format!(
                    "unterminated quoted value for {:?}",
                    key
                )));
            }
            // Skip anything up to the next separator.
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                chars.next();
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim().to_string();
        }

        if key.is_empty() {
            return Err(Error::invalid_digest("empty parameter name"));
        }
        params.push((key, value));
    }

    Ok(params)
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

impl DigestChallenge {
    /// Parse a full header value, scheme included.
    pub fn parse(header: &str) -> Result<Self> {
        let (scheme, rest) = split_scheme(header);
        if !scheme.eq_ignore_ascii_case("digest") {
            return Err(Error::invalid_digest(format!(
                "not a Digest challenge: {:?}",
                scheme
            )));
        }
        let params = parse_auth_params(rest)?;

        let realm = param(&params, "realm")
            .ok_or_else(|| Error::invalid_digest("challenge without realm"))?;
        let nonce = param(&params, "nonce")
            .ok_or_else(|| Error::invalid_digest("challenge without nonce"))?;
        let algorithm = match param(&params, "algorithm") {
            Some(name) => DigestAlgorithm::from_name(name)?,
            None => DigestAlgorithm::Md5,
        };

        Ok(Self {
            realm: realm.to_string(),
            nonce: nonce.to_string(),
            algorithm,
            opaque: param(&params, "opaque").map(str::to_string),
            qop: param(&params, "qop").map(str::to_string),
        })
    }

    /// Pick the qop to answer with.
    ///
    /// Only `auth` is implemented. A challenge that offers nothing but
    /// `auth-int` cannot be answered.
    pub fn resolve_qop(&self) -> Result<Option<&'static str>> {
        let offered = match &self.qop {
            None => return Ok(None),
            Some(q) => q,
        };
        let qops: Vec<&str> = offered
            .split(',')
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .collect();
        if qops.iter().any(|q| q.eq_ignore_ascii_case("auth")) {
            return Ok(Some("auth"));
        }
        if qops.len() == 1 && qops[0].eq_ignore_ascii_case("auth-int") {
            return Err(Error::QopNotSupported("auth-int".to_string()));
        }
        Err(Error::invalid_digest(format!("unexpected qop {:?}", offered)))
    }
}
