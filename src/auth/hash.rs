//! Hash functions used by Digest authentication (RFC 7616 Section 3.4.2).

use std::fmt;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};

/// Digest `algorithm` parameter values we can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Md5Sess,
    Sha,
    ShaSess,
    Sha256,
    Sha256Sess,
    Sha512,
    Sha512Sess,
}

impl DigestAlgorithm {
    /// Look up an algorithm token, ignoring case.
    pub fn from_name(name: &str) -> Result<Self> {
        let algorithm = match name.trim().to_ascii_uppercase().as_str() {
            "MD5" => Self::Md5,
            "MD5-SESS" => Self::Md5Sess,
            "SHA" => Self::Sha,
            "SHA-SESS" => Self::ShaSess,
            "SHA-256" => Self::Sha256,
            "SHA-256-SESS" => Self::Sha256Sess,
            "SHA-512" => Self::Sha512,
            "SHA-512-SESS" => Self::Sha512Sess,
            other => {
                return Err(Error::invalid_digest(format!(
                    "unsupported algorithm {:?}",
                    other
                )))
            }
        };
        Ok(algorithm)
    }

    /// Token as sent back in the Authorization header.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
            Self::Sha => "SHA",
            Self::ShaSess => "SHA-sess",
            Self::Sha256 => "SHA-256",
            Self::Sha256Sess => "SHA-256-sess",
            Self::Sha512 => "SHA-512",
            Self::Sha512Sess => "SHA-512-sess",
        }
    }

    /// `-sess` variants fold the nonces into HA1.
    pub fn is_session(&self) -> bool {
        matches!(
            self,
            Self::Md5Sess | Self::ShaSess | Self::Sha256Sess | Self::Sha512Sess
        )
    }

    /// Lowercase hex digest of `data`.
    pub fn hash(&self, data: &[u8]) -> String {
        match self {
            Self::Md5 | Self::Md5Sess => hex::encode(Md5::digest(data)),
            Self::Sha | Self::ShaSess => hex::encode(Sha1::digest(data)),
            Self::Sha256 | Self::Sha256Sess => hex::encode(Sha256::digest(data)),
            Self::Sha512 | Self::Sha512Sess => hex::encode(Sha512::digest(data)),
        }
    }

    pub fn hash_str(&self, data: &str) -> String {
        self.hash(data.as_bytes())
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
