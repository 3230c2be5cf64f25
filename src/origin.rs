//! RFC 6454 origin (scheme, host, port); the session-pool key.
//!
//! Grounded on `original_source/SPDY/SPDYOrigin.h`.

use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum OriginError {
    #[error("unsupported scheme {0:?}, only http/https are supported")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("URL has no usable port")]
    MissingPort,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Origin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Result<Self, OriginError> {
        let scheme = scheme.into();
        if scheme != "http" && scheme != "https" {
            return Err(OriginError::UnsupportedScheme(scheme));
        }
        if port == 0 {
            return Err(OriginError::MissingPort);
        }
        Ok(Self {
            scheme,
            host: host.into(),
            port,
        })
    }

    pub fn from_url(url: &Url) -> Result<Self, OriginError> {
        let host = url.host_str().ok_or(OriginError::MissingHost)?.to_owned();
        let port = url
            .port_or_known_default()
            .ok_or(OriginError::MissingPort)?;
        Self::new(url.scheme(), host, port)
    }

    pub fn is_default_port(&self) -> bool {
        match self.scheme.as_str() {
            "http" => self.port == 80,
            "https" => self.port == 443,
            _ => false,
        }
    }

    /// Host header value (`:host` pseudo-header), always `host:port` —
    /// the port is included even for the scheme's default (spec §8
    /// scenario 1's wire assertion).
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}
