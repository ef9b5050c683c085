/// Endpoint description: scheme, host, port and request target.
use std::fmt;

use super::{SessionStage, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    pub scheme: Scheme,
    /// As written in the URL; IPv6 literals keep their brackets.
    pub host: String,
    pub port: u16,
    /// Path plus query, always starting with `/`.
    pub target: String,
}

impl Url {
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let parsed = url::Url::parse(input)
            .map_err(|e| invalid(format!("invalid url '{input}': {e}")))?;

        let scheme = match parsed.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        };
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid(format!("url '{input}' has no host")))?
            .to_string();
        let port = parsed.port().unwrap_or_else(|| scheme.default_port());

        let mut target = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            target.push('?');
            target.push_str(query);
        }

        Ok(Self {
            scheme,
            host,
            port,
            target,
        })
    }

    /// Same endpoint, different request target.
    pub fn with_target(&self, target: impl Into<String>) -> Self {
        let mut target = target.into();
        if !target.starts_with('/') {
            target.insert(0, '/');
        }
        Self {
            target,
            ..self.clone()
        }
    }

    /// Host without IPv6 brackets, for name resolution and TLS verification.
    pub fn bare_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    /// Value for the `Host` header; the port is omitted when it is the default.
    pub fn authority(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{}://{}{}", scheme, self.authority(), self.target)
    }
}

fn invalid(message: String) -> TransportError {
    TransportError::new(SessionStage::Created, message)
}
