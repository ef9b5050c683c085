pub mod http;
pub mod session;
pub mod url;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub use self::http::{HttpRequest, HttpResponse, Method};
pub use self::session::{HttpSession, PendingResponse, TransportContext};
pub use self::url::{Scheme, Url};

/// Stages a session moves through, in order. HTTP sessions skip `Handshaking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionStage {
    Created,
    Resolving,
    Connecting,
    Handshaking,
    Writing,
    Reading,
    Finished,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStage::Created => "created",
            SessionStage::Resolving => "resolving",
            SessionStage::Connecting => "connecting",
            SessionStage::Handshaking => "handshaking",
            SessionStage::Writing => "writing",
            SessionStage::Reading => "reading",
            SessionStage::Finished => "finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{stage}: {message}")]
pub struct TransportError {
    stage: SessionStage,
    message: String,
    timed_out: bool,
}

impl TransportError {
    pub fn new(stage: SessionStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timed_out(stage: SessionStage, limit: Duration) -> Self {
        Self {
            stage,
            message: format!("timed out after {:?}", limit),
            timed_out: true,
        }
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }

    pub fn domain(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
pub(crate) mod testing;
