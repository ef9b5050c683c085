/// Uniform `{domain, message}` error used for logging and diagnostics.
///
/// Each subsystem keeps its own typed error; they all collapse into
/// [`PlayerError`] when they cross into code that only needs to report them.
use std::fmt;

use crate::crypto::CryptoError;
use crate::soap::SoapError;
use crate::stats::{RecordError, StoreError};
use crate::system::hardware_key::KeyError;
use crate::transport::TransportError;
use crate::xmds::settings::SettingsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerError {
    domain: &'static str,
    message: String,
}

impl PlayerError {
    pub fn new(domain: &'static str, message: impl Into<String>) -> Self {
        Self {
            domain,
            message: message.into(),
        }
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.domain, self.message)
    }
}

impl std::error::Error for PlayerError {}

macro_rules! into_player_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for PlayerError {
                fn from(err: $ty) -> Self {
                    PlayerError::new(err.domain(), err.to_string())
                }
            }
        )*
    };
}

into_player_error!(
    CryptoError,
    TransportError,
    SoapError,
    RecordError,
    StoreError,
    KeyError,
    SettingsError,
);
