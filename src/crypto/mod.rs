pub mod encoding;
pub mod keys;
#[cfg(feature = "legacy-rc4")]
pub mod legacy;

pub use encoding::{from_base64, to_base64};
pub use keys::{
    decrypt_private_key_pkcs, generate_rsa_keys, load_rsa_keys, public_key_to_string,
    save_rsa_keys, RsaKeyPair,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid key material in {path}: {reason}")]
    KeyDecode { path: String, reason: String },

    #[error("cannot write key to {path}: {reason}")]
    KeyEncode { path: String, reason: String },

    /// Deliberately carries no detail about the failing padding or format.
    #[error("decryption failed")]
    Decryption,

    #[error("invalid base64 input: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid key: {0}")]
    InvalidKey(&'static str),
}

impl CryptoError {
    pub fn domain(&self) -> &'static str {
        "crypto"
    }
}
