/// Standard-alphabet base64, padded.
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::CryptoError;

pub fn to_base64(data: impl AsRef<[u8]>) -> String {
    STANDARD.encode(data)
}

/// Rejects bad characters, bad padding and impossible lengths.
pub fn from_base64(text: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(STANDARD.decode(text)?)
}
