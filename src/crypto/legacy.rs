/// RC4 compatibility path.
///
/// RC4 is broken and only exists here because older CMS servers seal push
/// messages with it. Nothing in this crate encrypts new data with it; keep it
/// that way. The whole module is gated behind the `legacy-rc4` feature.
use rsa::RsaPrivateKey;
use tracing::debug;

use super::{CryptoError, decrypt_private_key_pkcs, from_base64};

/// Apply the RC4 keystream. Encryption and decryption are the same operation.
pub fn decrypt_rc4(data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.is_empty() || key.len() > 256 {
        return Err(CryptoError::InvalidKey("RC4 key must be 1..=256 bytes"));
    }

    let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
        state.swap(i, j as usize);
    }

    let mut i: u8 = 0;
    j = 0;
    let output = data
        .iter()
        .map(|byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(state[i as usize]);
            state.swap(i as usize, j as usize);
            let k = state[state[i as usize].wrapping_add(state[j as usize]) as usize];
            byte ^ k
        })
        .collect();

    Ok(output)
}

/// Open a sealed message: the RC4 key arrives RSA-encrypted for this display.
///
/// Both arguments are base64 as they appear on the wire.
pub fn open_sealed_message(
    sealed_key: &str,
    message: &str,
    private_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    let encrypted_key = from_base64(sealed_key)?;
    let rc4_key = decrypt_private_key_pkcs(&encrypted_key, private_key)?;
    let payload = from_base64(message)?;
    debug!("Opening sealed message ({} bytes)", payload.len());
    decrypt_rc4(&payload, &rc4_key)
}
