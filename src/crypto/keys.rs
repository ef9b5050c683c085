/// RSA identity keys: generation, DER persistence and PKCS#1 v1.5 decryption.
use std::fmt;
use std::fs;
use std::path::Path;

use rand_core::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use tracing::info;

use super::{CryptoError, encoding};

const ARMOR_LINE_WIDTH: usize = 72;

/// Public key plus the private key it belongs to.
#[derive(Clone, PartialEq)]
pub struct RsaKeyPair {
    pub public_key: RsaPublicKey,
    pub private_key: RsaPrivateKey,
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

pub fn generate_rsa_keys(bits: usize) -> Result<RsaKeyPair, CryptoError> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);
    info!("Generated {}-bit RSA key pair", bits);

    Ok(RsaKeyPair {
        public_key,
        private_key,
    })
}

/// Load a key pair stored as X.509 SubjectPublicKeyInfo / PKCS#8 DER.
pub fn load_rsa_keys(public_path: &Path, private_path: &Path) -> Result<RsaKeyPair, CryptoError> {
    let public_der = read_key_file(public_path)?;
    let private_der = read_key_file(private_path)?;

    let public_key = RsaPublicKey::from_public_key_der(&public_der)
        .map_err(|e| decode_error(public_path, e))?;
    let private_key = RsaPrivateKey::from_pkcs8_der(&private_der)
        .map_err(|e| decode_error(private_path, e))?;

    Ok(RsaKeyPair {
        public_key,
        private_key,
    })
}

pub fn save_rsa_keys(
    keys: &RsaKeyPair,
    public_path: &Path,
    private_path: &Path,
) -> Result<(), CryptoError> {
    let public_der = keys
        .public_key
        .to_public_key_der()
        .map_err(|e| encode_error(public_path, e))?;
    let private_der = keys
        .private_key
        .to_pkcs8_der()
        .map_err(|e| encode_error(private_path, e))?;

    for path in [public_path, private_path] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| encode_error(path, e))?;
        }
    }
    fs::write(public_path, public_der.as_bytes()).map_err(|e| encode_error(public_path, e))?;
    write_private(private_path, private_der.as_bytes())
        .map_err(|e| encode_error(private_path, e))?;

    info!("Saved RSA keys to {}", public_path.display());
    Ok(())
}

/// PKCS#1 v1.5 decryption. Every failure maps to the same opaque error.
pub fn decrypt_private_key_pkcs(
    ciphertext: &[u8],
    private_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    private_key
        .decrypt(Pkcs1v15Encrypt, ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

/// Base64 of the DER public key, wrapped for embedding in text fields.
pub fn public_key_to_string(public_key: &RsaPublicKey) -> Result<String, CryptoError> {
    let der = public_key
        .to_public_key_der()
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let encoded = encoding::to_base64(der.as_bytes());

    let mut armored = String::with_capacity(encoded.len() + encoded.len() / ARMOR_LINE_WIDTH + 1);
    for line in encoded.as_bytes().chunks(ARMOR_LINE_WIDTH) {
        // base64 output is ASCII
        armored.push_str(std::str::from_utf8(line).unwrap_or_default());
        armored.push('\n');
    }
    Ok(armored)
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, CryptoError> {
    fs::read(path).map_err(|e| decode_error(path, e))
}

#[cfg(unix)]
fn write_private(path: &Path, der: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(der)
}

#[cfg(not(unix))]
fn write_private(path: &Path, der: &[u8]) -> std::io::Result<()> {
    fs::write(path, der)
}

fn decode_error(path: &Path, reason: impl fmt::Display) -> CryptoError {
    CryptoError::KeyDecode {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn encode_error(path: &Path, reason: impl fmt::Display) -> CryptoError {
    CryptoError::KeyEncode {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
