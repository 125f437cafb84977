//! OpenSSL-compatible handling of the encrypted stats artifact.
//!
//! The stats file is produced by `openssl enc -aes-256-cbc -salt -a` with a
//! password file and then gzipped, so reading it back means:
//! gunzip → base64 decode → check `Salted__` → derive key/IV with
//! `EVP_BytesToKey` (MD5, one round) → AES-256-CBC decrypt → strip PKCS7.

use std::io::{Read, Write};

use aes::Aes256;
use base64::{engine::general_purpose, Engine as _};
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use md5::{Digest, Md5};
use thiserror::Error;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// Magic prefix of a salted OpenSSL stream.
pub const SALT_MAGIC: &[u8; 8] = b"Salted__";

const SALT_LEN: usize = 8;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const BASE64_LINE: usize = 64;

/// Any failure while reversing the stats envelope.
#[derive(Debug, Error)]
pub enum DecryptionError {
    /// Outer gzip layer is corrupt.
    #[error("gzip envelope is corrupt: {0}")]
    Gzip(#[source] std::io::Error),

    /// Inner payload is not base64.
    #[error("payload is not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded payload does not start with `Salted__`.
    #[error("Salted__ header missing")]
    MissingSaltHeader,

    /// Payload ends before the salt is complete.
    #[error("payload truncated after {0} bytes")]
    Truncated(usize),

    /// Ciphertext is empty or not a whole number of AES blocks.
    #[error("ciphertext length {0} is not a positive multiple of 16")]
    CiphertextLength(usize),

    /// Trailing bytes are not valid PKCS7 padding (usually a wrong password).
    #[error("invalid PKCS7 padding")]
    Padding,

    /// Decrypted bytes are not UTF-8 text.
    #[error("plaintext is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Derive the AES-256 key and CBC IV from a password and salt.
///
/// Digests `D_i = MD5(D_{i-1} ‖ password ‖ salt)` (with `D_0` empty) are
/// concatenated until 48 bytes are available; the first 32 are the key and
/// the next 16 the IV.
pub fn derive_key_iv(password: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut material = Vec::with_capacity(KEY_LEN + IV_LEN + 16);
    let mut previous: Vec<u8> = Vec::new();

    while material.len() < KEY_LEN + IV_LEN {
        let mut hasher = Md5::new();
        hasher.update(&previous);
        hasher.update(password);
        hasher.update(salt);
        let digest = hasher.finalize();
        material.extend_from_slice(&digest);
        previous = digest.to_vec();
    }

    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&material[..KEY_LEN]);
    iv.copy_from_slice(&material[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}

/// Decrypt a gzipped, base64-armoured, salted AES-256-CBC stats file.
pub fn decrypt_stats(encrypted: &[u8], password: &[u8]) -> Result<String, DecryptionError> {
    let mut armoured = Vec::new();
    MultiGzDecoder::new(encrypted)
        .read_to_end(&mut armoured)
        .map_err(DecryptionError::Gzip)?;

    // `openssl -a` wraps lines at 64 columns.
    armoured.retain(|byte| !byte.is_ascii_whitespace());
    let raw = general_purpose::STANDARD.decode(&armoured)?;

    if raw.len() < SALT_MAGIC.len() || &raw[..SALT_MAGIC.len()] != SALT_MAGIC {
        return Err(DecryptionError::MissingSaltHeader);
    }
    if raw.len() < SALT_MAGIC.len() + SALT_LEN {
        return Err(DecryptionError::Truncated(raw.len()));
    }
    let salt = &raw[SALT_MAGIC.len()..SALT_MAGIC.len() + SALT_LEN];
    let ciphertext = &raw[SALT_MAGIC.len() + SALT_LEN..];
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(DecryptionError::CiphertextLength(ciphertext.len()));
    }

    let (key, iv) = derive_key_iv(password, salt);
    let mut plaintext = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| DecryptionError::CiphertextLength(ciphertext.len()))?
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| DecryptionError::CiphertextLength(ciphertext.len()))?;

    strip_pkcs7(&mut plaintext)?;
    Ok(String::from_utf8(plaintext)?)
}

fn strip_pkcs7(buffer: &mut Vec<u8>) -> Result<(), DecryptionError> {
    let pad = *buffer.last().ok_or(DecryptionError::Padding)? as usize;
    if pad == 0 || pad > BLOCK_LEN || pad > buffer.len() {
        return Err(DecryptionError::Padding);
    }
    let body_len = buffer.len() - pad;
    if buffer[body_len..].iter().any(|&byte| byte as usize != pad) {
        return Err(DecryptionError::Padding);
    }
    buffer.truncate(body_len);
    Ok(())
}

/// Produce the same envelope `decrypt_stats` reads, for a caller-chosen salt.
pub fn encrypt_stats(
    plaintext: &str,
    password: &[u8],
    salt: [u8; SALT_LEN],
) -> Result<Vec<u8>, DecryptionError> {
    let (key, iv) = derive_key_iv(password, &salt);
    // Key and IV lengths are fixed by `derive_key_iv`.
    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut raw = Vec::with_capacity(SALT_MAGIC.len() + SALT_LEN + ciphertext.len());
    raw.extend_from_slice(SALT_MAGIC);
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&ciphertext);

    let encoded = general_purpose::STANDARD.encode(&raw);
    let mut armoured = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE + 1);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
        armoured.push_str(&String::from_utf8_lossy(chunk));
        armoured.push('\n');
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(armoured.as_bytes())
        .map_err(DecryptionError::Gzip)?;
    encoder.finish().map_err(DecryptionError::Gzip)
}
