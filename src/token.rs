//! Authenticated tokens using XSalsa20Poly1305
//!
//! A token is the base64url text of the binary layout:
//! - version: 1 byte (currently 0x01)
//! - nonce: 24 bytes
//! - sealed box: variable length (includes 16-byte Poly1305 MAC)
//!
//! The sealed box protects `timestamp (8 bytes, big-endian u64 unix seconds) || plaintext`,
//! so the timestamp is covered by the MAC along with the data.
//!
//! Every failure to open a token is reported as
//! [`ErrorKind::AuthenticationFailed`] with the same message, whether the MAC
//! check failed or the token could not even be parsed.

use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

/// Token format version
const VERSION: u8 = 0x01;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of the key a token is sealed under
pub const KEY_LEN: usize = 32;

const TIMESTAMP_LEN: usize = 8;

/// Smallest sealed box: timestamp plus the Poly1305 tag.
const MIN_BOX_LEN: usize = TIMESTAMP_LEN + 16;

const AUTH_FAILED: &str = "corrupt input, tampered-with data, or bad passphrase";

/// Plaintext recovered from a token together with the time it was sealed.
#[derive(Debug)]
pub struct Opened {
    pub plaintext: Vec<u8>,
    /// Seconds since the unix epoch at which the token was created.
    pub issued_at: u64,
}

/// Seal plaintext under `key` with a random nonce and the current time
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    encrypt_deterministic(key, plaintext, &nonce, now())
}

/// Seal plaintext under `key` with the provided nonce and timestamp
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `encrypt()` which generates a random nonce.
pub fn encrypt_deterministic(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    nonce: &[u8; NONCE_LEN],
    issued_at: u64,
) -> Result<String> {
    let cipher = XSalsa20Poly1305::new(&(*key).into());

    let mut message = Zeroizing::new(Vec::with_capacity(TIMESTAMP_LEN + plaintext.len()));
    message.extend_from_slice(&issued_at.to_be_bytes());
    message.extend_from_slice(plaintext);

    let nonce_obj = Nonce::from(*nonce);
    let sealed_box = cipher.encrypt(&nonce_obj, message.as_slice()).map_err(|_| {
        LockboxError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "secretbox encryption failed",
        )
    })?;

    let mut output = Vec::with_capacity(1 + NONCE_LEN + sealed_box.len());
    output.push(VERSION);
    output.extend_from_slice(nonce);
    output.extend_from_slice(&sealed_box);

    Ok(URL_SAFE.encode(output))
}

/// Verify and open a token sealed under `key`
pub fn decrypt(key: &[u8; KEY_LEN], token: &[u8]) -> Result<Opened> {
    let raw = URL_SAFE.decode(token).map_err(|_| auth_failed())?;

    let (&version, rest) = raw.split_first().ok_or_else(auth_failed)?;
    if version != VERSION {
        return Err(auth_failed());
    }
    if rest.len() < NONCE_LEN + MIN_BOX_LEN {
        return Err(auth_failed());
    }
    let (nonce, sealed_box) = rest.split_at(NONCE_LEN);

    let cipher = XSalsa20Poly1305::new(&(*key).into());
    let nonce_obj = Nonce::clone_from_slice(nonce);
    let message = Zeroizing::new(
        cipher
            .decrypt(&nonce_obj, sealed_box)
            .map_err(|_| auth_failed())?,
    );

    let (timestamp, plaintext) = message.split_at(TIMESTAMP_LEN);
    let issued_at = u64::from_be_bytes(timestamp.try_into().map_err(|_| auth_failed())?);

    Ok(Opened {
        plaintext: plaintext.to_vec(),
        issued_at,
    })
}

fn auth_failed() -> LockboxError {
    LockboxError::with_kind(
        ErrorCategory::User,
        ErrorKind::AuthenticationFailed,
        AUTH_FAILED,
    )
}

fn now() -> u64 {
    // A clock before 1970 seals as 0 rather than failing the encryption.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
