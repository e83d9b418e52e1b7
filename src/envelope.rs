//! Salted envelopes around authenticated tokens
//!
//! An envelope is the unit of ciphertext lockbox produces:
//!
//! ```text
//! base64url(salt) "$" token
//! ```
//!
//! The salt is 16 random bytes, fresh for every call to [`seal`]. The key used
//! for the token is stretched from the passphrase and that salt with
//! PBKDF2-HMAC-SHA256. `$` never occurs in the URL-safe base64 alphabet, so the
//! first `$` always splits salt from token.

use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use crate::token::{self, KEY_LEN, NONCE_LEN};
use base64::{Engine, engine::general_purpose::URL_SAFE};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroizing;

pub use crate::token::Opened;

/// Length of salt in bytes
pub const SALT_LEN: usize = 16;

/// PBKDF2 iteration count
pub const KDF_ITERATIONS: u32 = 700_000;

/// Separator between the encoded salt and the token
pub const SEPARATOR: u8 = b'$';

/// Derive a 32-byte key from a passphrase and salt using PBKDF2-HMAC-SHA256
pub fn derive_key(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, KDF_ITERATIONS, key.as_mut_slice());
    key
}

/// Seal plaintext with a passphrase using a random salt
pub fn seal(passphrase: &[u8], plaintext: &[u8]) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let key = derive_key(passphrase, &salt);
    let token = token::encrypt(&key, plaintext)?;

    Ok(assemble(&salt, &token))
}

/// Seal plaintext with the provided salt, nonce and timestamp
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `seal()` which generates random salt/nonce.
pub fn seal_deterministic(
    passphrase: &[u8],
    plaintext: &[u8],
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
    issued_at: u64,
) -> Result<String> {
    let key = derive_key(passphrase, salt);
    let token = token::encrypt_deterministic(&key, plaintext, nonce, issued_at)?;
    Ok(assemble(salt, &token))
}

/// Open an envelope with a passphrase, returning the plaintext
pub fn open(passphrase: &[u8], envelope: &[u8]) -> Result<Vec<u8>> {
    open_with_timestamp(passphrase, envelope).map(|opened| opened.plaintext)
}

/// Open an envelope, also returning the time at which it was sealed
pub fn open_with_timestamp(passphrase: &[u8], envelope: &[u8]) -> Result<Opened> {
    let (salt, token) = split(envelope.trim_ascii())?;
    let key = derive_key(passphrase, &salt);
    token::decrypt(&key, token)
}

fn assemble(salt: &[u8; SALT_LEN], token: &str) -> String {
    let mut envelope = URL_SAFE.encode(salt);
    envelope.push(SEPARATOR as char);
    envelope.push_str(token);
    envelope
}

fn split(envelope: &[u8]) -> Result<([u8; SALT_LEN], &[u8])> {
    let pos = envelope
        .iter()
        .position(|&b| b == SEPARATOR)
        .ok_or_else(|| malformed("envelope is missing the '$' separator"))?;
    let (encoded_salt, rest) = envelope.split_at(pos);

    let salt = URL_SAFE.decode(encoded_salt).map_err(|e| {
        LockboxError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedEnvelope,
            "envelope salt is not valid base64",
            e,
        )
    })?;
    let salt: [u8; SALT_LEN] = salt.try_into().map_err(|salt: Vec<u8>| {
        malformed(format!(
            "envelope salt must be {} bytes, got {}",
            SALT_LEN,
            salt.len()
        ))
    })?;

    Ok((salt, &rest[1..]))
}

fn malformed(msg: impl Into<String>) -> LockboxError {
    LockboxError::with_kind(ErrorCategory::User, ErrorKind::MalformedEnvelope, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let envelope = seal(b"super secret passphrase", b"this is a sample plaintext").unwrap();
        assert_ne!(envelope.as_bytes(), b"this is a sample plaintext");

        let plaintext = open(b"super secret passphrase", envelope.as_bytes()).unwrap();
        assert_eq!(plaintext, b"this is a sample plaintext");
    }

    #[test]
    fn test_fresh_salt_per_seal() {
        let e1 = seal(b"pw", b"same plaintext").unwrap();
        let e2 = seal(b"pw", b"same plaintext").unwrap();
        assert_ne!(e1, e2);

        let (s1, _) = e1.split_once('$').unwrap();
        let (s2, _) = e2.split_once('$').unwrap();
        assert_ne!(s1, s2);

        assert_eq!(open(b"pw", e1.as_bytes()).unwrap(), b"same plaintext");
        assert_eq!(open(b"pw", e2.as_bytes()).unwrap(), b"same plaintext");
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let salt = [0x30u8; SALT_LEN];
        let k1 = derive_key(b"password", &salt);
        let k2 = derive_key(b"password", &salt);
        assert_eq!(*k1, *k2);

        let k3 = derive_key(b"password", &[0x31u8; SALT_LEN]);
        assert_ne!(*k1, *k3);
    }

    #[test]
    fn test_wrong_passphrase() {
        let envelope = seal(b"correct", b"secret data").unwrap();
        let err = open(b"wrong", envelope.as_bytes()).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_tampered_token() {
        let envelope = seal_deterministic(
            b"pw",
            b"hello",
            &[1u8; SALT_LEN],
            &[2u8; NONCE_LEN],
            1_600_000_000,
        )
        .unwrap();
        let (salt, token) = envelope.split_once('$').unwrap();
        let mut raw = URL_SAFE.decode(token).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x80;
        let tampered = format!("{}${}", salt, URL_SAFE.encode(&raw));

        let err = open(b"pw", tampered.as_bytes()).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_tampered_salt_fails_authentication() {
        let envelope = seal(b"pw", b"hello").unwrap();
        let (_, token) = envelope.split_once('$').unwrap();
        let other_salt = URL_SAFE.encode([9u8; SALT_LEN]);
        let tampered = format!("{}${}", other_salt, token);

        let err = open(b"pw", tampered.as_bytes()).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_missing_separator() {
        let err = open(b"pw", b"no separator here").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_bad_salt_encoding() {
        let err = open(b"pw", b"!!!not-base64!!!$token").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_wrong_salt_length() {
        let short = URL_SAFE.encode([1u8; 4]);
        let err = open(b"pw", format!("{}$abc", short).as_bytes()).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let envelope = seal(b"pw", b"from stdin").unwrap();
        let with_newline = format!("{}\n", envelope);
        assert_eq!(open(b"pw", with_newline.as_bytes()).unwrap(), b"from stdin");
    }

    #[test]
    fn test_open_with_timestamp() {
        let envelope =
            seal_deterministic(b"pw", b"x", &[3u8; SALT_LEN], &[4u8; NONCE_LEN], 1234).unwrap();
        let opened = open_with_timestamp(b"pw", envelope.as_bytes()).unwrap();
        assert_eq!(opened.issued_at, 1234);
        assert_eq!(opened.plaintext, b"x");
    }

    #[test]
    fn test_salt_encoding_is_padded_url_safe() {
        let envelope =
            seal_deterministic(b"pw", b"x", &[0xFBu8; SALT_LEN], &[4u8; NONCE_LEN], 0).unwrap();
        let (salt, _) = envelope.split_once('$').unwrap();
        assert_eq!(salt.len(), 24);
        assert!(salt.ends_with("=="));
        assert!(!salt.contains('+') && !salt.contains('/'));
    }
}
