//! Lockbox - Password-based encryption of strings, files and directory trees
//!
//! Data is sealed into envelopes of the form `base64url(salt)$token`, where
//! the key is stretched from the passphrase with PBKDF2-HMAC-SHA256 and the
//! token is an XSalsa20-Poly1305 secretbox. Files are sealed in chunks, one
//! envelope per line.

#![forbid(unsafe_code)]

pub mod cancel;
pub mod commands;
pub mod confirm;
pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod passphrase;
pub mod progress;
pub mod sink;
pub mod token;
pub mod walker;
