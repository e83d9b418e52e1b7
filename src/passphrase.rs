//! Passphrase reading functionality

use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use std::io::Read;
use zeroize::Zeroizing;

/// Trait for reading passphrases from various sources
pub trait PassphraseReader {
    /// Read a passphrase as arbitrary bytes (not necessarily UTF-8)
    ///
    /// Returns the passphrase wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Returns a fixed passphrase (for testing)
pub struct ConstantPassphraseReader {
    passphrase: Zeroizing<Vec<u8>>,
}

impl ConstantPassphraseReader {
    pub fn new(passphrase: Vec<u8>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new((*self.passphrase).clone()))
    }
}

/// Reads passphrase from any io::Read source
pub struct ReaderPassphraseReader {
    reader: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading passphrase: {}", e),
                e,
            )
        })?;
        Ok(data)
    }
}

/// Reads passphrase from the controlling terminal with no echo
pub struct TerminalPassphraseReader {
    prompt: String,
}

impl TerminalPassphraseReader {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl Default for TerminalPassphraseReader {
    fn default() -> Self {
        Self::new("Enter passphrase: ")
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    /// Read passphrase from terminal.
    ///
    /// Note: Terminal input is limited to UTF-8 due to rpassword library constraints.
    /// For non-UTF-8 passphrases, use --passphrase-stdin instead.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        // rpassword prompts on and reads from the terminal device, so stdin
        // stays available for data.
        let passphrase = rpassword::prompt_password(&self.prompt).map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading passphrase from terminal: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(passphrase.into_bytes()))
    }
}

/// Reads a passphrase twice and only yields it if both entries match
pub struct ConfirmingPassphraseReader {
    entry: Box<dyn PassphraseReader>,
    confirmation: Box<dyn PassphraseReader>,
}

impl ConfirmingPassphraseReader {
    pub fn new(entry: Box<dyn PassphraseReader>, confirmation: Box<dyn PassphraseReader>) -> Self {
        Self {
            entry,
            confirmation,
        }
    }

    /// Prompts "Enter passphrase" then "Confirm passphrase" on the terminal.
    pub fn terminal() -> Self {
        Self::new(
            Box::new(TerminalPassphraseReader::new("Enter passphrase: ")),
            Box::new(TerminalPassphraseReader::new("Confirm passphrase: ")),
        )
    }
}

impl PassphraseReader for ConfirmingPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let entry = self.entry.read_passphrase()?;
        let confirmation = self.confirmation.read_passphrase()?;
        if !ct_eq(&entry, &confirmation) {
            return Err(LockboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseMismatch,
                "passphrases do not match",
            ));
        }
        Ok(entry)
    }
}

/// Compares two byte strings without short-circuiting on the first
/// differing byte.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
