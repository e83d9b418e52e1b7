//! Confirmation before overwriting existing files

use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

/// Decides whether an existing file may be overwritten.
pub trait OverwriteConfirm {
    fn confirm_overwrite(&mut self, path: &Path) -> Result<bool>;
}

/// Always allows overwriting (`--force`).
#[derive(Debug, Default)]
pub struct AlwaysOverwrite;

impl OverwriteConfirm for AlwaysOverwrite {
    fn confirm_overwrite(&mut self, _path: &Path) -> Result<bool> {
        Ok(true)
    }
}

/// Never allows overwriting.
#[derive(Debug, Default)]
pub struct NeverOverwrite;

impl OverwriteConfirm for NeverOverwrite {
    fn confirm_overwrite(&mut self, _path: &Path) -> Result<bool> {
        Ok(false)
    }
}

/// Asks on the controlling terminal.
///
/// The answer is read from the terminal device rather than stdin, since stdin
/// may be carrying the data being encrypted.
#[derive(Debug, Default)]
pub struct TerminalConfirm;

impl OverwriteConfirm for TerminalConfirm {
    fn confirm_overwrite(&mut self, path: &Path) -> Result<bool> {
        let mut stderr = io::stderr();
        if !stderr.is_terminal() {
            // Nobody to ask; refuse rather than clobber silently.
            return Ok(false);
        }

        write!(stderr, "{} already exists. Overwrite? [y/N] ", path.display())
            .and_then(|_| stderr.flush())
            .map_err(|e| {
                LockboxError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to write prompt",
                    e,
                )
            })?;

        let mut answer = String::new();
        read_tty_line(&mut answer).map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to read confirmation",
                e,
            )
        })?;

        Ok(is_affirmative(&answer))
    }
}

#[cfg(unix)]
fn read_tty_line(buf: &mut String) -> io::Result<usize> {
    let tty = std::fs::File::open("/dev/tty")?;
    io::BufReader::new(tty).read_line(buf)
}

#[cfg(not(unix))]
fn read_tty_line(buf: &mut String) -> io::Result<usize> {
    io::stdin().lock().read_line(buf)
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Consults `confirm` if `target` exists, failing with `OverwriteDeclined`
/// when the answer is no.
pub fn ensure_writable(target: &Path, confirm: &mut dyn OverwriteConfirm) -> Result<()> {
    if target.exists() && !confirm.confirm_overwrite(target)? {
        return Err(LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::OverwriteDeclined,
            format!("refusing to overwrite {}", target.display()),
        ));
    }
    Ok(())
}
