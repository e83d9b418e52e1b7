//! Destinations for single-buffer (string/stdin) results

use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use crate::file_ops::PendingFile;
use image::Luma;
use qrcode::QrCode;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Extensions that make a sealed envelope render as a QR code image.
const QR_CODE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    Stdout,
    File(PathBuf),
    /// A file whose extension names an image format. Sealed output is drawn
    /// as a QR code; opened output is written verbatim.
    QrImage(PathBuf),
}

impl Sink {
    pub fn for_destination(destination: Option<&Path>) -> Self {
        match destination {
            None => Sink::Stdout,
            Some(path) if is_qr_path(path) => Sink::QrImage(path.to_path_buf()),
            Some(path) => Sink::File(path.to_path_buf()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Sink::Stdout => None,
            Sink::File(path) | Sink::QrImage(path) => Some(path),
        }
    }

    /// Emit a sealed envelope.
    pub fn write_sealed(&self, envelope: &str) -> Result<()> {
        self.write_sealed_to(envelope, &mut io::stdout().lock())
    }

    /// Emit decrypted plaintext.
    pub fn write_opened(&self, plaintext: &[u8]) -> Result<()> {
        self.write_opened_to(plaintext, &mut io::stdout().lock())
    }

    /// Like [`Sink::write_sealed`], with `stdout` standing in for the process's
    /// standard output.
    pub fn write_sealed_to(&self, envelope: &str, stdout: &mut dyn Write) -> Result<()> {
        match self {
            Sink::Stdout => print_line(stdout, envelope.as_bytes()),
            Sink::File(path) => write_file(path, envelope.as_bytes()),
            Sink::QrImage(path) => write_qr_code(path, envelope),
        }
    }

    /// Like [`Sink::write_opened`], with `stdout` standing in for the process's
    /// standard output.
    pub fn write_opened_to(&self, plaintext: &[u8], stdout: &mut dyn Write) -> Result<()> {
        match self {
            Sink::Stdout => print_line(stdout, plaintext),
            Sink::File(path) | Sink::QrImage(path) => write_file(path, plaintext),
        }
    }
}

fn is_qr_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            QR_CODE_EXTENSIONS
                .iter()
                .any(|qr| ext.eq_ignore_ascii_case(qr))
        })
        .unwrap_or(false)
}

fn print_line(stdout: &mut dyn Write, data: &[u8]) -> Result<()> {
    stdout
        .write_all(data)
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
        .map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to write to stdout",
                e,
            )
        })
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut pending = PendingFile::create(path)?;
    pending
        .write_all(data)
        .map_err(|e| LockboxError::io(path, "write", e))?;
    pending.commit()?;
    info!(path = %path.display(), bytes = data.len(), "wrote output file");
    Ok(())
}

fn write_qr_code(path: &Path, envelope: &str) -> Result<()> {
    let code = QrCode::new(envelope.as_bytes()).map_err(|e| {
        LockboxError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::QrEncoding,
            "encrypted data does not fit in a QR code",
            e,
        )
    })?;
    let image = code.render::<Luma<u8>>().build();
    image.save(path).map_err(|e| {
        LockboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::QrEncoding,
            format!("failed to save QR code to {}", path.display()),
            e,
        )
    })?;
    info!(path = %path.display(), "wrote QR code");
    Ok(())
}
