//! Chunked file encryption/decryption
//!
//! An encrypted file is a sequence of envelopes separated by `\n`, one per
//! plaintext chunk, in chunk order. There is no header or footer; decryption
//! reads until end of input.
//!
//! File output is always staged in a temporary file next to the destination
//! and renamed into place once complete, so a failed or interrupted operation
//! never leaves a partial destination behind.

use crate::cancel::CancelToken;
use crate::envelope;
use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Plaintext bytes sealed into a single envelope.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Name prefix of staged output files.
pub(crate) const TEMP_FILE_PREFIX: &str = ".lockbox-tmp";

#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Delete the input once the output has been fully written.
    pub remove_original: bool,
    pub chunk_size: usize,
    pub cancel: CancelToken,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            remove_original: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel: CancelToken::new(),
        }
    }
}

/// Encrypt a file with a passphrase
///
/// Reads `input_path` in `options.chunk_size` chunks and writes one envelope
/// line per chunk to `output_path`, or to stdout when no output is given.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn encrypt_file(
    passphrase: &[u8],
    input_path: &Path,
    output_path: Option<&Path>,
    options: &TransformOptions,
) -> Result<()> {
    let input = open_input(input_path)?;

    let chunks = match output_path {
        Some(output_path) => {
            let mut pending = PendingFile::create(output_path)?;
            let chunks = encrypt_stream(
                passphrase,
                input,
                &mut pending,
                options.chunk_size,
                &options.cancel,
            )
            .map_err(|e| e.with_context(format!("failed to encrypt {}", input_path.display())))?;
            pending.commit()?;
            chunks
        }
        None => {
            let mut stdout = io::stdout().lock();
            let chunks = encrypt_stream(
                passphrase,
                input,
                &mut stdout,
                options.chunk_size,
                &options.cancel,
            )
            .map_err(|e| e.with_context(format!("failed to encrypt {}", input_path.display())))?;
            stdout.flush().map_err(|e| stream_error("flush stdout", e))?;
            chunks
        }
    };

    info!(input = %input_path.display(), chunks, "encrypted file");

    if options.remove_original {
        remove_original(input_path, output_path)?;
    }
    Ok(())
}

/// Decrypt a file with a passphrase
///
/// Reads one envelope per line from `input_path` and writes the concatenated
/// plaintext to `output_path`, or to stdout when no output is given. The first
/// line that fails to open aborts the whole operation; no output file is left
/// behind in that case.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn decrypt_file(
    passphrase: &[u8],
    input_path: &Path,
    output_path: Option<&Path>,
    options: &TransformOptions,
) -> Result<()> {
    let input = BufReader::new(open_input(input_path)?);

    let chunks = match output_path {
        Some(output_path) => {
            let mut pending = PendingFile::create(output_path)?;
            let chunks = decrypt_stream(passphrase, input, &mut pending, &options.cancel)
                .map_err(|e| e.with_context(format!("failed to decrypt {}", input_path.display())))?;
            pending.commit()?;
            chunks
        }
        None => {
            let mut stdout = io::stdout().lock();
            let chunks = decrypt_stream(passphrase, input, &mut stdout, &options.cancel)
                .map_err(|e| e.with_context(format!("failed to decrypt {}", input_path.display())))?;
            stdout.flush().map_err(|e| stream_error("flush stdout", e))?;
            chunks
        }
    };

    info!(input = %input_path.display(), chunks, "decrypted file");

    if options.remove_original {
        remove_original(input_path, output_path)?;
    }
    Ok(())
}

/// Seal `input` chunk by chunk, writing `envelope\n` per chunk to `output`.
///
/// Returns the number of chunks written. Empty input produces no output.
pub fn encrypt_stream<R: Read, W: Write + ?Sized>(
    passphrase: &[u8],
    mut input: R,
    output: &mut W,
    chunk_size: usize,
    cancel: &CancelToken,
) -> Result<usize> {
    if chunk_size == 0 {
        return Err(LockboxError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "chunk size must be positive",
        ));
    }

    let mut chunk = Zeroizing::new(Vec::with_capacity(chunk_size.min(DEFAULT_CHUNK_SIZE)));
    let mut count = 0;
    loop {
        cancel.check()?;

        chunk.clear();
        input
            .by_ref()
            .take(chunk_size as u64)
            .read_to_end(&mut chunk)
            .map_err(|e| stream_error("read input", e))?;
        if chunk.is_empty() {
            break;
        }

        let sealed = envelope::seal(passphrase, &chunk)?;
        output
            .write_all(sealed.as_bytes())
            .and_then(|_| output.write_all(b"\n"))
            .map_err(|e| stream_error("write output", e))?;

        count += 1;
        debug!(chunk = count, bytes = chunk.len(), "sealed chunk");

        if chunk.len() < chunk_size {
            break;
        }
    }
    // An interrupt during the last read must not let the output be committed.
    cancel.check()?;
    Ok(count)
}

/// Open one envelope per line of `input`, writing the plaintext to `output`.
///
/// Returns the number of chunks decrypted.
pub fn decrypt_stream<R: BufRead, W: Write + ?Sized>(
    passphrase: &[u8],
    mut input: R,
    output: &mut W,
    cancel: &CancelToken,
) -> Result<usize> {
    let mut line = Vec::new();
    let mut count = 0;
    loop {
        cancel.check()?;

        line.clear();
        let read = input
            .read_until(b'\n', &mut line)
            .map_err(|e| stream_error("read input", e))?;
        if read == 0 {
            break;
        }
        count += 1;

        let envelope = strip_line_ending(&line);
        let plaintext = Zeroizing::new(
            envelope::open(passphrase, envelope)
                .map_err(|e| e.with_context(format!("line {} could not be decrypted", count)))?,
        );
        output
            .write_all(&plaintext)
            .map_err(|e| stream_error("write output", e))?;

        debug!(chunk = count, bytes = plaintext.len(), "opened chunk");
    }
    cancel.check()?;
    Ok(count)
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn open_input(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::InputNotFound,
            format!("{} does not exist", path.display()),
        ));
    }
    File::open(path).map_err(|e| LockboxError::io(path, "read from", e))
}

/// Deletes the input after a successful transform, unless the output
/// replaced it in place.
fn remove_original(input_path: &Path, output_path: Option<&Path>) -> Result<()> {
    if let Some(output_path) = output_path {
        if same_file(input_path, output_path) {
            warn!(
                path = %input_path.display(),
                "output replaced the input; not removing it"
            );
            return Ok(());
        }
    }
    fs::remove_file(input_path).map_err(|e| LockboxError::io(input_path, "remove", e))?;
    debug!(path = %input_path.display(), "removed original");
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn stream_error(action: &str, err: io::Error) -> LockboxError {
    LockboxError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::Io,
        format!("failed to {}", action),
        err,
    )
}

/// Output staged in a temporary file beside its destination.
///
/// Dropping a `PendingFile` without calling [`PendingFile::commit`] deletes the
/// temporary file and leaves the destination untouched.
pub(crate) struct PendingFile {
    target: PathBuf,
    writer: BufWriter<NamedTempFile>,
}

impl PendingFile {
    pub(crate) fn create(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| LockboxError::io(target, "create temporary file for", e))?;
        Ok(Self {
            target: target.to_path_buf(),
            writer: BufWriter::new(temp),
        })
    }

    /// Flush, fsync and atomically rename into place.
    pub(crate) fn commit(self) -> Result<()> {
        let target = self.target;
        let temp = self
            .writer
            .into_inner()
            .map_err(|e| LockboxError::io(&target, "write", e.into_error()))?;

        // fsync() such that the rename later, if it succeeds, will always
        // point to a valid file.
        temp.as_file()
            .sync_all()
            .map_err(|e| LockboxError::io(&target, "sync", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| LockboxError::io(&target, "set permissions on", e))?;
        }

        temp.persist(&target)
            .map_err(|e| LockboxError::io(&target, "rename into", e.error))?;
        Ok(())
    }
}

impl Write for PendingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
