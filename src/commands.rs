//! Command implementations behind the `lockbox` binary
//!
//! Input validation happens before the passphrase is requested, so that a
//! typo in a path does not cost the user a passphrase entry.

use crate::cancel::CancelToken;
use crate::confirm::{OverwriteConfirm, ensure_writable};
use crate::envelope;
use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use crate::file_ops::{self, TransformOptions};
use crate::passphrase::PassphraseReader;
use crate::progress::ProgressReporter;
use crate::sink::Sink;
use crate::walker::{self, WalkContext};
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroizing;

/// What to operate on.
pub enum Source {
    /// A literal string or data read from stdin.
    Data(Zeroizing<Vec<u8>>),
    /// A file, or a directory when recursing.
    Path(PathBuf),
}

/// Where the result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Not given on the command line; resolved per operation.
    Default,
    Stdout,
    Path(PathBuf),
}

impl Destination {
    /// Interprets an `--output` argument, where `-` means stdout.
    pub fn from_arg(arg: Option<PathBuf>) -> Self {
        match arg {
            None => Destination::Default,
            Some(path) if path.as_os_str() == "-" => Destination::Stdout,
            Some(path) => Destination::Path(path),
        }
    }
}

pub struct Request {
    pub source: Source,
    pub destination: Destination,
    pub recursive: bool,
    pub remove_original: bool,
}

/// Collaborators supplied by the caller.
pub struct Session<'a> {
    pub passphrase: &'a mut dyn PassphraseReader,
    pub confirm: &'a mut dyn OverwriteConfirm,
    pub progress: &'a mut dyn ProgressReporter,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

enum Plan {
    Buffer {
        data: Zeroizing<Vec<u8>>,
        sink: Sink,
    },
    File {
        input: PathBuf,
        output: Option<PathBuf>,
    },
    Directory(PathBuf),
}

pub fn encrypt(request: Request, session: &mut Session<'_>) -> Result<()> {
    run(request, session, Direction::Encrypt)
}

pub fn decrypt(request: Request, session: &mut Session<'_>) -> Result<()> {
    run(request, session, Direction::Decrypt)
}

fn run(request: Request, session: &mut Session<'_>, direction: Direction) -> Result<()> {
    let remove_original = request.remove_original;
    let plan = plan(request, direction, &mut *session.confirm)?;

    let passphrase = session.passphrase.read_passphrase()?;
    let _armed = session.cancel.arm();

    match plan {
        Plan::Buffer { data, sink } => {
            session.cancel.check()?;
            match direction {
                Direction::Encrypt => {
                    let sealed = envelope::seal(&passphrase, &data)?;
                    session.cancel.check()?;
                    sink.write_sealed(&sealed)
                }
                Direction::Decrypt => {
                    let opened = open_buffer(&passphrase, &data, &session.cancel)?;
                    session.cancel.check()?;
                    sink.write_opened(&opened)
                }
            }
        }
        Plan::File { input, output } => {
            let options = TransformOptions {
                remove_original,
                cancel: session.cancel.clone(),
                ..TransformOptions::default()
            };
            match direction {
                Direction::Encrypt => {
                    file_ops::encrypt_file(&passphrase, &input, output.as_deref(), &options)
                }
                Direction::Decrypt => {
                    file_ops::decrypt_file(&passphrase, &input, output.as_deref(), &options)
                }
            }
        }
        Plan::Directory(root) => {
            if remove_original {
                debug!("--remove-original is implied in directory mode");
            }
            let mut ctx = WalkContext::new(&mut *session.progress, &mut *session.confirm);
            ctx.cancel = session.cancel.clone();
            let count = match direction {
                Direction::Encrypt => walker::encrypt_directory(&passphrase, &root, &mut ctx)?,
                Direction::Decrypt => walker::decrypt_directory(&passphrase, &root, &mut ctx)?,
            };
            debug!(count, "directory done");
            Ok(())
        }
    }
}

fn plan(request: Request, direction: Direction, confirm: &mut dyn OverwriteConfirm) -> Result<Plan> {
    let Request {
        source,
        destination,
        recursive,
        ..
    } = request;

    match source {
        Source::Data(data) => {
            let sink = match destination {
                Destination::Default | Destination::Stdout => Sink::Stdout,
                Destination::Path(path) => Sink::for_destination(Some(path.as_path())),
            };
            if let Some(path) = sink.path() {
                ensure_writable(path, confirm)?;
            }
            Ok(Plan::Buffer { data, sink })
        }
        Source::Path(input) => {
            if !input.exists() {
                return Err(LockboxError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::InputNotFound,
                    format!("{} does not exist", input.display()),
                ));
            }

            if input.is_dir() {
                if !recursive {
                    return Err(LockboxError::with_kind(
                        ErrorCategory::User,
                        ErrorKind::RecursionRequired,
                        format!("{} is a directory; use --recursive", input.display()),
                    ));
                }
                return Ok(Plan::Directory(input));
            }
            if recursive {
                return Err(LockboxError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::NotADirectory,
                    format!("{} is not a directory", input.display()),
                ));
            }

            let output = match destination {
                Destination::Path(path) => Some(path),
                Destination::Stdout => None,
                Destination::Default => match direction {
                    Direction::Encrypt => None,
                    Direction::Decrypt => Some(infer_decrypted_path(&input)?),
                },
            };
            if let Some(output) = &output {
                ensure_writable(output, confirm)?;
            }
            Ok(Plan::File { input, output })
        }
    }
}

/// Opens a single envelope, or the content of a whole encrypted file (one
/// envelope per line) when the buffer holds several lines.
fn open_buffer(passphrase: &[u8], data: &[u8], cancel: &CancelToken) -> Result<Zeroizing<Vec<u8>>> {
    let data = data.trim_ascii();
    if !data.contains(&b'\n') {
        return Ok(Zeroizing::new(envelope::open(passphrase, data)?));
    }
    let mut opened = Zeroizing::new(Vec::new());
    file_ops::decrypt_stream(passphrase, data, &mut *opened, cancel)?;
    Ok(opened)
}

/// `secret.txt.lockbox` decrypts to `secret.txt`.
fn infer_decrypted_path(input: &Path) -> Result<PathBuf> {
    walker::decrypted_path(input).ok_or_else(|| {
        LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::AmbiguousOutputPath,
            format!(
                "cannot infer an output name for {}; use --output",
                input.display()
            ),
        )
    })
}
