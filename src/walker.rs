//! Recursive directory encryption/decryption
//!
//! A walk first takes a snapshot of the eligible files under the root (regular
//! files only, symlinks are never followed or touched), then transforms each
//! file in turn. Every processed file is replaced by its counterpart: the
//! original is removed once the new file has been fully written.
//!
//! The first failure aborts the walk. Files processed before it stay
//! processed; the failing file keeps its original.

use crate::cancel::CancelToken;
use crate::confirm::{OverwriteConfirm, ensure_writable};
use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use crate::file_ops::{self, DEFAULT_CHUNK_SIZE, TEMP_FILE_PREFIX, TransformOptions};
use crate::progress::ProgressReporter;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Appended to the name of every file encrypted in directory mode.
pub const RESERVED_SUFFIX: &str = ".lockbox";

const RESERVED_EXTENSION: &str = "lockbox";

/// The name `path` decrypts to: `dir/a.txt.lockbox` becomes `dir/a.txt`.
///
/// Works on any file name, UTF-8 or not. Returns `None` for names without
/// the reserved suffix and for a bare `.lockbox`.
pub fn decrypted_path(path: &Path) -> Option<PathBuf> {
    if path.extension()? != RESERVED_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?;
    if stem == "." || stem == ".." {
        return None;
    }
    Some(path.with_file_name(stem))
}

/// Collaborators and tunables for a directory walk.
pub struct WalkContext<'a> {
    pub progress: &'a mut dyn ProgressReporter,
    pub confirm: &'a mut dyn OverwriteConfirm,
    pub chunk_size: usize,
    pub cancel: CancelToken,
}

impl<'a> WalkContext<'a> {
    pub fn new(
        progress: &'a mut dyn ProgressReporter,
        confirm: &'a mut dyn OverwriteConfirm,
    ) -> Self {
        Self {
            progress,
            confirm,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel: CancelToken::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

impl Direction {
    fn verb(self) -> &'static str {
        match self {
            Direction::Encrypt => "encrypt",
            Direction::Decrypt => "decrypt",
        }
    }

    /// The path `file` is transformed into, or `None` if the file is not
    /// eligible for this direction.
    fn target_for(self, file: &Path) -> Option<PathBuf> {
        let name = file.file_name()?;
        match self {
            Direction::Encrypt => {
                let mut target: OsString = name.to_os_string();
                target.push(RESERVED_SUFFIX);
                Some(file.with_file_name(target))
            }
            Direction::Decrypt => decrypted_path(file),
        }
    }
}

/// Encrypt every regular file under `root`, replacing `name` with `name.lockbox`.
///
/// Returns the number of files encrypted. Leftover temporary files of an
/// interrupted run are not encrypted.
pub fn encrypt_directory(passphrase: &[u8], root: &Path, ctx: &mut WalkContext<'_>) -> Result<usize> {
    walk(passphrase, root, ctx, Direction::Encrypt)
}

/// Decrypt every `*.lockbox` file under `root`, replacing it with the file
/// named without the suffix. Other files are left alone.
///
/// Returns the number of files decrypted.
pub fn decrypt_directory(passphrase: &[u8], root: &Path, ctx: &mut WalkContext<'_>) -> Result<usize> {
    walk(passphrase, root, ctx, Direction::Decrypt)
}

fn walk(
    passphrase: &[u8],
    root: &Path,
    ctx: &mut WalkContext<'_>,
    direction: Direction,
) -> Result<usize> {
    check_root(root)?;

    let files = snapshot(root, direction)?;
    let total = files.len();
    info!(root = %root.display(), total, "{}ing directory", direction.verb());

    ctx.progress.start(total);
    let result = process(passphrase, &files, ctx, direction);
    ctx.progress.finish();

    result
}

fn process(
    passphrase: &[u8],
    files: &[(PathBuf, PathBuf)],
    ctx: &mut WalkContext<'_>,
    direction: Direction,
) -> Result<usize> {
    let options = TransformOptions {
        remove_original: true,
        chunk_size: ctx.chunk_size,
        cancel: ctx.cancel.clone(),
    };

    // Outputs of this walk. A snapshot entry that was overwritten by one of
    // them holds fresh output, not the file that was listed.
    let mut written: HashSet<&Path> = HashSet::new();
    for (index, (file, target)) in files.iter().enumerate() {
        ctx.cancel.check()?;

        if written.contains(file.as_path()) {
            debug!(path = %file.display(), "skipping output of this walk");
        } else {
            ensure_writable(target, &mut *ctx.confirm)?;
            match direction {
                Direction::Encrypt => {
                    file_ops::encrypt_file(passphrase, file, Some(target), &options)?
                }
                Direction::Decrypt => {
                    file_ops::decrypt_file(passphrase, file, Some(target), &options)?
                }
            }
            written.insert(target);
        }

        ctx.progress.advance(index + 1, files.len());
    }
    Ok(written.len())
}

fn check_root(root: &Path) -> Result<()> {
    if !root.exists() {
        return Err(LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::InputNotFound,
            format!("{} does not exist", root.display()),
        ));
    }
    if !root.is_dir() {
        return Err(LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::NotADirectory,
            format!("{} is not a directory", root.display()),
        ));
    }
    Ok(())
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.as_encoded_bytes().starts_with(TEMP_FILE_PREFIX.as_bytes()))
        .unwrap_or(false)
}

/// Eligible files paired with their targets, in file-name order.
fn snapshot(root: &Path, direction: Direction) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to walk {}", root.display()),
                e,
            )
        })?;

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            debug!(path = %entry.path().display(), "skipping symlink");
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        if is_temp_file(entry.path()) {
            warn!(path = %entry.path().display(), "skipping leftover temporary file");
            continue;
        }

        match direction.target_for(entry.path()) {
            Some(target) => files.push((entry.into_path(), target)),
            None => debug!(path = %entry.path().display(), "skipping ineligible file"),
        }
    }
    Ok(files)
}
