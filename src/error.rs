use std::error::Error as StdError;
use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Use of Internal is never a guarantee that the error was not caused by
    /// the user - merely that it cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A referenced file or directory does not exist.
    InputNotFound,
    /// A recursive operation was requested on something that is not a directory.
    NotADirectory,
    /// Decryption was requested without an output path and none could be
    /// inferred from the input name.
    AmbiguousOutputPath,
    /// Authentication failed due to an incorrect passphrase, tampering or
    /// corruption of the token.
    AuthenticationFailed,
    /// The envelope is missing its separator or carries an invalid salt.
    MalformedEnvelope,
    /// The passphrase confirmation did not match the first entry.
    PassphraseMismatch,
    /// The user declined to overwrite an existing file.
    OverwriteDeclined,
    /// A directory was given without asking for recursion.
    RecursionRequired,
    /// The operation was interrupted by the user.
    Aborted,
    /// Passphrase could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// Rendering an envelope as a QR code image failed.
    QrEncoding,
    /// Unexpected state reached within lockbox logic.
    InternalInvariant,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct LockboxError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl LockboxError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Shorthand for a user-caused I/O failure on `path`.
    pub(crate) fn io(path: &Path, action: &str, err: io::Error) -> Self {
        let category = match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ErrorCategory::User,
            _ => ErrorCategory::Internal,
        };
        Self::with_kind_and_source(
            category,
            ErrorKind::Io,
            format!("failed to {} {}", action, path.display()),
            err,
        )
    }

    pub(crate) fn aborted() -> Self {
        Self::with_kind(ErrorCategory::User, ErrorKind::Aborted, "Aborted")
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// True if this error carries `kind`.
    ///
    /// Only this error's own kind is compared. [`with_context`](Self::with_context)
    /// copies the wrapped error's kind, so wrapping does not hide it.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == Some(kind)
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }

    /// Renders the message followed by every message in the source chain,
    /// separated by `": "`.
    pub fn report(&self) -> String {
        let mut out = self.msg.clone();
        let mut next = StdError::source(self);
        while let Some(err) = next {
            out.push_str(": ");
            out.push_str(&err.to_string());
            next = err.source();
        }
        out
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LockboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_preserves_kind_and_category() {
        let err = LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::AuthenticationFailed,
            "bad passphrase",
        )
        .with_context("failed to decrypt line 3");

        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        assert!(err.is(ErrorKind::AuthenticationFailed));
        assert_eq!(err.category, ErrorCategory::User);
        assert_eq!(err.message(), "failed to decrypt line 3");
        assert!(err.source_error().is_some());
    }

    #[test]
    fn test_report_walks_source_chain() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err = LockboxError::io(Path::new("/tmp/x"), "read", io_err).with_context("encrypt failed");

        assert_eq!(
            err.report(),
            "encrypt failed: failed to read /tmp/x: no such file"
        );
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_error_without_kind() {
        let err = LockboxError::new(ErrorCategory::Internal, "oops");
        assert_eq!(err.kind, None);
        assert!(!err.is(ErrorKind::Io));
    }

    #[test]
    fn test_is_compares_own_kind_only() {
        // A kindless wrapper built by hand does not inherit the kind of its source.
        let inner = LockboxError::aborted();
        let outer = LockboxError {
            category: ErrorCategory::Internal,
            kind: None,
            source: Some(Box::new(inner)),
            msg: "outer".into(),
        };
        assert!(!outer.is(ErrorKind::Aborted));
        assert!(LockboxError::aborted().with_context("stopped").is(ErrorKind::Aborted));
    }
}
