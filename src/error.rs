//! Error types shared across the catalog core.
//!
//! Every fallible public operation returns [`Result`]. The [`ErrorKind`]
//! enumeration is deliberately small and opaque to the UI boundary; callers
//! branch on the kind, never on the message text.

/// Convenient `Result` alias for catalog and plugin operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The operation was cancelled by the caller or the loader token.
    Cancelled,
    /// No plugin (or silo source) supports the requested operation or input.
    NotSupported,
    /// The requested entity does not exist.
    NotFound,
    /// Generic failure with no better category.
    Failed,
    /// The backend requires authentication before proceeding.
    AuthRequired,
    /// Supplied credentials were rejected.
    AuthInvalid,
    /// A plugin-imposed deadline elapsed.
    TimedOut,
    /// A download could not be completed.
    DownloadFailed,
    /// Writing to disk failed.
    WriteFailed,
    /// Deleting from disk failed.
    DeleteFailed,
    /// Plugin ordering rules could not be satisfied.
    PluginDepsolveFailed,
    /// The operation finished but needs a reboot to take effect.
    RestartRequired,
    /// Insufficient disk space.
    NoSpace,
    /// The network is required but unavailable.
    NoNetwork,
}

impl ErrorKind {
    /// Stable lower-case identifier used in event ids and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Failed => "failed",
            ErrorKind::AuthRequired => "auth-required",
            ErrorKind::AuthInvalid => "auth-invalid",
            ErrorKind::TimedOut => "timed-out",
            ErrorKind::DownloadFailed => "download-failed",
            ErrorKind::WriteFailed => "write-failed",
            ErrorKind::DeleteFailed => "delete-failed",
            ErrorKind::PluginDepsolveFailed => "plugin-depsolve-failed",
            ErrorKind::RestartRequired => "restart-required",
            ErrorKind::NoSpace => "no-space",
            ErrorKind::NoNetwork => "no-network",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error value carried by [`Result`].
///
/// Wraps an [`ErrorKind`] and a human-readable message. The message is for
/// logs and event records; it is never localized here.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a [`ErrorKind::Cancelled`] error.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation was cancelled")
    }

    /// Shorthand for a [`ErrorKind::NotSupported`] error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, message)
    }

    /// Shorthand for a [`ErrorKind::Failed`] error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Failed, message)
    }

    /// The failure category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Return a copy of this error normalized to the core domain.
    ///
    /// Errors surfaced to callers or event consumers must use the kinds in
    /// [`ErrorKind`]; anything the plugins wrapped from foreign domains has
    /// already been converted by the `From` impls below, so this only has to
    /// preserve the kind and message.
    pub fn normalized(&self) -> Self {
        self.clone()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::WriteFailed,
            std::io::ErrorKind::StorageFull => ErrorKind::NoSpace,
            std::io::ErrorKind::TimedOut => ErrorKind::TimedOut,
            _ => ErrorKind::Failed,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<roxmltree::Error> for Error {
    fn from(err: roxmltree::Error) -> Self {
        Self::new(ErrorKind::Failed, format!("invalid appstream xml: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(ErrorKind::Cancelled.as_str(), "cancelled");
        assert_eq!(ErrorKind::PluginDepsolveFailed.as_str(), "plugin-depsolve-failed");
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn cancelled_is_detectable() {
        assert!(Error::cancelled().is_cancelled());
        assert!(!Error::failed("x").is_cancelled());
    }
}
