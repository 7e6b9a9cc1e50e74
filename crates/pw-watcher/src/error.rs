//! Error types for the pw-watcher crate.
//!
//! This module provides the [`WatchError`] type for everything a path watcher
//! can report, both from construction and on a watcher's error stream.

use camino::Utf8PathBuf;

/// Errors that can occur while watching a path.
///
/// Apart from backend construction failures returned by
/// [`Watcher::watch`](crate::Watcher::watch), these are reported on the
/// watcher's error stream and never stop it.
///
/// # Error Recovery Strategy
///
/// - **Subscribe** ([`WatchError::Subscribe`]): Transient - resolution walks up
/// - **Not a directory** ([`WatchError::NotADirectory`]): Transient - an
///   ancestor component is a plain file; retried on the next structural event
/// - **Unreachable** ([`WatchError::Unreachable`]): Transient - the watcher
///   waits in a degraded state and retries
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Transient - skipped
/// - **Notify** ([`WatchError::Notify`]): Fatal at construction, diagnostic
///   afterwards
/// - **Invalid target** ([`WatchError::InvalidTarget`]): Fatal - nothing to watch
/// - **I/O errors** ([`WatchError::Io`]): Fatal
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The notify backend failed.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// A directory could not be subscribed.
    #[error("cannot watch directory {dir}: {source}")]
    Subscribe {
        /// The directory that could not be subscribed.
        dir: Utf8PathBuf,
        /// The backend's reason.
        #[source]
        source: notify::Error,
    },

    /// A component on the way to the target is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    /// No ancestor of the target could be subscribed.
    #[error("no watchable ancestor for {0}")]
    Unreachable(Utf8PathBuf),

    /// The requested path cannot be watched at all.
    #[error("invalid watch target '{path}': {reason}")]
    InvalidTarget {
        /// The rejected path.
        path: Utf8PathBuf,
        /// Explanation of why the path was rejected.
        reason: &'static str,
    },

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::Subscribe`] error.
    #[inline]
    pub fn subscribe(dir: impl Into<Utf8PathBuf>, source: notify::Error) -> Self {
        Self::Subscribe {
            dir: dir.into(),
            source,
        }
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if the watcher recovers from this error on its own.
    #[inline]
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Subscribe { .. }
                | Self::NotADirectory(_)
                | Self::Unreachable(_)
                | Self::NonUtf8Path(_)
        )
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Subscribe { dir, .. } => Some(dir),
            Self::NotADirectory(path)
            | Self::Unreachable(path)
            | Self::InvalidTarget { path, .. } => Some(path),
            Self::Notify(_) | Self::NonUtf8Path(_) | Self::Io(_) => None,
        }
    }
}
