//! Low-level filesystem events delivered to a watcher's worker.
//!
//! A backend reports changes to the children of the one directory it is
//! subscribed to. Events name the directory and the child, so the filter can
//! discard anything left over from a previous subscription.
//!
//! # Event Flow
//!
//! ```text
//! notify::Event (paths + kind)
//!        │
//!        ▼
//! SourceEvent::from_notify  (split into dir + child, map kind)
//!        │
//!        ▼
//! worker input channel  ──►  filter::classify
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use smallvec::SmallVec;

use crate::error::WatchError;

/// What happened to a child of a watched directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
    /// The entry appeared (created or moved in).
    Created,
    /// The entry was deleted.
    Removed,
    /// The entry was moved away.
    Renamed,
    /// The entry's content was written.
    Written,
}

impl ChildKind {
    /// Returns `true` if the entry is gone after this event.
    #[inline]
    #[must_use]
    pub const fn is_removal(self) -> bool {
        matches!(self, Self::Removed | Self::Renamed)
    }
}

/// An event from the low-level source.
#[derive(Debug)]
pub enum SourceEvent {
    /// Something happened to `name` inside `dir`.
    ///
    /// When `dir/name` is the subscribed directory itself, the event reports
    /// that directory disappearing.
    Child {
        /// Directory containing the entry.
        dir: Utf8PathBuf,
        /// Base name of the entry.
        name: String,
        /// What happened.
        kind: ChildKind,
    },

    /// The backend lost events and the state must be re-read.
    Rescan,

    /// The backend reported an error.
    Failed(WatchError),
}

impl SourceEvent {
    /// Creates a [`SourceEvent::Child`] for `path`.
    ///
    /// Returns `None` for paths without a parent or base name.
    #[must_use]
    pub fn child(path: &Utf8Path, kind: ChildKind) -> Option<Self> {
        Some(Self::Child {
            dir: path.parent()?.to_owned(),
            name: path.file_name()?.to_owned(),
            kind,
        })
    }

    /// Full path of the entry a [`SourceEvent::Child`] is about.
    #[must_use]
    pub fn path(&self) -> Option<Utf8PathBuf> {
        match self {
            Self::Child { dir, name, .. } => Some(dir.join(name)),
            Self::Rescan | Self::Failed(_) => None,
        }
    }

    /// Converts a `notify` event into zero or more source events.
    ///
    /// Reads, opens and metadata changes are dropped. Ambiguous renames are
    /// resolved by checking whether the path exists now.
    #[must_use]
    pub fn from_notify(event: notify::Event) -> SmallVec<[Self; 2]> {
        let mut out = SmallVec::new();

        if event.need_rescan() {
            out.push(Self::Rescan);
            return out;
        }

        let kinds: SmallVec<[ChildKind; 2]> = match event.kind {
            EventKind::Create(_) => smallvec::smallvec![ChildKind::Created],
            EventKind::Remove(_) => smallvec::smallvec![ChildKind::Removed],
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
            | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                smallvec::smallvec![ChildKind::Written]
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                smallvec::smallvec![ChildKind::Renamed]
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                smallvec::smallvec![ChildKind::Created]
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                smallvec::smallvec![ChildKind::Renamed, ChildKind::Created]
            }
            EventKind::Modify(ModifyKind::Name(_)) => event
                .paths
                .iter()
                .map(|path| {
                    if path.exists() {
                        ChildKind::Created
                    } else {
                        ChildKind::Renamed
                    }
                })
                .collect(),
            _ => {
                tracing::trace!(kind = ?event.kind, "Dropping uninteresting event");
                return out;
            }
        };

        for (path, kind) in event.paths.into_iter().zip(kinds) {
            let path = match Utf8PathBuf::from_path_buf(path) {
                Ok(path) => path,
                Err(invalid) => {
                    tracing::warn!(
                        path = %invalid.display(),
                        "Skipping non-UTF-8 path in file event"
                    );
                    continue;
                }
            };
            if let Some(event) = Self::child(&path, kind) {
                out.push(event);
            }
        }
        out
    }
}
