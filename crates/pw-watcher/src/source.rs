//! Capabilities a watcher consumes from the operating system.
//!
//! - [`EventSource`] subscribes to change events for one directory at a time.
//! - [`Probe`] answers existence and identity queries during resolution.
//!
//! [`NotifySource`] and [`StdProbe`] are the production implementations.
//! Everything above them works against the traits, so resolution and
//! filtering can be driven by a deterministic in-memory filesystem in tests.

use camino::Utf8Path;
use crossbeam_channel::Sender;
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};

use crate::error::WatchError;
use crate::events::SourceEvent;

/// Subscription to change events for single directories.
///
/// Implementations deliver events for the children of subscribed directories
/// (and for the subscribed directory itself disappearing) through whatever
/// channel they were built with, usually an [`EventSender`].
pub trait EventSource: Send + 'static {
    /// Starts delivering events for the children of `dir`.
    ///
    /// Must fail synchronously if `dir` does not exist or is not a directory.
    fn subscribe(&mut self, dir: &Utf8Path) -> Result<(), WatchError>;

    /// Stops delivering events for `dir`.
    ///
    /// Releasing a subscription whose directory already vanished is not an
    /// error.
    fn unsubscribe(&mut self, dir: &Utf8Path);
}

/// What exists at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Nothing, or nothing reachable.
    Missing,
    /// A directory (possibly through a symlink).
    Directory,
    /// Anything else: a file, a socket, a device.
    Other,
}

/// Identity of a filesystem entry: the same until the entry is deleted,
/// even when it is moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
    device: u64,
    inode: u64,
}

impl EntryId {
    /// Identity from a device and inode number.
    #[must_use]
    pub const fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }
}

/// Filesystem existence queries.
pub trait Probe: Send + 'static {
    /// Reports what exists at `path`.
    fn kind(&self, path: &Utf8Path) -> EntryKind;

    /// Returns `true` if anything exists at `path`.
    fn exists(&self, path: &Utf8Path) -> bool {
        self.kind(path) != EntryKind::Missing
    }

    /// Identity of the entry at `path`, where the platform has one.
    ///
    /// Lets a watcher notice that its directory was swapped for another one
    /// at the same path. The default knows nothing, which limits that check
    /// to whether a directory is still there at all.
    fn id(&self, _path: &Utf8Path) -> Option<EntryId> {
        None
    }
}

/// [`Probe`] backed by `std::fs::metadata`.
///
/// Symlinks are followed. Every error reads as [`EntryKind::Missing`]: a
/// component that is a file, a permission error and a plain `NotFound` all
/// mean the path cannot be reached right now.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdProbe;

impl Probe for StdProbe {
    fn kind(&self, path: &Utf8Path) -> EntryKind {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => EntryKind::Directory,
            Ok(_) => EntryKind::Other,
            Err(_) => EntryKind::Missing,
        }
    }

    #[cfg(unix)]
    fn id(&self, path: &Utf8Path) -> Option<EntryId> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata(path).ok()?;
        Some(EntryId::new(meta.dev(), meta.ino()))
    }
}

/// Input to a watcher's worker.
#[derive(Debug)]
pub(crate) enum Input {
    Event(SourceEvent),
    Shutdown,
}

/// Handle a source uses to push events to its watcher's worker.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Input>,
}

impl EventSender {
    pub(crate) const fn new(tx: Sender<Input>) -> Self {
        Self { tx }
    }

    /// Queues an event for the worker.
    ///
    /// Returns `false` once the worker has gone away.
    pub fn send(&self, event: SourceEvent) -> bool {
        self.tx.send(Input::Event(event)).is_ok()
    }
}

/// [`EventSource`] backed by the platform's recommended `notify` watcher.
///
/// Each subscription is a non-recursive watch on one directory.
pub struct NotifySource {
    watcher: RecommendedWatcher,
}

impl std::fmt::Debug for NotifySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySource").finish_non_exhaustive()
    }
}

impl NotifySource {
    /// Creates the backend, forwarding converted events to `events`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Notify`] if the platform watcher cannot be
    /// created (for example when the inotify instance limit is reached).
    pub fn new(events: EventSender) -> Result<Self, WatchError> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for event in SourceEvent::from_notify(event) {
                        if !events.send(event) {
                            tracing::trace!("Watcher worker gone, dropping event");
                            break;
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Notify backend error");
                    events.send(SourceEvent::Failed(WatchError::Notify(error)));
                }
            }
        })?;
        Ok(Self { watcher })
    }
}

impl EventSource for NotifySource {
    fn subscribe(&mut self, dir: &Utf8Path) -> Result<(), WatchError> {
        // inotify happily watches plain files; only directories are valid here.
        match std::fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(WatchError::subscribe(
                    dir,
                    notify::Error::io(std::io::Error::new(
                        std::io::ErrorKind::NotADirectory,
                        "not a directory",
                    )),
                ));
            }
            Err(error) => return Err(WatchError::subscribe(dir, notify::Error::io(error))),
        }

        self.watcher
            .watch(dir.as_std_path(), RecursiveMode::NonRecursive)
            .map_err(|error| WatchError::subscribe(dir, error))
    }

    fn unsubscribe(&mut self, dir: &Utf8Path) {
        if let Err(error) = self.watcher.unwatch(dir.as_std_path()) {
            tracing::trace!(dir = %dir, error = %error, "Unwatch failed, directory already gone");
        }
    }
}
