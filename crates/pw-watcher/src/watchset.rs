//! The single directory subscription a watcher holds.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::WatchError;
use crate::source::EventSource;

#[derive(Debug)]
struct Subscription {
    dir: Utf8PathBuf,
    /// Cleared when the directory vanished and the backend dropped the watch.
    live: bool,
}

/// Owns an [`EventSource`] and at most one subscription on it.
///
/// Rebinding subscribes the new directory before releasing the old one, so
/// the recorded subscription switches from the old directory to the new one
/// in a single step. All calls happen on the watcher's worker, interleaved
/// with event handling, never concurrently with it.
#[derive(Debug)]
pub struct WatchSet<S> {
    source: S,
    active: Option<Subscription>,
}

impl<S: EventSource> WatchSet<S> {
    /// Wraps `source` with no active subscription.
    pub const fn new(source: S) -> Self {
        Self {
            source,
            active: None,
        }
    }

    /// The subscribed directory, if any.
    #[must_use]
    pub fn dir(&self) -> Option<&Utf8Path> {
        self.active.as_ref().map(|sub| sub.dir.as_path())
    }

    /// Makes `dir` the only subscribed directory.
    ///
    /// Returns `Ok(false)` if `dir` was already subscribed and alive. On
    /// failure a live previous subscription is left untouched.
    ///
    /// Re-subscribing the same path after [`mark_gone`](Self::mark_gone) is
    /// the one case that releases first: backends key watches by path, so
    /// the old handle has to go before the new one can be made. Between the
    /// two nothing is subscribed. That costs nothing when the directory
    /// really went away, since the old handle was already deaf. When the
    /// removal was stale and the old handle still worked, events in the gap
    /// are lost; the caller re-checks the target after every rebind, which
    /// recovers whether it exists but not a write made in the gap. If the
    /// new subscription fails, nothing stays subscribed.
    ///
    /// # Errors
    ///
    /// Returns the source's error if `dir` cannot be subscribed.
    pub fn bind(&mut self, dir: &Utf8Path) -> Result<bool, WatchError> {
        match &self.active {
            Some(sub) if sub.dir == dir && sub.live => return Ok(false),
            Some(sub) if sub.dir == dir => {
                self.source.unsubscribe(dir);
                self.active = None;
                self.source.subscribe(dir)?;
            }
            _ => {
                self.source.subscribe(dir)?;
                if let Some(old) = self.active.take() {
                    self.source.unsubscribe(&old.dir);
                }
            }
        }

        self.active = Some(Subscription {
            dir: dir.to_owned(),
            live: true,
        });
        Ok(true)
    }

    /// Records that the subscribed directory disappeared.
    pub fn mark_gone(&mut self) {
        if let Some(sub) = &mut self.active {
            sub.live = false;
        }
    }

    /// Releases the subscription, if any.
    pub fn release(&mut self) {
        if let Some(old) = self.active.take() {
            self.source.unsubscribe(&old.dir);
        }
    }

    /// The wrapped source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }
}
