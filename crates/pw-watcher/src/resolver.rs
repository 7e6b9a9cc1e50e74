//! Finding and subscribing the directory to watch for a target.
//!
//! A watcher subscribes to the deepest existing directory on the way to its
//! target: the target's parent when it exists (a tight watch), otherwise the
//! nearest existing ancestor (a loose watch). Resolution always reads the
//! filesystem as it is now, so however stale the event that triggered it, it
//! converges on the current layout.

use camino::{Utf8Path, Utf8PathBuf};
use smallvec::SmallVec;

use crate::error::WatchError;
use crate::source::{EntryKind, EventSource, Probe};
use crate::target::Target;
use crate::watchset::WatchSet;

/// Where a watcher stands relative to its target.
///
/// ```text
/// Resolving ──► Loose(ancestor) ◄──► Tight(parent)
///     │               │                   │
///     └──► Degraded ◄─┴───────────────────┘
///                 (any) ──► Closed
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    /// Not yet resolved.
    Resolving,
    /// Subscribed to an ancestor of the target's missing parent.
    Loose(Utf8PathBuf),
    /// Subscribed to the target's parent.
    Tight(Utf8PathBuf),
    /// Nothing could be subscribed; waiting to retry.
    Degraded,
    /// Unsubscribed; terminal.
    Closed,
}

impl WatchState {
    /// The subscribed directory, for [`Loose`](Self::Loose) and
    /// [`Tight`](Self::Tight).
    #[must_use]
    pub fn dir(&self) -> Option<&Utf8Path> {
        match self {
            Self::Loose(dir) | Self::Tight(dir) => Some(dir),
            Self::Resolving | Self::Degraded | Self::Closed => None,
        }
    }

    /// Returns `true` when watching the target's parent.
    #[inline]
    #[must_use]
    pub const fn is_tight(&self) -> bool {
        matches!(self, Self::Tight(_))
    }
}

/// Upper bound on walks per resolution when directories keep appearing.
const MAX_WALKS: usize = 16;

/// Subscribes the deepest existing, subscribable directory toward `target`.
///
/// Walks up from the target's parent. Missing directories are skipped
/// silently. Each plain file found on the way and each directory that fails
/// to subscribe is passed to `report` before the walk continues upward. If
/// nothing can be subscribed, the old subscription is released,
/// [`WatchError::Unreachable`] is reported, and the result is
/// [`WatchState::Degraded`].
///
/// A loose watch is checked once more after subscribing: if the next
/// directory toward the target was missing during the walk and exists now,
/// it appeared before the subscription took effect and its creation event is
/// lost, so the walk starts over. A directory that failed to subscribe is
/// tried once per resolution and reported once.
pub fn resolve<S, P>(
    target: &Target,
    watch_set: &mut WatchSet<S>,
    probe: &P,
    mut report: impl FnMut(WatchError),
) -> WatchState
where
    S: EventSource,
    P: Probe,
{
    let mut failed = SmallVec::<[&Utf8Path; 4]>::new();
    let mut state = WatchState::Degraded;
    for _ in 0..MAX_WALKS {
        let outcome = walk(target, watch_set, probe, &mut failed, &mut report);
        state = outcome.state;
        let WatchState::Loose(dir) = &state else {
            break;
        };
        let Some(next) = target.next_component(dir) else {
            break;
        };
        let next = dir.join(next);
        if !outcome.missing.contains(&next.as_path()) || probe.kind(&next) != EntryKind::Directory {
            break;
        }
        tracing::trace!(dir = %dir, next = %next, "Directory appeared while subscribing, walking again");
    }
    state
}

/// Outcome of one walk up the ancestors.
struct Walk<'a> {
    state: WatchState,
    /// Directories found missing on the way up.
    missing: SmallVec<[&'a Utf8Path; 4]>,
}

fn walk<'a, S, P>(
    target: &'a Target,
    watch_set: &mut WatchSet<S>,
    probe: &P,
    failed: &mut SmallVec<[&'a Utf8Path; 4]>,
    report: &mut impl FnMut(WatchError),
) -> Walk<'a>
where
    S: EventSource,
    P: Probe,
{
    let mut missing = SmallVec::new();
    for dir in target.ancestors() {
        if failed.contains(&dir) {
            continue;
        }
        match probe.kind(dir) {
            EntryKind::Missing => missing.push(dir),
            EntryKind::Other => report(WatchError::NotADirectory(dir.to_owned())),
            EntryKind::Directory => match watch_set.bind(dir) {
                Ok(changed) => {
                    let state = if target.is_parent(dir) {
                        WatchState::Tight(dir.to_owned())
                    } else {
                        WatchState::Loose(dir.to_owned())
                    };
                    if changed {
                        tracing::debug!(path = %target.path(), state = ?state, "Rebound watch");
                    }
                    return Walk { state, missing };
                }
                Err(error) => {
                    tracing::debug!(dir = %dir, error = %error, "Subscribe failed, walking up");
                    failed.push(dir);
                    report(error);
                }
            },
        }
    }

    watch_set.release();
    report(WatchError::Unreachable(target.path().to_owned()));
    Walk {
        state: WatchState::Degraded,
        missing,
    }
}
