//! Deciding what a low-level event means for the target.
//!
//! [`classify`] is a pure function of the target, the current
//! [`WatchState`], the event and whether the target was last known to exist.
//! It never touches the filesystem; the worker applies the returned
//! [`Decision`].
//!
//! # Rules
//!
//! | State   | Event                                  | Notify           | Rebind |
//! |---------|----------------------------------------|------------------|--------|
//! | any     | watched directory removed or renamed   | if target present| yes    |
//! | Tight   | target created / written               | yes              | no     |
//! | Tight   | target removed / renamed               | yes              | yes    |
//! | Tight   | sibling of the target                  | no               | no     |
//! | Loose   | next path component created            | no               | yes    |
//! | Tight   | backend rescan                         | yes              | yes    |
//! | Loose   | backend rescan / error                 | no               | yes    |
//! | Degraded| anything                               | no               | yes    |
//! | any     | event for another directory (stale)    | no               | no     |

use crate::events::{ChildKind, SourceEvent};
use crate::resolver::WatchState;
use crate::target::Target;

/// What the worker should do about one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decision {
    /// Signal the consumer that the target may have changed.
    pub notify: bool,

    /// Re-resolve the watched directory against the current filesystem.
    pub rebind: bool,

    /// The watched directory itself disappeared.
    pub dir_gone: bool,

    /// What the event says about the target's existence, if anything.
    pub presence: Option<bool>,
}

impl Decision {
    /// Nothing to do.
    pub const IGNORE: Self = Self {
        notify: false,
        rebind: false,
        dir_gone: false,
        presence: None,
    };

    const REBIND: Self = Self {
        rebind: true,
        ..Self::IGNORE
    };

    /// The watched directory is no longer at its path.
    ///
    /// Notifies when the target was last known to exist.
    #[must_use]
    pub const fn dir_lost(present: bool) -> Self {
        Self {
            notify: present,
            rebind: true,
            dir_gone: true,
            presence: Some(false),
        }
    }
}

/// Classifies `event` for `target` in `state`.
///
/// `present` is whether the target was last known to exist; it decides
/// whether losing the watched directory is a change worth reporting.
#[must_use]
pub fn classify(
    target: &Target,
    state: &WatchState,
    event: &SourceEvent,
    present: bool,
) -> Decision {
    let watched = match state {
        WatchState::Loose(dir) | WatchState::Tight(dir) => dir,
        WatchState::Degraded => return Decision::REBIND,
        WatchState::Resolving | WatchState::Closed => return Decision::IGNORE,
    };

    let (dir, name, kind) = match event {
        SourceEvent::Child { dir, name, kind } => (dir, name.as_str(), *kind),
        SourceEvent::Rescan => {
            return Decision {
                notify: state.is_tight(),
                ..Decision::REBIND
            };
        }
        SourceEvent::Failed(_) => return Decision::REBIND,
    };

    if kind.is_removal()
        && watched.parent() == Some(dir.as_path())
        && watched.file_name() == Some(name)
    {
        return Decision::dir_lost(present);
    }

    if dir != watched {
        tracing::trace!(dir = %dir, name, "Ignoring stale event");
        return Decision::IGNORE;
    }

    match state {
        WatchState::Tight(_) if name == target.name() => Decision {
            notify: true,
            rebind: kind.is_removal(),
            dir_gone: false,
            presence: Some(!kind.is_removal()),
        },
        WatchState::Loose(_)
            if kind == ChildKind::Created && target.next_component(watched) == Some(name) =>
        {
            Decision::REBIND
        }
        _ => {
            tracing::trace!(dir = %dir, name, ?kind, "Ignoring unrelated event");
            Decision::IGNORE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::{Utf8Path, Utf8PathBuf};

    fn target() -> Target {
        Target::new(Utf8Path::new("/tmp/foo/bar/afile")).unwrap()
    }

    fn tight() -> WatchState {
        WatchState::Tight(Utf8PathBuf::from("/tmp/foo/bar"))
    }

    fn loose() -> WatchState {
        WatchState::Loose(Utf8PathBuf::from("/tmp"))
    }

    fn child(path: &str, kind: ChildKind) -> SourceEvent {
        SourceEvent::child(Utf8Path::new(path), kind).unwrap()
    }

    #[test]
    fn test_target_changes_notify_when_tight() {
        for kind in [ChildKind::Created, ChildKind::Written] {
            let d = classify(&target(), &tight(), &child("/tmp/foo/bar/afile", kind), false);
            assert_eq!(
                d,
                Decision {
                    notify: true,
                    rebind: false,
                    dir_gone: false,
                    presence: Some(true)
                }
            );
        }
    }

    #[test]
    fn test_target_removal_notifies_and_rebinds() {
        // Renaming the target away is the same as removing it.
        for kind in [ChildKind::Removed, ChildKind::Renamed] {
            let d = classify(&target(), &tight(), &child("/tmp/foo/bar/afile", kind), true);
            assert!(d.notify);
            assert!(d.rebind);
            assert!(!d.dir_gone);
            assert_eq!(d.presence, Some(false));
        }
    }

    #[test]
    fn test_siblings_are_ignored() {
        for kind in [
            ChildKind::Created,
            ChildKind::Removed,
            ChildKind::Renamed,
            ChildKind::Written,
        ] {
            let d = classify(&target(), &tight(), &child("/tmp/foo/bar/other", kind), true);
            assert_eq!(d, Decision::IGNORE);
        }
    }

    #[test]
    fn test_loose_next_component_created_rebinds_silently() {
        let d = classify(&target(), &loose(), &child("/tmp/foo", ChildKind::Created), false);
        assert_eq!(d, Decision::REBIND);
    }

    #[test]
    fn test_loose_ignores_other_activity() {
        let cases = [
            child("/tmp/notfoo", ChildKind::Created),
            child("/tmp/baz", ChildKind::Created),
            child("/tmp/foo", ChildKind::Written),
            child("/tmp/foo", ChildKind::Removed),
            // The target's name one level too high is not the target.
            child("/tmp/afile", ChildKind::Created),
        ];
        for event in &cases {
            assert_eq!(classify(&target(), &loose(), event, false), Decision::IGNORE);
        }
    }

    #[test]
    fn test_watched_dir_gone() {
        let event = child("/tmp/foo/bar", ChildKind::Removed);
        let d = classify(&target(), &tight(), &event, true);
        assert_eq!(d, Decision::dir_lost(true));

        // Nothing observable changes if the target was already gone.
        let d = classify(&target(), &tight(), &event, false);
        assert!(!d.notify);
        assert!(d.rebind);
        assert!(d.dir_gone);

        let d = classify(&target(), &loose(), &child("/tmp", ChildKind::Renamed), false);
        assert!(d.dir_gone);
        assert!(!d.notify);
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let d = classify(&target(), &loose(), &child("/tmp/foo/bar/afile", ChildKind::Removed), true);
        assert_eq!(d, Decision::IGNORE);
    }

    #[test]
    fn test_rescan_and_failures() {
        let d = classify(&target(), &tight(), &SourceEvent::Rescan, true);
        assert!(d.notify && d.rebind);

        let d = classify(&target(), &loose(), &SourceEvent::Rescan, false);
        assert!(!d.notify && d.rebind);

        let failed = SourceEvent::Failed(crate::WatchError::Notify(notify::Error::generic("boom")));
        let d = classify(&target(), &tight(), &failed, true);
        assert!(!d.notify && d.rebind);
    }

    #[test]
    fn test_degraded_retries_and_closed_ignores() {
        let event = child("/tmp/foo", ChildKind::Created);
        assert_eq!(classify(&target(), &WatchState::Degraded, &event, false), Decision::REBIND);
        assert_eq!(classify(&target(), &WatchState::Closed, &event, false), Decision::IGNORE);
        assert_eq!(classify(&target(), &WatchState::Resolving, &event, false), Decision::IGNORE);
    }
}
