//! The path a watcher is responsible for.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

use crate::error::WatchError;

/// An absolute, lexically normalised target path.
///
/// The target need not exist. Its parent directory is the deepest directory a
/// watcher ever subscribes to.
///
/// # Examples
///
/// ```
/// use pw_watcher::Target;
/// use camino::Utf8Path;
///
/// let target = Target::new(Utf8Path::new("/srv/./app/../data/state.json")).unwrap();
/// assert_eq!(target.path(), "/srv/data/state.json");
/// assert_eq!(target.parent(), "/srv/data");
/// assert_eq!(target.name(), "state.json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    path: Utf8PathBuf,
    parent: Utf8PathBuf,
    name: String,
}

impl Target {
    /// Normalises `path` into a target.
    ///
    /// Relative paths are resolved against the current working directory.
    /// Symlinks are not followed: the target is watched by name.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidTarget`] for the empty path and for the
    /// filesystem root, and [`WatchError::Io`] if the working directory is
    /// needed but unavailable.
    pub fn new(path: &Utf8Path) -> Result<Self, WatchError> {
        if path.as_str().is_empty() {
            return Err(WatchError::InvalidTarget {
                path: path.to_owned(),
                reason: "path is empty",
            });
        }

        let absolute = if path.is_absolute() {
            path.to_owned()
        } else {
            let cwd = std::env::current_dir()?;
            let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(WatchError::non_utf8_path)?;
            cwd.join(path)
        };

        let path = normalize(&absolute);
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(WatchError::InvalidTarget {
                path,
                reason: "has no parent directory",
            });
        };

        Ok(Self {
            parent: parent.to_owned(),
            name: name.to_owned(),
            path,
        })
    }

    /// The full target path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The directory that directly contains the target.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> &Utf8Path {
        &self.parent
    }

    /// The target's base name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent, then each of its ancestors up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &Utf8Path> {
        self.parent.ancestors()
    }

    /// Returns `true` if `dir` is the target's parent.
    #[inline]
    #[must_use]
    pub fn is_parent(&self, dir: &Utf8Path) -> bool {
        self.parent == dir
    }

    /// Name of the child of `dir` that lies on the way to the target's parent.
    ///
    /// Returns `None` if `dir` is the parent itself or is not one of its
    /// ancestors.
    #[must_use]
    pub fn next_component(&self, dir: &Utf8Path) -> Option<&str> {
        let rest = self.parent.strip_prefix(dir).ok()?;
        match rest.components().next()? {
            Utf8Component::Normal(name) => Some(name),
            _ => None,
        }
    }
}

/// Drops `.` components and applies `..` lexically.
fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_str()),
        }
    }
    out
}
