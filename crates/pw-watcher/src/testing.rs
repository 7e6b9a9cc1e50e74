//! Deterministic in-memory filesystem for driving watchers in tests.
//!
//! [`FakeFs`] models directories and files, queues the events a
//! single-directory backend would report for its subscriptions, and drops a
//! subscription when its directory is removed, as the kernel does. Like an
//! inotify watch, a subscription follows its directory when the directory is
//! moved and keeps reporting under the path it was made for. Events are
//! queued, not delivered, so tests control exactly how stale they are when
//! the engine sees them.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;

use crate::error::WatchError;
use crate::events::{ChildKind, SourceEvent};
use crate::source::{EntryId, EntryKind, EventSource, Probe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    /// A directory and its inode number.
    Dir(u64),
    File,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<Utf8PathBuf, Node>,
    next_inode: u64,
    /// Subscribed path to where that directory is now.
    subscriptions: BTreeMap<Utf8PathBuf, Utf8PathBuf>,
    denied: BTreeSet<Utf8PathBuf>,
    /// Directory to create when the key is subscribed, ahead of the watch.
    racing: BTreeMap<Utf8PathBuf, Utf8PathBuf>,
    queue: VecDeque<SourceEvent>,
    subscribe_calls: usize,
}

impl State {
    fn kind(&self, path: &Utf8Path) -> EntryKind {
        match self.nodes.get(path) {
            Some(Node::Dir(_)) => EntryKind::Directory,
            Some(Node::File) => EntryKind::Other,
            None => EntryKind::Missing,
        }
    }

    fn mkdir(&mut self, path: &Utf8Path) {
        self.next_inode += 1;
        self.nodes.insert(path.to_owned(), Node::Dir(self.next_inode));
    }

    /// Queues the events subscriptions see for `path`, named as subscribed.
    fn emit(&mut self, path: &Utf8Path, kind: ChildKind) {
        let Some(name) = path.file_name() else {
            return;
        };
        let mut events = Vec::new();
        self.subscriptions.retain(|subscribed, actual| {
            if actual.as_path() == path && kind.is_removal() {
                events.extend(SourceEvent::child(subscribed, kind));
                return false;
            }
            if path.parent() == Some(actual.as_path()) {
                events.extend(SourceEvent::child(&subscribed.join(name), kind));
            }
            true
        });
        self.queue.extend(events);
    }

    /// `root` and everything below it.
    fn subtree(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        self.nodes
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect()
    }

    fn children(&self, dir: &Utf8Path) -> Vec<Utf8PathBuf> {
        self.nodes
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect()
    }

    fn remove_tree(&mut self, path: &Utf8Path, kind: ChildKind) {
        for child in self.children(path) {
            self.remove_tree(&child, ChildKind::Removed);
        }
        self.nodes.remove(path);
        self.emit(path, kind);
    }
}

/// Shared in-memory filesystem.
#[derive(Debug, Clone)]
pub(crate) struct FakeFs {
    state: Arc<Mutex<State>>,
}

impl FakeFs {
    pub(crate) fn new() -> Self {
        let mut state = State::default();
        state.mkdir(Utf8Path::new("/"));
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// An event source subscribing on this filesystem.
    pub(crate) fn source(&self) -> FakeSource {
        FakeSource { fs: self.clone() }
    }

    /// Creates `path` and any missing parents. Stops at a plain file.
    pub(crate) fn mkdir_all(&self, path: impl AsRef<Utf8Path>) {
        let mut state = self.state.lock();
        let mut ancestors: Vec<&Utf8Path> = path.as_ref().ancestors().collect();
        ancestors.reverse();
        for dir in ancestors {
            match state.kind(dir) {
                EntryKind::Directory => {}
                EntryKind::Other => return,
                EntryKind::Missing => {
                    state.mkdir(dir);
                    state.emit(dir, ChildKind::Created);
                }
            }
        }
    }

    /// Creates or overwrites a file. Returns `false` if the parent is missing.
    pub(crate) fn write(&self, path: impl AsRef<Utf8Path>) -> bool {
        let path = path.as_ref();
        let mut state = self.state.lock();
        if path.parent().map(|parent| state.kind(parent)) != Some(EntryKind::Directory) {
            return false;
        }
        match state.kind(path) {
            EntryKind::Directory => return false,
            EntryKind::Missing => {
                state.nodes.insert(path.to_owned(), Node::File);
                state.emit(path, ChildKind::Created);
            }
            EntryKind::Other => {}
        }
        state.emit(path, ChildKind::Written);
        true
    }

    /// Removes a file or an empty directory.
    pub(crate) fn remove(&self, path: impl AsRef<Utf8Path>) -> bool {
        let path = path.as_ref();
        let mut state = self.state.lock();
        if state.kind(path) == EntryKind::Missing || !state.children(path).is_empty() {
            return false;
        }
        state.remove_tree(path, ChildKind::Removed);
        true
    }

    /// Removes `path` and everything below it, children first.
    pub(crate) fn remove_all(&self, path: impl AsRef<Utf8Path>) {
        let path = path.as_ref();
        let mut state = self.state.lock();
        if state.kind(path) != EntryKind::Missing {
            state.remove_tree(path, ChildKind::Removed);
        }
    }

    /// Moves a file within or across existing directories.
    pub(crate) fn rename_file(&self, from: impl AsRef<Utf8Path>, to: impl AsRef<Utf8Path>) {
        let (from, to) = (from.as_ref(), to.as_ref());
        let mut state = self.state.lock();
        if state.kind(from) != EntryKind::Other {
            return;
        }
        state.nodes.remove(from);
        state.emit(from, ChildKind::Renamed);
        state.nodes.insert(to.to_owned(), Node::File);
        state.emit(to, ChildKind::Created);
    }

    /// Moves a directory and everything below it to `to`, whose parent must
    /// exist.
    ///
    /// Only the two parents hear about it. A subscription on `from` itself
    /// ends as if it were removed; subscriptions below it stay attached to
    /// their directories.
    pub(crate) fn rename_dir(&self, from: impl AsRef<Utf8Path>, to: impl AsRef<Utf8Path>) {
        let (from, to) = (from.as_ref(), to.as_ref());
        let mut state = self.state.lock();
        if state.kind(from) != EntryKind::Directory
            || state.kind(to) != EntryKind::Missing
            || to.parent().map(|parent| state.kind(parent)) != Some(EntryKind::Directory)
        {
            return;
        }

        state.emit(from, ChildKind::Renamed);
        for old in state.subtree(from) {
            let Ok(rest) = old.strip_prefix(from) else {
                continue;
            };
            let new = to.join(rest);
            if let Some(node) = state.nodes.remove(&old) {
                state.nodes.insert(new.clone(), node);
            }
            for actual in state.subscriptions.values_mut() {
                if *actual == old {
                    actual.clone_from(&new);
                }
            }
        }
        state.emit(to, ChildKind::Created);
    }

    /// Makes every future subscription of `dir` fail.
    pub(crate) fn deny_subscribe(&self, dir: impl AsRef<Utf8Path>) {
        self.state.lock().denied.insert(dir.as_ref().to_owned());
    }

    /// Lets `dir` be subscribed again.
    pub(crate) fn allow_subscribe(&self, dir: impl AsRef<Utf8Path>) {
        self.state.lock().denied.remove(dir.as_ref());
    }

    /// Creates `child` while `dir` is being subscribed, before the
    /// subscription is live, so no event reports it.
    pub(crate) fn mkdir_before_subscribe(&self, dir: impl AsRef<Utf8Path>, child: impl AsRef<Utf8Path>) {
        self.state
            .lock()
            .racing
            .insert(dir.as_ref().to_owned(), child.as_ref().to_owned());
    }

    /// Queues a backend overflow.
    pub(crate) fn overflow(&self) {
        self.state.lock().queue.push_back(SourceEvent::Rescan);
    }

    /// Takes every queued event.
    pub(crate) fn take_events(&self) -> Vec<SourceEvent> {
        self.state.lock().queue.drain(..).collect()
    }

    /// Currently live subscriptions.
    pub(crate) fn subscriptions(&self) -> Vec<String> {
        self.state
            .lock()
            .subscriptions
            .keys()
            .map(ToString::to_string)
            .collect()
    }

    /// Number of subscribe attempts so far.
    pub(crate) fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }
}

impl Probe for FakeFs {
    fn kind(&self, path: &Utf8Path) -> EntryKind {
        self.state.lock().kind(path)
    }

    fn id(&self, path: &Utf8Path) -> Option<EntryId> {
        match self.state.lock().nodes.get(path) {
            Some(Node::Dir(inode)) => Some(EntryId::new(0, *inode)),
            _ => None,
        }
    }
}

/// [`EventSource`] half of a [`FakeFs`].
#[derive(Debug)]
pub(crate) struct FakeSource {
    fs: FakeFs,
}

impl EventSource for FakeSource {
    fn subscribe(&mut self, dir: &Utf8Path) -> Result<(), WatchError> {
        let mut state = self.fs.state.lock();
        state.subscribe_calls += 1;
        if state.denied.contains(dir) {
            return Err(WatchError::subscribe(
                dir,
                notify::Error::generic("permission denied"),
            ));
        }
        if state.kind(dir) != EntryKind::Directory {
            return Err(WatchError::subscribe(dir, notify::Error::path_not_found()));
        }
        if let Some(child) = state.racing.remove(dir) {
            state.mkdir(&child);
            state.emit(&child, ChildKind::Created);
        }
        state.subscriptions.insert(dir.to_owned(), dir.to_owned());
        Ok(())
    }

    fn unsubscribe(&mut self, dir: &Utf8Path) {
        self.fs.state.lock().subscriptions.remove(dir);
    }
}
