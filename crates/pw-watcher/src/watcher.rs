//! Path watcher handle and its worker.
//!
//! This module provides the [`Watcher`] type: the per-caller handle that owns
//! one worker, one directory subscription and two output streams.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  Blocking Thread (spawn_blocking)                │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │ NotifySource │ ─►│ Input channel│ ─►│ Engine               │  │
//! │  │ (1 directory)│   │ (crossbeam)  │   │ classify ► rebind    │  │
//! │  └──────────────┘   └──────────────┘   └───────┬──────┬───────┘  │
//! └────────────────────────────────────────────────│──────│──────────┘
//!                                try_send (1 slot) │      │ try_send
//!                                                  ▼      ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Async Runtime (tokio)                       │
//! │        Watcher::changed()            Watcher::next_error()       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use pw_watcher::Watcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut watcher = Watcher::watch("/etc/resolv.conf")?;
//!
//!     while watcher.changed().await.is_some() {
//!         // Re-read the file; the signal carries no detail.
//!         let contents = std::fs::read_to_string("/etc/resolv.conf");
//!         println!("resolv.conf changed: {:?}", contents.map(|c| c.len()));
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use camino::Utf8Path;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use pw_core::WatcherConfig;

use crate::error::WatchError;
use crate::events::SourceEvent;
use crate::filter::{Decision, classify};
use crate::resolver::{WatchState, resolve};
use crate::source::{
    EntryId, EntryKind, EventSender, EventSource, Input, NotifySource, Probe, StdProbe,
};
use crate::target::Target;
use crate::watchset::WatchSet;

/// Floor for the degraded retry and recheck intervals.
const MIN_RETRY: Duration = Duration::from_millis(10);

/// The synchronous state machine run by a watcher's worker.
///
/// Owns the subscription and both stream senders. Every method runs to
/// completion before the next input is read.
pub(crate) struct Engine<S, P> {
    target: Target,
    state: WatchState,
    /// Whether the target was last known to exist.
    present: bool,
    /// Identity of the subscribed directory when it was bound.
    watched_id: Option<EntryId>,
    watch_set: WatchSet<S>,
    probe: P,
    updates: mpsc::Sender<()>,
    errors: mpsc::Sender<WatchError>,
}

impl<S: EventSource, P: Probe> Engine<S, P> {
    pub(crate) const fn new(
        target: Target,
        source: S,
        probe: P,
        updates: mpsc::Sender<()>,
        errors: mpsc::Sender<WatchError>,
    ) -> Self {
        Self {
            target,
            state: WatchState::Resolving,
            present: false,
            watched_id: None,
            watch_set: WatchSet::new(source),
            probe,
            updates,
            errors,
        }
    }

    /// Initial resolution. Records the target's state without notifying.
    pub(crate) fn start(&mut self) {
        self.resolve();
        self.present = self.probe.exists(self.target.path());
        tracing::info!(
            path = %self.target.path(),
            state = ?self.state,
            present = self.present,
            "Path watcher started"
        );
    }

    pub(crate) fn handle(&mut self, event: SourceEvent) {
        let mut decision = classify(&self.target, &self.state, &event, self.present);
        match event {
            SourceEvent::Failed(error) => self.report(error),
            // The subscription follows its directory, so a moved ancestor
            // shows up as events tagged with a path that is no longer ours.
            SourceEvent::Child { dir, .. }
                if !decision.dir_gone
                    && self.state.dir() == Some(dir.as_path())
                    && self.watched_dir_lost() =>
            {
                tracing::debug!(path = %self.target.path(), dir = %dir, "Watched directory moved away");
                decision = Decision {
                    notify: decision.notify || self.present,
                    ..Decision::dir_lost(self.present)
                };
            }
            SourceEvent::Child { .. } | SourceEvent::Rescan => {}
        }
        self.apply(decision);
    }

    /// Periodic work: retries resolution while nothing is subscribed, and
    /// otherwise checks that the subscribed directory is still at its path.
    pub(crate) fn tick(&mut self) {
        if self.is_degraded() {
            self.rebind();
        } else if self.watched_dir_lost() {
            tracing::debug!(path = %self.target.path(), state = ?self.state, "Watched directory moved away");
            self.apply(Decision::dir_lost(self.present));
        }
    }

    fn apply(&mut self, decision: Decision) {
        if decision.notify {
            self.notify();
        }
        if let Some(present) = decision.presence {
            self.present = present;
        }
        if decision.dir_gone {
            self.watch_set.mark_gone();
        }
        if decision.rebind {
            self.rebind();
        }
    }

    pub(crate) fn close(&mut self) {
        self.watch_set.release();
        self.state = WatchState::Closed;
        tracing::info!(path = %self.target.path(), "Path watcher stopped");
    }

    pub(crate) const fn is_degraded(&self) -> bool {
        matches!(self.state, WatchState::Degraded)
    }

    /// Whether the subscribed directory is gone from its path or was
    /// replaced by another directory.
    fn watched_dir_lost(&self) -> bool {
        let Some(dir) = self.state.dir() else {
            return false;
        };
        if self.probe.kind(dir) != EntryKind::Directory {
            return true;
        }
        self.watched_id.is_some() && self.probe.id(dir) != self.watched_id
    }

    /// Re-resolves, then notifies if the target appeared or vanished in the
    /// meantime.
    fn rebind(&mut self) {
        self.resolve();
        let present = self.probe.exists(self.target.path());
        if present != self.present {
            self.present = present;
            self.notify();
        }
    }

    fn resolve(&mut self) {
        let errors = &self.errors;
        self.state = resolve(&self.target, &mut self.watch_set, &self.probe, |error| {
            send_error(errors, error);
        });
        self.watched_id = self.state.dir().and_then(|dir| self.probe.id(dir));
    }

    fn notify(&self) {
        match self.updates.try_send(()) {
            // A full slot already tells the consumer to look again.
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                tracing::trace!(path = %self.target.path(), "Update receiver dropped");
            }
        }
    }

    fn report(&self, error: WatchError) {
        send_error(&self.errors, error);
    }
}

fn send_error(errors: &mpsc::Sender<WatchError>, error: WatchError) {
    match errors.try_send(error) {
        Ok(()) => {}
        Err(TrySendError::Full(error)) => {
            tracing::debug!(error = %error, "Error buffer full, dropping error");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

/// Runs initial resolution.
///
/// On a multi-threaded runtime the calling task's worker thread hands its
/// other tasks off first, since resolution blocks on filesystem calls. A
/// current-thread runtime has nowhere to hand them, so it runs inline.
fn start_engine<S: EventSource, P: Probe>(engine: &mut Engine<S, P>) {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| engine.start()),
        _ => engine.start(),
    }
}

/// Worker loop: one input at a time until shutdown.
///
/// Ticks the engine every `retry` while degraded and every `recheck`
/// otherwise, however busy the input channel is.
fn run_worker<S: EventSource, P: Probe>(
    mut engine: Engine<S, P>,
    inputs: &Receiver<Input>,
    closed: &AtomicBool,
    retry: Duration,
    recheck: Option<Duration>,
) {
    let mut last_tick = Instant::now();
    loop {
        let interval = if engine.is_degraded() {
            Some(retry)
        } else {
            recheck
        };
        let received = match interval {
            Some(interval) => inputs.recv_deadline(last_tick + interval),
            None => inputs.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let input = match received {
            Ok(input) => input,
            Err(RecvTimeoutError::Timeout) => {
                if closed.load(Ordering::Acquire) {
                    break;
                }
                engine.tick();
                last_tick = Instant::now();
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if closed.load(Ordering::Acquire) {
            break;
        }
        match input {
            Input::Event(event) => engine.handle(event),
            Input::Shutdown => break,
        }
    }
    engine.close();
}

/// A watch on a single filesystem path.
///
/// The path need not exist. The watcher follows it through creation,
/// deletion and the deletion or recreation of any of its ancestors, always
/// subscribed to exactly one directory: the target's parent if it exists,
/// otherwise its nearest existing ancestor.
///
/// Renaming an ancestor above that directory produces no event for it. The
/// watcher finds out from the next event the moved directory reports, or
/// from its periodic recheck ([`WatcherConfig::recheck_ms`]), whichever
/// comes first.
///
/// # Streams
///
/// - **Updates** carry no data. Changes that happen before the consumer
///   looks collapse into one pending signal; re-check the target on each one.
/// - **Errors** report resolution problems (a plain file where a directory
///   is needed, a directory that cannot be subscribed). None of them stop
///   the watcher.
///
/// # Lifecycle
///
/// Creating the watcher resolves and subscribes before returning, so any
/// change made afterwards is observed; the initial state is never reported
/// as a change. On a multi-threaded runtime that blocking work runs under
/// [`tokio::task::block_in_place`], so other tasks keep running meanwhile.
/// [`unsubscribe`](Self::unsubscribe) stops the worker and
/// waits for it; dropping the watcher signals the worker without waiting.
pub struct Watcher {
    target: Target,
    updates: mpsc::Receiver<()>,
    errors: mpsc::Receiver<WatchError>,
    control: Sender<Input>,
    closed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("target", &self.target.path())
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Watches `path` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidTarget`] if `path` is empty or the root,
    /// and [`WatchError::Notify`] if the platform watcher cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn watch(path: impl AsRef<Utf8Path>) -> Result<Self, WatchError> {
        Self::with_config(path, &WatcherConfig::default())
    }

    /// Watches `path` using the platform's `notify` backend.
    ///
    /// # Errors
    ///
    /// See [`Watcher::watch`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn with_config(
        path: impl AsRef<Utf8Path>,
        config: &WatcherConfig,
    ) -> Result<Self, WatchError> {
        Self::with_source(path, config, StdProbe, NotifySource::new)
    }

    /// Watches `path` using a custom event source and probe.
    ///
    /// `make_source` receives the sender the source must deliver its events
    /// through.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidTarget`] for unwatchable paths and
    /// whatever `make_source` returns.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn with_source<S, P, F>(
        path: impl AsRef<Utf8Path>,
        config: &WatcherConfig,
        probe: P,
        make_source: F,
    ) -> Result<Self, WatchError>
    where
        S: EventSource,
        P: Probe,
        F: FnOnce(EventSender) -> Result<S, WatchError>,
    {
        let target = Target::new(path.as_ref())?;

        let (control, inputs) = crossbeam_channel::unbounded();
        let source = make_source(EventSender::new(control.clone()))?;

        let (updates_tx, updates) = mpsc::channel(1);
        let (errors_tx, errors) = mpsc::channel(config.error_buffer.max(1));

        let mut engine = Engine::new(target.clone(), source, probe, updates_tx, errors_tx);
        start_engine(&mut engine);

        let closed = Arc::new(AtomicBool::new(false));
        let worker_closed = Arc::clone(&closed);
        let retry = config.degraded_retry().max(MIN_RETRY);
        let recheck = config.recheck().map(|recheck| recheck.max(MIN_RETRY));
        let task = tokio::task::spawn_blocking(move || {
            run_worker(engine, &inputs, &worker_closed, retry, recheck);
        });

        Ok(Self {
            target,
            updates,
            errors,
            control,
            closed,
            task: Some(task),
        })
    }

    /// The normalised path being watched.
    #[must_use]
    pub fn target(&self) -> &Utf8Path {
        self.target.path()
    }

    /// Waits for the next change signal.
    ///
    /// Returns `None` once the watcher has been unsubscribed.
    pub async fn changed(&mut self) -> Option<()> {
        self.updates.recv().await
    }

    /// Takes a pending change signal without waiting.
    pub fn try_changed(&mut self) -> bool {
        self.updates.try_recv().is_ok()
    }

    /// Waits for the next error.
    ///
    /// Returns `None` once the watcher has been unsubscribed.
    pub async fn next_error(&mut self) -> Option<WatchError> {
        self.errors.recv().await
    }

    /// Takes a pending error without waiting.
    pub fn try_error(&mut self) -> Option<WatchError> {
        self.errors.try_recv().ok()
    }

    /// The change signal stream, for use with `tokio::select!`.
    pub fn updates(&mut self) -> &mut mpsc::Receiver<()> {
        &mut self.updates
    }

    /// The error stream, for use with `tokio::select!`.
    pub fn errors(&mut self) -> &mut mpsc::Receiver<WatchError> {
        &mut self.errors
    }

    /// Both streams at once, so one `tokio::select!` can wait on either.
    pub fn streams(&mut self) -> (&mut mpsc::Receiver<()>, &mut mpsc::Receiver<WatchError>) {
        (&mut self.updates, &mut self.errors)
    }

    /// Returns `true` until the watcher is unsubscribed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops watching.
    ///
    /// On return the worker has exited and the subscription is released; no
    /// further signals or errors are sent. Calling it again does nothing.
    pub async fn unsubscribe(&mut self) {
        self.closed.store(true, Ordering::Release);
        // The worker may already be gone; that is the goal anyway.
        let _ = self.control.send(Input::Shutdown);

        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(path = %self.target.path(), error = %error, "Watcher worker failed");
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.control.send(Input::Shutdown);
        // Drop is sync: the worker finishes on its own after the signal.
    }
}
