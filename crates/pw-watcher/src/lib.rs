//! Single-path filesystem watcher.
//!
//! This crate watches one path, file or directory, that may or may not exist,
//! and tells the consumer whenever its state may have changed: it was
//! created, written, removed, or one of its ancestor directories appeared or
//! disappeared.
//!
//! # Overview
//!
//! The pw-watcher crate is designed to:
//!
//! - Follow a target through creation, deletion and recreation of any of its
//!   ancestors
//! - Hold exactly one non-recursive directory subscription per watcher, so
//!   watching a deep missing path costs one kernel watch
//! - Coalesce bursts of changes into a single pending signal
//! - Report resolution problems on a separate error stream without ever
//!   stopping
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐ events ┌──────────┐ Decision ┌────────────┐ bind ┌──────────┐
//! │ EventSource │ ─────► │ classify │ ───────► │ resolve    │ ───► │ WatchSet │
//! │ (notify)    │        │ (filter) │          │ (resolver) │      │ (1 dir)  │
//! └─────────────┘        └────┬─────┘          └─────┬──────┘      └──────────┘
//!                             │ notify               │ errors
//!                             ▼                      ▼
//!                      Watcher::changed()    Watcher::next_error()
//! ```
//!
//! A watch is **tight** when it is subscribed to the target's parent and
//! **loose** when the parent is missing and it is subscribed to the nearest
//! existing ancestor instead. A loose watch only reacts to the creation of
//! the next directory on the way to the target.
//!
//! # Crate Dependencies
//!
//! ```text
//! pw-cli ──► pw-watcher ──► pw-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use pw_watcher::Watcher;
//! use tokio::time::{interval, Duration};
//!
//! # async fn example() -> Result<(), pw_watcher::WatchError> {
//! let mut watcher = Watcher::watch("/var/run/app/ready")?;
//! let mut tick = interval(Duration::from_secs(30));
//!
//! loop {
//!     tokio::select! {
//!         changed = watcher.changed() => {
//!             if changed.is_none() {
//!                 break;
//!             }
//!             let ready = std::path::Path::new("/var/run/app/ready").exists();
//!             println!("ready: {ready}");
//!             while let Some(error) = watcher.try_error() {
//!                 eprintln!("watch problem: {error}");
//!             }
//!         }
//!         _ = tick.tick() => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Constructing a watcher fails only for a path that can never be watched or
//! when the platform backend cannot be created. Everything after that arrives
//! on the error stream:
//!
//! ```
//! use pw_watcher::WatchError;
//!
//! fn log_watch_error(err: &WatchError) {
//!     if err.is_transient() {
//!         // Resolution will be retried; the watcher keeps running.
//!         eprintln!("Warning: {err}");
//!     } else {
//!         eprintln!("Watcher error: {err}");
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod filter;
pub mod resolver;
pub mod source;
pub mod target;
pub mod watcher;
pub mod watchset;

#[cfg(test)]
mod testing;

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::{ChildKind, SourceEvent};

// Re-export the resolution building blocks
pub use filter::{Decision, classify};
pub use resolver::{WatchState, resolve};
pub use target::Target;
pub use watchset::WatchSet;

// Re-export collaborator traits and their defaults
pub use source::{EntryId, EntryKind, EventSender, EventSource, NotifySource, Probe, StdProbe};

// Re-export watcher types
pub use pw_core::WatcherConfig;
pub use watcher::Watcher;
