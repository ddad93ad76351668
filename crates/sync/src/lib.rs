//! Incremental synchronisation of a simple-index mirror.
//!
//! The pieces, leaves first:
//!
//! - [`classify`]: fold changelog events into a [`SyncDiff`];
//! - [`MirrorStateStore`]: the committed cursor and the set of packages
//!   present locally;
//! - [`Executor`]: apply a diff with bounded concurrency, one outcome per
//!   package;
//! - [`Orchestrator`]: bootstrap or incremental cycle, publishing, and the
//!   cursor commit;
//! - [`MirrorLock`]: only one cycle per mirror root at a time.

mod classify;
pub mod error;
mod executor;
mod lock;
mod orchestrator;
mod state;
mod status;

pub use crate::classify::{DiffClassifier, SyncDiff, classify};
pub use crate::executor::{Action, Executor, Outcome, Outcomes};
pub use crate::lock::{LOCK_FILE, MirrorLock};
pub use crate::orchestrator::{CycleKind, CycleSummary, MirrorPhase, Orchestrator, SyncOptions};
pub use crate::state::{CURSOR_FILE, MirrorStateStore, PACKAGES_DIR, ROOT_INDEX, package_dir, package_index};
pub use crate::status::{MirrorStatus, mirror_status};
