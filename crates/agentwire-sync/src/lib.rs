//! Client-side state synchronization for agentwire runs.
//!
//! A producer streams `STATE_SNAPSHOT` and `STATE_DELTA` events; this crate
//! mirrors them into a committed JSON document per run. Deltas are RFC 6902
//! JSON Patch sequences addressed with RFC 6901 pointers, applied atomically
//! against a working copy so a bad delta can never leave the mirror
//! half-updated.

mod engine;
mod error;
mod patch;
mod pointer;

pub use engine::{Applied, SyncEngine};
pub use error::SyncError;
pub use patch::{apply_patch, resolve, PatchOp};
pub use pointer::Pointer;
