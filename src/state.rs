//! Host state tracking - poll-to-push bridge
//!
//! The host offers no change notifications for most of its state, so the
//! diff engine re-reads every subscribed `<module>.<accessor>` path once per
//! idle tick and publishes the ones whose value moved.

mod diff;

pub use diff::{StateDiffEngine, TickReport};

/// Heartbeat published at the start of every idle tick
pub const IDLE_EVENT: &str = "idle";
