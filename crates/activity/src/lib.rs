//! Activity state for a Harmony hub session.
//!
//! Tracks which activity is on, switches activities through the serialized
//! command queue, and keeps the view reconciled with the hub.

pub mod controller;
pub mod keepalive;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testing;

pub use controller::{ActivityChangeController, ChangeResult, ChangeState};
pub use keepalive::{KeepAliveScheduler, Refresher};
pub use registry::{ActivityRecord, ActivityRegistry};
pub use session::{HubSession, SessionConfig, Timings};
