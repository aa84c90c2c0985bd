pub mod constants;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use envelope::{Request, Response};
pub use messages::{Activity, ActivityId};
