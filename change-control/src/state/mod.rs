//! Storage primitives shared by both controllers.
//!
//! - [`ActiveSlot`] holds the single in-flight record (plan or ramp).
//! - [`BoundedHistory`] holds terminal records, evicting the oldest first.

pub mod history;
pub mod slot;

pub use history::BoundedHistory;
pub use slot::ActiveSlot;
