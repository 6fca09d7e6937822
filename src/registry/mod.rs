//! Target registry for paywatch.
//!
//! Holds the fixed set of monitored targets built at startup.

mod models;
mod store;

pub use models::*;
pub use store::*;
