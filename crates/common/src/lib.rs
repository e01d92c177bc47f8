//! Small utilities shared by all courier crates: error context helpers and
//! the wall clock.

pub mod error;
pub mod time;

pub use error::FromMessage;
