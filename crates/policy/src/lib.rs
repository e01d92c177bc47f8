//! Deterministic, side-effect-free policy engine.
//!
//! Classifies inbound message text into a risk tier and a verdict
//! (autonomous / assist / blocked). Thresholds and phrase lists come from
//! [`courier_config::PolicyConfig`], so retuning never needs a rebuild.

pub mod engine;
pub mod response;

pub use engine::{PolicyEngine, PolicyEvaluation};
