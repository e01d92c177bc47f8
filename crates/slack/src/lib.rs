//! Slack Events API channel: request signing, event normalization and
//! `chat.postMessage` delivery.

pub mod adapter;
pub mod normalize;
pub mod outbound;
pub mod types;
pub mod verify;

pub use {adapter::SlackAdapter, outbound::SlackSender};
