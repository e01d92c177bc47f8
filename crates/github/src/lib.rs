//! GitHub issue and pull-request conversations.
//!
//! Webhooks (`issue_comment`, `issues`, `pull_request`,
//! `pull_request_review_comment`) are verified with `X-Hub-Signature-256` and
//! keyed by `{owner}/{repo}#{number}`; replies are posted as issue comments.

pub mod adapter;
pub mod normalize;
pub mod outbound;
pub mod types;

pub use {adapter::GithubAdapter, outbound::GithubSender};
