//! Channel runtime: durable ingest, policy-gated thread state and an outbox
//! dispatcher with retry and dead-letter handling.
//!
//! Webhooks enter through [`ingress::WebhookIngress`], are deduplicated into
//! receipts by [`service::RuntimeService`] and leave through
//! [`dispatcher::Dispatcher`]. Both halves share a [`store::RuntimeStore`].

pub mod dispatcher;
pub mod error;
pub mod idempotency;
pub mod ingress;
pub mod providers;
pub mod service;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod telemetry;

pub use {
    dispatcher::{DispatchSummary, Dispatcher},
    error::{Context, Error, Result},
    ingress::{WebhookIngress, WebhookOutcome, WebhookRejection},
    service::{IngestResult, IngestStatus, RuntimeService},
    store::RuntimeStore,
};

/// Error code written to actions whose `sending` claim outlived the timeout.
pub const CLAIM_EXPIRED: &str = "CLAIM_EXPIRED";

/// Run database migrations for the runtime crate.
///
/// Creates the receipt, thread, decision, outbox and delivery attempt tables.
/// Call at startup when using [`store_sqlite::SqliteStore::with_pool`];
/// [`store_sqlite::SqliteStore::new`] runs them itself.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
