//! Outbox dispatch: claim due actions, send them, then settle each one as
//! sent, retryable or dead-lettered.

use std::{sync::Arc, time::Instant};

use {
    courier_channels::{
        DeliveryAttempt, OutboxAction, SendError, SendReceipt, SenderResolver, TelemetryEvent,
        TelemetrySink, TelemetryStage,
    },
    courier_common::time::now_ms,
    courier_config::DispatchConfig,
    rand::Rng,
    serde::Serialize,
    tracing::{debug, error, info, warn},
};

use crate::{Result, store::RuntimeStore};

/// Error code when a sender fails without naming a code.
pub const DISPATCH_FAILED: &str = "DISPATCH_FAILED";
/// Error code when no sender is deployed for the action's provider.
pub const SENDER_NOT_CONFIGURED: &str = "SENDER_NOT_CONFIGURED";
/// Delivery attempt status of a successful send.
pub const ATTEMPT_SENT: &str = "sent";

/// Counts for one `dispatch_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub claimed: usize,
    pub sent: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    /// Claims that expired before this dispatcher could settle them. The
    /// action belongs to whoever requeued or reclaimed it.
    pub claims_lost: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Sent,
    Retried,
    DeadLettered,
    ClaimLost,
}

/// `base * 2^(attempt - 1)`, saturating. Attempt numbers start at 1.
pub fn backoff_delay_ms(base_backoff_ms: u64, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(62);
    base_backoff_ms.saturating_mul(1u64 << exponent)
}

/// Scale a delay by `factor`, never below 1 ms.
pub fn apply_jitter(delay_ms: u64, factor: f64) -> u64 {
    ((delay_ms as f64) * factor).round().max(1.0) as u64
}

/// Delivers outbox actions through the senders resolved per provider.
pub struct Dispatcher {
    store: Arc<dyn RuntimeStore>,
    config: DispatchConfig,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn RuntimeStore>,
        config: DispatchConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            store,
            config,
            telemetry,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Claim up to `limit` due actions and deliver them one by one.
    ///
    /// A failure to settle one action is logged and does not stop the batch;
    /// its claim expires and [`Dispatcher::requeue_stale`] returns it.
    pub async fn dispatch_batch(
        &self,
        senders: &dyn SenderResolver,
        limit: u32,
    ) -> Result<DispatchSummary> {
        let claimed = self.store.claim_outbox_batch(now_ms(), limit).await?;
        let mut summary = DispatchSummary {
            claimed: claimed.len(),
            ..DispatchSummary::default()
        };
        if claimed.is_empty() {
            return Ok(summary);
        }
        debug!(count = claimed.len(), "claimed outbox actions");

        for action in &claimed {
            self.telemetry.record(
                event(TelemetryStage::DispatchClaimed, "ok", action).attempt(action.attempt_count),
            );
            match self.deliver(senders, action).await {
                Ok(Settled::Sent) => summary.sent += 1,
                Ok(Settled::Retried) => summary.retried += 1,
                Ok(Settled::DeadLettered) => summary.dead_lettered += 1,
                Ok(Settled::ClaimLost) => summary.claims_lost += 1,
                Err(e) => {
                    error!(action_id = %action.id, error = %e, "failed to settle outbox action");
                },
            }
        }

        info!(
            claimed = summary.claimed,
            sent = summary.sent,
            retried = summary.retried,
            dead_lettered = summary.dead_lettered,
            claims_lost = summary.claims_lost,
            "dispatch batch complete"
        );
        Ok(summary)
    }

    /// Return actions whose claim outlived `claim_timeout_secs` to `retryable`.
    pub async fn requeue_stale(&self) -> Result<u64> {
        let now = now_ms();
        let timeout_ms = i64::try_from(self.config.claim_timeout_secs.saturating_mul(1000))
            .unwrap_or(i64::MAX);
        let requeued = self
            .store
            .requeue_stale_sending(now.saturating_sub(timeout_ms), now)
            .await?;
        if requeued > 0 {
            warn!(requeued, "requeued outbox actions with expired claims");
        }
        Ok(requeued)
    }

    async fn deliver(&self, senders: &dyn SenderResolver, action: &OutboxAction) -> Result<Settled> {
        let Some(sender) = senders.resolve(action.provider) else {
            let message = format!("no sender configured for provider {}", action.provider);
            warn!(action_id = %action.id, provider = %action.provider, "{message}");
            self.store
                .record_delivery_attempt(DeliveryAttempt {
                    action_id: action.id.clone(),
                    attempt_number: action.attempt_count,
                    provider: action.provider,
                    status: SENDER_NOT_CONFIGURED.to_string(),
                    response_status: None,
                    response_body: None,
                    error_message: Some(message.clone()),
                    latency_ms: 0,
                    attempted_at_ms: now_ms(),
                })
                .await?;
            let settled = self
                .store
                .mark_outbox_dead_letter(
                    &action.id,
                    action.attempt_count,
                    SENDER_NOT_CONFIGURED,
                    &message,
                    now_ms(),
                )
                .await?;
            if !settled {
                return Ok(claim_lost(action));
            }
            self.telemetry.record(
                event(TelemetryStage::DispatchDeadLetter, SENDER_NOT_CONFIGURED, action)
                    .attempt(action.attempt_count),
            );
            return Ok(Settled::DeadLettered);
        };

        // Earlier sends in the batch may have outlived the claim timeout.
        if !self
            .store
            .touch_outbox_claim(&action.id, action.attempt_count, now_ms())
            .await?
        {
            return Ok(claim_lost(action));
        }

        let started = Instant::now();
        let result = sender.send(action).await;
        let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        match result {
            Ok(receipt) => self.settle_sent(action, receipt, latency_ms).await,
            Err(err) => self.settle_failed(action, err, latency_ms).await,
        }
    }

    async fn settle_sent(
        &self,
        action: &OutboxAction,
        receipt: SendReceipt,
        latency_ms: i64,
    ) -> Result<Settled> {
        let now = now_ms();
        self.store
            .record_delivery_attempt(DeliveryAttempt {
                action_id: action.id.clone(),
                attempt_number: action.attempt_count,
                provider: action.provider,
                status: ATTEMPT_SENT.to_string(),
                response_status: receipt.response_status,
                response_body: receipt.response_body,
                error_message: None,
                latency_ms,
                attempted_at_ms: now,
            })
            .await?;
        let settled = self
            .store
            .mark_outbox_sent(
                &action.id,
                action.attempt_count,
                receipt.provider_message_id.as_deref(),
                now,
            )
            .await?;
        if !settled {
            return Ok(claim_lost(action));
        }

        debug!(action_id = %action.id, provider = %action.provider, latency_ms, "outbox action sent");
        let mut record = event(TelemetryStage::DispatchSent, "ok", action)
            .attempt(action.attempt_count)
            .latency_ms(latency_ms);
        if let Some(id) = receipt.provider_message_id {
            record = record.meta("provider_message_id", id);
        }
        self.telemetry.record(record);
        Ok(Settled::Sent)
    }

    async fn settle_failed(
        &self,
        action: &OutboxAction,
        err: SendError,
        latency_ms: i64,
    ) -> Result<Settled> {
        let now = now_ms();
        let code = err.code.clone().unwrap_or_else(|| DISPATCH_FAILED.to_string());
        self.store
            .record_delivery_attempt(DeliveryAttempt {
                action_id: action.id.clone(),
                attempt_number: action.attempt_count,
                provider: action.provider,
                status: code.clone(),
                response_status: err.response_status,
                response_body: err.response_body.clone(),
                error_message: Some(err.message.clone()),
                latency_ms,
                attempted_at_ms: now,
            })
            .await?;

        let exhausted = action.attempt_count >= self.config.max_retries;
        if !err.retryable || exhausted {
            let settled = self
                .store
                .mark_outbox_dead_letter(&action.id, action.attempt_count, &code, &err.message, now)
                .await?;
            if !settled {
                return Ok(claim_lost(action));
            }
            warn!(
                action_id = %action.id,
                provider = %action.provider,
                attempt = action.attempt_count,
                code = %code,
                retryable = err.retryable,
                error = %err.message,
                "outbox action dead-lettered"
            );
            self.telemetry.record(
                event(TelemetryStage::DispatchDeadLetter, code.as_str(), action)
                    .attempt(action.attempt_count)
                    .latency_ms(latency_ms)
                    .meta("error_message", err.message)
                    .meta("exhausted", exhausted),
            );
            return Ok(Settled::DeadLettered);
        }

        let delay_ms = self.next_delay_ms(action.attempt_count);
        let next_attempt_at_ms = now.saturating_add(i64::try_from(delay_ms).unwrap_or(i64::MAX));
        let settled = self
            .store
            .mark_outbox_retryable(
                &action.id,
                action.attempt_count,
                &code,
                &err.message,
                next_attempt_at_ms,
                now,
            )
            .await?;
        if !settled {
            return Ok(claim_lost(action));
        }
        debug!(
            action_id = %action.id,
            attempt = action.attempt_count,
            code = %code,
            delay_ms,
            "outbox action scheduled for retry"
        );
        self.telemetry.record(
            event(TelemetryStage::DispatchRetry, code.as_str(), action)
                .attempt(action.attempt_count)
                .latency_ms(latency_ms)
                .meta("error_message", err.message)
                .meta("next_attempt_at_ms", next_attempt_at_ms),
        );
        Ok(Settled::Retried)
    }

    fn next_delay_ms(&self, attempt: u32) -> u64 {
        let delay = backoff_delay_ms(self.config.base_backoff_ms, attempt);
        if self.config.jitter {
            apply_jitter(delay, rand::rng().random_range(0.8..=1.2))
        } else {
            delay.max(1)
        }
    }
}

fn claim_lost(action: &OutboxAction) -> Settled {
    warn!(
        action_id = %action.id,
        attempt = action.attempt_count,
        "outbox claim lost before settling, leaving the action to its new owner"
    );
    Settled::ClaimLost
}

fn event(stage: TelemetryStage, status: &str, action: &OutboxAction) -> TelemetryEvent {
    TelemetryEvent::new(stage, status)
        .workspace(&action.workspace_id)
        .provider(action.provider)
        .action(&action.id)
        .meta("idempotency_key", action.idempotency_key.as_str())
}
