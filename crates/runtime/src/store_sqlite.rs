//! SQLite-backed runtime store using sqlx.
//!
//! Claims are single statements: receipts use an upsert that only wins over
//! a `rejected` row, and outbox claims are a compare-and-swap `UPDATE ...
//! RETURNING` so concurrent dispatchers partition the due actions.

use {
    async_trait::async_trait,
    courier_channels::{
        DeliveryAttempt, EventReceipt, NewEventReceipt, NewOutboxAction, NewPolicyDecision,
        OutboxAction, OutboxStatus, PolicyDecision, ReceiptStatus, Thread, ThreadUpsert,
        state::merge_state,
    },
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Context, Error, Result,
    store::{EnqueueOutcome, ReceiptClaim, RuntimeStore, new_id},
};

#[derive(sqlx::FromRow)]
struct ReceiptRow {
    id: String,
    workspace_id: String,
    provider: String,
    external_event_id: String,
    event_type: String,
    status: String,
    payload_hash: Option<String>,
    trace_id: String,
    error_code: Option<String>,
    error_message: Option<String>,
    received_at_ms: i64,
    updated_at_ms: i64,
}

impl TryFrom<ReceiptRow> for EventReceipt {
    type Error = Error;

    fn try_from(r: ReceiptRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            workspace_id: r.workspace_id,
            provider: r.provider.parse()?,
            external_event_id: r.external_event_id,
            event_type: r.event_type,
            status: r.status.parse()?,
            payload_hash: r.payload_hash,
            trace_id: r.trace_id,
            error_code: r.error_code,
            error_message: r.error_message,
            received_at_ms: r.received_at_ms,
            updated_at_ms: r.updated_at_ms,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ThreadRow {
    id: String,
    workspace_id: String,
    provider: String,
    external_thread_id: String,
    external_channel_id: Option<String>,
    external_user_id: Option<String>,
    state: String,
    last_provider_event_at_ms: Option<i64>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl TryFrom<ThreadRow> for Thread {
    type Error = Error;

    fn try_from(r: ThreadRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            workspace_id: r.workspace_id,
            provider: r.provider.parse()?,
            external_thread_id: r.external_thread_id,
            external_channel_id: r.external_channel_id,
            external_user_id: r.external_user_id,
            state: serde_json::from_str(&r.state)?,
            last_provider_event_at_ms: r.last_provider_event_at_ms,
            created_at_ms: r.created_at_ms,
            updated_at_ms: r.updated_at_ms,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    id: String,
    receipt_id: String,
    thread_id: String,
    workspace_id: String,
    policy_mode: String,
    risk_tier: String,
    confidence: f64,
    model_name: String,
    model_version: String,
    action_plan: String,
    requires_approval: bool,
    tool_trace: String,
    created_at_ms: i64,
}

impl TryFrom<DecisionRow> for PolicyDecision {
    type Error = Error;

    fn try_from(r: DecisionRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            receipt_id: r.receipt_id,
            thread_id: r.thread_id,
            workspace_id: r.workspace_id,
            policy_mode: r.policy_mode.parse().map_err(Error::message)?,
            risk_tier: r.risk_tier.parse()?,
            confidence: r.confidence,
            model_name: r.model_name,
            model_version: r.model_version,
            action_plan: serde_json::from_str(&r.action_plan)?,
            requires_approval: r.requires_approval,
            tool_trace: serde_json::from_str(&r.tool_trace)?,
            created_at_ms: r.created_at_ms,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: String,
    workspace_id: String,
    provider: String,
    idempotency_key: String,
    action_type: String,
    status: String,
    target: String,
    payload: String,
    receipt_id: Option<String>,
    decision_id: Option<String>,
    thread_id: Option<String>,
    attempt_count: i64,
    next_attempt_at_ms: i64,
    last_error_code: Option<String>,
    last_error_message: Option<String>,
    provider_message_id: Option<String>,
    created_at_ms: i64,
    updated_at_ms: i64,
    sent_at_ms: Option<i64>,
}

impl TryFrom<OutboxRow> for OutboxAction {
    type Error = Error;

    fn try_from(r: OutboxRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            workspace_id: r.workspace_id,
            provider: r.provider.parse()?,
            idempotency_key: r.idempotency_key,
            action_type: r.action_type,
            status: r.status.parse()?,
            target: serde_json::from_str(&r.target)?,
            payload: serde_json::from_str(&r.payload)?,
            receipt_id: r.receipt_id,
            decision_id: r.decision_id,
            thread_id: r.thread_id,
            attempt_count: u32::try_from(r.attempt_count).context("attempt_count out of range")?,
            next_attempt_at_ms: r.next_attempt_at_ms,
            last_error_code: r.last_error_code,
            last_error_message: r.last_error_message,
            provider_message_id: r.provider_message_id,
            created_at_ms: r.created_at_ms,
            updated_at_ms: r.updated_at_ms,
            sent_at_ms: r.sent_at_ms,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    action_id: String,
    attempt_number: i64,
    provider: String,
    status: String,
    response_status: Option<i64>,
    response_body: Option<String>,
    error_message: Option<String>,
    latency_ms: i64,
    attempted_at_ms: i64,
}

impl TryFrom<AttemptRow> for DeliveryAttempt {
    type Error = Error;

    fn try_from(r: AttemptRow) -> Result<Self> {
        Ok(Self {
            action_id: r.action_id,
            attempt_number: u32::try_from(r.attempt_number)
                .context("attempt_number out of range")?,
            provider: r.provider.parse()?,
            status: r.status,
            response_status: r
                .response_status
                .map(u16::try_from)
                .transpose()
                .context("response_status out of range")?,
            response_body: r.response_body,
            error_message: r.error_message,
            latency_ms: r.latency_ms,
            attempted_at_ms: r.attempted_at_ms,
        })
    }
}

/// SQLite-backed persistence for receipts, threads, decisions and the outbox.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect with a dedicated pool and run migrations.
    ///
    /// For a shared pool use [`SqliteStore::with_pool`] after calling
    /// [`crate::run_migrations`].
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, 5).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        // Every connection to `sqlite::memory:` is a separate database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Use an existing pool. Migrations must already be applied.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn existing_receipt_id(&self, receipt: &NewEventReceipt) -> Result<String> {
        let (id,): (String,) = sqlx::query_as(
            "SELECT id FROM event_receipts
             WHERE workspace_id = ? AND provider = ? AND external_event_id = ?",
        )
        .bind(&receipt.workspace_id)
        .bind(receipt.provider.as_str())
        .bind(&receipt.external_event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}

#[async_trait]
impl RuntimeStore for SqliteStore {
    async fn claim_receipt(&self, receipt: NewEventReceipt) -> Result<ReceiptClaim> {
        let inserted: Option<(String,)> = sqlx::query_as(
            "INSERT INTO event_receipts
               (id, workspace_id, provider, external_event_id, event_type, status,
                payload_hash, trace_id, received_at_ms, updated_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (workspace_id, provider, external_event_id) DO UPDATE SET
               event_type = excluded.event_type,
               status = excluded.status,
               payload_hash = excluded.payload_hash,
               trace_id = excluded.trace_id,
               error_code = NULL,
               error_message = NULL,
               received_at_ms = excluded.received_at_ms,
               updated_at_ms = excluded.updated_at_ms
             WHERE event_receipts.status = 'rejected'
             RETURNING id",
        )
        .bind(new_id())
        .bind(&receipt.workspace_id)
        .bind(receipt.provider.as_str())
        .bind(&receipt.external_event_id)
        .bind(&receipt.event_type)
        .bind(receipt.status.as_str())
        .bind(&receipt.payload_hash)
        .bind(&receipt.trace_id)
        .bind(receipt.received_at_ms)
        .bind(receipt.received_at_ms)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some((receipt_id,)) => Ok(ReceiptClaim {
                receipt_id,
                claimed: true,
            }),
            None => Ok(ReceiptClaim {
                receipt_id: self.existing_receipt_id(&receipt).await?,
                claimed: false,
            }),
        }
    }

    async fn record_rejected_receipt(&self, receipt: NewEventReceipt) -> Result<ReceiptClaim> {
        let inserted: Option<(String,)> = sqlx::query_as(
            "INSERT INTO event_receipts
               (id, workspace_id, provider, external_event_id, event_type, status,
                payload_hash, trace_id, received_at_ms, updated_at_ms)
             VALUES (?, ?, ?, ?, ?, 'rejected', ?, ?, ?, ?)
             ON CONFLICT (workspace_id, provider, external_event_id) DO NOTHING
             RETURNING id",
        )
        .bind(new_id())
        .bind(&receipt.workspace_id)
        .bind(receipt.provider.as_str())
        .bind(&receipt.external_event_id)
        .bind(&receipt.event_type)
        .bind(&receipt.payload_hash)
        .bind(&receipt.trace_id)
        .bind(receipt.received_at_ms)
        .bind(receipt.received_at_ms)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some((receipt_id,)) => Ok(ReceiptClaim {
                receipt_id,
                claimed: true,
            }),
            None => Ok(ReceiptClaim {
                receipt_id: self.existing_receipt_id(&receipt).await?,
                claimed: false,
            }),
        }
    }

    async fn get_receipt(&self, id: &str) -> Result<Option<EventReceipt>> {
        let row = sqlx::query_as::<_, ReceiptRow>("SELECT * FROM event_receipts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update_receipt_status(
        &self,
        id: &str,
        status: ReceiptStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
        now_ms: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE event_receipts
             SET status = ?, error_code = ?, error_message = ?, updated_at_ms = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error_code)
        .bind(error_message)
        .bind(now_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("receipt", id));
        }
        Ok(())
    }

    async fn receipt_counts(&self) -> Result<Vec<(ReceiptStatus, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM event_receipts GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(status, count)| -> Result<(ReceiptStatus, u64)> {
                Ok((status.parse()?, count.max(0) as u64))
            })
            .collect()
    }

    async fn upsert_thread(&self, upsert: ThreadUpsert) -> Result<Thread> {
        let state_json = serde_json::to_string(&upsert.state)?;
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock before reading
        // the state it merges into.
        let row = sqlx::query_as::<_, ThreadRow>(
            "INSERT INTO threads
               (id, workspace_id, provider, external_thread_id, external_channel_id,
                external_user_id, state, last_provider_event_at_ms, created_at_ms, updated_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (workspace_id, provider, external_thread_id) DO UPDATE SET
               external_channel_id = COALESCE(excluded.external_channel_id, threads.external_channel_id),
               external_user_id = COALESCE(excluded.external_user_id, threads.external_user_id),
               last_provider_event_at_ms = MAX(
                 COALESCE(threads.last_provider_event_at_ms, excluded.last_provider_event_at_ms),
                 excluded.last_provider_event_at_ms),
               updated_at_ms = excluded.updated_at_ms
             RETURNING *",
        )
        .bind(new_id())
        .bind(&upsert.workspace_id)
        .bind(upsert.provider.as_str())
        .bind(&upsert.external_thread_id)
        .bind(&upsert.external_channel_id)
        .bind(&upsert.external_user_id)
        .bind(&state_json)
        .bind(upsert.provider_event_at_ms)
        .bind(upsert.now_ms)
        .bind(upsert.now_ms)
        .fetch_one(&mut *tx)
        .await?;

        let mut thread = Thread::try_from(row)?;
        thread.state = merge_state(&thread.state, &upsert.state);
        sqlx::query("UPDATE threads SET state = ? WHERE id = ?")
            .bind(serde_json::to_string(&thread.state)?)
            .bind(&thread.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(thread)
    }

    async fn insert_decision(&self, decision: NewPolicyDecision) -> Result<PolicyDecision> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO policy_decisions
               (id, receipt_id, thread_id, workspace_id, policy_mode, risk_tier, confidence,
                model_name, model_version, action_plan, requires_approval, tool_trace,
                created_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&decision.receipt_id)
        .bind(&decision.thread_id)
        .bind(&decision.workspace_id)
        .bind(decision.policy_mode.as_str())
        .bind(decision.risk_tier.as_str())
        .bind(decision.confidence)
        .bind(&decision.model_name)
        .bind(&decision.model_version)
        .bind(serde_json::to_string(&decision.action_plan)?)
        .bind(decision.requires_approval)
        .bind(serde_json::to_string(&decision.tool_trace)?)
        .bind(decision.created_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(PolicyDecision {
            id,
            receipt_id: decision.receipt_id,
            thread_id: decision.thread_id,
            workspace_id: decision.workspace_id,
            policy_mode: decision.policy_mode,
            risk_tier: decision.risk_tier,
            confidence: decision.confidence,
            model_name: decision.model_name,
            model_version: decision.model_version,
            action_plan: decision.action_plan,
            requires_approval: decision.requires_approval,
            tool_trace: decision.tool_trace,
            created_at_ms: decision.created_at_ms,
        })
    }

    async fn decisions_for_receipt(&self, receipt_id: &str) -> Result<Vec<PolicyDecision>> {
        let rows = sqlx::query_as::<_, DecisionRow>(
            "SELECT * FROM policy_decisions WHERE receipt_id = ? ORDER BY created_at_ms",
        )
        .bind(receipt_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn enqueue_outbox(&self, action: NewOutboxAction) -> Result<EnqueueOutcome> {
        let inserted: Option<(String,)> = sqlx::query_as(
            "INSERT INTO outbox_actions
               (id, workspace_id, provider, idempotency_key, action_type, status, target,
                payload, receipt_id, decision_id, thread_id, attempt_count,
                next_attempt_at_ms, created_at_ms, updated_at_ms)
             VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, 0, ?, ?, ?)
             ON CONFLICT (idempotency_key) DO NOTHING
             RETURNING id",
        )
        .bind(new_id())
        .bind(&action.workspace_id)
        .bind(action.provider.as_str())
        .bind(&action.idempotency_key)
        .bind(&action.action_type)
        .bind(serde_json::to_string(&action.target)?)
        .bind(serde_json::to_string(&action.payload)?)
        .bind(&action.receipt_id)
        .bind(&action.decision_id)
        .bind(&action.thread_id)
        .bind(action.next_attempt_at_ms)
        .bind(action.created_at_ms)
        .bind(action.created_at_ms)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((action_id,)) = inserted {
            return Ok(EnqueueOutcome {
                action_id,
                duplicate: false,
            });
        }

        let (action_id,): (String,) =
            sqlx::query_as("SELECT id FROM outbox_actions WHERE idempotency_key = ?")
                .bind(&action.idempotency_key)
                .fetch_one(&self.pool)
                .await?;
        Ok(EnqueueOutcome {
            action_id,
            duplicate: true,
        })
    }

    async fn claim_outbox_batch(&self, now_ms: i64, limit: u32) -> Result<Vec<OutboxAction>> {
        // The outer status guard makes the flip a compare-and-swap: a row
        // another dispatcher claimed in between no longer matches.
        let rows = sqlx::query_as::<_, OutboxRow>(
            "UPDATE outbox_actions
             SET status = 'sending',
                 attempt_count = attempt_count + 1,
                 updated_at_ms = ?
             WHERE id IN (
                 SELECT id FROM outbox_actions
                 WHERE status IN ('pending', 'retryable') AND next_attempt_at_ms <= ?
                 ORDER BY next_attempt_at_ms, created_at_ms
                 LIMIT ?
             )
             AND status IN ('pending', 'retryable')
             RETURNING *",
        )
        .bind(now_ms)
        .bind(now_ms)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut actions = rows
            .into_iter()
            .map(OutboxAction::try_from)
            .collect::<Result<Vec<_>>>()?;
        actions.sort_by(|a, b| {
            (a.next_attempt_at_ms, a.created_at_ms).cmp(&(b.next_attempt_at_ms, b.created_at_ms))
        });
        Ok(actions)
    }

    async fn touch_outbox_claim(&self, id: &str, attempt: u32, now_ms: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE outbox_actions SET updated_at_ms = ?
             WHERE id = ? AND status = 'sending' AND attempt_count = ?",
        )
        .bind(now_ms)
        .bind(id)
        .bind(i64::from(attempt))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_outbox_sent(
        &self,
        id: &str,
        attempt: u32,
        provider_message_id: Option<&str>,
        now_ms: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE outbox_actions
             SET status = 'sent', provider_message_id = ?, last_error_code = NULL,
                 last_error_message = NULL, sent_at_ms = ?, updated_at_ms = ?
             WHERE id = ? AND status = 'sending' AND attempt_count = ?",
        )
        .bind(provider_message_id)
        .bind(now_ms)
        .bind(now_ms)
        .bind(id)
        .bind(i64::from(attempt))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_outbox_retryable(
        &self,
        id: &str,
        attempt: u32,
        error_code: &str,
        error_message: &str,
        next_attempt_at_ms: i64,
        now_ms: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE outbox_actions
             SET status = 'retryable', last_error_code = ?, last_error_message = ?,
                 next_attempt_at_ms = ?, updated_at_ms = ?
             WHERE id = ? AND status = 'sending' AND attempt_count = ?",
        )
        .bind(error_code)
        .bind(error_message)
        .bind(next_attempt_at_ms)
        .bind(now_ms)
        .bind(id)
        .bind(i64::from(attempt))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_outbox_dead_letter(
        &self,
        id: &str,
        attempt: u32,
        error_code: &str,
        error_message: &str,
        now_ms: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE outbox_actions
             SET status = 'dead_letter', last_error_code = ?, last_error_message = ?,
                 updated_at_ms = ?
             WHERE id = ? AND status = 'sending' AND attempt_count = ?",
        )
        .bind(error_code)
        .bind(error_message)
        .bind(now_ms)
        .bind(id)
        .bind(i64::from(attempt))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn requeue_stale_sending(&self, cutoff_ms: i64, now_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE outbox_actions
             SET status = 'retryable', next_attempt_at_ms = ?, last_error_code = ?,
                 last_error_message = 'claim expired while sending', updated_at_ms = ?
             WHERE status = 'sending' AND updated_at_ms < ?",
        )
        .bind(now_ms)
        .bind(crate::CLAIM_EXPIRED)
        .bind(now_ms)
        .bind(cutoff_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_outbox_action(&self, id: &str) -> Result<Option<OutboxAction>> {
        let row = sqlx::query_as::<_, OutboxRow>("SELECT * FROM outbox_actions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn outbox_counts(&self) -> Result<Vec<(OutboxStatus, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM outbox_actions GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(status, count)| -> Result<(OutboxStatus, u64)> {
                Ok((status.parse()?, count.max(0) as u64))
            })
            .collect()
    }

    async fn list_dead_letters(&self, limit: u32) -> Result<Vec<OutboxAction>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            "SELECT * FROM outbox_actions WHERE status = 'dead_letter'
             ORDER BY updated_at_ms DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_delivery_attempt(&self, attempt: DeliveryAttempt) -> Result<()> {
        sqlx::query(
            "INSERT INTO delivery_attempts
               (action_id, attempt_number, provider, status, response_status, response_body,
                error_message, latency_ms, attempted_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (action_id, attempt_number) DO UPDATE SET
               status = excluded.status,
               response_status = excluded.response_status,
               response_body = excluded.response_body,
               error_message = excluded.error_message,
               latency_ms = excluded.latency_ms,
               attempted_at_ms = excluded.attempted_at_ms",
        )
        .bind(&attempt.action_id)
        .bind(i64::from(attempt.attempt_number))
        .bind(attempt.provider.as_str())
        .bind(&attempt.status)
        .bind(attempt.response_status.map(i64::from))
        .bind(&attempt.response_body)
        .bind(&attempt.error_message)
        .bind(attempt.latency_ms)
        .bind(attempt.attempted_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_delivery_attempts(&self, action_id: &str) -> Result<Vec<DeliveryAttempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            "SELECT * FROM delivery_attempts WHERE action_id = ? ORDER BY attempt_number",
        )
        .bind(action_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
