//! In-memory store for tests and single-process use.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

use {
    async_trait::async_trait,
    courier_channels::{
        DeliveryAttempt, EventReceipt, NewEventReceipt, NewOutboxAction, NewPolicyDecision,
        OutboxAction, OutboxStatus, PolicyDecision, ProviderKey, ReceiptStatus, Thread,
        ThreadUpsert,
        state::{latest_event_at, merge_state},
    },
};

use crate::{
    Error, Result,
    store::{EnqueueOutcome, ReceiptClaim, RuntimeStore, new_id},
};

type EventKey = (String, ProviderKey, String);

#[derive(Default)]
struct Tables {
    receipts: HashMap<String, EventReceipt>,
    receipt_keys: HashMap<EventKey, String>,
    threads: HashMap<String, Thread>,
    thread_keys: HashMap<EventKey, String>,
    decisions: Vec<PolicyDecision>,
    actions: HashMap<String, OutboxAction>,
    idempotency_keys: HashMap<String, String>,
    attempts: BTreeMap<(String, u32), DeliveryAttempt>,
}

/// Map-backed store. A single lock serializes every operation, so claims are
/// exclusive within one process only.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an action due at `at_ms` regardless of its status.
    #[cfg(test)]
    pub(crate) fn set_next_attempt_at(&self, id: &str, at_ms: i64) {
        if let Some(action) = self.lock().actions.get_mut(id) {
            action.next_attempt_at_ms = at_ms;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert_receipt(&self, receipt: NewEventReceipt, take_over_rejected: bool) -> ReceiptClaim {
        let mut tables = self.lock();
        let key = (
            receipt.workspace_id.clone(),
            receipt.provider,
            receipt.external_event_id.clone(),
        );

        if let Some(id) = tables.receipt_keys.get(&key).cloned() {
            let Some(existing) = tables.receipts.get_mut(&id) else {
                return ReceiptClaim {
                    receipt_id: id,
                    claimed: false,
                };
            };
            if take_over_rejected && existing.status == ReceiptStatus::Rejected {
                existing.event_type = receipt.event_type;
                existing.status = receipt.status;
                existing.payload_hash = receipt.payload_hash;
                existing.trace_id = receipt.trace_id;
                existing.error_code = None;
                existing.error_message = None;
                existing.received_at_ms = receipt.received_at_ms;
                existing.updated_at_ms = receipt.received_at_ms;
                return ReceiptClaim {
                    receipt_id: id,
                    claimed: true,
                };
            }
            return ReceiptClaim {
                receipt_id: id,
                claimed: false,
            };
        }

        let id = new_id();
        tables.receipts.insert(id.clone(), EventReceipt {
            id: id.clone(),
            workspace_id: receipt.workspace_id,
            provider: receipt.provider,
            external_event_id: receipt.external_event_id,
            event_type: receipt.event_type,
            status: receipt.status,
            payload_hash: receipt.payload_hash,
            trace_id: receipt.trace_id,
            error_code: None,
            error_message: None,
            received_at_ms: receipt.received_at_ms,
            updated_at_ms: receipt.received_at_ms,
        });
        tables.receipt_keys.insert(key, id.clone());
        ReceiptClaim {
            receipt_id: id,
            claimed: true,
        }
    }

    /// Apply `f` if the action is still `sending` under claim `attempt`.
    fn with_claim(&self, id: &str, attempt: u32, f: impl FnOnce(&mut OutboxAction)) -> bool {
        let mut tables = self.lock();
        match tables.actions.get_mut(id) {
            Some(action)
                if action.status == OutboxStatus::Sending && action.attempt_count == attempt =>
            {
                f(action);
                true
            },
            _ => false,
        }
    }
}

#[async_trait]
impl RuntimeStore for InMemoryStore {
    async fn claim_receipt(&self, receipt: NewEventReceipt) -> Result<ReceiptClaim> {
        Ok(self.insert_receipt(receipt, true))
    }

    async fn record_rejected_receipt(&self, receipt: NewEventReceipt) -> Result<ReceiptClaim> {
        let receipt = NewEventReceipt {
            status: ReceiptStatus::Rejected,
            ..receipt
        };
        Ok(self.insert_receipt(receipt, false))
    }

    async fn get_receipt(&self, id: &str) -> Result<Option<EventReceipt>> {
        Ok(self.lock().receipts.get(id).cloned())
    }

    async fn update_receipt_status(
        &self,
        id: &str,
        status: ReceiptStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
        now_ms: i64,
    ) -> Result<()> {
        let mut tables = self.lock();
        let receipt = tables
            .receipts
            .get_mut(id)
            .ok_or_else(|| Error::not_found("receipt", id))?;
        receipt.status = status;
        receipt.error_code = error_code.map(str::to_string);
        receipt.error_message = error_message.map(str::to_string);
        receipt.updated_at_ms = now_ms;
        Ok(())
    }

    async fn receipt_counts(&self) -> Result<Vec<(ReceiptStatus, u64)>> {
        let tables = self.lock();
        let mut counts: BTreeMap<&'static str, (ReceiptStatus, u64)> = BTreeMap::new();
        for receipt in tables.receipts.values() {
            counts
                .entry(receipt.status.as_str())
                .or_insert((receipt.status, 0))
                .1 += 1;
        }
        Ok(counts.into_values().collect())
    }

    async fn upsert_thread(&self, upsert: ThreadUpsert) -> Result<Thread> {
        let mut tables = self.lock();
        let key = (
            upsert.workspace_id.clone(),
            upsert.provider,
            upsert.external_thread_id.clone(),
        );

        if let Some(id) = tables.thread_keys.get(&key).cloned()
            && let Some(thread) = tables.threads.get_mut(&id)
        {
            thread.state = merge_state(&thread.state, &upsert.state);
            thread.last_provider_event_at_ms = Some(latest_event_at(
                thread.last_provider_event_at_ms,
                upsert.provider_event_at_ms,
            ));
            if upsert.external_channel_id.is_some() {
                thread.external_channel_id = upsert.external_channel_id;
            }
            if upsert.external_user_id.is_some() {
                thread.external_user_id = upsert.external_user_id;
            }
            thread.updated_at_ms = upsert.now_ms;
            return Ok(thread.clone());
        }

        let thread = Thread {
            id: new_id(),
            workspace_id: upsert.workspace_id,
            provider: upsert.provider,
            external_thread_id: upsert.external_thread_id,
            external_channel_id: upsert.external_channel_id,
            external_user_id: upsert.external_user_id,
            state: upsert.state,
            last_provider_event_at_ms: Some(upsert.provider_event_at_ms),
            created_at_ms: upsert.now_ms,
            updated_at_ms: upsert.now_ms,
        };
        tables.thread_keys.insert(key, thread.id.clone());
        tables.threads.insert(thread.id.clone(), thread.clone());
        Ok(thread)
    }

    async fn insert_decision(&self, decision: NewPolicyDecision) -> Result<PolicyDecision> {
        let decision = PolicyDecision {
            id: new_id(),
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
        };
        self.lock().decisions.push(decision.clone());
        Ok(decision)
    }

    async fn decisions_for_receipt(&self, receipt_id: &str) -> Result<Vec<PolicyDecision>> {
        Ok(self
            .lock()
            .decisions
            .iter()
            .filter(|d| d.receipt_id == receipt_id)
            .cloned()
            .collect())
    }

    async fn enqueue_outbox(&self, action: NewOutboxAction) -> Result<EnqueueOutcome> {
        let mut tables = self.lock();
        if let Some(existing) = tables.idempotency_keys.get(&action.idempotency_key) {
            return Ok(EnqueueOutcome {
                action_id: existing.clone(),
                duplicate: true,
            });
        }

        let id = new_id();
        tables
            .idempotency_keys
            .insert(action.idempotency_key.clone(), id.clone());
        tables.actions.insert(id.clone(), OutboxAction {
            id: id.clone(),
            workspace_id: action.workspace_id,
            provider: action.provider,
            idempotency_key: action.idempotency_key,
            action_type: action.action_type,
            status: OutboxStatus::Pending,
            target: action.target,
            payload: action.payload,
            receipt_id: action.receipt_id,
            decision_id: action.decision_id,
            thread_id: action.thread_id,
            attempt_count: 0,
            next_attempt_at_ms: action.next_attempt_at_ms,
            last_error_code: None,
            last_error_message: None,
            provider_message_id: None,
            created_at_ms: action.created_at_ms,
            updated_at_ms: action.created_at_ms,
            sent_at_ms: None,
        });
        Ok(EnqueueOutcome {
            action_id: id,
            duplicate: false,
        })
    }

    async fn claim_outbox_batch(&self, now_ms: i64, limit: u32) -> Result<Vec<OutboxAction>> {
        let mut tables = self.lock();
        let mut due: Vec<(i64, i64, String)> = tables
            .actions
            .values()
            .filter(|a| a.status.is_claimable() && a.next_attempt_at_ms <= now_ms)
            .map(|a| (a.next_attempt_at_ms, a.created_at_ms, a.id.clone()))
            .collect();
        due.sort();
        due.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, _, id) in due {
            if let Some(action) = tables.actions.get_mut(&id) {
                action.status = OutboxStatus::Sending;
                action.attempt_count += 1;
                action.updated_at_ms = now_ms;
                claimed.push(action.clone());
            }
        }
        Ok(claimed)
    }

    async fn touch_outbox_claim(&self, id: &str, attempt: u32, now_ms: i64) -> Result<bool> {
        Ok(self.with_claim(id, attempt, |action| action.updated_at_ms = now_ms))
    }

    async fn mark_outbox_sent(
        &self,
        id: &str,
        attempt: u32,
        provider_message_id: Option<&str>,
        now_ms: i64,
    ) -> Result<bool> {
        Ok(self.with_claim(id, attempt, |action| {
            action.status = OutboxStatus::Sent;
            action.provider_message_id = provider_message_id.map(str::to_string);
            action.last_error_code = None;
            action.last_error_message = None;
            action.sent_at_ms = Some(now_ms);
            action.updated_at_ms = now_ms;
        }))
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
        Ok(self.with_claim(id, attempt, |action| {
            action.status = OutboxStatus::Retryable;
            action.last_error_code = Some(error_code.to_string());
            action.last_error_message = Some(error_message.to_string());
            action.next_attempt_at_ms = next_attempt_at_ms;
            action.updated_at_ms = now_ms;
        }))
    }

    async fn mark_outbox_dead_letter(
        &self,
        id: &str,
        attempt: u32,
        error_code: &str,
        error_message: &str,
        now_ms: i64,
    ) -> Result<bool> {
        Ok(self.with_claim(id, attempt, |action| {
            action.status = OutboxStatus::DeadLetter;
            action.last_error_code = Some(error_code.to_string());
            action.last_error_message = Some(error_message.to_string());
            action.updated_at_ms = now_ms;
        }))
    }

    async fn requeue_stale_sending(&self, cutoff_ms: i64, now_ms: i64) -> Result<u64> {
        let mut tables = self.lock();
        let mut requeued = 0;
        for action in tables.actions.values_mut() {
            if action.status == OutboxStatus::Sending && action.updated_at_ms < cutoff_ms {
                action.status = OutboxStatus::Retryable;
                action.next_attempt_at_ms = now_ms;
                action.last_error_code = Some(crate::CLAIM_EXPIRED.to_string());
                action.last_error_message = Some("claim expired while sending".to_string());
                action.updated_at_ms = now_ms;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn get_outbox_action(&self, id: &str) -> Result<Option<OutboxAction>> {
        Ok(self.lock().actions.get(id).cloned())
    }

    async fn outbox_counts(&self) -> Result<Vec<(OutboxStatus, u64)>> {
        let tables = self.lock();
        let mut counts: BTreeMap<&'static str, (OutboxStatus, u64)> = BTreeMap::new();
        for action in tables.actions.values() {
            counts
                .entry(action.status.as_str())
                .or_insert((action.status, 0))
                .1 += 1;
        }
        Ok(counts.into_values().collect())
    }

    async fn list_dead_letters(&self, limit: u32) -> Result<Vec<OutboxAction>> {
        let tables = self.lock();
        let mut dead: Vec<OutboxAction> = tables
            .actions
            .values()
            .filter(|a| a.status == OutboxStatus::DeadLetter)
            .cloned()
            .collect();
        dead.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
        dead.truncate(limit as usize);
        Ok(dead)
    }

    async fn record_delivery_attempt(&self, attempt: DeliveryAttempt) -> Result<()> {
        self.lock().attempts.insert(
            (attempt.action_id.clone(), attempt.attempt_number),
            attempt,
        );
        Ok(())
    }

    async fn list_delivery_attempts(&self, action_id: &str) -> Result<Vec<DeliveryAttempt>> {
        Ok(self
            .lock()
            .attempts
            .values()
            .filter(|a| a.action_id == action_id)
            .cloned()
            .collect())
    }
}
