#![allow(clippy::unwrap_used, clippy::expect_used)]
use std::sync::Arc;

use {
    courier_channels::{
        OutboxStatus, ProviderKey, ReceiptStatus, TelemetryStage, WebhookRequest,
        signature::{HUB_SIGNATURE_HEADER, hmac_sha256_hex},
    },
    courier_config::{DispatchConfig, GithubConfig, ProvidersConfig},
    courier_policy::PolicyEngine,
    courier_runtime::{
        Dispatcher, IngestStatus, RuntimeService, RuntimeStore, WebhookIngress, providers,
        store_sqlite::SqliteStore, telemetry::MemoryTelemetry,
    },
    http::{HeaderMap, HeaderValue},
    secrecy::Secret,
    serde_json::json,
};

const SECRET: &str = "It's a Secret to Everybody";

struct Harness {
    ingress: WebhookIngress,
    dispatcher: Dispatcher,
    store: Arc<SqliteStore>,
    telemetry: MemoryTelemetry,
    providers: ProvidersConfig,
}

async fn harness(api_base_url: String) -> Harness {
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let telemetry = MemoryTelemetry::new();
    let providers = ProvidersConfig {
        github: Some(GithubConfig {
            webhook_secret: Secret::new(SECRET.into()),
            token: Secret::new("ghp_test".into()),
            api_base_url,
            ..GithubConfig::default()
        }),
        ..ProvidersConfig::default()
    };
    let service = Arc::new(RuntimeService::new(
        store.clone(),
        PolicyEngine::default(),
        Arc::new(telemetry.clone()),
    ));
    let dispatcher = Dispatcher::new(
        store.clone(),
        DispatchConfig {
            jitter: false,
            ..DispatchConfig::default()
        },
        Arc::new(telemetry.clone()),
    );
    Harness {
        ingress: WebhookIngress::from_config(service, &providers),
        dispatcher,
        store,
        telemetry,
        providers,
    }
}

fn comment_body() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "action": "created",
        "repository": {"name": "widgets", "owner": {"login": "acme", "type": "Organization"}},
        "issue": {"number": 7, "body": "Setup fails", "user": {"login": "octocat", "type": "User"}},
        "comment": {
            "id": 1001,
            "body": "Can you share the latest docs link for setup?",
            "user": {"login": "octocat", "type": "User"},
            "created_at": "2025-03-01T10:00:00Z"
        },
        "sender": {"login": "octocat", "type": "User"}
    }))
    .unwrap()
}

fn signed_headers(body: &[u8], delivery: &str) -> HeaderMap {
    let sig = hmac_sha256_hex(SECRET.as_bytes(), &[body]).unwrap();
    let mut headers = HeaderMap::new();
    headers.insert(
        HUB_SIGNATURE_HEADER,
        HeaderValue::from_str(&format!("sha256={sig}")).unwrap(),
    );
    headers.insert("x-github-delivery", HeaderValue::from_str(delivery).unwrap());
    headers.insert("x-github-event", HeaderValue::from_static("issue_comment"));
    headers
}

fn request<'a>(body: &'a [u8], headers: &'a HeaderMap) -> WebhookRequest<'a> {
    WebhookRequest {
        workspace_id: "acme",
        body,
        headers,
        url: None,
        received_at_ms: 1_740_823_200_000,
    }
}

#[tokio::test]
async fn signed_comment_is_answered_exactly_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/repos/acme/widgets/issues/7/comments")
        .match_header("authorization", "Bearer ghp_test")
        .with_status(201)
        .with_body(r#"{"id": 555, "html_url": "https://github.com/acme/widgets/issues/7#issuecomment-555"}"#)
        .expect(1)
        .create_async()
        .await;
    let h = harness(server.url()).await;

    let body = comment_body();
    let headers = signed_headers(&body, "d-1");
    let first = h
        .ingress
        .handle(ProviderKey::Github, &request(&body, &headers))
        .await
        .unwrap();
    assert_eq!(first.results.len(), 1);
    assert_eq!(first.results[0].status, IngestStatus::Accepted);

    // Provider redelivery of the same event.
    let again = h
        .ingress
        .handle(ProviderKey::Github, &request(&body, &headers))
        .await
        .unwrap();
    assert_eq!(again.results[0].status, IngestStatus::Duplicate);
    assert_eq!(again.results[0].receipt_id, first.results[0].receipt_id);

    let senders = providers::senders(&h.providers, h.dispatcher.config());
    let summary = h.dispatcher.dispatch_batch(&senders, 10).await.unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.sent, 1);

    // Nothing left to claim.
    let summary = h.dispatcher.dispatch_batch(&senders, 10).await.unwrap();
    assert_eq!(summary.claimed, 0);
    mock.assert_async().await;

    let receipt = h
        .store
        .get_receipt(&first.results[0].receipt_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Processed);
    assert_eq!(h.store.outbox_counts().await.unwrap(), vec![(
        OutboxStatus::Sent,
        1
    )]);

    let stages = h.telemetry.stages();
    assert!(stages.contains(&TelemetryStage::IngestDuplicate));
    assert!(stages.contains(&TelemetryStage::DispatchSent));
}

#[tokio::test]
async fn provider_outage_schedules_a_retry() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/repos/acme/widgets/issues/7/comments")
        .with_status(503)
        .with_body("unavailable")
        .create_async()
        .await;
    let h = harness(server.url()).await;

    let body = comment_body();
    let headers = signed_headers(&body, "d-2");
    h.ingress
        .handle(ProviderKey::Github, &request(&body, &headers))
        .await
        .unwrap();

    let senders = providers::senders(&h.providers, h.dispatcher.config());
    let summary = h.dispatcher.dispatch_batch(&senders, 10).await.unwrap();
    assert_eq!(summary.retried, 1);

    // Backed off, so not immediately due again.
    let summary = h.dispatcher.dispatch_batch(&senders, 10).await.unwrap();
    assert_eq!(summary.claimed, 0);

    let dead = h.store.list_dead_letters(10).await.unwrap();
    assert!(dead.is_empty());
    assert_eq!(h.store.outbox_counts().await.unwrap(), vec![(
        OutboxStatus::Retryable,
        1
    )]);
}

#[tokio::test]
async fn forged_webhook_leaves_nothing_behind() {
    let h = harness("http://127.0.0.1:9".into()).await;
    let body = comment_body();
    let mut headers = signed_headers(&body, "d-3");
    headers.insert(
        HUB_SIGNATURE_HEADER,
        HeaderValue::from_static("sha256=0000000000000000000000000000000000000000000000000000000000000000"),
    );

    let err = h
        .ingress
        .handle(ProviderKey::Github, &request(&body, &headers))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "signature_mismatch");
    assert!(h.store.receipt_counts().await.unwrap().is_empty());
    assert!(h.store.outbox_counts().await.unwrap().is_empty());
    assert_eq!(h.telemetry.stages(), vec![TelemetryStage::IngestRejected]);

    // The genuine delivery of the same event is unaffected.
    let headers = signed_headers(&body, "d-3");
    let outcome = h
        .ingress
        .handle(ProviderKey::Github, &request(&body, &headers))
        .await
        .unwrap();
    assert_eq!(outcome.results[0].status, IngestStatus::Accepted);
    assert_eq!(h.store.receipt_counts().await.unwrap(), vec![(
        ReceiptStatus::Processed,
        1
    )]);
}
