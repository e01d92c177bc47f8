use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, bail},
    clap::Args,
    courier_channels::{ProviderKey, WebhookRequest},
    courier_common::time::now_ms,
    courier_config::IngestMode,
    courier_policy::PolicyEngine,
    courier_runtime::{RuntimeService, WebhookIngress, telemetry::TracingTelemetry},
    http::{HeaderMap, HeaderName, HeaderValue},
    serde_json::json,
};

use crate::{checked_config, open_store};

#[derive(Args)]
pub struct IngestArgs {
    /// Provider key: slack, github, whatsapp_cloud or whatsapp_twilio.
    #[arg(long)]
    provider: ProviderKey,
    /// Workspace the webhook belongs to.
    #[arg(long)]
    workspace: String,
    /// File holding the exact request body.
    #[arg(long)]
    body: PathBuf,
    /// Request header as `name:value`; repeatable.
    #[arg(long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,
    /// Public URL the provider posted to (needed by URL-signing relays).
    #[arg(long)]
    url: Option<String>,
}

fn parse_headers(raw: &[String]) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once(':') else {
            bail!("header must be NAME:VALUE, got {entry:?}");
        };
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .with_context(|| format!("invalid header name in {entry:?}"))?;
        let value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("invalid header value in {entry:?}"))?;
        headers.append(name, value);
    }
    Ok(headers)
}

pub async fn handle_ingest(args: IngestArgs, config_path: Option<&PathBuf>) -> anyhow::Result<()> {
    let config = checked_config(config_path)?;
    let body = std::fs::read(&args.body)
        .with_context(|| format!("failed to read {}", args.body.display()))?;
    let headers = parse_headers(&args.headers)?;

    let store = open_store(&config).await?;
    // The process exits after this call, so processing cannot be deferred.
    let service = Arc::new(
        RuntimeService::new(
            store,
            PolicyEngine::new(&config.policy),
            Arc::new(TracingTelemetry),
        )
        .with_mode(IngestMode::Inline),
    );
    let ingress = WebhookIngress::from_config(service, &config.providers);

    let request = WebhookRequest {
        workspace_id: &args.workspace,
        body: &body,
        headers: &headers,
        url: args.url.as_deref(),
        received_at_ms: now_ms(),
    };

    match ingress.handle(args.provider, &request).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        },
        Err(rejection) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "error": rejection.code(),
                    "status": rejection.http_status(),
                    "message": rejection.to_string(),
                }))?
            );
            bail!("webhook rejected: {rejection}")
        },
    }
}
