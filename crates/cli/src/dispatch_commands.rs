use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    clap::Args,
    courier_config::CourierConfig,
    courier_runtime::{Dispatcher, providers, telemetry::TracingTelemetry},
    tracing::{debug, error, info, warn},
};

use crate::{MetricsRender, open_store};

#[derive(Args)]
pub struct DispatchArgs {
    /// Run a single batch and exit.
    #[arg(long)]
    once: bool,
    /// Actions claimed per batch (defaults to `dispatch.batch_size`).
    #[arg(long)]
    limit: Option<u32>,
    /// Write Prometheus metrics to this file after every tick and on exit,
    /// for a node_exporter textfile collector.
    #[arg(long)]
    metrics_file: Option<PathBuf>,
}

/// Destination and source of the metrics snapshot.
struct MetricsExport {
    path: PathBuf,
    render: MetricsRender,
}

impl MetricsExport {
    fn new(path: Option<PathBuf>, render: Option<MetricsRender>) -> Option<Self> {
        match (path, render) {
            (Some(path), Some(render)) => Some(Self { path, render }),
            (Some(path), None) => {
                warn!(path = %path.display(), "built without metrics support; --metrics-file ignored");
                None
            },
            (None, _) => None,
        }
    }

    async fn write(&self) {
        match write_atomically(&self.path, &(self.render)()).await {
            Ok(()) => debug!(path = %self.path.display(), "metrics snapshot written"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to write metrics"),
        }
    }
}

/// Write through a sibling temp file and rename, so scrapers never read a
/// partial snapshot.
async fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

pub async fn handle_dispatch(
    args: DispatchArgs,
    config: CourierConfig,
    render: Option<MetricsRender>,
) -> anyhow::Result<()> {
    let metrics = MetricsExport::new(args.metrics_file, render);
    let store = open_store(&config).await?;
    let senders = providers::senders(&config.providers, &config.dispatch);
    if senders.is_empty() {
        warn!("no provider senders configured; every due action will be dead-lettered");
    }
    let limit = args.limit.unwrap_or(config.dispatch.batch_size).max(1);
    let poll_interval = Duration::from_secs(config.dispatch.poll_interval_secs.max(1));
    let dispatcher = Dispatcher::new(store, config.dispatch, Arc::new(TracingTelemetry));

    if args.once {
        dispatcher.requeue_stale().await?;
        let summary = dispatcher.dispatch_batch(&senders, limit).await?;
        if let Some(metrics) = &metrics {
            metrics.write().await;
        }
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    info!(
        providers = ?senders.providers(),
        limit,
        poll_interval_secs = poll_interval.as_secs(),
        "dispatcher started"
    );
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = tokio::signal::ctrl_c() => {
                info!("dispatcher stopping");
                if let Some(metrics) = &metrics {
                    metrics.write().await;
                }
                return Ok(());
            },
        }

        if let Err(e) = dispatcher.requeue_stale().await {
            error!(error = %e, "failed to requeue stale claims");
        }
        // Drain while full batches keep coming back.
        loop {
            match dispatcher.dispatch_batch(&senders, limit).await {
                Ok(summary) if summary.claimed >= limit as usize => continue,
                Ok(_) => break,
                Err(e) => {
                    error!(error = %e, "dispatch batch failed");
                    break;
                },
            }
        }
        if let Some(metrics) = &metrics {
            metrics.write().await;
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    #[tokio::test]
    async fn metrics_snapshot_replaces_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("courier.prom");
        let export = MetricsExport::new(
            Some(path.clone()),
            Some(Box::new(|| "courier_outbox_sent_total 3\n".to_string())),
        )
        .unwrap();

        std::fs::write(&path, "stale").unwrap();
        export.write().await;
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "courier_outbox_sent_total 3\n"
        );
        assert!(!dir.path().join("courier.prom.tmp").exists());
    }

    #[test]
    fn export_needs_a_path_and_a_recorder() {
        let render = || -> Option<MetricsRender> { Some(Box::new(String::new)) };
        assert!(MetricsExport::new(None, render()).is_none());
        assert!(MetricsExport::new(Some("m.prom".into()), None).is_none());
        assert!(MetricsExport::new(Some("m.prom".into()), render()).is_some());
    }
}
