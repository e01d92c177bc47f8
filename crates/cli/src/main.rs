mod config_commands;
mod db_commands;
mod dispatch_commands;
mod ingest_commands;
mod outbox_commands;
mod policy_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::bail,
    clap::{Parser, Subcommand},
    courier_config::{CourierConfig, Severity},
    courier_runtime::store_sqlite::SqliteStore,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier: multi-provider channel runtime", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of the discovered one.
    #[arg(long, global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Database management.
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
    /// Feed a captured webhook through verification and the ingest pipeline.
    Ingest(ingest_commands::IngestArgs),
    /// Deliver due outbox actions.
    Dispatch(dispatch_commands::DispatchArgs),
    /// Inspect the policy engine.
    Policy {
        #[command(subcommand)]
        action: policy_commands::PolicyAction,
    },
    /// Outbox inspection.
    Outbox {
        #[command(subcommand)]
        action: outbox_commands::OutboxAction,
    },
    /// Configuration validation.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the config from `--config` or the standard locations.
pub(crate) fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CourierConfig> {
    let config = match path {
        Some(path) => {
            let mut config = courier_config::load_config(path)?;
            courier_config::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
            config
        },
        None => courier_config::discover_and_load(),
    };
    Ok(config)
}

/// Refuse to run on a config with errors; log its warnings.
pub(crate) fn checked_config(path: Option<&PathBuf>) -> anyhow::Result<CourierConfig> {
    let config = load_config(path)?;
    let result = courier_config::validate(&config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Error => error!(path = %d.path, "{}", d.message),
        }
    }
    if result.has_errors() {
        bail!(
            "configuration has {} error(s); run `courier config check`",
            result.count(Severity::Error)
        );
    }
    Ok(config)
}

/// Renders the Prometheus exposition text of the installed recorder.
pub(crate) type MetricsRender = Box<dyn Fn() -> String + Send + Sync>;

pub(crate) async fn open_store(config: &CourierConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let store =
        SqliteStore::connect(&config.database.url, config.database.max_connections).await?;
    Ok(Arc::new(store))
}

#[cfg(feature = "metrics")]
fn init_metrics(config: &CourierConfig) -> anyhow::Result<courier_metrics::MetricsHandle> {
    let global_labels = config
        .metrics
        .prefix
        .iter()
        .map(|prefix| ("service".to_string(), prefix.clone()))
        .collect();
    Ok(courier_metrics::init_metrics(
        courier_metrics::MetricsRecorderConfig {
            enabled: config.metrics.enabled,
            global_labels,
        },
    )?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "courier starting");

    let config_path = cli.config.as_ref();
    match cli.command {
        Commands::Db { action } => db_commands::handle_db(action, config_path).await,
        Commands::Ingest(args) => ingest_commands::handle_ingest(args, config_path).await,
        Commands::Dispatch(args) => {
            let config = checked_config(config_path)?;
            #[cfg(feature = "metrics")]
            let render: Option<MetricsRender> = {
                let handle = init_metrics(&config)?;
                Some(Box::new(move || handle.render()))
            };
            #[cfg(not(feature = "metrics"))]
            let render: Option<MetricsRender> = None;
            dispatch_commands::handle_dispatch(args, config, render).await
        },
        Commands::Policy { action } => policy_commands::handle_policy(action, config_path),
        Commands::Outbox { action } => outbox_commands::handle_outbox(action, config_path).await,
        Commands::Config { action } => config_commands::handle_config(action, config_path),
    }
}
