use std::path::PathBuf;

use {
    clap::Subcommand,
    courier_runtime::RuntimeStore,
    serde_json::{Map, Value, json},
};

use crate::{load_config, open_store};

#[derive(Subcommand)]
pub enum OutboxAction {
    /// Receipt and outbox counts by status.
    Stats,
    /// List dead-lettered actions, most recently failed first.
    DeadLetters {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Include every delivery attempt of each action.
        #[arg(long)]
        attempts: bool,
    },
}

pub async fn handle_outbox(
    action: OutboxAction,
    config_path: Option<&PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;
    let report = match action {
        OutboxAction::Stats => stats(store.as_ref()).await?,
        OutboxAction::DeadLetters { limit, attempts } => {
            dead_letters(store.as_ref(), limit, attempts).await?
        },
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn stats(store: &dyn RuntimeStore) -> anyhow::Result<Value> {
    let receipts: Map<String, Value> = store
        .receipt_counts()
        .await?
        .into_iter()
        .map(|(status, n)| (status.to_string(), n.into()))
        .collect();
    let outbox: Map<String, Value> = store
        .outbox_counts()
        .await?
        .into_iter()
        .map(|(status, n)| (status.to_string(), n.into()))
        .collect();
    Ok(json!({ "receipts": receipts, "outbox": outbox }))
}

async fn dead_letters(
    store: &dyn RuntimeStore,
    limit: u32,
    with_attempts: bool,
) -> anyhow::Result<Value> {
    let actions = store.list_dead_letters(limit).await?;
    let mut rows = Vec::with_capacity(actions.len());
    for action in actions {
        let mut row = serde_json::to_value(&action)?;
        if with_attempts {
            let attempts = store.list_delivery_attempts(&action.id).await?;
            if let Value::Object(fields) = &mut row {
                fields.insert("attempts".into(), serde_json::to_value(attempts)?);
            }
        }
        rows.push(row);
    }
    Ok(Value::Array(rows))
}
