use std::path::PathBuf;

use {clap::Subcommand, courier_policy::PolicyEngine};

use crate::load_config;

#[derive(Subcommand)]
pub enum PolicyAction {
    /// Evaluate a message against the configured policy and print the result.
    Eval {
        /// Message text.
        text: String,
    },
}

pub fn handle_policy(action: PolicyAction, config_path: Option<&PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let engine = PolicyEngine::new(&config.policy);
    match action {
        PolicyAction::Eval { text } => {
            let evaluation = engine.evaluate_text(&text);
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
        },
    }
    Ok(())
}
