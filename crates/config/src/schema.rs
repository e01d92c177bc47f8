//! Config schema types (database, ingest, policy, dispatch, providers).

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub policy: PolicyConfig,
    pub dispatch: DispatchConfig,
    pub providers: ProvidersConfig,
    pub metrics: MetricsConfig,
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite:courier.db?mode=rwc`.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:courier.db?mode=rwc".into(),
            max_connections: 5,
        }
    }
}

/// Where post-dedup ingest processing runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Decision and enqueue run before `ingest` returns.
    #[default]
    Inline,
    /// Decision and enqueue run on a spawned tokio task.
    Background,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub mode: IngestMode,
}

/// Policy mode recorded on every decision.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Suggest,
    Assist,
    #[default]
    Autonomous,
}

impl PolicyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Suggest => "suggest",
            Self::Assist => "assist",
            Self::Autonomous => "autonomous",
        }
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PolicyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "suggest" => Ok(Self::Suggest),
            "assist" => Ok(Self::Assist),
            "autonomous" => Ok(Self::Autonomous),
            other => Err(format!("unknown policy mode: {other}")),
        }
    }
}

/// Thresholds and phrase lists for the heuristic policy engine.
///
/// Phrases are matched as lower-case substrings of the lower-cased message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub autonomous_threshold: f64,
    pub assist_threshold: f64,
    pub model_name: String,
    pub model_version: String,
    /// Highest mode a decision may take. Autonomous verdicts are downgraded
    /// to assist when this is below `autonomous`.
    pub max_mode: PolicyMode,
    pub blocked_phrases: Vec<String>,
    pub high_risk_phrases: Vec<String>,
    pub medium_risk_phrases: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            autonomous_threshold: 0.85,
            assist_threshold: 0.65,
            model_name: "courier-heuristic".into(),
            model_version: "1".into(),
            max_mode: PolicyMode::Autonomous,
            blocked_phrases: to_strings(DEFAULT_BLOCKED_PHRASES),
            high_risk_phrases: to_strings(DEFAULT_HIGH_RISK_PHRASES),
            medium_risk_phrases: to_strings(DEFAULT_MEDIUM_RISK_PHRASES),
        }
    }
}

/// Credential exfiltration, destructive commands and instruction overrides.
pub const DEFAULT_BLOCKED_PHRASES: &[&str] = &[
    "api key",
    "secret",
    "password",
    "token",
    "private key",
    "credentials",
    "ssh key",
    "ignore previous instructions",
    "ignore all previous",
    "disregard previous",
    "reveal your system prompt",
    "system prompt",
    "rm -rf",
    "drop table",
    "delete all",
    "wipe the database",
];

/// Financial and account-destructive topics.
pub const DEFAULT_HIGH_RISK_PHRASES: &[&str] = &[
    "refund",
    "chargeback",
    "delete account",
    "close account",
    "close my account",
    "cancel subscription",
    "wire transfer",
    "bank account",
    "payment",
    "billing",
    "invoice",
];

/// Urgency, escalation and compliance language.
pub const DEFAULT_MEDIUM_RISK_PHRASES: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "escalate",
    "lawsuit",
    "legal",
    "lawyer",
    "compliance",
    "gdpr",
    "complaint",
    "outage",
];

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Outbox dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Attempts before an action is dead-lettered.
    pub max_retries: u32,
    /// Backoff for the first retry; doubles on every further attempt.
    pub base_backoff_ms: u64,
    /// Multiply each backoff by a random factor in `[0.8, 1.2]`.
    pub jitter: bool,
    pub batch_size: u32,
    pub poll_interval_secs: u64,
    /// Actions left in `sending` longer than this are returned to `retryable`.
    /// The claim is refreshed before every send, so this only has to outlast
    /// one provider call.
    pub claim_timeout_secs: u64,
    /// Upper bound on a single provider API call.
    pub send_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff_ms: 30_000,
            jitter: true,
            batch_size: 25,
            poll_interval_secs: 5,
            claim_timeout_secs: 300,
            send_timeout_secs: 30,
        }
    }
}

/// Per-provider credentials and endpoints. A missing section disables the
/// provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub slack: Option<SlackConfig>,
    pub github: Option<GithubConfig>,
    pub whatsapp_cloud: Option<WhatsAppCloudConfig>,
    pub whatsapp_twilio: Option<TwilioConfig>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    #[serde(serialize_with = "serialize_secret")]
    pub signing_secret: Secret<String>,
    #[serde(serialize_with = "serialize_secret")]
    pub bot_token: Secret<String>,
    /// Maximum age of a signed request timestamp.
    pub timestamp_tolerance_secs: i64,
    pub api_base_url: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            signing_secret: Secret::new(String::new()),
            bot_token: Secret::new(String::new()),
            timestamp_tolerance_secs: 300,
            api_base_url: "https://slack.com".into(),
        }
    }
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("signing_secret", &"[REDACTED]")
            .field("bot_token", &"[REDACTED]")
            .field("timestamp_tolerance_secs", &self.timestamp_tolerance_secs)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    #[serde(serialize_with = "serialize_secret")]
    pub webhook_secret: Secret<String>,
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
    pub api_base_url: String,
    /// Login of the app/bot account; its own comments are dropped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_login: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            webhook_secret: Secret::new(String::new()),
            token: Secret::new(String::new()),
            api_base_url: "https://api.github.com".into(),
            bot_login: None,
        }
    }
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("webhook_secret", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("bot_login", &self.bot_login)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppCloudConfig {
    #[serde(serialize_with = "serialize_secret")]
    pub app_secret: Secret<String>,
    /// Token echoed back during the GET subscription handshake.
    pub verify_token: String,
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,
    /// Business phone number ID; pushes for other numbers are ignored when set.
    pub phone_number_id: String,
    pub api_base_url: String,
    pub api_version: String,
}

impl Default for WhatsAppCloudConfig {
    fn default() -> Self {
        Self {
            app_secret: Secret::new(String::new()),
            verify_token: String::new(),
            access_token: Secret::new(String::new()),
            phone_number_id: String::new(),
            api_base_url: "https://graph.facebook.com".into(),
            api_version: "v21.0".into(),
        }
    }
}

impl std::fmt::Debug for WhatsAppCloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppCloudConfig")
            .field("app_secret", &"[REDACTED]")
            .field("verify_token", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("phone_number_id", &self.phone_number_id)
            .field("api_base_url", &self.api_base_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    #[serde(serialize_with = "serialize_secret")]
    pub auth_token: Secret<String>,
    pub account_sid: String,
    pub api_base_url: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            auth_token: Secret::new(String::new()),
            account_sid: String::new(),
            api_base_url: "https://api.twilio.com".into(),
        }
    }
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("auth_token", &"[REDACTED]")
            .field("account_sid", &self.account_sid)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

/// Metrics export settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CourierConfig::default();
        assert_eq!(cfg.ingest.mode, IngestMode::Inline);
        assert!((cfg.policy.autonomous_threshold - 0.85).abs() < f64::EPSILON);
        assert!((cfg.policy.assist_threshold - 0.65).abs() < f64::EPSILON);
        assert_eq!(cfg.dispatch.max_retries, 5);
        assert!(cfg.providers.slack.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let raw = r#"
            [ingest]
            mode = "background"

            [dispatch]
            max_retries = 3

            [providers.slack]
            signing_secret = "shh"
        "#;
        let cfg: CourierConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.ingest.mode, IngestMode::Background);
        assert_eq!(cfg.dispatch.max_retries, 3);
        assert_eq!(cfg.dispatch.batch_size, 25);
        let slack = cfg.providers.slack.unwrap();
        assert_eq!(slack.signing_secret.expose_secret(), "shh");
        assert_eq!(slack.timestamp_tolerance_secs, 300);
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = SlackConfig {
            signing_secret: Secret::new("very-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn policy_mode_ordering() {
        assert!(PolicyMode::Suggest < PolicyMode::Assist);
        assert!(PolicyMode::Assist < PolicyMode::Autonomous);
        assert_eq!("assist".parse::<PolicyMode>().unwrap(), PolicyMode::Assist);
        assert!("yolo".parse::<PolicyMode>().is_err());
    }
}
