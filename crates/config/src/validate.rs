//! Semantic validation of a loaded configuration.
//!
//! Parsing already rejects malformed files; this pass catches values that
//! deserialize fine but would make the runtime misbehave.

use secrecy::ExposeSecret;

use crate::schema::CourierConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "policy.assist_threshold"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate thresholds, retry settings and provider credentials.
pub fn validate(config: &CourierConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let policy = &config.policy;

    for (path, value) in [
        ("policy.autonomous_threshold", policy.autonomous_threshold),
        ("policy.assist_threshold", policy.assist_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            result.push(Severity::Error, path, format!("{value} is outside [0, 1]"));
        }
    }
    if policy.assist_threshold > policy.autonomous_threshold {
        result.push(
            Severity::Error,
            "policy.assist_threshold",
            "must not exceed policy.autonomous_threshold",
        );
    }
    for (path, phrases) in [
        ("policy.blocked_phrases", &policy.blocked_phrases),
        ("policy.high_risk_phrases", &policy.high_risk_phrases),
        ("policy.medium_risk_phrases", &policy.medium_risk_phrases),
    ] {
        if phrases.is_empty() {
            result.push(Severity::Warning, path, "list is empty");
        } else if phrases.iter().any(|p| p.trim().is_empty()) {
            result.push(Severity::Error, path, "contains an empty phrase");
        }
    }

    let dispatch = &config.dispatch;
    if dispatch.max_retries == 0 {
        result.push(Severity::Error, "dispatch.max_retries", "must be at least 1");
    }
    if dispatch.base_backoff_ms == 0 {
        result.push(
            Severity::Error,
            "dispatch.base_backoff_ms",
            "must be greater than zero",
        );
    }
    if dispatch.batch_size == 0 {
        result.push(Severity::Error, "dispatch.batch_size", "must be at least 1");
    }
    if dispatch.send_timeout_secs == 0 {
        result.push(
            Severity::Error,
            "dispatch.send_timeout_secs",
            "must be greater than zero",
        );
    }
    if dispatch.claim_timeout_secs <= dispatch.send_timeout_secs {
        result.push(
            Severity::Error,
            "dispatch.claim_timeout_secs",
            format!(
                "must exceed dispatch.send_timeout_secs ({}s) or in-flight sends are requeued",
                dispatch.send_timeout_secs
            ),
        );
    }

    let providers = &config.providers;
    if let Some(slack) = &providers.slack {
        if slack.signing_secret.expose_secret().is_empty() {
            result.push(
                Severity::Warning,
                "providers.slack.signing_secret",
                "empty secret; every webhook will be rejected",
            );
        }
        if slack.timestamp_tolerance_secs <= 0 {
            result.push(
                Severity::Error,
                "providers.slack.timestamp_tolerance_secs",
                "must be greater than zero",
            );
        }
    }
    if let Some(github) = &providers.github
        && github.webhook_secret.expose_secret().is_empty()
    {
        result.push(
            Severity::Warning,
            "providers.github.webhook_secret",
            "empty secret; every webhook will be rejected",
        );
    }
    if let Some(whatsapp) = &providers.whatsapp_cloud
        && whatsapp.app_secret.expose_secret().is_empty()
    {
        result.push(
            Severity::Warning,
            "providers.whatsapp_cloud.app_secret",
            "empty secret; every webhook will be rejected",
        );
    }
    if let Some(twilio) = &providers.whatsapp_twilio
        && twilio.auth_token.expose_secret().is_empty()
    {
        result.push(
            Severity::Warning,
            "providers.whatsapp_twilio.auth_token",
            "empty secret; every webhook will be rejected",
        );
    }

    result
}
