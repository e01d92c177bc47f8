use {async_trait::async_trait, std::sync::Arc};

use crate::{event::ProviderKey, records::OutboxAction};

/// Result of a successful send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider_message_id: Option<String>,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
}

/// A failed send. `retryable = false` dead-letters the action immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SendError {
    pub code: Option<String>,
    pub message: String,
    pub retryable: bool,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
}

impl SendError {
    /// Transient failure without a provider code.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            retryable: true,
            response_status: None,
            response_body: None,
        }
    }

    /// Terminal failure with a stable code.
    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            retryable: false,
            response_status: None,
            response_body: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Classify an HTTP failure: 429 and 5xx retry, every other status is
    /// terminal. The code is `HTTP_<status>`.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            code: Some(format!("HTTP_{status}")),
            message: format!("provider responded with HTTP {status}"),
            retryable: status == 429 || status >= 500,
            response_status: Some(status),
            response_body: (!body.is_empty()).then_some(body),
        }
    }
}

/// Outbound half of a provider.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, action: &OutboxAction) -> Result<SendReceipt, SendError>;
}

/// Resolves the sender responsible for a provider, if one is deployed.
pub trait SenderResolver: Send + Sync {
    fn resolve(&self, provider: ProviderKey) -> Option<Arc<dyn OutboundSender>>;
}
