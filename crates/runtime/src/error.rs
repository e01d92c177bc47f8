use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Channels(#[from] courier_channels::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable code stored on a failed receipt.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Json(_) => "SERIALIZATION_FAILED",
            Self::Sqlx(_) | Self::Migrate(_) => "STORE_FAILED",
            Self::Channels(_) => "INVALID_EVENT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Message { .. } => "PROCESSING_FAILED",
        }
    }
}

impl courier_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

courier_common::impl_context!();
