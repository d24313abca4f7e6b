use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    /// WiFi was required for the request but is not connected.
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl OfflineError {
    pub(crate) fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Returns `true` for failures of the persistence or file layer.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            OfflineError::Storage(_)
                | OfflineError::Database(_)
                | OfflineError::Migration(_)
                | OfflineError::Bridge(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OfflineError>;
