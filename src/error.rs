//! Error types for relational store operations

use thiserror::Error;

/// Errors that can occur during relational store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("List not found: {0}")]
    ListNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{} errors occurred: {}", .0.len(), join_errors(.0))]
    Batch(Vec<StoreError>),
}

fn join_errors(errors: &[StoreError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn list_not_found(msg: impl Into<String>) -> Self {
        Self::ListNotFound(msg.into())
    }

    pub fn item_not_found(msg: impl Into<String>) -> Self {
        Self::ItemNotFound(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    /// Collapse a list of independently collected failures.
    ///
    /// No errors yields `Ok(())`, a single error is returned unchanged and
    /// anything more is wrapped in [`StoreError::Batch`].
    pub fn from_batch(mut errors: Vec<StoreError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Batch(errors)),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
