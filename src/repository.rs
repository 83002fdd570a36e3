//! The lodge repository port. The engine reads and writes lodge records only
//! through this trait; the hosted backend, the in-memory store and the durable
//! log store are interchangeable behind it.

use async_trait::async_trait;

use crate::model::{AvailabilityPatch, Lodge, LodgeId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoError {
    #[error("lodge not found: {0}")]
    NotFound(LodgeId),

    #[error("lodge already exists: {0}")]
    AlreadyExists(LodgeId),

    /// The store refused the record as given.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Backend rejected or failed the operation.
    #[error("backend error in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RepoError {
    pub fn backend(operation: &'static str, message: impl ToString) -> Self {
        Self::Backend {
            operation,
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LodgeRepository: Send + Sync {
    async fn get(&self, id: &LodgeId) -> Result<Lodge, RepoError>;

    /// Apply a partial update and return the record as it now stands in the store.
    async fn update(&self, id: &LodgeId, patch: AvailabilityPatch) -> Result<Lodge, RepoError>;

    /// Every lodge, in the store's own order.
    async fn list(&self) -> Result<Vec<Lodge>, RepoError>;
}
