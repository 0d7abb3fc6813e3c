use thiserror::Error;

use crate::db::models::{MatchId, MatchStatus};

/// Why a match request was rejected. Nothing is published for any of these.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Missing or malformed input, caught before the store is touched
    #[error("{0}")]
    Validation(String),

    #[error("no match found with id {0}")]
    NotFound(MatchId),

    #[error("an identical match is already stored")]
    Duplicate,

    #[error("cannot change match status from {from} to {to}")]
    InvalidTransition { from: MatchStatus, to: MatchStatus },

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl MatchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        MatchError::Validation(msg.into())
    }
}
