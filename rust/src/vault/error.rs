use std::fmt::{self, Display};

use thiserror::Error;

use super::record::ScriptId;
use crate::storage::PersistError;

/// Request field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidField {
    Script,
    UserId,
}

impl Display for InvalidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidField::Script => f.write_str("script is empty"),
            InvalidField::UserId => f.write_str("user id is empty"),
        }
    }
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid input: {0}")]
    InvalidInput(InvalidField),
    /// `existing` names the matching record when the caller has no id of its own yet.
    #[error("duplicate script")]
    DuplicateScript { existing: Option<ScriptId> },
    #[error("script not found")]
    NotFound,
    #[error("script belongs to another owner")]
    Forbidden,
    #[error("client not allowed to fetch scripts")]
    AccessDenied,
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("internal vault error: {0}")]
    Internal(String),
}
