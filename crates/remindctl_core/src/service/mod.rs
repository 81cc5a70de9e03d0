//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate the public store, the mutation engine and the mirror into
//!   the subtask, section and reminder commands.
//! - Keep the CLI decoupled from native and storage details.
//!
//! # Invariants
//! - Mirror snapshots are taken before a mutation starts, never during one.

use crate::error::ErrorKind;
use crate::graph::MutationError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod reminder_service;
pub mod section_service;
pub mod subtask_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors from use-case services.
#[derive(Debug)]
pub enum ServiceError {
    /// Argument is blank or contradicts current state.
    InvalidInput(String),
    /// Referenced entity does not exist in any source.
    NotFound(String),
    /// Undocumented-API mutation failed.
    Mutation(MutationError),
    /// Stable public API failed.
    Store(StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Mutation(err) => err.kind(),
            Self::Store(err) => err.kind(),
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Mutation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mutation(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MutationError> for ServiceError {
    fn from(value: MutationError) -> Self {
        match value {
            MutationError::InvalidOperation(message) => Self::InvalidInput(message),
            other => Self::Mutation(other),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Trims `value`, rejecting blank input.
pub(crate) fn required_text(field: &str, value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidInput(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}
