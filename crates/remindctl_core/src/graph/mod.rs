//! Transactional change graphs over the undocumented object-graph API.
//!
//! # Responsibility
//! - Build typed, dependency-ordered step lists for each mutation.
//! - Commit them through one terminal save call and recover identities.
//!
//! # Invariants
//! - Every symbol a graph needs is probed before any step is built.
//! - Transactions run one at a time within the process.
//! - Identity extraction never runs after a failed commit.

use crate::bridge::symbol::Capability;
use crate::bridge::BridgeError;
use crate::error::ErrorKind;
use once_cell::sync::Lazy;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod builder;
pub mod commit;
pub mod engine;
pub mod identity;
pub mod step;

use builder::OperationKind;

static TRANSACTION_GATE: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Serializes transactions and mirror reads within this process.
///
/// Not reentrant: never call a mirror read while holding the guard.
pub(crate) fn lock_transactions() -> MutexGuard<'static, ()> {
    TRANSACTION_GATE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Failure of one logical mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationError {
    /// One or more required symbols are absent; nothing was invoked.
    CapabilityUnavailable {
        operation: OperationKind,
        missing: Vec<Capability>,
    },
    /// A call shape disagrees with its declaration.
    ShapeMismatch { symbol: String, detail: String },
    /// A non-terminal step failed before commit.
    InvocationFailed {
        step: usize,
        symbol: String,
        message: String,
    },
    /// The terminal save call failed. External state is unspecified.
    CommitFailed { symbol: String, message: String },
    /// No extraction path produced an identifier.
    IdentityUnresolved { attempts: Vec<String> },
    /// Operation parameters were rejected before building.
    InvalidOperation(String),
}

impl MutationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapabilityUnavailable { .. } => ErrorKind::CapabilityUnavailable,
            Self::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Self::InvocationFailed { .. } => ErrorKind::InvocationFailed,
            Self::CommitFailed { .. } => ErrorKind::CommitFailed,
            Self::IdentityUnresolved { .. } => ErrorKind::IdentityUnresolved,
            Self::InvalidOperation(_) => ErrorKind::InvalidInput,
        }
    }

    pub(crate) fn from_bridge(step: usize, err: BridgeError) -> Self {
        match err {
            BridgeError::CapabilityUnavailable { symbol, reason } => Self::InvocationFailed {
                step,
                symbol,
                message: format!("capability lost after probe: {reason}"),
            },
            BridgeError::ShapeMismatch { symbol, detail } => Self::ShapeMismatch { symbol, detail },
            BridgeError::InvocationFailed { symbol, message } => Self::InvocationFailed {
                step,
                symbol,
                message,
            },
        }
    }
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapabilityUnavailable { operation, missing } => {
                let names = missing
                    .iter()
                    .map(|capability| {
                        format!("{} ({})", capability.symbol, capability.reason_text())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{operation} is unavailable: missing {names}")
            }
            Self::ShapeMismatch { symbol, detail } => {
                write!(f, "shape mismatch calling {symbol}: {detail}")
            }
            Self::InvocationFailed {
                step,
                symbol,
                message,
            } => write!(f, "step {step} ({symbol}) failed: {message}"),
            Self::CommitFailed { symbol, message } => write!(
                f,
                "commit {symbol} failed: {message}; store state is unspecified"
            ),
            Self::IdentityUnresolved { attempts } => write!(
                f,
                "no identifier could be extracted (tried {})",
                attempts.join(", ")
            ),
            Self::InvalidOperation(detail) => write!(f, "invalid operation: {detail}"),
        }
    }
}

impl Error for MutationError {}
