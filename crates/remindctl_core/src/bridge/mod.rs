//! Reflective invocation bridge into runtime-resolved native symbols.
//!
//! # Responsibility
//! - Resolve (entity, method) symbols at runtime and cache the answer.
//! - Invoke resolved symbols only through declared signatures.
//!
//! # Invariants
//! - A symbol is never invoked before its capability is confirmed.
//! - Shape checks happen before the native call boundary is crossed.
//! - Resolution results are append-only for the resolver lifetime.

use crate::error::ErrorKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod invoker;
pub mod native;
pub mod resolver;
pub mod signature;
pub mod symbol;
pub mod value;

/// Errors raised at the bridge boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Symbol (or its library) is not present in this process.
    CapabilityUnavailable { symbol: String, reason: String },
    /// Call shape differs from the declared signature.
    ShapeMismatch { symbol: String, detail: String },
    /// Native code reported a failure; `message` is the library's own text.
    InvocationFailed { symbol: String, message: String },
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapabilityUnavailable { .. } => ErrorKind::CapabilityUnavailable,
            Self::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Self::InvocationFailed { .. } => ErrorKind::InvocationFailed,
        }
    }

    /// Symbol display name the failure refers to.
    pub fn symbol(&self) -> &str {
        match self {
            Self::CapabilityUnavailable { symbol, .. }
            | Self::ShapeMismatch { symbol, .. }
            | Self::InvocationFailed { symbol, .. } => symbol,
        }
    }
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapabilityUnavailable { symbol, reason } => {
                write!(f, "capability unavailable: {symbol} ({reason})")
            }
            Self::ShapeMismatch { symbol, detail } => {
                write!(f, "shape mismatch calling {symbol}: {detail}")
            }
            Self::InvocationFailed { symbol, message } => {
                write!(f, "native call {symbol} failed: {message}")
            }
        }
    }
}

impl Error for BridgeError {}
