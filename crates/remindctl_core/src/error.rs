//! Stable error kinds shared by every layer.
//!
//! # Responsibility
//! - Give each surfaced failure a stable, machine-readable kind.
//! - Keep kind strings identical across CLI text and JSON output.
//!
//! # Invariants
//! - Kind strings never change once released; new kinds are appended.

use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Stable failure category carried by every surfaced error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required undocumented-API symbol is absent.
    CapabilityUnavailable,
    /// Declared and actual call shapes disagree.
    ShapeMismatch,
    /// A native call reported an error.
    InvocationFailed,
    /// The terminal commit call failed; external state is unspecified.
    CommitFailed,
    /// No extraction path produced an identifier.
    IdentityUnresolved,
    /// A mirror file or row could not be read.
    MirrorReadError,
    NotFound,
    InvalidInput,
    StoreError,
    ConfigError,
}

impl ErrorKind {
    /// Stable string id used in logs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CapabilityUnavailable => "capability_unavailable",
            Self::ShapeMismatch => "shape_mismatch",
            Self::InvocationFailed => "invocation_failed",
            Self::CommitFailed => "commit_failed",
            Self::IdentityUnresolved => "identity_unresolved",
            Self::MirrorReadError => "mirror_read_error",
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::StoreError => "store_error",
            Self::ConfigError => "config_error",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
