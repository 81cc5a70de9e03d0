//! Symbol names and capability answers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

static ENTITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("entity pattern is a valid regex")
});

// Selector style: `name`, `name:`, `name:other:`.
static METHOD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(:([A-Za-z_][A-Za-z0-9_]*:)*)?$")
        .expect("method pattern is a valid regex")
});

/// One (entity, method) pair on a native surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolName {
    entity: String,
    method: String,
}

impl SymbolName {
    /// Builds a validated symbol name.
    pub fn new(
        entity: impl Into<String>,
        method: impl Into<String>,
    ) -> Result<Self, SymbolNameError> {
        let entity = entity.into();
        let method = method.into();
        if entity.is_empty() {
            return Err(SymbolNameError::EmptyEntity);
        }
        if method.is_empty() {
            return Err(SymbolNameError::EmptyMethod);
        }
        if !ENTITY_PATTERN.is_match(&entity) {
            return Err(SymbolNameError::InvalidEntity(entity));
        }
        if !METHOD_PATTERN.is_match(&method) {
            return Err(SymbolNameError::InvalidMethod(method));
        }
        Ok(Self { entity, method })
    }

    /// Builds a symbol name from compile-time constants.
    ///
    /// Static signature tables are checked by unit tests, so invalid names
    /// only surface as unavailable capabilities, never as panics.
    pub(crate) fn declared(entity: &'static str, method: &'static str) -> Self {
        Self {
            entity: entity.to_string(),
            method: method.to_string(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Exported C symbol name: `<Entity>__<method>` with `:` mapped to `_`.
    pub fn export_name(&self) -> String {
        format!("{}__{}", self.entity, self.method.replace(':', "_"))
    }

    /// Whether both halves match the naming scheme.
    pub fn is_well_formed(&self) -> bool {
        ENTITY_PATTERN.is_match(&self.entity) && METHOD_PATTERN.is_match(&self.method)
    }
}

impl Display for SymbolName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.entity, self.method)
    }
}

/// Symbol name validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolNameError {
    EmptyEntity,
    EmptyMethod,
    InvalidEntity(String),
    InvalidMethod(String),
}

impl Display for SymbolNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyEntity => write!(f, "symbol entity must not be empty"),
            Self::EmptyMethod => write!(f, "symbol method must not be empty"),
            Self::InvalidEntity(value) => write!(f, "invalid symbol entity `{value}`"),
            Self::InvalidMethod(value) => write!(f, "invalid symbol method `{value}`"),
        }
    }
}

impl Error for SymbolNameError {}

/// Cached availability answer for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub symbol: SymbolName,
    pub available: bool,
    /// Human-readable cause when `available == false`.
    pub reason: Option<String>,
}

impl Capability {
    pub fn available(symbol: SymbolName) -> Self {
        Self {
            symbol,
            available: true,
            reason: None,
        }
    }

    pub fn unavailable(symbol: SymbolName, reason: impl Into<String>) -> Self {
        Self {
            symbol,
            available: false,
            reason: Some(reason.into()),
        }
    }

    /// Unavailability reason, or an empty string for available symbols.
    pub fn reason_text(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}
