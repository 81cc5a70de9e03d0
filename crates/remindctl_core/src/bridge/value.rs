//! Typed values crossing the native call boundary.

use std::fmt::{Display, Formatter};

/// Opaque reference to a native object.
///
/// The bridge never dereferences handles; they are only passed back into
/// later calls on the same surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle#{:x}", self.0)
    }
}

/// One argument or result value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent object (null pointer / nil).
    Nil,
    /// No result.
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Handle(Handle),
    HandleList(Vec<Handle>),
}

impl Value {
    /// Shape of this concrete value. `Nil` has no shape of its own.
    pub fn shape(&self) -> Option<ValueShape> {
        match self {
            Self::Nil => None,
            Self::Void => Some(ValueShape::Void),
            Self::Bool(_) => Some(ValueShape::Bool),
            Self::Int(_) => Some(ValueShape::Int),
            Self::Float(_) => Some(ValueShape::Float),
            Self::Text(_) => Some(ValueShape::Text),
            Self::Handle(_) => Some(ValueShape::Handle),
            Self::HandleList(_) => Some(ValueShape::HandleList),
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Self::Handle(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn into_handles(self) -> Option<Vec<Handle>> {
        match self {
            Self::HandleList(handles) => Some(handles),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

/// Declared shape of a parameter or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Void,
    Bool,
    Int,
    Float,
    Text,
    Handle,
    HandleList,
    /// Either the inner shape or `Value::Nil`.
    Optional(&'static ValueShape),
}

/// Result shape for accessors that may return nil objects.
pub const MAYBE_HANDLE: ValueShape = ValueShape::Optional(&ValueShape::Handle);
/// Result shape for accessors that may return nil strings.
pub const MAYBE_TEXT: ValueShape = ValueShape::Optional(&ValueShape::Text);
/// Result shape for accessors that may return nil numbers.
pub const MAYBE_FLOAT: ValueShape = ValueShape::Optional(&ValueShape::Float);

impl ValueShape {
    /// Whether `value` satisfies this shape.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Optional(_), Value::Nil) => true,
            (Self::Optional(inner), other) => inner.accepts(other),
            (_, Value::Nil) => false,
            (shape, other) => other.shape() == Some(shape),
        }
    }
}

impl Display for ValueShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Text => write!(f, "text"),
            Self::Handle => write!(f, "handle"),
            Self::HandleList => write!(f, "handle[]"),
            Self::Optional(inner) => write!(f, "{inner}?"),
        }
    }
}

/// Short description of a value for diagnostics; never includes text content.
pub fn describe(value: &Value) -> String {
    match value.shape() {
        Some(shape) => shape.to_string(),
        None => "nil".to_string(),
    }
}
