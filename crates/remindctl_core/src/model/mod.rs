//! Caller-facing domain model.
//!
//! # Responsibility
//! - Define reconciled value objects handed to callers.
//! - Own identifier normalization and membership-set rules.
//!
//! # Invariants
//! - Model values hold no native handles.
//! - Identifiers stored in model values are always normalized.

pub mod entity;
pub mod id;
pub mod membership;
