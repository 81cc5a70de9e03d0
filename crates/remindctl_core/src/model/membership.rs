//! Section membership sets.
//!
//! # Responsibility
//! - Decode and encode the serialized membership blob stored per list.
//! - Rebuild a membership set for a single reminder reassignment.
//!
//! # Invariants
//! - Rebuilding preserves the relative order of untouched memberships.
//! - A reminder appears at most once in a rebuilt set.

use crate::model::id::normalize_identifier;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
const REFERENCE_EPOCH_OFFSET_SECS: u64 = 978_307_200;

/// Version tag written when no previous blob exists.
pub const DEFAULT_MINIMUM_SUPPORTED_VERSION: i64 = 20_230_430;

/// One reminder-to-section assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    #[serde(rename = "memberID")]
    pub member_id: String,
    #[serde(rename = "groupID")]
    pub group_id: String,
    /// Seconds since 2001-01-01 UTC.
    #[serde(rename = "modifiedOn", default)]
    pub modified_on: f64,
}

impl Membership {
    pub fn new(member_id: &str, group_id: &str, modified_on: f64) -> Self {
        Self {
            member_id: normalize_identifier(member_id),
            group_id: normalize_identifier(group_id),
            modified_on,
        }
    }

    fn normalized(mut self) -> Self {
        self.member_id = normalize_identifier(&self.member_id);
        self.group_id = normalize_identifier(&self.group_id);
        self
    }
}

/// Serialized membership blob of one list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipSet {
    #[serde(rename = "minimumSupportedVersion", default)]
    pub minimum_supported_version: i64,
    pub memberships: Vec<Membership>,
}

impl Default for MembershipSet {
    fn default() -> Self {
        Self {
            minimum_supported_version: DEFAULT_MINIMUM_SUPPORTED_VERSION,
            memberships: Vec::new(),
        }
    }
}

impl MembershipSet {
    /// Decodes a blob read from the mirror. Identifiers are normalized.
    pub fn from_blob(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut set: Self = serde_json::from_slice(bytes)?;
        set.memberships = set
            .memberships
            .into_iter()
            .map(Membership::normalized)
            .collect();
        Ok(set)
    }

    pub fn to_blob(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Section the given reminder belongs to, if any.
    pub fn group_of(&self, member_id: &str) -> Option<&str> {
        let member_id = normalize_identifier(member_id);
        self.memberships
            .iter()
            .find(|membership| membership.member_id == member_id)
            .map(|membership| membership.group_id.as_str())
    }
}

/// Rebuilds `existing` so `member_id` belongs to `target_group`.
///
/// The entry for the same reminder is replaced in place; otherwise the new
/// membership is appended. `None` removes the reminder's entry.
pub fn rebuild_memberships(
    existing: &[Membership],
    member_id: &str,
    target_group: Option<&str>,
    modified_on: f64,
) -> Vec<Membership> {
    let member_id = normalize_identifier(member_id);
    let mut rebuilt = Vec::with_capacity(existing.len() + 1);
    let mut placed = false;

    for membership in existing {
        if normalize_identifier(&membership.member_id) != member_id {
            rebuilt.push(membership.clone().normalized());
            continue;
        }
        if placed {
            continue;
        }
        placed = true;
        if let Some(group) = target_group {
            rebuilt.push(Membership::new(&member_id, group, modified_on));
        }
    }

    if !placed {
        if let Some(group) = target_group {
            rebuilt.push(Membership::new(&member_id, group, modified_on));
        }
    }
    rebuilt
}

/// Current time as seconds since 2001-01-01 UTC.
pub fn reference_timestamp_now() -> f64 {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    since_unix.as_secs_f64() - REFERENCE_EPOCH_OFFSET_SECS as f64
}
