//! Core domain logic for remindctl.
//!
//! This crate joins three views of the host task store into one model:
//! the stable public API, the undocumented object-graph API reached through
//! runtime symbol resolution, and the read-only relational mirror on disk.

pub mod bridge;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod mirror;
pub mod model;
pub mod reconcile;
pub mod service;
pub mod store;

pub use bridge::invoker::{Completion, TypedInvoker};
pub use bridge::native::{private_resolver, public_resolver, DylibBackend};
pub use bridge::resolver::{
    CallbackFn, DirectFn, LibraryInfo, NativeEntry, NativeFailure, NativeResult, SymbolBackend,
    SymbolResolver,
};
pub use bridge::signature::{
    private_signatures, public_signatures, Dispatch, Signature, SignatureTable, SymbolRef,
};
pub use bridge::symbol::{Capability, SymbolName, SymbolNameError};
pub use bridge::value::{Handle, Value, ValueShape};
pub use bridge::BridgeError;
pub use config::{ConfigError, RemindctlConfig};
pub use error::ErrorKind;
pub use graph::builder::{ChangeGraphBuilder, Operation, OperationKind};
pub use graph::commit::{CommitOutcome, MutationResult, Transaction, TransactionCommitter};
pub use graph::engine::MutationEngine;
pub use graph::identity::{Identity, IdentityExtractor, IdentityKind};
pub use graph::step::{Arg, ChangeGraph, Step, StepId};
pub use graph::MutationError;
pub use logging::{default_log_level, init_logging, logging_status};
pub use mirror::{
    ContainerRecord, ItemRecord, MirrorError, MirrorReader, MirrorRecord, MirrorSelector,
    MirrorSnapshot, SectionRecord,
};
pub use model::entity::{Container, DomainEntity, IdSource, Section, SharingStatus, Task};
pub use model::id::{normalize_identifier, same_identifier};
pub use model::membership::{
    rebuild_memberships, reference_timestamp_now, Membership, MembershipSet,
};
pub use reconcile::{reconcile, Reconciled};
pub use service::reminder_service::{
    AddOutcome, MembershipStatus, ReminderService, ReminderTarget,
};
pub use service::section_service::SectionService;
pub use service::subtask_service::SubtaskService;
pub use service::{ServiceError, ServiceResult};
pub use store::bridged::BridgedStore;
pub use store::memory::MemoryStore;
pub use store::{
    live_objects, resolve_list, LiveList, LiveObject, LiveReminder, PublicStore, ReminderDraft,
    ReminderPatch, ReminderPredicate, StoreError, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
