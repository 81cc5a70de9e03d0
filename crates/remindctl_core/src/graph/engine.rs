//! Mutation engine: build, commit, extract.
//!
//! # Responsibility
//! - Run one logical mutation end to end under the transaction gate.
//!
//! # Invariants
//! - Transactions from this process never interleave.
//! - Identity extraction only follows a successful commit.

use crate::bridge::invoker::TypedInvoker;
use crate::bridge::resolver::SymbolResolver;
use crate::bridge::signature::SignatureTable;
use crate::graph::builder::{ChangeGraphBuilder, Operation};
use crate::graph::commit::{MutationResult, Transaction, TransactionCommitter};
use crate::graph::identity::IdentityExtractor;
use crate::graph::{lock_transactions, MutationError};
use log::{error, info, warn};
use std::time::Instant;

/// Entry point for mutations on the undocumented surface.
#[derive(Clone, Copy)]
pub struct MutationEngine<'a> {
    resolver: &'a SymbolResolver,
    signatures: &'a SignatureTable,
}

impl<'a> MutationEngine<'a> {
    pub fn new(resolver: &'a SymbolResolver, signatures: &'a SignatureTable) -> Self {
        Self {
            resolver,
            signatures,
        }
    }

    pub fn resolver(&self) -> &'a SymbolResolver {
        self.resolver
    }

    pub fn signatures(&self) -> &'a SignatureTable {
        self.signatures
    }

    /// Builds, commits and extracts the identity for `operation`.
    ///
    /// # Errors
    /// - Any builder error, with zero native calls made.
    /// - Step and commit failures from the committer.
    pub fn run(&self, operation: &Operation) -> Result<MutationResult, MutationError> {
        let _gate = lock_transactions();
        let started_at = Instant::now();
        let kind = operation.kind();
        info!("event=mutation module=graph status=start operation={kind}");

        let graph = ChangeGraphBuilder::new(self.resolver, self.signatures)
            .build(operation)
            .map_err(|err| {
                warn!(
                    "event=mutation module=graph status=aborted operation={kind} error_code={}",
                    err.kind()
                );
                err
            })?;

        let invoker = TypedInvoker::new(self.resolver, self.signatures);
        let outcome = TransactionCommitter::new(invoker)
            .commit(&Transaction::new(graph))
            .map_err(|err| {
                error!(
                    "event=mutation module=graph status=error operation={kind} duration_ms={} error_code={}",
                    started_at.elapsed().as_millis(),
                    err.kind()
                );
                err
            })?;

        let identity = outcome
            .result
            .map(|(handle, identity_kind)| IdentityExtractor::new(invoker).extract(handle, identity_kind));

        info!(
            "event=mutation module=graph status=ok operation={kind} duration_ms={} placeholder={}",
            started_at.elapsed().as_millis(),
            identity.as_ref().is_some_and(|identity| identity.placeholder)
        );
        Ok(MutationResult::committed(kind, identity))
    }
}
