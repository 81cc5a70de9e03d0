//! Transactions and the transaction committer.
//!
//! # Responsibility
//! - Execute a graph's steps in order, feeding outputs forward.
//! - Issue exactly one terminal save call.
//!
//! # Invariants
//! - The save call is never retried.
//! - A step failure stops execution before the save call.

use crate::bridge::invoker::TypedInvoker;
use crate::bridge::signature::{rem, symbol};
use crate::bridge::symbol::SymbolName;
use crate::bridge::value::{Handle, Value, ValueShape};
use crate::bridge::BridgeError;
use crate::graph::builder::OperationKind;
use crate::graph::identity::{Identity, IdentityKind};
use crate::graph::step::{Arg, ChangeGraph, Step, StepId};
use crate::graph::MutationError;
use log::{error, info};
use serde::Serialize;
use std::time::Instant;

/// A change graph plus its terminal save step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    graph: ChangeGraph,
    commit: SymbolName,
}

impl Transaction {
    pub fn new(graph: ChangeGraph) -> Self {
        Self {
            graph,
            commit: symbol(rem::SAVE),
        }
    }

    pub fn graph(&self) -> &ChangeGraph {
        &self.graph
    }

    pub fn commit_symbol(&self) -> &SymbolName {
        &self.commit
    }
}

/// Outputs of a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub operation: OperationKind,
    /// Output of each step, indexed by step id.
    pub outputs: Vec<Value>,
    /// Handle to extract the identity from, when the operation has one.
    pub result: Option<(Handle, IdentityKind)>,
}

/// Successful mutation as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationResult {
    pub operation: OperationKind,
    pub success: bool,
    /// Extracted identity; `None` for operations without a result object.
    pub identity: Option<Identity>,
}

impl MutationResult {
    pub fn committed(operation: OperationKind, identity: Option<Identity>) -> Self {
        Self {
            operation,
            success: true,
            identity,
        }
    }

    pub fn has_placeholder(&self) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| identity.placeholder)
    }
}

/// Executes transactions through the typed invoker.
pub struct TransactionCommitter<'a> {
    invoker: TypedInvoker<'a>,
}

impl<'a> TransactionCommitter<'a> {
    pub fn new(invoker: TypedInvoker<'a>) -> Self {
        Self { invoker }
    }

    /// Runs every step, then the save call.
    ///
    /// # Errors
    /// - `InvocationFailed` / `ShapeMismatch` from a step; save not called.
    /// - `CommitFailed` when the save call fails; store state is unspecified.
    pub fn commit(&self, transaction: &Transaction) -> Result<CommitOutcome, MutationError> {
        let started_at = Instant::now();
        let graph = transaction.graph();
        let mut outputs: Vec<Value> = Vec::with_capacity(graph.len());

        for step in graph.steps() {
            let args = resolve_args(step, &outputs)?;
            let value = self
                .invoker
                .invoke(&step.symbol, &args, step.expected)
                .map_err(|err| {
                    error!(
                        "event=transaction_step module=graph status=error operation={} step={} symbol={} error_code={}",
                        graph.operation(),
                        step.id.index(),
                        step.symbol,
                        err.kind()
                    );
                    MutationError::from_bridge(step.id.index(), err)
                })?;
            outputs.push(value);
        }

        let request = output_handle(&outputs, graph.save_request()).ok_or_else(|| {
            MutationError::ShapeMismatch {
                symbol: transaction.commit_symbol().to_string(),
                detail: "save request handle missing".to_string(),
            }
        })?;

        if let Err(err) = self.invoker.invoke(
            transaction.commit_symbol(),
            &[Value::Handle(request)],
            ValueShape::Void,
        ) {
            error!(
                "event=transaction_commit module=graph status=error operation={} steps={} duration_ms={} error_code=commit_failed",
                graph.operation(),
                graph.len(),
                started_at.elapsed().as_millis()
            );
            let message = match err {
                BridgeError::InvocationFailed { message, .. } => message,
                other => other.to_string(),
            };
            return Err(MutationError::CommitFailed {
                symbol: transaction.commit_symbol().to_string(),
                message,
            });
        }

        info!(
            "event=transaction_commit module=graph status=ok operation={} steps={} duration_ms={}",
            graph.operation(),
            graph.len(),
            started_at.elapsed().as_millis()
        );

        let result = graph
            .result()
            .and_then(|(id, kind)| output_handle(&outputs, id).map(|handle| (handle, kind)));
        Ok(CommitOutcome {
            operation: graph.operation(),
            outputs,
            result,
        })
    }
}

fn output_handle(outputs: &[Value], id: StepId) -> Option<Handle> {
    outputs.get(id.index()).and_then(Value::as_handle)
}

fn resolve_args(step: &Step, outputs: &[Value]) -> Result<Vec<Value>, MutationError> {
    let unexecuted = |id: StepId| MutationError::ShapeMismatch {
        symbol: step.symbol.to_string(),
        detail: format!("step {} depends on unexecuted step {id}", step.id),
    };
    step.args
        .iter()
        .map(|arg| match arg {
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Output(id) => outputs.get(id.index()).cloned().ok_or_else(|| unexecuted(*id)),
            Arg::Outputs(ids) => ids
                .iter()
                .map(|id| output_handle(outputs, *id).ok_or_else(|| unexecuted(*id)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::HandleList),
        })
        .collect()
}
