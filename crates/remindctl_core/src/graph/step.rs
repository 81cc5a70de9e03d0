//! Steps and change graphs.
//!
//! # Invariants
//! - Step ids are dense indexes in execution order.
//! - An argument only refers to outputs of earlier steps.

use crate::bridge::signature::{symbol, SymbolRef};
use crate::bridge::symbol::SymbolName;
use crate::bridge::value::{Value, ValueShape};
use crate::graph::builder::OperationKind;
use crate::graph::identity::IdentityKind;
use std::fmt::{Display, Formatter};

/// Index of a step inside its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(usize);

impl StepId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for StepId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One step argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Result of an earlier step.
    Output(StepId),
    /// Handles produced by several earlier steps, passed as one list.
    Outputs(Vec<StepId>),
    Literal(Value),
}

impl Arg {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal(Value::Text(value.into()))
    }

    fn dependencies(&self) -> Vec<StepId> {
        match self {
            Self::Output(id) => vec![*id],
            Self::Outputs(ids) => ids.clone(),
            Self::Literal(_) => Vec::new(),
        }
    }
}

/// One planned native call.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: StepId,
    pub symbol: SymbolName,
    pub args: Vec<Arg>,
    pub expected: ValueShape,
}

impl Step {
    pub fn depends_on(&self) -> Vec<StepId> {
        self.args.iter().flat_map(Arg::dependencies).collect()
    }
}

/// Ordered, uncommitted steps of one logical mutation.
///
/// Built fresh per operation and consumed by its transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeGraph {
    operation: OperationKind,
    steps: Vec<Step>,
    save_request: StepId,
    result: Option<(StepId, IdentityKind)>,
}

impl ChangeGraph {
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step producing the save request the commit runs on.
    pub fn save_request(&self) -> StepId {
        self.save_request
    }

    /// Step whose handle carries the identity of the mutated object.
    pub fn result(&self) -> Option<(StepId, IdentityKind)> {
        self.result
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.get(id.index())
    }
}

/// Append-only step list used while assembling a graph.
pub(crate) struct GraphDraft {
    operation: OperationKind,
    steps: Vec<Step>,
}

impl GraphDraft {
    pub(crate) fn new(operation: OperationKind) -> Self {
        Self {
            operation,
            steps: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, target: SymbolRef, args: Vec<Arg>, expected: ValueShape) -> StepId {
        let id = StepId(self.steps.len());
        self.steps.push(Step {
            id,
            symbol: symbol(target),
            args,
            expected,
        });
        id
    }

    pub(crate) fn finish(
        self,
        save_request: StepId,
        result: Option<(StepId, IdentityKind)>,
    ) -> ChangeGraph {
        ChangeGraph {
            operation: self.operation,
            steps: self.steps,
            save_request,
            result,
        }
    }
}
