//! Change-graph builder.
//!
//! # Responsibility
//! - Map each supported mutation to its step chain.
//! - Probe every required symbol before assembling steps.
//! - Check the assembled chain against the declared signatures.
//!
//! # Invariants
//! - A missing capability yields `CapabilityUnavailable` with no steps built
//!   and no native call made.
//! - Memberships are always passed through the dedicated wrapper type.

use crate::bridge::resolver::SymbolResolver;
use crate::bridge::signature::{rem, symbol, SignatureTable, SymbolRef};
use crate::bridge::symbol::SymbolName;
use crate::bridge::value::{Value, ValueShape};
use crate::graph::identity::IdentityKind;
use crate::graph::step::{Arg, ChangeGraph, GraphDraft, Step, StepId};
use crate::graph::MutationError;
use crate::model::membership::Membership;
use log::{debug, warn};
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Kind of logical mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateSubtask,
    CreateSection,
    RenameSection,
    DeleteSection,
    AssignSection,
    MoveReminder,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateSubtask => "create_subtask",
            Self::CreateSection => "create_section",
            Self::RenameSection => "rename_section",
            Self::DeleteSection => "delete_section",
            Self::AssignSection => "assign_section",
            Self::MoveReminder => "move_reminder",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation request with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// reminder -> subtask context -> new subtask.
    CreateSubtask { parent_id: String, title: String },
    /// list -> sections context -> new section.
    CreateSection { list_id: String, display_name: String },
    RenameSection { section_id: String, display_name: String },
    DeleteSection { section_id: String },
    /// Replace the list's whole membership set.
    AssignSection {
        list_id: String,
        memberships: Vec<Membership>,
    },
    /// Copy into the target list, then remove the original.
    ///
    /// Completion, priority and due date are only set on the copy when they
    /// differ from a new reminder's defaults.
    MoveReminder {
        reminder_id: String,
        target_list_id: String,
        title: String,
        notes: Option<String>,
        completed: bool,
        priority: i64,
        due_date: Option<f64>,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateSubtask { .. } => OperationKind::CreateSubtask,
            Self::CreateSection { .. } => OperationKind::CreateSection,
            Self::RenameSection { .. } => OperationKind::RenameSection,
            Self::DeleteSection { .. } => OperationKind::DeleteSection,
            Self::AssignSection { .. } => OperationKind::AssignSection,
            Self::MoveReminder { .. } => OperationKind::MoveReminder,
        }
    }

    /// Every symbol the operation's steps and commit will invoke.
    pub fn required_symbols(&self) -> Vec<SymbolRef> {
        let mut required = vec![rem::STORE_NEW, rem::SAVE_REQUEST_INIT];
        match self {
            Self::CreateSubtask { .. } => required.extend([
                rem::FETCH_REMINDER,
                rem::UPDATE_REMINDER,
                rem::SUBTASK_CONTEXT_OF,
                rem::ADD_REMINDER_TO_SUBTASKS,
            ]),
            Self::CreateSection { .. } => required.extend([
                rem::FETCH_LIST,
                rem::UPDATE_LIST,
                rem::SECTIONS_CONTEXT_OF_LIST,
                rem::NEW_SECTION,
            ]),
            Self::RenameSection { .. } => required.extend([
                rem::FETCH_SECTION,
                rem::UPDATE_SECTION,
                rem::SECTION_SET_DISPLAY_NAME,
            ]),
            Self::DeleteSection { .. } => {
                required.extend([rem::FETCH_SECTION, rem::UPDATE_SECTION, rem::SECTION_REMOVE])
            }
            Self::AssignSection { memberships, .. } => {
                required.extend([
                    rem::FETCH_LIST,
                    rem::UPDATE_LIST,
                    rem::SECTIONS_CONTEXT_OF_LIST,
                    rem::NEW_MEMBERSHIPS,
                    rem::SET_MEMBERSHIPS,
                ]);
                if !memberships.is_empty() {
                    required.push(rem::NEW_MEMBERSHIP);
                }
            }
            Self::MoveReminder {
                notes,
                completed,
                priority,
                due_date,
                ..
            } => {
                required.extend([
                    rem::FETCH_LIST,
                    rem::UPDATE_LIST,
                    rem::FETCH_REMINDER,
                    rem::UPDATE_REMINDER,
                    rem::ADD_REMINDER_TO_LIST,
                    rem::REMINDER_REMOVE,
                ]);
                if notes.is_some() {
                    required.push(rem::REMINDER_SET_NOTES);
                }
                if *completed {
                    required.push(rem::REMINDER_SET_COMPLETED);
                }
                if *priority != 0 {
                    required.push(rem::REMINDER_SET_PRIORITY);
                }
                if due_date.is_some() {
                    required.push(rem::REMINDER_SET_DUE_DATE);
                }
            }
        }
        required.push(rem::SAVE);
        required
    }

    fn validate(&self) -> Result<(), MutationError> {
        let fields: Vec<(&str, &str)> = match self {
            Self::CreateSubtask { parent_id, title } => {
                vec![("parent_id", parent_id.as_str()), ("title", title.as_str())]
            }
            Self::CreateSection {
                list_id,
                display_name,
            } => vec![("list_id", list_id.as_str()), ("display_name", display_name.as_str())],
            Self::RenameSection {
                section_id,
                display_name,
            } => vec![("section_id", section_id.as_str()), ("display_name", display_name.as_str())],
            Self::DeleteSection { section_id } => vec![("section_id", section_id.as_str())],
            Self::AssignSection { list_id, .. } => vec![("list_id", list_id.as_str())],
            Self::MoveReminder {
                reminder_id,
                target_list_id,
                title,
                ..
            } => vec![
                ("reminder_id", reminder_id.as_str()),
                ("target_list_id", target_list_id.as_str()),
                ("title", title.as_str()),
            ],
        };
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(MutationError::InvalidOperation(format!(
                    "{name} must not be blank"
                )));
            }
        }
        Ok(())
    }
}

/// Builds change graphs after probing their capabilities.
pub struct ChangeGraphBuilder<'a> {
    resolver: &'a SymbolResolver,
    signatures: &'a SignatureTable,
}

impl<'a> ChangeGraphBuilder<'a> {
    pub fn new(resolver: &'a SymbolResolver, signatures: &'a SignatureTable) -> Self {
        Self {
            resolver,
            signatures,
        }
    }

    /// Probes, assembles and checks the graph for `operation`.
    ///
    /// # Errors
    /// - `CapabilityUnavailable` when any required symbol is missing.
    /// - `ShapeMismatch` when the chain disagrees with declared signatures.
    /// - `InvalidOperation` for blank parameters.
    pub fn build(&self, operation: &Operation) -> Result<ChangeGraph, MutationError> {
        operation.validate()?;

        let required: Vec<SymbolName> = operation
            .required_symbols()
            .into_iter()
            .map(symbol)
            .collect();
        let missing = self.resolver.missing(&required);
        if !missing.is_empty() {
            warn!(
                "event=graph_build module=graph status=aborted operation={} missing={}",
                operation.kind(),
                missing.len()
            );
            return Err(MutationError::CapabilityUnavailable {
                operation: operation.kind(),
                missing,
            });
        }

        let graph = assemble(operation);
        self.check(&graph)?;
        debug!(
            "event=graph_build module=graph status=ok operation={} steps={}",
            operation.kind(),
            graph.len()
        );
        Ok(graph)
    }

    fn check(&self, graph: &ChangeGraph) -> Result<(), MutationError> {
        for step in graph.steps() {
            let signature =
                self.signatures
                    .get(&step.symbol)
                    .ok_or_else(|| MutationError::ShapeMismatch {
                        symbol: step.symbol.to_string(),
                        detail: "symbol is not declared".to_string(),
                    })?;
            if signature.result != step.expected {
                return Err(mismatch(
                    step,
                    format!("expects {} but {} is declared", step.expected, signature.result),
                ));
            }
            if signature.params.len() != step.args.len() {
                return Err(mismatch(
                    step,
                    format!(
                        "declared arity {} but step passes {}",
                        signature.params.len(),
                        step.args.len()
                    ),
                ));
            }
            for (index, (param, arg)) in signature.params.iter().zip(&step.args).enumerate() {
                let fits = match arg {
                    Arg::Literal(value) => param.accepts(value),
                    Arg::Output(producer) => {
                        produced_shape(graph, step, *producer).is_some_and(|shape| feeds(*param, shape))
                    }
                    Arg::Outputs(producers) => {
                        *param == ValueShape::HandleList
                            && producers.iter().all(|producer| {
                                produced_shape(graph, step, *producer) == Some(ValueShape::Handle)
                            })
                    }
                };
                if !fits {
                    return Err(mismatch(
                        step,
                        format!("argument {index} does not fit declared {param}"),
                    ));
                }
            }
        }

        let commit_source = graph.step(graph.save_request());
        if commit_source.map(|step| step.expected) != Some(ValueShape::Handle) {
            return Err(MutationError::ShapeMismatch {
                symbol: symbol(rem::SAVE).to_string(),
                detail: "save request step does not produce a handle".to_string(),
            });
        }
        Ok(())
    }
}

fn mismatch(step: &Step, detail: String) -> MutationError {
    MutationError::ShapeMismatch {
        symbol: step.symbol.to_string(),
        detail: format!("step {}: {detail}", step.id),
    }
}

/// Shape produced by `producer`, only if it runs before `consumer`.
fn produced_shape(graph: &ChangeGraph, consumer: &Step, producer: StepId) -> Option<ValueShape> {
    if producer >= consumer.id {
        return None;
    }
    graph.step(producer).map(|step| step.expected)
}

fn feeds(param: ValueShape, produced: ValueShape) -> bool {
    match param {
        ValueShape::Optional(inner) => *inner == produced || param == produced,
        other => other == produced,
    }
}

fn assemble(operation: &Operation) -> ChangeGraph {
    use ValueShape::{Handle, Void};

    let mut draft = GraphDraft::new(operation.kind());
    let store = draft.push(rem::STORE_NEW, vec![], Handle);
    let request = draft.push(rem::SAVE_REQUEST_INIT, vec![Arg::Output(store)], Handle);

    let result = match operation {
        Operation::CreateSubtask { parent_id, title } => {
            let parent = draft.push(
                rem::FETCH_REMINDER,
                vec![Arg::Output(store), Arg::text(parent_id.as_str())],
                Handle,
            );
            let parent_change = draft.push(
                rem::UPDATE_REMINDER,
                vec![Arg::Output(request), Arg::Output(parent)],
                Handle,
            );
            let context = draft.push(rem::SUBTASK_CONTEXT_OF, vec![Arg::Output(parent_change)], Handle);
            let subtask = draft.push(
                rem::ADD_REMINDER_TO_SUBTASKS,
                vec![
                    Arg::Output(request),
                    Arg::text(title.trim()),
                    Arg::Output(context),
                ],
                Handle,
            );
            Some((subtask, IdentityKind::Reminder))
        }
        Operation::CreateSection {
            list_id,
            display_name,
        } => {
            let context = sections_context(&mut draft, store, request, list_id);
            let section = draft.push(
                rem::NEW_SECTION,
                vec![Arg::text(display_name.trim()), Arg::Output(context)],
                Handle,
            );
            Some((section, IdentityKind::Section))
        }
        Operation::RenameSection {
            section_id,
            display_name,
        } => {
            let change = section_change(&mut draft, store, request, section_id);
            draft.push(
                rem::SECTION_SET_DISPLAY_NAME,
                vec![Arg::Output(change), Arg::text(display_name.trim())],
                Void,
            );
            Some((change, IdentityKind::Section))
        }
        Operation::DeleteSection { section_id } => {
            let change = section_change(&mut draft, store, request, section_id);
            draft.push(rem::SECTION_REMOVE, vec![Arg::Output(change)], Void);
            None
        }
        Operation::AssignSection {
            list_id,
            memberships,
        } => {
            let context = sections_context(&mut draft, store, request, list_id);
            let entries = memberships
                .iter()
                .map(|membership| {
                    draft.push(
                        rem::NEW_MEMBERSHIP,
                        vec![
                            Arg::text(membership.member_id.as_str()),
                            Arg::text(membership.group_id.as_str()),
                            Arg::Literal(Value::Float(membership.modified_on)),
                        ],
                        Handle,
                    )
                })
                .collect();
            let wrapper = draft.push(rem::NEW_MEMBERSHIPS, vec![Arg::Outputs(entries)], Handle);
            draft.push(
                rem::SET_MEMBERSHIPS,
                vec![Arg::Output(context), Arg::Output(wrapper)],
                Void,
            );
            None
        }
        Operation::MoveReminder {
            reminder_id,
            target_list_id,
            title,
            notes,
            completed,
            priority,
            due_date,
        } => {
            let target = draft.push(
                rem::FETCH_LIST,
                vec![Arg::Output(store), Arg::text(target_list_id.as_str())],
                Handle,
            );
            let target_change = draft.push(
                rem::UPDATE_LIST,
                vec![Arg::Output(request), Arg::Output(target)],
                Handle,
            );
            let original = draft.push(
                rem::FETCH_REMINDER,
                vec![Arg::Output(store), Arg::text(reminder_id.as_str())],
                Handle,
            );
            let original_change = draft.push(
                rem::UPDATE_REMINDER,
                vec![Arg::Output(request), Arg::Output(original)],
                Handle,
            );
            let copy = draft.push(
                rem::ADD_REMINDER_TO_LIST,
                vec![
                    Arg::Output(request),
                    Arg::text(title.as_str()),
                    Arg::Output(target_change),
                ],
                Handle,
            );
            let mut setters = Vec::new();
            if let Some(notes) = notes {
                setters.push((rem::REMINDER_SET_NOTES, Arg::text(notes.as_str())));
            }
            if *completed {
                setters.push((rem::REMINDER_SET_COMPLETED, Arg::Literal(Value::Bool(true))));
            }
            if *priority != 0 {
                setters.push((rem::REMINDER_SET_PRIORITY, Arg::Literal(Value::Int(*priority))));
            }
            if let Some(due_date) = due_date {
                setters.push((rem::REMINDER_SET_DUE_DATE, Arg::Literal(Value::Float(*due_date))));
            }
            for (setter, value) in setters {
                draft.push(setter, vec![Arg::Output(copy), value], Void);
            }
            draft.push(rem::REMINDER_REMOVE, vec![Arg::Output(original_change)], Void);
            Some((copy, IdentityKind::Reminder))
        }
    };

    draft.finish(request, result)
}

fn sections_context(
    draft: &mut GraphDraft,
    store: StepId,
    request: StepId,
    list_id: &str,
) -> StepId {
    let list = draft.push(
        rem::FETCH_LIST,
        vec![Arg::Output(store), Arg::text(list_id)],
        ValueShape::Handle,
    );
    let list_change = draft.push(
        rem::UPDATE_LIST,
        vec![Arg::Output(request), Arg::Output(list)],
        ValueShape::Handle,
    );
    draft.push(
        rem::SECTIONS_CONTEXT_OF_LIST,
        vec![Arg::Output(list_change)],
        ValueShape::Handle,
    )
}

fn section_change(
    draft: &mut GraphDraft,
    store: StepId,
    request: StepId,
    section_id: &str,
) -> StepId {
    let section = draft.push(
        rem::FETCH_SECTION,
        vec![Arg::Output(store), Arg::text(section_id)],
        ValueShape::Handle,
    );
    draft.push(
        rem::UPDATE_SECTION,
        vec![Arg::Output(request), Arg::Output(section)],
        ValueShape::Handle,
    )
}
