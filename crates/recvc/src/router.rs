//! Dispatch router builder.
//!
//! A router is first built as a [`RouterPlan`], a structured description of its stages in
//! priority order. The plan is rendered to FunC by `func_emit` and executed by `dispatch`, so
//! both agree on branch order by construction.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::compile::{CompileErrorKind, CompilerError};
use crate::ident;
use crate::layout::{self, TypeRegistry};
use crate::ops;
use crate::program::{ContractType, Direction, Selector};
use crate::receiver;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerRef {
    /// Declaration index of the receiver within its contract.
    pub receiver: usize,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BounceArm {
    pub message: String,
    pub header: u32,
    /// Rendered opcode, as compared in generated code.
    pub opcode: String,
    pub reader: String,
    pub partial: bool,
    pub handler: HandlerRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BouncedStage {
    /// Skip the 32-bit bounce marker; only done when some bounce receiver reads the body.
    pub skip_marker: bool,
    pub arms: Vec<BounceArm>,
    pub fallback: Option<HandlerRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OpcodeArm {
    Binary {
        message: String,
        header: u32,
        opcode: String,
        reader: String,
        handler: HandlerRef,
    },
    Empty {
        handler: HandlerRef,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentArm {
    pub text: String,
    /// Pseudo-opcode: representation hash of the comment cell, 64 hex chars.
    pub hash: String,
    pub handler: HandlerRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextStage {
    pub comments: Vec<CommentArm>,
    pub fallback: Option<HandlerRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterPlan {
    pub contract: String,
    pub direction: Direction,
    pub function: String,
    pub state_type: String,
    /// Present for internal routers only, even when no bounce receiver exists.
    pub bounced: Option<BouncedStage>,
    pub opcode_arms: Vec<OpcodeArm>,
    pub text: Option<TextStage>,
    pub fallback: Option<HandlerRef>,
}

pub fn build_router(
    contract: &ContractType,
    direction: Direction,
    registry: &TypeRegistry,
) -> Result<RouterPlan, CompilerError> {
    check_selectors(contract, direction, registry)?;

    let bounced = match direction {
        Direction::Internal => Some(build_bounced_stage(contract, registry)?),
        Direction::External => None,
    };

    let mut opcode_arms = Vec::new();
    let mut comments: Vec<CommentArm> = Vec::new();
    let mut comment_fallback = None;
    let mut fallback = None;
    for (index, recv) in contract.receivers_for(direction) {
        let at = |e: CompilerError| e.at_receiver(&contract.name, index);
        let handler = HandlerRef {
            receiver: index,
            function: receiver::handler_function(contract, recv).map_err(at)?,
        };
        match &recv.selector {
            Selector::Binary { message, .. } => {
                let alloc = registry.allocation(message).map_err(at)?;
                opcode_arms.push(OpcodeArm::Binary {
                    message: message.clone(),
                    header: alloc.header.value,
                    opcode: ident::message_opcode(&alloc.header),
                    reader: alloc.reader(false),
                    handler,
                });
            }
            Selector::Empty { .. } => opcode_arms.push(OpcodeArm::Empty { handler }),
            Selector::Comment { text, .. } => {
                let hash = ident::comment_pseudo_opcode(text, recv.loc.as_ref()).map_err(at)?;
                if let Some(first) = comments.iter().find(|c| c.hash == hash) {
                    warn!(
                        contract = %contract.name,
                        receiver = index,
                        shadowed_by = first.handler.receiver,
                        comment = %text,
                        "comment receiver is unreachable, an earlier receiver has the same text"
                    );
                    continue;
                }
                comments.push(CommentArm {
                    text: text.clone(),
                    hash,
                    handler,
                });
            }
            Selector::CommentFallback { .. } => comment_fallback = Some(handler),
            Selector::Fallback { .. } => fallback = Some(handler),
            Selector::BounceBinary { .. } | Selector::BounceFallback { .. } => {}
        }
    }

    let text = if comments.is_empty() && comment_fallback.is_none() {
        None
    } else {
        Some(TextStage {
            comments,
            fallback: comment_fallback,
        })
    };

    let plan = RouterPlan {
        contract: contract.name.clone(),
        direction,
        function: ops::contract_router(&contract.name, direction),
        state_type: layout::func_type(&contract.fields),
        bounced,
        opcode_arms,
        text,
        fallback,
    };
    debug!(
        contract = %plan.contract,
        direction = plan.direction.as_str(),
        opcode_arms = plan.opcode_arms.len(),
        comments = plan.text.as_ref().map_or(0, |t| t.comments.len()),
        "built router plan"
    );
    Ok(plan)
}

fn build_bounced_stage(
    contract: &ContractType,
    registry: &TypeRegistry,
) -> Result<BouncedStage, CompilerError> {
    let mut arms = Vec::new();
    let mut fallback = None;
    for (index, recv) in contract.receivers_for(Direction::Internal) {
        let at = |e: CompilerError| e.at_receiver(&contract.name, index);
        match &recv.selector {
            Selector::BounceBinary {
                message, partial, ..
            } => {
                let alloc = registry.allocation(message).map_err(at)?;
                arms.push(BounceArm {
                    message: message.clone(),
                    header: alloc.header.value,
                    opcode: ident::message_opcode(&alloc.header),
                    reader: alloc.reader(*partial),
                    partial: *partial,
                    handler: HandlerRef {
                        receiver: index,
                        function: receiver::handler_function(contract, recv).map_err(at)?,
                    },
                });
            }
            Selector::BounceFallback { .. } => {
                fallback = Some(HandlerRef {
                    receiver: index,
                    function: receiver::handler_function(contract, recv).map_err(at)?,
                });
            }
            _ => {}
        }
    }
    Ok(BouncedStage {
        skip_marker: !arms.is_empty() || fallback.is_some(),
        arms,
        fallback,
    })
}

/// Re-checks the classifier's invariants for one direction: single-instance selectors appear
/// at most once and binary opcodes are unique.
pub fn check_selectors(
    contract: &ContractType,
    direction: Direction,
    registry: &TypeRegistry,
) -> Result<(), CompilerError> {
    let mut singles: BTreeMap<String, usize> = BTreeMap::new();
    let mut opcodes: BTreeMap<(bool, u32), usize> = BTreeMap::new();
    for (index, recv) in contract.receivers_for(direction) {
        let invalid = |message: String| {
            CompilerError::new(CompileErrorKind::InvalidSelectorVariant, message)
                .at_receiver(&contract.name, index)
        };
        match &recv.selector {
            Selector::Empty { .. }
            | Selector::CommentFallback { .. }
            | Selector::Fallback { .. }
            | Selector::BounceFallback { .. } => {
                let kind = recv.selector.kind_name();
                if let Some(first) = singles.insert(kind.clone(), index) {
                    return Err(invalid(format!(
                        "{}: duplicate {kind} receiver (#{first} and #{index})",
                        contract.name
                    )));
                }
            }
            Selector::Binary { message, .. } | Selector::BounceBinary { message, .. } => {
                let alloc = registry
                    .allocation(message)
                    .map_err(|e| e.at_receiver(&contract.name, index))?;
                let key = (recv.selector.is_bounce(), alloc.header.value);
                if let Some(first) = opcodes.insert(key, index) {
                    return Err(invalid(format!(
                        "{}: opcode {} of {message} is handled twice by {} receivers (#{first} and #{index})",
                        contract.name,
                        ident::message_opcode(&alloc.header),
                        recv.selector.kind_name()
                    )));
                }
            }
            Selector::Comment { .. } => {}
        }
    }
    Ok(())
}
