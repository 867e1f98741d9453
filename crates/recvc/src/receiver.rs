//! Receiver body lowering.
//!
//! Every receiver becomes one callable unit that takes the contract state by value and returns
//! `(state, ())`. Its payload is either a decoded struct (binary and bounce-binary selectors),
//! the raw remaining slice (fallback kinds) or nothing.

use serde::Serialize;
use tracing::trace;

use crate::compile::{CompileErrorKind, CompilerError};
use crate::ident;
use crate::layout::TypeRegistry;
use crate::ops;
use crate::program::{ContractType, FieldDef, ReceiverDescription, Selector};
use crate::stmt::{self, Operand, Place, Stmt};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    None,
    Struct {
        binding: String,
        message: String,
        fields: Vec<FieldDef>,
        partial: bool,
        /// Declared fields cut off by the partial layout.
        dropped: Vec<String>,
    },
    Slice {
        binding: String,
    },
}

impl Payload {
    pub fn binding(&self) -> Option<&str> {
        match self {
            Payload::None => None,
            Payload::Struct { binding, .. } | Payload::Slice { binding } => Some(binding),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredReceiver {
    pub contract: String,
    pub index: usize,
    pub selector: Selector,
    pub function: String,
    pub state_fields: Vec<FieldDef>,
    pub payload: Payload,
    pub body: Vec<Stmt>,
    /// The body can fall off its end, so `return (state, ())` is appended.
    pub implicit_return: bool,
}

/// Name of the callable unit generated for `recv`.
pub fn handler_function(
    contract: &ContractType,
    recv: &ReceiverDescription,
) -> Result<String, CompilerError> {
    let c = contract.name.as_str();
    Ok(match &recv.selector {
        Selector::Binary {
            direction, message, ..
        } => ops::receive_type(c, *direction, message),
        Selector::Empty { direction } => ops::receive_empty(c, *direction),
        Selector::Comment { direction, text } => {
            let hash = ident::comment_pseudo_opcode(text, recv.loc.as_ref())?;
            ops::receive_text(c, *direction, &hash)
        }
        Selector::CommentFallback { direction, .. } => ops::receive_any_text(c, *direction),
        Selector::Fallback { direction, .. } => ops::receive_any(c, *direction),
        Selector::BounceBinary { message, .. } => ops::receive_type_bounce(c, message),
        Selector::BounceFallback { .. } => ops::receive_bounce_any(c),
    })
}

pub fn lower_receiver(
    contract: &ContractType,
    index: usize,
    registry: &TypeRegistry,
) -> Result<LoweredReceiver, CompilerError> {
    let recv = contract.receivers.get(index).ok_or_else(|| {
        CompilerError::new(
            CompileErrorKind::Internal,
            format!(
                "internal error: {} has no receiver #{index}",
                contract.name
            ),
        )
    })?;
    let function = handler_function(contract, recv)?;
    let payload = match &recv.selector {
        Selector::Binary {
            message, binding, ..
        } => struct_payload(registry, message, binding, false)?,
        Selector::BounceBinary {
            message,
            binding,
            partial,
        } => struct_payload(registry, message, binding, *partial)?,
        Selector::Empty { .. } | Selector::Comment { .. } => Payload::None,
        Selector::CommentFallback { binding, .. }
        | Selector::Fallback { binding, .. }
        | Selector::BounceFallback { binding } => Payload::Slice {
            binding: binding.clone(),
        },
    };

    let mut scope = BodyScope::new(&contract.fields, &payload);
    scope.check_body(&recv.body)?;

    let implicit_return = !stmt::ends_in_return(&recv.body);
    trace!(
        contract = %contract.name,
        receiver = index,
        function = %function,
        implicit_return,
        "lowered receiver"
    );
    Ok(LoweredReceiver {
        contract: contract.name.clone(),
        index,
        selector: recv.selector.clone(),
        function,
        state_fields: contract.fields.clone(),
        payload,
        body: recv.body.clone(),
        implicit_return,
    })
}

fn struct_payload(
    registry: &TypeRegistry,
    message: &str,
    binding: &str,
    partial: bool,
) -> Result<Payload, CompilerError> {
    let alloc = registry.allocation(message)?;
    let fields = alloc.fields(partial).to_vec();
    let dropped = alloc.ty.fields[fields.len()..]
        .iter()
        .map(|f| f.name.clone())
        .collect();
    Ok(Payload::Struct {
        binding: binding.to_string(),
        message: message.to_string(),
        fields,
        partial,
        dropped,
    })
}

/// What a place in a receiver body refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding<'a> {
    StateField(&'a FieldDef),
    PayloadField(&'a str, &'a FieldDef),
    PayloadSlice(&'a str),
    Local,
}

/// Lexical scope of a receiver body: `self`, the payload binding and block-scoped locals.
#[derive(Debug)]
pub struct BodyScope<'a> {
    state: &'a [FieldDef],
    payload: &'a Payload,
    frames: Vec<Vec<String>>,
}

impl<'a> BodyScope<'a> {
    pub fn new(state: &'a [FieldDef], payload: &'a Payload) -> Self {
        Self {
            state,
            payload,
            frames: vec![Vec::new()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn declare(&mut self, name: &str) -> Result<(), CompilerError> {
        if name == "self" || self.payload.binding() == Some(name) {
            return Err(typing(format!("local {name:?} shadows a receiver binding")));
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.push(name.to_string());
        }
        Ok(())
    }

    fn is_local(&self, name: &str) -> bool {
        self.frames.iter().any(|f| f.iter().any(|n| n == name))
    }

    pub fn resolve(&self, place: &Place) -> Result<Binding<'a>, CompilerError> {
        let field = place.field.as_deref();
        if place.root == "self" {
            let Some(field) = field else {
                return Err(typing("`self` cannot be used as a value".to_string()));
            };
            return self
                .state
                .iter()
                .find(|f| f.name == field)
                .map(Binding::StateField)
                .ok_or_else(|| typing(format!("contract state has no field {field:?}")));
        }
        match self.payload {
            Payload::Struct {
                binding,
                message,
                fields,
                partial,
                dropped,
            } if *binding == place.root => {
                let Some(field) = field else {
                    return Err(typing(format!(
                        "message binding {binding:?} cannot be used as a value, access its fields"
                    )));
                };
                if let Some(f) = fields.iter().find(|f| f.name == field) {
                    return Ok(Binding::PayloadField(binding, f));
                }
                if *partial && dropped.iter().any(|d| d == field) {
                    return Err(typing(format!(
                        "field {field:?} of {message} is not available in a bounced message, \
                         the partial layout keeps only the first 224 bits"
                    )));
                }
                Err(typing(format!("message {message} has no field {field:?}")))
            }
            Payload::Slice { binding } if *binding == place.root => match field {
                None => Ok(Binding::PayloadSlice(binding)),
                Some(field) => Err(typing(format!(
                    "slice binding {binding:?} has no field {field:?}"
                ))),
            },
            _ => {
                if !self.is_local(&place.root) {
                    return Err(typing(format!("unknown name {:?}", place.root)));
                }
                match field {
                    None => Ok(Binding::Local),
                    Some(field) => Err(typing(format!(
                        "local {:?} has no field {field:?}",
                        place.root
                    ))),
                }
            }
        }
    }

    /// Like `resolve`, but only state fields and locals can be assigned.
    pub fn resolve_target(&self, place: &Place) -> Result<Binding<'a>, CompilerError> {
        match self.resolve(place)? {
            b @ (Binding::StateField(_) | Binding::Local) => Ok(b),
            Binding::PayloadField(..) | Binding::PayloadSlice(_) => Err(typing(format!(
                "cannot assign to {place}: message payloads are read-only"
            ))),
        }
    }

    pub fn check_body(&mut self, body: &[Stmt]) -> Result<(), CompilerError> {
        for s in body {
            match s {
                Stmt::Let { name, value } => {
                    self.check_operand(value)?;
                    self.declare(name)?;
                }
                Stmt::Set { target, value } => {
                    self.resolve_target(target)?;
                    self.check_operand(value)?;
                }
                Stmt::If {
                    cond,
                    then_body,
                    else_body,
                } => {
                    self.check_operand(cond)?;
                    for branch in [then_body, else_body] {
                        self.push_frame();
                        let res = self.check_body(branch);
                        self.pop_frame();
                        res?;
                    }
                }
                Stmt::Throw { .. } | Stmt::Return => {}
            }
        }
        Ok(())
    }

    pub fn check_operand(&self, op: &Operand) -> Result<(), CompilerError> {
        match op {
            Operand::Int(_) | Operand::Bool(_) => Ok(()),
            Operand::Place(p) => match self.resolve(p)? {
                Binding::PayloadSlice(b) => Err(typing(format!(
                    "slice binding {b:?} can only be measured with [\"bits\", {b:?}]"
                ))),
                _ => Ok(()),
            },
            Operand::Bits(p) => match self.resolve(p)? {
                Binding::PayloadSlice(_) => Ok(()),
                _ => Err(typing(format!("{p} is not a slice"))),
            },
            Operand::Unary(_, x) => self.check_operand(x),
            Operand::Binary(_, a, b) => {
                self.check_operand(a)?;
                self.check_operand(b)
            }
        }
    }
}

fn typing(message: String) -> CompilerError {
    CompilerError::new(CompileErrorKind::Typing, message)
}
