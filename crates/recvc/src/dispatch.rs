//! Dispatch simulator.
//!
//! Executes router plans and lowered receiver bodies against a concrete state and message
//! cell, following the same branch order as the generated FunC. Integers are limited to
//! `i128`; anything wider exits with an integer overflow.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::cell::{exit_codes, Cell, Slice, VmExit};
use crate::compile::CompilerError;
use crate::language::protocol::{BOUNCE_MARKER_BITS, OPCODE_BITS};
use crate::layout::{self, Allocation, TypeRegistry};
use crate::program::{ContractType, Direction, FieldDef, Selector};
use crate::receiver::{self, LoweredReceiver};
use crate::router::{self, HandlerRef, OpcodeArm, RouterPlan};
use crate::stmt::{BinOp, Operand, Place, Stmt, UnOp};
use crate::value::{ContractState, Record, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub state: ContractState,
    pub handled: bool,
    /// Declaration index of the receiver that ran, if any.
    pub receiver: Option<usize>,
}

impl Outcome {
    fn unhandled(state: ContractState) -> Self {
        Self {
            state,
            handled: false,
            receiver: None,
        }
    }

    fn swallowed(state: ContractState) -> Self {
        Self {
            state,
            handled: true,
            receiver: None,
        }
    }
}

#[derive(Debug)]
pub struct Dispatcher<'a> {
    contract: &'a ContractType,
    plans: Vec<RouterPlan>,
    receivers: Vec<LoweredReceiver>,
    allocations: Vec<Option<Allocation<'a>>>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(contract: &'a ContractType, registry: &'a TypeRegistry) -> Result<Self, CompilerError> {
        let mut plans = Vec::new();
        for direction in Direction::ALL {
            if direction == Direction::Internal || contract.has_receivers_for(direction) {
                plans.push(router::build_router(contract, direction, registry)?);
            }
        }
        let mut receivers = Vec::with_capacity(contract.receivers.len());
        let mut allocations = Vec::with_capacity(contract.receivers.len());
        for (index, recv) in contract.receivers.iter().enumerate() {
            receivers.push(
                receiver::lower_receiver(contract, index, registry)
                    .map_err(|e| e.at_receiver(&contract.name, index))?,
            );
            allocations.push(match &recv.selector {
                Selector::Binary { message, .. } | Selector::BounceBinary { message, .. } => {
                    Some(registry.allocation(message)?)
                }
                _ => None,
            });
        }
        Ok(Self {
            contract,
            plans,
            receivers,
            allocations,
        })
    }

    pub fn plan(&self, direction: Direction) -> Option<&RouterPlan> {
        self.plans.iter().find(|p| p.direction == direction)
    }

    /// Runs the router for `direction`. `bounced` is ignored by external routers.
    pub fn dispatch(
        &self,
        direction: Direction,
        state: ContractState,
        body: Cell,
        bounced: bool,
    ) -> Result<Outcome, VmExit> {
        let Some(plan) = self.plan(direction) else {
            return Ok(Outcome::unhandled(state));
        };
        debug!(
            contract = %self.contract.name,
            direction = direction.as_str(),
            bits = body.bit_len(),
            bounced,
            "dispatching message"
        );
        let mut in_msg = Slice::new(Arc::new(body));

        if let (Some(stage), true) = (&plan.bounced, bounced) {
            if stage.skip_marker {
                in_msg.skip_bits(BOUNCE_MARKER_BITS)?;
            }
            if !stage.arms.is_empty() {
                let op = parse_op(&in_msg)?;
                for arm in &stage.arms {
                    if op == u128::from(arm.header) {
                        let alloc = self.allocation(&arm.handler)?;
                        let msg = layout::decode_message(&mut in_msg, alloc, arm.partial)?;
                        return self.call(&arm.handler, state, Arg::Struct(msg));
                    }
                }
            }
            return match &stage.fallback {
                Some(handler) => self.call(handler, state, Arg::Slice(in_msg)),
                None => Ok(Outcome::swallowed(state)),
            };
        }

        let op = parse_op(&in_msg)?;
        for arm in &plan.opcode_arms {
            match arm {
                OpcodeArm::Binary {
                    header, handler, ..
                } if op == u128::from(*header) => {
                    let alloc = self.allocation(handler)?;
                    let msg = layout::decode_message(&mut in_msg, alloc, false)?;
                    return self.call(handler, state, Arg::Struct(msg));
                }
                OpcodeArm::Empty { handler }
                    if op == 0 && in_msg.remaining_bits() <= OPCODE_BITS =>
                {
                    return self.call(handler, state, Arg::None);
                }
                _ => {}
            }
        }

        if let (Some(text), 0) = (&plan.text, op) {
            if !text.comments.is_empty() {
                let text_op = in_msg.hash_hex();
                if let Some(arm) = text.comments.iter().find(|c| c.hash == text_op) {
                    return self.call(&arm.handler, state, Arg::None);
                }
            }
            if let Some(handler) = &text.fallback {
                if in_msg.remaining_bits() >= OPCODE_BITS {
                    in_msg.skip_bits(OPCODE_BITS)?;
                    return self.call(handler, state, Arg::Slice(in_msg));
                }
            }
        }

        match &plan.fallback {
            Some(handler) => self.call(handler, state, Arg::Slice(in_msg)),
            None => Ok(Outcome::unhandled(state)),
        }
    }

    fn allocation(&self, handler: &HandlerRef) -> Result<&Allocation<'a>, VmExit> {
        self.allocations
            .get(handler.receiver)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                VmExit::new(
                    exit_codes::INVALID_PREFIX,
                    format!("no message layout for receiver #{}", handler.receiver),
                )
            })
    }

    fn call(&self, handler: &HandlerRef, state: ContractState, arg: Arg) -> Result<Outcome, VmExit> {
        let Some(recv) = self.receivers.get(handler.receiver) else {
            return Err(VmExit::new(
                exit_codes::TYPE_CHECK,
                format!("unknown handler {}", handler.function),
            ));
        };
        trace!(function = %recv.function, "calling receiver");
        let mut frame = Frame {
            recv,
            state,
            payload: arg,
            locals: vec![Vec::new()],
        };
        frame.exec(&recv.body)?;
        Ok(Outcome {
            state: frame.state,
            handled: true,
            receiver: Some(handler.receiver),
        })
    }
}

fn parse_op(in_msg: &Slice) -> Result<u128, VmExit> {
    if in_msg.remaining_bits() >= OPCODE_BITS {
        in_msg.preload_uint(OPCODE_BITS)
    } else {
        Ok(0)
    }
}

#[derive(Debug)]
enum Arg {
    None,
    Struct(Record),
    Slice(Slice),
}

enum Flow {
    Next,
    Return,
}

struct Frame<'r> {
    recv: &'r LoweredReceiver,
    state: ContractState,
    payload: Arg,
    locals: Vec<Vec<(String, Value)>>,
}

impl Frame<'_> {
    fn exec(&mut self, body: &[Stmt]) -> Result<Flow, VmExit> {
        for s in body {
            match s {
                Stmt::Let { name, value } => {
                    let v = self.eval(value)?;
                    if let Some(scope) = self.locals.last_mut() {
                        scope.push((name.clone(), v));
                    }
                }
                Stmt::Set { target, value } => {
                    let v = self.eval(value)?;
                    self.assign(target, v)?;
                }
                Stmt::If {
                    cond,
                    then_body,
                    else_body,
                } => {
                    let branch = if truthy(&self.eval(cond)?)? {
                        then_body
                    } else {
                        else_body
                    };
                    self.locals.push(Vec::new());
                    let flow = self.exec(branch);
                    self.locals.pop();
                    if let Flow::Return = flow? {
                        return Ok(Flow::Return);
                    }
                }
                Stmt::Throw { code } => {
                    return Err(VmExit::new(i32::from(*code), format!("throw({code})")));
                }
                Stmt::Return => return Ok(Flow::Return),
            }
        }
        Ok(Flow::Next)
    }

    fn assign(&mut self, target: &Place, v: Value) -> Result<(), VmExit> {
        if target.root == "self" {
            let field = target.field.as_deref().unwrap_or_default();
            let def = state_field(&self.recv.state_fields, field)?;
            if def.ty.is_bool() != matches!(v, Value::Bool(_)) {
                return Err(type_check(format!(
                    "cannot store a {} in state field {field:?} of type {}",
                    v.type_name(),
                    def.ty.name()
                )));
            }
            self.state.set(field, v);
            return Ok(());
        }
        for scope in self.locals.iter_mut().rev() {
            if let Some((_, slot)) = scope.iter_mut().rev().find(|(n, _)| *n == target.root) {
                *slot = v;
                return Ok(());
            }
        }
        Err(type_check(format!("cannot assign to {target}")))
    }

    fn lookup(&self, place: &Place) -> Result<Value, VmExit> {
        let field = place.field.as_deref();
        if place.root == "self" {
            return field
                .and_then(|f| self.state.get(f))
                .cloned()
                .ok_or_else(|| type_check(format!("no state field {place}")));
        }
        if self.recv.payload.binding() == Some(place.root.as_str()) {
            return match (&self.payload, field) {
                (Arg::Struct(msg), Some(f)) => msg
                    .get(f)
                    .cloned()
                    .ok_or_else(|| type_check(format!("no message field {place}"))),
                (Arg::Slice(s), None) => Ok(Value::Slice(s.clone())),
                _ => Err(type_check(format!("cannot read {place}"))),
            };
        }
        if field.is_none() {
            for scope in self.locals.iter().rev() {
                if let Some((_, v)) = scope.iter().rev().find(|(n, _)| *n == place.root) {
                    return Ok(v.clone());
                }
            }
        }
        Err(type_check(format!("unknown name {place}")))
    }

    fn eval(&self, op: &Operand) -> Result<Value, VmExit> {
        match op {
            Operand::Int(i) => Ok(Value::Int(i128::from(*i))),
            Operand::Bool(b) => Ok(Value::Bool(*b)),
            Operand::Place(p) => self.lookup(p),
            Operand::Bits(p) => match self.lookup(p)? {
                Value::Slice(s) => Ok(Value::Int(s.remaining_bits() as i128)),
                other => Err(type_check(format!("{p} is a {}", other.type_name()))),
            },
            Operand::Unary(UnOp::Neg, x) => {
                let v = int(self.eval(x)?)?;
                v.checked_neg().map(Value::Int).ok_or_else(overflow)
            }
            Operand::Unary(UnOp::Not, x) => match self.eval(x)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                Value::Int(i) => Ok(Value::Int(!i)),
                other => Err(type_check(format!("cannot negate a {}", other.type_name()))),
            },
            Operand::Binary(op, a, b) => binary(*op, self.eval(a)?, self.eval(b)?),
        }
    }
}

fn binary(op: BinOp, a: Value, b: Value) -> Result<Value, VmExit> {
    match (op, a, b) {
        (BinOp::Eq, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a == b)),
        (BinOp::Ne, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a != b)),
        (BinOp::And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a && b)),
        (BinOp::Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
        (op, Value::Int(a), Value::Int(b)) => Ok(match op {
            BinOp::Add => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
            BinOp::Sub => Value::Int(a.checked_sub(b).ok_or_else(overflow)?),
            BinOp::Mul => Value::Int(a.checked_mul(b).ok_or_else(overflow)?),
            BinOp::Eq => Value::Bool(a == b),
            BinOp::Ne => Value::Bool(a != b),
            BinOp::Lt => Value::Bool(a < b),
            BinOp::Le => Value::Bool(a <= b),
            BinOp::Gt => Value::Bool(a > b),
            BinOp::Ge => Value::Bool(a >= b),
            BinOp::And => Value::Int(a & b),
            BinOp::Or => Value::Int(a | b),
        }),
        (op, a, b) => Err(type_check(format!(
            "operator {} does not apply to {} and {}",
            op.func_op(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn truthy(v: &Value) -> Result<bool, VmExit> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Int(i) => Ok(*i != 0),
        Value::Slice(_) => Err(type_check("a slice is not a condition".to_string())),
    }
}

fn int(v: Value) -> Result<i128, VmExit> {
    match v {
        Value::Int(i) => Ok(i),
        other => Err(type_check(format!("expected an int, got {}", other.type_name()))),
    }
}

fn state_field<'f>(fields: &'f [FieldDef], name: &str) -> Result<&'f FieldDef, VmExit> {
    fields
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| type_check(format!("no state field {name:?}")))
}

fn overflow() -> VmExit {
    VmExit::new(exit_codes::INTEGER_OVERFLOW, "integer overflow")
}

fn type_check(message: String) -> VmExit {
    VmExit::new(exit_codes::TYPE_CHECK, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ReceiverDescription;
    use crate::types::FieldTy;

    fn counter(body: Vec<Stmt>) -> ContractType {
        ContractType {
            name: "Counter".to_string(),
            fields: vec![FieldDef {
                name: "n".to_string(),
                ty: FieldTy::Int(64),
            }],
            receivers: vec![ReceiverDescription {
                selector: Selector::Fallback {
                    direction: Direction::Internal,
                    binding: "body".to_string(),
                },
                body,
                loc: None,
            }],
        }
    }

    fn state(n: i128) -> ContractState {
        Record::new().with("n", Value::Int(n))
    }

    #[test]
    fn arithmetic_overflow_exits_with_code_4() {
        let c = counter(vec![Stmt::Set {
            target: Place::parse("self.n").expect("place"),
            value: Operand::Binary(
                BinOp::Mul,
                Box::new(Operand::Place(Place::parse("self.n").expect("place"))),
                Box::new(Operand::Place(Place::parse("self.n").expect("place"))),
            ),
        }]);
        let reg = TypeRegistry::new();
        let d = Dispatcher::new(&c, &reg).expect("dispatcher");
        let err = d
            .dispatch(Direction::Internal, state(i128::MAX), Cell::empty(), false)
            .expect_err("overflow");
        assert_eq!(err.code, exit_codes::INTEGER_OVERFLOW);
    }

    #[test]
    fn throw_surfaces_its_code() {
        let c = counter(vec![Stmt::If {
            cond: Operand::Binary(
                BinOp::Lt,
                Box::new(Operand::Bits(Place::parse("body").expect("place"))),
                Box::new(Operand::Int(8)),
            ),
            then_body: vec![Stmt::Throw { code: 77 }],
            else_body: Vec::new(),
        }]);
        let reg = TypeRegistry::new();
        let d = Dispatcher::new(&c, &reg).expect("dispatcher");
        let err = d
            .dispatch(Direction::Internal, state(0), Cell::empty(), false)
            .expect_err("throw");
        assert_eq!(err.code, 77);
        let ok = d
            .dispatch(
                Direction::Internal,
                state(0),
                Cell::from_bytes(&[1]).expect("cell"),
                false,
            )
            .expect("dispatch");
        assert!(ok.handled);
        assert_eq!(ok.receiver, Some(0));
    }

    #[test]
    fn external_without_receivers_is_unhandled() {
        let c = counter(Vec::new());
        let reg = TypeRegistry::new();
        let d = Dispatcher::new(&c, &reg).expect("dispatcher");
        assert!(d.plan(Direction::External).is_none());
        let out = d
            .dispatch(Direction::External, state(3), Cell::empty(), false)
            .expect("dispatch");
        assert!(!out.handled);
        assert_eq!(out.state, state(3));
    }
}
