//! FunC rendering of router plans and lowered receivers.

use crate::compile::CompilerError;
use crate::language::protocol::{BOUNCE_MARKER_BITS, OPCODE_BITS};
use crate::layout;
use crate::ops;
use crate::program::{Direction, Selector};
use crate::receiver::{Binding, BodyScope, LoweredReceiver, Payload};
use crate::router::{HandlerRef, OpcodeArm, RouterPlan};
use crate::stmt::{Operand, Stmt, UnOp};
use crate::writer::FuncWriter;

/// Renders receiver statement sequences.
///
/// The router and the receiver frame (parameters, state unpacking, implicit tail) are written
/// by this module; only the statements themselves go through the lowering.
pub trait StatementLowering {
    fn write_body(&mut self, w: &mut FuncWriter, recv: &LoweredReceiver)
        -> Result<(), CompilerError>;
}

/// Default statement lowering into FunC.
#[derive(Debug, Default, Clone, Copy)]
pub struct FuncStatements;

impl StatementLowering for FuncStatements {
    fn write_body(
        &mut self,
        w: &mut FuncWriter,
        recv: &LoweredReceiver,
    ) -> Result<(), CompilerError> {
        let mut scope = BodyScope::new(&recv.state_fields, &recv.payload);
        write_stmts(w, &mut scope, recv, &recv.body)
    }
}

fn write_stmts(
    w: &mut FuncWriter,
    scope: &mut BodyScope<'_>,
    recv: &LoweredReceiver,
    body: &[Stmt],
) -> Result<(), CompilerError> {
    for s in body {
        match s {
            Stmt::Let { name, value } => {
                let value = render_operand(scope, value)?;
                scope.declare(name)?;
                w.line(&format!("var {} = {value};", ops::func_id_of(name)));
            }
            Stmt::Set { target, value } => {
                let target = match scope.resolve_target(target)? {
                    Binding::StateField(f) => ops::field_id_of("self", &f.name),
                    _ => ops::func_id_of(&target.root),
                };
                let value = render_operand(scope, value)?;
                w.line(&format!("{target} = {value};"));
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let header = format!("if {}", parenthesized(render_operand(scope, cond)?));
                w.block(&header, |w| {
                    scope.push_frame();
                    let res = write_stmts(w, scope, recv, then_body);
                    scope.pop_frame();
                    res?;
                    if !else_body.is_empty() {
                        w.else_branch();
                        scope.push_frame();
                        let res = write_stmts(w, scope, recv, else_body);
                        scope.pop_frame();
                        res?;
                    }
                    Ok(())
                })?;
            }
            Stmt::Throw { code } => w.line(&format!("throw({code});")),
            Stmt::Return => w.line(&state_return(recv)),
        }
    }
    Ok(())
}

fn parenthesized(rendered: String) -> String {
    if rendered.starts_with('(') && rendered.ends_with(')') {
        rendered
    } else {
        format!("({rendered})")
    }
}

fn render_operand(scope: &BodyScope<'_>, op: &Operand) -> Result<String, CompilerError> {
    Ok(match op {
        Operand::Int(i) => i.to_string(),
        Operand::Bool(b) => b.to_string(),
        Operand::Place(p) => match scope.resolve(p)? {
            Binding::StateField(f) => ops::field_id_of("self", &f.name),
            Binding::PayloadField(binding, f) => ops::field_id_of(binding, &f.name),
            Binding::PayloadSlice(binding) => ops::func_id_of(binding),
            Binding::Local => ops::func_id_of(&p.root),
        },
        Operand::Bits(p) => {
            scope.resolve(p)?;
            format!("slice_bits({})", ops::func_id_of(&p.root))
        }
        Operand::Unary(UnOp::Neg, x) => format!("(- {})", render_operand(scope, x)?),
        Operand::Unary(UnOp::Not, x) => format!("(~ {})", render_operand(scope, x)?),
        Operand::Binary(op, a, b) => format!(
            "({} {} {})",
            render_operand(scope, a)?,
            op.func_op(),
            render_operand(scope, b)?
        ),
    })
}

fn state_return(recv: &LoweredReceiver) -> String {
    format!(
        "return ({}, ());",
        layout::func_type_unpack(&recv.state_fields, "self")
    )
}

fn receiver_comment(selector: &Selector) -> String {
    match selector {
        Selector::Binary { message, .. } => format!(";; Receive {message} message"),
        Selector::Empty { .. } => ";; Receive empty message".to_string(),
        Selector::Comment { text, .. } => format!(";; Receive {text:?} message"),
        Selector::CommentFallback { .. } => ";; Receive any text message".to_string(),
        Selector::Fallback { .. } => ";; Receive any message".to_string(),
        Selector::BounceBinary { message, .. } => format!(";; Bounced handler for {message} message"),
        Selector::BounceFallback { .. } => ";; Bounced handler for any message".to_string(),
    }
}

pub fn write_receiver(
    w: &mut FuncWriter,
    recv: &LoweredReceiver,
    lowering: &mut dyn StatementLowering,
    emit_comments: bool,
) -> Result<(), CompilerError> {
    let state_ty = layout::func_type(&recv.state_fields);
    let mut params = vec![format!("{state_ty} {}", ops::func_id_of("self"))];
    match &recv.payload {
        Payload::None => {}
        Payload::Struct {
            binding, fields, ..
        } => params.push(format!(
            "{} {}",
            layout::func_type(fields),
            ops::func_id_of(binding)
        )),
        Payload::Slice { binding } => params.push(format!("slice {}", ops::func_id_of(binding))),
    }

    if emit_comments {
        w.line(&receiver_comment(&recv.selector));
    }
    let header = format!(
        "({state_ty}, ()) {}({}) impure inline",
        recv.function,
        params.join(", ")
    );
    w.block(&header, |w| {
        if !recv.state_fields.is_empty() {
            w.line(&format!(
                "var {} = {};",
                layout::func_type_unpack(&recv.state_fields, "self"),
                ops::func_id_of("self")
            ));
        }
        if let Payload::Struct {
            binding, fields, ..
        } = &recv.payload
        {
            if !fields.is_empty() {
                w.line(&format!(
                    "var {} = {};",
                    layout::func_type_unpack(fields, binding),
                    ops::func_id_of(binding)
                ));
            }
        }
        lowering.write_body(w, recv)?;
        if recv.implicit_return {
            w.line(&state_return(recv));
        }
        Ok(())
    })
}

fn call_handler(w: &mut FuncWriter, handler: &HandlerRef, arg: &str) {
    w.line(&format!("self~{}({arg});", handler.function));
    w.line("return (self, true);");
}

fn parse_op(w: &mut FuncWriter, emit_comments: bool) {
    if emit_comments {
        w.line(";; Parse op");
    }
    w.line("int op = 0;");
    w.scope(&format!("if (slice_bits(in_msg) >= {OPCODE_BITS})"), |w| {
        w.line(&format!("op = in_msg.preload_uint({OPCODE_BITS});"));
    });
}

pub fn write_router(w: &mut FuncWriter, plan: &RouterPlan, emit_comments: bool) {
    let state_ty = &plan.state_type;
    let params = match plan.direction {
        Direction::Internal => format!("{state_ty} self, slice in_msg, int msg_bounced"),
        Direction::External => format!("{state_ty} self, slice in_msg"),
    };
    let header = format!(
        "({state_ty}, int) {}({params}) impure inline_ref",
        plan.function
    );
    w.scope(&header, |w| {
        if let Some(bounced) = &plan.bounced {
            if emit_comments {
                w.line(";; Handle bounced messages");
            }
            w.scope("if (msg_bounced)", |w| {
                if bounced.skip_marker {
                    if emit_comments {
                        w.line(";; Skip 0xFFFFFFFF");
                    }
                    w.line(&format!("in_msg~skip_bits({BOUNCE_MARKER_BITS});"));
                }
                if !bounced.arms.is_empty() {
                    parse_op(w, emit_comments);
                }
                for arm in &bounced.arms {
                    if emit_comments {
                        w.line(&format!(";; Bounced message {}", arm.message));
                    }
                    w.scope(&format!("if (op == {})", arm.opcode), |w| {
                        w.line(&format!("var msg = in_msg~{}();", arm.reader));
                        call_handler(w, &arm.handler, "msg");
                    });
                }
                match &bounced.fallback {
                    Some(handler) => {
                        if emit_comments {
                            w.line(";; Fallback bounce receiver");
                        }
                        call_handler(w, handler, "in_msg");
                    }
                    None => w.line("return (self, true);"),
                }
            });
            w.blank();
        }

        parse_op(w, emit_comments);

        for arm in &plan.opcode_arms {
            w.blank();
            match arm {
                OpcodeArm::Binary {
                    message,
                    opcode,
                    reader,
                    handler,
                    ..
                } => {
                    if emit_comments {
                        w.line(&format!(";; Receive {message} message"));
                    }
                    w.scope(&format!("if (op == {opcode})"), |w| {
                        w.line(&format!("var msg = in_msg~{reader}();"));
                        call_handler(w, handler, "msg");
                    });
                }
                OpcodeArm::Empty { handler } => {
                    if emit_comments {
                        w.line(";; Receive empty message");
                    }
                    w.scope(
                        &format!("if ((op == 0) & (slice_bits(in_msg) <= {OPCODE_BITS}))"),
                        |w| call_handler(w, handler, ""),
                    );
                }
            }
        }

        if let Some(text) = &plan.text {
            w.blank();
            if emit_comments {
                w.line(";; Text Receivers");
            }
            w.scope("if (op == 0)", |w| {
                if !text.comments.is_empty() {
                    w.line("var text_op = slice_hash(in_msg);");
                }
                for arm in &text.comments {
                    if emit_comments {
                        w.line(&format!(";; Receive {:?} message", arm.text));
                    }
                    w.scope(&format!("if (text_op == 0x{})", arm.hash), |w| {
                        call_handler(w, &arm.handler, "");
                    });
                }
                if let Some(handler) = &text.fallback {
                    if emit_comments {
                        w.line(";; Receive any text message");
                    }
                    w.scope(&format!("if (slice_bits(in_msg) >= {OPCODE_BITS})"), |w| {
                        call_handler(w, handler, &format!("in_msg.skip_bits({OPCODE_BITS})"));
                    });
                }
            });
        }

        w.blank();
        match &plan.fallback {
            Some(handler) => {
                if emit_comments {
                    w.line(";; Receiver fallback");
                }
                call_handler(w, handler, "in_msg");
            }
            None => w.line("return (self, false);"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::FieldDef;
    use crate::stmt::{BinOp, Place};
    use crate::types::FieldTy;

    fn lowered(body: Vec<Stmt>, implicit_return: bool) -> LoweredReceiver {
        LoweredReceiver {
            contract: "Counter".to_string(),
            index: 0,
            selector: Selector::Fallback {
                direction: Direction::Internal,
                binding: "body".to_string(),
            },
            function: "$Counter$_internal_any".to_string(),
            state_fields: vec![FieldDef {
                name: "seen".to_string(),
                ty: FieldTy::Uint(32),
            }],
            payload: Payload::Slice {
                binding: "body".to_string(),
            },
            body,
            implicit_return,
        }
    }

    #[test]
    fn receiver_frame_unpacks_state_and_appends_tail() {
        let recv = lowered(
            vec![Stmt::Set {
                target: Place::parse("self.seen").expect("place"),
                value: Operand::Binary(
                    BinOp::Add,
                    Box::new(Operand::Place(Place::parse("self.seen").expect("place"))),
                    Box::new(Operand::Bits(Place::parse("body").expect("place"))),
                ),
            }],
            true,
        );
        let mut w = FuncWriter::new();
        write_receiver(&mut w, &recv, &mut FuncStatements, false).expect("emit");
        assert_eq!(
            w.finish(),
            "((int), ()) $Counter$_internal_any((int) $self, slice $body) impure inline {\n\
             \x20   var ($self'seen) = $self;\n\
             \x20   $self'seen = ($self'seen + slice_bits($body));\n\
             \x20   return (($self'seen), ());\n\
             }\n"
        );
    }

    #[test]
    fn explicit_return_is_not_duplicated() {
        let recv = lowered(
            vec![
                Stmt::If {
                    cond: Operand::Bool(true),
                    then_body: vec![Stmt::Throw { code: 100 }],
                    else_body: vec![Stmt::Return],
                },
                Stmt::Return,
            ],
            false,
        );
        let mut w = FuncWriter::new();
        write_receiver(&mut w, &recv, &mut FuncStatements, false).expect("emit");
        let out = w.finish();
        assert_eq!(out.matches("return (($self'seen), ());").count(), 2, "{out}");
        assert!(out.contains("    if (true) {\n        throw(100);\n    } else {\n"), "{out}");
    }
}
