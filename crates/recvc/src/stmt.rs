//! Receiver statements and expressions, parsed from s-expressions.
//!
//! Name resolution is not done here; see `receiver::BodyScope`.

use std::fmt;

use crate::ast::Expr;
use crate::language::limits::MAX_BODY_DEPTH;
use crate::validate;

/// `self.counter`, `msg.amount`, `msg` or a local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub root: String,
    pub field: Option<String>,
}

impl Place {
    pub fn parse(src: &str) -> Result<Self, String> {
        let (root, field) = match src.split_once('.') {
            Some((root, field)) => (root, Some(field)),
            None => (src, None),
        };
        validate::validate_local_name(root)?;
        if let Some(field) = field {
            validate::validate_local_name(field)?;
        }
        Ok(Self {
            root: root.to_string(),
            field: field.map(str::to_string),
        })
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{field}", self.root),
            None => write!(f, "{}", self.root),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    fn parse(head: &str) -> Option<Self> {
        Some(match head {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "&&" => BinOp::And,
            "||" => BinOp::Or,
            _ => return None,
        })
    }

    pub fn func_op(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&",
            BinOp::Or => "|",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Int(i64),
    Bool(bool),
    Place(Place),
    /// Remaining bit length of a slice binding.
    Bits(Place),
    Unary(UnOp, Box<Operand>),
    Binary(BinOp, Box<Operand>, Box<Operand>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Let {
        name: String,
        value: Operand,
    },
    Set {
        target: Place,
        value: Operand,
    },
    If {
        cond: Operand,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    Throw {
        code: u16,
    },
    Return,
}

impl Stmt {
    pub fn is_return(&self) -> bool {
        matches!(self, Stmt::Return)
    }
}

/// True when control cannot fall off the end of `body`.
pub fn ends_in_return(body: &[Stmt]) -> bool {
    body.last().is_some_and(Stmt::is_return)
}

pub fn parse_body(items: &[Expr]) -> Result<Vec<Stmt>, String> {
    parse_block(items, 0)
}

fn parse_block(items: &[Expr], depth: usize) -> Result<Vec<Stmt>, String> {
    if depth > MAX_BODY_DEPTH {
        return Err(format!("statement nesting exceeds {MAX_BODY_DEPTH}"));
    }
    items.iter().map(|e| parse_stmt(e, depth)).collect()
}

fn parse_stmt(e: &Expr, depth: usize) -> Result<Stmt, String> {
    let Expr::List(items) = e else {
        return Err(format!("statement must be a list: {e:?}"));
    };
    let head = e
        .head()
        .ok_or_else(|| format!("statement must start with an identifier: {e:?}"))?;
    match (head, items.len()) {
        ("let", 3) => {
            let name = items[1]
                .as_ident()
                .ok_or_else(|| format!("let name must be an identifier: {:?}", items[1]))?;
            validate::validate_local_name(name)?;
            Ok(Stmt::Let {
                name: name.to_string(),
                value: parse_operand(&items[2], depth + 1)?,
            })
        }
        ("set", 3) => {
            let target = items[1]
                .as_ident()
                .ok_or_else(|| format!("set target must be a place: {:?}", items[1]))?;
            Ok(Stmt::Set {
                target: Place::parse(target)?,
                value: parse_operand(&items[2], depth + 1)?,
            })
        }
        ("if", 3 | 4) => {
            let cond = parse_operand(&items[1], depth + 1)?;
            let then_body = parse_nested(&items[2], depth + 1)?;
            let else_body = match items.get(3) {
                Some(e) => parse_nested(e, depth + 1)?,
                None => Vec::new(),
            };
            Ok(Stmt::If {
                cond,
                then_body,
                else_body,
            })
        }
        ("throw", 2) => {
            let Expr::Int(code) = items[1] else {
                return Err(format!("throw code must be an integer: {:?}", items[1]));
            };
            let code = u16::try_from(code).map_err(|_| format!("throw code out of range: {code}"))?;
            Ok(Stmt::Throw { code })
        }
        ("return", 1) => Ok(Stmt::Return),
        (head, n) => Err(format!("unknown statement form {head:?} with {n} items")),
    }
}

fn parse_nested(e: &Expr, depth: usize) -> Result<Vec<Stmt>, String> {
    match e {
        Expr::List(items) if e.head().is_none() => parse_block(items, depth),
        _ => Err(format!("branch body must be a list of statements: {e:?}")),
    }
}

pub fn parse_operand(e: &Expr, depth: usize) -> Result<Operand, String> {
    if depth > MAX_BODY_DEPTH {
        return Err(format!("expression nesting exceeds {MAX_BODY_DEPTH}"));
    }
    match e {
        Expr::Int(i) => Ok(Operand::Int(*i)),
        Expr::Ident(s) => match s.as_str() {
            "true" => Ok(Operand::Bool(true)),
            "false" => Ok(Operand::Bool(false)),
            _ => Ok(Operand::Place(Place::parse(s)?)),
        },
        Expr::List(items) => {
            let head = e
                .head()
                .ok_or_else(|| format!("expression must start with an operator: {e:?}"))?;
            match (head, &items[1..]) {
                ("bits", [Expr::Ident(s)]) => Ok(Operand::Bits(Place::parse(s)?)),
                ("-", [x]) => Ok(Operand::Unary(
                    UnOp::Neg,
                    Box::new(parse_operand(x, depth + 1)?),
                )),
                ("!", [x]) => Ok(Operand::Unary(
                    UnOp::Not,
                    Box::new(parse_operand(x, depth + 1)?),
                )),
                (op, [a, b]) => {
                    let op = BinOp::parse(op).ok_or_else(|| format!("unknown operator {op:?}"))?;
                    Ok(Operand::Binary(
                        op,
                        Box::new(parse_operand(a, depth + 1)?),
                        Box::new(parse_operand(b, depth + 1)?),
                    ))
                }
                (op, args) => Err(format!(
                    "unknown expression form {op:?} with {} operands",
                    args.len()
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr_from_json;
    use serde_json::json;

    fn body(v: serde_json::Value) -> Result<Vec<Stmt>, String> {
        let Expr::List(items) = expr_from_json(&v).expect("expr") else {
            panic!("body must be a list");
        };
        parse_body(&items)
    }

    #[test]
    fn parses_assignment_with_arithmetic() {
        let stmts = body(json!([["set", "self.counter", ["+", "self.counter", "msg.amount"]]]))
            .expect("parse");
        assert_eq!(
            stmts,
            vec![Stmt::Set {
                target: Place::parse("self.counter").expect("place"),
                value: Operand::Binary(
                    BinOp::Add,
                    Box::new(Operand::Place(Place::parse("self.counter").expect("place"))),
                    Box::new(Operand::Place(Place::parse("msg.amount").expect("place"))),
                ),
            }]
        );
    }

    #[test]
    fn parses_branches_and_trailing_return() {
        let stmts = body(json!([
            ["if", ["==", "self.counter", 0], [["throw", 132]], [["let", "x", 1]]],
            ["return"]
        ]))
        .expect("parse");
        assert_eq!(stmts.len(), 2);
        assert!(ends_in_return(&stmts));
        let Stmt::If {
            then_body,
            else_body,
            ..
        } = &stmts[0]
        else {
            panic!("expected if: {:?}", stmts[0]);
        };
        assert_eq!(then_body, &vec![Stmt::Throw { code: 132 }]);
        assert_eq!(else_body.len(), 1);
    }

    #[test]
    fn rejects_unknown_forms() {
        assert!(body(json!([["loop", 1]])).is_err());
        assert!(body(json!([["set", "self.a.b", 1]])).is_err());
        assert!(body(json!([["throw", 70000]])).is_err());
        assert!(body(json!([["set", "x", ["%", 1, 2]]])).is_err());
    }
}
