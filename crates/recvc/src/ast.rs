use serde_json::Value;

/// Untyped s-expression as it appears in receiver bodies of the unit document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Int(i64),
    Ident(String),
    List(Vec<Expr>),
}

impl Expr {
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn head(&self) -> Option<&str> {
        match self {
            Expr::List(items) => items.first().and_then(Expr::as_ident),
            _ => None,
        }
    }
}

pub fn expr_from_json(v: &Value) -> Result<Expr, String> {
    match v {
        Value::Number(n) => {
            let i = n
                .as_i64()
                .ok_or_else(|| format!("number is not an i64: {n}"))?;
            Ok(Expr::Int(i))
        }
        Value::String(s) => Ok(Expr::Ident(s.to_string())),
        Value::Bool(b) => Ok(Expr::Ident(b.to_string())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(expr_from_json(item)?);
            }
            Ok(Expr::List(out))
        }
        _ => Err(format!("unsupported JSON value in expr: {v:?}")),
    }
}
