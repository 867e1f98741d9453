//! Loader for `recvc.unit` JSON documents.
//!
//! A unit carries the resolved message types and the contract types with their already
//! classified receivers. Errors point at the offending value with a JSON pointer.

use std::collections::BTreeSet;

use recvc_contracts::RECVC_UNIT_SCHEMA_VERSIONS_SUPPORTED;
use serde_json::{Map, Value};

use crate::ast::{expr_from_json, Expr};
use crate::compile::{CompileErrorKind, CompilerError};
use crate::diagnostics::Span;
use crate::ident::NumLit;
use crate::layout::{MessageType, TypeRegistry};
use crate::program::{
    CompilationUnit, ContractType, Direction, FieldDef, ReceiverDescription, Selector,
};
use crate::router;
use crate::stmt;
use crate::types::FieldTy;
use crate::validate;

pub fn parse_unit_json(bytes: &[u8]) -> Result<CompilationUnit, CompilerError> {
    let doc: Value = serde_json::from_slice(bytes)
        .map_err(|e| CompilerError::new(CompileErrorKind::Parse, format!("unit: {e}")))?;
    parse_unit_value(&doc)
}

pub fn parse_unit_value(root: &Value) -> Result<CompilationUnit, CompilerError> {
    let root = as_object(root, "")?;
    let schema_version = get_required_string(root, "", "schema_version")?;
    if !RECVC_UNIT_SCHEMA_VERSIONS_SUPPORTED
        .iter()
        .any(|&v| v == schema_version)
    {
        return Err(parse_err(
            "/schema_version",
            format!(
                "unsupported schema_version: got {schema_version:?} (supported: {})",
                RECVC_UNIT_SCHEMA_VERSIONS_SUPPORTED.join(", ")
            ),
        ));
    }

    let mut registry = TypeRegistry::new();
    for (idx, v) in get_array(root, "", "messages")?.iter().enumerate() {
        let ptr = format!("/messages/{idx}");
        let ty = parse_message(v, &ptr)?;
        registry.insert(ty).map_err(|message| parse_err(&ptr, message))?;
    }

    let mut contracts = Vec::new();
    let mut names = BTreeSet::new();
    for (idx, v) in get_array(root, "", "contracts")?.iter().enumerate() {
        let ptr = format!("/contracts/{idx}");
        let contract = parse_contract(v, &ptr)?;
        if !names.insert(contract.name.clone()) {
            return Err(parse_err(
                &format!("{ptr}/name"),
                format!("duplicate contract {:?}", contract.name),
            ));
        }
        for direction in Direction::ALL {
            router::check_selectors(&contract, direction, &registry)?;
        }
        contracts.push(contract);
    }

    Ok(CompilationUnit {
        registry,
        contracts,
    })
}

fn parse_message(v: &Value, ptr: &str) -> Result<MessageType, CompilerError> {
    let obj = as_object(v, ptr)?;
    let name = get_required_string(obj, ptr, "name")?;
    validate::validate_type_name(&name).map_err(|m| parse_err(&format!("{ptr}/name"), m))?;
    let header = match obj.get("header") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            Some(NumLit::parse(s).map_err(|m| parse_err(&format!("{ptr}/header"), m))?)
        }
        Some(_) => {
            return Err(parse_err(
                &format!("{ptr}/header"),
                "header must be a string literal such as \"0x7362d09c\"".to_string(),
            ))
        }
    };
    let fields = parse_fields(obj, ptr)?;
    Ok(MessageType {
        name,
        header,
        fields,
    })
}

fn parse_fields(obj: &Map<String, Value>, ptr: &str) -> Result<Vec<FieldDef>, CompilerError> {
    let mut out: Vec<FieldDef> = Vec::new();
    for (idx, v) in get_array(obj, ptr, "fields")?.iter().enumerate() {
        let fptr = format!("{ptr}/fields/{idx}");
        let fobj = as_object(v, &fptr)?;
        let name = get_required_string(fobj, &fptr, "name")?;
        validate::validate_local_name(&name).map_err(|m| parse_err(&format!("{fptr}/name"), m))?;
        if out.iter().any(|f| f.name == name) {
            return Err(parse_err(
                &format!("{fptr}/name"),
                format!("duplicate field {name:?}"),
            ));
        }
        let ty_name = get_required_string(fobj, &fptr, "ty")?;
        let ty = FieldTy::parse_named(&ty_name).ok_or_else(|| {
            parse_err(
                &format!("{fptr}/ty"),
                format!("unknown field type {ty_name:?} (expected uint<N>, int<N>, bool or coins)"),
            )
        })?;
        out.push(FieldDef { name, ty });
    }
    Ok(out)
}

fn parse_contract(v: &Value, ptr: &str) -> Result<ContractType, CompilerError> {
    let obj = as_object(v, ptr)?;
    let name = get_required_string(obj, ptr, "name")?;
    validate::validate_type_name(&name).map_err(|m| parse_err(&format!("{ptr}/name"), m))?;
    let fields = parse_fields(obj, ptr)?;
    let mut receivers = Vec::new();
    for (idx, rv) in get_array(obj, ptr, "receivers")?.iter().enumerate() {
        let rptr = format!("{ptr}/receivers/{idx}");
        receivers.push(parse_receiver(rv, &rptr)?);
    }
    Ok(ContractType {
        name,
        fields,
        receivers,
    })
}

fn parse_receiver(v: &Value, ptr: &str) -> Result<ReceiverDescription, CompilerError> {
    let obj = as_object(v, ptr)?;
    let loc = match obj.get("loc") {
        None | Some(Value::Null) => None,
        Some(lv) => Some(
            serde_json::from_value::<Span>(lv.clone())
                .map_err(|e| parse_err(&format!("{ptr}/loc"), e.to_string()))?,
        ),
    };
    let sptr = format!("{ptr}/selector");
    let selector_v = obj
        .get("selector")
        .ok_or_else(|| parse_err(ptr, "missing required field: selector".to_string()))?;
    let selector = parse_selector(as_object(selector_v, &sptr)?, &sptr)?;

    let bptr = format!("{ptr}/body");
    let body_v = obj.get("body").cloned().unwrap_or(Value::Array(Vec::new()));
    let items = match expr_from_json(&body_v).map_err(|m| parse_err(&bptr, m))? {
        Expr::List(items) => items,
        _ => return Err(parse_err(&bptr, "body must be an array".to_string())),
    };
    let body = stmt::parse_body(&items).map_err(|m| parse_err(&bptr, m))?;
    Ok(ReceiverDescription {
        selector,
        body,
        loc,
    })
}

fn parse_selector(obj: &Map<String, Value>, ptr: &str) -> Result<Selector, CompilerError> {
    let kind = get_required_string(obj, ptr, "kind")?;
    let (direction, base) = match kind.split_once('-') {
        Some(("bounce", rest)) => (None, rest),
        Some((dir, rest)) => match Direction::parse(dir) {
            Some(d) => (Some(d), rest),
            None => return Err(invalid_kind(ptr, &kind)),
        },
        None => return Err(invalid_kind(ptr, &kind)),
    };
    let binding = || -> Result<String, CompilerError> {
        let b = get_required_string(obj, ptr, "binding")?;
        validate::validate_local_name(&b).map_err(|m| parse_err(&format!("{ptr}/binding"), m))?;
        if b == "self" {
            return Err(parse_err(
                &format!("{ptr}/binding"),
                "binding cannot be named \"self\"".to_string(),
            ));
        }
        Ok(b)
    };
    let message = || get_required_string(obj, ptr, "message");
    Ok(match (direction, base) {
        (Some(direction), "binary") => Selector::Binary {
            direction,
            message: message()?,
            binding: binding()?,
        },
        (Some(direction), "empty") => Selector::Empty { direction },
        (Some(direction), "comment") => Selector::Comment {
            direction,
            text: get_required_string(obj, ptr, "text")?,
        },
        (Some(direction), "comment-fallback") => Selector::CommentFallback {
            direction,
            binding: binding()?,
        },
        (Some(direction), "fallback") => Selector::Fallback {
            direction,
            binding: binding()?,
        },
        (None, "binary") => Selector::BounceBinary {
            message: message()?,
            binding: binding()?,
            partial: match obj.get("partial") {
                None => false,
                Some(Value::Bool(b)) => *b,
                Some(_) => {
                    return Err(parse_err(
                        &format!("{ptr}/partial"),
                        "partial must be a boolean".to_string(),
                    ))
                }
            },
        },
        (None, "fallback") => Selector::BounceFallback {
            binding: binding()?,
        },
        _ => return Err(invalid_kind(ptr, &kind)),
    })
}

fn invalid_kind(ptr: &str, kind: &str) -> CompilerError {
    CompilerError::new(
        CompileErrorKind::InvalidSelectorVariant,
        format!("unknown selector kind {kind:?} at {ptr}/kind"),
    )
}

fn parse_err(ptr: &str, message: String) -> CompilerError {
    let at = if ptr.is_empty() { "/" } else { ptr };
    CompilerError::new(CompileErrorKind::Parse, format!("{message} at {at}"))
}

fn as_object<'v>(v: &'v Value, ptr: &str) -> Result<&'v Map<String, Value>, CompilerError> {
    v.as_object()
        .ok_or_else(|| parse_err(ptr, "expected an object".to_string()))
}

fn get_required_string(
    obj: &Map<String, Value>,
    ptr: &str,
    key: &str,
) -> Result<String, CompilerError> {
    let v = obj
        .get(key)
        .ok_or_else(|| parse_err(ptr, format!("missing required field: {key}")))?;
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| parse_err(&format!("{ptr}/{key}"), format!("{key} must be a string")))
}

fn get_array<'v>(
    obj: &'v Map<String, Value>,
    ptr: &str,
    key: &str,
) -> Result<&'v [Value], CompilerError> {
    match obj.get(key) {
        None => Ok(&[][..]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(parse_err(
            &format!("{ptr}/{key}"),
            format!("{key} must be an array"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit(receivers: Value) -> Value {
        json!({
            "schema_version": "recvc.unit@0.1.0",
            "messages": [
                { "name": "Add", "header": "0b1", "fields": [{ "name": "by", "ty": "uint32" }] }
            ],
            "contracts": [
                { "name": "Counter", "fields": [{ "name": "n", "ty": "uint32" }], "receivers": receivers }
            ]
        })
    }

    #[test]
    fn parses_selectors_bodies_and_locations() {
        let doc = unit(json!([
            {
                "selector": { "kind": "internal-binary", "message": "Add", "binding": "msg" },
                "body": [["set", "self.n", ["+", "self.n", "msg.by"]]],
                "loc": { "start": { "line": 4, "col": 5 }, "file": "counter.tact" }
            },
            { "selector": { "kind": "bounce-binary", "message": "Add", "binding": "msg", "partial": true } },
            { "selector": { "kind": "external-comment", "text": "ping" } }
        ]));
        let unit = parse_unit_value(&doc).expect("unit");
        let c = unit.contract("Counter").expect("contract");
        assert_eq!(c.receivers.len(), 3);
        assert_eq!(c.receivers[0].body.len(), 1);
        assert_eq!(
            c.receivers[0].loc.as_ref().map(|l| l.to_string()),
            Some("counter.tact:4:5".to_string())
        );
        assert_eq!(c.receivers[1].selector.kind_name(), "bounce-binary");
        assert_eq!(c.receivers[2].selector.direction(), Direction::External);
        assert!(unit.registry.get("Add").is_some());
    }

    #[test]
    fn unknown_selector_kind_is_an_invalid_variant() {
        for kind in ["internal-bounce", "bounce-empty", "sideways-binary", "binary"] {
            let doc = unit(json!([{ "selector": { "kind": kind, "binding": "b" } }]));
            let err = parse_unit_value(&doc).expect_err(kind);
            assert_eq!(err.kind, CompileErrorKind::InvalidSelectorVariant, "{kind}");
        }
    }

    #[test]
    fn duplicate_fallbacks_fail_fast() {
        let doc = unit(json!([
            { "selector": { "kind": "bounce-fallback", "binding": "a" } },
            { "selector": { "kind": "bounce-fallback", "binding": "b" } }
        ]));
        let err = parse_unit_value(&doc).expect_err("dup");
        assert_eq!(err.kind, CompileErrorKind::InvalidSelectorVariant);
    }

    #[test]
    fn unknown_message_type_is_a_missing_allocation() {
        let doc = unit(json!([
            { "selector": { "kind": "internal-binary", "message": "Nope", "binding": "m" } }
        ]));
        let err = parse_unit_value(&doc).expect_err("missing");
        assert_eq!(err.kind, CompileErrorKind::MissingAllocation);
    }

    #[test]
    fn non_ascii_header_is_a_parse_error() {
        for header in ["0€", "€"] {
            let mut doc = unit(json!([]));
            doc["messages"][0]["header"] = json!(header);
            let err = parse_unit_value(&doc).expect_err(header);
            assert_eq!(err.kind, CompileErrorKind::Parse, "{header}");
            assert!(err.message.ends_with("at /messages/0/header"), "{}", err.message);
        }
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        let err = parse_unit_json(b"{").expect_err("json");
        assert_eq!(err.kind, CompileErrorKind::Parse);
        let err = parse_unit_value(&json!({ "schema_version": "recvc.unit@9" })).expect_err("ver");
        assert!(err.message.contains("unsupported schema_version"), "{}", err.message);
        let doc = unit(json!([
            { "selector": { "kind": "internal-empty" }, "body": [["loop"]] }
        ]));
        let err = parse_unit_value(&doc).expect_err("body");
        assert_eq!(err.kind, CompileErrorKind::Parse);
        assert!(err.message.contains("/contracts/0/receivers/0/body"), "{}", err.message);
    }
}
