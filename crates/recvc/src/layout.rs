//! Binary layouts of message types, as assigned by the type resolver.
//!
//! Besides naming the load functions and stack shapes used by generated code, the registry can
//! decode and encode payloads so routers can be exercised against real cells.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cell::{exit_codes, Cell, CellBuilder, Slice, VmExit};
use crate::compile::{CompileErrorKind, CompilerError};
use crate::ident::NumLit;
use crate::language::protocol::{BOUNCED_FIELD_BITS, OPCODE_BITS};
use crate::ops;
use crate::program::FieldDef;
use crate::types::FieldTy;
use crate::value::{Record, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageType {
    pub name: String,
    /// Plain structs have no header and cannot be received.
    pub header: Option<NumLit>,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, MessageType>,
}

/// A message type with a registered header opcode.
#[derive(Debug, Clone, Copy)]
pub struct Allocation<'a> {
    pub ty: &'a MessageType,
    pub header: NumLit,
}

impl<'a> Allocation<'a> {
    pub fn fields(&self, partial: bool) -> &'a [FieldDef] {
        if partial {
            partial_fields(&self.ty.fields)
        } else {
            &self.ty.fields
        }
    }

    pub fn reader(&self, partial: bool) -> String {
        if partial {
            ops::reader_bounced(&self.ty.name)
        } else {
            ops::reader(&self.ty.name)
        }
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ty: MessageType) -> Result<(), String> {
        if self.types.contains_key(&ty.name) {
            return Err(format!("duplicate message type {:?}", ty.name));
        }
        self.types.insert(ty.name.clone(), ty);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MessageType> {
        self.types.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageType> {
        self.types.values()
    }

    pub fn allocation(&self, name: &str) -> Result<Allocation<'_>, CompilerError> {
        let ty = self.types.get(name).ok_or_else(|| {
            CompilerError::new(
                CompileErrorKind::MissingAllocation,
                format!("Invalid allocation: {name} (no binary layout registered)"),
            )
        })?;
        let header = ty.header.ok_or_else(|| {
            CompilerError::new(
                CompileErrorKind::MissingAllocation,
                format!("Invalid allocation: {name} (no header opcode registered)"),
            )
        })?;
        Ok(Allocation { ty, header })
    }
}

/// Longest field prefix that is guaranteed to survive in a bounced body.
pub fn partial_fields(fields: &[FieldDef]) -> &[FieldDef] {
    let mut used = 0usize;
    let mut n = 0usize;
    for f in fields {
        used += f.ty.max_bits();
        if used > BOUNCED_FIELD_BITS {
            break;
        }
        n += 1;
    }
    &fields[..n]
}

/// Stack shape of a struct: the tensor of its fields.
pub fn func_type(fields: &[FieldDef]) -> String {
    let parts: Vec<&str> = fields.iter().map(|f| f.ty.func_ty()).collect();
    format!("({})", parts.join(", "))
}

/// Tensor of unpacked field names under `binding`.
pub fn func_type_unpack(fields: &[FieldDef], binding: &str) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|f| ops::field_id_of(binding, &f.name))
        .collect();
    format!("({})", parts.join(", "))
}

/// Mirrors the generated load function: opcode check, then the (possibly truncated) fields.
pub fn decode_message(
    slice: &mut Slice,
    alloc: &Allocation<'_>,
    partial: bool,
) -> Result<Record, VmExit> {
    let op = slice.load_uint(OPCODE_BITS)?;
    if op != u128::from(alloc.header.value) {
        return Err(VmExit::new(
            exit_codes::INVALID_PREFIX,
            format!(
                "{}: expected opcode {:#010x}, got {op:#010x}",
                alloc.ty.name, alloc.header.value
            ),
        ));
    }
    decode_fields(slice, alloc.fields(partial))
}

pub fn decode_fields(slice: &mut Slice, fields: &[FieldDef]) -> Result<Record, VmExit> {
    let mut out = Record::new();
    for f in fields {
        let value = match f.ty {
            FieldTy::Bool => Value::Bool(slice.load_bit()?),
            FieldTy::Int(bits) => Value::Int(slice.load_int(usize::from(bits))?),
            FieldTy::Uint(bits) => Value::Int(uint_to_int(slice.load_uint(usize::from(bits))?)?),
            FieldTy::Coins => {
                let len = slice.load_uint(4)? as usize;
                Value::Int(uint_to_int(slice.load_uint(len * 8)?)?)
            }
        };
        out.push(f.name.clone(), value);
    }
    Ok(out)
}

fn uint_to_int(v: u128) -> Result<i128, VmExit> {
    i128::try_from(v).map_err(|_| {
        VmExit::new(
            exit_codes::INTEGER_OVERFLOW,
            format!("unsigned value {v} exceeds the simulator integer range"),
        )
    })
}

/// Builds a full message body (header first) from named field values.
pub fn encode_message(ty: &MessageType, values: &Record) -> Result<Cell, VmExit> {
    let mut b = CellBuilder::new();
    if let Some(header) = ty.header {
        b.store_uint(u128::from(header.value), OPCODE_BITS)?;
    }
    for f in &ty.fields {
        let value = values.get(&f.name).ok_or_else(|| {
            VmExit::new(
                exit_codes::TYPE_CHECK,
                format!("{}: missing value for field {:?}", ty.name, f.name),
            )
        })?;
        encode_field(&mut b, f, value)?;
    }
    Ok(b.end_cell())
}

fn encode_field(b: &mut CellBuilder, f: &FieldDef, value: &Value) -> Result<(), VmExit> {
    match (f.ty, value) {
        (FieldTy::Bool, Value::Bool(v)) => {
            b.store_bit(*v)?;
        }
        (FieldTy::Int(bits), Value::Int(v)) => {
            b.store_int(*v, usize::from(bits))?;
        }
        (FieldTy::Uint(bits), Value::Int(v)) => {
            let v = non_negative(f, *v)?;
            b.store_uint(v, usize::from(bits))?;
        }
        (FieldTy::Coins, Value::Int(v)) => {
            let v = non_negative(f, *v)?;
            let len = (128 - v.leading_zeros() as usize).div_ceil(8);
            if len > 15 {
                return Err(VmExit::new(
                    exit_codes::RANGE_CHECK,
                    format!("field {:?}: coins value {v} exceeds 120 bits", f.name),
                ));
            }
            b.store_uint(len as u128, 4)?;
            b.store_uint(v, len * 8)?;
        }
        (ty, value) => {
            return Err(VmExit::new(
                exit_codes::TYPE_CHECK,
                format!(
                    "field {:?} of type {} cannot hold a {}",
                    f.name,
                    ty.name(),
                    value.type_name()
                ),
            ))
        }
    }
    Ok(())
}

fn non_negative(f: &FieldDef, v: i128) -> Result<u128, VmExit> {
    u128::try_from(v).map_err(|_| {
        VmExit::new(
            exit_codes::RANGE_CHECK,
            format!("field {:?}: negative value {v} for {}", f.name, f.ty.name()),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ident::NumBase;

    fn field(name: &str, ty: FieldTy) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            ty,
        }
    }

    fn transfer() -> MessageType {
        MessageType {
            name: "Transfer".to_string(),
            header: Some(NumLit {
                value: 0x0f8a7ea5,
                base: NumBase::Hex,
            }),
            fields: vec![
                field("query_id", FieldTy::Uint(64)),
                field("amount", FieldTy::Coins),
                field("forward", FieldTy::Bool),
                field("memo", FieldTy::Uint(256)),
            ],
        }
    }

    #[test]
    fn partial_layout_keeps_prefix_that_fits_224_bits() {
        let ty = transfer();
        let names: Vec<&str> = partial_fields(&ty.fields)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["query_id", "amount", "forward"]);
    }

    #[test]
    fn func_shapes_follow_field_order() {
        let ty = transfer();
        assert_eq!(func_type(&ty.fields), "(int, int, int, int)");
        assert_eq!(
            func_type_unpack(&ty.fields[..2], "msg"),
            "($msg'query_id, $msg'amount)"
        );
        assert_eq!(func_type(&[]), "()");
    }

    #[test]
    fn missing_type_or_header_is_a_missing_allocation() {
        let mut reg = TypeRegistry::new();
        reg.insert(MessageType {
            name: "Point".to_string(),
            header: None,
            fields: Vec::new(),
        })
        .expect("insert");
        let err = reg.allocation("Point").expect_err("no header");
        assert_eq!(err.kind, CompileErrorKind::MissingAllocation);
        let err = reg.allocation("Nope").expect_err("unknown");
        assert_eq!(err.kind, CompileErrorKind::MissingAllocation);
    }

    #[test]
    fn encoded_message_decodes_back_through_the_allocation() {
        let mut reg = TypeRegistry::new();
        reg.insert(transfer()).expect("insert");
        let alloc = reg.allocation("Transfer").expect("allocation");
        let values = Record::new()
            .with("query_id", Value::Int(9))
            .with("amount", Value::Int(1_000_000_000))
            .with("forward", Value::Bool(true))
            .with("memo", Value::Int(42));
        let cell = encode_message(alloc.ty, &values).expect("encode");
        assert_eq!(cell.bit_len(), 32 + 64 + 4 + 32 + 1 + 256);

        let mut s = Slice::new(Arc::new(cell));
        let decoded = decode_message(&mut s, &alloc, false).expect("decode");
        assert_eq!(decoded, values);
        assert_eq!(s.remaining_bits(), 0);
    }

    #[test]
    fn decode_rejects_foreign_opcode() {
        let mut reg = TypeRegistry::new();
        reg.insert(transfer()).expect("insert");
        let alloc = reg.allocation("Transfer").expect("allocation");
        let mut s = Slice::new(Arc::new(Cell::from_bytes(&[0, 0, 0, 1]).expect("cell")));
        let err = decode_message(&mut s, &alloc, true).expect_err("wrong opcode");
        assert_eq!(err.code, exit_codes::INVALID_PREFIX);
    }
}
