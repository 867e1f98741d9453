//! Runtime values used by the dispatch simulator and the layout decoder.

use serde_json::json;

use crate::cell::Slice;
use crate::program::FieldDef;
use crate::types::FieldTy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i128),
    Bool(bool),
    Slice(Slice),
}

impl Value {
    pub fn zero_of(ty: FieldTy) -> Self {
        if ty.is_bool() {
            Value::Bool(false)
        } else {
            Value::Int(0)
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Slice(_) => "slice",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(i) => match i64::try_from(*i) {
                Ok(small) => json!(small),
                Err(_) => json!(i.to_string()),
            },
            Value::Bool(b) => json!(b),
            Value::Slice(s) => json!({ "bits": s.remaining_bits(), "hex": s.data_hex() }),
        }
    }
}

/// Ordered named values: contract state or a decoded message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

/// Contract state is a record passed by value into and out of every handler.
pub type ContractState = Record;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zeroed(fields: &[FieldDef]) -> Self {
        Self {
            entries: fields
                .iter()
                .map(|f| (f.name.clone(), Value::zero_of(f.ty)))
                .collect(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), value));
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        if !self.set(name, value.clone()) {
            self.push(name, value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Replaces an existing entry; returns false when `name` is absent.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.entries {
            map.insert(name.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }

    /// Builds a record for `fields` from a JSON object; missing fields are zero.
    pub fn from_json(fields: &[FieldDef], v: &serde_json::Value) -> Result<Self, String> {
        let obj = match v {
            serde_json::Value::Object(obj) => obj,
            serde_json::Value::Null => return Ok(Self::zeroed(fields)),
            _ => return Err(format!("state must be a JSON object, got {v}")),
        };
        for key in obj.keys() {
            if !fields.iter().any(|f| &f.name == key) {
                return Err(format!("unknown state field {key:?}"));
            }
        }
        let mut out = Self::new();
        for f in fields {
            let value = match obj.get(&f.name) {
                None => Value::zero_of(f.ty),
                Some(serde_json::Value::Bool(b)) if f.ty.is_bool() => Value::Bool(*b),
                Some(serde_json::Value::Number(n)) if !f.ty.is_bool() => {
                    let i = n
                        .as_i64()
                        .map(i128::from)
                        .ok_or_else(|| format!("field {:?}: {n} is not an integer", f.name))?;
                    Value::Int(i)
                }
                Some(serde_json::Value::String(s)) if !f.ty.is_bool() => Value::Int(
                    s.parse::<i128>()
                        .map_err(|e| format!("field {:?}: {s:?}: {e}", f.name))?,
                ),
                Some(other) => {
                    return Err(format!(
                        "field {:?} of type {} cannot hold {other}",
                        f.name,
                        f.ty.name()
                    ))
                }
            };
            out.push(f.name.clone(), value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef {
                name: "counter".to_string(),
                ty: FieldTy::Uint(32),
            },
            FieldDef {
                name: "paused".to_string(),
                ty: FieldTy::Bool,
            },
        ]
    }

    #[test]
    fn from_json_fills_missing_fields_with_zero() {
        let state =
            Record::from_json(&fields(), &serde_json::json!({ "counter": 7 })).expect("state");
        assert_eq!(state.get("counter"), Some(&Value::Int(7)));
        assert_eq!(state.get("paused"), Some(&Value::Bool(false)));
    }

    #[test]
    fn from_json_rejects_unknown_and_mistyped_fields() {
        assert!(Record::from_json(&fields(), &serde_json::json!({ "owner": 1 })).is_err());
        assert!(Record::from_json(&fields(), &serde_json::json!({ "paused": 1 })).is_err());
    }

    #[test]
    fn wide_integers_serialize_as_strings() {
        let v = Value::Int(i128::from(i64::MAX) + 1);
        assert_eq!(v.to_json(), serde_json::json!("9223372036854775808"));
    }
}
