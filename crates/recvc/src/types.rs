use serde::Serialize;

/// Serialized shape of a single struct or state field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "bits", rename_all = "lowercase")]
pub enum FieldTy {
    Uint(u16),
    Int(u16),
    Bool,
    Coins,
}

impl FieldTy {
    pub fn parse_named(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(FieldTy::Bool),
            "coins" => Some(FieldTy::Coins),
            _ => {
                if let Some(bits) = name.strip_prefix("uint") {
                    let bits = bits.parse::<u16>().ok()?;
                    return (1..=256).contains(&bits).then_some(FieldTy::Uint(bits));
                }
                if let Some(bits) = name.strip_prefix("int") {
                    let bits = bits.parse::<u16>().ok()?;
                    return (1..=257).contains(&bits).then_some(FieldTy::Int(bits));
                }
                None
            }
        }
    }

    pub fn name(self) -> String {
        match self {
            FieldTy::Uint(bits) => format!("uint{bits}"),
            FieldTy::Int(bits) => format!("int{bits}"),
            FieldTy::Bool => "bool".to_string(),
            FieldTy::Coins => "coins".to_string(),
        }
    }

    /// Upper bound on the encoded width. Coins are a 4-bit byte length plus up to 15 bytes.
    pub fn max_bits(self) -> usize {
        match self {
            FieldTy::Uint(bits) | FieldTy::Int(bits) => usize::from(bits),
            FieldTy::Bool => 1,
            FieldTy::Coins => 4 + 15 * 8,
        }
    }

    /// Every field type lives on the stack as an integer.
    pub fn func_ty(self) -> &'static str {
        "int"
    }

    pub fn is_bool(self) -> bool {
        matches!(self, FieldTy::Bool)
    }
}
