use serde::Serialize;

use crate::diagnostics::Span;
use crate::layout::TypeRegistry;
use crate::stmt::Stmt;
use crate::types::FieldTy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Messages from other contracts.
    Internal,
    /// Messages from outside the network.
    External,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Internal, Direction::External];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Internal => "internal",
            Direction::External => "external",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "internal" => Some(Direction::Internal),
            "external" => Some(Direction::External),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldTy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Selector {
    Binary {
        direction: Direction,
        message: String,
        binding: String,
    },
    Empty {
        direction: Direction,
    },
    Comment {
        direction: Direction,
        text: String,
    },
    CommentFallback {
        direction: Direction,
        binding: String,
    },
    Fallback {
        direction: Direction,
        binding: String,
    },
    BounceBinary {
        message: String,
        binding: String,
        /// The bounced copy carries only a truncated prefix of the fields.
        partial: bool,
    },
    BounceFallback {
        binding: String,
    },
}

impl Selector {
    /// Direction of the messages this selector sees. Bounces are always internal.
    pub fn direction(&self) -> Direction {
        match self {
            Selector::Binary { direction, .. }
            | Selector::Empty { direction }
            | Selector::Comment { direction, .. }
            | Selector::CommentFallback { direction, .. }
            | Selector::Fallback { direction, .. } => *direction,
            Selector::BounceBinary { .. } | Selector::BounceFallback { .. } => {
                Direction::Internal
            }
        }
    }

    pub fn is_bounce(&self) -> bool {
        matches!(
            self,
            Selector::BounceBinary { .. } | Selector::BounceFallback { .. }
        )
    }

    /// The kind tag used by the unit document (`internal-binary`, `bounce-fallback`, ...).
    pub fn kind_name(&self) -> String {
        let base = match self {
            Selector::Binary { .. } => "binary",
            Selector::Empty { .. } => "empty",
            Selector::Comment { .. } => "comment",
            Selector::CommentFallback { .. } => "comment-fallback",
            Selector::Fallback { .. } => "fallback",
            Selector::BounceBinary { .. } => return "bounce-binary".to_string(),
            Selector::BounceFallback { .. } => return "bounce-fallback".to_string(),
        };
        format!("{}-{base}", self.direction().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverDescription {
    pub selector: Selector,
    pub body: Vec<Stmt>,
    pub loc: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractType {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Declaration order is the tie-break priority.
    pub receivers: Vec<ReceiverDescription>,
}

impl ContractType {
    pub fn receivers_for(
        &self,
        direction: Direction,
    ) -> impl Iterator<Item = (usize, &ReceiverDescription)> {
        self.receivers
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.selector.direction() == direction)
    }

    pub fn has_receivers_for(&self, direction: Direction) -> bool {
        self.receivers_for(direction).next().is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub registry: TypeRegistry,
    pub contracts: Vec<ContractType>,
}

impl CompilationUnit {
    pub fn contract(&self, name: &str) -> Option<&ContractType> {
        self.contracts.iter().find(|c| c.name == name)
    }
}
