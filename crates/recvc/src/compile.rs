use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::diagnostics::{Diagnostic, Location, Span, Stage};
use crate::func_emit::{self, FuncStatements, StatementLowering};
use crate::language;
use crate::layout::TypeRegistry;
use crate::program::{CompilationUnit, ContractType, Direction, Selector};
use crate::receiver;
use crate::router::{self, RouterPlan};
use crate::unit_json;
use crate::writer::FuncWriter;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Emit `;;` comments naming each router branch.
    pub emit_comments: bool,
    /// Directions to build routers for. The internal router is mandatory when selected.
    pub directions: Vec<Direction>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            emit_comments: true,
            directions: Direction::ALL.to_vec(),
        }
    }
}

impl CompileOptions {
    pub fn wants(&self, direction: Direction) -> bool {
        self.directions.contains(&direction)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileStats {
    pub contracts: usize,
    pub routers: usize,
    pub receivers: usize,
    pub output_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    Parse,
    Typing,
    OversizedComment,
    InvalidSelectorVariant,
    MissingAllocation,
    Budget,
    Internal,
}

impl CompileErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            CompileErrorKind::Parse => "RECVC-PARSE",
            CompileErrorKind::Typing => "RECVC-TYPING",
            CompileErrorKind::OversizedComment => "RECVC-OVERSIZED-COMMENT",
            CompileErrorKind::InvalidSelectorVariant => "RECVC-INVALID-SELECTOR",
            CompileErrorKind::MissingAllocation => "RECVC-MISSING-ALLOCATION",
            CompileErrorKind::Budget => "RECVC-BUDGET",
            CompileErrorKind::Internal => "RECVC-INTERNAL",
        }
    }

    fn stage(self) -> Stage {
        match self {
            CompileErrorKind::Parse => Stage::Parse,
            CompileErrorKind::Typing => Stage::Lower,
            CompileErrorKind::OversizedComment | CompileErrorKind::MissingAllocation => {
                Stage::Resolve
            }
            CompileErrorKind::InvalidSelectorVariant => Stage::Route,
            CompileErrorKind::Budget | CompileErrorKind::Internal => Stage::Emit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompilerError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub loc: Option<Location>,
}

impl CompilerError {
    pub fn new(kind: CompileErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            loc: None,
        }
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        if let Some(span) = span {
            self.loc = Some(Location::Text {
                span,
                snippet: None,
            });
        }
        self
    }

    /// Attaches the receiver position unless a source span is already known.
    pub fn at_receiver(mut self, contract: &str, index: usize) -> Self {
        if self.loc.is_none() {
            self.loc = Some(Location::Receiver {
                contract: contract.to_string(),
                index,
            });
        }
        self
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut d = Diagnostic::error(self.kind.code(), self.kind.stage(), self.message.clone());
        d.loc = self.loc.clone();
        d
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CompilerError {}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub func_src: String,
    pub stats: CompileStats,
}

pub fn compile_unit_to_func(unit: &[u8], options: &CompileOptions) -> Result<String, CompilerError> {
    compile_unit_with_meta(unit, options).map(|out| out.func_src)
}

pub fn compile_unit_with_meta(
    unit: &[u8],
    options: &CompileOptions,
) -> Result<CompileOutput, CompilerError> {
    let unit = load_unit(unit)?;
    compile_program(&unit, options)
}

/// Size-checks and parses a unit document.
pub fn load_unit(unit: &[u8]) -> Result<CompilationUnit, CompilerError> {
    let max_input_bytes = language::limits::max_input_bytes();
    if unit.len() > max_input_bytes {
        return Err(CompilerError::new(
            CompileErrorKind::Budget,
            format!(
                "unit too large: max_input_bytes={} got {} (set RECVC_MAX_INPUT_BYTES=<bytes>)",
                max_input_bytes,
                unit.len()
            ),
        ));
    }
    unit_json::parse_unit_json(unit)
}

pub fn compile_program(
    unit: &CompilationUnit,
    options: &CompileOptions,
) -> Result<CompileOutput, CompilerError> {
    let mut out = String::new();
    let mut stats = CompileStats::default();
    let mut lowering = FuncStatements;
    for contract in &unit.contracts {
        let rendered =
            compile_contract(contract, &unit.registry, options, &mut lowering, &mut stats)?;
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&rendered);
        stats.contracts += 1;
    }

    let max_output_bytes = language::limits::max_output_bytes();
    if out.len() > max_output_bytes {
        return Err(CompilerError::new(
            CompileErrorKind::Budget,
            format!(
                "FunC output too large: max_output_bytes={} got {} (set RECVC_MAX_OUTPUT_BYTES=<bytes>)",
                max_output_bytes,
                out.len()
            ),
        ));
    }
    stats.output_bytes = out.len();
    Ok(CompileOutput {
        func_src: out,
        stats,
    })
}

/// Renders one contract type into its own buffer: receivers first, then routers.
///
/// Nothing is returned on error, so a failing contract leaves no partial text behind.
pub fn compile_contract(
    contract: &ContractType,
    registry: &TypeRegistry,
    options: &CompileOptions,
    lowering: &mut dyn StatementLowering,
    stats: &mut CompileStats,
) -> Result<String, CompilerError> {
    debug!(contract = %contract.name, receivers = contract.receivers.len(), "compiling contract");
    let plans = router_plans(contract, registry, options)?;

    let mut w = FuncWriter::new();
    let mut emitted_text_handlers: BTreeMap<String, usize> = BTreeMap::new();
    for (index, recv) in contract.receivers.iter().enumerate() {
        if !options.wants(recv.selector.direction()) {
            continue;
        }
        let lowered = receiver::lower_receiver(contract, index, registry)
            .map_err(|e| e.at_receiver(&contract.name, index))?;
        if let Selector::Comment { text, .. } = &recv.selector {
            if let Some(first) = emitted_text_handlers.get(&lowered.function) {
                debug!(
                    contract = %contract.name,
                    receiver = index,
                    shadowed_by = *first,
                    comment = %text,
                    "skipping shadowed comment receiver"
                );
                continue;
            }
            emitted_text_handlers.insert(lowered.function.clone(), index);
        }
        func_emit::write_receiver(&mut w, &lowered, lowering, options.emit_comments)
            .map_err(|e| e.at_receiver(&contract.name, index))?;
        w.blank();
        stats.receivers += 1;
    }

    for (i, plan) in plans.iter().enumerate() {
        if i > 0 {
            w.blank();
        }
        func_emit::write_router(&mut w, plan, options.emit_comments);
        stats.routers += 1;
    }
    Ok(w.finish())
}

/// Router plans for one contract, internal first.
pub fn router_plans(
    contract: &ContractType,
    registry: &TypeRegistry,
    options: &CompileOptions,
) -> Result<Vec<RouterPlan>, CompilerError> {
    let mut plans = Vec::new();
    for direction in Direction::ALL {
        if !options.wants(direction) {
            continue;
        }
        if direction == Direction::External && !contract.has_receivers_for(direction) {
            continue;
        }
        plans.push(router::build_router(contract, direction, registry)?);
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Position;

    #[test]
    fn span_takes_precedence_over_receiver_location() {
        let span = Span {
            start: Position { line: 3, col: 9 },
            end: None,
            file: None,
        };
        let err = CompilerError::new(CompileErrorKind::OversizedComment, "too long".to_string())
            .with_span(Some(span.clone()))
            .at_receiver("Counter", 2);
        let d = err.to_diagnostic();
        assert_eq!(d.code, "RECVC-OVERSIZED-COMMENT");
        assert_eq!(
            d.loc,
            Some(Location::Text {
                span,
                snippet: None
            })
        );

        let err = CompilerError::new(CompileErrorKind::Typing, "unknown".to_string())
            .with_span(None)
            .at_receiver("Counter", 2);
        assert_eq!(
            err.to_diagnostic().loc,
            Some(Location::Receiver {
                contract: "Counter".to_string(),
                index: 2
            })
        );
    }

    #[test]
    fn default_options_cover_both_directions() {
        let options = CompileOptions::default();
        assert!(options.wants(Direction::Internal));
        assert!(options.wants(Direction::External));
        assert!(options.emit_comments);
    }
}
