use std::collections::BTreeMap;
use std::fmt;

use recvc_contracts::RECVC_DIAG_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Resolve,
    Lower,
    Route,
    Emit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Location {
    Receiver {
        contract: String,
        index: usize,
    },
    Text {
        span: Span,
        #[serde(skip_serializing_if = "Option::is_none")]
        snippet: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}:{}", self.start.line, self.start.col),
            None => write!(f, "{}:{}", self.start.line, self.start.col),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Diagnostic {
    pub fn error(code: &str, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity: Severity::Error,
            stage,
            message: message.into(),
            loc: None,
            notes: Vec::new(),
            data: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub schema_version: String,
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

impl Report {
    pub fn ok() -> Self {
        Self {
            schema_version: RECVC_DIAG_SCHEMA_VERSION.to_string(),
            ok: true,
            diagnostics: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_diagnostics(mut self, mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.sort_by(|a, b| {
            let ak = location_key(a.loc.as_ref());
            let bk = location_key(b.loc.as_ref());
            ak.cmp(&bk)
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
        self.ok = diagnostics.iter().all(|d| d.severity != Severity::Error);
        self.diagnostics = diagnostics;
        self
    }
}

fn location_key(loc: Option<&Location>) -> (String, usize, u32, u32) {
    match loc {
        Some(Location::Receiver { contract, index }) => (contract.clone(), *index, 0, 0),
        Some(Location::Text { span, .. }) => (
            span.file.clone().unwrap_or_default(),
            0,
            span.start.line,
            span.start.col,
        ),
        None => (String::new(), 0, 0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_display_includes_file_when_known() {
        let span = Span {
            start: Position { line: 12, col: 5 },
            end: None,
            file: Some("counter.tact".to_string()),
        };
        assert_eq!(span.to_string(), "counter.tact:12:5");
        let bare = Span { file: None, ..span };
        assert_eq!(bare.to_string(), "12:5");
    }

    #[test]
    fn report_is_not_ok_with_errors_and_sorts_by_location() {
        let mut late = Diagnostic::error("RECVC-B", Stage::Lower, "late");
        late.loc = Some(Location::Receiver {
            contract: "Counter".to_string(),
            index: 3,
        });
        let mut early = Diagnostic::error("RECVC-A", Stage::Lower, "early");
        early.loc = Some(Location::Receiver {
            contract: "Counter".to_string(),
            index: 1,
        });
        let report = Report::ok().with_diagnostics(vec![late, early]);
        assert!(!report.ok);
        assert_eq!(report.diagnostics[0].message, "early");
        assert_eq!(report.diagnostics[1].message, "late");
    }
}
