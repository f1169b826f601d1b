use std::collections::BTreeMap;

use hintguard_contracts::HINTGUARD_DIAG_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CheckError, HintError, HintErrorKind};
use crate::universe::UniverseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Reduce,
    Codegen,
    Assemble,
    Resolve,
    Check,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Location {
    /// JSON pointer into the universe document.
    Document { ptr: String },
    /// Parameter name or `__return`.
    Slot { slot: String },
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

    pub fn at(mut self, loc: Location) -> Self {
        self.loc = Some(loc);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
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
            schema_version: HINTGUARD_DIAG_SCHEMA_VERSION.to_string(),
            ok: true,
            diagnostics: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_diagnostics(mut self, mut diagnostics: Vec<Diagnostic>) -> Self {
        fn sort_key(d: &Diagnostic) -> &str {
            match &d.loc {
                Some(Location::Document { ptr }) => ptr,
                Some(Location::Slot { slot }) => slot,
                None => "",
            }
        }
        diagnostics.sort_by(|a, b| {
            sort_key(a)
                .cmp(sort_key(b))
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
        self.ok = diagnostics.iter().all(|d| d.severity != Severity::Error);
        self.diagnostics = diagnostics;
        self
    }
}

fn hint_error_code(kind: HintErrorKind) -> (&'static str, Stage) {
    match kind {
        HintErrorKind::Unsupported => ("HG0001", Stage::Codegen),
        HintErrorKind::Misplaced => ("HG0002", Stage::Codegen),
        HintErrorKind::TypeVarConflict => ("HG0003", Stage::Reduce),
        HintErrorKind::ForwardRefUnresolvable => ("HG0004", Stage::Reduce),
        HintErrorKind::ForwardRefResolution => ("HG0005", Stage::Resolve),
        HintErrorKind::Internal => ("HG0099", Stage::Codegen),
    }
}

impl From<&HintError> for Diagnostic {
    fn from(err: &HintError) -> Self {
        let (code, stage) = hint_error_code(err.kind);
        Diagnostic::error(code, stage, err.message.clone())
            .data("kind", Value::String(err.kind.as_str().to_string()))
    }
}

impl From<&UniverseError> for Diagnostic {
    fn from(err: &UniverseError) -> Self {
        Diagnostic::error("HG0100", Stage::Parse, err.message.clone()).at(Location::Document {
            ptr: err.ptr.clone(),
        })
    }
}

impl From<&CheckError> for Diagnostic {
    fn from(err: &CheckError) -> Self {
        match err {
            CheckError::Violation(v) => {
                let mut d = Diagnostic::error("HG0200", Stage::Check, v.message.clone())
                    .at(Location::Slot {
                        slot: v.slot.clone(),
                    })
                    .data("hint", Value::String(v.hint.clone()))
                    .data("pith", Value::String(v.pith.clone()));
                if let Some(idx) = v.random_index {
                    d = d.data("random_index", Value::from(idx));
                }
                d
            }
            CheckError::Hint(err) => {
                let mut d = Diagnostic::from(err);
                if err.kind == HintErrorKind::ForwardRefResolution {
                    d.stage = Stage::Check;
                    d = d.note("forward references are resolved on first check");
                }
                d
            }
            CheckError::Arity { .. } => Diagnostic::error("HG0201", Stage::Check, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_sorts_and_sets_ok() {
        let a = Diagnostic::error("HG0100", Stage::Parse, "b").at(Location::Document {
            ptr: "/modules/1".to_string(),
        });
        let b = Diagnostic::error("HG0100", Stage::Parse, "a").at(Location::Document {
            ptr: "/modules/0".to_string(),
        });
        let report = Report::ok().with_diagnostics(vec![a, b]);
        assert!(!report.ok);
        assert_eq!(report.diagnostics[0].message, "a");
        assert_eq!(report.schema_version, HINTGUARD_DIAG_SCHEMA_VERSION);
    }

    #[test]
    fn hint_errors_map_to_codes() {
        let err = HintError::unsupported("nope".to_string());
        let d = Diagnostic::from(&err);
        assert_eq!(d.code, "HG0001");
        assert_eq!(d.stage, Stage::Codegen);
        let v = serde_json::to_value(&d).expect("serialize");
        assert_eq!(v["data"]["kind"], "unsupported");
    }
}
