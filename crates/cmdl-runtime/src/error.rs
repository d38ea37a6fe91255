use codespan_reporting::diagnostic::{Diagnostic, Label};
use cmdl_builder::Instruction;
use cmdl_common::{FileId, LineNo, Span};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("input closed while waiting for `{0}`")]
    InputClosed(String),
    #[error("step limit of {0} exceeded")]
    StepLimitExceeded(u64),
    /// Only reachable for a hand-assembled `Program`; the builder rejects
    /// gotos to unknown labels before anything runs.
    #[error("undefined label: {0}")]
    UnresolvedGoto(String),
    #[error("console error: {0}")]
    Console(String),
}

impl From<std::io::Error> for RuntimeErrorKind {
    fn from(e: std::io::Error) -> Self {
        RuntimeErrorKind::Console(e.to_string())
    }
}

/// A run-time failure. Every one of these ends the run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: {kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub span: Span,
    pub line: LineNo,
}

impl RuntimeError {
    /// Attribute `kind` to the instruction that was executing.
    pub fn at(kind: RuntimeErrorKind, instr: &Instruction) -> Self {
        RuntimeError {
            kind,
            span: instr.span,
            line: instr.line,
        }
    }

    pub fn to_diagnostic(&self, file_id: FileId) -> Diagnostic<FileId> {
        Diagnostic::error()
            .with_message(self.to_string())
            .with_labels(vec![
                Label::primary(file_id, self.span.to_range()).with_message(self.kind.to_string())
            ])
    }
}
