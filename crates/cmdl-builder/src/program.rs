use std::collections::HashMap;

use cmdl_common::{LineNo, Span};
use cmdl_parser::ast::{ColorSpec, Condition, Expr, LoopBound, TextPart};

/// A built script: a flat, 0-indexed instruction list plus the label table.
///
/// Block structure is fully resolved: every block opener knows where its
/// block ends, so nothing is re-derived from indentation while running.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
}

impl Program {
    pub(crate) fn new(instructions: Vec<Instruction>, labels: HashMap<String, usize>) -> Self {
        Self {
            instructions,
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Index of the `Label` instruction declaring `name`.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn labels(&self) -> &HashMap<String, usize> {
        &self.labels
    }
}

/// One instruction with the script location it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub line: LineNo,
    pub span: Span,
}

/// All `block_end`/`chain_end` indices are exclusive: they point one past the
/// last instruction of the block (or chain).
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Text {
        parts: Vec<TextPart>,
    },
    Echo {
        text: String,
    },
    Clear,
    Set {
        name: String,
        value: Expr,
    },
    Math {
        name: String,
        expr: Expr,
    },
    LoopStart {
        bound: Option<LoopBound>,
        block_end: usize,
    },
    /// Synthesized after the last statement of a loop body.
    LoopEnd {
        start: usize,
    },
    IfStart {
        condition: Condition,
        block_end: usize,
        next_branch: Option<usize>,
        chain_end: usize,
    },
    ElifStart {
        condition: Condition,
        block_end: usize,
        next_branch: Option<usize>,
        chain_end: usize,
    },
    ElseStart {
        block_end: usize,
        chain_end: usize,
    },
    Label {
        name: String,
    },
    Goto {
        target: String,
    },
    Pause {
        duration: Option<Expr>,
    },
    Input {
        name: String,
    },
    InputNumber {
        name: String,
    },
    Color {
        color: ColorSpec,
    },
    Exit,
}

impl Op {
    /// Exclusive end of the block this instruction opens, if it opens one.
    pub fn block_end(&self) -> Option<usize> {
        match self {
            Op::LoopStart { block_end, .. }
            | Op::IfStart { block_end, .. }
            | Op::ElifStart { block_end, .. }
            | Op::ElseStart { block_end, .. } => Some(*block_end),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Text { .. } => "text",
            Op::Echo { .. } => "echo",
            Op::Clear => "clear",
            Op::Set { .. } => "set",
            Op::Math { .. } => "math",
            Op::LoopStart { .. } => "loop_start",
            Op::LoopEnd { .. } => "loop_end",
            Op::IfStart { .. } => "if",
            Op::ElifStart { .. } => "elif",
            Op::ElseStart { .. } => "else",
            Op::Label { .. } => "label",
            Op::Goto { .. } => "goto",
            Op::Pause { .. } => "pause",
            Op::Input { .. } => "input",
            Op::InputNumber { .. } => "input_number",
            Op::Color { .. } => "color",
            Op::Exit => "exit",
        }
    }
}
