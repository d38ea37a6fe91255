//! Turns parsed script lines into a [`Program`]: a flat instruction list
//! with precomputed block extents and a validated label table.

mod program;

pub use program::{Instruction, Op, Program};

use std::collections::HashMap;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use cmdl_common::{FileId, LineNo, Span};
use cmdl_parser::ast::{Line, Statement};
use cmdl_parser::{parse, ParseError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error(transparent)]
    Syntax(#[from] ParseError),
    #[error("duplicate label: {name}")]
    DuplicateLabel {
        name: String,
        span: Span,
        line: LineNo,
        first_span: Span,
        first_line: LineNo,
    },
    #[error("undefined label: {name}")]
    UnresolvedGoto {
        name: String,
        span: Span,
        line: LineNo,
    },
}

impl BuildError {
    pub fn span(&self) -> Span {
        match self {
            BuildError::Syntax(e) => e.span,
            BuildError::DuplicateLabel { span, .. } | BuildError::UnresolvedGoto { span, .. } => {
                *span
            }
        }
    }

    /// 1-based line the error was found on.
    pub fn line(&self) -> LineNo {
        match self {
            BuildError::Syntax(e) => e.line,
            BuildError::DuplicateLabel { line, .. } | BuildError::UnresolvedGoto { line, .. } => {
                *line
            }
        }
    }

    pub fn to_diagnostic(&self, file_id: FileId) -> Diagnostic<FileId> {
        let message = self.to_string();
        let mut labels =
            vec![Label::primary(file_id, self.span().to_range()).with_message(&message)];
        if let BuildError::DuplicateLabel {
            first_span,
            first_line,
            ..
        } = self
        {
            labels.push(
                Label::secondary(file_id, first_span.to_range())
                    .with_message(format!("first defined on line {first_line}")),
            );
        }
        Diagnostic::error()
            .with_message(format!("line {}: {message}", self.line()))
            .with_labels(labels)
    }
}

fn syntax_error(span: Span, line: LineNo, message: String) -> BuildError {
    BuildError::Syntax(ParseError {
        span,
        line,
        message,
    })
}

/// A block opener that has not seen its last body line yet.
#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    depth: usize,
    index: usize,
}

/// A block opener whose first body line has not arrived yet.
#[derive(Debug, Clone)]
struct AwaitingBody {
    depth: usize,
    keyword: &'static str,
    span: Span,
    line: LineNo,
}

pub struct ProgramBuilder {
    instructions: Vec<Instruction>,
    open: Vec<OpenBlock>,
    awaiting_body: Option<AwaitingBody>,
    /// Last instruction emitted at each depth inside the current enclosing block.
    siblings: Vec<Option<usize>>,
    labels: HashMap<String, (usize, Span, LineNo)>,
    gotos: Vec<(String, Span, LineNo)>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            open: Vec::new(),
            awaiting_body: None,
            siblings: Vec::new(),
            labels: HashMap::new(),
            gotos: Vec::new(),
        }
    }

    pub fn build(mut self, lines: Vec<Line>) -> Result<Program, BuildError> {
        for line in lines {
            self.push_line(line)?;
        }
        self.finish()
    }

    fn push_line(&mut self, line: Line) -> Result<(), BuildError> {
        let span = line.statement.span();
        let depth = line.depth;

        if let Some(opener) = self.awaiting_body.take() {
            if depth <= opener.depth {
                return Err(syntax_error(
                    opener.span,
                    opener.line,
                    format!("expected an indented block after `{}`", opener.keyword),
                ));
            }
        }

        self.close_blocks(depth);

        let index = self.instructions.len();
        self.siblings.truncate(depth + 1);
        self.siblings.resize(depth + 1, None);
        let previous = self.siblings[depth];

        let opens_block = line.statement.opens_block();
        let keyword = line.statement.keyword();
        let op = match line.statement {
            Statement::Text { parts, .. } => Op::Text { parts },
            Statement::Echo { text, .. } => Op::Echo { text },
            Statement::Clear { .. } => Op::Clear,
            Statement::Set { name, value, .. } => Op::Set { name, value },
            Statement::Math { name, expr, .. } => Op::Math { name, expr },
            Statement::Loop { bound, .. } => Op::LoopStart {
                bound,
                block_end: index,
            },
            Statement::If { condition, .. } => Op::IfStart {
                condition,
                block_end: index,
                next_branch: None,
                chain_end: index,
            },
            Statement::Elif { condition, .. } => {
                self.link_branch(previous, index, keyword, span, line.number)?;
                Op::ElifStart {
                    condition,
                    block_end: index,
                    next_branch: None,
                    chain_end: index,
                }
            }
            Statement::Else { .. } => {
                self.link_branch(previous, index, keyword, span, line.number)?;
                Op::ElseStart {
                    block_end: index,
                    chain_end: index,
                }
            }
            Statement::Label { name, .. } => {
                if let Some(&(_, first_span, first_line)) = self.labels.get(&name) {
                    return Err(BuildError::DuplicateLabel {
                        name,
                        span,
                        line: line.number,
                        first_span,
                        first_line,
                    });
                }
                self.labels
                    .insert(name.clone(), (index, span, line.number));
                Op::Label { name }
            }
            Statement::Goto { target, .. } => {
                self.gotos.push((target.clone(), span, line.number));
                Op::Goto { target }
            }
            Statement::Pause { duration, .. } => Op::Pause { duration },
            Statement::Input { name, .. } => Op::Input { name },
            Statement::InputNumber { name, .. } => Op::InputNumber { name },
            Statement::Color { color, .. } => Op::Color { color },
            Statement::Exit { .. } => Op::Exit,
        };

        self.instructions.push(Instruction {
            op,
            line: line.number,
            span,
        });
        self.siblings[depth] = Some(index);

        if opens_block {
            self.open.push(OpenBlock { depth, index });
            self.awaiting_body = Some(AwaitingBody {
                depth,
                keyword,
                span,
                line: line.number,
            });
        }
        Ok(())
    }

    /// Attach an `elif`/`else` at `index` to the `if`/`elif` right before it at the same depth.
    fn link_branch(
        &mut self,
        previous: Option<usize>,
        index: usize,
        keyword: &str,
        span: Span,
        line: LineNo,
    ) -> Result<(), BuildError> {
        let prev_op = previous.and_then(|p| self.instructions.get_mut(p)).map(|i| &mut i.op);
        match prev_op {
            Some(Op::IfStart { next_branch, .. }) | Some(Op::ElifStart { next_branch, .. }) => {
                *next_branch = Some(index);
                Ok(())
            }
            _ => Err(syntax_error(
                span,
                line,
                format!("`{keyword}` without a matching `if`"),
            )),
        }
    }

    /// Close every open block whose opener sits at `depth` or deeper.
    fn close_blocks(&mut self, depth: usize) {
        while let Some(top) = self.open.last().copied() {
            if top.depth < depth {
                break;
            }
            self.open.pop();
            self.close_block(top);
        }
    }

    fn close_block(&mut self, block: OpenBlock) {
        let (line, span) = {
            let opener = &self.instructions[block.index];
            (opener.line, opener.span)
        };
        if matches!(self.instructions[block.index].op, Op::LoopStart { .. }) {
            self.instructions.push(Instruction {
                op: Op::LoopEnd { start: block.index },
                line,
                span,
            });
        }
        let end = self.instructions.len();
        match &mut self.instructions[block.index].op {
            Op::LoopStart { block_end, .. }
            | Op::IfStart { block_end, .. }
            | Op::ElifStart { block_end, .. }
            | Op::ElseStart { block_end, .. } => *block_end = end,
            _ => {}
        }
    }

    fn finish(mut self) -> Result<Program, BuildError> {
        if let Some(opener) = self.awaiting_body.take() {
            return Err(syntax_error(
                opener.span,
                opener.line,
                format!("expected an indented block after `{}`", opener.keyword),
            ));
        }
        self.close_blocks(0);
        self.resolve_chains();

        for (target, span, line) in &self.gotos {
            if !self.labels.contains_key(target) {
                return Err(BuildError::UnresolvedGoto {
                    name: target.clone(),
                    span: *span,
                    line: *line,
                });
            }
        }

        let labels: HashMap<String, usize> = self
            .labels
            .into_iter()
            .map(|(name, (index, _, _))| (name, index))
            .collect();
        tracing::debug!(
            instructions = self.instructions.len(),
            labels = labels.len(),
            "program built"
        );
        Ok(Program::new(self.instructions, labels))
    }

    /// Give every branch of each if/elif/else chain the chain's exclusive end.
    fn resolve_chains(&mut self) {
        for start in 0..self.instructions.len() {
            if !matches!(self.instructions[start].op, Op::IfStart { .. }) {
                continue;
            }
            let mut branches = vec![start];
            let mut cursor = start;
            while let Some(next) = next_branch_of(&self.instructions[cursor].op) {
                branches.push(next);
                cursor = next;
            }
            let end = self.instructions[cursor].op.block_end().unwrap_or(cursor + 1);
            for branch in branches {
                match &mut self.instructions[branch].op {
                    Op::IfStart { chain_end, .. }
                    | Op::ElifStart { chain_end, .. }
                    | Op::ElseStart { chain_end, .. } => *chain_end = end,
                    _ => {}
                }
            }
        }
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn next_branch_of(op: &Op) -> Option<usize> {
    match op {
        Op::IfStart { next_branch, .. } | Op::ElifStart { next_branch, .. } => *next_branch,
        _ => None,
    }
}

/// Build a program from parsed lines.
pub fn build(lines: Vec<Line>) -> Result<Program, BuildError> {
    ProgramBuilder::new().build(lines)
}

/// Parse and build a whole script.
pub fn build_source(source: &str) -> Result<Program, BuildError> {
    let lines = parse(source)?;
    build(lines)
}
