use cmdl_common::{LineNo, Span};

/// One parsed script line together with its position in the block structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub number: LineNo,
    pub depth: usize,
    pub statement: Statement,
}

// ── Statements ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// text "literal", var, ...
    Text { parts: Vec<TextPart>, span: Span },
    /// echo raw words, printed exactly as written
    Echo { text: String, span: Span },
    /// clear
    Clear { span: Span },
    /// set name = expr
    Set { name: String, value: Expr, span: Span },
    /// math name = expr (name must already hold a number)
    Math { name: String, expr: Expr, span: Span },
    /// loop: / loop(N): / loop(var):
    Loop {
        bound: Option<LoopBound>,
        span: Span,
    },
    /// if cond:
    If { condition: Condition, span: Span },
    /// elif cond:
    Elif { condition: Condition, span: Span },
    /// else:
    Else { span: Span },
    /// name():
    Label { name: String, span: Span },
    /// goto name()
    Goto { target: String, span: Span },
    /// pause() waits for a line of input; pause(n) sleeps n seconds.
    Pause {
        duration: Option<Expr>,
        span: Span,
    },
    /// input name:
    Input { name: String, span: Span },
    /// input_number name:
    InputNumber { name: String, span: Span },
    /// color name / color rgb(r, g, b)
    Color { color: ColorSpec, span: Span },
    /// exit
    Exit { span: Span },
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Text { span, .. }
            | Statement::Echo { span, .. }
            | Statement::Clear { span }
            | Statement::Set { span, .. }
            | Statement::Math { span, .. }
            | Statement::Loop { span, .. }
            | Statement::If { span, .. }
            | Statement::Elif { span, .. }
            | Statement::Else { span }
            | Statement::Label { span, .. }
            | Statement::Goto { span, .. }
            | Statement::Pause { span, .. }
            | Statement::Input { span, .. }
            | Statement::InputNumber { span, .. }
            | Statement::Color { span, .. }
            | Statement::Exit { span } => *span,
        }
    }

    /// True for statements whose following, more deeply indented lines form a block.
    pub fn opens_block(&self) -> bool {
        matches!(
            self,
            Statement::Loop { .. }
                | Statement::If { .. }
                | Statement::Elif { .. }
                | Statement::Else { .. }
        )
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Statement::Text { .. } => "text",
            Statement::Echo { .. } => "echo",
            Statement::Clear { .. } => "clear",
            Statement::Set { .. } => "set",
            Statement::Math { .. } => "math",
            Statement::Loop { .. } => "loop",
            Statement::If { .. } => "if",
            Statement::Elif { .. } => "elif",
            Statement::Else { .. } => "else",
            Statement::Label { .. } => "label",
            Statement::Goto { .. } => "goto",
            Statement::Pause { .. } => "pause",
            Statement::Input { .. } => "input",
            Statement::InputNumber { .. } => "input_number",
            Statement::Color { .. } => "color",
            Statement::Exit { .. } => "exit",
        }
    }
}

/// One comma-separated segment of a `text` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum TextPart {
    Literal(String),
    /// Looked up when the statement runs, not when it is parsed.
    Variable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopBound {
    Count(i64),
    /// Re-read every time the loop is entered.
    Variable(String),
}

/// `lhs OP rhs` in an `if` or `elif` header.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub lhs: Expr,
    pub op: CmpOp,
    pub rhs: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Neq => "!=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpec {
    Named(String),
    Rgb(u8, u8, u8),
}

// ── Expressions ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLiteral {
        value: i64,
        span: Span,
    },
    FloatLiteral {
        value: f64,
        span: Span,
    },
    StringLiteral {
        value: String,
        span: Span,
    },
    Variable {
        name: String,
        span: Span,
    },
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLiteral { span, .. }
            | Expr::FloatLiteral { span, .. }
            | Expr::StringLiteral { span, .. }
            | Expr::Variable { span, .. }
            | Expr::BinaryOp { span, .. }
            | Expr::UnaryOp { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}
