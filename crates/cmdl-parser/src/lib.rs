pub mod ast;

use ast::*;
use cmdl_common::{LineNo, Span};
use cmdl_lexer::{classify_lines, tokenize_line, LexError, SourceLine, Token, TokenKind};
use thiserror::Error;

/// A syntax error: malformed statement, bad indentation or unterminated string.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ParseError {
    pub span: Span,
    pub line: LineNo,
    pub message: String,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            span: e.span,
            line: e.line,
            message: e.kind.to_string(),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parses the tokens of a single script line into one [`Statement`].
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    line: LineNo,
    line_span: Span,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, line: &SourceLine) -> Self {
        Self {
            tokens,
            pos: 0,
            line: line.number,
            line_span: line.span,
        }
    }

    /// Parse the whole line. Anything left over after the statement is an error.
    pub fn parse_statement(&mut self) -> ParseResult<Statement> {
        let stmt = self.parse_statement_inner()?;
        if let Some(kind) = self.peek_kind() {
            return Err(self.error(&format!("unexpected {kind} after `{}`", stmt.keyword())));
        }
        Ok(stmt)
    }

    fn parse_statement_inner(&mut self) -> ParseResult<Statement> {
        if let Some(name) = self.label_name() {
            return self.parse_label(name);
        }
        let kind = self.peek_kind().cloned();
        match kind {
            Some(TokenKind::Text) => self.parse_text(),
            Some(TokenKind::Clear) => {
                let span = self.current_span();
                self.advance();
                self.eat_empty_parens();
                Ok(Statement::Clear {
                    span: span.merge(self.prev_span()),
                })
            }
            Some(TokenKind::Set) | Some(TokenKind::Math) => self.parse_assignment(),
            Some(TokenKind::Loop) => self.parse_loop(),
            Some(TokenKind::If) | Some(TokenKind::Elif) => self.parse_branch(),
            Some(TokenKind::Else) => {
                let start = self.current_span();
                self.advance();
                self.expect(TokenKind::Colon)?;
                Ok(Statement::Else {
                    span: start.merge(self.prev_span()),
                })
            }
            Some(TokenKind::Goto) => self.parse_goto(),
            Some(TokenKind::Pause) => self.parse_pause(),
            Some(TokenKind::Input) | Some(TokenKind::InputNumber) => self.parse_input(),
            Some(TokenKind::Color) => self.parse_color(),
            Some(TokenKind::Exit) => {
                let span = self.current_span();
                self.advance();
                self.eat_empty_parens();
                Ok(Statement::Exit {
                    span: span.merge(self.prev_span()),
                })
            }
            Some(TokenKind::Ident(name)) => self.parse_label(name),
            Some(other) => Err(self.error(&format!("expected a statement, found {other}"))),
            None => Err(self.error("expected a statement")),
        }
    }

    // ── text ────────────────────────────────────────────────

    fn parse_text(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance(); // text

        // text("a", x) is the same as text "a", x
        let wrapped = self.check(TokenKind::LParen)
            && matches!(self.tokens.last().map(|t| &t.kind), Some(TokenKind::RParen));
        if wrapped {
            self.advance();
        }

        let mut parts = Vec::new();
        let empty = if wrapped {
            self.check(TokenKind::RParen)
        } else {
            self.at_end()
        };
        if !empty {
            parts.push(self.parse_text_part()?);
            while self.eat(TokenKind::Comma) {
                parts.push(self.parse_text_part()?);
            }
        }
        if wrapped {
            self.expect(TokenKind::RParen)?;
        }

        Ok(Statement::Text {
            parts,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_text_part(&mut self) -> ParseResult<TextPart> {
        match self.peek_kind().cloned() {
            Some(TokenKind::StringLiteral(s)) => {
                self.advance();
                Ok(TextPart::Literal(s))
            }
            _ => match self.peek_name() {
                Some(name) => {
                    self.advance();
                    Ok(TextPart::Variable(name))
                }
                None => Err(self.error("expected a quoted string or a variable name")),
            },
        }
    }

    // ── set / math ──────────────────────────────────────────

    fn parse_assignment(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        let is_math = self.check(TokenKind::Math);
        self.advance(); // set | math
        let name = self.expect_ident_name()?;
        self.expect(TokenKind::Eq)?;
        let expr = self.parse_expr()?;
        let span = start.merge(self.prev_span());
        if is_math {
            Ok(Statement::Math { name, expr, span })
        } else {
            Ok(Statement::Set {
                name,
                value: expr,
                span,
            })
        }
    }

    // ── loop ────────────────────────────────────────────────

    fn parse_loop(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance(); // loop
        let bound = if self.eat(TokenKind::LParen) {
            let bound = self.parse_loop_bound()?;
            self.expect(TokenKind::RParen)?;
            Some(bound)
        } else {
            None
        };
        self.expect(TokenKind::Colon)?;
        Ok(Statement::Loop {
            bound,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_loop_bound(&mut self) -> ParseResult<LoopBound> {
        let negative = self.eat(TokenKind::Minus);
        match self.peek_kind().cloned() {
            Some(TokenKind::IntLiteral(n)) => {
                self.advance();
                Ok(LoopBound::Count(if negative { -n } else { n }))
            }
            _ => match self.peek_name() {
                Some(name) if !negative => {
                    self.advance();
                    Ok(LoopBound::Variable(name))
                }
                _ => Err(self.error("expected a loop count or a variable name")),
            },
        }
    }

    // ── if / elif ───────────────────────────────────────────

    fn parse_branch(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        let is_elif = self.check(TokenKind::Elif);
        self.advance(); // if | elif
        let condition = self.parse_condition()?;
        self.expect(TokenKind::Colon)?;
        let span = start.merge(self.prev_span());
        if is_elif {
            Ok(Statement::Elif { condition, span })
        } else {
            Ok(Statement::If { condition, span })
        }
    }

    fn parse_condition(&mut self) -> ParseResult<Condition> {
        let lhs = self.parse_expr()?;
        let op = self.expect_comparison_op()?;
        let rhs = self.parse_expr()?;
        let span = lhs.span().merge(rhs.span());
        Ok(Condition { lhs, op, rhs, span })
    }

    fn expect_comparison_op(&mut self) -> ParseResult<CmpOp> {
        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => CmpOp::Eq,
            Some(TokenKind::Neq) => CmpOp::Neq,
            Some(TokenKind::Lt) => CmpOp::Lt,
            Some(TokenKind::Gt) => CmpOp::Gt,
            Some(TokenKind::Le) => CmpOp::Le,
            Some(TokenKind::Ge) => CmpOp::Ge,
            _ => {
                return Err(self.error(
                    "expected comparison operator (=, !=, <, >, <=, >=)",
                ))
            }
        };
        self.advance();
        Ok(op)
    }

    // ── labels and goto ─────────────────────────────────────

    /// `name():` is the only statement that starts with a bare identifier.
    fn parse_label(&mut self, name: String) -> ParseResult<Statement> {
        let start = self.current_span();
        if self.peek_ahead_kind(1) != Some(&TokenKind::LParen) {
            return Err(self.error(&format!("unknown statement `{name}`")));
        }
        self.advance(); // name
        self.advance(); // (
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Colon)?;
        Ok(Statement::Label {
            name,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_goto(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance(); // goto
        let target = self.expect_ident_name()?;
        self.eat_empty_parens();
        Ok(Statement::Goto {
            target,
            span: start.merge(self.prev_span()),
        })
    }

    // ── pause / input / color ───────────────────────────────

    fn parse_pause(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance(); // pause
        let duration = if self.at_end() || self.eat_empty_parens() {
            None
        } else {
            Some(self.parse_expr()?)
        };
        Ok(Statement::Pause {
            duration,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_input(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        let numeric = self.check(TokenKind::InputNumber);
        self.advance(); // input | input_number
        let name = self.expect_ident_name()?;
        self.eat(TokenKind::Colon);
        let span = start.merge(self.prev_span());
        if numeric {
            Ok(Statement::InputNumber { name, span })
        } else {
            Ok(Statement::Input { name, span })
        }
    }

    fn parse_color(&mut self) -> ParseResult<Statement> {
        let start = self.current_span();
        self.advance(); // color
        let name = self.expect_ident_name()?;
        let color = if name.eq_ignore_ascii_case("rgb") && self.eat(TokenKind::LParen) {
            let r = self.expect_color_component()?;
            self.expect(TokenKind::Comma)?;
            let g = self.expect_color_component()?;
            self.expect(TokenKind::Comma)?;
            let b = self.expect_color_component()?;
            self.expect(TokenKind::RParen)?;
            ColorSpec::Rgb(r, g, b)
        } else {
            ColorSpec::Named(name.to_ascii_lowercase())
        };
        Ok(Statement::Color {
            color,
            span: start.merge(self.prev_span()),
        })
    }

    fn expect_color_component(&mut self) -> ParseResult<u8> {
        match self.peek_kind() {
            Some(TokenKind::IntLiteral(v)) => {
                let v = u8::try_from(*v)
                    .map_err(|_| self.error("colour component must be between 0 and 255"))?;
                self.advance();
                Ok(v)
            }
            _ => Err(self.error("expected a colour component (0-255)")),
        }
    }

    // ── Expression parsing (Pratt / precedence climbing) ────

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let Some(op) = self.peek_binop() else { break };
            let (l_bp, r_bp) = infix_binding_power(op);
            if l_bp < min_bp {
                break;
            }
            self.advance(); // consume operator
            let rhs = self.parse_expr_bp(r_bp)?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::BinaryOp {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
                span,
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                let start = self.current_span();
                self.advance();
                let operand = self.parse_expr_bp(prefix_bp())?;
                let span = start.merge(operand.span());
                Ok(Expr::UnaryOp {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                    span,
                })
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        match self.peek_kind().cloned() {
            Some(TokenKind::IntLiteral(value)) => {
                self.advance();
                Ok(Expr::IntLiteral { value, span })
            }
            Some(TokenKind::FloatLiteral(value)) => {
                self.advance();
                Ok(Expr::FloatLiteral { value, span })
            }
            Some(TokenKind::StringLiteral(value)) => {
                self.advance();
                Ok(Expr::StringLiteral { value, span })
            }
            _ => match self.peek_name() {
                Some(name) => {
                    self.advance();
                    Ok(Expr::Variable { name, span })
                }
                None => Err(self.error("expected expression")),
            },
        }
    }

    fn peek_binop(&self) -> Option<BinOp> {
        match self.peek_kind()? {
            TokenKind::Plus => Some(BinOp::Add),
            TokenKind::Minus => Some(BinOp::Sub),
            TokenKind::Star => Some(BinOp::Mul),
            TokenKind::Slash => Some(BinOp::Div),
            _ => None,
        }
    }

    // ── Token helpers ─────────────────────────────────────

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_ahead_kind(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    /// Span of the current token, or an empty span at the end of the line.
    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or(Span::new(self.line_span.end, self.line_span.end))
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::new(self.line_span.start, self.line_span.start)
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind().map_or(false, |k| {
            std::mem::discriminant(k) == std::mem::discriminant(&kind)
        })
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume `()` if it comes next.
    fn eat_empty_parens(&mut self) -> bool {
        if self.check(TokenKind::LParen) && self.peek_ahead_kind(1) == Some(&TokenKind::RParen) {
            self.advance();
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.check(kind.clone()) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!(
                "expected {kind}, found {}",
                self.peek_kind()
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "end of line".to_string())
            )))
        }
    }

    /// The current token read as a name. Keywords count as names.
    fn peek_name(&self) -> Option<String> {
        match self.peek_kind()? {
            TokenKind::Ident(name) => Some(name.clone()),
            kind => kind.keyword().map(str::to_string),
        }
    }

    fn expect_ident_name(&mut self) -> ParseResult<String> {
        match self.peek_name() {
            Some(name) => {
                self.advance();
                Ok(name)
            }
            None => Err(self.error("expected identifier")),
        }
    }

    /// A line of exactly `name():` declares a label, even when `name` is a keyword.
    fn label_name(&self) -> Option<String> {
        let shape = [TokenKind::LParen, TokenKind::RParen, TokenKind::Colon];
        let rest = self.tokens.get(1..)?.iter().map(|t| &t.kind);
        if self.tokens.len() == 4 && rest.eq(shape.iter()) {
            self.peek_name()
        } else {
            None
        }
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError {
            span: self.current_span(),
            line: self.line,
            message: message.to_string(),
        }
    }
}

/// Binding power for infix operators.
fn infix_binding_power(op: BinOp) -> (u8, u8) {
    match op {
        BinOp::Add | BinOp::Sub => (1, 2),
        BinOp::Mul | BinOp::Div => (3, 4),
    }
}

fn prefix_bp() -> u8 {
    5
}

/// `echo words...` or `echo(words...)`. The rest of the line is taken
/// verbatim, so it is split off before tokenizing.
fn parse_echo(line: &SourceLine) -> Option<Statement> {
    let rest = line.text.strip_prefix("echo")?;
    let text = if rest.is_empty() {
        ""
    } else if rest.starts_with([' ', '\t']) {
        rest.trim_start()
    } else {
        rest.strip_prefix('(')?.strip_suffix(')')?
    };
    Some(Statement::Echo {
        text: text.to_string(),
        span: line.span,
    })
}

/// Parse one classified line.
pub fn parse_line(line: &SourceLine) -> ParseResult<Line> {
    let statement = match parse_echo(line) {
        Some(echo) => echo,
        None => {
            let tokens = tokenize_line(line)?;
            Parser::new(tokens, line).parse_statement()?
        }
    };
    Ok(Line {
        number: line.number,
        depth: line.depth,
        statement,
    })
}

/// Convenience function: classify and parse a whole script, stopping at the first error.
pub fn parse(source: &str) -> ParseResult<Vec<Line>> {
    classify_lines(source)?.iter().map(parse_line).collect()
}
