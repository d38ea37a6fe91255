//! Line classification and tokenization for cmdl scripts.
//!
//! A script is processed one physical line at a time. [`classify_lines`]
//! drops blank and comment lines and measures the indentation depth of the
//! rest; [`tokenize_line`] turns one classified line into [`Token`]s with
//! spans relative to the whole file.

use std::fmt;

use cmdl_common::{LineNo, Span};
use logos::Logos;
use thiserror::Error;

/// Number of spaces that make up one indentation level.
pub const INDENT_WIDTH: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Default)]
pub enum LexErrorKind {
    #[default]
    #[error("unexpected character")]
    UnexpectedCharacter,
    #[error("unterminated string")]
    UnterminatedString,
    #[error("invalid number")]
    InvalidNumber,
    #[error("bad indentation: {0}")]
    BadIndentation(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
    pub line: LineNo,
}

/// One non-blank, non-comment line of a script.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    /// 1-based line number in the file.
    pub number: LineNo,
    /// Indentation depth in levels (one tab or four spaces per level).
    pub depth: usize,
    /// Statement text with indentation and trailing whitespace removed.
    pub text: String,
    /// Location of `text` in the file.
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t]+")]
pub enum TokenKind {
    // Keywords
    #[token("text")]
    Text,
    #[token("clear")]
    Clear,
    #[token("set")]
    Set,
    #[token("math")]
    Math,
    #[token("loop")]
    Loop,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("goto")]
    Goto,
    #[token("pause")]
    Pause,
    #[token("input")]
    Input,
    #[token("input_number")]
    InputNumber,
    #[token("color")]
    Color,
    #[token("exit")]
    Exit,

    // Literals
    #[regex(r"[0-9]+", lex_int)]
    IntLiteral(i64),
    #[regex(r"[0-9]+\.[0-9]+", lex_float)]
    FloatLiteral(f64),
    #[regex(r#""[^"]*""#, lex_string)]
    #[regex(r"'[^']*'", lex_string)]
    StringLiteral(String),
    /// Never produced: a quote with no closing partner on the same line.
    #[regex(r#""[^"]*"#, unterminated_string)]
    #[regex(r"'[^']*", unterminated_string)]
    UnterminatedString,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Operators and punctuation
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("=")]
    #[token("==")]
    Eq,
    #[token("!=")]
    Neq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
}

fn lex_int(lex: &mut logos::Lexer<TokenKind>) -> Result<i64, LexErrorKind> {
    lex.slice().parse().map_err(|_| LexErrorKind::InvalidNumber)
}

fn lex_float(lex: &mut logos::Lexer<TokenKind>) -> Result<f64, LexErrorKind> {
    lex.slice().parse().map_err(|_| LexErrorKind::InvalidNumber)
}

/// Strip the surrounding quotes. Strings carry no escape sequences.
fn lex_string(lex: &mut logos::Lexer<TokenKind>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_string()
}

fn unterminated_string(_lex: &mut logos::Lexer<TokenKind>) -> Result<(), LexErrorKind> {
    Err(LexErrorKind::UnterminatedString)
}

impl TokenKind {
    /// The spelling of a keyword token. Keywords double as names wherever the
    /// grammar expects one, so `set color = 1` and `clear():` stay legal.
    pub fn keyword(&self) -> Option<&'static str> {
        let word = match self {
            TokenKind::Text => "text",
            TokenKind::Clear => "clear",
            TokenKind::Set => "set",
            TokenKind::Math => "math",
            TokenKind::Loop => "loop",
            TokenKind::If => "if",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::Goto => "goto",
            TokenKind::Pause => "pause",
            TokenKind::Input => "input",
            TokenKind::InputNumber => "input_number",
            TokenKind::Color => "color",
            TokenKind::Exit => "exit",
            _ => return None,
        };
        Some(word)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(word) = self.keyword() {
            return write!(f, "`{word}`");
        }
        match self {
            TokenKind::IntLiteral(v) => write!(f, "number {v}"),
            TokenKind::FloatLiteral(v) => write!(f, "number {v}"),
            TokenKind::StringLiteral(s) => write!(f, "string \"{s}\""),
            TokenKind::UnterminatedString => write!(f, "unterminated string"),
            TokenKind::Ident(name) => write!(f, "identifier `{name}`"),
            TokenKind::Plus => write!(f, "`+`"),
            TokenKind::Minus => write!(f, "`-`"),
            TokenKind::Star => write!(f, "`*`"),
            TokenKind::Slash => write!(f, "`/`"),
            TokenKind::LParen => write!(f, "`(`"),
            TokenKind::RParen => write!(f, "`)`"),
            TokenKind::Comma => write!(f, "`,`"),
            TokenKind::Colon => write!(f, "`:`"),
            TokenKind::Eq => write!(f, "`=`"),
            TokenKind::Neq => write!(f, "`!=`"),
            TokenKind::Lt => write!(f, "`<`"),
            TokenKind::Gt => write!(f, "`>`"),
            TokenKind::Le => write!(f, "`<=`"),
            TokenKind::Ge => write!(f, "`>=`"),
            _ => Ok(()),
        }
    }
}

/// A token with its location in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub line: LineNo,
}

/// Split a script into classified lines.
///
/// Blank lines and lines whose first non-blank character is `#` are dropped.
/// Indentation must be made of tabs only or of spaces only, and a run of
/// spaces must be a multiple of [`INDENT_WIDTH`].
pub fn classify_lines(source: &str) -> Result<Vec<SourceLine>, LexError> {
    let mut lines = Vec::new();
    let mut offset = 0;

    for (idx, raw) in source.split_inclusive('\n').enumerate() {
        let line_start = offset;
        offset += raw.len();

        let content = raw.trim_end();
        let text = content.trim_start_matches(|c: char| c == ' ' || c == '\t');
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let indent = &content[..content.len() - text.len()];
        let number = idx + 1;
        let depth = indent_depth(indent).map_err(|msg| LexError {
            kind: LexErrorKind::BadIndentation(msg),
            span: Span::new(line_start, line_start + indent.len()),
            line: number,
        })?;

        let text_start = line_start + indent.len();
        lines.push(SourceLine {
            number,
            depth,
            text: text.to_string(),
            span: Span::new(text_start, text_start + text.len()),
        });
    }

    Ok(lines)
}

fn indent_depth(indent: &str) -> Result<usize, String> {
    if indent.bytes().all(|b| b == b'\t') {
        return Ok(indent.len());
    }
    if indent.bytes().all(|b| b == b' ') {
        if indent.len() % INDENT_WIDTH != 0 {
            return Err(format!(
                "{} spaces is not a multiple of {INDENT_WIDTH}",
                indent.len()
            ));
        }
        return Ok(indent.len() / INDENT_WIDTH);
    }
    Err("mixed tabs and spaces".to_string())
}

/// Tokenize the statement text of one classified line.
pub fn tokenize_line(line: &SourceLine) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    for (result, range) in TokenKind::lexer(&line.text).spanned() {
        let span = Span::from(range).offset(line.span.start);
        match result {
            Ok(kind) => tokens.push(Token {
                kind,
                span,
                line: line.number,
            }),
            Err(kind) => {
                return Err(LexError {
                    kind,
                    span,
                    line: line.number,
                })
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        let lines = classify_lines(text).expect("classify");
        tokenize_line(&lines[0])
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_blank_and_comment_lines_dropped() {
        let lines = classify_lines("\n# note\ntext \"a\"\n\n    # indented note\nclear\n").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].number, 3);
        assert_eq!(lines[0].text, "text \"a\"");
        assert_eq!(lines[1].number, 6);
        assert_eq!(lines[1].text, "clear");
    }

    #[test]
    fn test_depth_from_spaces_and_tabs() {
        let lines = classify_lines("loop:\n    loop:\n        clear\n\t\tclear\n").unwrap();
        let depths: Vec<_> = lines.iter().map(|l| l.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 2]);
    }

    #[test]
    fn test_mixed_indentation_rejected() {
        let err = classify_lines("loop:\n \tclear\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(err.kind, LexErrorKind::BadIndentation(_)));
    }

    #[test]
    fn test_uneven_spaces_rejected() {
        let err = classify_lines("loop:\n   clear\n").unwrap_err();
        assert!(err.to_string().contains("not a multiple of 4"));
    }

    #[test]
    fn test_crlf_and_trailing_whitespace() {
        let lines = classify_lines("clear  \r\ntext \"x\"\r\n").unwrap();
        assert_eq!(lines[0].text, "clear");
        assert_eq!(lines[1].text, "text \"x\"");
    }

    #[test]
    fn test_spans_are_file_relative() {
        let src = "clear\n    text x\n";
        let lines = classify_lines(src).unwrap();
        let tokens = tokenize_line(&lines[1]).unwrap();
        assert_eq!(&src[tokens[1].span.to_range()], "x");
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("input_number inputs"),
            vec![TokenKind::InputNumber, TokenKind::Ident("inputs".into())]
        );
        assert_eq!(
            kinds("texture"),
            vec![TokenKind::Ident("texture".into())]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("4.5 12"),
            vec![TokenKind::FloatLiteral(4.5), TokenKind::IntLiteral(12)]
        );
    }

    #[test]
    fn test_strings_keep_commas() {
        assert_eq!(
            kinds(r#"text "a, b", 'c'"#),
            vec![
                TokenKind::Text,
                TokenKind::StringLiteral("a, b".into()),
                TokenKind::Comma,
                TokenKind::StringLiteral("c".into()),
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            kinds("= == != <= >= < >"),
            vec![
                TokenKind::Eq,
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Lt,
                TokenKind::Gt,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let lines = classify_lines("text \"oops\n").unwrap();
        let err = tokenize_line(&lines[0]).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_keyword_spelling() {
        assert_eq!(TokenKind::Color.keyword(), Some("color"));
        assert_eq!(TokenKind::InputNumber.keyword(), Some("input_number"));
        assert_eq!(TokenKind::Ident("x".into()).keyword(), None);
        assert_eq!(TokenKind::Exit.to_string(), "`exit`");
    }

    #[test]
    fn test_unexpected_character() {
        let lines = classify_lines("set x = 1 $ 2").unwrap();
        let err = tokenize_line(&lines[0]).unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnexpectedCharacter);
    }
}
