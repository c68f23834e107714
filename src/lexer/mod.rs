//! Byte stream → token stream (spec §4.2).
//!
//! Built on `logos`, the same way the teacher's own lexer is: a derive-macro
//! token enum with `#[token]`/`#[regex]` patterns, longest-match-first so
//! `<=` is tried before `<`, `==` before `=`, and so on.

use logos::Logos;

use crate::ast::Span;
use crate::error::{Category, Diagnostic};

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum TokenKind {
    // Keywords. `do` is part of the keyword table (spec §3) but the
    // expression/statement grammar in §4.3 never produces a construct that
    // uses it — lexed and reserved, never parsed. Same story as the shift
    // operators below.
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("do")]
    Do,
    #[token("char")]
    Char,
    #[token("int")]
    Int,
    #[token("float")]
    Float,
    #[token("string")]
    String,
    #[token("void")]
    Void,
    #[token("return")]
    Return,

    #[regex(r"_*[A-Za-z][A-Za-z0-9_]*")]
    Identifier,

    #[regex(r"[0-9]+\.[0-9]+")]
    FloatLiteral,
    #[regex(r"[0-9]+")]
    IntLiteral,

    #[regex(r#"'([^'\\]|\\.)'"#)]
    CharLiteral,
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLiteral,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("!")]
    Bang,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,

    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::Do => "do",
            TokenKind::Char => "char",
            TokenKind::Int => "int",
            TokenKind::Float => "float",
            TokenKind::String => "string",
            TokenKind::Void => "void",
            TokenKind::Return => "return",
            TokenKind::Identifier => "identifier",
            TokenKind::FloatLiteral => "float literal",
            TokenKind::IntLiteral => "int literal",
            TokenKind::CharLiteral => "char literal",
            TokenKind::StringLiteral => "string literal",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Bang => "!",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Eof => "<eof>",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

/// Escape set shared by char and string literals: `n t r \\ ' " 0`.
fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let esc = chars.next()?;
            out.push(match esc {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '\\' => '\\',
                '\'' => '\'',
                '"' => '"',
                '0' => '\0',
                _ => return None,
            });
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// The decoded payload of a char or string literal.
pub fn decode_char_literal(lexeme: &str) -> Option<char> {
    let inner = lexeme.strip_prefix('\'')?.strip_suffix('\'')?;
    unescape(inner)?.chars().next()
}

pub fn decode_string_literal(lexeme: &str) -> Option<String> {
    let inner = lexeme.strip_prefix('"')?.strip_suffix('"')?;
    unescape(inner)
}

/// Tokenize `source` in full, collecting lexical errors into `errors` rather
/// than aborting the whole scan (spec §7: lexical errors accumulate through
/// a single parse). Always appends a final `Eof` token.
pub fn tokenize(source: &str, errors: &mut Vec<Diagnostic>) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    let mut line = 1u32;
    let mut line_start = 0usize;

    while let Some(result) = lexer.next() {
        let span_range = lexer.span();
        let lexeme = &source[span_range.clone()];
        let column = (span_range.start - line_start) as u32 + 1;
        let span = Span::new(line, column);

        match result {
            Ok(kind) => tokens.push(Token { kind, lexeme: lexeme.to_string(), span }),
            Err(()) => {
                let bad = lexeme.chars().next().unwrap_or('?');
                let mut diag = Diagnostic::error(
                    Category::Lexical,
                    format!("unrecognized character '{bad}'"),
                    span,
                );
                diag = match bad {
                    '@' | '$' | '`' => diag.with_suggestion(format!(
                        "'{bad}' is not a valid Sara token; did you mean to remove it?"
                    )),
                    _ => diag,
                };
                errors.push(diag);
            }
        }

        let newlines = lexeme.matches('\n').count();
        if newlines > 0 {
            line += newlines as u32;
            line_start = span_range.start + lexeme.rfind('\n').map(|i| i + 1).unwrap_or(0);
        }
    }

    let eof_column = (source.len() - line_start) as u32 + 1;
    tokens.push(Token { kind: TokenKind::Eof, lexeme: String::new(), span: Span::new(line, eof_column) });
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut errs = Vec::new();
        tokenize(src, &mut errs).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn longer_operators_win_over_prefixes() {
        assert_eq!(kinds("<= < == = != <<"), vec![
            TokenKind::LtEq,
            TokenKind::Lt,
            TokenKind::EqEq,
            TokenKind::Assign,
            TokenKind::NotEq,
            TokenKind::Shl,
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn numeric_kind_selected_by_dot() {
        assert_eq!(kinds("42 3.14"), vec![TokenKind::IntLiteral, TokenKind::FloatLiteral, TokenKind::Eof]);
    }

    #[test]
    fn keyword_vs_identifier() {
        assert_eq!(kinds("int intx"), vec![TokenKind::Int, TokenKind::Identifier, TokenKind::Eof]);
    }

    #[test]
    fn unknown_character_reports_lexical_error() {
        let mut errs = Vec::new();
        let toks = tokenize("int x @ = 1;", &mut errs);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].code, "E0002");
        assert!(toks.iter().any(|t| t.kind == TokenKind::Assign));
    }

    #[test]
    fn string_and_char_literal_escapes_decode() {
        assert_eq!(decode_char_literal("'\\n'"), Some('\n'));
        assert_eq!(decode_string_literal("\"a\\tb\""), Some("a\tb".to_string()));
    }

    #[test]
    fn newlines_are_skipped_whitespace_not_errors() {
        let mut errs = Vec::new();
        let toks = tokenize("int x;\nint y;\n", &mut errs);
        assert!(errs.is_empty());
        assert_eq!(toks.iter().filter(|t| t.kind == TokenKind::Int).count(), 2);
    }

    #[test]
    fn line_and_column_track_newlines() {
        let mut errs = Vec::new();
        let toks = tokenize("int x;\nint y;", &mut errs);
        let second_int = toks.iter().filter(|t| t.kind == TokenKind::Int).nth(1).unwrap();
        assert_eq!(second_int.span.line, 2);
        assert_eq!(second_int.span.column, 1);
    }
}
