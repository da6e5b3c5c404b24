//! Byte-spanned Lua 5.3 tokenizer.
//!
//! Every token carries its byte-offset span, so downstream consumers can
//! map a token straight back into the source buffer. Besides the usual
//! keyword/symbol/name/numeral scanning, this tokenizer also recognizes:
//! - long-bracket comments and long string literals (`--[[ ... ]]`,
//!   `[=[ ... ]=]`), matched by counting the run of `=` on each side,
//! - direct `PositionIndex` classification of comments, string literals,
//!   numerals, and keywords as they are scanned.
//!
//! Non-ASCII input bytes are not valid Lua source outside string/comment
//! bodies; rather than fail the whole tokenization, each such byte is
//! logged (`ErrorKind::NonAsciiByte`) and skipped as whitespace, keeping
//! the editor-intelligence surface total over partially-typed buffers.

use crate::ast::Span;
use crate::error::ErrorKind;
use crate::position::{ElementTag, PositionIndex};
use phf::phf_map;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,
    Semicolon,
    Equals,
    Comma,
    Dot,
    Colon,
    DoubleColon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Caret,
    Percent,
    Ampersand,
    Tilde,
    Pipe,
    RShift,
    LShift,
    Concat,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    Hash,
    Varargs,
    Identifier(String),
    Number(String),
    StringLit(String),
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        KEYWORDS.values().any(|k| k == self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    pub kind: TokenKind,
    pub span: Span,
}

pub const KEYWORDS: phf::Map<&'static str, TokenKind> = phf_map! {
    "and" => TokenKind::And,
    "break" => TokenKind::Break,
    "do" => TokenKind::Do,
    "else" => TokenKind::Else,
    "elseif" => TokenKind::Elseif,
    "end" => TokenKind::End,
    "false" => TokenKind::False,
    "for" => TokenKind::For,
    "function" => TokenKind::Function,
    "goto" => TokenKind::Goto,
    "if" => TokenKind::If,
    "in" => TokenKind::In,
    "local" => TokenKind::Local,
    "nil" => TokenKind::Nil,
    "not" => TokenKind::Not,
    "or" => TokenKind::Or,
    "repeat" => TokenKind::Repeat,
    "return" => TokenKind::Return,
    "then" => TokenKind::Then,
    "true" => TokenKind::True,
    "until" => TokenKind::Until,
    "while" => TokenKind::While,
};

/// Longest-match-first; entries sharing a prefix (e.g. `.`/`..`/`...`)
/// must appear with the longest spelling earlier in this list.
const SYMBOLS: &[(&str, fn() -> TokenKind)] = &[
    ("...", || TokenKind::Varargs),
    ("::", || TokenKind::DoubleColon),
    ("//", || TokenKind::DoubleSlash),
    (">>", || TokenKind::RShift),
    ("<<", || TokenKind::LShift),
    ("..", || TokenKind::Concat),
    ("<=", || TokenKind::Lte),
    (">=", || TokenKind::Gte),
    ("==", || TokenKind::Eq),
    ("~=", || TokenKind::Neq),
    (":", || TokenKind::Colon),
    (".", || TokenKind::Dot),
    ("=", || TokenKind::Equals),
    (",", || TokenKind::Comma),
    (";", || TokenKind::Semicolon),
    ("(", || TokenKind::LParen),
    (")", || TokenKind::RParen),
    ("[", || TokenKind::LBracket),
    ("]", || TokenKind::RBracket),
    ("{", || TokenKind::LBrace),
    ("}", || TokenKind::RBrace),
    ("+", || TokenKind::Plus),
    ("-", || TokenKind::Minus),
    ("*", || TokenKind::Star),
    ("/", || TokenKind::Slash),
    ("^", || TokenKind::Caret),
    ("%", || TokenKind::Percent),
    ("&", || TokenKind::Ampersand),
    ("~", || TokenKind::Tilde),
    ("|", || TokenKind::Pipe),
    ("<", || TokenKind::Lt),
    (">", || TokenKind::Gt),
    ("#", || TokenKind::Hash),
];

fn process_escape_sequences(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek() {
                Some('n') => {
                    result.push('\n');
                    chars.next();
                }
                Some('t') => {
                    result.push('\t');
                    chars.next();
                }
                Some('r') => {
                    result.push('\r');
                    chars.next();
                }
                Some('\\') => {
                    result.push('\\');
                    chars.next();
                }
                Some('"') => {
                    result.push('"');
                    chars.next();
                }
                Some('\'') => {
                    result.push('\'');
                    chars.next();
                }
                _ => result.push(ch),
            }
        } else {
            result.push(ch);
        }
    }
    result
}

/// Matches `[`, `[=`, `[==`, ... followed by `[`. Returns
/// `(level, index just after the opening bracket)`.
fn try_long_bracket_open(bytes: &[u8], at: usize) -> Option<(usize, usize)> {
    if bytes.get(at) != Some(&b'[') {
        return None;
    }
    let mut j = at + 1;
    let mut level = 0usize;
    while bytes.get(j) == Some(&b'=') {
        level += 1;
        j += 1;
    }
    if bytes.get(j) == Some(&b'[') {
        Some((level, j + 1))
    } else {
        None
    }
}

/// Returns the index just past a matching `]=*]` closer at `level`, or
/// the input length if the bracket is never closed (an unterminated
/// long string/comment still yields a token, spanning to EOF).
fn find_long_bracket_close(bytes: &[u8], from: usize, level: usize) -> usize {
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b']' {
            let mut j = i + 1;
            let mut eq = 0usize;
            while bytes.get(j) == Some(&b'=') {
                eq += 1;
                j += 1;
            }
            if eq == level && bytes.get(j) == Some(&b']') {
                return j + 1;
            }
        }
        i += 1;
    }
    bytes.len()
}

fn scan_symbol(bytes: &[u8], at: usize) -> Option<(TokenKind, usize)> {
    for (text, make) in SYMBOLS {
        let tb = text.as_bytes();
        if bytes[at..].starts_with(tb) {
            return Some((make(), at + tb.len()));
        }
    }
    None
}

fn scan_string_literal(source: &str, bytes: &[u8], at: usize) -> Option<(String, usize)> {
    let quote = *bytes.get(at)?;
    if quote != b'\'' && quote != b'"' {
        return None;
    }
    let mut j = at + 1;
    while j < bytes.len() {
        if bytes[j] == b'\\' {
            j += 2;
            continue;
        }
        if bytes[j] == quote {
            let content = &source[at + 1..j];
            return Some((process_escape_sequences(content), j + 1));
        }
        j += 1;
    }
    // Unterminated: take the rest of the buffer as content.
    let content = &source[at + 1..bytes.len()];
    Some((process_escape_sequences(content), bytes.len()))
}

fn scan_number(bytes: &[u8], at: usize) -> Option<usize> {
    if !bytes.get(at)?.is_ascii_digit() {
        return None;
    }
    let mut j = at;
    while bytes.get(j).is_some_and(u8::is_ascii_digit) {
        j += 1;
    }
    if bytes.get(j) == Some(&b'.') && bytes.get(j + 1).is_some_and(u8::is_ascii_digit) {
        j += 1;
        while bytes.get(j).is_some_and(u8::is_ascii_digit) {
            j += 1;
        }
    }
    Some(j)
}

fn scan_identifier(bytes: &[u8], at: usize) -> Option<usize> {
    let first = *bytes.get(at)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut j = at + 1;
    while bytes
        .get(j)
        .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
    {
        j += 1;
    }
    Some(j)
}

/// Tokenizes `source`, returning every token with its byte span plus a
/// `PositionIndex` pre-populated with comments, string literals,
/// numerals, and keywords. The parser later adds/upgrades entries for
/// identifiers it learns are variables, functions, or members.
pub fn tokenize(source: &str) -> (Vec<SpannedToken>, PositionIndex) {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut positions = PositionIndex::new();
    let mut i = 0usize;

    while i < len {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if !c.is_ascii() {
            log::debug!("{}", ErrorKind::NonAsciiByte { offset: i, byte: c });
            i += 1;
            continue;
        }

        if c == b'-' && bytes.get(i + 1) == Some(&b'-') {
            let after_dashes = i + 2;
            if let Some((level, content_start)) = try_long_bracket_open(bytes, after_dashes) {
                let end = find_long_bracket_close(bytes, content_start, level);
                positions.insert(i, end, ElementTag::Comment);
                i = end;
                continue;
            }
            let mut j = after_dashes;
            while j < len && bytes[j] != b'\n' {
                j += 1;
            }
            positions.insert(i, j, ElementTag::Comment);
            i = j;
            continue;
        }

        if c == b'[' {
            if let Some((level, content_start)) = try_long_bracket_open(bytes, i) {
                let close = find_long_bracket_close(bytes, content_start, level);
                let closer_len = level + 2;
                let content_end = close.saturating_sub(closer_len).max(content_start);
                let content = source[content_start..content_end].to_string();
                positions.insert(i, close, ElementTag::LiteralString);
                tokens.push(SpannedToken {
                    kind: TokenKind::StringLit(content),
                    span: Span::new(i, close),
                });
                i = close;
                continue;
            }
        }

        if let Some((content, end)) = scan_string_literal(source, bytes, i) {
            positions.insert(i, end, ElementTag::LiteralString);
            tokens.push(SpannedToken {
                kind: TokenKind::StringLit(content),
                span: Span::new(i, end),
            });
            i = end;
            continue;
        }

        if let Some(end) = scan_number(bytes, i) {
            positions.insert(i, end, ElementTag::Numeral);
            tokens.push(SpannedToken {
                kind: TokenKind::Number(source[i..end].to_string()),
                span: Span::new(i, end),
            });
            i = end;
            continue;
        }

        if let Some(end) = scan_identifier(bytes, i) {
            let text = &source[i..end];
            let kind = KEYWORDS
                .get(text)
                .cloned()
                .unwrap_or_else(|| TokenKind::Identifier(text.to_string()));
            if kind.is_keyword() {
                positions.insert(i, end, ElementTag::Keyword);
            }
            tokens.push(SpannedToken {
                kind,
                span: Span::new(i, end),
            });
            i = end;
            continue;
        }

        if let Some((kind, end)) = scan_symbol(bytes, i) {
            tokens.push(SpannedToken {
                kind,
                span: Span::new(i, end),
            });
            i = end;
            continue;
        }

        // No production matches this byte (e.g. a stray `@`). Skip it;
        // the parser will simply see a gap and recover at the next
        // recognizable token, matching the "buffer may be invalid while
        // editing" stance of the rest of the crate.
        log::trace!("unrecognized byte {:#04x} at offset {}", c, i);
        i += 1;
    }

    (tokens, positions)
}
