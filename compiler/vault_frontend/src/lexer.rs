//! Tokenizer: `logos` handles the flat token alphabet, a post-pass turns
//! leading whitespace into `Indent`/`Dedent`/`Newline` tokens the way the
//! source language's own tokenizer does (blank lines and comment-only
//! lines produce no logical newline; bracket nesting suppresses newlines
//! entirely).

use logos::Logos;
use std::sync::Arc;
use vault_diagnostic::{CompileError, Diagnostic};
use vault_ir::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
#[logos(skip r"#[^\n]*")]
pub enum Raw {
    #[token("\n")]
    Newline,
    #[token("\\\n")]
    LineContinuation,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),

    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?", |lex| lex.slice().replace('_', "").parse().ok())]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", |lex| lex.slice().replace('_', "").parse().ok())]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+", |lex| lex.slice().replace('_', "").parse().ok())]
    Float(f64),

    #[regex(r"0[xX][0-9a-fA-F_]+", |lex| i64::from_str_radix(&lex.slice()[2..].replace('_', ""), 16).ok())]
    #[regex(r"0[oO][0-7_]+", |lex| i64::from_str_radix(&lex.slice()[2..].replace('_', ""), 8).ok())]
    #[regex(r"0[bB][01_]+", |lex| i64::from_str_radix(&lex.slice()[2..].replace('_', ""), 2).ok())]
    #[regex(r"[0-9][0-9_]*", |lex| lex.slice().replace('_', "").parse().ok())]
    Int(i64),

    #[regex(r#"f"([^"\\]|\\.)*""#, |lex| strip_prefixed(lex.slice(), 1, 1))]
    #[regex(r#"f'([^'\\]|\\.)*'"#, |lex| strip_prefixed(lex.slice(), 1, 1))]
    FString(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(&lex.slice()[1..lex.slice().len() - 1]))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(&lex.slice()[1..lex.slice().len() - 1]))]
    #[regex(r#""""([^"\\]|\\.|"[^"\\]|"\\.|""[^"\\]|""\\.)*"{0,2}""""#, |lex| unescape(&lex.slice()[3..lex.slice().len() - 3]))]
    Str(String),

    #[regex(r#"b"([^"\\]|\\.)*""#, |lex| unescape(&lex.slice()[2..lex.slice().len() - 1]).map(|s| s.into_bytes()))]
    Bytes(Vec<u8>),

    #[token("and")] And,
    #[token("or")] Or,
    #[token("not")] Not,
    #[token("in")] In,
    #[token("is")] Is,
    #[token("if")] If,
    #[token("elif")] Elif,
    #[token("else")] Else,
    #[token("while")] While,
    #[token("for")] For,
    #[token("def")] Def,
    #[token("class")] Class,
    #[token("return")] Return,
    #[token("pass")] Pass,
    #[token("break")] Break,
    #[token("continue")] Continue,
    #[token("import")] Import,
    #[token("from")] From,
    #[token("as")] As,
    #[token("global")] Global,
    #[token("nonlocal")] Nonlocal,
    #[token("lambda")] Lambda,
    #[token("try")] Try,
    #[token("except")] Except,
    #[token("finally")] Finally,
    #[token("raise")] Raise,
    #[token("with")] With,
    #[token("assert")] Assert,
    #[token("yield")] Yield,
    #[token("async")] Async,
    #[token("await")] Await,
    #[token("del")] Del,
    #[token("match")] Match,
    #[token("case")] Case,
    #[token("type")] Type,
    #[token("None")] None_,
    #[token("True")] True_,
    #[token("False")] False_,

    #[token("(")] LParen,
    #[token(")")] RParen,
    #[token("[")] LBracket,
    #[token("]")] RBracket,
    #[token("{")] LBrace,
    #[token("}")] RBrace,
    #[token(":")] Colon,
    #[token(",")] Comma,
    #[token(".")] Dot,
    #[token("...")] Ellipsis,
    #[token(";")] Semicolon,
    #[token("->")] Arrow,
    #[token(":=")] Walrus,

    #[token("**=")] PowAssign,
    #[token("//=")] FloorDivAssign,
    #[token("<<=")] LShiftAssign,
    #[token(">>=")] RShiftAssign,
    #[token("+=")] PlusAssign,
    #[token("-=")] MinusAssign,
    #[token("*=")] StarAssign,
    #[token("/=")] SlashAssign,
    #[token("%=")] PercentAssign,
    #[token("&=")] AmpAssign,
    #[token("|=")] PipeAssign,
    #[token("^=")] CaretAssign,
    #[token("=")] Eq,

    #[token("==")] EqEq,
    #[token("!=")] NotEq,
    #[token("<=")] LtE,
    #[token(">=")] GtE,
    #[token("<<")] LShift,
    #[token(">>")] RShift,
    #[token("**")] Pow,
    #[token("//")] FloorDiv,
    #[token("<")] Lt,
    #[token(">")] Gt,
    #[token("+")] Plus,
    #[token("-")] Minus,
    #[token("*")] Star,
    #[token("/")] Slash,
    #[token("%")] Percent,
    #[token("&")] Amp,
    #[token("|")] Pipe,
    #[token("^")] Caret,
    #[token("~")] Tilde,
    #[token("@")] At,
}

fn strip_prefixed(raw: &str, prefix: usize, suffix: usize) -> Option<String> {
    unescape(&raw[prefix + 1..raw.len() - suffix])
}

fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\n' => {}
            other => out.push(other),
        }
    }
    Some(out)
}

/// The post-indentation token stream the parser consumes. `Eof` is always
/// the final token, preceded by enough synthetic `Dedent`s to close every
/// open block — the parser never has to special-case running off the end
/// of the token list.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Raw(Raw),
    Indent,
    Dedent,
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

struct RawToken {
    raw: Raw,
    span: Span,
    line: u32,
}

pub fn tokenize(source: &str, filename: &str) -> Result<Vec<Token>, CompileError> {
    let line_starts = line_starts(source);
    let mut raw_tokens = Vec::new();
    let mut lexer = Raw::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let raw = result.map_err(|_| {
            CompileError::from(
                Diagnostic::error(format!("invalid token near byte {}", span.start))
                    .with_span(Span::new(span.start as u32, span.end as u32, line_of(&line_starts, span.start))),
            )
        })?;
        if matches!(raw, Raw::LineContinuation) {
            continue;
        }
        let line = line_of(&line_starts, span.start);
        raw_tokens.push(RawToken { raw, span: Span::new(span.start as u32, span.end as u32, line), line });
    }

    Ok(layout(source, &line_starts, raw_tokens, filename)?)
}

fn line_starts(source: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, b) in source.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i as u32 + 1);
        }
    }
    starts
}

fn line_of(starts: &[u32], offset: usize) -> u32 {
    match starts.binary_search(&(offset as u32)) {
        Ok(i) => i as u32 + 1,
        Err(i) => i as u32,
    }
}

/// Implicit line joining inside `()`/`[]`/`{}` plus leading-whitespace
/// indent tracking, collapsed into one pass over the raw token stream.
fn layout(
    source: &str,
    line_starts: &[u32],
    raw: Vec<RawToken>,
    filename: &str,
) -> Result<Vec<Token>, CompileError> {
    let mut out = Vec::with_capacity(raw.len() + 16);
    let mut indents: Vec<u32> = vec![0];
    let mut depth: i32 = 0;
    let mut at_line_start = true;
    let mut last_real_line: i64 = -1;
    let mut i = 0;

    while i < raw.len() {
        let tok = &raw[i];
        if matches!(tok.raw, Raw::Newline) {
            if depth == 0 && !at_line_start {
                out.push(Token { kind: TokenKind::Newline, span: tok.span });
                at_line_start = true;
            }
            i += 1;
            continue;
        }

        if at_line_start && depth == 0 {
            let line_start = line_starts[(tok.line - 1) as usize] as usize;
            let col = leading_width(&source[line_start..tok.span.start as usize]);
            let current = indents[indents.len() - 1];
            if col > current {
                indents.push(col);
                out.push(Token { kind: TokenKind::Indent, span: tok.span });
            } else {
                while indents[indents.len() - 1] > col {
                    indents.pop();
                    out.push(Token { kind: TokenKind::Dedent, span: tok.span });
                }
                if indents[indents.len() - 1] != col {
                    return Err(CompileError::from(
                        Diagnostic::error("inconsistent indentation").with_span(tok.span),
                    ));
                }
            }
            at_line_start = false;
        }

        match &tok.raw {
            Raw::LParen | Raw::LBracket | Raw::LBrace => depth += 1,
            Raw::RParen | Raw::RBracket | Raw::RBrace => depth = (depth - 1).max(0),
            _ => {}
        }
        last_real_line = tok.line as i64;
        out.push(Token { kind: TokenKind::Raw(tok.raw.clone()), span: tok.span });
        i += 1;
    }

    let eof_span = Span::new(source.len() as u32, source.len() as u32, (last_real_line.max(0) + 1) as u32);
    if !at_line_start {
        out.push(Token { kind: TokenKind::Newline, span: eof_span });
    }
    while indents.len() > 1 {
        indents.pop();
        out.push(Token { kind: TokenKind::Dedent, span: eof_span });
    }
    out.push(Token { kind: TokenKind::Eof, span: eof_span });
    let _ = filename;
    Ok(out)
}

fn leading_width(prefix: &str) -> u32 {
    prefix.chars().map(|c| if c == '\t' { 8 } else { 1 }).sum()
}

pub fn fstring_body(s: &str) -> Arc<str> {
    Arc::from(s)
}
