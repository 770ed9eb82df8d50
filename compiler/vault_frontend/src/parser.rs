//! Recursive-descent parser over the layout-aware token stream from
//! [`crate::lexer`], producing the shared `vault_ir::ast` tree.
//!
//! Scope-introducing nodes (`def`, `lambda`, `class`) get their `scope_id`
//! assigned here, in the same pre-order the parser discovers them in —
//! outer scope before any scope nested in its body. `crate::analyzer`
//! relies on that ordering to rebuild a `ScopeTree` whose ids line up with
//! the ones already baked into the AST.

use crate::lexer::{Raw, Token, TokenKind};
use std::sync::Arc;
use vault_diagnostic::{CompileError, Diagnostic};
use vault_ir::ast::*;
use vault_ir::{Name, Span};
use vault_stack::ensure_sufficient_stack;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    next_scope_id: u32,
    /// Simple statements already parsed off a `;`-joined line, waiting to
    /// be handed out one at a time by `statement()`.
    pending: std::collections::VecDeque<Stmt>,
}

type PResult<T> = Result<T, CompileError>;

pub fn parse(tokens: &[Token]) -> PResult<(Block, u32)> {
    let mut parser = Parser { tokens, pos: 0, next_scope_id: 0, pending: std::collections::VecDeque::new() };
    parser.skip_blank_lines();
    let body = parser.block_statements_until_eof()?;
    Ok((body, parser.next_scope_id))
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, raw: &Raw) -> bool {
        matches!(self.peek(), TokenKind::Raw(r) if r == raw)
    }

    fn at_kind(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, raw: &Raw) -> bool {
        if self.at(raw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_kind(&mut self, kind: &TokenKind) -> bool {
        if self.at_kind(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, raw: Raw, what: &str) -> PResult<Token> {
        if self.at(&raw) {
            Ok(self.advance())
        } else {
            self.err(format!("expected {what}"))
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.at_kind(&kind) {
            Ok(self.advance())
        } else {
            self.err(format!("expected {what}"))
        }
    }

    fn err<T>(&self, message: impl Into<String>) -> PResult<T> {
        Err(CompileError::from(Diagnostic::error(message).with_span(self.peek_span())))
    }

    fn skip_blank_lines(&mut self) {
        while self.at_kind(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn next_scope_id(&mut self) -> u32 {
        let id = self.next_scope_id;
        self.next_scope_id += 1;
        id
    }

    // ---- statements ---------------------------------------------------

    fn block_statements_until_eof(&mut self) -> PResult<Block> {
        let mut stmts = Vec::new();
        loop {
            self.skip_blank_lines();
            if self.at_kind(&TokenKind::Eof) {
                break;
            }
            stmts.push(self.statement()?);
        }
        Ok(Block { stmts })
    }

    /// An indented suite: `:` NEWLINE INDENT stmt+ DEDENT, or a single
    /// simple-statement line following the `:` on the same line.
    fn suite(&mut self) -> PResult<Block> {
        self.expect(Raw::Colon, "':'")?;
        if self.eat_kind(&TokenKind::Newline) {
            self.expect_kind(TokenKind::Indent, "an indented block")?;
            let mut stmts = Vec::new();
            loop {
                self.skip_blank_lines();
                if self.eat_kind(&TokenKind::Dedent) {
                    break;
                }
                stmts.push(self.statement()?);
            }
            Ok(Block { stmts })
        } else {
            let mut stmts = vec![self.simple_statement()?];
            while self.eat(&Raw::Semicolon) {
                if self.at_kind(&TokenKind::Newline) || self.at_kind(&TokenKind::Eof) {
                    break;
                }
                stmts.push(self.simple_statement()?);
            }
            self.eat_kind(&TokenKind::Newline);
            Ok(Block { stmts })
        }
    }

    fn statement(&mut self) -> PResult<Stmt> {
        if let Some(stmt) = self.pending.pop_front() {
            return Ok(stmt);
        }
        ensure_sufficient_stack(|| self.statement_inner())
    }

    fn statement_inner(&mut self) -> PResult<Stmt> {
        let start = self.peek_span();
        let decorators = self.decorators()?;
        if self.at(&Raw::Def) {
            return self.function_def(decorators, false);
        }
        if self.at(&Raw::Async) {
            let save = self.pos;
            self.advance();
            if self.at(&Raw::Def) {
                return self.function_def(decorators, true);
            }
            if self.at(&Raw::For) {
                return self.for_stmt(true);
            }
            if self.at(&Raw::With) {
                return self.with_stmt(true);
            }
            self.pos = save;
        }
        if self.at(&Raw::Class) {
            return self.class_def(decorators);
        }
        if !decorators.is_empty() {
            return self.err("decorators may only precede 'def' or 'class'");
        }
        match self.peek() {
            TokenKind::Raw(Raw::If) => self.if_stmt(),
            TokenKind::Raw(Raw::While) => self.while_stmt(),
            TokenKind::Raw(Raw::For) => self.for_stmt(false),
            TokenKind::Raw(Raw::Try) => self.try_stmt(),
            TokenKind::Raw(Raw::With) => self.with_stmt(false),
            TokenKind::Raw(Raw::Match) => self.match_stmt(),
            _ => {
                let block = self.simple_line()?;
                let _ = start;
                Ok(block)
            }
        }
    }

    fn decorators(&mut self) -> PResult<Vec<Expr>> {
        let mut decos = Vec::new();
        while self.at(&Raw::At) {
            self.advance();
            decos.push(self.expr()?);
            self.eat_kind(&TokenKind::Newline);
            self.skip_blank_lines();
        }
        Ok(decos)
    }

    fn simple_line(&mut self) -> PResult<Stmt> {
        let first = self.simple_statement()?;
        while self.eat(&Raw::Semicolon) {
            if self.at_kind(&TokenKind::Newline) || self.at_kind(&TokenKind::Eof) {
                break;
            }
            let stmt = self.simple_statement()?;
            self.pending.push_back(stmt);
        }
        self.eat_kind(&TokenKind::Newline);
        Ok(first)
    }

    fn simple_statement(&mut self) -> PResult<Stmt> {
        let span = self.peek_span();
        let kind = match self.peek().clone() {
            TokenKind::Raw(Raw::Pass) => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Raw(Raw::Break) => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Raw(Raw::Continue) => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Raw(Raw::Return) => {
                self.advance();
                let value = if self.stmt_ends() { None } else { Some(self.expr_list()?) };
                StmtKind::Return(value)
            }
            TokenKind::Raw(Raw::Del) => {
                self.advance();
                let mut targets = vec![self.expr()?];
                while self.eat(&Raw::Comma) {
                    if self.stmt_ends() {
                        break;
                    }
                    targets.push(self.expr()?);
                }
                StmtKind::Delete(targets)
            }
            TokenKind::Raw(Raw::Raise) => {
                self.advance();
                if self.stmt_ends() {
                    StmtKind::Raise { exc: None, cause: None }
                } else {
                    let exc = self.expr()?;
                    let cause = if self.eat(&Raw::From) { Some(self.expr()?) } else { None };
                    StmtKind::Raise { exc: Some(exc), cause }
                }
            }
            TokenKind::Raw(Raw::Assert) => {
                self.advance();
                let test = self.expr()?;
                let msg = if self.eat(&Raw::Comma) { Some(self.expr()?) } else { None };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Raw(Raw::Global) => {
                self.advance();
                StmtKind::Global(self.name_list()?)
            }
            TokenKind::Raw(Raw::Nonlocal) => {
                self.advance();
                StmtKind::Nonlocal(self.name_list()?)
            }
            TokenKind::Raw(Raw::Import) => return self.import_stmt(),
            TokenKind::Raw(Raw::From) => return self.import_from_stmt(),
            TokenKind::Raw(Raw::Type) => return self.type_alias_stmt(),
            _ => return self.expr_or_assign_stmt(),
        };
        Ok(Stmt { kind, span })
    }

    fn stmt_ends(&self) -> bool {
        self.at_kind(&TokenKind::Newline) || self.at(&Raw::Semicolon) || self.at_kind(&TokenKind::Eof)
    }

    fn name_list(&mut self) -> PResult<Vec<Name>> {
        let mut names = vec![self.ident()?];
        while self.eat(&Raw::Comma) {
            names.push(self.ident()?);
        }
        Ok(names)
    }

    fn ident(&mut self) -> PResult<Name> {
        if let TokenKind::Raw(Raw::Ident(s)) = self.peek().clone() {
            self.advance();
            Ok(Name::new(&s))
        } else {
            self.err("expected an identifier")
        }
    }

    fn import_stmt(&mut self) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance();
        let mut names = vec![self.import_alias()?];
        while self.eat(&Raw::Comma) {
            names.push(self.import_alias()?);
        }
        self.eat_kind(&TokenKind::Newline);
        Ok(Stmt { kind: StmtKind::Import(names), span })
    }

    fn import_alias(&mut self) -> PResult<ImportAlias> {
        let mut dotted = self.ident()?.as_str().to_owned();
        while self.eat(&Raw::Dot) {
            dotted.push('.');
            dotted.push_str(self.ident()?.as_str());
        }
        let asname = if self.eat(&Raw::As) { Some(self.ident()?) } else { None };
        Ok(ImportAlias { name: Name::new(&dotted), asname })
    }

    fn import_from_stmt(&mut self) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance();
        let mut level = 0u32;
        while self.eat(&Raw::Dot) {
            level += 1;
        }
        while self.eat(&Raw::Ellipsis) {
            level += 3;
        }
        let module = if self.at(&Raw::Import) { None } else {
            let mut dotted = self.ident()?.as_str().to_owned();
            while self.eat(&Raw::Dot) {
                dotted.push('.');
                dotted.push_str(self.ident()?.as_str());
            }
            Some(Name::new(&dotted))
        };
        self.expect(Raw::Import, "'import'")?;
        let names = if self.eat(&Raw::Star) {
            vec![ImportAlias { name: Name::new("*"), asname: None }]
        } else if self.eat(&Raw::LParen) {
            let mut items = vec![self.import_from_alias()?];
            while self.eat(&Raw::Comma) {
                if self.at(&Raw::RParen) {
                    break;
                }
                items.push(self.import_from_alias()?);
            }
            self.expect(Raw::RParen, "')'")?;
            items
        } else {
            let mut items = vec![self.import_from_alias()?];
            while self.eat(&Raw::Comma) {
                items.push(self.import_from_alias()?);
            }
            items
        };
        self.eat_kind(&TokenKind::Newline);
        Ok(Stmt { kind: StmtKind::ImportFrom { module, level, names }, span })
    }

    fn import_from_alias(&mut self) -> PResult<ImportAlias> {
        let name = self.ident()?;
        let asname = if self.eat(&Raw::As) { Some(self.ident()?) } else { None };
        Ok(ImportAlias { name, asname })
    }

    fn type_alias_stmt(&mut self) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance();
        let name = self.ident()?;
        let type_params = self.type_params()?;
        self.expect(Raw::Eq, "'='")?;
        let value = self.expr()?;
        self.eat_kind(&TokenKind::Newline);
        Ok(Stmt { kind: StmtKind::TypeAlias { name, type_params, value }, span })
    }

    fn type_params(&mut self) -> PResult<Vec<TypeParam>> {
        if !self.eat(&Raw::LBracket) {
            return Ok(Vec::new());
        }
        let mut params = vec![self.type_param()?];
        while self.eat(&Raw::Comma) {
            if self.at(&Raw::RBracket) {
                break;
            }
            params.push(self.type_param()?);
        }
        self.expect(Raw::RBracket, "']'")?;
        Ok(params)
    }

    fn type_param(&mut self) -> PResult<TypeParam> {
        let name = self.ident()?;
        let bound = if self.eat(&Raw::Colon) { Some(self.expr()?) } else { None };
        Ok(TypeParam { name, bound })
    }

    fn expr_or_assign_stmt(&mut self) -> PResult<Stmt> {
        let span = self.peek_span();
        let first = self.expr_list()?;

        if self.at(&Raw::Colon) {
            self.advance();
            let annotation = self.expr()?;
            let value = if self.eat(&Raw::Eq) { Some(self.expr_list()?) } else { None };
            self.eat_kind(&TokenKind::Newline);
            return Ok(Stmt {
                kind: StmtKind::AnnAssign { target: Box::new(first), annotation: Box::new(annotation), value },
                span,
            });
        }

        if let Some(op) = self.aug_assign_op() {
            self.advance();
            let value = self.expr_list()?;
            self.eat_kind(&TokenKind::Newline);
            return Ok(Stmt { kind: StmtKind::AugAssign { target: Box::new(first), op, value }, span });
        }

        if self.eat(&Raw::Eq) {
            let mut targets = vec![first];
            let mut value = self.expr_list()?;
            while self.eat(&Raw::Eq) {
                targets.push(value);
                value = self.expr_list()?;
            }
            self.eat_kind(&TokenKind::Newline);
            return Ok(Stmt { kind: StmtKind::Assign { targets, value }, span });
        }

        self.eat_kind(&TokenKind::Newline);
        Ok(Stmt { kind: StmtKind::Expr(first), span })
    }

    fn aug_assign_op(&self) -> Option<BinOpKind> {
        let TokenKind::Raw(raw) = self.peek() else { return None };
        Some(match raw {
            Raw::PlusAssign => BinOpKind::Add,
            Raw::MinusAssign => BinOpKind::Sub,
            Raw::StarAssign => BinOpKind::Mul,
            Raw::SlashAssign => BinOpKind::Div,
            Raw::FloorDivAssign => BinOpKind::FloorDiv,
            Raw::PercentAssign => BinOpKind::Mod,
            Raw::PowAssign => BinOpKind::Pow,
            Raw::LShiftAssign => BinOpKind::LShift,
            Raw::RShiftAssign => BinOpKind::RShift,
            Raw::AmpAssign => BinOpKind::BitAnd,
            Raw::PipeAssign => BinOpKind::BitOr,
            Raw::CaretAssign => BinOpKind::BitXor,
            _ => return None,
        })
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance();
        let test = self.expr()?;
        let body = self.suite()?;
        let orelse = if self.at(&Raw::Elif) {
            Block { stmts: vec![self.if_stmt_as_elif()?] }
        } else if self.eat(&Raw::Else) {
            self.suite()?
        } else {
            Block { stmts: Vec::new() }
        };
        Ok(Stmt { kind: StmtKind::If { test, body, orelse }, span })
    }

    fn if_stmt_as_elif(&mut self) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance(); // consume `elif` as if it were `if`
        let test = self.expr()?;
        let body = self.suite()?;
        let orelse = if self.at(&Raw::Elif) {
            Block { stmts: vec![self.if_stmt_as_elif()?] }
        } else if self.eat(&Raw::Else) {
            self.suite()?
        } else {
            Block { stmts: Vec::new() }
        };
        Ok(Stmt { kind: StmtKind::If { test, body, orelse }, span })
    }

    fn while_stmt(&mut self) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance();
        let test = self.expr()?;
        let body = self.suite()?;
        let orelse = if self.eat(&Raw::Else) { self.suite()? } else { Block { stmts: Vec::new() } };
        Ok(Stmt { kind: StmtKind::While { test, body, orelse }, span })
    }

    fn for_stmt(&mut self, is_async: bool) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance();
        let target = self.target_list()?;
        self.expect(Raw::In, "'in'")?;
        let iter = self.expr_list()?;
        let body = self.suite()?;
        let orelse = if self.eat(&Raw::Else) { self.suite()? } else { Block { stmts: Vec::new() } };
        Ok(Stmt { kind: StmtKind::For { target, iter, body, orelse, is_async }, span })
    }

    fn with_stmt(&mut self, is_async: bool) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance();
        let parenthesized = self.eat(&Raw::LParen);
        let mut items = vec![self.with_item()?];
        while self.eat(&Raw::Comma) {
            if parenthesized && self.at(&Raw::RParen) {
                break;
            }
            items.push(self.with_item()?);
        }
        if parenthesized {
            self.expect(Raw::RParen, "')'")?;
        }
        let body = self.suite()?;
        Ok(Stmt { kind: StmtKind::With { items, body, is_async }, span })
    }

    fn with_item(&mut self) -> PResult<WithItem> {
        let context_expr = self.expr()?;
        let optional_vars = if self.eat(&Raw::As) { Some(self.target()?) } else { None };
        Ok(WithItem { context_expr, optional_vars })
    }

    fn try_stmt(&mut self) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance();
        let body = self.suite()?;
        let mut handlers = Vec::new();
        let mut is_star = false;
        while self.at(&Raw::Except) {
            let hspan = self.peek_span();
            self.advance();
            if self.eat(&Raw::Star) {
                is_star = true;
            }
            let kind = if self.at(&Raw::Colon) { None } else { Some(self.expr()?) };
            let name = if self.eat(&Raw::As) { Some(self.ident()?) } else { None };
            let hbody = self.suite()?;
            handlers.push(ExceptHandler { kind, name, body: hbody, span: hspan });
        }
        let orelse = if self.eat(&Raw::Else) { self.suite()? } else { Block { stmts: Vec::new() } };
        let finalbody = if self.eat(&Raw::Finally) { self.suite()? } else { Block { stmts: Vec::new() } };
        Ok(Stmt { kind: StmtKind::Try { body, handlers, orelse, finalbody, is_star }, span })
    }

    fn match_stmt(&mut self) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance();
        let subject = self.expr_list()?;
        self.expect(Raw::Colon, "':'")?;
        self.expect_kind(TokenKind::Newline, "newline")?;
        self.expect_kind(TokenKind::Indent, "an indented block of 'case' clauses")?;
        let mut cases = Vec::new();
        loop {
            self.skip_blank_lines();
            if self.eat_kind(&TokenKind::Dedent) {
                break;
            }
            self.expect(Raw::Case, "'case'")?;
            let pattern = self.pattern()?;
            let guard = if self.eat(&Raw::If) { Some(self.expr()?) } else { None };
            let body = self.suite()?;
            cases.push(MatchCase { pattern, guard, body });
        }
        Ok(Stmt { kind: StmtKind::Match { subject, cases }, span })
    }

    fn pattern(&mut self) -> PResult<Pattern> {
        let first = self.pattern_atom()?;
        if self.at(&Raw::Pipe) {
            let mut alts = vec![first];
            while self.eat(&Raw::Pipe) {
                alts.push(self.pattern_atom()?);
            }
            return Ok(Pattern::MatchOr(alts));
        }
        if self.eat(&Raw::As) {
            let name = self.ident()?;
            return Ok(Pattern::MatchAs { pattern: Some(Box::new(first)), name: Some(name) });
        }
        Ok(first)
    }

    fn pattern_atom(&mut self) -> PResult<Pattern> {
        match self.peek().clone() {
            TokenKind::Raw(Raw::Ident(name)) if name == "_" => {
                self.advance();
                Ok(Pattern::MatchAs { pattern: None, name: None })
            }
            TokenKind::Raw(Raw::Star) => {
                self.advance();
                if let TokenKind::Raw(Raw::Ident(name)) = self.peek().clone() {
                    if name != "_" {
                        self.advance();
                        return Ok(Pattern::MatchStar(Some(Name::new(&name))));
                    }
                    self.advance();
                }
                Ok(Pattern::MatchStar(None))
            }
            TokenKind::Raw(Raw::None_) => {
                self.advance();
                Ok(Pattern::MatchSingleton(Constant::None))
            }
            TokenKind::Raw(Raw::True_) => {
                self.advance();
                Ok(Pattern::MatchSingleton(Constant::Bool(true)))
            }
            TokenKind::Raw(Raw::False_) => {
                self.advance();
                Ok(Pattern::MatchSingleton(Constant::Bool(false)))
            }
            TokenKind::Raw(Raw::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                if !self.at(&Raw::RBracket) {
                    items.push(self.pattern()?);
                    while self.eat(&Raw::Comma) {
                        if self.at(&Raw::RBracket) {
                            break;
                        }
                        items.push(self.pattern()?);
                    }
                }
                self.expect(Raw::RBracket, "']'")?;
                Ok(Pattern::MatchSequence(items))
            }
            TokenKind::Raw(Raw::LBrace) => {
                self.advance();
                let mut keys = Vec::new();
                let mut patterns = Vec::new();
                let mut rest = None;
                if !self.at(&Raw::RBrace) {
                    self.mapping_pattern_item(&mut keys, &mut patterns, &mut rest)?;
                    while self.eat(&Raw::Comma) {
                        if self.at(&Raw::RBrace) {
                            break;
                        }
                        self.mapping_pattern_item(&mut keys, &mut patterns, &mut rest)?;
                    }
                }
                self.expect(Raw::RBrace, "'}'")?;
                Ok(Pattern::MatchMapping { keys, patterns, rest })
            }
            TokenKind::Raw(Raw::Ident(_)) => {
                let value = self.postfix_expr()?;
                if self.at(&Raw::LParen) {
                    self.advance();
                    let mut patterns = Vec::new();
                    let mut kwd_names = Vec::new();
                    let mut kwd_patterns = Vec::new();
                    while !self.at(&Raw::RParen) {
                        if let TokenKind::Raw(Raw::Ident(name)) = self.peek().clone() {
                            let save = self.pos;
                            self.advance();
                            if self.eat(&Raw::Eq) {
                                kwd_names.push(Name::new(&name));
                                kwd_patterns.push(self.pattern()?);
                            } else {
                                self.pos = save;
                                patterns.push(self.pattern()?);
                            }
                        } else {
                            patterns.push(self.pattern()?);
                        }
                        if !self.eat(&Raw::Comma) {
                            break;
                        }
                    }
                    self.expect(Raw::RParen, "')'")?;
                    return Ok(Pattern::MatchClass { cls: value, patterns, kwd_names, kwd_patterns });
                }
                Ok(Pattern::MatchValue(value))
            }
            _ => {
                let value = self.or_expr()?;
                Ok(Pattern::MatchValue(value))
            }
        }
    }

    fn mapping_pattern_item(
        &mut self,
        keys: &mut Vec<Expr>,
        patterns: &mut Vec<Pattern>,
        rest: &mut Option<Name>,
    ) -> PResult<()> {
        if self.eat(&Raw::Pow) {
            *rest = Some(self.ident()?);
            return Ok(());
        }
        let key = self.or_expr()?;
        self.expect(Raw::Colon, "':'")?;
        let pattern = self.pattern()?;
        keys.push(key);
        patterns.push(pattern);
        Ok(())
    }

    // ---- def/class ------------------------------------------------------

    fn function_def(&mut self, decorators: Vec<Expr>, is_async: bool) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance(); // `def`
        let scope_id = self.next_scope_id();
        let name = self.ident()?;
        let type_params = self.type_params()?;
        self.expect(Raw::LParen, "'('")?;
        let params = self.params(Raw::RParen)?;
        self.expect(Raw::RParen, "')'")?;
        let returns = if self.eat(&Raw::Arrow) { Some(self.expr()?) } else { None };
        let body = self.suite()?;
        let is_generator = block_contains_yield(&body);
        let def = FunctionDef { name, params, body, decorators, returns, type_params, is_async, is_generator, span, scope_id };
        Ok(Stmt { kind: StmtKind::FunctionDef(Arc::new(def)), span })
    }

    fn params(&mut self, end: Raw) -> PResult<Params> {
        let mut params = Params::default();
        let mut seen_star = false;
        let mut seen_slash = false;
        loop {
            if self.at(&end) {
                break;
            }
            if self.eat(&Raw::Slash) {
                seen_slash = true;
                params.posonly = std::mem::take(&mut params.args);
                if !self.eat(&Raw::Comma) {
                    break;
                }
                continue;
            }
            if self.eat(&Raw::Star) {
                if self.at(&Raw::Comma) || self.at(&end) {
                    seen_star = true;
                } else {
                    let p = self.param()?;
                    params.vararg = Some(p);
                    seen_star = true;
                }
                if !self.eat(&Raw::Comma) {
                    break;
                }
                continue;
            }
            if self.eat(&Raw::Pow) {
                params.kwarg = Some(self.param()?);
                self.eat(&Raw::Comma);
                break;
            }
            let p = self.param()?;
            if seen_star {
                params.kwonly.push(p);
            } else {
                params.args.push(p);
            }
            if !self.eat(&Raw::Comma) {
                break;
            }
        }
        let _ = seen_slash;
        Ok(params)
    }

    fn param(&mut self) -> PResult<Param> {
        let span = self.peek_span();
        let name = self.ident()?;
        let annotation = if self.eat(&Raw::Colon) { Some(self.expr()?) } else { None };
        let default = if self.eat(&Raw::Eq) { Some(self.expr()?) } else { None };
        Ok(Param { name, default, annotation, span })
    }

    fn class_def(&mut self, decorators: Vec<Expr>) -> PResult<Stmt> {
        let span = self.peek_span();
        self.advance(); // `class`
        let scope_id = self.next_scope_id();
        let name = self.ident()?;
        let type_params = self.type_params()?;
        let mut bases = Vec::new();
        let mut keywords = Vec::new();
        if self.eat(&Raw::LParen) {
            while !self.at(&Raw::RParen) {
                if let TokenKind::Raw(Raw::Ident(id)) = self.peek().clone() {
                    let save = self.pos;
                    self.advance();
                    if self.eat(&Raw::Eq) {
                        let value = self.expr()?;
                        keywords.push(Keyword { name: Some(Name::new(&id)), value });
                        if !self.eat(&Raw::Comma) {
                            break;
                        }
                        continue;
                    }
                    self.pos = save;
                }
                bases.push(self.expr()?);
                if !self.eat(&Raw::Comma) {
                    break;
                }
            }
            self.expect(Raw::RParen, "')'")?;
        }
        let body = self.suite()?;
        let def = ClassDef { name, bases, keywords, body, decorators, type_params, span, scope_id };
        Ok(Stmt { kind: StmtKind::ClassDef(Arc::new(def)), span })
    }

    // ---- targets --------------------------------------------------------

    fn target_list(&mut self) -> PResult<Expr> {
        let first = self.target()?;
        if self.at(&Raw::Comma) {
            let mut items = vec![first];
            while self.eat(&Raw::Comma) {
                if self.at(&Raw::In) {
                    break;
                }
                items.push(self.target()?);
            }
            let span = items[0].span;
            return Ok(Expr { span, kind: Box::new(ExprKind::Tuple(items)) });
        }
        Ok(first)
    }

    fn target(&mut self) -> PResult<Expr> {
        if self.eat(&Raw::Star) {
            let inner = self.target()?;
            let span = inner.span;
            return Ok(Expr { span, kind: Box::new(ExprKind::Starred(Box::new(inner))) });
        }
        self.postfix_expr()
    }

    // ---- expressions ------------------------------------------------------

    fn expr_list(&mut self) -> PResult<Expr> {
        let first = self.star_expr()?;
        if self.at(&Raw::Comma) {
            let span = first.span;
            let mut items = vec![first];
            while self.eat(&Raw::Comma) {
                if self.stmt_ends() || self.at(&Raw::Eq) || self.at(&Raw::Colon) {
                    break;
                }
                items.push(self.star_expr()?);
            }
            return Ok(Expr { span, kind: Box::new(ExprKind::Tuple(items)) });
        }
        Ok(first)
    }

    fn star_expr(&mut self) -> PResult<Expr> {
        if self.at(&Raw::Star) {
            let span = self.peek_span();
            self.advance();
            let inner = self.or_expr()?;
            return Ok(Expr { span, kind: Box::new(ExprKind::Starred(Box::new(inner))) });
        }
        self.expr()
    }

    pub fn expr(&mut self) -> PResult<Expr> {
        ensure_sufficient_stack(|| self.expr_inner())
    }

    fn expr_inner(&mut self) -> PResult<Expr> {
        if self.at(&Raw::Lambda) {
            return self.lambda_expr();
        }
        let span = self.peek_span();
        let test = self.or_test()?;
        if self.eat(&Raw::If) {
            let cond = self.or_test()?;
            self.expect(Raw::Else, "'else'")?;
            let orelse = self.expr()?;
            return Ok(Expr {
                span,
                kind: Box::new(ExprKind::IfExp { test: Box::new(cond), body: Box::new(test), orelse: Box::new(orelse) }),
            });
        }
        if let ExprKind::Name(name) = *test.kind.clone() {
            if self.eat(&Raw::Walrus) {
                let value = self.expr()?;
                return Ok(Expr { span, kind: Box::new(ExprKind::NamedExpr { target: name, value: Box::new(value) }) });
            }
        }
        Ok(test)
    }

    fn lambda_expr(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        self.advance();
        let scope_id = self.next_scope_id();
        let params = self.params(Raw::Colon)?;
        self.expect(Raw::Colon, "':'")?;
        let value = self.expr()?;
        let body = Block { stmts: vec![Stmt { span: value.span, kind: StmtKind::Return(Some(value)) }] };
        let def = FunctionDef {
            name: Name::new("<lambda>"),
            params,
            body,
            decorators: Vec::new(),
            returns: None,
            type_params: Vec::new(),
            is_async: false,
            is_generator: false,
            span,
            scope_id,
        };
        Ok(Expr { span, kind: Box::new(ExprKind::Lambda(Arc::new(def))) })
    }

    fn or_test(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        let mut values = vec![self.and_test()?];
        while self.eat(&Raw::Or) {
            values.push(self.and_test()?);
        }
        if values.len() == 1 {
            return Ok(values.pop().unwrap());
        }
        Ok(Expr { span, kind: Box::new(ExprKind::BoolOp { op: BoolOpKind::Or, values }) })
    }

    fn and_test(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        let mut values = vec![self.not_test()?];
        while self.eat(&Raw::And) {
            values.push(self.not_test()?);
        }
        if values.len() == 1 {
            return Ok(values.pop().unwrap());
        }
        Ok(Expr { span, kind: Box::new(ExprKind::BoolOp { op: BoolOpKind::And, values }) })
    }

    fn not_test(&mut self) -> PResult<Expr> {
        if self.eat(&Raw::Not) {
            let span = self.peek_span();
            let operand = self.not_test()?;
            return Ok(Expr { span, kind: Box::new(ExprKind::UnaryOp { op: UnaryOpKind::Not, operand: Box::new(operand) }) });
        }
        self.comparison()
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        self.comparison()
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        let left = self.bit_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Raw(Raw::EqEq) => CmpOpKind::Eq,
                TokenKind::Raw(Raw::NotEq) => CmpOpKind::NotEq,
                TokenKind::Raw(Raw::Lt) => CmpOpKind::Lt,
                TokenKind::Raw(Raw::LtE) => CmpOpKind::LtE,
                TokenKind::Raw(Raw::Gt) => CmpOpKind::Gt,
                TokenKind::Raw(Raw::GtE) => CmpOpKind::GtE,
                TokenKind::Raw(Raw::In) => CmpOpKind::In,
                TokenKind::Raw(Raw::Is) => {
                    let save = self.pos;
                    self.advance();
                    if self.eat(&Raw::Not) {
                        ops.push(CmpOpKind::IsNot);
                        comparators.push(self.bit_or()?);
                        continue;
                    }
                    self.pos = save;
                    CmpOpKind::Is
                }
                TokenKind::Raw(Raw::Not) => {
                    let save = self.pos;
                    self.advance();
                    if self.eat(&Raw::In) {
                        ops.push(CmpOpKind::NotIn);
                        comparators.push(self.bit_or()?);
                        continue;
                    }
                    self.pos = save;
                    break;
                }
                _ => break,
            };
            self.advance();
            ops.push(op);
            comparators.push(self.bit_or()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr { span, kind: Box::new(ExprKind::Compare { left: Box::new(left), ops, comparators }) })
    }

    fn bit_or(&mut self) -> PResult<Expr> {
        self.left_assoc_binop(&[(Raw::Pipe, BinOpKind::BitOr)], Self::bit_xor)
    }
    fn bit_xor(&mut self) -> PResult<Expr> {
        self.left_assoc_binop(&[(Raw::Caret, BinOpKind::BitXor)], Self::bit_and)
    }
    fn bit_and(&mut self) -> PResult<Expr> {
        self.left_assoc_binop(&[(Raw::Amp, BinOpKind::BitAnd)], Self::shift)
    }
    fn shift(&mut self) -> PResult<Expr> {
        self.left_assoc_binop(&[(Raw::LShift, BinOpKind::LShift), (Raw::RShift, BinOpKind::RShift)], Self::arith)
    }
    fn arith(&mut self) -> PResult<Expr> {
        self.left_assoc_binop(&[(Raw::Plus, BinOpKind::Add), (Raw::Minus, BinOpKind::Sub)], Self::term)
    }
    fn term(&mut self) -> PResult<Expr> {
        self.left_assoc_binop(
            &[
                (Raw::Star, BinOpKind::Mul),
                (Raw::Slash, BinOpKind::Div),
                (Raw::FloorDiv, BinOpKind::FloorDiv),
                (Raw::Percent, BinOpKind::Mod),
                (Raw::At, BinOpKind::MatMul),
            ],
            Self::factor,
        )
    }

    fn left_assoc_binop(
        &mut self,
        ops: &[(Raw, BinOpKind)],
        mut next: impl FnMut(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let span = self.peek_span();
        let mut left = next(self)?;
        loop {
            let Some((_, op)) = ops.iter().find(|(raw, _)| self.at(raw)) else { break };
            let op = *op;
            self.advance();
            let right = next(self)?;
            left = Expr { span, kind: Box::new(ExprKind::BinOp { left: Box::new(left), op, right: Box::new(right) }) };
        }
        Ok(left)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        let op = match self.peek() {
            TokenKind::Raw(Raw::Plus) => Some(UnaryOpKind::Pos),
            TokenKind::Raw(Raw::Minus) => Some(UnaryOpKind::Neg),
            TokenKind::Raw(Raw::Tilde) => Some(UnaryOpKind::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.factor()?;
            return Ok(Expr { span, kind: Box::new(ExprKind::UnaryOp { op, operand: Box::new(operand) }) });
        }
        self.power()
    }

    fn power(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        let base = self.await_expr()?;
        if self.eat(&Raw::Pow) {
            let exponent = self.factor()?;
            return Ok(Expr { span, kind: Box::new(ExprKind::BinOp { left: Box::new(base), op: BinOpKind::Pow, right: Box::new(exponent) }) });
        }
        Ok(base)
    }

    fn await_expr(&mut self) -> PResult<Expr> {
        if self.eat(&Raw::Await) {
            let span = self.peek_span();
            let inner = self.postfix_expr()?;
            return Ok(Expr { span, kind: Box::new(ExprKind::Await(Box::new(inner))) });
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat(&Raw::Dot) {
                let attr = self.ident()?;
                let span = expr.span;
                expr = Expr { span, kind: Box::new(ExprKind::Attribute { value: Box::new(expr), attr }) };
            } else if self.at(&Raw::LParen) {
                let span = expr.span;
                self.advance();
                let (args, keywords) = self.call_args()?;
                self.expect(Raw::RParen, "')'")?;
                expr = Expr { span, kind: Box::new(ExprKind::Call { func: Box::new(expr), args, keywords }) };
            } else if self.at(&Raw::LBracket) {
                let span = expr.span;
                self.advance();
                let slice = self.subscript_body()?;
                self.expect(Raw::RBracket, "']'")?;
                expr = Expr { span, kind: Box::new(ExprKind::Subscript { value: Box::new(expr), slice: Box::new(slice) }) };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> PResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.at(&Raw::RParen) {
            if self.eat(&Raw::Star) {
                let value = self.expr()?;
                let span = value.span;
                args.push(Expr { span, kind: Box::new(ExprKind::Starred(Box::new(value))) });
            } else if self.eat(&Raw::Pow) {
                let value = self.expr()?;
                keywords.push(Keyword { name: None, value });
            } else if let TokenKind::Raw(Raw::Ident(name)) = self.peek().clone() {
                let save = self.pos;
                self.advance();
                if self.eat(&Raw::Eq) {
                    let value = self.expr()?;
                    keywords.push(Keyword { name: Some(Name::new(&name)), value });
                } else {
                    self.pos = save;
                    args.push(self.expr()?);
                }
            } else {
                args.push(self.expr()?);
                if self.at(&Raw::For) {
                    let element = args.pop().unwrap();
                    let generators = self.comprehensions()?;
                    let span = element.span;
                    return Ok((
                        vec![Expr { span, kind: Box::new(ExprKind::GeneratorExp { element: Box::new(element), generators }) }],
                        Vec::new(),
                    ));
                }
            }
            if !self.eat(&Raw::Comma) {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn subscript_body(&mut self) -> PResult<Expr> {
        let first = self.slice_item()?;
        if self.at(&Raw::Comma) {
            let span = first.span;
            let mut items = vec![first];
            while self.eat(&Raw::Comma) {
                if self.at(&Raw::RBracket) {
                    break;
                }
                items.push(self.slice_item()?);
            }
            return Ok(Expr { span, kind: Box::new(ExprKind::Tuple(items)) });
        }
        Ok(first)
    }

    fn slice_item(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        let lower = if self.at(&Raw::Colon) { None } else { Some(Box::new(self.expr()?)) };
        if !self.eat(&Raw::Colon) {
            return Ok(*lower.expect("checked above"));
        }
        let upper = if self.at(&Raw::Colon) || self.at(&Raw::RBracket) || self.at(&Raw::Comma) {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let step = if self.eat(&Raw::Colon) {
            if self.at(&Raw::RBracket) || self.at(&Raw::Comma) { None } else { Some(Box::new(self.expr()?)) }
        } else {
            None
        };
        Ok(Expr { span, kind: Box::new(ExprKind::Slice { lower, upper, step }) })
    }

    fn comprehensions(&mut self) -> PResult<Vec<Comprehension>> {
        let mut gens = Vec::new();
        while self.at(&Raw::For) || self.at(&Raw::Async) {
            let is_async = self.eat(&Raw::Async);
            self.expect(Raw::For, "'for'")?;
            let target = self.target_list()?;
            self.expect(Raw::In, "'in'")?;
            let iter = self.or_test()?;
            let mut ifs = Vec::new();
            while self.eat(&Raw::If) {
                ifs.push(self.or_test()?);
            }
            gens.push(Comprehension { target, iter, ifs, is_async });
        }
        Ok(gens)
    }

    fn atom(&mut self) -> PResult<Expr> {
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::Raw(Raw::Int(i)) => {
                self.advance();
                Ok(Expr { span, kind: Box::new(ExprKind::Constant(Constant::Int(i))) })
            }
            TokenKind::Raw(Raw::Float(f)) => {
                self.advance();
                Ok(Expr { span, kind: Box::new(ExprKind::Constant(Constant::Float(f))) })
            }
            TokenKind::Raw(Raw::Str(s)) => {
                self.advance();
                let mut combined = s;
                while let TokenKind::Raw(Raw::Str(more)) = self.peek().clone() {
                    self.advance();
                    combined.push_str(&more);
                }
                Ok(Expr { span, kind: Box::new(ExprKind::Constant(Constant::Str(Arc::from(combined)))) })
            }
            TokenKind::Raw(Raw::Bytes(b)) => {
                self.advance();
                Ok(Expr { span, kind: Box::new(ExprKind::Constant(Constant::Bytes(Arc::from(b)))) })
            }
            TokenKind::Raw(Raw::FString(raw)) => {
                self.advance();
                self.fstring(span, &raw)
            }
            TokenKind::Raw(Raw::None_) => {
                self.advance();
                Ok(Expr { span, kind: Box::new(ExprKind::Constant(Constant::None)) })
            }
            TokenKind::Raw(Raw::True_) => {
                self.advance();
                Ok(Expr { span, kind: Box::new(ExprKind::Constant(Constant::Bool(true))) })
            }
            TokenKind::Raw(Raw::False_) => {
                self.advance();
                Ok(Expr { span, kind: Box::new(ExprKind::Constant(Constant::Bool(false))) })
            }
            TokenKind::Raw(Raw::Ellipsis) => {
                self.advance();
                Ok(Expr { span, kind: Box::new(ExprKind::Constant(Constant::Ellipsis)) })
            }
            TokenKind::Raw(Raw::Ident(s)) => {
                self.advance();
                Ok(Expr { span, kind: Box::new(ExprKind::Name(Name::new(&s))) })
            }
            TokenKind::Raw(Raw::Yield) => {
                self.advance();
                if self.eat(&Raw::From) {
                    let value = self.expr()?;
                    return Ok(Expr { span, kind: Box::new(ExprKind::YieldFrom(Box::new(value))) });
                }
                let value =
                    if self.stmt_ends() || self.at(&Raw::RParen) || self.at(&Raw::RBracket) { None } else { Some(Box::new(self.expr_list()?)) };
                Ok(Expr { span, kind: Box::new(ExprKind::Yield(value)) })
            }
            TokenKind::Raw(Raw::LParen) => {
                self.advance();
                if self.eat(&Raw::RParen) {
                    return Ok(Expr { span, kind: Box::new(ExprKind::Tuple(Vec::new())) });
                }
                let first = self.star_expr()?;
                if self.at(&Raw::For) {
                    let generators = self.comprehensions()?;
                    self.expect(Raw::RParen, "')'")?;
                    return Ok(Expr { span, kind: Box::new(ExprKind::GeneratorExp { element: Box::new(first), generators }) });
                }
                if self.at(&Raw::Comma) {
                    let mut items = vec![first];
                    while self.eat(&Raw::Comma) {
                        if self.at(&Raw::RParen) {
                            break;
                        }
                        items.push(self.star_expr()?);
                    }
                    self.expect(Raw::RParen, "')'")?;
                    return Ok(Expr { span, kind: Box::new(ExprKind::Tuple(items)) });
                }
                self.expect(Raw::RParen, "')'")?;
                Ok(first)
            }
            TokenKind::Raw(Raw::LBracket) => {
                self.advance();
                if self.eat(&Raw::RBracket) {
                    return Ok(Expr { span, kind: Box::new(ExprKind::List(Vec::new())) });
                }
                let first = self.star_expr()?;
                if self.at(&Raw::For) {
                    let generators = self.comprehensions()?;
                    self.expect(Raw::RBracket, "']'")?;
                    return Ok(Expr { span, kind: Box::new(ExprKind::ListComp { element: Box::new(first), generators }) });
                }
                let mut items = vec![first];
                while self.eat(&Raw::Comma) {
                    if self.at(&Raw::RBracket) {
                        break;
                    }
                    items.push(self.star_expr()?);
                }
                self.expect(Raw::RBracket, "']'")?;
                Ok(Expr { span, kind: Box::new(ExprKind::List(items)) })
            }
            TokenKind::Raw(Raw::LBrace) => self.brace_atom(span),
            _ => self.err("expected an expression"),
        }
    }

    fn brace_atom(&mut self, span: Span) -> PResult<Expr> {
        self.advance();
        if self.eat(&Raw::RBrace) {
            return Ok(Expr { span, kind: Box::new(ExprKind::Dict { keys: Vec::new(), values: Vec::new() }) });
        }
        if self.eat(&Raw::Pow) {
            let value = self.or_expr()?;
            let mut keys = vec![None];
            let mut values = vec![value];
            while self.eat(&Raw::Comma) {
                if self.at(&Raw::RBrace) {
                    break;
                }
                self.dict_item(&mut keys, &mut values)?;
            }
            self.expect(Raw::RBrace, "'}'")?;
            return Ok(Expr { span, kind: Box::new(ExprKind::Dict { keys, values }) });
        }
        let first = self.star_expr()?;
        if self.eat(&Raw::Colon) {
            let value = self.expr()?;
            if self.at(&Raw::For) {
                let generators = self.comprehensions()?;
                self.expect(Raw::RBrace, "'}'")?;
                return Ok(Expr {
                    span,
                    kind: Box::new(ExprKind::DictComp { key: Box::new(first), value: Box::new(value), generators }),
                });
            }
            let mut keys = vec![Some(first)];
            let mut values = vec![value];
            while self.eat(&Raw::Comma) {
                if self.at(&Raw::RBrace) {
                    break;
                }
                self.dict_item(&mut keys, &mut values)?;
            }
            self.expect(Raw::RBrace, "'}'")?;
            return Ok(Expr { span, kind: Box::new(ExprKind::Dict { keys, values }) });
        }
        if self.at(&Raw::For) {
            let generators = self.comprehensions()?;
            self.expect(Raw::RBrace, "'}'")?;
            return Ok(Expr { span, kind: Box::new(ExprKind::SetComp { element: Box::new(first), generators }) });
        }
        let mut items = vec![first];
        while self.eat(&Raw::Comma) {
            if self.at(&Raw::RBrace) {
                break;
            }
            items.push(self.star_expr()?);
        }
        self.expect(Raw::RBrace, "'}'")?;
        Ok(Expr { span, kind: Box::new(ExprKind::Set(items)) })
    }

    fn dict_item(&mut self, keys: &mut Vec<Option<Expr>>, values: &mut Vec<Expr>) -> PResult<()> {
        if self.eat(&Raw::Pow) {
            keys.push(None);
            values.push(self.or_expr()?);
            return Ok(());
        }
        let key = self.expr()?;
        self.expect(Raw::Colon, "':'")?;
        let value = self.expr()?;
        keys.push(Some(key));
        values.push(value);
        Ok(())
    }

    /// Splits an `f"..."` body into literal runs and `{expr}` holes,
    /// re-entering the expression grammar for each hole via a fresh
    /// lex/parse of its slice — the same trick a single-pass
    /// recursive-descent parser uses for any embedded sub-language.
    fn fstring(&mut self, span: Span, raw: &str) -> PResult<Expr> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let chars: Vec<char> = raw.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '{' if chars.get(i + 1) == Some(&'{') => {
                    literal.push('{');
                    i += 2;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    literal.push('}');
                    i += 2;
                }
                '{' => {
                    if !literal.is_empty() {
                        parts.push(Expr { span, kind: Box::new(ExprKind::Constant(Constant::Str(Arc::from(literal.clone())))) });
                        literal.clear();
                    }
                    let mut depth = 1;
                    let start = i + 1;
                    i += 1;
                    while i < chars.len() && depth > 0 {
                        match chars[i] {
                            '{' => depth += 1,
                            '}' => depth -= 1,
                            _ => {}
                        }
                        if depth > 0 {
                            i += 1;
                        }
                    }
                    let hole: String = chars[start..i].iter().collect();
                    i += 1;
                    let (expr_src, conversion, format_spec) = split_fstring_hole(&hole);
                    let tokens = crate::lexer::tokenize(&expr_src, "<fstring>")?;
                    let (block, _) = parse(&tokens)?;
                    let value = match block.stmts.into_iter().next().map(|s| s.kind) {
                        Some(StmtKind::Expr(e)) => e,
                        _ => return self.err("invalid expression inside f-string"),
                    };
                    parts.push(Expr {
                        span,
                        kind: Box::new(ExprKind::FormattedValue {
                            value: Box::new(value),
                            conversion,
                            format_spec: format_spec.map(|s| Box::new(Expr { span, kind: Box::new(ExprKind::Constant(Constant::Str(Arc::from(s)))) })),
                        }),
                    });
                }
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            parts.push(Expr { span, kind: Box::new(ExprKind::Constant(Constant::Str(Arc::from(literal)))) });
        }
        Ok(Expr { span, kind: Box::new(ExprKind::JoinedStr(parts)) })
    }
}

fn split_fstring_hole(hole: &str) -> (String, Option<char>, Option<String>) {
    let (expr_part, format_spec) = match hole.find(':') {
        Some(idx) => (&hole[..idx], Some(hole[idx + 1..].to_owned())),
        None => (hole, None),
    };
    let (expr_part, conversion) = match expr_part.rfind('!') {
        Some(idx) if idx + 2 == expr_part.len() => (&expr_part[..idx], expr_part[idx + 1..].chars().next()),
        _ => (expr_part, None),
    };
    (expr_part.trim().to_owned(), conversion, format_spec)
}

fn block_contains_yield(block: &Block) -> bool {
    block.stmts.iter().any(stmt_contains_yield)
}

fn stmt_contains_yield(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Expr(e) | StmtKind::Return(Some(e)) => expr_contains_yield(e),
        StmtKind::Assign { value, .. } | StmtKind::AugAssign { value, .. } => expr_contains_yield(value),
        StmtKind::AnnAssign { value: Some(value), .. } => expr_contains_yield(value),
        StmtKind::If { test, body, orelse } => expr_contains_yield(test) || block_contains_yield(body) || block_contains_yield(orelse),
        StmtKind::While { test, body, orelse } => expr_contains_yield(test) || block_contains_yield(body) || block_contains_yield(orelse),
        StmtKind::For { iter, body, orelse, .. } => expr_contains_yield(iter) || block_contains_yield(body) || block_contains_yield(orelse),
        StmtKind::With { items, body, .. } => items.iter().any(|i| expr_contains_yield(&i.context_expr)) || block_contains_yield(body),
        StmtKind::Try { body, handlers, orelse, finalbody, .. } => {
            block_contains_yield(body)
                || handlers.iter().any(|h| block_contains_yield(&h.body))
                || block_contains_yield(orelse)
                || block_contains_yield(finalbody)
        }
        StmtKind::Match { subject, cases } => {
            expr_contains_yield(subject) || cases.iter().any(|c| block_contains_yield(&c.body))
        }
        _ => false,
    }
}

fn expr_contains_yield(expr: &Expr) -> bool {
    match &*expr.kind {
        ExprKind::Yield(_) | ExprKind::YieldFrom(_) => true,
        ExprKind::BinOp { left, right, .. } => expr_contains_yield(left) || expr_contains_yield(right),
        ExprKind::BoolOp { values, .. } | ExprKind::Tuple(values) | ExprKind::List(values) | ExprKind::Set(values) => {
            values.iter().any(expr_contains_yield)
        }
        ExprKind::UnaryOp { operand, .. } | ExprKind::Starred(operand) | ExprKind::Await(operand) => expr_contains_yield(operand),
        ExprKind::IfExp { test, body, orelse } => expr_contains_yield(test) || expr_contains_yield(body) || expr_contains_yield(orelse),
        ExprKind::Compare { left, comparators, .. } => expr_contains_yield(left) || comparators.iter().any(expr_contains_yield),
        ExprKind::Call { func, args, keywords } => {
            expr_contains_yield(func) || args.iter().any(expr_contains_yield) || keywords.iter().any(|k| expr_contains_yield(&k.value))
        }
        ExprKind::Attribute { value, .. } => expr_contains_yield(value),
        ExprKind::Subscript { value, slice } => expr_contains_yield(value) || expr_contains_yield(slice),
        ExprKind::NamedExpr { value, .. } => expr_contains_yield(value),
        _ => false,
    }
}
