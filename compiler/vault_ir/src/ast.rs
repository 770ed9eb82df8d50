//! Abstract syntax tree shared between `vault_frontend` (which builds it)
//! and `vault_eval` (which walks it). Nodes are heap-allocated with `Box`
//! rather than arena-indexed: the interpreter never needs random access
//! into a whole module's tree, only recursive descent, so an arena would
//! buy nothing but indirection.

use crate::name::Name;
use crate::span::Span;
use std::sync::Arc;

/// A fully parsed and scope-analyzed compilation unit: a module, or the
/// body of any `def`/`lambda`/comprehension compiled independently of its
/// enclosing module (see `vault_ir::scope::CodeUnit`, which owns one of
/// these per code object plus its `ScopeInfo`).
#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Pass,
    Break,
    Continue,
    Return(Option<Expr>),
    Delete(Vec<Expr>),
    Assign { targets: Vec<Expr>, value: Expr },
    AugAssign { target: Box<Expr>, op: BinOpKind, value: Expr },
    AnnAssign { target: Box<Expr>, annotation: Box<Expr>, value: Option<Expr> },
    If { test: Expr, body: Block, orelse: Block },
    While { test: Expr, body: Block, orelse: Block },
    For { target: Expr, iter: Expr, body: Block, orelse: Block, is_async: bool },
    With { items: Vec<WithItem>, body: Block, is_async: bool },
    Raise { exc: Option<Expr>, cause: Option<Expr> },
    Try {
        body: Block,
        handlers: Vec<ExceptHandler>,
        orelse: Block,
        finalbody: Block,
        is_star: bool,
    },
    Assert { test: Expr, msg: Option<Expr> },
    Import(Vec<ImportAlias>),
    ImportFrom { module: Option<Name>, level: u32, names: Vec<ImportAlias> },
    Global(Vec<Name>),
    Nonlocal(Vec<Name>),
    FunctionDef(Arc<FunctionDef>),
    ClassDef(Arc<ClassDef>),
    Match { subject: Expr, cases: Vec<MatchCase> },
    TypeAlias { name: Name, type_params: Vec<TypeParam>, value: Expr },
}

#[derive(Debug, Clone)]
pub struct WithItem {
    pub context_expr: Expr,
    pub optional_vars: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExceptHandler {
    pub kind: Option<Expr>,
    pub name: Option<Name>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ImportAlias {
    pub name: Name,
    pub asname: Option<Name>,
}

/// A `def`/`async def`/`lambda` body, independent of the declaration
/// statement that names it: a `lambda` has a `FunctionDef` with `name ==
/// None` semantics represented by an anonymous interned name chosen by the
/// analyzer (see §4.1's lambda disambiguation by occurrence).
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Name,
    pub params: Params,
    pub body: Block,
    pub decorators: Vec<Expr>,
    pub returns: Option<Expr>,
    pub type_params: Vec<TypeParam>,
    pub is_async: bool,
    pub is_generator: bool,
    pub span: Span,
    /// Index of this function's code unit in the enclosing module's
    /// `ScopeTree` (see `scope::ScopeTree`), resolved once by the analyzer.
    pub scope_id: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Params {
    pub posonly: Vec<Param>,
    pub args: Vec<Param>,
    pub vararg: Option<Param>,
    pub kwonly: Vec<Param>,
    pub kwarg: Option<Param>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Name,
    pub default: Option<Expr>,
    pub annotation: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: Name,
    pub bases: Vec<Expr>,
    pub keywords: Vec<Keyword>,
    pub body: Block,
    pub decorators: Vec<Expr>,
    pub type_params: Vec<TypeParam>,
    pub span: Span,
    pub scope_id: u32,
}

#[derive(Debug, Clone)]
pub struct TypeParam {
    pub name: Name,
    pub bound: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    MatchValue(Expr),
    MatchSingleton(Constant),
    MatchSequence(Vec<Pattern>),
    MatchMapping { keys: Vec<Expr>, patterns: Vec<Pattern>, rest: Option<Name> },
    MatchClass { cls: Expr, patterns: Vec<Pattern>, kwd_names: Vec<Name>, kwd_patterns: Vec<Pattern> },
    MatchStar(Option<Name>),
    MatchAs { pattern: Option<Box<Pattern>>, name: Option<Name> },
    MatchOr(Vec<Pattern>),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: Box<ExprKind>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Constant(Constant),
    Name(Name),
    BoolOp { op: BoolOpKind, values: Vec<Expr> },
    NamedExpr { target: Name, value: Box<Expr> },
    BinOp { left: Box<Expr>, op: BinOpKind, right: Box<Expr> },
    UnaryOp { op: UnaryOpKind, operand: Box<Expr> },
    Lambda(Arc<FunctionDef>),
    IfExp { test: Box<Expr>, body: Box<Expr>, orelse: Box<Expr> },
    Dict { keys: Vec<Option<Expr>>, values: Vec<Expr> },
    Set(Vec<Expr>),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    ListComp { element: Box<Expr>, generators: Vec<Comprehension> },
    SetComp { element: Box<Expr>, generators: Vec<Comprehension> },
    DictComp { key: Box<Expr>, value: Box<Expr>, generators: Vec<Comprehension> },
    GeneratorExp { element: Box<Expr>, generators: Vec<Comprehension> },
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
    Compare { left: Box<Expr>, ops: Vec<CmpOpKind>, comparators: Vec<Expr> },
    Call { func: Box<Expr>, args: Vec<Expr>, keywords: Vec<Keyword> },
    Starred(Box<Expr>),
    JoinedStr(Vec<Expr>),
    FormattedValue { value: Box<Expr>, conversion: Option<char>, format_spec: Option<Box<Expr>> },
    Attribute { value: Box<Expr>, attr: Name },
    Subscript { value: Box<Expr>, slice: Box<Expr> },
    Slice { lower: Option<Box<Expr>>, upper: Option<Box<Expr>>, step: Option<Box<Expr>> },
}

#[derive(Debug, Clone)]
pub struct Keyword {
    pub name: Option<Name>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    Ellipsis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    MatMul,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOpKind {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}
