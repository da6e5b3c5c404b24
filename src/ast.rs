//! Lua 5.3 AST.
//!
//! Nodes live in a flat `Arena` addressed by typed index handles rather
//! than through `Box`-based recursive enums: a flat arena of AST nodes
//! with index handles makes position annotation, visitor dispatch, and
//! scope-to-block references trivial, and avoids lifetime/relocation
//! issues a recursive enum would bring. Every node carries a byte-offset
//! `Span`.
//!
//! `Variable` and `FunctionCall` are the same grammar production,
//! disambiguated only by whether the trailing postfix is a call — so
//! both are represented by the single arena-backed [`PrefixExpr`] type,
//! addressed through the `VariableId`/`CallId` wrapper handles for
//! readability at call sites.

use std::fmt;

macro_rules! def_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u32);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

def_id!(
    /// Index of a [`Block`] in the arena.
    BlockId
);
def_id!(
    /// Index of a [`Statement`] in the arena.
    StmtId
);
def_id!(
    /// Index of an [`Expression`] in the arena.
    ExprId
);
def_id!(
    /// Index of an [`Operand`] in the arena.
    OperandId
);
def_id!(
    /// Index of a [`PrefixExpr`] (shared by `Variable` and `FunctionCall`).
    PrefixId
);
def_id!(
    /// Index of a [`FunctionBody`] in the arena.
    FunctionBodyId
);
def_id!(
    /// Index of a [`Field`] (table constructor entry) in the arena.
    FieldId
);
def_id!(
    /// Index of a [`VariableOrFunction`] synthetic cursor node.
    VarOrFuncId
);

/// A `PrefixId` known (by construction) to not end in a call postfix.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(pub PrefixId);

/// A `PrefixId` known (by construction) to end in a call postfix.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(pub PrefixId);

impl fmt::Debug for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VariableId({})", self.0 .0)
    }
}

impl fmt::Debug for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallId({})", self.0 .0)
    }
}

/// A half-open byte-offset interval `[begin, end)` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
}

impl Span {
    pub fn new(begin: usize, end: usize) -> Self {
        Span { begin, end }
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.begin <= pos && pos <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Not,
    BitNot,
    Length,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Concat,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Neq,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub span: Span,
    pub statements: Vec<StmtId>,
    pub return_statement: Option<ReturnStatement>,
}

#[derive(Debug, Clone)]
pub struct ReturnStatement {
    pub span: Span,
    pub expressions: Vec<ExprId>,
}

#[derive(Debug, Clone)]
pub struct IfBranch {
    pub condition: ExprId,
    pub block: BlockId,
}

/// `function a.b.c(...)` / `function a.b:c(...)` target name.
#[derive(Debug, Clone)]
pub struct DottedName {
    pub base: String,
    pub path: Vec<String>,
    /// Set for `function obj:method(...)`; an implicit `self` parameter.
    pub method: Option<String>,
}

impl DottedName {
    pub fn is_simple(&self) -> bool {
        self.path.is_empty() && self.method.is_none()
    }
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Empty,
    Assignment {
        variables: Vec<VariableId>,
        expressions: Vec<ExprId>,
    },
    FunctionCall(CallId),
    Label(String),
    Goto(String),
    Break,
    Do(BlockId),
    While {
        condition: ExprId,
        body: BlockId,
    },
    Repeat {
        body: BlockId,
        condition: ExprId,
    },
    IfThenElse {
        first: IfBranch,
        rest: Vec<IfBranch>,
        else_block: Option<BlockId>,
    },
    NumericFor {
        var: String,
        start: ExprId,
        end: ExprId,
        step: Option<ExprId>,
        body: BlockId,
    },
    GenericFor {
        vars: Vec<String>,
        expressions: Vec<ExprId>,
        body: BlockId,
    },
    FunctionDecl {
        name: DottedName,
        body: FunctionBodyId,
    },
    LocalFunctionDecl {
        name: String,
        body: FunctionBodyId,
    },
    LocalAssignment {
        names: Vec<String>,
        expressions: Option<Vec<ExprId>>,
    },
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub span: Span,
    pub operand: OperandId,
    /// The parser does not rebuild operator precedence into the AST:
    /// `a + b * c` parses as a flat left-to-right chain regardless of
    /// operator.
    pub binary: Option<(BinaryOp, ExprId)>,
}

#[derive(Debug, Clone)]
pub enum OperandKind {
    Nil,
    True,
    False,
    /// `...`
    Dots,
    Numeral(String),
    LiteralString(String),
    UnaryOp {
        op: UnaryOp,
        expr: ExprId,
    },
    TableConstructor(Vec<FieldId>),
    FunctionBody(FunctionBodyId),
    Prefix(PrefixId),
}

#[derive(Debug, Clone)]
pub struct Operand {
    pub span: Span,
    pub kind: OperandKind,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    /// A positional entry, numbered `1`, `2`, ... in constructor order.
    Positional(ExprId),
    ByName { name: String, value: ExprId },
    ByExpression { key: ExprId, value: ExprId },
}

#[derive(Debug, Clone)]
pub struct Field {
    pub span: Span,
    pub kind: FieldKind,
}

#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub span: Span,
    pub parameters: Vec<String>,
    pub has_varargs: bool,
    pub block: BlockId,
}

#[derive(Debug, Clone)]
pub enum PrefixHead {
    Name(String),
    Bracketed(ExprId),
}

#[derive(Debug, Clone)]
pub enum PostfixKind {
    Field(String),
    Index(ExprId),
    Call {
        /// Set for `:name(args)` method calls.
        method: Option<String>,
        args: Vec<ExprId>,
    },
}

#[derive(Debug, Clone)]
pub struct Postfix {
    pub span: Span,
    pub kind: PostfixKind,
}

/// The shared representation of the grammar's `prefixexp`: a head
/// (bracketed expression or name) followed by any number of postfixes.
/// A trailing `Call` postfix makes it usable as a `FunctionCall`
/// (`CallId`); otherwise it is usable as a `Variable` (`VariableId`).
#[derive(Debug, Clone)]
pub struct PrefixExpr {
    pub span: Span,
    pub head: PrefixHead,
    pub postfixes: Vec<Postfix>,
}

impl PrefixExpr {
    pub fn ends_in_call(&self) -> bool {
        matches!(
            self.postfixes.last().map(|p| &p.kind),
            Some(PostfixKind::Call { .. })
        )
    }

    pub fn head_name(&self) -> Option<&str> {
        match &self.head {
            PrefixHead::Name(name) => Some(name),
            PrefixHead::Bracketed(_) => None,
        }
    }
}

/// Synthetic node (not part of the Lua grammar) used only by the cursor
/// subsystem: a variable/call chain optionally followed by a bare,
/// argument-less `:methodName` — the state of a buffer where the user
/// has typed `obj:partialN` but not yet the call parentheses.
#[derive(Debug, Clone)]
pub struct VariableOrFunction {
    pub span: Span,
    pub head: PrefixId,
    pub member: Option<String>,
}

/// Flat storage for every node kind, addressed by the `*Id` handles
/// above. Built bottom-up by the parser; never mutated once parsing of
/// a buffer completes.
#[derive(Debug, Default)]
pub struct Arena {
    pub blocks: Vec<Block>,
    pub statements: Vec<Statement>,
    pub expressions: Vec<Expression>,
    pub operands: Vec<Operand>,
    pub prefixes: Vec<PrefixExpr>,
    pub function_bodies: Vec<FunctionBody>,
    pub fields: Vec<Field>,
    pub variable_or_functions: Vec<VariableOrFunction>,
}

// Small helper trait so the accessor macro below can convert a raw
// index to a typed id and back without repeating the same two methods
// for every node kind.
trait ArenaId: Copy {
    fn new_unchecked(index: u32) -> Self;
    fn index(self) -> usize;
}

macro_rules! impl_arena_id {
    ($name:ident) => {
        impl ArenaId for $name {
            fn new_unchecked(index: u32) -> Self {
                $name(index)
            }
            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

impl_arena_id!(BlockId);
impl_arena_id!(StmtId);
impl_arena_id!(ExprId);
impl_arena_id!(OperandId);
impl_arena_id!(PrefixId);
impl_arena_id!(FunctionBodyId);
impl_arena_id!(FieldId);
impl_arena_id!(VarOrFuncId);

macro_rules! arena_accessors {
    ($field:ident, $id:ty, $node:ty, $push:ident, $get:ident) => {
        pub fn $push(&mut self, node: $node) -> $id {
            self.$field.push(node);
            <$id as ArenaId>::new_unchecked((self.$field.len() - 1) as u32)
        }

        pub fn $get(&self, id: $id) -> &$node {
            &self.$field[<$id as ArenaId>::index(id)]
        }
    };
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    arena_accessors!(blocks, BlockId, Block, push_block, block);
    arena_accessors!(statements, StmtId, Statement, push_statement, statement);
    arena_accessors!(expressions, ExprId, Expression, push_expression, expression);
    arena_accessors!(operands, OperandId, Operand, push_operand, operand);
    arena_accessors!(prefixes, PrefixId, PrefixExpr, push_prefix, prefix);
    arena_accessors!(
        function_bodies,
        FunctionBodyId,
        FunctionBody,
        push_function_body,
        function_body
    );
    arena_accessors!(fields, FieldId, Field, push_field, field);
    arena_accessors!(
        variable_or_functions,
        VarOrFuncId,
        VariableOrFunction,
        push_variable_or_function,
        variable_or_function
    );

    pub fn variable(&self, id: VariableId) -> &PrefixExpr {
        self.prefix(id.0)
    }

    pub fn call(&self, id: CallId) -> &PrefixExpr {
        self.prefix(id.0)
    }

    /// Direct child blocks reachable from `block` (one level of control
    /// flow / function-body nesting), in source order. Used by the
    /// cursor subsystem's block localization.
    pub fn child_blocks(&self, block_id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let block = self.block(block_id);
        for &stmt_id in &block.statements {
            self.collect_statement_blocks(stmt_id, &mut out);
        }
        if let Some(ret) = &block.return_statement {
            for expr in &ret.expressions {
                self.collect_expression_blocks(*expr, &mut out);
            }
        }
        out
    }

    fn collect_statement_blocks(&self, stmt_id: StmtId, out: &mut Vec<BlockId>) {
        match &self.statement(stmt_id).kind {
            StatementKind::Do(b)
            | StatementKind::While { body: b, .. }
            | StatementKind::Repeat { body: b, .. } => {
                out.push(*b);
            }
            StatementKind::IfThenElse {
                first,
                rest,
                else_block,
            } => {
                out.push(first.block);
                for branch in rest {
                    out.push(branch.block);
                }
                if let Some(b) = else_block {
                    out.push(*b);
                }
            }
            StatementKind::NumericFor { body, .. } | StatementKind::GenericFor { body, .. } => {
                out.push(*body);
            }
            StatementKind::FunctionDecl { body, .. }
            | StatementKind::LocalFunctionDecl { body, .. } => {
                out.push(self.function_body(*body).block);
            }
            StatementKind::Assignment { expressions, .. } => {
                for expr in expressions {
                    self.collect_expression_blocks(*expr, out);
                }
            }
            StatementKind::LocalAssignment {
                expressions: Some(exprs),
                ..
            } => {
                for expr in exprs {
                    self.collect_expression_blocks(*expr, out);
                }
            }
            _ => {}
        }
    }

    fn collect_expression_blocks(&self, expr_id: ExprId, out: &mut Vec<BlockId>) {
        let expr = self.expression(expr_id);
        self.collect_operand_blocks(expr.operand, out);
        if let Some((_, rhs)) = expr.binary {
            self.collect_expression_blocks(rhs, out);
        }
    }

    fn collect_operand_blocks(&self, operand_id: OperandId, out: &mut Vec<BlockId>) {
        match &self.operand(operand_id).kind {
            OperandKind::FunctionBody(fb) => out.push(self.function_body(*fb).block),
            OperandKind::Prefix(p) => self.collect_prefix_blocks(*p, out),
            OperandKind::UnaryOp { expr, .. } => self.collect_expression_blocks(*expr, out),
            OperandKind::TableConstructor(fields) => {
                for field_id in fields {
                    match &self.field(*field_id).kind {
                        FieldKind::Positional(e) => self.collect_expression_blocks(*e, out),
                        FieldKind::ByName { value, .. } => {
                            self.collect_expression_blocks(*value, out)
                        }
                        FieldKind::ByExpression { key, value } => {
                            self.collect_expression_blocks(*key, out);
                            self.collect_expression_blocks(*value, out);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_prefix_blocks(&self, prefix_id: PrefixId, out: &mut Vec<BlockId>) {
        let prefix = self.prefix(prefix_id);
        if let PrefixHead::Bracketed(e) = prefix.head {
            self.collect_expression_blocks(e, out);
        }
        for postfix in &prefix.postfixes {
            match &postfix.kind {
                PostfixKind::Index(e) => self.collect_expression_blocks(*e, out),
                PostfixKind::Call { args, .. } => {
                    for arg in args {
                        self.collect_expression_blocks(*arg, out);
                    }
                }
                PostfixKind::Field(_) => {}
            }
        }
    }
}
