//! Lua 5.3 parser: tokenizes with `crate::lexer`, then parses the token
//! stream with `nom` combinators.
//!
//! Grammar:
//!
//! ```text
//! chunk      ::= block
//! block      ::= {stat} [retstat]
//! stat       ::= ';' | varlist '=' explist | functioncall | label |
//!                break | goto Name | do block end |
//!                while exp do block end | repeat block until exp |
//!                if exp then block {elseif exp then block} [else block] end |
//!                for Name '=' exp ',' exp [',' exp] do block end |
//!                for namelist in explist do block end |
//!                function funcname funcbody | local function Name funcbody |
//!                local namelist ['=' explist]
//! retstat    ::= return [explist] [';']
//! prefixexp  ::= var | functioncall | '(' exp ')'
//! var        ::= Name | prefixexp '[' exp ']' | prefixexp '.' Name
//! functioncall ::= prefixexp args | prefixexp ':' Name args
//! ```
//!
//! Operator precedence is not climbed: `a + b * c` parses as a flat
//! chain in textual order, not by mathematical precedence. Lua's real
//! grammar has nine precedence tiers for binary operators; collapsing
//! them to one keeps every expression on a single straight-line chain,
//! which is enough for the scope/type queries this crate answers but
//! does not reproduce Lua's evaluation order for mixed-precedence
//! expressions.
//!
//! Each node also carries a byte-offset `Span`, computed from how many
//! tokens a production consumed, so callers can map an AST node back to
//! the source buffer.

use crate::ast::*;
use crate::lexer::{tokenize, SpannedToken, TokenKind};
use crate::position::{ElementTag, PositionIndex};
use std::cell::RefCell;
use std::num::NonZeroUsize;

use nom::combinator::opt;
use nom::multi::many0;
use nom::{IResult, Input, Needed, Parser};

pub struct ParseResult {
    pub arena: Arena,
    pub root: BlockId,
    pub positions: PositionIndex,
    /// `false` when the parser stopped short of consuming every token —
    /// e.g. a statement started with a token no production recognizes.
    /// The caller (`Session::update_program`) keeps its last-good
    /// snapshot in that case rather than swapping in a partial tree.
    pub parsed: bool,
    /// Byte offset the parser reached before giving up, for diagnostics.
    pub last_consumed: usize,
}

/// Parses a full Lua chunk. Never panics: a buffer the user is mid-typing
/// is still a valid input for every other query in this crate, so parse
/// errors are represented by `parsed = false` plus a `Block` truncated at
/// the point recovery gave up, not as a `Result::Err`.
pub fn parse(source: &str) -> ParseResult {
    let (tokens, positions) = tokenize(source);
    let token_count = tokens.len();
    let ctx = Ctx::new(positions, source.len());
    let input = TokenSlice(&tokens);
    let (rest, root) = parse_block(&ctx, input).expect("parse_block never fails");
    let consumed = token_count - rest.input_len();
    let last_consumed = if consumed > 0 {
        tokens[consumed - 1].span.end
    } else {
        0
    };
    let parsed = rest.input_len() == 0;
    let (arena, positions) = ctx.into_parts();
    ParseResult {
        arena,
        root,
        positions,
        parsed,
        last_consumed,
    }
}

/// Parses a standalone fragment under the cursor into the synthetic
/// `VariableOrFunction` node: a prefix chain optionally followed by a
/// bare `:methodName` with no call parentheses yet.
pub fn parse_variable_or_function(fragment: &str) -> Option<(Arena, VarOrFuncId)> {
    let (tokens, positions) = tokenize(fragment);
    if tokens.is_empty() {
        return None;
    }
    let ctx = Ctx::new(positions, fragment.len());
    let input = TokenSlice(&tokens);
    let (rest, head) = parse_prefix(&ctx, input).ok()?;

    let (rest, member) = match tag_kind(TokenKind::Colon)(rest) {
        Ok((rest, _)) => {
            let ((name, _span), rest) = name_token(rest)?;
            (rest, Some(name))
        }
        Err(_) => (rest, None),
    };

    if rest.input_len() != 0 {
        // Trailing garbage after the chain: not a clean fragment.
        return None;
    }

    let span = Span::new(0, fragment.len());
    let (mut arena, _positions) = ctx.into_parts();
    let node_id = arena.push_variable_or_function(VariableOrFunction { span, head, member });
    Some((arena, node_id))
}

/// A slice of the token stream, implementing `nom::Input` so the
/// statement/expression grammar below can be composed out of ordinary
/// combinators instead of hand-rolled lookahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TokenSlice<'a>(&'a [SpannedToken]);

impl<'a> Input for TokenSlice<'a> {
    type Item = &'a SpannedToken;
    type Iter = std::slice::Iter<'a, SpannedToken>;
    type IterIndices = std::iter::Enumerate<std::slice::Iter<'a, SpannedToken>>;

    fn input_len(&self) -> usize {
        self.0.len()
    }

    fn take(&self, index: usize) -> Self {
        TokenSlice(&self.0[..index])
    }

    fn take_from(&self, index: usize) -> Self {
        TokenSlice(&self.0[index..])
    }

    fn take_split(&self, index: usize) -> (Self, Self) {
        (TokenSlice(&self.0[index..]), TokenSlice(&self.0[..index]))
    }

    fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: Fn(Self::Item) -> bool,
    {
        self.0.iter().position(predicate)
    }

    fn iter_elements(&self) -> Self::Iter {
        self.0.iter()
    }

    fn iter_indices(&self) -> Self::IterIndices {
        self.0.iter().enumerate()
    }

    fn slice_index(&self, count: usize) -> Result<usize, Needed> {
        if count > self.0.len() {
            Err(Needed::Size(NonZeroUsize::new(count - self.0.len()).unwrap()))
        } else {
            Ok(count)
        }
    }
}

/// Parsing state shared across the free `parse_*` functions below. Many
/// of them need to live inside `alt`/`many0`/`opt` at once, which rules
/// out a `&mut Parser` receiver (only one closure could borrow it
/// mutably at a time); a `RefCell` lets them all hold a shared `&Ctx`
/// instead.
struct Ctx {
    arena: RefCell<Arena>,
    positions: RefCell<PositionIndex>,
    source_len: usize,
}

impl Ctx {
    fn new(positions: PositionIndex, source_len: usize) -> Self {
        Ctx {
            arena: RefCell::new(Arena::new()),
            positions: RefCell::new(positions),
            source_len,
        }
    }

    fn into_parts(self) -> (Arena, PositionIndex) {
        (self.arena.into_inner(), self.positions.into_inner())
    }

    fn tag(&self, begin: usize, end: usize, tag: ElementTag) {
        self.positions.borrow_mut().insert(begin, end, tag);
    }
}

/// An empty-result IResult error, used by token matchers that fail.
fn token_err<'a>(input: TokenSlice<'a>) -> nom::Err<nom::error::Error<TokenSlice<'a>>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

fn tag_kind<'a>(kind: TokenKind) -> impl Fn(TokenSlice<'a>) -> IResult<TokenSlice<'a>, &'a SpannedToken> {
    move |input: TokenSlice<'a>| match input.0.first() {
        Some(tok) if tok.kind == kind => Ok((TokenSlice(&input.0[1..]), tok)),
        _ => Err(token_err(input)),
    }
}

fn peek_kind(input: TokenSlice, kind: &TokenKind) -> bool {
    input.0.first().map(|t| &t.kind) == Some(kind)
}

fn name_token(input: TokenSlice) -> Option<((String, Span), TokenSlice)> {
    match input.0.first() {
        Some(tok) => match &tok.kind {
            TokenKind::Identifier(name) => {
                Some(((name.clone(), tok.span), TokenSlice(&input.0[1..])))
            }
            _ => None,
        },
        None => None,
    }
}

fn parse_name_token<'a>(input: TokenSlice<'a>) -> IResult<TokenSlice<'a>, (String, Span)> {
    match name_token(input) {
        Some((name_and_span, rest)) => Ok((rest, name_and_span)),
        None => Err(token_err(input)),
    }
}

/// Consumes an identifier token, classifying it in the position index
/// as a plain `variable` unless the caller retags it afterward.
fn parse_name<'a>(ctx: &Ctx, input: TokenSlice<'a>) -> IResult<TokenSlice<'a>, String> {
    let (rest, (name, span)) = parse_name_token(input)?;
    ctx.tag(span.begin, span.end, ElementTag::Variable);
    Ok((rest, name))
}

fn at_block_end(input: TokenSlice) -> bool {
    match input.0.first().map(|t| &t.kind) {
        None => true,
        Some(TokenKind::End | TokenKind::Else | TokenKind::Elseif | TokenKind::Until) => true,
        _ => false,
    }
}

/// Computes the byte span a production covered, from the slice it
/// started with and the slice left over after it ran. An empty
/// production (zero tokens consumed) spans a single point at its start.
fn span_of(start: TokenSlice, rest: TokenSlice, fallback: usize) -> Span {
    let begin = start.0.first().map(|t| t.span.begin).unwrap_or(fallback);
    let consumed = start.0.len() - rest.0.len();
    let end = if consumed > 0 {
        start.0[consumed - 1].span.end
    } else {
        begin
    };
    Span::new(begin, end)
}

// ---- block / statement --------------------------------------------------

fn parse_block<'a>(ctx: &Ctx, input: TokenSlice<'a>) -> IResult<TokenSlice<'a>, BlockId> {
    let mut statements = Vec::new();
    let mut current = input;
    loop {
        if at_block_end(current) || peek_kind(current, &TokenKind::Return) {
            break;
        }
        match parse_statement(ctx, current) {
            Ok((rest, stmt)) => {
                statements.push(stmt);
                current = rest;
            }
            Err(_) => break,
        }
    }
    let return_statement = if peek_kind(current, &TokenKind::Return) {
        let (rest, ret) = parse_return_statement(ctx, current)?;
        current = rest;
        Some(ret)
    } else {
        None
    };
    let span = span_of(input, current, ctx.source_len);
    let id = ctx.arena.borrow_mut().push_block(Block {
        span,
        statements,
        return_statement,
    });
    Ok((current, id))
}

fn parse_return_statement<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, ReturnStatement> {
    let (rest, _) = tag_kind(TokenKind::Return)(input)?;
    let mut expressions = Vec::new();
    let mut current = rest;
    if !at_block_end(current) && !peek_kind(current, &TokenKind::Semicolon) {
        let (rest, first) = parse_expression(ctx, current)?;
        expressions.push(first);
        current = rest;
        while let Ok((rest, _)) = tag_kind(TokenKind::Comma)(current) {
            let (rest, expr) = parse_expression(ctx, rest)?;
            expressions.push(expr);
            current = rest;
        }
    }
    if let Ok((rest, _)) = tag_kind(TokenKind::Semicolon)(current) {
        current = rest;
    }
    let span = span_of(input, current, ctx.source_len);
    Ok((
        current,
        ReturnStatement {
            span,
            expressions,
        },
    ))
}

fn parse_statement<'a>(ctx: &Ctx, input: TokenSlice<'a>) -> IResult<TokenSlice<'a>, StmtId> {
    let (rest, kind) = match input.0.first().map(|t| &t.kind) {
        Some(TokenKind::Semicolon) => (TokenSlice(&input.0[1..]), StatementKind::Empty),
        Some(TokenKind::DoubleColon) => parse_label_statement(ctx, input)?,
        Some(TokenKind::Break) => (TokenSlice(&input.0[1..]), StatementKind::Break),
        Some(TokenKind::Goto) => parse_goto_statement(ctx, input)?,
        Some(TokenKind::Do) => parse_do_statement(ctx, input)?,
        Some(TokenKind::While) => parse_while_statement(ctx, input)?,
        Some(TokenKind::Repeat) => parse_repeat_statement(ctx, input)?,
        Some(TokenKind::If) => parse_if_statement(ctx, input)?,
        Some(TokenKind::For) => parse_for_statement(ctx, input)?,
        Some(TokenKind::Function) => parse_function_decl_statement(ctx, input)?,
        Some(TokenKind::Local) => parse_local_statement(ctx, input)?,
        Some(_) => parse_assignment_or_call(ctx, input)?,
        None => return Err(token_err(input)),
    };
    let span = span_of(input, rest, ctx.source_len);
    let id = ctx.arena.borrow_mut().push_statement(Statement { span, kind });
    Ok((rest, id))
}

fn parse_label_statement<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, StatementKind> {
    let (rest, _) = tag_kind(TokenKind::DoubleColon)(input)?;
    let (rest, (name, span)) = parse_name_token(rest)?;
    ctx.tag(span.begin, span.end, ElementTag::Variable);
    let (rest, _) = opt(tag_kind(TokenKind::DoubleColon)).parse(rest)?;
    Ok((rest, StatementKind::Label(name)))
}

fn parse_goto_statement<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, StatementKind> {
    let (rest, _) = tag_kind(TokenKind::Goto)(input)?;
    let (rest, (name, span)) = parse_name_token(rest)?;
    ctx.tag(span.begin, span.end, ElementTag::Variable);
    Ok((rest, StatementKind::Goto(name)))
}

fn parse_do_statement<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, StatementKind> {
    let (rest, _) = tag_kind(TokenKind::Do)(input)?;
    let (rest, body) = parse_block(ctx, rest)?;
    let (rest, _) = opt(tag_kind(TokenKind::End)).parse(rest)?;
    Ok((rest, StatementKind::Do(body)))
}

fn parse_while_statement<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, StatementKind> {
    let (rest, _) = tag_kind(TokenKind::While)(input)?;
    let (rest, condition) = parse_expression(ctx, rest)?;
    let (rest, _) = opt(tag_kind(TokenKind::Do)).parse(rest)?;
    let (rest, body) = parse_block(ctx, rest)?;
    let (rest, _) = opt(tag_kind(TokenKind::End)).parse(rest)?;
    Ok((rest, StatementKind::While { condition, body }))
}

fn parse_repeat_statement<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, StatementKind> {
    let (rest, _) = tag_kind(TokenKind::Repeat)(input)?;
    let (rest, body) = parse_block(ctx, rest)?;
    let (rest, _) = opt(tag_kind(TokenKind::Until)).parse(rest)?;
    let (rest, condition) = parse_expression(ctx, rest)?;
    Ok((rest, StatementKind::Repeat { body, condition }))
}

fn parse_if_statement<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, StatementKind> {
    let (rest, _) = tag_kind(TokenKind::If)(input)?;
    let (rest, condition) = parse_expression(ctx, rest)?;
    let (rest, _) = opt(tag_kind(TokenKind::Then)).parse(rest)?;
    let (rest, block) = parse_block(ctx, rest)?;
    let first = IfBranch { condition, block };

    let (rest, rest_branches) = many0(|i| {
        let (i, _) = tag_kind(TokenKind::Elseif)(i)?;
        let (i, condition) = parse_expression(ctx, i)?;
        let (i, _) = opt(tag_kind(TokenKind::Then)).parse(i)?;
        let (i, block) = parse_block(ctx, i)?;
        Ok((i, IfBranch { condition, block }))
    })
    .parse(rest)?;

    let (rest, else_block) = opt(|i| {
        let (i, _) = tag_kind(TokenKind::Else)(i)?;
        parse_block(ctx, i)
    })
    .parse(rest)?;
    let (rest, _) = opt(tag_kind(TokenKind::End)).parse(rest)?;

    Ok((
        rest,
        StatementKind::IfThenElse {
            first,
            rest: rest_branches,
            else_block,
        },
    ))
}

fn parse_for_statement<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, StatementKind> {
    let (rest, _) = tag_kind(TokenKind::For)(input)?;
    let (rest, first_name) = parse_name(ctx, rest).unwrap_or_else(|_| (rest, String::new()));

    if let Ok((rest, _)) = tag_kind(TokenKind::Equals)(rest) {
        let (rest, start) = parse_expression(ctx, rest)?;
        let (rest, _) = opt(tag_kind(TokenKind::Comma)).parse(rest)?;
        let (rest, end) = parse_expression(ctx, rest)?;
        let (rest, step) = opt(|i| {
            let (i, _) = tag_kind(TokenKind::Comma)(i)?;
            parse_expression(ctx, i)
        })
        .parse(rest)?;
        let (rest, _) = opt(tag_kind(TokenKind::Do)).parse(rest)?;
        let (rest, body) = parse_block(ctx, rest)?;
        let (rest, _) = opt(tag_kind(TokenKind::End)).parse(rest)?;
        return Ok((
            rest,
            StatementKind::NumericFor {
                var: first_name,
                start,
                end,
                step,
                body,
            },
        ));
    }

    let (rest, more_vars) = many0(|i| {
        let (i, _) = tag_kind(TokenKind::Comma)(i)?;
        parse_name(ctx, i).or_else(|_| Ok((i, String::new())))
    })
    .parse(rest)?;
    let mut vars = vec![first_name];
    vars.extend(more_vars);

    let (rest, _) = opt(tag_kind(TokenKind::In)).parse(rest)?;
    let (rest, first_expr) = parse_expression(ctx, rest)?;
    let (rest, more_exprs) = many0(|i| {
        let (i, _) = tag_kind(TokenKind::Comma)(i)?;
        parse_expression(ctx, i)
    })
    .parse(rest)?;
    let mut expressions = vec![first_expr];
    expressions.extend(more_exprs);

    let (rest, _) = opt(tag_kind(TokenKind::Do)).parse(rest)?;
    let (rest, body) = parse_block(ctx, rest)?;
    let (rest, _) = opt(tag_kind(TokenKind::End)).parse(rest)?;
    Ok((
        rest,
        StatementKind::GenericFor {
            vars,
            expressions,
            body,
        },
    ))
}

fn parse_function_decl_statement<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, StatementKind> {
    let (rest, _) = tag_kind(TokenKind::Function)(input)?;
    let (mut rest, (base, base_span)) = parse_name_token(rest).unwrap_or_default_name(rest);
    ctx.tag(base_span.begin, base_span.end, ElementTag::Function);

    let mut path = Vec::new();
    while let Ok((after_dot, _)) = tag_kind(TokenKind::Dot)(rest) {
        let (after_name, (name, span)) = parse_name_token(after_dot).unwrap_or_default_name(after_dot);
        ctx.tag(span.begin, span.end, ElementTag::MemberFunction);
        path.push(name);
        rest = after_name;
    }

    let (rest, method) = match tag_kind(TokenKind::Colon)(rest) {
        Ok((after_colon, _)) => {
            let (after_name, (name, span)) =
                parse_name_token(after_colon).unwrap_or_default_name(after_colon);
            ctx.tag(span.begin, span.end, ElementTag::MemberFunction);
            (after_name, Some(name))
        }
        Err(_) => (rest, None),
    };

    let (rest, body) = parse_function_body(ctx, rest)?;
    if method.is_some() {
        // `function obj:method(...)` implicitly binds `self` as the
        // first parameter, same as Lua's own desugaring of `:` method
        // declarations.
        ctx.arena.borrow_mut().function_bodies[body.0 as usize]
            .parameters
            .insert(0, "self".to_string());
    }
    Ok((
        rest,
        StatementKind::FunctionDecl {
            name: DottedName { base, path, method },
            body,
        },
    ))
}

fn parse_local_statement<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, StatementKind> {
    let (rest, _) = tag_kind(TokenKind::Local)(input)?;

    if let Ok((rest, _)) = tag_kind(TokenKind::Function)(rest) {
        let (rest, name) = parse_name(ctx, rest).unwrap_or_else(|_| (rest, String::new()));
        let (rest, body) = parse_function_body(ctx, rest)?;
        return Ok((rest, StatementKind::LocalFunctionDecl { name, body }));
    }

    let (rest, first_name) = parse_name(ctx, rest).unwrap_or_else(|_| (rest, String::new()));
    let (rest, more_names) = many0(|i| {
        let (i, _) = tag_kind(TokenKind::Comma)(i)?;
        parse_name(ctx, i).or_else(|_| Ok((i, String::new())))
    })
    .parse(rest)?;
    let mut names = vec![first_name];
    names.extend(more_names);

    let (rest, expressions) = match tag_kind(TokenKind::Equals)(rest) {
        Ok((rest, _)) => {
            let (rest, first) = parse_expression(ctx, rest)?;
            let (rest, more) = many0(|i| {
                let (i, _) = tag_kind(TokenKind::Comma)(i)?;
                parse_expression(ctx, i)
            })
            .parse(rest)?;
            let mut exprs = vec![first];
            exprs.extend(more);
            (rest, Some(exprs))
        }
        Err(_) => (rest, None),
    };

    Ok((rest, StatementKind::LocalAssignment { names, expressions }))
}

/// `varlist '=' explist | functioncall` — both start with a `prefixexp`;
/// the grammar only decides which one it is once it either sees a
/// trailing `=` (assignment) or the prefix chain ends in a call with no
/// following `=` (a bare call statement).
fn parse_assignment_or_call<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, StatementKind> {
    let (rest, first) = parse_prefix(ctx, input)?;
    let (rest, more) = many0(|i| {
        let (i, _) = tag_kind(TokenKind::Comma)(i)?;
        parse_prefix(ctx, i)
    })
    .parse(rest)?;

    if let Ok((rest, _)) = tag_kind(TokenKind::Equals)(rest) {
        let mut variables = vec![VariableId(first)];
        variables.extend(more.into_iter().map(VariableId));
        let (rest, first_expr) = parse_expression(ctx, rest)?;
        let (rest, more_exprs) = many0(|i| {
            let (i, _) = tag_kind(TokenKind::Comma)(i)?;
            parse_expression(ctx, i)
        })
        .parse(rest)?;
        let mut expressions = vec![first_expr];
        expressions.extend(more_exprs);
        return Ok((rest, StatementKind::Assignment { variables, expressions }));
    }

    if !more.is_empty() {
        // Comma-separated prefixes with no following `=`: not a valid
        // statement on its own. Recover as a no-op so the rest of a
        // still-being-typed buffer keeps parsing.
        return Ok((rest, StatementKind::Empty));
    }

    if ctx.arena.borrow().prefix(first).ends_in_call() {
        Ok((rest, StatementKind::FunctionCall(CallId(first))))
    } else {
        // A bare variable reference with no `=` is not a valid
        // statement; recover by treating it as a no-op.
        Ok((rest, StatementKind::Empty))
    }
}

// ---- prefixexp / var / functioncall -------------------------------------

fn parse_prefix<'a>(ctx: &Ctx, input: TokenSlice<'a>) -> IResult<TokenSlice<'a>, PrefixId> {
    let (mut rest, head) = match input.0.first() {
        Some(tok) => match &tok.kind {
            TokenKind::Identifier(name) => {
                ctx.tag(tok.span.begin, tok.span.end, ElementTag::Variable);
                (TokenSlice(&input.0[1..]), PrefixHead::Name(name.clone()))
            }
            TokenKind::LParen => {
                let (rest, _) = tag_kind(TokenKind::LParen)(input)?;
                let (rest, expr) = parse_expression(ctx, rest)?;
                let (rest, _) = opt(tag_kind(TokenKind::RParen)).parse(rest)?;
                (rest, PrefixHead::Bracketed(expr))
            }
            _ => return Err(token_err(input)),
        },
        None => return Err(token_err(input)),
    };

    let mut postfixes = Vec::new();
    loop {
        let postfix_start = rest;
        let kind = match rest.0.first().map(|t| &t.kind) {
            Some(TokenKind::Dot) => {
                let (after_dot, _) = tag_kind(TokenKind::Dot)(rest)?;
                match parse_name_token(after_dot) {
                    Ok((after_name, (name, span))) => {
                        ctx.tag(span.begin, span.end, ElementTag::MemberVariable);
                        rest = after_name;
                        PostfixKind::Field(name)
                    }
                    Err(_) => break,
                }
            }
            Some(TokenKind::LBracket) => {
                let (after_bracket, _) = tag_kind(TokenKind::LBracket)(rest)?;
                let (after_expr, expr) = parse_expression(ctx, after_bracket)?;
                let (after_close, _) = opt(tag_kind(TokenKind::RBracket)).parse(after_expr)?;
                rest = after_close;
                PostfixKind::Index(expr)
            }
            Some(TokenKind::Colon) => {
                // A bare `obj:method` with no call parens is not a
                // postfix this loop can consume; `parse_variable_or_function`
                // handles that case itself. Leaving `rest` untouched on
                // failure (rather than advancing past the colon) keeps
                // the checkpoint implicit in nom's error semantics.
                let (after_colon, _) = tag_kind(TokenKind::Colon)(rest)?;
                match parse_name_token(after_colon) {
                    Ok((after_name, (name, span))) => match parse_call_args(ctx, after_name) {
                        Ok((after_args, args)) => {
                            ctx.tag(span.begin, span.end, ElementTag::MemberFunction);
                            rest = after_args;
                            PostfixKind::Call {
                                method: Some(name),
                                args,
                            }
                        }
                        Err(_) => break,
                    },
                    Err(_) => break,
                }
            }
            Some(TokenKind::LParen) | Some(TokenKind::LBrace) | Some(TokenKind::StringLit(_)) => {
                match parse_call_args(ctx, rest) {
                    Ok((after_args, args)) => {
                        rest = after_args;
                        PostfixKind::Call { method: None, args }
                    }
                    Err(_) => break,
                }
            }
            _ => break,
        };
        let span = span_of(postfix_start, rest, ctx.source_len);
        postfixes.push(Postfix { span, kind });
    }

    let span = span_of(input, rest, ctx.source_len);
    let id = ctx.arena.borrow_mut().push_prefix(PrefixExpr {
        span,
        head,
        postfixes,
    });
    Ok((rest, id))
}

/// `args ::= '(' [explist] ')' | tableconstructor | LiteralString`
fn parse_call_args<'a>(ctx: &Ctx, input: TokenSlice<'a>) -> IResult<TokenSlice<'a>, Vec<ExprId>> {
    match input.0.first().map(|t| &t.kind) {
        Some(TokenKind::LParen) => {
            let (rest, _) = tag_kind(TokenKind::LParen)(input)?;
            let (rest, args) = if peek_kind(rest, &TokenKind::RParen) {
                (rest, Vec::new())
            } else {
                let (rest, first) = parse_expression(ctx, rest)?;
                let (rest, more) = many0(|i| {
                    let (i, _) = tag_kind(TokenKind::Comma)(i)?;
                    parse_expression(ctx, i)
                })
                .parse(rest)?;
                let mut args = vec![first];
                args.extend(more);
                (rest, args)
            };
            let (rest, _) = opt(tag_kind(TokenKind::RParen)).parse(rest)?;
            Ok((rest, args))
        }
        Some(TokenKind::LBrace) => {
            let span = input.0[0].span;
            let (rest, fields) = parse_table_constructor(ctx, input)?;
            let operand = ctx.arena.borrow_mut().push_operand(Operand {
                span,
                kind: OperandKind::TableConstructor(fields),
            });
            let expr = ctx.arena.borrow_mut().push_expression(Expression {
                span,
                operand,
                binary: None,
            });
            Ok((rest, vec![expr]))
        }
        Some(TokenKind::StringLit(s)) => {
            let s = s.clone();
            let span = input.0[0].span;
            let rest = TokenSlice(&input.0[1..]);
            ctx.tag(span.begin, span.end, ElementTag::LiteralString);
            let operand = ctx.arena.borrow_mut().push_operand(Operand {
                span,
                kind: OperandKind::LiteralString(s),
            });
            let expr = ctx.arena.borrow_mut().push_expression(Expression {
                span,
                operand,
                binary: None,
            });
            Ok((rest, vec![expr]))
        }
        _ => Err(token_err(input)),
    }
}

fn parse_table_constructor<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, Vec<FieldId>> {
    let (mut rest, _) = tag_kind(TokenKind::LBrace)(input)?;
    let mut fields = Vec::new();
    while !peek_kind(rest, &TokenKind::RBrace) && rest.0.first().is_some() {
        let field_start = rest;
        let kind = if peek_kind(rest, &TokenKind::LBracket) {
            let (after_bracket, _) = tag_kind(TokenKind::LBracket)(rest)?;
            let (after_key, key) = parse_expression(ctx, after_bracket)?;
            let (after_close, _) = opt(tag_kind(TokenKind::RBracket)).parse(after_key)?;
            let (after_eq, _) = opt(tag_kind(TokenKind::Equals)).parse(after_close)?;
            let (after_value, value) = parse_expression(ctx, after_eq)?;
            rest = after_value;
            FieldKind::ByExpression { key, value }
        } else if is_name_assignment(rest) {
            let Ok((after_name, (name, _))) = parse_name_token(rest) else {
                break;
            };
            let (after_eq, _) = opt(tag_kind(TokenKind::Equals)).parse(after_name)?;
            let (after_value, value) = parse_expression(ctx, after_eq)?;
            rest = after_value;
            FieldKind::ByName { name, value }
        } else {
            let (after_value, value) = parse_expression(ctx, rest)?;
            rest = after_value;
            FieldKind::Positional(value)
        };
        let span = span_of(field_start, rest, ctx.source_len);
        fields.push(ctx.arena.borrow_mut().push_field(Field { span, kind }));

        match tag_kind(TokenKind::Comma)(rest).or_else(|_| tag_kind(TokenKind::Semicolon)(rest)) {
            Ok((after_sep, _)) => rest = after_sep,
            Err(_) => break,
        }
    }
    let (rest, _) = opt(tag_kind(TokenKind::RBrace)).parse(rest)?;
    Ok((rest, fields))
}

fn is_name_assignment(input: TokenSlice) -> bool {
    matches!(input.0.first().map(|t| &t.kind), Some(TokenKind::Identifier(_)))
        && matches!(input.0.get(1).map(|t| &t.kind), Some(TokenKind::Equals))
}

// ---- function bodies ------------------------------------------------------

fn parse_function_body<'a>(
    ctx: &Ctx,
    input: TokenSlice<'a>,
) -> IResult<TokenSlice<'a>, FunctionBodyId> {
    let (rest, _) = opt(tag_kind(TokenKind::LParen)).parse(input)?;
    let mut parameters = Vec::new();
    let mut has_varargs = false;
    let mut rest = rest;
    if !peek_kind(rest, &TokenKind::RParen) {
        loop {
            if let Ok((after_dots, _)) = tag_kind(TokenKind::Varargs)(rest) {
                has_varargs = true;
                rest = after_dots;
                break;
            }
            match parse_name(ctx, rest) {
                Ok((after_name, name)) => {
                    parameters.push(name);
                    rest = after_name;
                }
                Err(_) => break,
            }
            match tag_kind(TokenKind::Comma)(rest) {
                Ok((after_comma, _)) => rest = after_comma,
                Err(_) => break,
            }
        }
    }
    let (rest, _) = opt(tag_kind(TokenKind::RParen)).parse(rest)?;
    let (rest, block) = parse_block(ctx, rest)?;
    let (rest, _) = opt(tag_kind(TokenKind::End)).parse(rest)?;
    let span = span_of(input, rest, ctx.source_len);
    let id = ctx.arena.borrow_mut().push_function_body(FunctionBody {
        span,
        parameters,
        has_varargs,
        block,
    });
    Ok((rest, id))
}

// ---- expressions ------------------------------------------------------

/// `exp ::= operand (binop exp)?` — no precedence climbing (see module
/// docs): the right-hand side is parsed by recursing into
/// `parse_expression` again, producing a flat left-to-right chain.
fn parse_expression<'a>(ctx: &Ctx, input: TokenSlice<'a>) -> IResult<TokenSlice<'a>, ExprId> {
    let (rest, operand) = parse_operand(ctx, input)?;
    let (rest, binary) = opt(|i: TokenSlice<'a>| -> IResult<TokenSlice<'a>, (BinaryOp, ExprId)> {
        let op = peek_binary_op(i).ok_or_else(|| token_err(i))?;
        let i = TokenSlice(&i.0[1..]);
        let (i, rhs) = parse_expression(ctx, i)?;
        Ok((i, (op, rhs)))
    })
    .parse(rest)?;
    let span = span_of(input, rest, ctx.source_len);
    let id = ctx.arena.borrow_mut().push_expression(Expression {
        span,
        operand,
        binary,
    });
    Ok((rest, id))
}

fn peek_binary_op(input: TokenSlice) -> Option<BinaryOp> {
    Some(match input.0.first().map(|t| &t.kind)? {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::DoubleSlash => BinaryOp::FloorDiv,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::Caret => BinaryOp::Pow,
        TokenKind::Concat => BinaryOp::Concat,
        TokenKind::Ampersand => BinaryOp::BitAnd,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::Tilde => BinaryOp::BitXor,
        TokenKind::LShift => BinaryOp::ShiftLeft,
        TokenKind::RShift => BinaryOp::ShiftRight,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Lte => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Gte => BinaryOp::Ge,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::Neq => BinaryOp::Neq,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        _ => return None,
    })
}

fn parse_operand<'a>(ctx: &Ctx, input: TokenSlice<'a>) -> IResult<TokenSlice<'a>, OperandId> {
    let span = input
        .0
        .first()
        .map(|t| t.span)
        .unwrap_or(Span::new(ctx.source_len, ctx.source_len));

    let (rest, kind) = match input.0.first().map(|t| &t.kind) {
        Some(TokenKind::Nil) => (TokenSlice(&input.0[1..]), OperandKind::Nil),
        Some(TokenKind::True) => (TokenSlice(&input.0[1..]), OperandKind::True),
        Some(TokenKind::False) => (TokenSlice(&input.0[1..]), OperandKind::False),
        Some(TokenKind::Varargs) => (TokenSlice(&input.0[1..]), OperandKind::Dots),
        Some(TokenKind::Number(n)) => {
            let n = n.clone();
            ctx.tag(span.begin, span.end, ElementTag::Numeral);
            (TokenSlice(&input.0[1..]), OperandKind::Numeral(n))
        }
        Some(TokenKind::StringLit(s)) => {
            let s = s.clone();
            ctx.tag(span.begin, span.end, ElementTag::LiteralString);
            (TokenSlice(&input.0[1..]), OperandKind::LiteralString(s))
        }
        Some(TokenKind::Function) => {
            let (rest, body) = parse_function_body(ctx, TokenSlice(&input.0[1..]))?;
            (rest, OperandKind::FunctionBody(body))
        }
        Some(TokenKind::LBrace) => {
            let (rest, fields) = parse_table_constructor(ctx, input)?;
            (rest, OperandKind::TableConstructor(fields))
        }
        Some(TokenKind::Minus) => {
            let (rest, expr) = parse_expression(ctx, TokenSlice(&input.0[1..]))?;
            (
                rest,
                OperandKind::UnaryOp {
                    op: UnaryOp::Minus,
                    expr,
                },
            )
        }
        Some(TokenKind::Not) => {
            let (rest, expr) = parse_expression(ctx, TokenSlice(&input.0[1..]))?;
            (
                rest,
                OperandKind::UnaryOp {
                    op: UnaryOp::Not,
                    expr,
                },
            )
        }
        Some(TokenKind::Tilde) => {
            let (rest, expr) = parse_expression(ctx, TokenSlice(&input.0[1..]))?;
            (
                rest,
                OperandKind::UnaryOp {
                    op: UnaryOp::BitNot,
                    expr,
                },
            )
        }
        Some(TokenKind::Hash) => {
            let (rest, expr) = parse_expression(ctx, TokenSlice(&input.0[1..]))?;
            (
                rest,
                OperandKind::UnaryOp {
                    op: UnaryOp::Length,
                    expr,
                },
            )
        }
        Some(TokenKind::Identifier(_)) | Some(TokenKind::LParen) => match parse_prefix(ctx, input)
        {
            Ok((rest, prefix)) => (rest, OperandKind::Prefix(prefix)),
            Err(_) => (input, OperandKind::Nil),
        },
        _ => {
            // Recovery for an incomplete/invalid buffer: an empty
            // operand that consumes nothing, so the caller's loop still
            // terminates instead of spinning.
            (input, OperandKind::Nil)
        }
    };
    let end_span = span_of(input, rest, ctx.source_len);
    let span = Span::new(span.begin, end_span.end.max(span.begin));
    let id = ctx.arena.borrow_mut().push_operand(Operand { span, kind });
    Ok((rest, id))
}

/// Small helper so statement parsers can fall back to an empty
/// name/zero-width span when a name is missing from a mid-editing
/// buffer, without every call site repeating the same
/// `unwrap_or((input, (String::new(), Span::default())))`.
trait NameTokenResultExt<'a> {
    fn unwrap_or_default_name(self, fallback_rest: TokenSlice<'a>) -> (TokenSlice<'a>, (String, Span));
}

impl<'a> NameTokenResultExt<'a> for IResult<TokenSlice<'a>, (String, Span)> {
    fn unwrap_or_default_name(self, fallback_rest: TokenSlice<'a>) -> (TokenSlice<'a>, (String, Span)) {
        self.unwrap_or((fallback_rest, (String::new(), Span::default())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_block_of(source: &str) -> (Arena, BlockId) {
        let result = parse(source);
        (result.arena, result.root)
    }

    #[test]
    fn parses_local_assignment() {
        let (arena, block) = parse_block_of("local x = 1");
        let stmt = arena.statement(arena.block(block).statements[0]);
        match &stmt.kind {
            StatementKind::LocalAssignment { names, expressions } => {
                assert_eq!(names, &["x".to_string()]);
                assert!(expressions.is_some());
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_function_call_statement() {
        let (arena, block) = parse_block_of("print(\"hi\")");
        let stmt = arena.statement(arena.block(block).statements[0]);
        match &stmt.kind {
            StatementKind::FunctionCall(call) => {
                let prefix = arena.call(*call);
                assert_eq!(prefix.head_name(), Some("print"));
                assert!(prefix.ends_in_call());
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_method_call_chain() {
        let (arena, block) = parse_block_of("a:b():c()");
        let stmt = arena.statement(arena.block(block).statements[0]);
        match &stmt.kind {
            StatementKind::FunctionCall(call) => {
                let prefix = arena.call(*call);
                assert_eq!(prefix.postfixes.len(), 2);
                assert!(matches!(
                    prefix.postfixes[0].kind,
                    PostfixKind::Call { method: Some(ref m), .. } if m == "b"
                ));
                assert!(matches!(
                    prefix.postfixes[1].kind,
                    PostfixKind::Call { method: Some(ref m), .. } if m == "c"
                ));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_if_elseif_else() {
        let (arena, block) = parse_block_of(
            "if a then\n b = 1\nelseif c then\n b = 2\nelse\n b = 3\nend",
        );
        let stmt = arena.statement(arena.block(block).statements[0]);
        match &stmt.kind {
            StatementKind::IfThenElse {
                rest, else_block, ..
            } => {
                assert_eq!(rest.len(), 1);
                assert!(else_block.is_some());
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_numeric_for() {
        let (arena, block) = parse_block_of("for i = 1, 10, 2 do end");
        let stmt = arena.statement(arena.block(block).statements[0]);
        match &stmt.kind {
            StatementKind::NumericFor { var, step, .. } => {
                assert_eq!(var, "i");
                assert!(step.is_some());
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_generic_for() {
        let (arena, block) = parse_block_of("for k, v in pairs(t) do end");
        let stmt = arena.statement(arena.block(block).statements[0]);
        match &stmt.kind {
            StatementKind::GenericFor { vars, .. } => {
                assert_eq!(vars, &["k".to_string(), "v".to_string()]);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_function_declaration_with_dotted_name() {
        let (arena, block) = parse_block_of("function M.foo(a, b) return a end");
        let stmt = arena.statement(arena.block(block).statements[0]);
        match &stmt.kind {
            StatementKind::FunctionDecl { name, body } => {
                assert_eq!(name.base, "M");
                assert_eq!(name.path, vec!["foo".to_string()]);
                let fb = arena.function_body(*body);
                assert_eq!(fb.parameters, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn method_declaration_gets_implicit_self() {
        let (arena, block) = parse_block_of("function M:foo(a) end");
        let stmt = arena.statement(arena.block(block).statements[0]);
        match &stmt.kind {
            StatementKind::FunctionDecl { name, body } => {
                assert_eq!(name.method, Some("foo".to_string()));
                let fb = arena.function_body(*body);
                assert_eq!(fb.parameters[0], "self");
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_table_constructor_fields() {
        let (arena, block) = parse_block_of("local t = { 1, x = 2, [3+1] = 4 }");
        let stmt = arena.statement(arena.block(block).statements[0]);
        if let StatementKind::LocalAssignment {
            expressions: Some(exprs),
            ..
        } = &stmt.kind
        {
            let expr = arena.expression(exprs[0]);
            let operand = arena.operand(expr.operand);
            match &operand.kind {
                OperandKind::TableConstructor(fields) => {
                    assert_eq!(fields.len(), 3);
                    assert!(matches!(
                        arena.field(fields[0]).kind,
                        FieldKind::Positional(_)
                    ));
                    assert!(matches!(
                        arena.field(fields[1]).kind,
                        FieldKind::ByName { .. }
                    ));
                    assert!(matches!(
                        arena.field(fields[2]).kind,
                        FieldKind::ByExpression { .. }
                    ));
                }
                other => panic!("unexpected operand: {other:?}"),
            }
        } else {
            panic!("unexpected statement: {:?}", stmt.kind);
        }
    }

    #[test]
    fn expression_chain_has_no_precedence() {
        let (arena, block) = parse_block_of("local x = 1 + 2 * 3");
        let stmt = arena.statement(arena.block(block).statements[0]);
        if let StatementKind::LocalAssignment {
            expressions: Some(exprs),
            ..
        } = &stmt.kind
        {
            let top = arena.expression(exprs[0]);
            let (op, rhs) = top.binary.expect("expected a binary chain");
            assert_eq!(op, BinaryOp::Add);
            let rhs_expr = arena.expression(rhs);
            let (rhs_op, _) = rhs_expr.binary.expect("rhs should also be a chain");
            assert_eq!(rhs_op, BinaryOp::Mul);
        } else {
            panic!("unexpected statement: {:?}", stmt.kind);
        }
    }

    #[test]
    fn variable_or_function_parses_bare_trailing_colon() {
        let (arena, id) = parse_variable_or_function("foo.bar:baz").unwrap();
        let node = &arena.variable_or_functions[id.0 as usize];
        assert_eq!(node.member, Some("baz".to_string()));
        let head = arena.prefix(node.head);
        assert_eq!(head.head_name(), Some("foo"));
        assert_eq!(head.postfixes.len(), 1);
    }

    #[test]
    fn variable_or_function_treats_completed_call_as_postfix() {
        let (arena, id) = parse_variable_or_function("foo:bar()").unwrap();
        let node = &arena.variable_or_functions[id.0 as usize];
        assert_eq!(node.member, None);
        let head = arena.prefix(node.head);
        assert!(head.ends_in_call());
    }
}
