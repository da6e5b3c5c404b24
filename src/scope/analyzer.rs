//! A single pre-order walk over the AST arena that builds the
//! `ScopeArena` bottom-up and, along the way, types every local/global
//! binding it introduces. One `match` per AST node kind (statement,
//! expression via `typing::expr_type`) — no shared visitor abstraction,
//! since the passes don't share behavior.

use crate::ast::{Arena, BlockId, DottedName, ExprId, FunctionBodyId, StatementKind, StmtId, VariableId};
use crate::types::{FunctionSignature, Type, TypeInfo, UserDefined};

use super::typing::expr_type;
use super::{ScopeArena, ScopeId, ScopeNode, ScopeView};

/// Builds the full scope tree for a freshly-parsed program. Called by
/// `Session::update_program` after a successful parse.
pub fn analyze_program(arena: &Arena, root_block: BlockId, user_defined: &UserDefined) -> (ScopeArena, ScopeId) {
    let mut scopes = ScopeArena::new();
    let root = scopes.push(ScopeNode::new(root_block, None));
    analyze_block_body(arena, root_block, root, &mut scopes, user_defined);
    (scopes, root)
}

fn analyze_block_body(arena: &Arena, block_id: BlockId, scope_id: ScopeId, scopes: &mut ScopeArena, user_defined: &UserDefined) {
    let block = arena.block(block_id);
    let statements = block.statements.clone();
    for stmt_id in statements {
        analyze_statement(arena, stmt_id, scope_id, scopes, user_defined);
    }
    let return_exprs = arena.block(block_id).return_statement.as_ref().map(|r| r.expressions.clone());
    if let Some(exprs) = return_exprs {
        let view = ScopeView { scopes, scope: scope_id, user_defined };
        for expr in exprs {
            let _ = expr_type(arena, expr, &view);
        }
    }
}

fn type_exprs(arena: &Arena, exprs: &[ExprId], scope_id: ScopeId, scopes: &ScopeArena, user_defined: &UserDefined) -> Vec<TypeInfo> {
    let view = ScopeView { scopes, scope: scope_id, user_defined };
    exprs.iter().map(|&e| expr_type(arena, e, &view)).collect()
}

fn analyze_statement(arena: &Arena, stmt_id: StmtId, scope_id: ScopeId, scopes: &mut ScopeArena, user_defined: &UserDefined) {
    // Cloned once per statement: the AST is small and immutable, and
    // cloning sidesteps holding a borrow of `arena` across the `&mut
    // scopes` mutations every branch below needs.
    let kind = arena.statement(stmt_id).kind.clone();
    match kind {
        StatementKind::Empty | StatementKind::Break | StatementKind::Goto(_) => {}
        // Position/type info for a bare call statement is recomputed on
        // demand by cursor queries; there is nothing to bind here.
        StatementKind::FunctionCall(_) => {}
        StatementKind::Label(name) => {
            scopes.node_mut(scope_id).labels.push(name);
        }
        StatementKind::LocalAssignment { names, expressions } => {
            let values = match &expressions {
                Some(exprs) => type_exprs(arena, exprs, scope_id, scopes, user_defined),
                None => Vec::new(),
            };
            let node = scopes.node_mut(scope_id);
            for (i, name) in names.into_iter().enumerate() {
                let ty = values.get(i).cloned().unwrap_or_else(TypeInfo::unknown);
                node.variables.push((name, ty));
            }
        }
        StatementKind::Assignment { variables, expressions } => {
            let values = type_exprs(arena, &expressions, scope_id, scopes, user_defined);
            for (i, var_id) in variables.into_iter().enumerate() {
                let ty = values.get(i).cloned().unwrap_or_else(TypeInfo::unknown);
                assign_variable(arena, var_id, ty, scope_id, scopes);
            }
        }
        StatementKind::Do(body) => descend(arena, body, scope_id, scopes, user_defined, Vec::new()),
        StatementKind::While { body, .. } => descend(arena, body, scope_id, scopes, user_defined, Vec::new()),
        StatementKind::Repeat { body, .. } => descend(arena, body, scope_id, scopes, user_defined, Vec::new()),
        StatementKind::IfThenElse { first, rest, else_block } => {
            descend(arena, first.block, scope_id, scopes, user_defined, Vec::new());
            for branch in rest {
                descend(arena, branch.block, scope_id, scopes, user_defined, Vec::new());
            }
            if let Some(else_b) = else_block {
                descend(arena, else_b, scope_id, scopes, user_defined, Vec::new());
            }
        }
        StatementKind::NumericFor { var, body, .. } => {
            descend(arena, body, scope_id, scopes, user_defined, vec![(var, TypeInfo::number())]);
        }
        StatementKind::GenericFor { vars, expressions, body } => {
            let values = type_exprs(arena, &expressions, scope_id, scopes, user_defined);
            let bindings = vars
                .into_iter()
                .enumerate()
                .map(|(i, name)| (name, values.get(i).cloned().unwrap_or_else(TypeInfo::unknown)))
                .collect();
            descend(arena, body, scope_id, scopes, user_defined, bindings);
        }
        StatementKind::FunctionDecl { name, body } => {
            analyze_function_decl(arena, &name, body, scope_id, scopes, user_defined);
        }
        StatementKind::LocalFunctionDecl { name, body } => {
            analyze_local_function_decl(arena, &name, body, scope_id, scopes, user_defined);
        }
    }
}

/// Pushes a child scope for `body`, pre-populated with `bindings`
/// (loop variables; empty for plain control-flow blocks), and recurses.
fn descend(
    arena: &Arena,
    body: BlockId,
    parent: ScopeId,
    scopes: &mut ScopeArena,
    user_defined: &UserDefined,
    bindings: Vec<(String, TypeInfo)>,
) {
    let mut node = ScopeNode::new(body, Some(parent));
    node.variables = bindings;
    let child = scopes.push(node);
    scopes.node_mut(parent).children.push(child);
    analyze_block_body(arena, body, child, scopes, user_defined);
}

fn function_params(arena: &Arena, body_id: FunctionBodyId) -> Vec<(String, TypeInfo)> {
    arena
        .function_body(body_id)
        .parameters
        .iter()
        .cloned()
        .map(|name| (name, TypeInfo::unknown()))
        .collect()
}

fn analyze_function_decl(
    arena: &Arena,
    name: &DottedName,
    body_id: FunctionBodyId,
    scope_id: ScopeId,
    scopes: &mut ScopeArena,
    user_defined: &UserDefined,
) {
    let mut params = function_params(arena, body_id);
    if name.is_simple() {
        if let Some(sig) = user_defined.script_input(&name.base) {
            for (param, declared) in params.iter_mut().zip(sig.parameters.iter()) {
                param.1 = declared.1.clone();
            }
        }
    }

    let sig = FunctionSignature::new(name.method.is_some(), params.clone(), Vec::new());
    let mut func_type = TypeInfo::new(Type::Function);
    func_type.function = Some(sig);

    let mut effective_path = name.path.clone();
    if let Some(method) = &name.method {
        effective_path.push(method.clone());
    }

    if effective_path.is_empty() {
        scopes.node_mut(scope_id).functions.push((name.base.clone(), func_type));
    } else {
        let (owner, idx) = resolve_or_create_binding(scopes, scope_id, &name.base);
        let binding = &mut scopes.node_mut(owner).variables[idx].1;
        assign_member_path(binding, &effective_path, func_type);
    }

    let body_block = arena.function_body(body_id).block;
    descend(arena, body_block, scope_id, scopes, user_defined, params);
}

fn analyze_local_function_decl(
    arena: &Arena,
    name: &str,
    body_id: FunctionBodyId,
    scope_id: ScopeId,
    scopes: &mut ScopeArena,
    user_defined: &UserDefined,
) {
    let params = function_params(arena, body_id);
    let sig = FunctionSignature::new(false, params.clone(), Vec::new());
    let mut func_type = TypeInfo::new(Type::Function);
    func_type.function = Some(sig);
    // Bound before the body is analyzed so a recursive call inside the
    // body resolves to this binding.
    scopes.node_mut(scope_id).variables.push((name.to_string(), func_type));

    let body_block = arena.function_body(body_id).block;
    descend(arena, body_block, scope_id, scopes, user_defined, params);
}

/// Finds the scope that already binds `name` (any ancestor, innermost
/// first), or creates it fresh as a `table`-kinded global in the root
/// scope: a write to an unbound global in Lua creates it on the spot.
fn resolve_or_create_binding(scopes: &mut ScopeArena, scope_id: ScopeId, name: &str) -> (ScopeId, usize) {
    let mut cur = Some(scope_id);
    while let Some(id) = cur {
        if let Some(idx) = scopes.node(id).variables.iter().rposition(|(n, _)| n == name) {
            return (id, idx);
        }
        cur = scopes.parent_of(id);
    }
    let root = scopes.root();
    scopes.node_mut(root).variables.push((name.to_string(), TypeInfo::table()));
    (root, scopes.node(root).variables.len() - 1)
}

/// `a.b.c = value`: walks the member path, creating intermediate
/// `table`-kinded members as needed, and binds the leaf.
fn assign_member_path(root: &mut TypeInfo, path: &[String], value: TypeInfo) {
    if !matches!(root.kind, Type::Table | Type::Userdata) {
        *root = TypeInfo::table();
    }
    let mut current = root;
    for seg in &path[..path.len() - 1] {
        current = current.members.entry(seg.clone()).or_insert_with(TypeInfo::table);
        if !matches!(current.kind, Type::Table | Type::Userdata) {
            *current = TypeInfo::table();
        }
    }
    let leaf = path.last().expect("non-empty path");
    current.members.insert(leaf.clone(), value);
}

/// `a[expr] = value` (or any path segment that hits an index
/// expression): the walk stops there. The containing table is still
/// forced to `table` kind, but the indexed member itself is left
/// unbound.
fn ensure_table_path(root: &mut TypeInfo, path: &[String]) {
    if !matches!(root.kind, Type::Table | Type::Userdata) {
        *root = TypeInfo::table();
    }
    let mut current = root;
    for seg in path {
        current = current.members.entry(seg.clone()).or_insert_with(TypeInfo::table);
        if !matches!(current.kind, Type::Table | Type::Userdata) {
            *current = TypeInfo::table();
        }
    }
}

fn assign_variable(arena: &Arena, var_id: VariableId, value: TypeInfo, scope_id: ScopeId, scopes: &mut ScopeArena) {
    let prefix = arena.variable(var_id);
    let Some(base) = prefix.head_name() else {
        // `(expr).field = value`: the base isn't a simple name, so there
        // is no binding to mutate.
        return;
    };
    let base = base.to_string();

    let mut path = Vec::new();
    let mut truncated = false;
    for postfix in &prefix.postfixes {
        match &postfix.kind {
            crate::ast::PostfixKind::Field(name) => path.push(name.clone()),
            _ => {
                truncated = true;
                break;
            }
        }
    }

    let (owner, idx) = resolve_or_create_binding(scopes, scope_id, &base);
    let binding = &mut scopes.node_mut(owner).variables[idx].1;

    if path.is_empty() && !truncated {
        *binding = value;
        return;
    }
    if truncated {
        ensure_table_path(binding, &path);
    } else {
        assign_member_path(binding, &path, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn analyze(source: &str) -> (ScopeArena, ScopeId, Arena) {
        let result = parse(source);
        let user_defined = UserDefined::new();
        let (scopes, root) = analyze_program(&result.arena, result.root, &user_defined);
        (scopes, root, result.arena)
    }

    #[test]
    fn local_assignment_binds_rhs_type() {
        let (scopes, root, _) = analyze("local x = 1\nlocal y = \"s\"\nlocal z");
        let user_defined = UserDefined::new();
        assert_eq!(scopes.variable_type(root, "x", &user_defined).kind, Type::Number);
        assert_eq!(scopes.variable_type(root, "y", &user_defined).kind, Type::Str);
        assert_eq!(scopes.variable_type(root, "z", &user_defined).kind, Type::Unknown);
    }

    #[test]
    fn global_assignment_creates_table_then_member() {
        let (scopes, root, _) = analyze("t = {}\nt.x = 1");
        let user_defined = UserDefined::new();
        let t = scopes.variable_type(root, "t", &user_defined);
        assert_eq!(t.kind, Type::Table);
        assert_eq!(t.members.get("x").unwrap().kind, Type::Number);
    }

    #[test]
    fn dotted_function_decl_becomes_table_member() {
        let (scopes, root, _) = analyze("function M.foo(a) end");
        let user_defined = UserDefined::new();
        let m = scopes.variable_type(root, "M", &user_defined);
        assert_eq!(m.kind, Type::Table);
        let foo = m.members.get("foo").unwrap();
        assert_eq!(foo.kind, Type::Function);
        assert_eq!(foo.function.as_ref().unwrap().parameters.len(), 1);
    }

    #[test]
    fn simple_function_decl_goes_in_functions_list() {
        let (scopes, root, _) = analyze("function greet(name) end");
        let user_defined = UserDefined::new();
        assert_eq!(scopes.function_type(root, "greet", &user_defined).kind, Type::Function);
        // Not shadowed into the variable namespace.
        assert_eq!(scopes.variable_type(root, "greet", &user_defined).kind, Type::Nil);
    }

    #[test]
    fn if_branches_get_distinct_child_scopes() {
        let (scopes, root, _) = analyze("if true then local a = 1 else local b = 2 end");
        assert_eq!(scopes.children_of(root).len(), 2);
    }

    #[test]
    fn numeric_for_binds_loop_variable_as_number() {
        let (scopes, root, _) = analyze("for i = 1, 10 do local x = i end");
        let child = scopes.children_of(root)[0];
        let user_defined = UserDefined::new();
        assert_eq!(scopes.variable_type(child, "i", &user_defined).kind, Type::Number);
    }

    #[test]
    fn local_function_is_visible_inside_its_own_body() {
        let (scopes, root, _) = analyze("local function fact(n) return fact(n) end");
        let child = scopes.children_of(root)[0];
        let user_defined = UserDefined::new();
        assert_eq!(scopes.variable_type(child, "fact", &user_defined).kind, Type::Function);
    }

    #[test]
    fn index_assignment_marks_table_without_binding_member() {
        let (scopes, root, _) = analyze("t = {}\nt[1] = 5");
        let user_defined = UserDefined::new();
        let t = scopes.variable_type(root, "t", &user_defined);
        assert_eq!(t.kind, Type::Table);
        assert!(t.members.is_empty());
    }

    #[test]
    fn script_input_override_replaces_unknown_param_type() {
        let mut user_defined = UserDefined::new();
        user_defined.add_script_input(
            "run",
            FunctionSignature::new(false, vec![("player".into(), TypeInfo::new(Type::Userdata).with_name("Player"))], Vec::new()),
        );
        let result = parse("function run(player) end");
        let (scopes, root) = analyze_program(&result.arena, result.root, &user_defined);
        let sig_type = scopes.function_type(root, "run", &user_defined);
        let sig = sig_type.function.unwrap();
        assert_eq!(sig.parameters[0].1.kind, Type::Userdata);
        assert_eq!(sig.parameters[0].1.name, "Player");
    }
}
