//! Expression typing. Pure: reads the AST arena and queries a scope
//! chain, but never mutates either — scope *construction* lives in
//! [`super::analyzer`].

use crate::ast::{
    Arena, BinaryOp, ExprId, FieldKind, OperandId, OperandKind, PrefixHead, PrefixId, UnaryOp,
};
use crate::types::{ScopeLookup, Type, TypeInfo};

use super::subtype::sub_type;

pub fn expr_type(arena: &Arena, expr_id: ExprId, lookup: &dyn ScopeLookup) -> TypeInfo {
    let expr = arena.expression(expr_id);
    let lhs = operand_type(arena, expr.operand, lookup);
    match expr.binary {
        None => lhs,
        Some((op, rhs_id)) => {
            let rhs = expr_type(arena, rhs_id, lookup);
            binary_type(op, &lhs, &rhs)
        }
    }
}

fn operand_type(arena: &Arena, operand_id: OperandId, lookup: &dyn ScopeLookup) -> TypeInfo {
    let operand = arena.operand(operand_id);
    match &operand.kind {
        OperandKind::Nil => TypeInfo::nil(),
        OperandKind::True | OperandKind::False => TypeInfo::boolean(),
        // `...` carries no static element type in this model.
        OperandKind::Dots => TypeInfo::unknown(),
        OperandKind::Numeral(_) => TypeInfo::number(),
        OperandKind::LiteralString(_) => TypeInfo::string(),
        OperandKind::UnaryOp { op, expr } => unary_type(*op, &expr_type(arena, *expr, lookup)),
        OperandKind::TableConstructor(fields) => table_type(arena, fields, lookup),
        OperandKind::FunctionBody(fb_id) => function_body_type(arena, *fb_id),
        OperandKind::Prefix(prefix_id) => prefix_type(arena, *prefix_id, lookup),
    }
}

fn unary_type(op: UnaryOp, inner: &TypeInfo) -> TypeInfo {
    match op {
        UnaryOp::Minus | UnaryOp::BitNot => {
            if inner.convert(Type::Number).kind == Type::Error {
                TypeInfo::error()
            } else {
                TypeInfo::number()
            }
        }
        UnaryOp::Length => {
            if matches!(inner.kind, Type::Str | Type::Table) {
                TypeInfo::number()
            } else {
                TypeInfo::error()
            }
        }
        UnaryOp::Not => TypeInfo::boolean(),
    }
}

fn table_type(arena: &Arena, fields: &[crate::ast::FieldId], lookup: &dyn ScopeLookup) -> TypeInfo {
    let mut info = TypeInfo::table();
    let mut index = 1usize;
    for &field_id in fields {
        match &arena.field(field_id).kind {
            FieldKind::Positional(value) => {
                let vt = expr_type(arena, *value, lookup);
                info.members.insert(index.to_string(), vt);
                index += 1;
            }
            FieldKind::ByName { name, value } => {
                let vt = expr_type(arena, *value, lookup);
                info.members.insert(name.clone(), vt);
            }
            // The key itself is not staticly known; nothing to bind.
            FieldKind::ByExpression { .. } => {}
        }
    }
    info
}

fn function_body_type(arena: &Arena, fb_id: crate::ast::FunctionBodyId) -> TypeInfo {
    let fb = arena.function_body(fb_id);
    let parameters = fb
        .parameters
        .iter()
        .cloned()
        .map(|name| (name, TypeInfo::unknown()))
        .collect();
    // Return types are not inferred from a function body's `return`
    // statements; only parameter arity/names are visible here.
    TypeInfo::create_function(parameters, Vec::new(), None, None)
}

fn prefix_type(arena: &Arena, prefix_id: PrefixId, lookup: &dyn ScopeLookup) -> TypeInfo {
    let prefix = arena.prefix(prefix_id);
    let mut current = match &prefix.head {
        PrefixHead::Name(name) => {
            let vt = lookup.variable_type(name);
            if vt.kind != Type::Nil {
                vt
            } else {
                lookup.function_type(name)
            }
        }
        PrefixHead::Bracketed(e) => expr_type(arena, *e, lookup),
    };
    for postfix in &prefix.postfixes {
        current = sub_type(arena, &current, &postfix.kind, lookup);
    }
    current
}

fn binary_type(op: BinaryOp, lhs: &TypeInfo, rhs: &TypeInfo) -> TypeInfo {
    use BinaryOp::*;
    match op {
        Add | Sub | Mul | Div | FloorDiv | Mod | Pow | BitAnd | BitOr | BitXor | ShiftLeft
        | ShiftRight => {
            let l = lhs.convert(Type::Number);
            let r = rhs.convert(Type::Number);
            if l.kind == Type::Error || r.kind == Type::Error {
                TypeInfo::error()
            } else {
                TypeInfo::number()
            }
        }
        Concat => {
            let l = lhs.convert(Type::Str);
            let r = rhs.convert(Type::Str);
            if l.kind == Type::Error || r.kind == Type::Error {
                TypeInfo::error()
            } else {
                TypeInfo::string()
            }
        }
        Lt | Le | Gt | Ge => {
            if matches!(lhs.kind, Type::Number | Type::Str) && lhs.kind == rhs.kind {
                TypeInfo::boolean()
            } else {
                TypeInfo::error()
            }
        }
        Eq | Neq => TypeInfo::boolean(),
        And | Or => {
            if lhs.kind == rhs.kind {
                TypeInfo::new(lhs.kind)
            } else if lhs.is_truthy() || rhs.is_truthy() {
                TypeInfo::unknown()
            } else {
                TypeInfo::error()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::scope::{ScopeArena, ScopeNode, ScopeView};
    use crate::types::UserDefined;

    fn empty_scope() -> (ScopeArena, crate::scope::ScopeId) {
        let mut scopes = ScopeArena::new();
        let root = scopes.push(ScopeNode::new(crate::ast::BlockId(0), None));
        (scopes, root)
    }

    fn type_of_first_return_expr(source: &str) -> TypeInfo {
        let result = parse(source);
        let block = result.arena.block(result.root);
        let ret = block.return_statement.as_ref().expect("return statement");
        let expr = ret.expressions[0];
        let (scopes, root) = empty_scope();
        let user_defined = UserDefined::new();
        let view = ScopeView {
            scopes: &scopes,
            scope: root,
            user_defined: &user_defined,
        };
        expr_type(&result.arena, expr, &view)
    }

    #[test]
    fn numeral_and_string_literals() {
        assert_eq!(type_of_first_return_expr("return 1").kind, Type::Number);
        assert_eq!(type_of_first_return_expr("return \"hi\"").kind, Type::Str);
        assert_eq!(type_of_first_return_expr("return true").kind, Type::Boolean);
        assert_eq!(type_of_first_return_expr("return nil").kind, Type::Nil);
    }

    #[test]
    fn arithmetic_on_number_and_string_succeeds() {
        assert_eq!(type_of_first_return_expr("return 1 + 2").kind, Type::Number);
        assert_eq!(type_of_first_return_expr("return \"1\" + 2").kind, Type::Number);
    }

    #[test]
    fn arithmetic_on_table_is_error() {
        assert_eq!(type_of_first_return_expr("return 1 + {}").kind, Type::Error);
    }

    #[test]
    fn concat_on_numbers_is_string() {
        assert_eq!(type_of_first_return_expr("return 1 .. 2").kind, Type::Str);
    }

    #[test]
    fn unary_length_on_table_is_number() {
        assert_eq!(type_of_first_return_expr("return #{1, 2, 3}").kind, Type::Number);
    }

    #[test]
    fn table_constructor_binds_positional_and_named_fields() {
        let result = parse("return {1, x = \"y\"}");
        let block = result.arena.block(result.root);
        let ret = block.return_statement.as_ref().unwrap();
        let (scopes, root) = empty_scope();
        let user_defined = UserDefined::new();
        let view = ScopeView {
            scopes: &scopes,
            scope: root,
            user_defined: &user_defined,
        };
        let info = expr_type(&result.arena, ret.expressions[0], &view);
        assert_eq!(info.kind, Type::Table);
        assert_eq!(info.members.get("1").unwrap().kind, Type::Number);
        assert_eq!(info.members.get("x").unwrap().kind, Type::Str);
    }
}
