//! Visible-identifier and member-completion support.

use crate::types::{Type, TypeInfo, UserDefined};

use super::{function_signature_type, Element, ElementKind, ElementsMap, MemberFilter, ScopeArena, ScopeId};

/// Visible identifiers at `scope`: locals shadow outer bindings of the
/// same name, and with `local_only = false` the chain's end folds in the
/// host's ambient `UserDefined` environment (conceptually the implicit
/// outermost scope).
pub fn get_elements(scopes: &ScopeArena, scope: ScopeId, local_only: bool, user_defined: &UserDefined) -> ElementsMap {
    let mut map = ElementsMap::new();
    let mut cur = Some(scope);
    while let Some(id) = cur {
        let is_local = id == scope;
        let node = scopes.node(id);
        for (name, ty) in &node.variables {
            map.entry(name.clone()).or_insert_with(|| Element {
                name: name.clone(),
                kind: ElementKind::Variable,
                type_info: ty.clone(),
                is_local,
            });
        }
        for (name, ty) in &node.functions {
            map.entry(name.clone()).or_insert_with(|| Element {
                name: name.clone(),
                kind: ElementKind::Function,
                type_info: ty.clone(),
                is_local,
            });
        }
        for label in &node.labels {
            map.entry(label.clone()).or_insert_with(|| Element {
                name: label.clone(),
                kind: ElementKind::Label,
                type_info: TypeInfo::nil(),
                is_local,
            });
        }
        if local_only {
            break;
        }
        cur = scopes.parent_of(id);
    }

    if !local_only {
        for (name, ty) in user_defined.variables() {
            map.entry(name.clone()).or_insert_with(|| Element {
                name: name.clone(),
                kind: ElementKind::Variable,
                type_info: ty.clone(),
                is_local: false,
            });
        }
        for (name, sig) in user_defined.free_functions() {
            map.entry(name.clone()).or_insert_with(|| Element {
                name: name.clone(),
                kind: ElementKind::Function,
                type_info: function_signature_type(sig),
                is_local: false,
            });
        }
    }

    map
}

/// Member-completion list for `foo.`/`foo:`: `type_info`'s members,
/// optionally filtered to just methods or just non-methods.
pub fn elements_of_type(type_info: &TypeInfo, filter: Option<MemberFilter>) -> ElementsMap {
    let mut map = ElementsMap::new();
    for (name, ty) in &type_info.members {
        let is_method = ty.kind == Type::Function && ty.is_method();
        let keep = match filter {
            Some(MemberFilter::Methods) => is_method,
            Some(MemberFilter::NonMethods) => !is_method,
            None => true,
        };
        if !keep {
            continue;
        }
        let kind = if ty.kind == Type::Function { ElementKind::Function } else { ElementKind::Variable };
        map.insert(
            name.clone(),
            Element { name: name.clone(), kind, type_info: ty.clone(), is_local: false },
        );
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BlockId;
    use crate::scope::ScopeNode;
    use crate::types::FunctionSignature;

    #[test]
    fn local_only_excludes_outer_and_host_bindings() {
        let mut scopes = ScopeArena::new();
        let root = scopes.push(ScopeNode::new(BlockId(0), None));
        scopes.node_mut(root).variables.push(("outer".into(), TypeInfo::number()));
        let child = scopes.push(ScopeNode::new(BlockId(1), Some(root)));
        scopes.node_mut(child).variables.push(("inner".into(), TypeInfo::string()));

        let mut user_defined = UserDefined::new();
        user_defined.add_variable("host_global", TypeInfo::boolean());

        let local = get_elements(&scopes, child, true, &user_defined);
        assert!(local.contains_key("inner"));
        assert!(!local.contains_key("outer"));
        assert!(!local.contains_key("host_global"));

        let full = get_elements(&scopes, child, false, &user_defined);
        assert!(full.contains_key("inner"));
        assert!(full.contains_key("outer"));
        assert!(full.contains_key("host_global"));
        assert!(full["inner"].is_local);
        assert!(!full["outer"].is_local);
    }

    #[test]
    fn shadowing_keeps_innermost_binding() {
        let mut scopes = ScopeArena::new();
        let root = scopes.push(ScopeNode::new(BlockId(0), None));
        scopes.node_mut(root).variables.push(("x".into(), TypeInfo::number()));
        let child = scopes.push(ScopeNode::new(BlockId(1), Some(root)));
        scopes.node_mut(child).variables.push(("x".into(), TypeInfo::string()));

        let user_defined = UserDefined::new();
        let elements = get_elements(&scopes, child, false, &user_defined);
        assert_eq!(elements["x"].type_info.kind, Type::Str);
    }

    #[test]
    fn member_filter_splits_methods_from_fields() {
        let mut table = TypeInfo::table();
        table.members.insert("name".into(), TypeInfo::string());
        let method_sig = FunctionSignature::new(true, Vec::new(), Vec::new());
        let mut method = TypeInfo::new(Type::Function);
        method.function = Some(method_sig);
        table.members.insert("heal".into(), method);

        let methods_only = elements_of_type(&table, Some(MemberFilter::Methods));
        assert!(methods_only.contains_key("heal"));
        assert!(!methods_only.contains_key("name"));

        let fields_only = elements_of_type(&table, Some(MemberFilter::NonMethods));
        assert!(fields_only.contains_key("name"));
        assert!(!fields_only.contains_key("heal"));
    }
}
