//! Folds one `PrefixExpr` postfix onto the `TypeInfo` of whatever
//! precedes it.

use crate::ast::{Arena, PostfixKind};
use crate::types::{ScopeLookup, TypeInfo};

use super::typing::expr_type;

/// `.name` / `:name` resolve a table/userdata member (default `nil`);
/// `[expr]` is always `nil` (the key is not statically known); a call
/// postfix resolves the callee's signature — from `parent` itself for a
/// bare `(args)` call, or from `parent`'s member for a `:name(args)`
/// method call — and returns its first declared result, folding a
/// `result_type_resolver` over the call's argument types when present.
pub fn sub_type(arena: &Arena, parent: &TypeInfo, postfix: &PostfixKind, lookup: &dyn ScopeLookup) -> TypeInfo {
    match postfix {
        PostfixKind::Field(name) => parent.member(name),
        PostfixKind::Index(_) => TypeInfo::nil(),
        PostfixKind::Call { method, args } => {
            let callee = match method {
                Some(name) => parent.member(name),
                None => parent.clone(),
            };
            let Some(sig) = callee.function.clone() else {
                return TypeInfo::nil();
            };
            if let Some(resolver) = &sig.result_type_resolver {
                let arg_types: Vec<TypeInfo> = args.iter().map(|&e| expr_type(arena, e, lookup)).collect();
                return resolver(lookup, &arg_types, &callee);
            }
            sig.results.first().cloned().unwrap_or_default()
        }
    }
}
