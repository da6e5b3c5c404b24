//! Scope tree & static analyzer.
//!
//! A `Scope` is not a pointer tree but a `Vec`-backed arena addressed by
//! `ScopeId`, for the same reason the AST is: it is built bottom-up
//! during a single pass and frozen (returned by value) before any lookup
//! traversal runs, so there is no parent back-patching and no relocation
//! hazard.

pub mod analyzer;
pub mod elements;
pub mod subtype;
pub mod typing;

use std::collections::HashMap;

use crate::ast::BlockId;
use crate::types::{FunctionSignature, ScopeLookup, Type, TypeInfo, UserDefined};

/// Index of a [`ScopeNode`] in a [`ScopeArena`]. Stable for the lifetime
/// of the arena it was produced from; never compared across arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Variable,
    Function,
    Label,
}

/// One entry of a completion list.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub kind: ElementKind,
    pub type_info: TypeInfo,
    pub is_local: bool,
}

pub type ElementsMap = HashMap<String, Element>;

/// Which half of a `table`/`userdata`'s members `foo.`/`foo:` completion
/// should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberFilter {
    Methods,
    NonMethods,
}

#[derive(Debug, Clone)]
pub struct ScopeNode {
    pub block: BlockId,
    pub parent: Option<ScopeId>,
    pub variables: Vec<(String, TypeInfo)>,
    pub labels: Vec<String>,
    pub functions: Vec<(String, TypeInfo)>,
    pub children: Vec<ScopeId>,
}

impl ScopeNode {
    pub fn new(block: BlockId, parent: Option<ScopeId>) -> Self {
        ScopeNode {
            block,
            parent,
            variables: Vec::new(),
            labels: Vec::new(),
            functions: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Arena of [`ScopeNode`]s built by [`analyzer::analyze_program`]. The
/// root scope is always index 0 — `analyze_program` pushes it before any
/// child, so [`ScopeArena::root`] can be a plain constant lookup rather
/// than a stored field.
#[derive(Debug, Default)]
pub struct ScopeArena {
    nodes: Vec<ScopeNode>,
}

impl ScopeArena {
    pub fn new() -> Self {
        ScopeArena::default()
    }

    pub fn push(&mut self, node: ScopeNode) -> ScopeId {
        self.nodes.push(node);
        ScopeId((self.nodes.len() - 1) as u32)
    }

    pub fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: ScopeId) -> &mut ScopeNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn block_of(&self, id: ScopeId) -> BlockId {
        self.node(id).block
    }

    pub fn parent_of(&self, id: ScopeId) -> Option<ScopeId> {
        self.node(id).parent
    }

    pub fn children_of(&self, id: ScopeId) -> &[ScopeId] {
        &self.node(id).children
    }

    fn chain_variable(&self, scope: ScopeId, name: &str) -> Option<TypeInfo> {
        let mut cur = Some(scope);
        while let Some(id) = cur {
            if let Some((_, ty)) = self.node(id).variables.iter().rev().find(|(n, _)| n == name) {
                return Some(ty.clone());
            }
            cur = self.parent_of(id);
        }
        None
    }

    fn chain_function(&self, scope: ScopeId, name: &str) -> Option<TypeInfo> {
        let mut cur = Some(scope);
        while let Some(id) = cur {
            if let Some((_, ty)) = self.node(id).functions.iter().rev().find(|(n, _)| n == name) {
                return Some(ty.clone());
            }
            cur = self.parent_of(id);
        }
        None
    }

    /// The scope chain's local variables, falling back to the host's
    /// ambient globals. Unresolved names and names genuinely bound to
    /// `nil` are indistinguishable — both surface as `Type::Nil`.
    pub fn variable_type(&self, scope: ScopeId, name: &str, user_defined: &UserDefined) -> TypeInfo {
        self.chain_variable(scope, name)
            .or_else(|| user_defined.variable(name).cloned())
            .unwrap_or_default()
    }

    /// The scope chain's declared functions, falling back to the host's
    /// ambient free functions.
    pub fn function_type(&self, scope: ScopeId, name: &str, user_defined: &UserDefined) -> TypeInfo {
        self.chain_function(scope, name)
            .or_else(|| user_defined.free_function(name).map(function_signature_type))
            .unwrap_or_default()
    }
}

pub fn function_signature_type(sig: &FunctionSignature) -> TypeInfo {
    let mut info = TypeInfo::new(Type::Function);
    info.function = Some(sig.clone());
    info
}

/// Bundles a scope chain + the host environment behind the
/// `types::ScopeLookup` trait object a `FunctionSignature`'s resolver
/// callbacks expect, without `types` depending on this module.
pub struct ScopeView<'a> {
    pub scopes: &'a ScopeArena,
    pub scope: ScopeId,
    pub user_defined: &'a UserDefined,
}

impl<'a> ScopeLookup for ScopeView<'a> {
    fn variable_type(&self, name: &str) -> TypeInfo {
        self.scopes.variable_type(self.scope, name, self.user_defined)
    }

    fn function_type(&self, name: &str) -> TypeInfo {
        self.scopes.function_type(self.scope, name, self.user_defined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BlockId;

    #[test]
    fn chain_lookup_shadows_outer_binding() {
        let mut arena = ScopeArena::new();
        let root = arena.push(ScopeNode::new(BlockId(0), None));
        arena.node_mut(root).variables.push(("x".into(), TypeInfo::number()));
        let child = arena.push(ScopeNode::new(BlockId(1), Some(root)));
        arena.node_mut(child).variables.push(("x".into(), TypeInfo::string()));

        let user_defined = UserDefined::new();
        assert_eq!(arena.variable_type(child, "x", &user_defined).kind, Type::Str);
        assert_eq!(arena.variable_type(root, "x", &user_defined).kind, Type::Number);
    }

    #[test]
    fn unresolved_name_is_nil() {
        let arena = ScopeArena::new();
        // no scopes pushed yet: any lookup against an out-of-range id
        // would panic, so this test only exercises the user_defined
        // fallback path via a one-node arena.
        let mut arena = arena;
        let root = arena.push(ScopeNode::new(BlockId(0), None));
        let user_defined = UserDefined::new();
        assert_eq!(arena.variable_type(root, "missing", &user_defined).kind, Type::Nil);
    }
}
