//! The public query surface: one `Session` per source buffer, holding
//! the last successfully parsed/analyzed program plus the host's
//! ambient `UserDefined` environment.

use crate::ast::{Arena, BlockId, PrefixHead};
use crate::cursor;
use crate::parser;
use crate::position::PositionIndex;
use crate::scope::{self, ElementsMap, MemberFilter, ScopeArena, ScopeId, ScopeView};
use crate::types::{ScopeLookup, Type, TypeInfo, UserDefined};

/// Single-threaded, synchronous: no interior mutability, plain `&mut
/// self` for the one state-changing method, `&self` for every query.
/// `update_program` builds the new `Arena`/`PositionIndex`/`ScopeArena`
/// triple fully before writing any `Session` field, so a caller never
/// observes a partially-swapped state even under a panic partway
/// through analysis.
pub struct Session {
    user_defined: UserDefined,
    arena: Arena,
    root_block: BlockId,
    positions: PositionIndex,
    scopes: ScopeArena,
    root_scope: ScopeId,
}

impl Session {
    pub fn new(user_defined: UserDefined) -> Self {
        let result = parser::parse("");
        let (scopes, root_scope) = scope::analyzer::analyze_program(&result.arena, result.root, &user_defined);
        Session {
            user_defined,
            arena: result.arena,
            root_block: result.root,
            positions: result.positions,
            scopes,
            root_scope,
        }
    }

    /// Re-parses and re-analyzes `source`, swapping it in as the
    /// session's current program iff parsing fully consumed the buffer.
    /// Returns whether the swap happened; on `false` the session keeps
    /// serving its previous snapshot.
    pub fn update_program(&mut self, source: &str, _cursor: usize) -> bool {
        let result = parser::parse(source);
        if !result.parsed {
            return false;
        }
        let (scopes, root_scope) = scope::analyzer::analyze_program(&result.arena, result.root, &self.user_defined);
        self.arena = result.arena;
        self.root_block = result.root;
        self.positions = result.positions;
        self.scopes = scopes;
        self.root_scope = root_scope;
        true
    }

    pub fn positions(&self) -> &PositionIndex {
        &self.positions
    }

    fn scope_at(&self, pos: usize) -> ScopeId {
        cursor::get_scope_at_pos(&self.scopes, &self.arena, self.root_scope, pos)
    }

    fn view(&self, scope_id: ScopeId) -> ScopeView<'_> {
        ScopeView { scopes: &self.scopes, scope: scope_id, user_defined: &self.user_defined }
    }

    /// Resolves a bare fragment (as extracted by `extract_variable_at_pos`,
    /// with any trailing bare `:method` already stripped off by the
    /// caller) to its `TypeInfo` and the per-step type-name trail used by
    /// `get_type_hierarchy_at_pos`.
    fn resolve_fragment(&self, fragment: &str, scope_id: ScopeId) -> (TypeInfo, Vec<String>) {
        let Some((frag_arena, node_id)) = parser::parse_variable_or_function(fragment) else {
            return (TypeInfo::nil(), Vec::new());
        };
        let node = frag_arena.variable_or_function(node_id);
        let prefix = frag_arena.prefix(node.head);
        let view = self.view(scope_id);

        let mut hierarchy = Vec::new();
        let mut current = match &prefix.head {
            PrefixHead::Name(name) => {
                let vt = view.variable_type(name);
                if vt.kind != Type::Nil {
                    vt
                } else {
                    view.function_type(name)
                }
            }
            PrefixHead::Bracketed(_) => TypeInfo::unknown(),
        };
        hierarchy.push(current.type_name());

        for postfix in &prefix.postfixes {
            current = scope::subtype::sub_type(&frag_arena, &current, &postfix.kind, &view);
            hierarchy.push(current.type_name());
        }
        if let Some(member) = &node.member {
            current = current.member(member);
            hierarchy.push(current.type_name());
        }
        (current, hierarchy)
    }

    fn type_and_hierarchy_at_pos(&self, source: &str, pos: usize) -> (TypeInfo, Vec<String>) {
        let Some(fragment) = cursor::extract_variable_at_pos(source, pos) else {
            return (TypeInfo::nil(), Vec::new());
        };
        let scope_id = self.scope_at(pos);
        self.resolve_fragment(&fragment, scope_id)
    }

    /// The static type of the identifier/member chain at `pos`, or `nil`
    /// if `pos` is not on one.
    pub fn get_type_at_pos(&self, source: &str, pos: usize) -> TypeInfo {
        self.type_and_hierarchy_at_pos(source, pos).0
    }

    /// The type name at each fold step of the chain at `pos` (head, then
    /// one entry per postfix/member), outermost-last.
    pub fn get_type_hierarchy_at_pos(&self, source: &str, pos: usize) -> Vec<String> {
        self.type_and_hierarchy_at_pos(source, pos).1
    }

    /// Identifiers visible at `pos`, or — when the cursor sits right
    /// after `.`/`:` — the member elements of whatever precedes it
    /// (methods only after `:`, non-methods only after `.`).
    pub fn get_variable_completion_list(&self, source: &str, pos: usize) -> ElementsMap {
        let scope_id = self.scope_at(pos);
        let bytes = source.as_bytes();
        if pos >= 1 && pos <= bytes.len() {
            let op = bytes[pos - 1];
            if op == b'.' || op == b':' {
                let filter = if op == b':' { MemberFilter::Methods } else { MemberFilter::NonMethods };
                let lhs_type = match pos.checked_sub(2).and_then(|p| cursor::extract_variable_at_pos(source, p)) {
                    Some(fragment) => self.resolve_fragment(&fragment, scope_id).0,
                    None => TypeInfo::nil(),
                };
                return scope::elements::elements_of_type(&lhs_type, Some(filter));
            }
        }
        scope::elements::get_elements(&self.scopes, scope_id, false, &self.user_defined)
    }

    /// Variable completions augmented with the active call argument's
    /// declared parameter type's members (and, if the parameter carries
    /// a `completion_resolver`, its call-site-dependent candidates);
    /// falls back to plain variable completion when no call is active.
    pub fn get_argument_completion_list(&self, source: &str, pos: usize) -> ElementsMap {
        let scope_id = self.scope_at(pos);
        let mut elements = self.get_variable_completion_list(source, pos);

        let Some((callee_fragment, arg_index)) = cursor::get_argument_at_pos(source, pos) else {
            return elements;
        };
        let (callee_type, _) = self.resolve_fragment(&callee_fragment, scope_id);
        let Some(sig) = &callee_type.function else {
            return elements;
        };
        let Some((_, param_type)) = sig.parameters.get(arg_index) else {
            return elements;
        };

        if let Some(resolver) = &sig.completion_resolver {
            let view = self.view(scope_id);
            let candidates = resolver(&view, &[], &callee_type);
            for (name, ty) in candidates {
                elements.entry(name.clone()).or_insert_with(|| scope::Element {
                    name,
                    kind: if ty.kind == Type::Function { scope::ElementKind::Function } else { scope::ElementKind::Variable },
                    type_info: ty,
                    is_local: false,
                });
            }
        }

        for (name, ty) in &param_type.members {
            elements.entry(name.clone()).or_insert_with(|| scope::Element {
                name: name.clone(),
                kind: if ty.kind == Type::Function { scope::ElementKind::Function } else { scope::ElementKind::Variable },
                type_info: ty.clone(),
                is_local: false,
            });
        }

        elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FunctionSignature;

    #[test]
    fn update_program_swaps_on_success() {
        let mut session = Session::new(UserDefined::new());
        assert!(session.update_program("local x = 1", 0));
        assert_eq!(session.get_type_at_pos("local x = 1", 6).kind, Type::Number);
    }

    #[test]
    fn get_type_at_pos_resolves_simple_local() {
        let mut session = Session::new(UserDefined::new());
        let source = "local score = 10\nreturn score";
        session.update_program(source, 0);
        let pos = source.rfind("score").unwrap() + 1;
        assert_eq!(session.get_type_at_pos(source, pos).kind, Type::Number);
    }

    #[test]
    fn get_type_at_pos_resolves_table_member() {
        let mut session = Session::new(UserDefined::new());
        let source = "t = {}\nt.x = 5\nreturn t.x";
        session.update_program(source, 0);
        let pos = source.len() - 1;
        assert_eq!(session.get_type_at_pos(source, pos).kind, Type::Number);
    }

    #[test]
    fn get_variable_completion_list_offers_host_globals() {
        let mut user_defined = UserDefined::new();
        user_defined.add_variable("playerCount", TypeInfo::number());
        let mut session = Session::new(user_defined);
        session.update_program("local x = 1", 0);
        let completions = session.get_variable_completion_list("local x = 1", 5);
        assert!(completions.contains_key("x"));
        assert!(completions.contains_key("playerCount"));
    }

    #[test]
    fn get_variable_completion_list_after_dot_lists_members() {
        let mut session = Session::new(UserDefined::new());
        let source = "t = {}\nt.health = 1\nt.";
        session.update_program(source, 0);
        let pos = source.len();
        let completions = session.get_variable_completion_list(source, pos);
        assert!(completions.contains_key("health"));
    }

    #[test]
    fn update_program_rejects_unparsable_trailing_garbage_keeps_old_state() {
        let mut session = Session::new(UserDefined::new());
        assert!(session.update_program("local x = 1", 0));
        // `end` with no opening construct: the block parser stops before
        // consuming it, so `parsed` is false and the prior snapshot wins.
        assert!(!session.update_program("local x = 1\nend", 0));
        assert_eq!(session.get_type_at_pos("local x = 1", 6).kind, Type::Number);
    }

    #[test]
    fn argument_completion_list_falls_back_to_variable_completion() {
        let mut session = Session::new(UserDefined::new());
        session.update_program("local x = 1", 0);
        let completions = session.get_argument_completion_list("local x = 1", 5);
        assert!(completions.contains_key("x"));
    }

    #[test]
    fn argument_completion_list_offers_parameter_members() {
        let mut player = TypeInfo::new(Type::Userdata).with_name("Player");
        player.members.insert("health".into(), TypeInfo::number());
        let sig = FunctionSignature::new(false, vec![("p".into(), player)], Vec::new());
        let mut user_defined = UserDefined::new();
        user_defined.add_free_function("heal", sig);

        let mut session = Session::new(user_defined);
        let source = "heal(";
        session.update_program("", 0);
        let completions = session.get_argument_completion_list(source, source.len());
        assert!(completions.contains_key("health"));
    }
}
