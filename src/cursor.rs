//! Cursor localization: mapping a byte offset in the live buffer to an
//! AST block, a scope, or a raw textual fragment. The textual helpers
//! (`extract_variable_at_pos`, `get_argument_at_pos`) deliberately
//! operate on the buffer text alone, independent of the AST — the
//! buffer at the cursor is frequently not valid Lua (`obj.par`
//! mid-identifier, an unclosed call), so there is no tree to walk for
//! them.

use crate::ast::Arena;
use crate::ast::BlockId;
use crate::scope::{ScopeArena, ScopeId};

/// Narrows from `block` down to the innermost child block (recursively)
/// whose span still covers `pos`. Caller must ensure `block` itself
/// covers `pos`.
fn narrow_block(arena: &Arena, block: BlockId, pos: usize) -> BlockId {
    for child in arena.child_blocks(block) {
        if arena.block(child).span.contains(pos) {
            return narrow_block(arena, child, pos);
        }
    }
    block
}

/// The innermost block containing `pos`, or `None` if `pos` falls
/// outside `root`'s span entirely.
pub fn get_block_at_pos(arena: &Arena, root: BlockId, pos: usize) -> Option<BlockId> {
    if arena.block(root).span.contains(pos) {
        Some(narrow_block(arena, root, pos))
    } else {
        None
    }
}

/// The innermost scope whose block contains `pos`, narrowing from
/// `root` through child scopes exactly as [`get_block_at_pos`] narrows
/// through child blocks.
pub fn get_scope_at_pos(scopes: &ScopeArena, arena: &Arena, root: ScopeId, pos: usize) -> ScopeId {
    for child in scopes.children_of(root).to_vec() {
        let block = scopes.block_of(child);
        if arena.block(block).span.contains(pos) {
            return get_scope_at_pos(scopes, arena, child, pos);
        }
    }
    root
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn skip_ws_left(bytes: &[u8], mut i: usize) -> usize {
    while i > 0 && bytes[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    i
}

/// Scans left from `at` (the index of a `)` byte) for its matching `(`,
/// counting depth naively — string literals are not special-cased. A
/// known, accepted simplification rather than a bug to fix.
fn consume_balanced_left(bytes: &[u8], at: usize) -> Option<usize> {
    let mut depth = 1i32;
    let mut i = at;
    while i > 0 {
        i -= 1;
        match bytes[i] {
            b')' => depth += 1,
            b'(' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// The raw `a.b:c` / `a.b():c`-style fragment text surrounding `pos`,
/// found by a pure left/right textual scan — never touches the AST.
/// Returns `None` when `pos` sits on neither a name character nor `)`.
pub fn extract_variable_at_pos(text: &str, pos: usize) -> Option<String> {
    let bytes = text.as_bytes();
    if pos >= bytes.len() {
        return None;
    }
    let c = bytes[pos];
    if !is_name_char(c) && c != b')' {
        return None;
    }

    let (mut start, end);
    if is_name_char(c) {
        let mut s = pos;
        while s > 0 && is_name_char(bytes[s - 1]) {
            s -= 1;
        }
        let mut e = pos + 1;
        while e < bytes.len() && is_name_char(bytes[e]) {
            e += 1;
        }
        start = s;
        end = e;
    } else {
        end = pos + 1;
        start = consume_balanced_left(bytes, pos)?;
    }

    loop {
        let before = skip_ws_left(bytes, start);
        if before == 0 {
            break;
        }
        let op = bytes[before - 1];
        if op != b'.' && op != b':' {
            break;
        }
        let before_op = skip_ws_left(bytes, before - 1);
        if before_op == 0 {
            break;
        }
        let prev = bytes[before_op - 1];
        if is_name_char(prev) {
            let mut s = before_op - 1;
            while s > 0 && is_name_char(bytes[s - 1]) {
                s -= 1;
            }
            start = s;
        } else if prev == b')' {
            match consume_balanced_left(bytes, before_op - 1) {
                Some(open) => start = open,
                None => break,
            }
        } else {
            break;
        }
    }

    Some(text[start..end].to_string())
}

/// Walks left from `pos` counting top-level commas until the call's
/// opening `(`, returning the callee fragment (via
/// [`extract_variable_at_pos`] on the character just before that `(`)
/// and the zero-based argument index.
pub fn get_argument_at_pos(text: &str, pos: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    if pos > bytes.len() {
        return None;
    }
    let mut i = pos;
    let mut depth = 0i32;
    let mut index = 0usize;
    while i > 0 {
        i -= 1;
        match bytes[i] {
            b')' => depth += 1,
            b'(' => {
                if depth == 0 {
                    if i == 0 {
                        return None;
                    }
                    let callee = extract_variable_at_pos(text, i - 1)?;
                    return Some((callee, index));
                }
                depth -= 1;
            }
            b',' if depth == 0 => index += 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::scope::ScopeNode;

    #[test]
    fn block_at_pos_finds_innermost_nested_do() {
        let mut arena = Arena::new();
        let inner = arena.push_block(crate::ast::Block {
            span: Span::new(3, 7),
            statements: Vec::new(),
            return_statement: None,
        });
        let do_stmt = arena.push_statement(crate::ast::Statement {
            span: Span::new(0, 9),
            kind: crate::ast::StatementKind::Do(inner),
        });
        let outer = arena.push_block(crate::ast::Block {
            span: Span::new(0, 9),
            statements: vec![do_stmt],
            return_statement: None,
        });
        assert_eq!(get_block_at_pos(&arena, outer, 5), Some(inner));
        assert_eq!(get_block_at_pos(&arena, outer, 8), Some(outer));
        assert_eq!(get_block_at_pos(&arena, outer, 50), None);
    }

    #[test]
    fn scope_at_pos_narrows_through_children() {
        let mut arena = Arena::new();
        let inner_block = arena.push_block(crate::ast::Block {
            span: Span::new(3, 7),
            statements: Vec::new(),
            return_statement: None,
        });
        let outer_block = arena.push_block(crate::ast::Block {
            span: Span::new(0, 9),
            statements: Vec::new(),
            return_statement: None,
        });
        let mut scopes = ScopeArena::new();
        let root = scopes.push(ScopeNode::new(outer_block, None));
        let child = scopes.push(ScopeNode::new(inner_block, Some(root)));
        scopes.node_mut(root).children.push(child);

        assert_eq!(get_scope_at_pos(&scopes, &arena, root, 5), child);
        assert_eq!(get_scope_at_pos(&scopes, &arena, root, 8), root);
    }

    #[test]
    fn extract_simple_identifier() {
        assert_eq!(extract_variable_at_pos("local x = foo", 11).as_deref(), Some("foo"));
    }

    #[test]
    fn extract_dotted_chain() {
        assert_eq!(extract_variable_at_pos("player.stats.health", 15).as_deref(), Some("player.stats.health"));
    }

    #[test]
    fn extract_through_call_group() {
        let text = "getPlayer().health";
        let pos = text.len() - 1;
        assert_eq!(extract_variable_at_pos(text, pos).as_deref(), Some("getPlayer().health"));
    }

    #[test]
    fn extract_returns_none_off_a_name_or_close_paren() {
        assert_eq!(extract_variable_at_pos("a + b", 2), None);
    }

    #[test]
    fn argument_at_pos_counts_commas() {
        let text = "foo(1, 2, )";
        let pos = text.len() - 1;
        let (callee, index) = get_argument_at_pos(text, pos).unwrap();
        assert_eq!(callee, "foo");
        assert_eq!(index, 2);
    }

    #[test]
    fn argument_at_pos_first_argument() {
        let text = "foo(";
        let pos = text.len();
        let (callee, index) = get_argument_at_pos(text, pos).unwrap();
        assert_eq!(callee, "foo");
        assert_eq!(index, 0);
    }
}
