//! Editor intelligence core for Lua 5.3.
//!
//! Five components, each a module here, wired in a straight pipeline:
//!
//! 1. [`types`] — the static type model (`TypeInfo`, `FunctionSignature`,
//!    the host-supplied [`types::UserDefined`] environment).
//! 2. [`lexer`]/[`parser`] — tokenizes and parses a Lua 5.3 buffer into an
//!    [`ast::Arena`], tolerant of partially-typed/invalid input, alongside
//!    a [`position::PositionIndex`] classifying spans for syntax coloring.
//! 3. [`scope`] — walks the parsed `Arena` once to build a
//!    [`scope::ScopeArena`], binding every local, global, and function
//!    declaration to its inferred [`types::TypeInfo`].
//! 4. [`cursor`] — maps a byte offset in the live buffer to a block, a
//!    scope, or a raw textual identifier/call fragment.
//! 5. [`session`] — the public, total query surface
//!    ([`Session::get_type_at_pos`](session::Session::get_type_at_pos)
//!    and friends) that a host embeds one of per open buffer.

pub mod ast;
pub mod cursor;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod position;
pub mod scope;
pub mod session;
pub mod types;

pub use error::{ErrorKind, LacResult};
pub use position::{ElementTag, PositionElement, PositionIndex};
pub use scope::{Element, ElementKind, ElementsMap};
pub use session::Session;
pub use types::{FunctionSignature, Type, TypeInfo, UserDefined};
