//! Error vocabulary for the parts of the crate that cannot stay purely
//! value-based. The query surface itself never returns these (see
//! `session`); they exist for the type-annotation grammar and for a
//! handful of library-boundary failure modes.

use thiserror::Error;

/// Failure modes that are internal to this crate's parsing layers.
///
/// `BadTypeString` is named directly in the annotation grammar: a
/// human-written type string that does not match the three-production
/// grammar in `types::annotation` fails with this variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("malformed type annotation: {0:?}")]
    BadTypeString(String),

    #[error("byte {byte:#04x} at offset {offset} is not ASCII and was replaced with a space")]
    NonAsciiByte { offset: usize, byte: u8 },
}

pub type LacResult<T> = Result<T, ErrorKind>;
