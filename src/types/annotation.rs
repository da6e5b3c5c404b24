//! The type-annotation sub-grammar:
//!
//! ```text
//! parsedType  ::= functionType | namedType
//! namedType   ::= ident ["[]"]
//! functionType::= namedType-list ("function" | "method") "(" argument-list? ")"
//! argument    ::= namedType ident
//! ```
//!
//! Whitespace-insensitive. This is a small, independent grammar, kept out
//! of the main Lua grammar, so it is hand-written recursive descent
//! rather than routed through the tokenizer used for Lua source.

use super::{FunctionSignature, Type, TypeInfo};
use crate::error::ErrorKind;

struct NamedType {
    type_name: String,
    is_array: bool,
}

struct Argument {
    named_type: NamedType,
    name: String,
}

struct FunctionTypeAst {
    results: Vec<NamedType>,
    is_method: bool,
    arguments: Vec<Argument>,
}

enum ParsedType {
    Named(NamedType),
    Function(FunctionTypeAst),
}

fn skip_ws(s: &str) -> &str {
    s.trim_start()
}

/// Matches a keyword only when not followed by another identifier
/// character, so `functionX` is not mistaken for `function` + `X`.
fn match_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let s = skip_ws(s);
    let rest = s.strip_prefix(keyword)?;
    let boundary_ok = rest
        .chars()
        .next()
        .map(|c| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(true);
    boundary_ok.then_some(rest)
}

fn parse_ident(s: &str) -> Option<(&str, &str)> {
    let s = skip_ws(s);
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let first = bytes[0];
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    Some((&s[i..], &s[..i]))
}

fn parse_name(s: &str) -> Option<(&str, String)> {
    let (rest, ident) = parse_ident(s)?;
    if ident == "function" || ident == "method" {
        return None;
    }
    Some((rest, ident.to_string()))
}

fn parse_named_type(s: &str) -> Option<(&str, NamedType)> {
    let (rest, type_name) = parse_name(s)?;
    let after_name = skip_ws(rest);
    if let Some(r) = after_name.strip_prefix("[]") {
        Some((
            r,
            NamedType {
                type_name,
                is_array: true,
            },
        ))
    } else {
        Some((
            rest,
            NamedType {
                type_name,
                is_array: false,
            },
        ))
    }
}

/// `-(namedType % ',')`: an optionally-empty comma-separated list.
fn parse_named_type_list(s: &str) -> (&str, Vec<NamedType>) {
    let mut items = Vec::new();
    let Some((mut rest, first)) = parse_named_type(s) else {
        return (s, items);
    };
    items.push(first);

    loop {
        let after_ws = skip_ws(rest);
        let Some(after_comma) = after_ws.strip_prefix(',') else {
            break;
        };
        let Some((r, nt)) = parse_named_type(after_comma) else {
            break;
        };
        items.push(nt);
        rest = r;
    }
    (rest, items)
}

fn parse_argument(s: &str) -> Option<(&str, Argument)> {
    let (rest, named_type) = parse_named_type(s)?;
    let (rest, name) = parse_name(rest)?;
    Some((rest, Argument { named_type, name }))
}

/// `-(argument % ',')`.
fn parse_argument_list(s: &str) -> (&str, Vec<Argument>) {
    let mut items = Vec::new();
    let Some((mut rest, first)) = parse_argument(s) else {
        return (s, items);
    };
    items.push(first);

    loop {
        let after_ws = skip_ws(rest);
        let Some(after_comma) = after_ws.strip_prefix(',') else {
            break;
        };
        let Some((r, arg)) = parse_argument(after_comma) else {
            break;
        };
        items.push(arg);
        rest = r;
    }
    (rest, items)
}

fn parse_function_type(s: &str) -> Option<(&str, FunctionTypeAst)> {
    let (rest, results) = parse_named_type_list(s);

    let (rest, is_method) = if let Some(r) = match_keyword(rest, "function") {
        (r, false)
    } else if let Some(r) = match_keyword(rest, "method") {
        (r, true)
    } else {
        return None;
    };

    let rest = skip_ws(rest).strip_prefix('(')?;
    let (rest, arguments) = parse_argument_list(rest);
    let rest = skip_ws(rest).strip_prefix(')')?;

    Some((
        rest,
        FunctionTypeAst {
            results,
            is_method,
            arguments,
        },
    ))
}

fn parse_parsed_type(s: &str) -> Option<(&str, ParsedType)> {
    if let Some((rest, func)) = parse_function_type(s) {
        return Some((rest, ParsedType::Function(func)));
    }
    let (rest, named) = parse_named_type(s)?;
    Some((rest, ParsedType::Named(named)))
}

fn build_named(named: NamedType) -> TypeInfo {
    if named.is_array {
        TypeInfo::new(Type::Array).with_name(named.type_name)
    } else {
        TypeInfo::from_type_name(&named.type_name)
    }
}

fn build_type_info(parsed: ParsedType) -> TypeInfo {
    match parsed {
        ParsedType::Named(named) => build_named(named),
        ParsedType::Function(func) => {
            let parameters = func
                .arguments
                .into_iter()
                .map(|a| (a.name, build_named(a.named_type)))
                .collect();
            let results = func.results.into_iter().map(build_named).collect();
            let sig = FunctionSignature::new(func.is_method, parameters, results);
            let mut info = TypeInfo::new(Type::Function);
            info.function = Some(sig);
            info
        }
    }
}

pub fn parse_annotation(text: &str) -> Result<TypeInfo, ErrorKind> {
    let Some((rest, parsed)) = parse_parsed_type(text) else {
        return Err(ErrorKind::BadTypeString(text.to_string()));
    };
    if !skip_ws(rest).is_empty() {
        return Err(ErrorKind::BadTypeString(text.to_string()));
    }
    Ok(build_type_info(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn bare_named_types() {
        assert_eq!(TypeInfo::from_annotation("number").kind, Type::Number);
        assert_eq!(TypeInfo::from_annotation("int").kind, Type::Number);
        assert_eq!(TypeInfo::from_annotation("double").kind, Type::Number);
        assert_eq!(TypeInfo::from_annotation("string").kind, Type::Str);
        assert_eq!(TypeInfo::from_annotation("boolean").kind, Type::Boolean);
    }

    #[test]
    fn array_types() {
        let info = TypeInfo::from_annotation("int[]");
        assert_eq!(info.kind, Type::Array);
        assert_eq!(info.name, "int");
        assert_eq!(info.type_name(), "int[]");
        assert_eq!(info.function_definition(), "");

        let info = TypeInfo::from_annotation("Player[]");
        assert_eq!(info.kind, Type::Array);
        assert_eq!(info.name, "Player");
        assert_eq!(info.type_name(), "Player[]");
    }

    #[test]
    fn zero_arg_function_and_method() {
        let info = TypeInfo::from_annotation("function()");
        assert_eq!(info.kind, Type::Function);
        let sig = info.function.as_ref().unwrap();
        assert!(sig.parameters.is_empty());
        assert!(sig.results.is_empty());
        assert!(!sig.is_method);
        assert_eq!(info.type_name(), "function");
        assert_eq!(info.function_definition(), "function()");

        let info = TypeInfo::from_annotation("method()");
        assert!(info.function.as_ref().unwrap().is_method);
        assert_eq!(info.type_name(), "method");
        assert_eq!(info.function_definition(), "method()");
    }

    #[test]
    fn function_with_single_result_and_args() {
        let info = TypeInfo::from_annotation("string function()");
        let sig = info.function.as_ref().unwrap();
        assert!(sig.parameters.is_empty());
        assert_eq!(sig.results.len(), 1);
        assert_eq!(sig.results[0].kind, Type::Str);
        assert_eq!(info.function_definition(), "string function()");

        let info = TypeInfo::from_annotation("number function(string name, boolean b)");
        let sig = info.function.as_ref().unwrap();
        assert_eq!(sig.parameters.len(), 2);
        assert_eq!(sig.parameters[0].0, "name");
        assert_eq!(sig.parameters[0].1.kind, Type::Str);
        assert_eq!(sig.parameters[1].0, "b");
        assert_eq!(sig.parameters[1].1.kind, Type::Boolean);
        assert_eq!(
            info.function_definition(),
            "number function(string name, boolean b)"
        );
    }

    #[test]
    fn method_with_multiple_results() {
        let info =
            TypeInfo::from_annotation("number, Player function(Player[] playerList)");
        let sig = info.function.as_ref().unwrap();
        assert_eq!(sig.results.len(), 2);
        assert_eq!(sig.results[0].kind, Type::Number);
        assert_eq!(sig.results[1].kind, Type::Userdata);
        assert_eq!(sig.results[1].name, "Player");
        assert_eq!(sig.parameters.len(), 1);
        assert_eq!(sig.parameters[0].0, "playerList");
        assert_eq!(sig.parameters[0].1.kind, Type::Array);
        assert_eq!(sig.parameters[0].1.name, "Player");
        assert_eq!(
            info.function_definition(),
            "number, Player function(Player[] playerList)"
        );
    }

    #[test]
    fn malformed_annotation_is_error_kind() {
        assert_eq!(TypeInfo::from_annotation("").kind, Type::Error);
        assert_eq!(TypeInfo::from_annotation("[]").kind, Type::Error);
        assert_eq!(TypeInfo::from_annotation("function").kind, Type::Error);
        assert_eq!(TypeInfo::from_annotation("number extra").kind, Type::Error);
    }

    /// Every well-formed `function`-kind annotation round-trips through
    /// `function_definition`.
    #[test]
    fn function_annotations_round_trip() {
        let annotations = [
            "function()",
            "method()",
            "string function()",
            "number function(string name, boolean b)",
            "number, Player function(Player[] playerList)",
            "string, number method(string name, boolean b)",
        ];
        for text in annotations {
            let info = TypeInfo::from_annotation(text);
            assert_eq!(info.kind, Type::Function, "{text} should parse as function");
            let printed = info.function_definition();
            let reparsed = TypeInfo::from_annotation(&printed);
            assert_eq!(reparsed, info, "round trip failed for {text}");
        }
    }
}
