//! The static type model: a closed set of value kinds, a `TypeInfo`
//! product type, function signatures, and the host-supplied
//! `UserDefined` ambient environment.

mod annotation;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use annotation::parse_annotation;

/// Lets a `FunctionSignature`'s dependent-result callback query a scope
/// without this module depending on `crate::scope` (which itself depends
/// on `TypeInfo`). Implemented by `scope::Scope`.
pub trait ScopeLookup {
    fn variable_type(&self, name: &str) -> TypeInfo;
    fn function_type(&self, name: &str) -> TypeInfo;
}

/// The closed value-type tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Nil,
    Boolean,
    Number,
    Str,
    Table,
    Function,
    Userdata,
    Thread,
    Array,
    /// Could not infer a type. Distinct from `Nil`.
    Unknown,
    /// Semantically ill-typed (e.g. `-{}`).
    Error,
}

/// A callback computing a dependent return type from the call site:
/// `(scope, arguments, receiver) -> TypeInfo`.
pub type ResultTypeResolver =
    Arc<dyn Fn(&dyn ScopeLookup, &[TypeInfo], &TypeInfo) -> TypeInfo + Send + Sync>;

/// A callback producing argument-specific completion candidates, keyed by
/// candidate name.
pub type CompletionResolver =
    Arc<dyn Fn(&dyn ScopeLookup, &[TypeInfo], &TypeInfo) -> HashMap<String, TypeInfo> + Send + Sync>;

/// Parameters, results, and optional dependent-type callbacks of a
/// `function`-kinded `TypeInfo`.
#[derive(Clone)]
pub struct FunctionSignature {
    pub is_method: bool,
    pub parameters: Vec<(String, TypeInfo)>,
    pub results: Vec<TypeInfo>,
    pub result_type_resolver: Option<ResultTypeResolver>,
    pub completion_resolver: Option<CompletionResolver>,
}

impl FunctionSignature {
    pub fn new(is_method: bool, parameters: Vec<(String, TypeInfo)>, results: Vec<TypeInfo>) -> Self {
        FunctionSignature {
            is_method,
            parameters,
            results,
            result_type_resolver: None,
            completion_resolver: None,
        }
    }
}

impl fmt::Debug for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSignature")
            .field("is_method", &self.is_method)
            .field("parameters", &self.parameters)
            .field("results", &self.results)
            .field("has_result_type_resolver", &self.result_type_resolver.is_some())
            .field("has_completion_resolver", &self.completion_resolver.is_some())
            .finish()
    }
}

impl PartialEq for FunctionSignature {
    /// Resolver callbacks are not comparable; two signatures are equal
    /// when their visible shape (method-ness, parameters, results)
    /// matches, regardless of whether either carries a resolver.
    fn eq(&self, other: &Self) -> bool {
        self.is_method == other.is_method
            && self.parameters == other.parameters
            && self.results == other.results
    }
}

/// The value of the type system: kind + name + members (for
/// `table`/`userdata`) + function signature (for `function`).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub kind: Type,
    pub name: String,
    pub description: Option<String>,
    pub members: HashMap<String, TypeInfo>,
    pub function: Option<FunctionSignature>,
}

impl Default for TypeInfo {
    fn default() -> Self {
        TypeInfo::nil()
    }
}

impl TypeInfo {
    pub fn new(kind: Type) -> Self {
        TypeInfo {
            kind,
            name: String::new(),
            description: None,
            members: HashMap::new(),
            function: None,
        }
    }

    pub fn nil() -> Self {
        TypeInfo::new(Type::Nil)
    }

    pub fn unknown() -> Self {
        TypeInfo::new(Type::Unknown)
    }

    pub fn error() -> Self {
        TypeInfo::new(Type::Error)
    }

    pub fn boolean() -> Self {
        TypeInfo::new(Type::Boolean)
    }

    pub fn number() -> Self {
        TypeInfo::new(Type::Number)
    }

    pub fn string() -> Self {
        TypeInfo::new(Type::Str)
    }

    pub fn table() -> Self {
        TypeInfo::new(Type::Table)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Maps a bare type name to its `TypeInfo`. Numeric aliases collapse
    /// (`int`/`integer`/`float`/`double` → `number`); anything else
    /// becomes a named `userdata` record reference.
    pub fn from_type_name(name: &str) -> TypeInfo {
        match name {
            "nil" => TypeInfo::nil(),
            "boolean" => TypeInfo::boolean(),
            "number" | "int" | "integer" | "float" | "double" => TypeInfo::number(),
            "string" => TypeInfo::string(),
            "table" => TypeInfo::table(),
            other => TypeInfo::new(Type::Userdata).with_name(other),
        }
    }

    /// Parses a human-written type annotation. Returns a
    /// `Type::Error`-kinded `TypeInfo` on syntax error.
    pub fn from_annotation(text: &str) -> TypeInfo {
        match annotation::parse_annotation(text) {
            Ok(info) => info,
            Err(_) => TypeInfo::error(),
        }
    }

    pub fn create_function(
        parameters: Vec<(String, TypeInfo)>,
        results: Vec<TypeInfo>,
        result_type_resolver: Option<ResultTypeResolver>,
        completion_resolver: Option<CompletionResolver>,
    ) -> TypeInfo {
        let mut sig = FunctionSignature::new(false, parameters, results);
        sig.result_type_resolver = result_type_resolver;
        sig.completion_resolver = completion_resolver;
        let mut info = TypeInfo::new(Type::Function);
        info.function = Some(sig);
        info
    }

    pub fn create_method(
        parameters: Vec<(String, TypeInfo)>,
        results: Vec<TypeInfo>,
        result_type_resolver: Option<ResultTypeResolver>,
        completion_resolver: Option<CompletionResolver>,
    ) -> TypeInfo {
        let mut sig = FunctionSignature::new(true, parameters, results);
        sig.result_type_resolver = result_type_resolver;
        sig.completion_resolver = completion_resolver;
        let mut info = TypeInfo::new(Type::Function);
        info.function = Some(sig);
        info
    }

    /// `false` iff `kind` is one of `nil`, `unknown`, `error`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self.kind, Type::Nil | Type::Unknown | Type::Error)
    }

    pub fn member(&self, name: &str) -> TypeInfo {
        self.members.get(name).cloned().unwrap_or_default()
    }

    pub fn is_method(&self) -> bool {
        self.function.as_ref().is_some_and(|f| f.is_method)
    }

    /// Conversion policy: identity is free, `error` is absorbing,
    /// `unknown` converts to anything, any type converts to `boolean`,
    /// and `number`/`string` convert mutually.
    pub fn convert(&self, destination: Type) -> TypeInfo {
        if self.kind == destination {
            return TypeInfo::new(destination);
        }
        if self.kind == Type::Error {
            return TypeInfo::error();
        }
        if self.kind == Type::Unknown {
            return TypeInfo::new(destination);
        }

        match destination {
            Type::Boolean => TypeInfo::boolean(),
            Type::Number => {
                if matches!(self.kind, Type::Number | Type::Str) {
                    TypeInfo::number()
                } else {
                    TypeInfo::error()
                }
            }
            Type::Str => {
                if matches!(self.kind, Type::Str | Type::Number) {
                    TypeInfo::string()
                } else {
                    TypeInfo::error()
                }
            }
            _ => TypeInfo::error(),
        }
    }

    /// Display name, converting basic types to their textual form and
    /// appending `[]` for arrays.
    pub fn type_name(&self) -> String {
        if !self.name.is_empty() {
            return if self.kind == Type::Array {
                format!("{}[]", self.name)
            } else {
                self.name.clone()
            };
        }

        match self.kind {
            Type::Nil => "nil".to_string(),
            Type::Boolean => "boolean".to_string(),
            Type::Number => "number".to_string(),
            Type::Str => "string".to_string(),
            Type::Table => "table".to_string(),
            Type::Function => {
                if self.is_method() {
                    "method".to_string()
                } else {
                    "function".to_string()
                }
            }
            Type::Userdata => "userdata".to_string(),
            Type::Thread => "thread".to_string(),
            Type::Array => "array".to_string(),
            Type::Unknown => "unknown".to_string(),
            Type::Error => "error".to_string(),
        }
    }

    /// Pretty-prints a `function`-kind `TypeInfo` back into the
    /// annotation grammar, e.g. `number, Player function(Player[] players)`.
    /// Empty for any other kind.
    pub fn function_definition(&self) -> String {
        let Some(sig) = &self.function else {
            return String::new();
        };

        let mut s = String::new();
        if !sig.results.is_empty() {
            let names: Vec<String> = sig.results.iter().map(TypeInfo::type_name).collect();
            s.push_str(&names.join(", "));
            s.push(' ');
        }

        s.push_str(if sig.is_method { "method(" } else { "function(" });

        let args: Vec<String> = sig
            .parameters
            .iter()
            .map(|(name, ty)| format!("{} {}", ty.type_name(), name))
            .collect();
        s.push_str(&args.join(", "));
        s.push(')');
        s
    }
}

/// An `ElementKind::Function` signature attached to a named record, or a
/// plain data member: a user-defined type lives as a `table`- or
/// `userdata`-kinded `TypeInfo` whose `members` map carries both.
pub type RecordType = TypeInfo;

/// The host-supplied ambient environment: global variables, free
/// functions, named record types, and declared script-entry-point
/// signatures. Owned (not borrowed) by the `Session`.
#[derive(Debug, Clone, Default)]
pub struct UserDefined {
    variables: HashMap<String, TypeInfo>,
    free_functions: HashMap<String, FunctionSignature>,
    types: HashMap<String, RecordType>,
    script_inputs: HashMap<String, FunctionSignature>,
}

impl UserDefined {
    pub fn new() -> Self {
        UserDefined::default()
    }

    pub fn add_variable(&mut self, name: impl Into<String>, type_info: TypeInfo) {
        self.variables.insert(name.into(), type_info);
    }

    pub fn add_free_function(&mut self, name: impl Into<String>, signature: FunctionSignature) {
        self.free_functions.insert(name.into(), signature);
    }

    /// Registers a named record (`table`/`userdata`-kinded `TypeInfo`,
    /// keyed by its own `name` field).
    pub fn add_type(&mut self, type_info: RecordType) {
        self.types.insert(type_info.name.clone(), type_info);
    }

    pub fn add_script_input(&mut self, name: impl Into<String>, signature: FunctionSignature) {
        self.script_inputs.insert(name.into(), signature);
    }

    pub fn variable(&self, name: &str) -> Option<&TypeInfo> {
        self.variables.get(name)
    }

    pub fn free_function(&self, name: &str) -> Option<&FunctionSignature> {
        self.free_functions.get(name)
    }

    pub fn named_type(&self, name: &str) -> Option<&RecordType> {
        self.types.get(name)
    }

    pub fn script_input(&self, name: &str) -> Option<&FunctionSignature> {
        self.script_inputs.get(name)
    }

    /// All host-supplied globals, for folding the ambient environment
    /// into a completion list when local-only filtering is off.
    pub fn variables(&self) -> impl Iterator<Item = (&String, &TypeInfo)> {
        self.variables.iter()
    }

    /// All host-supplied free functions, for the same completion fold.
    pub fn free_functions(&self) -> impl Iterator<Item = (&String, &FunctionSignature)> {
        self.free_functions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_excludes_nil_unknown_and_error() {
        assert!(!TypeInfo::nil().is_truthy());
        assert!(!TypeInfo::unknown().is_truthy());
        assert!(!TypeInfo::error().is_truthy());
        assert!(TypeInfo::boolean().is_truthy());
        assert!(TypeInfo::number().is_truthy());
    }

    #[test]
    fn convert_is_reflexive_and_absorbing() {
        let num = TypeInfo::number();
        assert_eq!(num.convert(Type::Number).kind, Type::Number);
        assert_eq!(TypeInfo::error().convert(Type::Number).kind, Type::Error);
        assert_eq!(TypeInfo::unknown().convert(Type::Str).kind, Type::Str);
    }

    #[test]
    fn convert_number_string_are_mutual() {
        assert_eq!(TypeInfo::number().convert(Type::Str).kind, Type::Str);
        assert_eq!(TypeInfo::string().convert(Type::Number).kind, Type::Number);
        assert_eq!(TypeInfo::table().convert(Type::Number).kind, Type::Error);
    }

    #[test]
    fn convert_to_boolean_always_succeeds() {
        assert_eq!(TypeInfo::table().convert(Type::Boolean).kind, Type::Boolean);
        assert_eq!(TypeInfo::error().convert(Type::Boolean).kind, Type::Error);
    }

    #[test]
    fn from_type_name_collapses_numeric_aliases() {
        for alias in ["number", "int", "integer", "float", "double"] {
            assert_eq!(TypeInfo::from_type_name(alias).kind, Type::Number);
        }
        let info = TypeInfo::from_type_name("Player");
        assert_eq!(info.kind, Type::Userdata);
        assert_eq!(info.name, "Player");
    }
}
