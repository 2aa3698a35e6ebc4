use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Top level error for every operation that can fail hard.
///
/// Most problems met while loading definitions are *soft*: they are reported
/// through [`crate::diagnostics::Diagnostics`] and the batch keeps going. The
/// variants here cover the cases where the caller asked for something that
/// cannot be done at all.
#[derive(Error, Debug, Diagnostic)]
pub enum DefineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    TypeResolve(#[from] ResolveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ParserError {
    #[error("Unexpected token")]
    #[diagnostic(
        code(parser::unexpected_token),
        help("The parser found a token it did not expect in this position.")
    )]
    UnexpectedToken {
        #[source_code]
        src: NamedSource<String>,
        #[label("Expected {expected}, but found this")]
        span: SourceSpan,
        expected: String,
    },

    #[error("Unexpected end of file")]
    #[diagnostic(
        code(parser::unexpected_eof),
        help("The document ended while an element was still open.")
    )]
    UnexpectedEof {
        #[source_code]
        src: NamedSource<String>,
        #[label("File ended unexpectedly here")]
        span: SourceSpan,
    },

    #[error("Closing tag </{found}> does not match <{expected}>")]
    #[diagnostic(
        code(parser::mismatched_tag),
        help("Every element must be closed with a tag of the same name.")
    )]
    MismatchedTag {
        #[source_code]
        src: NamedSource<String>,
        #[label("Expected </{expected}> here")]
        span: SourceSpan,
        expected: String,
        found: String,
    },

    #[error("Duplicate attribute '{name}'")]
    #[diagnostic(
        code(parser::duplicate_attribute),
        help("An attribute may only appear once on the same element.")
    )]
    DuplicateAttribute {
        #[source_code]
        src: NamedSource<String>,
        #[label("'{name}' was already set on this element")]
        span: SourceSpan,
        name: String,
    },

    #[error("Content after the root element")]
    #[diagnostic(
        code(parser::trailing_content),
        help("Wrap all definitions in a single root element, for example <Defs>.")
    )]
    TrailingContent {
        #[source_code]
        src: NamedSource<String>,
        #[label("This is outside of the root element")]
        span: SourceSpan,
    },
}

/// Failure to turn a type descriptor into a type handle.
///
/// These are cached by the type registry, so they must stay cheap to clone.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Type descriptor is empty")]
    #[diagnostic(code(types::empty_descriptor))]
    Empty,

    #[error("Failed to find a type called '{name}'")]
    #[diagnostic(
        code(types::not_found),
        help("Check the spelling, register the type, or qualify it with its namespace.")
    )]
    NotFound { name: String },

    #[error("Type '{name}' cannot be nullable because it is a reference type")]
    #[diagnostic(
        code(types::nullable_reference),
        help("Only numbers, bools, chars, enums and value classes accept a trailing '?'.")
    )]
    NullableReference { name: String },

    #[error("Generic argument {index} ('{argument}') of '{name}' could not be resolved")]
    #[diagnostic(code(types::generic_argument))]
    GenericArgument {
        name: String,
        index: usize,
        argument: String,
        #[source]
        cause: Box<ResolveError>,
    },

    #[error("Cannot construct '{name}': {reason}")]
    #[diagnostic(code(types::constraint_violation))]
    Constraint { name: String, reason: String },

    #[error("Malformed type descriptor '{name}': {reason}")]
    #[diagnostic(
        code(types::malformed),
        help("Write generic arguments as Name<Arg, ...> or Name[Arg, ...].")
    )]
    Malformed { name: String, reason: String },
}

/// Problems found while registering schemas with a [`crate::types::TypeRegistry`].
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("A type called '{full_name}' is already registered in catalog '{catalog}'")]
    #[diagnostic(code(registry::duplicate_type))]
    DuplicateType { full_name: String, catalog: String },

    #[error("'{name}' cannot extend '{base}': {reason}")]
    #[diagnostic(code(registry::invalid_base))]
    InvalidBase {
        name: String,
        base: String,
        reason: String,
    },

    #[error("'{name}' cannot implement '{interface}' because it is not an interface")]
    #[diagnostic(code(registry::not_an_interface))]
    NotAnInterface { name: String, interface: String },

    #[error("Type name '{name}' is not valid")]
    #[diagnostic(
        code(registry::invalid_name),
        help("Type names may not be empty or contain generic brackets, commas, '?' or whitespace.")
    )]
    InvalidName { name: String },
}

/// Misuse of the loading session state machine.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Already loading definitions")]
    #[diagnostic(
        code(session::already_loading),
        help("Call finish_loading() before starting another session.")
    )]
    AlreadyLoading,

    #[error("Not currently loading definitions")]
    #[diagnostic(
        code(session::not_loading),
        help("Call start_loading() first.")
    )]
    NotLoading,

    #[error("Inheritance has already been resolved for this session")]
    #[diagnostic(code(session::inheritance_resolved))]
    InheritanceResolved,
}

/// Failure reported by a [`crate::converter::Converter`].
#[derive(Error, Debug, Diagnostic)]
pub enum ConvertError {
    #[error("Failed to parse '{text}' as {target}: {reason}")]
    #[diagnostic(code(convert::invalid))]
    Invalid {
        text: String,
        target: String,
        reason: String,
    },

    #[error("There is no definition called '{id}' (expected a {target})")]
    #[diagnostic(
        code(convert::unknown_definition),
        help("References name the top level tag of another definition.")
    )]
    UnknownDefinition { id: String, target: String },

    #[error("Definition '{id}' is a {found}, which is not assignable to {target}")]
    #[diagnostic(code(convert::definition_type))]
    DefinitionType {
        id: String,
        found: String,
        target: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{0}")]
    #[diagnostic(code(convert::custom))]
    Custom(String),
}

impl ConvertError {
    pub fn invalid(text: &str, target: impl Into<String>, reason: impl Into<String>) -> Self {
        ConvertError::Invalid {
            text: text.to_string(),
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Error returned from a user supplied constructor or lifecycle hook.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[error("{message}")]
#[diagnostic(code(lifecycle::hook_failed))]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        HookError {
            message: message.into(),
        }
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        HookError { message }
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        HookError::new(message)
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Failed to read file")]
    #[diagnostic(code(config::io))]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON configuration")]
    #[diagnostic(code(config::json))]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML configuration")]
    #[diagnostic(code(config::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported configuration format for '{path}'")]
    #[diagnostic(
        code(config::unsupported_format),
        help("Use a .json, .yaml or .yml file.")
    )]
    UnsupportedFormat { path: String },
}
