use crate::ast::Element;
use crate::config::LoadConfig;
use crate::database::Definition;
use crate::diagnostics::Diagnostics;
use crate::materialize::Materializer;
use crate::members::MemberDescriptor;
use crate::types::{TypeHandle, TypeRegistry};
use crate::value::{ObjectRef, Value};
use std::rc::Rc;

/// Everything a converter or the materializer knows about one value being
/// parsed. Built fresh for every node and never mutated.
pub struct ParseContext<'a> {
    pub(crate) materializer: &'a Materializer<'a>,
    /// The source node.
    pub node: &'a Element,
    /// Raw text to parse: the node's inner text, or its tag name for map keys.
    pub text: String,
    /// The type to produce.
    pub target: TypeHandle,
    /// The declared type of the member, list element or map value.
    pub declared: TypeHandle,
    /// The value already held by the member, if any.
    pub current: Option<Value>,
    pub owner: Option<ObjectRef>,
    pub member: Option<Rc<MemberDescriptor>>,
    pub list_index: Option<usize>,
    pub map_key: Option<Value>,
    /// Path of the node from its definition, e.g. `Sword/Stats/li[2]`.
    pub path: String,
    /// ID of the definition being materialized.
    pub definition: Option<&'a str>,
}

impl<'a> ParseContext<'a> {
    pub(crate) fn new(
        materializer: &'a Materializer<'a>,
        node: &'a Element,
        target: TypeHandle,
        path: String,
    ) -> Self {
        ParseContext {
            materializer,
            node,
            text: node.inner_text(),
            target,
            declared: target,
            current: None,
            owner: None,
            member: None,
            list_index: None,
            map_key: None,
            path,
            definition: None,
        }
    }

    pub fn types(&self) -> &'a TypeRegistry {
        self.materializer.types
    }

    pub fn diagnostics(&self) -> &'a Diagnostics {
        self.materializer.diagnostics
    }

    pub fn config(&self) -> &'a LoadConfig {
        self.materializer.config
    }

    /// Looks up a definition by ID among the definitions of this load and
    /// those already in the database.
    pub fn lookup_definition(&self, id: &str) -> Option<&'a Definition> {
        self.materializer.definitions.get(id)
    }

    /// Display name of the target type.
    pub fn target_name(&self) -> String {
        self.types().display_name(self.target)
    }
}

/// Outcome of materializing one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    pub value: Option<Value>,
    /// Write even though `value` is `None`: an explicit null.
    pub force_write: bool,
}

impl ParseResult {
    pub fn of(value: Value) -> Self {
        ParseResult {
            value: Some(value),
            force_write: false,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn forced_null() -> Self {
        ParseResult {
            value: None,
            force_write: true,
        }
    }

    pub fn should_write(&self) -> bool {
        self.value.is_some() || self.force_write
    }

    pub fn into_value(self) -> Value {
        self.value.unwrap_or(Value::Null)
    }
}
