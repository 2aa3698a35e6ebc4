//! Schemas describe user types to the [`crate::types::TypeRegistry`].
//!
//! They take the place of runtime reflection: a class lists its members,
//! their declared types, aliases and visibility, plus the optional lifecycle
//! hooks its instances take part in. Schemas are plain builders; nothing is
//! checked until the schema is registered.

use crate::diagnostics::ConfigReporter;
use crate::error::HookError;
use crate::types::TypeHandle;
use crate::value::{Object, ObjectRef, Value};
use std::fmt;
use std::rc::Rc;

/// A declared type: either an already registered handle or a type descriptor
/// that is resolved the first time the member store needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    Handle(TypeHandle),
    Name(String),
}

impl From<TypeHandle> for TypeSpec {
    fn from(handle: TypeHandle) -> Self {
        TypeSpec::Handle(handle)
    }
}

impl From<&str> for TypeSpec {
    fn from(name: &str) -> Self {
        TypeSpec::Name(name.to_string())
    }
}

impl From<String> for TypeSpec {
    fn from(name: String) -> Self {
        TypeSpec::Name(name)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Handle(h) => write!(f, "{}", h),
            TypeSpec::Name(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Property,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    NonPublic,
}

/// Per-member override of the session's discovery rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Follow the configured member kinds and access levels.
    #[default]
    Default,
    /// Always discoverable.
    Include,
    /// Never discoverable.
    Exclude,
}

#[derive(Debug, Clone)]
pub struct MemberSchema {
    pub(crate) name: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) ty: TypeSpec,
    pub(crate) kind: MemberKind,
    pub(crate) access: Access,
    pub(crate) is_static: bool,
    pub(crate) writable: bool,
    pub(crate) visibility: Visibility,
    pub(crate) default: Option<Value>,
}

impl MemberSchema {
    pub fn field(name: impl Into<String>, ty: impl Into<TypeSpec>) -> Self {
        MemberSchema {
            name: name.into(),
            aliases: Vec::new(),
            ty: ty.into(),
            kind: MemberKind::Field,
            access: Access::Public,
            is_static: false,
            writable: true,
            visibility: Visibility::Default,
            default: None,
        }
    }

    pub fn property(name: impl Into<String>, ty: impl Into<TypeSpec>) -> Self {
        MemberSchema {
            kind: MemberKind::Property,
            ..Self::field(name, ty)
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn non_public(mut self) -> Self {
        self.access = Access::NonPublic;
        self
    }

    #[must_use]
    pub fn statik(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// A property without a setter.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    #[must_use]
    pub fn include(mut self) -> Self {
        self.visibility = Visibility::Include;
        self
    }

    #[must_use]
    pub fn exclude(mut self) -> Self {
        self.visibility = Visibility::Exclude;
        self
    }

    /// Initial value given to new instances. Without one, members start at
    /// their type's default.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Runs after member defaults are assigned, base class first.
pub type Constructor = Rc<dyn Fn(&mut Object) -> Result<(), HookError>>;
/// Constructed, post-load and late-post-load hooks. They get the shared
/// handle and borrow it themselves, so a hook may follow references that
/// lead back to its own object.
pub type ObjectHook = Rc<dyn Fn(&ObjectRef) -> Result<(), HookError>>;
pub type ValidateHook = Rc<dyn Fn(&Object, &ConfigReporter<'_>) -> Result<(), HookError>>;

/// Optional lifecycle capabilities. A subclass that leaves a hook unset
/// inherits its base class's hook.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) constructed: Option<ObjectHook>,
    pub(crate) post_load: Option<ObjectHook>,
    pub(crate) late_post_load: Option<ObjectHook>,
    pub(crate) validate: Option<ValidateHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("constructed", &self.constructed.is_some())
            .field("post_load", &self.post_load.is_some())
            .field("late_post_load", &self.late_post_load.is_some())
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

pub struct ClassSchema {
    pub(crate) name: String,
    pub(crate) namespace: Option<String>,
    pub(crate) catalog: Option<String>,
    pub(crate) declaring: Option<TypeHandle>,
    pub(crate) base: Option<TypeHandle>,
    pub(crate) interfaces: Vec<TypeHandle>,
    pub(crate) is_abstract: bool,
    pub(crate) definition: bool,
    pub(crate) value_type: bool,
    pub(crate) members: Vec<MemberSchema>,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) hooks: Hooks,
}

impl ClassSchema {
    pub fn new(name: impl Into<String>) -> Self {
        ClassSchema {
            name: name.into(),
            namespace: None,
            catalog: None,
            declaring: None,
            base: None,
            interfaces: Vec::new(),
            is_abstract: false,
            definition: false,
            value_type: false,
            members: Vec::new(),
            constructor: None,
            hooks: Hooks::default(),
        }
    }

    /// Shorthand for a class whose instances are definitions.
    pub fn definition(name: impl Into<String>) -> Self {
        Self::new(name).as_definition()
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Catalog the type is searched in. Defaults to the registry's
    /// application catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    /// Declares this type as nested inside `outer`, addressable as `Outer+Name`.
    #[must_use]
    pub fn nested_in(mut self, outer: TypeHandle) -> Self {
        self.declaring = Some(outer);
        self
    }

    #[must_use]
    pub fn extends(mut self, base: TypeHandle) -> Self {
        self.base = Some(base);
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: TypeHandle) -> Self {
        self.interfaces.push(interface);
        self
    }

    #[must_use]
    pub fn is_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Instances are top level definitions. Inherited by subclasses.
    #[must_use]
    pub fn as_definition(mut self) -> Self {
        self.definition = true;
        self
    }

    /// Instances are copied, not shared, when reused as a current value.
    #[must_use]
    pub fn value_type(mut self) -> Self {
        self.value_type = true;
        self
    }

    #[must_use]
    pub fn member(mut self, member: MemberSchema) -> Self {
        self.members.push(member);
        self
    }

    /// Shorthand for a public instance field.
    #[must_use]
    pub fn field(self, name: &str, ty: impl Into<TypeSpec>) -> Self {
        self.member(MemberSchema::field(name, ty))
    }

    #[must_use]
    pub fn constructor(
        mut self,
        f: impl Fn(&mut Object) -> Result<(), HookError> + 'static,
    ) -> Self {
        self.constructor = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_constructed(
        mut self,
        f: impl Fn(&ObjectRef) -> Result<(), HookError> + 'static,
    ) -> Self {
        self.hooks.constructed = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_post_load(
        mut self,
        f: impl Fn(&ObjectRef) -> Result<(), HookError> + 'static,
    ) -> Self {
        self.hooks.post_load = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_late_post_load(
        mut self,
        f: impl Fn(&ObjectRef) -> Result<(), HookError> + 'static,
    ) -> Self {
        self.hooks.late_post_load = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_validate(
        mut self,
        f: impl Fn(&Object, &ConfigReporter<'_>) -> Result<(), HookError> + 'static,
    ) -> Self {
        self.hooks.validate = Some(Rc::new(f));
        self
    }
}

pub struct InterfaceSchema {
    pub(crate) name: String,
    pub(crate) namespace: Option<String>,
    pub(crate) catalog: Option<String>,
    pub(crate) declaring: Option<TypeHandle>,
    pub(crate) extends: Vec<TypeHandle>,
}

impl InterfaceSchema {
    pub fn new(name: impl Into<String>) -> Self {
        InterfaceSchema {
            name: name.into(),
            namespace: None,
            catalog: None,
            declaring: None,
            extends: Vec::new(),
        }
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    #[must_use]
    pub fn nested_in(mut self, outer: TypeHandle) -> Self {
        self.declaring = Some(outer);
        self
    }

    #[must_use]
    pub fn extends(mut self, interface: TypeHandle) -> Self {
        self.extends.push(interface);
        self
    }
}

pub struct EnumSchema {
    pub(crate) name: String,
    pub(crate) namespace: Option<String>,
    pub(crate) catalog: Option<String>,
    pub(crate) declaring: Option<TypeHandle>,
    pub(crate) variants: Vec<(String, i64)>,
}

impl EnumSchema {
    pub fn new(name: impl Into<String>) -> Self {
        EnumSchema {
            name: name.into(),
            namespace: None,
            catalog: None,
            declaring: None,
            variants: Vec::new(),
        }
    }

    /// Adds a variant numbered one past the previous variant.
    #[must_use]
    pub fn variant(mut self, name: impl Into<String>) -> Self {
        let next = self.variants.last().map_or(0, |(_, v)| v + 1);
        self.variants.push((name.into(), next));
        self
    }

    #[must_use]
    pub fn variant_value(mut self, name: impl Into<String>, value: i64) -> Self {
        self.variants.push((name.into(), value));
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    #[must_use]
    pub fn nested_in(mut self, outer: TypeHandle) -> Self {
        self.declaring = Some(outer);
        self
    }
}
