//! Runtime type handles and the registry that owns their metadata.
//!
//! A [`TypeRegistry`] plays the part reflection plays elsewhere: every type a
//! definition can be loaded into is registered here, either built in (the
//! `core` catalog) or described by a [`crate::schema`] builder. Generic and
//! array types are constructed on demand and interned, so two descriptors that
//! mean the same type always produce the same [`TypeHandle`].

use crate::error::{HookError, RegistryError, ResolveError};
use crate::schema::{
    ClassSchema, Constructor, EnumSchema, Hooks, InterfaceSchema, MemberSchema, TypeSpec,
};
use crate::value::{EnumValue, Object, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub const CORE_CATALOG: &str = "core";
pub const APP_CATALOG: &str = "app";
pub const CORE_NAMESPACE: &str = "core";

/// Opaque reference to a type owned by a [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeHandle(u32);

impl TypeHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Char,
    String,
}

impl Primitive {
    pub const ALL: [Primitive; 13] = [
        Primitive::Bool,
        Primitive::Int8,
        Primitive::UInt8,
        Primitive::Int16,
        Primitive::UInt16,
        Primitive::Int32,
        Primitive::UInt32,
        Primitive::Int64,
        Primitive::UInt64,
        Primitive::Float32,
        Primitive::Float64,
        Primitive::Char,
        Primitive::String,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "Bool",
            Primitive::Int8 => "Int8",
            Primitive::UInt8 => "UInt8",
            Primitive::Int16 => "Int16",
            Primitive::UInt16 => "UInt16",
            Primitive::Int32 => "Int32",
            Primitive::UInt32 => "UInt32",
            Primitive::Int64 => "Int64",
            Primitive::UInt64 => "UInt64",
            Primitive::Float32 => "Float32",
            Primitive::Float64 => "Float64",
            Primitive::Char => "Char",
            Primitive::String => "String",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Primitive::Bool => &["bool"],
            Primitive::Int8 => &["sbyte", "i8"],
            Primitive::UInt8 => &["byte", "u8"],
            Primitive::Int16 => &["short", "i16"],
            Primitive::UInt16 => &["ushort", "u16"],
            Primitive::Int32 => &["int", "i32"],
            Primitive::UInt32 => &["uint", "u32"],
            Primitive::Int64 => &["long", "i64"],
            Primitive::UInt64 => &["ulong", "u64"],
            Primitive::Float32 => &["float", "f32"],
            Primitive::Float64 => &["double", "f64"],
            Primitive::Char => &["char"],
            Primitive::String => &["string"],
        }
    }

    pub fn is_value_type(self) -> bool {
        self != Primitive::String
    }

    fn default_value(self) -> Value {
        match self {
            Primitive::Bool => Value::Bool(false),
            Primitive::Int8 | Primitive::Int16 | Primitive::Int32 | Primitive::Int64 => {
                Value::Int(0)
            }
            Primitive::UInt8 | Primitive::UInt16 | Primitive::UInt32 | Primitive::UInt64 => {
                Value::UInt(0)
            }
            Primitive::Float32 | Primitive::Float64 => Value::Float(0.0),
            Primitive::Char => Value::Char('\0'),
            Primitive::String => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericKind {
    List,
    HashSet,
    ReadOnlyList,
    Dictionary,
    Nullable,
}

impl GenericKind {
    const ALL: [GenericKind; 5] = [
        GenericKind::List,
        GenericKind::HashSet,
        GenericKind::ReadOnlyList,
        GenericKind::Dictionary,
        GenericKind::Nullable,
    ];

    pub fn arity(self) -> usize {
        match self {
            GenericKind::Dictionary => 2,
            _ => 1,
        }
    }

    fn base_name(self) -> &'static str {
        match self {
            GenericKind::List => "List",
            GenericKind::HashSet => "HashSet",
            GenericKind::ReadOnlyList => "ReadOnlyList",
            GenericKind::Dictionary => "Dictionary",
            GenericKind::Nullable => "Nullable",
        }
    }
}

pub struct ClassInfo {
    pub(crate) members: Vec<MemberSchema>,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) hooks: Hooks,
    pub(crate) value_type: bool,
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("members", &self.members)
            .field("constructor", &self.constructor.is_some())
            .field("hooks", &self.hooks)
            .field("value_type", &self.value_type)
            .finish()
    }
}

#[derive(Debug)]
pub enum TypeKind {
    Primitive(Primitive),
    /// The root type. Every type is assignable to it.
    Object,
    /// Values are type handles.
    Type,
    /// Values are copies of markup nodes.
    Node,
    Enum(Vec<(String, i64)>),
    Interface,
    Class(ClassInfo),
    GenericDefinition(GenericKind),
    Nullable(TypeHandle),
    List(TypeHandle),
    HashSet(TypeHandle),
    ReadOnlyList(TypeHandle),
    Array(TypeHandle),
    Map(TypeHandle, TypeHandle),
}

#[derive(Debug)]
pub struct TypeInfo {
    handle: TypeHandle,
    name: String,
    namespace: Option<String>,
    full_name: String,
    nested_name: String,
    declaring: Option<TypeHandle>,
    base: Option<TypeHandle>,
    interfaces: Vec<TypeHandle>,
    is_abstract: bool,
    catalog: Option<String>,
    kind: TypeKind,
}

impl TypeInfo {
    pub fn handle(&self) -> TypeHandle {
        self.handle
    }

    /// Short name. Generic definitions carry their arity, e.g. ``List`1``.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Namespace, nesting chain and name, e.g. `game.Outer+Inner`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Nesting chain and name without the namespace, e.g. `Outer+Inner`.
    pub fn nested_name(&self) -> &str {
        &self.nested_name
    }

    pub fn declaring(&self) -> Option<TypeHandle> {
        self.declaring
    }

    pub fn base(&self) -> Option<TypeHandle> {
        self.base
    }

    pub fn interfaces(&self) -> &[TypeHandle] {
        &self.interfaces
    }

    /// Abstract classes and interfaces cannot be instantiated.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn class(&self) -> Option<&ClassInfo> {
        match &self.kind {
            TypeKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_value_type(&self) -> bool {
        match &self.kind {
            TypeKind::Primitive(p) => p.is_value_type(),
            TypeKind::Enum(_) | TypeKind::Nullable(_) => true,
            TypeKind::Class(c) => c.value_type,
            _ => false,
        }
    }

    /// Element type of list-like types.
    pub fn element_type(&self) -> Option<TypeHandle> {
        match self.kind {
            TypeKind::List(e)
            | TypeKind::HashSet(e)
            | TypeKind::ReadOnlyList(e)
            | TypeKind::Array(e) => Some(e),
            _ => None,
        }
    }

    /// Key and value types of map-like types.
    pub fn map_types(&self) -> Option<(TypeHandle, TypeHandle)> {
        match self.kind {
            TypeKind::Map(k, v) => Some((k, v)),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Catalog {
    name: String,
    types: Vec<TypeHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstructedKey {
    Generic(GenericKind, Vec<TypeHandle>),
    Array(TypeHandle),
}

#[derive(Debug, Default)]
struct CoreTypes {
    object: TypeHandle,
    type_type: TypeHandle,
    node: TypeHandle,
    definition: TypeHandle,
    primitives: Vec<TypeHandle>,
    generics: Vec<TypeHandle>,
}

/// Owns every type known to one database.
///
/// All methods take `&self`; caches and the type table use interior
/// mutability and are not meant to be shared across threads.
#[derive(Debug)]
pub struct TypeRegistry {
    types: RefCell<Vec<Rc<TypeInfo>>>,
    catalogs: RefCell<Vec<Catalog>>,
    constructed: RefCell<HashMap<ConstructedKey, TypeHandle>>,
    pub(crate) cache: RefCell<HashMap<String, Result<TypeHandle, ResolveError>>>,
    pub(crate) aliases: HashMap<&'static str, TypeHandle>,
    core: CoreTypes,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            types: RefCell::new(Vec::new()),
            catalogs: RefCell::new(vec![
                Catalog {
                    name: CORE_CATALOG.to_string(),
                    types: Vec::new(),
                },
                Catalog {
                    name: APP_CATALOG.to_string(),
                    types: Vec::new(),
                },
            ]),
            constructed: RefCell::new(HashMap::new()),
            cache: RefCell::new(HashMap::new()),
            aliases: HashMap::new(),
            core: CoreTypes::default(),
        };
        registry.bootstrap();
        registry
    }

    fn bootstrap(&mut self) {
        let core = |name: &str, kind: TypeKind| self.push_core(name, kind);

        let object = core("Object", TypeKind::Object);
        let primitives: Vec<TypeHandle> = Primitive::ALL
            .iter()
            .map(|&p| core(p.name(), TypeKind::Primitive(p)))
            .collect();
        let type_type = core("Type", TypeKind::Type);
        let node = core("Node", TypeKind::Node);
        let definition = core("Definition", TypeKind::Interface);
        let generics: Vec<TypeHandle> = GenericKind::ALL
            .iter()
            .map(|&g| {
                core(
                    &format!("{}`{}", g.base_name(), g.arity()),
                    TypeKind::GenericDefinition(g),
                )
            })
            .collect();

        let mut aliases = HashMap::new();
        aliases.insert("object", object);
        for (p, &h) in Primitive::ALL.iter().zip(&primitives) {
            for alias in p.aliases() {
                aliases.insert(*alias, h);
            }
        }

        self.aliases = aliases;
        self.core = CoreTypes {
            object,
            type_type,
            node,
            definition,
            primitives,
            generics,
        };
    }

    fn push_core(&self, name: &str, kind: TypeKind) -> TypeHandle {
        let is_abstract = matches!(kind, TypeKind::Interface | TypeKind::GenericDefinition(_));
        let base = match kind {
            TypeKind::Object | TypeKind::Interface | TypeKind::GenericDefinition(_) => None,
            _ => Some(self.core.object),
        };
        self.push(
            TypeInfo {
                handle: TypeHandle::default(),
                name: name.to_string(),
                namespace: Some(CORE_NAMESPACE.to_string()),
                full_name: format!("{}.{}", CORE_NAMESPACE, name),
                nested_name: name.to_string(),
                declaring: None,
                base,
                interfaces: Vec::new(),
                is_abstract,
                catalog: Some(CORE_CATALOG.to_string()),
                kind,
            },
            Some(CORE_CATALOG),
        )
    }

    fn push(&self, mut info: TypeInfo, catalog: Option<&str>) -> TypeHandle {
        let handle = {
            let mut types = self.types.borrow_mut();
            let handle = TypeHandle(types.len() as u32);
            info.handle = handle;
            types.push(Rc::new(info));
            handle
        };
        if let Some(name) = catalog {
            let mut catalogs = self.catalogs.borrow_mut();
            match catalogs.iter_mut().find(|c| c.name == name) {
                Some(c) => c.types.push(handle),
                None => catalogs.push(Catalog {
                    name: name.to_string(),
                    types: vec![handle],
                }),
            }
        }
        handle
    }

    pub fn info(&self, handle: TypeHandle) -> Rc<TypeInfo> {
        Rc::clone(&self.types.borrow()[handle.index()])
    }

    pub fn len(&self) -> usize {
        self.types.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human readable name, e.g. `List<Int32>` or `game.Widget`.
    pub fn display_name(&self, handle: TypeHandle) -> String {
        self.info(handle).full_name.clone()
    }

    pub fn object(&self) -> TypeHandle {
        self.core.object
    }

    pub fn type_type(&self) -> TypeHandle {
        self.core.type_type
    }

    pub fn node(&self) -> TypeHandle {
        self.core.node
    }

    /// Interface implemented by every definition class.
    pub fn definition(&self) -> TypeHandle {
        self.core.definition
    }

    pub fn primitive(&self, primitive: Primitive) -> TypeHandle {
        let index = Primitive::ALL
            .iter()
            .position(|&p| p == primitive)
            .unwrap_or_default();
        self.core.primitives[index]
    }

    pub fn string(&self) -> TypeHandle {
        self.primitive(Primitive::String)
    }

    pub fn generic_definition(&self, kind: GenericKind) -> TypeHandle {
        let index = GenericKind::ALL
            .iter()
            .position(|&g| g == kind)
            .unwrap_or_default();
        self.core.generics[index]
    }

    /// Names of all catalogs in search order.
    pub fn catalogs(&self) -> Vec<String> {
        self.catalogs.borrow().iter().map(|c| c.name.clone()).collect()
    }

    /// Re-orders the searchable catalogs by descending priority (ties keep
    /// their current order) and invalidates the resolution cache.
    pub fn refresh_catalogs(&self, priority: impl Fn(&str) -> i32) {
        self.catalogs
            .borrow_mut()
            .sort_by_key(|c| std::cmp::Reverse(priority(&c.name)));
        self.clear_cache();
    }

    pub(crate) fn catalog_types(&self) -> Vec<(String, Vec<TypeHandle>)> {
        self.catalogs
            .borrow()
            .iter()
            .map(|c| (c.name.clone(), c.types.clone()))
            .collect()
    }

    pub fn register_class(&self, schema: ClassSchema) -> Result<TypeHandle, RegistryError> {
        validate_name(&schema.name)?;
        let base = schema.base.unwrap_or(self.core.object);
        let base_info = self.info(base);
        if !matches!(base_info.kind, TypeKind::Class(_) | TypeKind::Object) {
            return Err(RegistryError::InvalidBase {
                name: schema.name,
                base: base_info.full_name.clone(),
                reason: "only classes can be extended".to_string(),
            });
        }
        self.check_interfaces(&schema.name, &schema.interfaces)?;

        let mut interfaces = schema.interfaces;
        if schema.definition && !interfaces.contains(&self.core.definition) {
            interfaces.push(self.core.definition);
        }

        let info = self.new_info(
            schema.name,
            schema.namespace,
            schema.declaring,
            schema.catalog,
            TypeKind::Class(ClassInfo {
                members: schema.members,
                constructor: schema.constructor,
                hooks: schema.hooks,
                value_type: schema.value_type,
            }),
        )?;
        let catalog = info.catalog.clone();
        let handle = self.push(
            TypeInfo {
                base: Some(base),
                interfaces,
                is_abstract: schema.is_abstract,
                ..info
            },
            catalog.as_deref(),
        );
        log::trace!("registered class {}", self.display_name(handle));
        self.clear_cache();
        Ok(handle)
    }

    pub fn register_interface(&self, schema: InterfaceSchema) -> Result<TypeHandle, RegistryError> {
        validate_name(&schema.name)?;
        self.check_interfaces(&schema.name, &schema.extends)?;
        let info = self.new_info(
            schema.name,
            schema.namespace,
            schema.declaring,
            schema.catalog,
            TypeKind::Interface,
        )?;
        let catalog = info.catalog.clone();
        let handle = self.push(
            TypeInfo {
                interfaces: schema.extends,
                is_abstract: true,
                ..info
            },
            catalog.as_deref(),
        );
        self.clear_cache();
        Ok(handle)
    }

    pub fn register_enum(&self, schema: EnumSchema) -> Result<TypeHandle, RegistryError> {
        validate_name(&schema.name)?;
        let info = self.new_info(
            schema.name,
            schema.namespace,
            schema.declaring,
            schema.catalog,
            TypeKind::Enum(schema.variants),
        )?;
        let catalog = info.catalog.clone();
        let handle = self.push(
            TypeInfo {
                base: Some(self.core.object),
                ..info
            },
            catalog.as_deref(),
        );
        self.clear_cache();
        Ok(handle)
    }

    fn check_interfaces(&self, name: &str, interfaces: &[TypeHandle]) -> Result<(), RegistryError> {
        for &i in interfaces {
            let info = self.info(i);
            if !matches!(info.kind, TypeKind::Interface) {
                return Err(RegistryError::NotAnInterface {
                    name: name.to_string(),
                    interface: info.full_name.clone(),
                });
            }
        }
        Ok(())
    }

    fn new_info(
        &self,
        name: String,
        namespace: Option<String>,
        declaring: Option<TypeHandle>,
        catalog: Option<String>,
        kind: TypeKind,
    ) -> Result<TypeInfo, RegistryError> {
        let nested_name = match declaring {
            Some(outer) => format!("{}+{}", self.info(outer).nested_name, name),
            None => name.clone(),
        };
        // A nested type lives in its outer type's namespace.
        let namespace = match declaring {
            Some(outer) => self.info(outer).namespace.clone(),
            None => namespace,
        };
        let full_name = match &namespace {
            Some(ns) => format!("{}.{}", ns, nested_name),
            None => nested_name.clone(),
        };
        let catalog = catalog.unwrap_or_else(|| APP_CATALOG.to_string());

        let duplicate = self
            .catalogs
            .borrow()
            .iter()
            .filter(|c| c.name == catalog)
            .flat_map(|c| c.types.iter())
            .any(|&h| self.info(h).full_name == full_name);
        if duplicate {
            return Err(RegistryError::DuplicateType { full_name, catalog });
        }

        Ok(TypeInfo {
            handle: TypeHandle::default(),
            name,
            namespace,
            full_name,
            nested_name,
            declaring,
            base: None,
            interfaces: Vec::new(),
            is_abstract: false,
            catalog: Some(catalog),
            kind,
        })
    }

    /// Builds (or returns the interned) constructed generic type.
    ///
    /// # Errors
    /// [`ResolveError::Constraint`] when `definition` is not a generic
    /// definition, the argument count is wrong, an argument is itself an open
    /// generic definition, or a nullable argument is not a non-nullable value type.
    pub fn construct_generic(
        &self,
        definition: TypeHandle,
        args: &[TypeHandle],
    ) -> Result<TypeHandle, ResolveError> {
        let def_info = self.info(definition);
        let constraint = |reason: String| ResolveError::Constraint {
            name: def_info.full_name.clone(),
            reason,
        };
        let TypeKind::GenericDefinition(kind) = def_info.kind else {
            return Err(constraint("it is not a generic type definition".to_string()));
        };
        if args.len() != kind.arity() {
            return Err(constraint(format!(
                "expected {} type argument(s), found {}",
                kind.arity(),
                args.len()
            )));
        }
        for &arg in args {
            if matches!(self.info(arg).kind, TypeKind::GenericDefinition(_)) {
                return Err(constraint(format!(
                    "'{}' is an open generic type and cannot be used as an argument",
                    self.display_name(arg)
                )));
            }
        }
        if kind == GenericKind::Nullable {
            let arg = self.info(args[0]);
            if !arg.is_value_type() || matches!(arg.kind, TypeKind::Nullable(_)) {
                return Err(constraint(format!(
                    "'{}' must be a non-nullable value type",
                    arg.full_name
                )));
            }
        }

        let key = ConstructedKey::Generic(kind, args.to_vec());
        Ok(self.intern(key, || match kind {
            GenericKind::List => TypeKind::List(args[0]),
            GenericKind::HashSet => TypeKind::HashSet(args[0]),
            GenericKind::ReadOnlyList => TypeKind::ReadOnlyList(args[0]),
            GenericKind::Dictionary => TypeKind::Map(args[0], args[1]),
            GenericKind::Nullable => TypeKind::Nullable(args[0]),
        }))
    }

    pub fn list_of(&self, element: TypeHandle) -> Result<TypeHandle, ResolveError> {
        self.construct_generic(self.generic_definition(GenericKind::List), &[element])
    }

    pub fn hash_set_of(&self, element: TypeHandle) -> Result<TypeHandle, ResolveError> {
        self.construct_generic(self.generic_definition(GenericKind::HashSet), &[element])
    }

    pub fn read_only_list_of(&self, element: TypeHandle) -> Result<TypeHandle, ResolveError> {
        self.construct_generic(self.generic_definition(GenericKind::ReadOnlyList), &[element])
    }

    pub fn map_of(&self, key: TypeHandle, value: TypeHandle) -> Result<TypeHandle, ResolveError> {
        self.construct_generic(self.generic_definition(GenericKind::Dictionary), &[key, value])
    }

    /// # Errors
    /// [`ResolveError::NullableReference`] for reference types.
    pub fn nullable_of(&self, inner: TypeHandle) -> Result<TypeHandle, ResolveError> {
        let info = self.info(inner);
        if !info.is_value_type() {
            return Err(ResolveError::NullableReference {
                name: info.full_name.clone(),
            });
        }
        self.construct_generic(self.generic_definition(GenericKind::Nullable), &[inner])
    }

    pub fn array_of(&self, element: TypeHandle) -> Result<TypeHandle, ResolveError> {
        let info = self.info(element);
        if matches!(info.kind, TypeKind::GenericDefinition(_)) {
            return Err(ResolveError::Constraint {
                name: format!("{}[]", info.full_name),
                reason: "arrays of open generic types are not allowed".to_string(),
            });
        }
        Ok(self.intern(ConstructedKey::Array(element), || TypeKind::Array(element)))
    }

    fn intern(&self, key: ConstructedKey, make: impl FnOnce() -> TypeKind) -> TypeHandle {
        if let Some(&existing) = self.constructed.borrow().get(&key) {
            return existing;
        }
        let kind = make();
        let name = self.constructed_name(&kind);
        let handle = self.push(
            TypeInfo {
                handle: TypeHandle::default(),
                full_name: name.clone(),
                nested_name: name.clone(),
                name,
                namespace: Some(CORE_NAMESPACE.to_string()),
                declaring: None,
                base: Some(self.core.object),
                interfaces: Vec::new(),
                is_abstract: false,
                catalog: None,
                kind,
            },
            None,
        );
        self.constructed.borrow_mut().insert(key, handle);
        handle
    }

    fn constructed_name(&self, kind: &TypeKind) -> String {
        let short = |h: TypeHandle| self.info(h).name.clone();
        match *kind {
            TypeKind::List(e) => format!("List<{}>", short(e)),
            TypeKind::HashSet(e) => format!("HashSet<{}>", short(e)),
            TypeKind::ReadOnlyList(e) => format!("ReadOnlyList<{}>", short(e)),
            TypeKind::Map(k, v) => format!("Dictionary<{}, {}>", short(k), short(v)),
            TypeKind::Nullable(e) => format!("{}?", short(e)),
            TypeKind::Array(e) => format!("{}[]", short(e)),
            _ => String::new(),
        }
    }

    /// Unwraps `T?` to `T`. Other types are returned unchanged.
    pub fn strip_nullable(&self, handle: TypeHandle) -> TypeHandle {
        match self.info(handle).kind {
            TypeKind::Nullable(inner) => inner,
            _ => handle,
        }
    }

    pub fn is_value_type(&self, handle: TypeHandle) -> bool {
        self.info(handle).is_value_type()
    }

    /// Whether a value of type `source` may be stored where `target` is expected.
    pub fn is_assignable(&self, target: TypeHandle, source: TypeHandle) -> bool {
        if target == source || target == self.core.object {
            return true;
        }
        let target_info = self.info(target);
        if let TypeKind::Nullable(inner) = target_info.kind {
            return inner == source;
        }
        let is_interface = matches!(target_info.kind, TypeKind::Interface);

        let mut current = Some(source);
        while let Some(h) = current {
            if h == target {
                return true;
            }
            let info = self.info(h);
            if is_interface && self.implements(&info.interfaces, target) {
                return true;
            }
            current = info.base;
        }
        false
    }

    fn implements(&self, interfaces: &[TypeHandle], target: TypeHandle) -> bool {
        interfaces
            .iter()
            .any(|&i| i == target || self.implements(&self.info(i).interfaces, target))
    }

    pub fn is_definition(&self, handle: TypeHandle) -> bool {
        self.is_assignable(self.core.definition, handle)
    }

    /// The type itself, its base classes (excluding `Object`) and every
    /// interface it implements, directly or through a base or another interface.
    pub fn supertypes(&self, handle: TypeHandle) -> Vec<TypeHandle> {
        let mut out = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            if h == self.core.object {
                break;
            }
            if !out.contains(&h) {
                out.push(h);
            }
            let info = self.info(h);
            self.collect_interfaces(&info.interfaces, &mut out);
            current = info.base;
        }
        out
    }

    fn collect_interfaces(&self, interfaces: &[TypeHandle], out: &mut Vec<TypeHandle>) {
        for &i in interfaces {
            if !out.contains(&i) {
                out.push(i);
                self.collect_interfaces(&self.info(i).interfaces, out);
            }
        }
    }

    /// Base-first chain of class types from the root down to `handle`.
    pub fn class_chain(&self, handle: TypeHandle) -> Vec<Rc<TypeInfo>> {
        let mut chain = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            let info = self.info(h);
            current = info.base;
            if info.class().is_some() {
                chain.push(info);
            }
        }
        chain.reverse();
        chain
    }

    /// Finds the nearest hook in the class chain, starting at `handle`.
    pub(crate) fn find_hook<T>(
        &self,
        handle: TypeHandle,
        pick: impl Fn(&Hooks) -> Option<T>,
    ) -> Option<T> {
        let mut current = Some(handle);
        while let Some(h) = current {
            let info = self.info(h);
            if let Some(found) = info.class().and_then(|c| pick(&c.hooks)) {
                return Some(found);
            }
            current = info.base;
        }
        None
    }

    /// The value a member of this type holds before anything is written to it.
    pub fn default_value(&self, handle: TypeHandle) -> Value {
        let info = self.info(handle);
        match &info.kind {
            TypeKind::Primitive(p) => p.default_value(),
            TypeKind::Enum(variants) => {
                let name = variants
                    .iter()
                    .find(|(_, v)| *v == 0)
                    .map_or_else(|| "0".to_string(), |(n, _)| n.clone());
                Value::Enum(EnumValue {
                    ty: handle,
                    name,
                    value: 0,
                })
            }
            _ => Value::Null,
        }
    }

    pub(crate) fn member_default(&self, member: &MemberSchema) -> Value {
        if let Some(v) = &member.default {
            return v.clone();
        }
        let resolved = match &member.ty {
            TypeSpec::Handle(h) => Some(*h),
            TypeSpec::Name(n) => self.resolve(n).ok(),
        };
        resolved.map_or(Value::Null, |h| self.default_value(h))
    }

    /// Creates a new instance of a class: every instance member is set to its
    /// default, then constructors run from the root class down.
    ///
    /// # Errors
    /// Fails when the type is not a concrete class or a constructor fails.
    pub fn instantiate(&self, handle: TypeHandle) -> Result<Object, HookError> {
        let info = self.info(handle);
        if info.is_abstract {
            return Err(HookError::new(format!(
                "cannot create an instance of abstract type '{}'",
                info.full_name
            )));
        }
        match info.kind {
            TypeKind::Object => return Ok(Object::new(handle)),
            TypeKind::Class(_) => {}
            _ => {
                return Err(HookError::new(format!(
                    "'{}' is not a class",
                    info.full_name
                )))
            }
        }

        let mut object = Object::new(handle);
        let chain = self.class_chain(handle);
        for class_info in &chain {
            if let Some(class) = class_info.class() {
                for member in class.members.iter().filter(|m| !m.is_static) {
                    object.set(member.name.clone(), self.member_default(member));
                }
            }
        }
        for class_info in &chain {
            if let Some(ctor) = class_info.class().and_then(|c| c.constructor.clone()) {
                ctor(&mut object)?;
            }
        }
        Ok(object)
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let invalid = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || "<>[],?+.`".contains(c));
    if invalid {
        Err(RegistryError::InvalidName {
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}
