//! Per-type member discovery.
//!
//! The first time a type's members are needed its class chain is walked, each
//! member schema is filtered through the session's visibility rules, and the
//! result is cached as a [`MemberTable`]. Lookups go through every alias and
//! honour the configured case sensitivity.

use crate::config::LoadConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::schema::{Access, MemberKind, MemberSchema, TypeSpec, Visibility};
use crate::types::{TypeHandle, TypeRegistry};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// Name reserved on definition types: the ID comes from the tag name.
pub const RESERVED_ID: &str = "ID";

#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub name: String,
    pub aliases: Vec<String>,
    pub declared: TypeHandle,
    pub kind: MemberKind,
    pub access: Access,
    pub is_static: bool,
    pub can_read: bool,
    pub can_write: bool,
    /// The class that declares the member.
    pub owner: TypeHandle,
}

impl MemberDescriptor {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Debug)]
pub struct MemberTable {
    target: TypeHandle,
    members: Vec<Rc<MemberDescriptor>>,
    lookup: HashMap<String, Rc<MemberDescriptor>>,
    case_sensitive: bool,
}

impl MemberTable {
    pub fn target(&self) -> TypeHandle {
        self.target
    }

    pub fn get(&self, name: &str) -> Option<Rc<MemberDescriptor>> {
        self.lookup.get(&fold(name, self.case_sensitive)).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<MemberDescriptor>> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn fold(name: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        name.to_string()
    } else {
        name.to_lowercase()
    }
}

#[derive(Debug, Clone)]
struct Rules {
    fields: bool,
    properties: bool,
    public: bool,
    non_public: bool,
    instance: bool,
    statics: bool,
    case_sensitive: bool,
}

#[derive(Debug)]
pub struct MemberStore {
    rules: Rules,
    tables: RefCell<HashMap<TypeHandle, Rc<MemberTable>>>,
}

impl MemberStore {
    pub fn new(config: &LoadConfig) -> Self {
        MemberStore {
            rules: Rules {
                fields: config.member_kinds.fields,
                properties: config.member_kinds.properties,
                public: config.member_access.public,
                non_public: config.member_access.non_public,
                instance: config.member_access.instance,
                statics: config.member_access.statics,
                case_sensitive: config.case_sensitive_members,
            },
            tables: RefCell::new(HashMap::new()),
        }
    }

    fn should_see(&self, member: &MemberSchema) -> bool {
        match member.visibility {
            Visibility::Include => return true,
            Visibility::Exclude => return false,
            Visibility::Default => {}
        }
        let kind_ok = match member.kind {
            MemberKind::Field => self.rules.fields,
            MemberKind::Property => self.rules.properties,
        };
        let access_ok = match member.access {
            Access::Public => self.rules.public,
            Access::NonPublic => self.rules.non_public,
        };
        let binding_ok = if member.is_static {
            self.rules.statics
        } else {
            self.rules.instance
        };
        kind_ok && access_ok && binding_ok
    }

    /// Discovered members of `ty`, including inherited ones. Built on first use.
    pub fn members_for(
        &self,
        types: &TypeRegistry,
        ty: TypeHandle,
        diagnostics: &Diagnostics,
    ) -> Rc<MemberTable> {
        if let Some(table) = self.tables.borrow().get(&ty) {
            return Rc::clone(table);
        }
        let table = Rc::new(self.build(types, ty, diagnostics));
        self.tables.borrow_mut().insert(ty, Rc::clone(&table));
        table
    }

    pub fn member(
        &self,
        types: &TypeRegistry,
        ty: TypeHandle,
        name: &str,
        diagnostics: &Diagnostics,
    ) -> Option<Rc<MemberDescriptor>> {
        self.members_for(types, ty, diagnostics).get(name)
    }

    pub fn cached_count(&self) -> usize {
        self.tables.borrow().len()
    }

    fn build(
        &self,
        types: &TypeRegistry,
        ty: TypeHandle,
        diagnostics: &Diagnostics,
    ) -> MemberTable {
        let case_sensitive = self.rules.case_sensitive;
        let reserved = types.is_definition(ty);
        let mut members: Vec<Rc<MemberDescriptor>> = Vec::new();
        let mut lookup: HashMap<String, Rc<MemberDescriptor>> = HashMap::new();

        for class_info in types.class_chain(ty) {
            let Some(class) = class_info.class() else {
                continue;
            };
            for schema in class.members.iter().filter(|m| self.should_see(m)) {
                if reserved && schema.name == RESERVED_ID {
                    diagnostics.report(Diagnostic::warning(format!(
                        "Member '{}' of '{}' is ignored: '{}' is reserved on definition types",
                        schema.name,
                        class_info.full_name(),
                        RESERVED_ID
                    )));
                    continue;
                }
                let declared = match &schema.ty {
                    TypeSpec::Handle(h) => *h,
                    TypeSpec::Name(n) => match types.resolve(n) {
                        Ok(h) => h,
                        Err(e) => {
                            diagnostics.report(
                                Diagnostic::error(format!(
                                    "Member '{}' of '{}' has a type that could not be resolved",
                                    schema.name,
                                    class_info.full_name()
                                ))
                                .with_cause(&e),
                            );
                            continue;
                        }
                    },
                };
                let descriptor = Rc::new(MemberDescriptor {
                    name: schema.name.clone(),
                    aliases: schema.aliases.clone(),
                    declared,
                    kind: schema.kind,
                    access: schema.access,
                    is_static: schema.is_static,
                    can_read: true,
                    can_write: schema.writable,
                    owner: class_info.handle(),
                });
                // A derived member hides a base member with the same name,
                // aliases included.
                if let Some(hidden) = members.iter().position(|m| m.name == descriptor.name) {
                    let hidden = members.remove(hidden);
                    lookup.retain(|_, m| !Rc::ptr_eq(m, &hidden));
                }
                for name in descriptor.names() {
                    lookup.insert(fold(name, case_sensitive), Rc::clone(&descriptor));
                }
                members.push(descriptor);
            }
        }

        log::trace!(
            "discovered {} member(s) on {}",
            members.len(),
            types.display_name(ty)
        );
        MemberTable {
            target: ty,
            members,
            lookup,
            case_sensitive,
        }
    }
}

/// Storage for static members, keyed by declaring type and member name.
#[derive(Debug, Default)]
pub struct StaticStore {
    values: RefCell<HashMap<(TypeHandle, String), Value>>,
    written: RefCell<BTreeSet<TypeHandle>>,
}

impl StaticStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner: TypeHandle, name: &str) -> Option<Value> {
        self.values.borrow().get(&(owner, name.to_string())).cloned()
    }

    pub fn set(&self, owner: TypeHandle, name: &str, value: Value) {
        self.values.borrow_mut().insert((owner, name.to_string()), value);
        self.written.borrow_mut().insert(owner);
    }

    /// Declaring types that had static data loaded into them.
    pub fn types_with_data(&self) -> Vec<TypeHandle> {
        self.written.borrow().iter().copied().collect()
    }

    pub fn clear(&self) {
        self.values.borrow_mut().clear();
        self.written.borrow_mut().clear();
    }
}
