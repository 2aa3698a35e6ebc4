//! The definition database: loaded definitions keyed by ID, plus per-type
//! views for polymorphic queries.

use crate::ast::Document;
use crate::config::LoadConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::SessionError;
use crate::loader::Session;
use crate::members::StaticStore;
use crate::parser::Parser;
use crate::serialization::{self, Value as SerialValue};
use crate::types::{TypeHandle, TypeRegistry};
use crate::value::{Object, ObjectRef, Value};
use std::cell::Ref;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

/// A loaded definition: its ID, concrete type and object.
#[derive(Debug, Clone)]
pub struct Definition {
    id: String,
    ty: TypeHandle,
    object: ObjectRef,
}

impl Definition {
    pub fn new(id: &str, object: ObjectRef) -> Self {
        let ty = object.borrow().type_handle();
        Definition {
            id: id.to_string(),
            ty,
            object,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_handle(&self) -> TypeHandle {
        self.ty
    }

    /// A new handle to the shared object.
    pub fn object(&self) -> ObjectRef {
        Rc::clone(&self.object)
    }

    pub fn object_ref(&self) -> &ObjectRef {
        &self.object
    }

    pub fn borrow(&self) -> Ref<'_, Object> {
        self.object.borrow()
    }

    pub fn same_as(&self, other: &Definition) -> bool {
        Rc::ptr_eq(&self.object, &other.object)
    }
}

/// Owns the type registry, the diagnostic channel and every loaded
/// definition. Definitions are added through a loading session:
///
/// ```text
/// start_loading -> add_document* -> finish_loading
/// ```
#[derive(Default)]
pub struct Database {
    types: TypeRegistry,
    diagnostics: Diagnostics,
    statics: StaticStore,
    by_id: HashMap<String, Definition>,
    all: Vec<Definition>,
    containers: HashMap<TypeHandle, Vec<Definition>>,
    session: Option<Session>,
    config: Option<LoadConfig>,
    master: Option<String>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing registry, e.g. one shared setup routine per test.
    pub fn with_types(types: TypeRegistry) -> Self {
        Database {
            types,
            ..Self::default()
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The configuration of the current or most recent session.
    pub fn config(&self) -> Option<&LoadConfig> {
        self.session.as_ref().map(Session::config).or(self.config.as_ref())
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The active session, e.g. to add converters before finishing.
    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Starts a loading session. With `reloading`, definitions whose IDs are
    /// already registered are patched in place instead of being rejected.
    ///
    /// # Errors
    /// Fails when a session is already running.
    pub fn start_loading(
        &mut self,
        config: LoadConfig,
        reloading: bool,
    ) -> Result<(), SessionError> {
        if self.session.is_some() {
            return Err(SessionError::AlreadyLoading);
        }
        log::debug!("starting {} session", if reloading { "reloading" } else { "loading" });
        self.config = Some(config.clone());
        self.session = Some(Session::new(config, reloading));
        Ok(())
    }

    /// # Errors
    /// Fails when no session is running.
    pub fn add_document(&mut self, document: &Document, source: &str) -> Result<(), SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NotLoading)?;
        session.append(document, source);
        Ok(())
    }

    /// Parses and adds a document. A parse failure is reported as a
    /// diagnostic and `Ok(false)` is returned.
    ///
    /// # Errors
    /// Fails when no session is running.
    pub fn add_document_str(&mut self, text: &str, source: &str) -> Result<bool, SessionError> {
        if self.session.is_none() {
            return Err(SessionError::NotLoading);
        }
        let mut parser = Parser::new_with_name(text, source.to_string());
        match parser.parse_document() {
            Ok(document) => {
                self.add_document(&document, source)?;
                Ok(true)
            }
            Err(e) => {
                self.diagnostics.report(
                    Diagnostic::error(format!("Failed to parse definition document '{}'", source))
                        .with_cause(&e),
                );
                Ok(false)
            }
        }
    }

    /// Reads and adds a document from disk. Read and parse failures are
    /// reported as diagnostics and `Ok(false)` is returned.
    ///
    /// # Errors
    /// Fails when no session is running.
    pub fn add_document_file(&mut self, path: impl AsRef<Path>) -> Result<bool, SessionError> {
        if self.session.is_none() {
            return Err(SessionError::NotLoading);
        }
        let path = path.as_ref();
        let source = path.to_string_lossy().to_string();
        match std::fs::read_to_string(path) {
            Ok(text) => self.add_document_str(&text, &source),
            Err(e) => {
                self.diagnostics.report(
                    Diagnostic::error(format!("Failed to read definition document '{}'", source))
                        .with_cause(&e),
                );
                Ok(false)
            }
        }
    }

    /// Resolves, materializes and registers everything added since
    /// [`Database::start_loading`], then runs the lifecycle phases.
    /// Returns the number of newly registered definitions.
    ///
    /// # Errors
    /// Fails when no session is running.
    pub fn finish_loading(&mut self) -> Result<usize, SessionError> {
        let session = self.session.take().ok_or(SessionError::NotLoading)?;
        let outcome = session.run(&self.types, &self.diagnostics, &self.statics, &self.by_id);

        let mut registered = 0usize;
        for definition in outcome.loaded {
            let id = definition.id().to_string();
            if self.register(definition) {
                registered += 1;
            } else {
                self.diagnostics.report(
                    Diagnostic::error(format!("Failed to register definition '{}'", id))
                        .with_definition(Some(&id)),
                );
            }
        }
        self.master = Some(outcome.master);

        log::debug!(
            "finished loading: {} registered, {} patched, {} total",
            registered,
            outcome.patched,
            self.all.len()
        );
        Ok(registered)
    }

    /// Removes every definition and cancels any running session.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.all.clear();
        self.containers.clear();
        self.session = None;
        self.master = None;
    }

    /// Adds a definition. Fails (returns `false`) when the ID is taken.
    pub fn register(&mut self, definition: Definition) -> bool {
        if self.by_id.contains_key(definition.id()) {
            return false;
        }
        for ty in self.types.supertypes(definition.type_handle()) {
            self.containers.entry(ty).or_default().push(definition.clone());
        }
        self.all.push(definition.clone());
        self.by_id.insert(definition.id().to_string(), definition);
        true
    }

    /// Removes a definition. Fails (returns `false`) unless this exact
    /// definition is registered under its ID.
    pub fn unregister(&mut self, definition: &Definition) -> bool {
        match self.by_id.get(definition.id()) {
            Some(found) if found.same_as(definition) => {}
            _ => return false,
        }
        self.by_id.remove(definition.id());
        self.all.retain(|d| !d.same_as(definition));
        for ty in self.types.supertypes(definition.type_handle()) {
            if let Some(container) = self.containers.get_mut(&ty) {
                container.retain(|d| !d.same_as(definition));
            }
        }
        true
    }

    pub fn get(&self, id: &str) -> Option<&Definition> {
        self.by_id.get(id)
    }

    /// The definition with this ID, if it is assignable to `ty`.
    pub fn get_as(&self, id: &str, ty: TypeHandle) -> Option<&Definition> {
        self.get(id)
            .filter(|d| self.types.is_assignable(ty, d.type_handle()))
    }

    /// Every definition, in registration order.
    pub fn all(&self) -> &[Definition] {
        &self.all
    }

    /// Every definition assignable to `ty`: its own type, base classes and
    /// implemented interfaces all count.
    pub fn all_of(&self, ty: TypeHandle) -> &[Definition] {
        self.containers.get(&ty).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self) -> usize {
        self.all.len()
    }

    /// Number of per-type views.
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Declaring types that had static members written by any load.
    pub fn types_with_static_data(&self) -> Vec<TypeHandle> {
        self.statics.types_with_data()
    }

    pub fn static_value(&self, ty: TypeHandle, member: &str) -> Option<Value> {
        self.statics.get(ty, member)
    }

    /// The resolved master document of the running session, or of the last
    /// finished one, as markup.
    pub fn master_document(&self) -> Option<String> {
        match &self.session {
            Some(session) => Some(session.master().to_element().to_markup()),
            None => self.master.clone(),
        }
    }

    /// Every definition as a serializable tree, keyed by ID.
    #[must_use]
    pub fn to_value(&self) -> SerialValue {
        serialization::definitions_to_value(&self.all, &self.types)
    }

    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_value())
    }

    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ClassSchema;

    fn database() -> (Database, TypeHandle, TypeHandle) {
        let db = Database::new();
        let item = db
            .types()
            .register_class(ClassSchema::definition("Item").is_abstract())
            .unwrap();
        let sword = db
            .types()
            .register_class(ClassSchema::new("Sword").extends(item))
            .unwrap();
        (db, item, sword)
    }

    fn definition(db: &Database, id: &str, ty: TypeHandle) -> Definition {
        let mut object = db.types().instantiate(ty).unwrap();
        object.set_id(id);
        Definition::new(id, object.into_ref())
    }

    #[test]
    fn test_register_and_containers() {
        let (mut db, item, sword) = database();
        let a = definition(&db, "A", sword);
        assert!(db.register(a.clone()));
        assert!(!db.register(definition(&db, "A", sword)));

        assert_eq!(db.count(), 1);
        assert_eq!(db.all_of(item).len(), 1);
        assert_eq!(db.all_of(sword).len(), 1);
        assert_eq!(db.all_of(db.types().definition()).len(), 1);
        assert!(db.all_of(db.types().object()).is_empty());
        assert!(db.get_as("A", item).is_some());
        assert!(db.get_as("A", db.types().string()).is_none());

        let impostor = definition(&db, "A", sword);
        assert!(!db.unregister(&impostor));
        assert!(db.unregister(&a));
        assert_eq!(db.count(), 0);
        assert!(db.all_of(sword).is_empty());
    }

    #[test]
    fn test_session_state_is_checked() {
        let mut db = Database::new();
        assert!(matches!(db.finish_loading(), Err(SessionError::NotLoading)));
        assert!(matches!(
            db.add_document_str("<Defs/>", "a.xml"),
            Err(SessionError::NotLoading)
        ));
        db.start_loading(LoadConfig::default(), false).unwrap();
        assert!(db.is_loading());
        assert!(matches!(
            db.start_loading(LoadConfig::default(), false),
            Err(SessionError::AlreadyLoading)
        ));
        assert_eq!(db.add_document_str("<Defs><A></Defs>", "bad.xml"), Ok(false));
        assert_eq!(db.diagnostics().error_count(), 1);
        assert_eq!(db.finish_loading(), Ok(0));
        assert!(!db.is_loading());
        assert_eq!(db.master_document().as_deref(), Some("<Defs/>"));
    }
}
