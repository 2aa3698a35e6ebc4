//! One loading session: documents go in, definitions come out.
//!
//! [`Session::run`] drives the pipeline over the aggregated master document:
//!
//! 1. inheritance resolution (once);
//! 2. a pre-pass that creates one instance per concrete definition, so that
//!    definition references resolve regardless of document order;
//! 3. materialization of every definition into its instance;
//! 4. the post-load, late-post-load and validation phases.

use crate::ast::{attr, Document, Element};
use crate::config::LoadConfig;
use crate::converter::{Converter, ConverterId, ConverterRegistry};
use crate::database::Definition;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::inheritance::MasterDocument;
use crate::materialize::Materializer;
use crate::members::{MemberStore, StaticStore};
use crate::types::{TypeHandle, TypeRegistry};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub struct Session {
    config: LoadConfig,
    reloading: bool,
    master: MasterDocument,
    converters: ConverterRegistry,
}

/// What a finished session produced.
#[derive(Debug)]
pub(crate) struct SessionOutcome {
    /// New definitions, in document order, to be registered.
    pub loaded: Vec<Definition>,
    /// Existing definitions that were patched in place by a reload.
    pub patched: usize,
    /// The resolved master document, as markup.
    pub master: String,
}

impl Session {
    pub(crate) fn new(config: LoadConfig, reloading: bool) -> Self {
        Session {
            config,
            reloading,
            master: MasterDocument::new(),
            converters: ConverterRegistry::with_builtins(),
        }
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    pub fn master(&self) -> &MasterDocument {
        &self.master
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn converters_mut(&mut self) -> &mut ConverterRegistry {
        &mut self.converters
    }

    pub fn add_converter(&mut self, converter: Rc<dyn Converter>) -> ConverterId {
        self.converters.add(converter)
    }

    pub fn remove_converter(&mut self, id: ConverterId) -> bool {
        self.converters.remove(id)
    }

    pub(crate) fn append(&mut self, document: &Document, source: &str) -> usize {
        self.master.append(document, source)
    }

    /// Runs the whole pipeline. `existing` holds the definitions already in
    /// the database; in reload mode matching IDs are patched in place.
    pub(crate) fn run(
        mut self,
        types: &TypeRegistry,
        diagnostics: &Diagnostics,
        statics: &StaticStore,
        existing: &HashMap<String, Definition>,
    ) -> SessionOutcome {
        if let Err(e) = self
            .master
            .resolve_inheritance(&self.config.list_item_name, diagnostics)
        {
            diagnostics.report(Diagnostic::error("Failed to resolve inheritance").with_cause(&e));
        }

        let members = MemberStore::new(&self.config);
        let mut lookup = existing.clone();
        let mut pending: Vec<(&Element, Definition, bool)> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for node in self.master.definitions() {
            let id = node.name.as_str();
            if !seen.insert(id) {
                diagnostics.report(
                    Diagnostic::error(format!(
                        "Duplicate definition ID '{}'; only the first one is loaded",
                        id
                    ))
                    .with_definition(Some(id)),
                );
                continue;
            }

            if let Some(current) = existing.get(id) {
                if self.reloading {
                    pending.push((node, current.clone(), true));
                } else {
                    diagnostics.report(
                        Diagnostic::error(format!(
                            "A definition with ID '{}' is already registered; \
                             start a reloading session to patch it",
                            id
                        ))
                        .with_definition(Some(id)),
                    );
                }
                continue;
            }

            let Some(ty) = definition_type(node, types, diagnostics) else {
                continue;
            };
            match types.instantiate(ty) {
                Ok(mut object) => {
                    object.set_id(id);
                    let definition = Definition::new(id, object.into_ref());
                    lookup.insert(id.to_string(), definition.clone());
                    pending.push((node, definition, false));
                }
                Err(e) => diagnostics.report(
                    Diagnostic::error(format!(
                        "Definition '{}' of type '{}' could not be instantiated",
                        id,
                        types.display_name(ty)
                    ))
                    .with_cause(&e)
                    .with_definition(Some(id)),
                ),
            }
        }
        log::debug!(
            "pre-populated {} definition(s), {} to patch",
            pending.iter().filter(|(_, _, patch)| !patch).count(),
            pending.iter().filter(|(_, _, patch)| *patch).count()
        );

        let materializer = Materializer::new(
            types,
            &members,
            &self.converters,
            diagnostics,
            statics,
            &self.config,
            &lookup,
        );

        let mut loaded = Vec::new();
        let mut patched = 0usize;
        for (node, definition, patch) in pending {
            if !materializer.materialize_definition(node, definition.object_ref()) {
                continue;
            }
            if patch {
                patched += 1;
            } else {
                loaded.push(definition);
            }
        }

        materializer.run_lifecycle();

        SessionOutcome {
            loaded,
            patched,
            master: self.master.to_element().to_markup(),
        }
    }
}

/// The concrete definition type named by a definition node.
fn definition_type(
    node: &Element,
    types: &TypeRegistry,
    diagnostics: &Diagnostics,
) -> Option<TypeHandle> {
    let id = node.name.as_str();
    let error = |message: String| {
        diagnostics.report(Diagnostic::error(message).with_definition(Some(id)));
    };

    let Some(name) = node.attribute(attr::TYPE) else {
        error(format!(
            "Definition '{}' does not specify a type; add a Type=\"TypeName\" attribute",
            id
        ));
        return None;
    };
    let ty = match types.resolve(name) {
        Ok(ty) => ty,
        Err(e) => {
            diagnostics.report(
                Diagnostic::error(format!(
                    "Definition '{}' is of type '{}', but that type could not be found",
                    id, name
                ))
                .with_cause(&e)
                .with_definition(Some(id)),
            );
            return None;
        }
    };

    let display = types.display_name(ty);
    if types.info(ty).is_abstract() {
        error(format!(
            "Definition '{}' is of abstract type '{}'; a concrete type must be specified",
            id, display
        ));
        return None;
    }
    if !types.is_definition(ty) {
        error(format!(
            "Definition '{}' is of type '{}', which is not a definition type",
            id, display
        ));
        return None;
    }
    Some(ty)
}
