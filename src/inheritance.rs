//! Document aggregation and definition inheritance.
//!
//! Every document added to a session contributes its top level elements to
//! one [`MasterDocument`]. Before materialization the master is resolved once:
//! each concrete definition is replaced by the merge of its parent chain,
//! root ancestor first, and abstract definitions are dropped.
//!
//! Merge rules for `merge(dest, src)`:
//!
//! ```text
//! src has Inherit="false"          -> dest becomes a copy of src
//! otherwise                        -> drop Abstract/Null from dest, copy src attributes
//! dest has no element children     -> dest content becomes src content
//! dest is a list (IsList, or every
//! src child is a list item)        -> src children are appended
//! otherwise                        -> each src child merges into the first
//!                                     dest child of the same name, or is appended
//! ```

use crate::ast::{attr, Content, Document, Element};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::SessionError;

/// Attributes that describe a node itself and are never passed on to children.
const NON_INHERITED: [&str; 2] = [attr::ABSTRACT, attr::NULL];

/// Tag of the root element in the master document dump.
pub const MASTER_ROOT: &str = "Defs";

#[derive(Debug, Clone, PartialEq)]
pub struct MasterEntry {
    pub node: Element,
    /// Where the definition came from. Only used in logs and diagnostics.
    pub source: String,
}

/// The union of all documents added to one loading session.
#[derive(Debug, Clone, Default)]
pub struct MasterDocument {
    entries: Vec<MasterEntry>,
    resolved: bool,
}

impl MasterDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every top level definition of `document` into the master.
    pub fn append(&mut self, document: &Document, source: &str) -> usize {
        let before = self.entries.len();
        self.entries.extend(document.definitions().map(|node| MasterEntry {
            node: node.clone(),
            source: source.to_string(),
        }));
        let added = self.entries.len() - before;
        log::debug!("aggregated {} definition node(s) from '{}'", added, source);
        added
    }

    pub fn entries(&self) -> &[MasterEntry] {
        &self.entries
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Element> {
        self.entries.iter().map(|e| &e.node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// The master as a single tree, e.g. for writing out with [`Element::to_markup`].
    pub fn to_element(&self) -> Element {
        let mut root = Element::new(MASTER_ROOT);
        root.children = self
            .entries
            .iter()
            .map(|e| Content::Element(e.node.clone()))
            .collect();
        root
    }

    fn find(&self, id: &str) -> Option<&Element> {
        self.definitions().find(|d| d.name == id)
    }

    /// Parent chain of `node`, root ancestor first. `None` on a cycle or a
    /// missing parent, after reporting it.
    fn chain<'e>(
        &'e self,
        node: &'e Element,
        diagnostics: &Diagnostics,
    ) -> Option<Vec<&'e Element>> {
        let id = node.name.as_str();
        let mut chain: Vec<&Element> = Vec::new();
        let mut current = node;
        loop {
            if chain.iter().any(|seen| std::ptr::eq(*seen, current)) {
                let cycle = chain
                    .iter()
                    .map(|n| n.name.as_str())
                    .chain(std::iter::once(current.name.as_str()))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                diagnostics.report(
                    Diagnostic::error(format!(
                        "Cyclic inheritance detected: {}; the definition will not be loaded",
                        cycle
                    ))
                    .with_definition(Some(id)),
                );
                return None;
            }
            chain.push(current);

            let Some(parent) = current.attribute(attr::PARENT) else {
                chain.reverse();
                return Some(chain);
            };
            match self.find(parent) {
                Some(found) => current = found,
                None => {
                    diagnostics.report(
                        Diagnostic::error(format!(
                            "Failed to find parent '{}' of '{}'; the definition will not be loaded",
                            parent, current.name
                        ))
                        .with_definition(Some(id)),
                    );
                    return None;
                }
            }
        }
    }

    /// Rewrites the master so that every concrete definition holds its fully
    /// merged form. Definitions with a broken parent chain and abstract
    /// definitions are removed. May run once per session.
    ///
    /// # Errors
    /// Returns [`SessionError::InheritanceResolved`] when called a second time.
    pub fn resolve_inheritance(
        &mut self,
        list_item_name: &str,
        diagnostics: &Diagnostics,
    ) -> Result<(), SessionError> {
        if self.resolved {
            return Err(SessionError::InheritanceResolved);
        }

        let mut resolved = Vec::with_capacity(self.entries.len());
        let mut merged_count = 0usize;
        for entry in &self.entries {
            let node = &entry.node;
            if node.attribute_bool(attr::ABSTRACT, false) {
                continue;
            }
            let Some(chain) = self.chain(node, diagnostics) else {
                continue;
            };
            if chain.len() == 1 {
                resolved.push(entry.clone());
                continue;
            }

            let mut merged = chain[0].clone();
            merged.name = node.name.clone();
            for part in &chain[1..] {
                merge(&mut merged, part, list_item_name);
            }
            log::trace!(
                "merged '{}' from {}",
                node.name,
                chain.iter().map(|n| n.name.as_str()).collect::<Vec<_>>().join(" -> ")
            );
            merged_count += 1;
            resolved.push(MasterEntry {
                node: merged,
                source: entry.source.clone(),
            });
        }

        log::debug!(
            "resolved inheritance: {} of {} node(s) kept, {} merged",
            resolved.len(),
            self.entries.len(),
            merged_count
        );
        self.entries = resolved;
        self.resolved = true;
        Ok(())
    }
}

/// Merges `src` into `dest`, `src` taking precedence.
pub fn merge(dest: &mut Element, src: &Element, list_item_name: &str) {
    if !src.attribute_bool(attr::INHERIT, true) {
        let name = std::mem::take(&mut dest.name);
        *dest = src.clone();
        dest.name = name;
        dest.remove_attribute(attr::INHERIT);
        return;
    }

    for name in NON_INHERITED {
        dest.remove_attribute(name);
    }
    for attribute in &src.attributes {
        dest.set_attribute(&attribute.name, &attribute.value);
    }

    if dest.element_count() == 0 {
        dest.children = src.children.clone();
        return;
    }

    let append = dest.attribute_bool(attr::IS_LIST, src.is_list_implied(list_item_name));
    for child in src.elements() {
        if !append {
            if let Some(existing) = dest.first_child_mut(&child.name) {
                merge(existing, child, list_item_name);
                continue;
            }
        }
        dest.children.push(Content::Element(child.clone()));
    }
}
