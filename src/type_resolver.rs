//! Resolution of textual type descriptors.
//!
//! ```text
//! Descriptor ::= Name | Namespace.Name | Outer+Nested
//!              | Name "<" Descriptor ("," Descriptor)* ">"
//!              | Name "[" Descriptor ("," Descriptor)* "]"
//!              | Descriptor "[]"
//!              | Descriptor "?"
//!              | FullName "," CatalogName
//! ```
//!
//! Lookup order for plain names: primitive aliases, catalog-qualified names,
//! full names across all catalogs, then short (or `Outer+Nested`) names.
//! Every descriptor, found or not, is memoized until [`TypeRegistry::clear_cache`].

use crate::error::ResolveError;
use crate::types::{TypeHandle, TypeRegistry};

/// A descriptor split into its generic base name and top level arguments.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct GenericParts<'a> {
    pub base: &'a str,
    pub args: Vec<&'a str>,
}

impl TypeRegistry {
    /// Resolves a type descriptor to a handle.
    ///
    /// # Errors
    /// Returns a [`ResolveError`] when the descriptor is malformed, names an
    /// unknown type, or violates a generic constraint.
    pub fn resolve(&self, descriptor: &str) -> Result<TypeHandle, ResolveError> {
        let key = descriptor.trim();
        let cached = self.cache.borrow().get(key).cloned();
        if let Some(hit) = cached {
            return hit;
        }

        let result = self.resolve_uncached(key);
        match &result {
            Ok(h) => log::trace!("resolved type '{}' to {}", key, self.display_name(*h)),
            Err(e) => log::debug!("failed to resolve type '{}': {}", key, e),
        }
        self.cache.borrow_mut().insert(key.to_string(), result.clone());
        result
    }

    /// Forgets every memoized descriptor.
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Number of memoized descriptors, including failures.
    pub fn cached_count(&self) -> usize {
        self.cache.borrow().len()
    }

    fn resolve_uncached(&self, name: &str) -> Result<TypeHandle, ResolveError> {
        if name.is_empty() {
            return Err(ResolveError::Empty);
        }

        if let Some(inner) = name.strip_suffix('?') {
            let inner = self.resolve(inner)?;
            return self.nullable_of(inner);
        }

        if let Some(element) = name.strip_suffix("[]") {
            let element = self.resolve(element)?;
            return self.array_of(element);
        }

        if let Some(&handle) = self.aliases.get(name) {
            return Ok(handle);
        }

        match split_generic(name)? {
            Some(parts) => {
                let qualified = format!("{}`{}", parts.base, parts.args.len());
                let definition = self.find_named(&qualified).ok_or_else(|| ResolveError::NotFound {
                    name: qualified.clone(),
                })?;
                let args = parts
                    .args
                    .iter()
                    .enumerate()
                    .map(|(index, arg)| {
                        self.resolve(arg).map_err(|cause| ResolveError::GenericArgument {
                            name: name.to_string(),
                            index,
                            argument: arg.to_string(),
                            cause: Box::new(cause),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.construct_generic(definition, &args)
            }
            None => self.find_named(name).ok_or_else(|| ResolveError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    fn find_named(&self, name: &str) -> Option<TypeHandle> {
        let catalogs = self.catalog_types();

        // "Full.Name, CatalogName"
        if let Some((type_name, catalog_name)) = name.split_once(',') {
            let (type_name, catalog_name) = (type_name.trim(), catalog_name.trim());
            return catalogs
                .iter()
                .filter(|(c, _)| c == catalog_name)
                .flat_map(|(_, types)| types.iter())
                .copied()
                .find(|&h| self.info(h).full_name() == type_name);
        }

        let all = || catalogs.iter().flat_map(|(_, types)| types.iter()).copied();

        if let Some(h) = all().find(|&h| self.info(h).full_name() == name) {
            return Some(h);
        }

        if name.contains('+') {
            all().find(|&h| {
                let info = self.info(h);
                info.declaring().is_some() && info.nested_name() == name
            })
        } else {
            all().find(|&h| self.info(h).name() == name)
        }
    }
}

/// Splits `Name<A, B<C, D>>` (or the same with square brackets) into its base
/// name and top level arguments. Returns `Ok(None)` for non-generic names.
pub(crate) fn split_generic(name: &str) -> Result<Option<GenericParts<'_>>, ResolveError> {
    let Some(open) = name.find(['<', '[']) else {
        if name.contains(['>', ']']) {
            return Err(malformed(name, "closing bracket without an opening bracket"));
        }
        return Ok(None);
    };

    let base = name[..open].trim();
    if base.is_empty() {
        return Err(malformed(name, "missing generic type name"));
    }

    let mut depth = 0usize;
    let mut args = Vec::new();
    let mut arg_start = open + 1;
    let mut closed_at = None;
    for (i, c) in name.char_indices().skip_while(|&(i, _)| i < open) {
        match c {
            '<' | '[' => depth += 1,
            '>' | ']' => {
                depth -= 1;
                if depth == 0 {
                    args.push(name[arg_start..i].trim());
                    closed_at = Some(i);
                    break;
                }
            }
            ',' if depth == 1 => {
                args.push(name[arg_start..i].trim());
                arg_start = i + 1;
            }
            _ => {}
        }
    }

    match closed_at {
        None => Err(malformed(name, "unbalanced brackets")),
        Some(end) if end + 1 != name.len() => {
            Err(malformed(name, "unexpected text after the generic arguments"))
        }
        Some(_) if args.iter().any(|a| a.is_empty()) => {
            Err(malformed(name, "empty generic argument"))
        }
        Some(_) => Ok(Some(GenericParts { base, args })),
    }
}

fn malformed(name: &str, reason: &str) -> ResolveError {
    ResolveError::Malformed {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
