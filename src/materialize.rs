//! Recursive conversion of markup nodes into values.
//!
//! Dispatch for one node:
//!
//! ```text
//! Null="true"            -> explicit null, always written
//! converter for target   -> converter output
//! list, set, array       -> one item per element child
//! map                    -> key parsed from each child's tag name
//! anything else          -> class, one member per element child
//! ```
//!
//! Failures are reported through [`Diagnostics`] and only drop the subtree
//! they occur in. Every object produced, by a converter or by the class path,
//! passes through the post-parse step, which runs its constructed hook and
//! queues it for the post-load and validation phases run by
//! [`Materializer::run_lifecycle`].

use crate::ast::{attr, Content, Element};
use crate::config::LoadConfig;
use crate::context::{ParseContext, ParseResult};
use crate::converter::ConverterRegistry;
use crate::database::Definition;
use crate::diagnostics::{ConfigReporter, Diagnostic, Diagnostics};
use crate::members::{MemberStore, StaticStore};
use crate::schema::ObjectHook;
use crate::types::{TypeHandle, TypeKind, TypeRegistry};
use crate::utils::child_path;
use crate::value::{ListValue, MapValue, ObjectRef, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Default)]
struct LifecycleQueues {
    post_load: Vec<(ObjectRef, Option<String>)>,
    validate: Vec<(ObjectRef, Option<String>)>,
}

fn queue(
    list: &mut Vec<(ObjectRef, Option<String>)>,
    object: &ObjectRef,
    definition: Option<&str>,
) {
    if !list.iter().any(|(o, _)| Rc::ptr_eq(o, object)) {
        list.push((Rc::clone(object), definition.map(str::to_string)));
    }
}

pub struct Materializer<'s> {
    pub(crate) types: &'s TypeRegistry,
    pub(crate) members: &'s MemberStore,
    pub(crate) converters: &'s ConverterRegistry,
    pub(crate) diagnostics: &'s Diagnostics,
    pub(crate) statics: &'s StaticStore,
    pub(crate) config: &'s LoadConfig,
    pub(crate) definitions: &'s HashMap<String, Definition>,
    queues: RefCell<LifecycleQueues>,
}

impl<'s> Materializer<'s> {
    pub(crate) fn new(
        types: &'s TypeRegistry,
        members: &'s MemberStore,
        converters: &'s ConverterRegistry,
        diagnostics: &'s Diagnostics,
        statics: &'s StaticStore,
        config: &'s LoadConfig,
        definitions: &'s HashMap<String, Definition>,
    ) -> Self {
        Materializer {
            types,
            members,
            converters,
            diagnostics,
            statics,
            config,
            definitions,
            queues: RefCell::new(LifecycleQueues::default()),
        }
    }

    fn report(&self, diagnostic: Diagnostic, path: &str, definition: Option<&str>) {
        self.diagnostics
            .report(diagnostic.with_path(path).with_definition(definition));
    }

    fn error(&self, ctx: &ParseContext<'_>, message: String) {
        self.report(Diagnostic::error(message), &ctx.path, ctx.definition);
    }

    fn warn(&self, ctx: &ParseContext<'_>, message: String) {
        self.report(Diagnostic::warning(message), &ctx.path, ctx.definition);
    }

    /// Materializes a definition node into `object`, which already exists
    /// (pre-populated or from a previous load), then runs the post-parse step.
    pub(crate) fn materialize_definition(&self, node: &Element, object: &ObjectRef) -> bool {
        let ty = object.borrow().type_handle();
        let mut ctx = ParseContext::new(self, node, ty, node.name.clone());
        ctx.current = Some(Value::Object(Rc::clone(object)));
        ctx.owner = Some(Rc::clone(object));
        ctx.definition = Some(node.name.as_str());

        // Straight to the class path: the definition converter would turn the
        // node into a reference to itself.
        let result = self.materialize_class(&ctx);
        match result.value {
            Some(Value::Object(created)) => {
                if !Rc::ptr_eq(&created, object) {
                    // Value-type definitions come back as copies.
                    let copy = created.borrow().clone();
                    *object.borrow_mut() = copy;
                }
                object.borrow_mut().set_id(&node.name);
                self.post_parse(object, &ctx);
                true
            }
            _ => false,
        }
    }

    /// Converts `ctx.node` into a value of `ctx.target`.
    pub fn materialize<'a>(&'a self, mut ctx: ParseContext<'a>) -> ParseResult {
        if ctx.node.attribute_bool(attr::NULL, false) {
            return ParseResult::forced_null();
        }
        ctx.target = self.types.strip_nullable(ctx.target);

        let result = match self.converters.resolve(ctx.target, self.types) {
            Some(converter) => match converter.parse(&ctx) {
                Ok(Some(value)) if !value.is_null() => ParseResult::of(value),
                Ok(_) => ParseResult::none(),
                Err(e) => {
                    self.report(
                        Diagnostic::error(format!(
                            "Failed to parse <{}> as '{}' using converter '{}'",
                            ctx.node.name,
                            ctx.target_name(),
                            converter.name()
                        ))
                        .with_cause(&e),
                        &ctx.path,
                        ctx.definition,
                    );
                    ParseResult::none()
                }
            },
            None => match self.types.info(ctx.target).kind() {
                TypeKind::List(_)
                | TypeKind::HashSet(_)
                | TypeKind::ReadOnlyList(_)
                | TypeKind::Array(_) => self.materialize_list(&ctx),
                TypeKind::Map(..) => self.materialize_map(&ctx),
                _ => self.materialize_class(&ctx),
            },
        };
        if let Some(Value::Object(object)) = &result.value {
            // References to definitions are post-parsed once, by their own
            // definition pass.
            let is_definition = object.borrow().id().is_some();
            if !is_definition {
                self.post_parse(object, &ctx);
            }
        }
        result
    }

    fn child_context<'a>(
        &'a self,
        parent: &ParseContext<'a>,
        node: &'a Element,
        target: TypeHandle,
        declared: TypeHandle,
        path: String,
    ) -> ParseContext<'a> {
        let mut ctx = ParseContext::new(self, node, target, path);
        ctx.declared = declared;
        ctx.definition = parent.definition;
        ctx
    }

    /// The type named by the node's `Type` attribute, or `fallback`. Nullable
    /// wrappers are removed either way.
    fn node_type(
        &self,
        node: &Element,
        fallback: TypeHandle,
        path: &str,
        definition: Option<&str>,
    ) -> TypeHandle {
        let Some(name) = node.attribute(attr::TYPE) else {
            return self.types.strip_nullable(fallback);
        };
        match self.types.resolve(name) {
            Ok(ty) => self.types.strip_nullable(ty),
            Err(e) => {
                let message = format!(
                    "Failed to find type '{}'; falling back to '{}'",
                    name,
                    self.types.display_name(fallback)
                );
                let diagnostic = if self.config.strict_types {
                    Diagnostic::error(message)
                } else {
                    Diagnostic::warning(message)
                };
                self.report(diagnostic.with_cause(&e), path, definition);
                self.types.strip_nullable(fallback)
            }
        }
    }

    /// Applies an `ElementType` or `KeyType` override. The override must be
    /// assignable to `declared`; otherwise `declared` is kept.
    fn collection_override(
        &self,
        ctx: &ParseContext<'_>,
        attribute: &str,
        declared: TypeHandle,
    ) -> TypeHandle {
        let Some(name) = ctx.node.attribute(attribute) else {
            return declared;
        };
        match self.types.resolve(name) {
            Err(e) => {
                self.report(
                    Diagnostic::error(format!(
                        "Failed to find type '{}' named by {}",
                        name, attribute
                    ))
                    .with_cause(&e),
                    &ctx.path,
                    ctx.definition,
                );
                declared
            }
            Ok(ty) if !self.types.is_assignable(declared, ty) => {
                self.error(
                    ctx,
                    format!(
                        "{} '{}' is not assignable to '{}'",
                        attribute,
                        self.types.display_name(ty),
                        self.types.display_name(declared)
                    ),
                );
                declared
            }
            Ok(ty) => ty,
        }
    }

    fn materialize_list<'a>(&'a self, ctx: &ParseContext<'a>) -> ParseResult {
        let types = self.types;
        let info = types.info(ctx.target);
        let declared = info.element_type().unwrap_or_else(|| types.object());
        let element = self.collection_override(ctx, attr::ELEMENT_TYPE, declared);
        let new_items = ctx.node.element_count();

        let (is_array, is_set) = match info.kind() {
            TypeKind::ReadOnlyList(_) if new_items > 0 => {
                self.error(
                    ctx,
                    format!("Cannot add items to read-only list type '{}'", ctx.target_name()),
                );
                return ParseResult::none();
            }
            TypeKind::Array(_) => (true, false),
            TypeKind::HashSet(_) => (false, true),
            _ => (false, false),
        };

        let mut list = match &ctx.current {
            Some(Value::List(existing)) => existing.clone(),
            _ => ListValue::new(ctx.target),
        };
        let start = list.len();
        if is_array {
            // Arrays are reallocated to fit the new items after the old ones.
            list.items_mut().resize(start + new_items, types.default_value(declared));
        }

        let explicit_list = ctx.node.attribute_bool(attr::IS_LIST, false);
        let children = ctx.node.elements().zip(ctx.node.child_segments());
        for (offset, (child, segment)) in children.enumerate() {
            let path = child_path(&ctx.path, &segment);
            let item_type = self.node_type(child, element, &path, ctx.definition);
            if !types.is_assignable(element, item_type) {
                self.report(
                    Diagnostic::error(format!(
                        "List item type '{}' is not assignable to element type '{}'",
                        types.display_name(item_type),
                        types.display_name(element)
                    )),
                    &path,
                    ctx.definition,
                );
                continue;
            }
            if child.name != self.config.list_item_name && !explicit_list {
                self.report(
                    Diagnostic::warning(format!(
                        "List items are expected to be called '{}' but found <{}>; \
                         child definitions may fail to append to this list. \
                         Set IsList=\"true\" on <{}> to silence this",
                        self.config.list_item_name, child.name, ctx.node.name
                    )),
                    &path,
                    ctx.definition,
                );
            }

            let slot = start + offset;
            let mut item_ctx = self.child_context(ctx, child, item_type, element, path);
            item_ctx.list_index = Some(if is_array { slot } else { list.len() });
            let parsed = self.materialize(item_ctx);
            if !parsed.should_write() {
                continue;
            }
            let value = parsed.into_value();
            if is_array {
                list.items_mut()[slot] = value;
            } else if !is_set || !list.contains(&value) {
                list.push(value);
            }
        }

        ParseResult::of(Value::List(list))
    }

    fn materialize_map<'a>(&'a self, ctx: &ParseContext<'a>) -> ParseResult {
        let types = self.types;
        let (declared_key, declared_value) = types
            .info(ctx.target)
            .map_types()
            .unwrap_or_else(|| (types.object(), types.object()));
        let key_type =
            types.strip_nullable(self.collection_override(ctx, attr::KEY_TYPE, declared_key));
        let value_type = self.collection_override(ctx, attr::ELEMENT_TYPE, declared_value);

        let mut map = match &ctx.current {
            Some(Value::Map(existing)) => existing.clone(),
            _ => MapValue::new(ctx.target),
        };

        let Some(key_converter) = self.converters.resolve(key_type, types) else {
            self.error(
                ctx,
                format!(
                    "There is no converter for map key type '{}'",
                    types.display_name(key_type)
                ),
            );
            return ParseResult::of(Value::Map(map));
        };
        if !key_converter.context_free() {
            self.error(
                ctx,
                format!(
                    "Converter '{}' needs the surrounding node, \
                     so '{}' cannot be used as a map key",
                    key_converter.name(),
                    types.display_name(key_type)
                ),
            );
            return ParseResult::of(Value::Map(map));
        }

        let mut written = MapValue::new(ctx.target);
        for (child, segment) in ctx.node.elements().zip(ctx.node.child_segments()) {
            let path = child_path(&ctx.path, &segment);
            let local_type = self.node_type(child, value_type, &path, ctx.definition);
            if !types.is_assignable(value_type, local_type) {
                self.report(
                    Diagnostic::error(format!(
                        "Type '{}' is not assignable to map value type '{}'",
                        types.display_name(local_type),
                        types.display_name(value_type)
                    )),
                    &path,
                    ctx.definition,
                );
                continue;
            }

            let mut key_ctx = ParseContext::new(self, child, key_type, path.clone());
            key_ctx.text = child.name.clone();
            key_ctx.definition = ctx.definition;
            let key = match key_converter.parse(&key_ctx) {
                Ok(Some(key)) if !key.is_null() => key,
                Ok(_) => {
                    self.report(
                        Diagnostic::error(format!(
                            "Map key '{}' parsed as null; \
                             map keys cannot be null so the entry is discarded",
                            child.name
                        )),
                        &path,
                        ctx.definition,
                    );
                    continue;
                }
                Err(e) => {
                    self.report(
                        Diagnostic::error(format!(
                            "Failed to parse map key '{}' as '{}'",
                            child.name,
                            types.display_name(key_type)
                        ))
                        .with_cause(&e),
                        &path,
                        ctx.definition,
                    );
                    continue;
                }
            };

            let mut value_ctx =
                self.child_context(ctx, child, local_type, value_type, path.clone());
            value_ctx.map_key = Some(key.clone());
            let parsed = self.materialize(value_ctx);
            if !parsed.should_write() {
                continue;
            }
            if written.insert(key.clone(), Value::Null).is_some() {
                self.report(
                    Diagnostic::warning(format!(
                        "Duplicate map key '{}'; the last value wins",
                        child.name
                    )),
                    &path,
                    ctx.definition,
                );
            }
            map.insert(key, parsed.into_value());
        }

        ParseResult::of(Value::Map(map))
    }

    pub(crate) fn materialize_class<'a>(&'a self, ctx: &ParseContext<'a>) -> ParseResult {
        let types = self.types;
        if types.info(ctx.target).is_abstract() {
            self.error(
                ctx,
                format!(
                    "Cannot create an instance of abstract type or interface '{}'",
                    ctx.target_name()
                ),
            );
            return ParseResult::none();
        }

        let object = match &ctx.current {
            Some(Value::Object(existing)) => {
                let value_type = types.is_value_type(existing.borrow().type_handle());
                if value_type {
                    existing.borrow().clone().into_ref()
                } else {
                    Rc::clone(existing)
                }
            }
            _ => match types.instantiate(ctx.target) {
                Ok(object) => object.into_ref(),
                Err(e) => {
                    self.report(
                        Diagnostic::error(format!(
                            "Failed to create an instance of '{}'",
                            ctx.target_name()
                        ))
                        .with_cause(&e),
                        &ctx.path,
                        ctx.definition,
                    );
                    return ParseResult::none();
                }
            },
        };

        let object_type = object.borrow().type_handle();
        let table = self.members.members_for(types, object_type, self.diagnostics);
        let mut segments = ctx.node.child_segments().into_iter();

        for content in &ctx.node.children {
            let child = match content {
                Content::Element(e) => e,
                Content::Whitespace(_) | Content::Comment(_) => continue,
                other => {
                    self.warn(
                        ctx,
                        format!(
                            "Unexpected {} inside <{}>; only child elements are read",
                            other.kind_name(),
                            ctx.node.name
                        ),
                    );
                    continue;
                }
            };
            let segment = segments.next().unwrap_or_else(|| child.name.clone());
            let path = child_path(&ctx.path, &segment);

            let Some(member) = table.get(&child.name) else {
                self.report(
                    Diagnostic::error(format!(
                        "Failed to find member called '{}' in class '{}'",
                        child.name,
                        types.display_name(object_type)
                    )),
                    &path,
                    ctx.definition,
                );
                continue;
            };

            let child_type = self.node_type(child, member.declared, &path, ctx.definition);
            if !types.is_assignable(types.strip_nullable(member.declared), child_type) {
                self.report(
                    Diagnostic::error(format!(
                        "Type '{}' is not assignable to member '{}' of type '{}'",
                        types.display_name(child_type),
                        member.name,
                        types.display_name(member.declared)
                    )),
                    &path,
                    ctx.definition,
                );
                continue;
            }

            let current = if member.is_static {
                self.statics.get(member.owner, &member.name)
            } else {
                object.borrow().get(&member.name).cloned()
            };
            let mut child_ctx =
                self.child_context(ctx, child, child_type, member.declared, path.clone());
            child_ctx.current = current;
            child_ctx.owner = Some(Rc::clone(&object));
            child_ctx.member = Some(Rc::clone(&member));

            let parsed = self.materialize(child_ctx);
            if !parsed.should_write() {
                continue;
            }
            if !member.can_write {
                self.report(
                    Diagnostic::error(format!(
                        "Member '{}' of '{}' is read-only",
                        member.name,
                        types.display_name(member.owner)
                    )),
                    &path,
                    ctx.definition,
                );
                continue;
            }

            let value = parsed.into_value();
            if member.is_static {
                log::trace!(
                    "writing static member {}.{}",
                    types.display_name(member.owner),
                    member.name
                );
                self.statics.set(member.owner, &member.name, value);
            } else {
                object.borrow_mut().set(member.name.clone(), value);
            }
        }

        ParseResult::of(Value::Object(object))
    }

    /// Runs the constructed hook and queues the object for the batch phases.
    fn post_parse(&self, object: &ObjectRef, ctx: &ParseContext<'_>) {
        let ty = object.borrow().type_handle();
        if let Some(hook) = self.types.find_hook(ty, |h| h.constructed.clone()) {
            let outcome = hook(object);
            if let Err(e) = outcome {
                self.report(
                    Diagnostic::error(format!(
                        "The constructed hook of '{}' failed",
                        self.types.display_name(ty)
                    ))
                    .with_cause(&e),
                    &ctx.path,
                    ctx.definition,
                );
            }
        }

        let config = self.config;
        let mut queues = self.queues.borrow_mut();
        if config.do_post_load || config.do_late_post_load {
            let has_hook = self
                .types
                .find_hook(ty, |h| h.post_load.clone().or_else(|| h.late_post_load.clone()))
                .is_some();
            if has_hook {
                queue(&mut queues.post_load, object, ctx.definition);
            }
        }
        if config.do_validation && self.types.find_hook(ty, |h| h.validate.clone()).is_some() {
            queue(&mut queues.validate, object, ctx.definition);
        }
    }

    fn run_object_hook(
        &self,
        phase: &str,
        object: &ObjectRef,
        definition: Option<&str>,
        pick: impl Fn(&crate::schema::Hooks) -> Option<ObjectHook>,
    ) {
        let ty = object.borrow().type_handle();
        let Some(hook) = self.types.find_hook(ty, pick) else {
            return;
        };
        let outcome = hook(object);
        if let Err(e) = outcome {
            self.diagnostics.report(
                Diagnostic::error(format!(
                    "The {} hook of '{}' failed",
                    phase,
                    self.types.display_name(ty)
                ))
                .with_cause(&e)
                .with_definition(definition),
            );
        }
    }

    /// Runs post-load, late-post-load and validation over everything queued
    /// by the post-parse step. Each item is isolated: a failing hook is
    /// reported and the remaining items still run.
    pub fn run_lifecycle(&self) {
        let queues = self.queues.take();
        let config = self.config;
        log::debug!(
            "running lifecycle: {} post-load item(s), {} validation item(s)",
            queues.post_load.len(),
            queues.validate.len()
        );

        if config.do_post_load {
            for (object, definition) in &queues.post_load {
                self.run_object_hook("post-load", object, definition.as_deref(), |h| {
                    h.post_load.clone()
                });
            }
        }
        if config.do_late_post_load {
            for (object, definition) in &queues.post_load {
                self.run_object_hook("late post-load", object, definition.as_deref(), |h| {
                    h.late_post_load.clone()
                });
            }
        }
        if config.do_validation {
            let mut reporter = ConfigReporter::new(self.diagnostics);
            for (object, definition) in &queues.validate {
                reporter.set_current(definition.clone());
                let ty = object.borrow().type_handle();
                if let Some(hook) = self.types.find_hook(ty, |h| h.validate.clone()) {
                    let outcome = hook(&*object.borrow(), &reporter);
                    if let Err(e) = outcome {
                        let message = format!(
                            "The validate hook of '{}' failed",
                            self.types.display_name(ty)
                        );
                        reporter.error_with(message, &e);
                    }
                }
            }
        }
    }
}
