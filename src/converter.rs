//! Text-to-value converters and the priority ordered registry that picks one
//! for a given type.

use crate::context::ParseContext;
use crate::error::ConvertError;
use crate::types::{Primitive, TypeHandle, TypeKind, TypeRegistry};
use crate::value::{EnumValue, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Turns the text of a node into a value of a type it claims.
pub trait Converter {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    fn can_handle(&self, ty: TypeHandle, types: &TypeRegistry) -> bool;

    /// Priority used when the converter is added. Higher wins.
    fn default_priority(&self) -> i32 {
        0
    }

    /// Whether the converter can work from `text` and `target` alone, without
    /// the surrounding node. Only such converters may parse map keys.
    fn context_free(&self) -> bool {
        true
    }

    /// Returns `Ok(None)` for a null value.
    fn parse(&self, ctx: &ParseContext<'_>) -> Result<Option<Value>, ConvertError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConverterId(u64);

struct Entry {
    id: ConverterId,
    converter: Rc<dyn Converter>,
    priority: i32,
}

/// Converters kept sorted by descending priority. Resolution is memoized per
/// type; the memo is dropped whenever the set or any priority changes.
#[derive(Default)]
pub struct ConverterRegistry {
    entries: Vec<Entry>,
    next_id: u64,
    memo: RefCell<HashMap<TypeHandle, Option<Rc<dyn Converter>>>>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|e| (e.converter.name().to_string(), e.priority)),
            )
            .finish()
    }
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in converter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.add(Rc::new(PrimitiveConverter));
        registry.add(Rc::new(EnumConverter));
        registry.add(Rc::new(DefRefConverter));
        registry.add(Rc::new(TypeConverter));
        registry.add(Rc::new(NodeConverter));
        registry
    }

    /// Adds a converter at its default priority. Adding the same converter
    /// twice returns the existing ID.
    pub fn add(&mut self, converter: Rc<dyn Converter>) -> ConverterId {
        let priority = converter.default_priority();
        self.add_with_priority(converter, priority)
    }

    pub fn add_with_priority(
        &mut self,
        converter: Rc<dyn Converter>,
        priority: i32,
    ) -> ConverterId {
        if let Some(existing) = self.entries.iter().find(|e| Rc::ptr_eq(&e.converter, &converter)) {
            return existing.id;
        }
        let id = ConverterId(self.next_id);
        self.next_id += 1;
        log::trace!("adding converter '{}' at priority {}", converter.name(), priority);
        self.entries.push(Entry {
            id,
            converter,
            priority,
        });
        self.sort();
        id
    }

    pub fn remove(&mut self, id: ConverterId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.memo.borrow_mut().clear();
        }
        removed
    }

    pub fn set_priority(&mut self, id: ConverterId, priority: i32) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        entry.priority = priority;
        self.sort();
        true
    }

    pub fn priority(&self, id: ConverterId) -> Option<i32> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.priority)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sort(&mut self) {
        // Stable: equal priorities keep insertion order.
        self.entries.sort_by_key(|e| std::cmp::Reverse(e.priority));
        self.memo.borrow_mut().clear();
    }

    /// The highest priority converter that handles `ty`.
    pub fn resolve(&self, ty: TypeHandle, types: &TypeRegistry) -> Option<Rc<dyn Converter>> {
        if let Some(hit) = self.memo.borrow().get(&ty) {
            return hit.clone();
        }
        let found = self
            .entries
            .iter()
            .find(|e| e.converter.can_handle(ty, types))
            .map(|e| Rc::clone(&e.converter));
        self.memo.borrow_mut().insert(ty, found.clone());
        found
    }
}

/// Numbers, bools, chars and strings.
#[derive(Debug, Default)]
pub struct PrimitiveConverter;

impl Converter for PrimitiveConverter {
    fn name(&self) -> &str {
        "primitive"
    }

    fn can_handle(&self, ty: TypeHandle, types: &TypeRegistry) -> bool {
        matches!(types.info(ty).kind(), TypeKind::Primitive(_))
    }

    fn default_priority(&self) -> i32 {
        -100
    }

    fn parse(&self, ctx: &ParseContext<'_>) -> Result<Option<Value>, ConvertError> {
        let TypeKind::Primitive(primitive) = *ctx.types().info(ctx.target).kind() else {
            return Err(ConvertError::invalid(&ctx.text, ctx.target_name(), "not a primitive type"));
        };
        parse_primitive(primitive, &ctx.text).map(Some)
    }
}

/// Parses text as a primitive. Strings are returned untouched; everything
/// else is trimmed first.
pub fn parse_primitive(primitive: Primitive, raw: &str) -> Result<Value, ConvertError> {
    if primitive == Primitive::String {
        return Ok(Value::String(raw.to_string()));
    }
    let text = raw.trim();
    let fail = |reason: String| ConvertError::invalid(text, primitive.name(), reason);

    fn signed(text: &str, min: i64, max: i64) -> Result<Value, String> {
        let v = text.parse::<i64>().map_err(|e| e.to_string())?;
        if v < min || v > max {
            return Err(format!("{} is outside the range {}..={}", v, min, max));
        }
        Ok(Value::Int(v))
    }

    fn unsigned(text: &str, max: u64) -> Result<Value, String> {
        let v = text.parse::<u64>().map_err(|e| e.to_string())?;
        if v > max {
            return Err(format!("{} is outside the range 0..={}", v, max));
        }
        Ok(Value::UInt(v))
    }

    match primitive {
        Primitive::Bool => {
            if text.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if text.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err(fail("expected 'true' or 'false'".to_string()))
            }
        }
        Primitive::Int8 => signed(text, i8::MIN.into(), i8::MAX.into()).map_err(fail),
        Primitive::Int16 => signed(text, i16::MIN.into(), i16::MAX.into()).map_err(fail),
        Primitive::Int32 => signed(text, i32::MIN.into(), i32::MAX.into()).map_err(fail),
        Primitive::Int64 => signed(text, i64::MIN, i64::MAX).map_err(fail),
        Primitive::UInt8 => unsigned(text, u8::MAX.into()).map_err(fail),
        Primitive::UInt16 => unsigned(text, u16::MAX.into()).map_err(fail),
        Primitive::UInt32 => unsigned(text, u32::MAX.into()).map_err(fail),
        Primitive::UInt64 => unsigned(text, u64::MAX).map_err(fail),
        Primitive::Float32 => text
            .parse::<f32>()
            .map(|f| Value::Float(f.into()))
            .map_err(|e| fail(e.to_string())),
        Primitive::Float64 => text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| fail(e.to_string())),
        Primitive::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err(fail("expected exactly one character".to_string())),
            }
        }
        Primitive::String => Ok(Value::String(raw.to_string())),
    }
}

/// Enum variants by name (case-insensitive fallback) or by number.
#[derive(Debug, Default)]
pub struct EnumConverter;

impl Converter for EnumConverter {
    fn name(&self) -> &str {
        "enum"
    }

    fn can_handle(&self, ty: TypeHandle, types: &TypeRegistry) -> bool {
        matches!(types.info(ty).kind(), TypeKind::Enum(_))
    }

    fn parse(&self, ctx: &ParseContext<'_>) -> Result<Option<Value>, ConvertError> {
        let info = ctx.types().info(ctx.target);
        let TypeKind::Enum(variants) = info.kind() else {
            return Err(ConvertError::invalid(&ctx.text, ctx.target_name(), "not an enum type"));
        };
        let text = ctx.text.trim();

        let by_name = variants
            .iter()
            .find(|(n, _)| n == text)
            .or_else(|| variants.iter().find(|(n, _)| n.eq_ignore_ascii_case(text)));
        if let Some((name, value)) = by_name {
            return Ok(Some(Value::Enum(EnumValue {
                ty: ctx.target,
                name: name.clone(),
                value: *value,
            })));
        }

        match text.parse::<i64>() {
            Ok(value) => {
                let name = variants
                    .iter()
                    .find(|(_, v)| *v == value)
                    .map_or_else(|| value.to_string(), |(n, _)| n.clone());
                Ok(Some(Value::Enum(EnumValue {
                    ty: ctx.target,
                    name,
                    value,
                })))
            }
            Err(_) => Err(ConvertError::invalid(
                text,
                ctx.target_name(),
                format!(
                    "expected one of {}",
                    variants
                        .iter()
                        .map(|(n, _)| n.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
        }
    }
}

/// References to other definitions by ID.
#[derive(Debug, Default)]
pub struct DefRefConverter;

impl Converter for DefRefConverter {
    fn name(&self) -> &str {
        "definition reference"
    }

    fn can_handle(&self, ty: TypeHandle, types: &TypeRegistry) -> bool {
        types.is_definition(ty)
    }

    fn parse(&self, ctx: &ParseContext<'_>) -> Result<Option<Value>, ConvertError> {
        let id = ctx.text.trim();
        if id.is_empty() {
            return Ok(None);
        }
        let Some(def) = ctx.lookup_definition(id) else {
            return Err(ConvertError::UnknownDefinition {
                id: id.to_string(),
                target: ctx.target_name(),
            });
        };
        if !ctx.types().is_assignable(ctx.target, def.type_handle()) {
            return Err(ConvertError::DefinitionType {
                id: id.to_string(),
                found: ctx.types().display_name(def.type_handle()),
                target: ctx.target_name(),
            });
        }
        Ok(Some(Value::Object(def.object())))
    }
}

/// Type descriptors, resolved strictly.
#[derive(Debug, Default)]
pub struct TypeConverter;

impl Converter for TypeConverter {
    fn name(&self) -> &str {
        "type"
    }

    fn can_handle(&self, ty: TypeHandle, types: &TypeRegistry) -> bool {
        matches!(types.info(ty).kind(), TypeKind::Type)
    }

    fn parse(&self, ctx: &ParseContext<'_>) -> Result<Option<Value>, ConvertError> {
        let text = ctx.text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(Value::Type(ctx.types().resolve(text)?)))
    }
}

/// Keeps the raw markup node.
#[derive(Debug, Default)]
pub struct NodeConverter;

impl Converter for NodeConverter {
    fn name(&self) -> &str {
        "node"
    }

    fn can_handle(&self, ty: TypeHandle, types: &TypeRegistry) -> bool {
        matches!(types.info(ty).kind(), TypeKind::Node)
    }

    fn context_free(&self) -> bool {
        false
    }

    fn parse(&self, ctx: &ParseContext<'_>) -> Result<Option<Value>, ConvertError> {
        Ok(Some(Value::Node(ctx.node.clone())))
    }
}

type ParseFn = Box<dyn Fn(&str) -> Result<Value, ConvertError>>;

/// Closure-backed converter for exactly one type.
pub struct SimpleConverter {
    name: String,
    target: TypeHandle,
    priority: i32,
    parse: ParseFn,
}

impl SimpleConverter {
    pub fn new(
        name: impl Into<String>,
        target: TypeHandle,
        parse: impl Fn(&str) -> Result<Value, ConvertError> + 'static,
    ) -> Self {
        SimpleConverter {
            name: name.into(),
            target,
            priority: 0,
            parse: Box::new(parse),
        }
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Converter for SimpleConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, ty: TypeHandle, _types: &TypeRegistry) -> bool {
        ty == self.target
    }

    fn default_priority(&self) -> i32 {
        self.priority
    }

    fn parse(&self, ctx: &ParseContext<'_>) -> Result<Option<Value>, ConvertError> {
        (self.parse)(&ctx.text).map(Some)
    }
}

type ConstructFn = Box<dyn Fn(&[f64], Option<(char, char)>) -> Result<Value, ConvertError>>;

/// Delimited numeric text such as `(1, 2.5, 3)`, for vector-like types.
pub struct CsvConverter {
    name: String,
    target: TypeHandle,
    separator: char,
    opening: Vec<char>,
    closing: Vec<char>,
    brackets_required: bool,
    min_parts: usize,
    max_parts: usize,
    construct: ConstructFn,
}

impl CsvConverter {
    /// `construct` receives the parsed parts and the brackets that surrounded
    /// them, if any.
    pub fn new(
        name: impl Into<String>,
        target: TypeHandle,
        parts: std::ops::RangeInclusive<usize>,
        construct: impl Fn(&[f64], Option<(char, char)>) -> Result<Value, ConvertError> + 'static,
    ) -> Self {
        CsvConverter {
            name: name.into(),
            target,
            separator: ',',
            opening: vec!['('],
            closing: vec![')'],
            brackets_required: false,
            min_parts: *parts.start(),
            max_parts: *parts.end(),
            construct: Box::new(construct),
        }
    }

    #[must_use]
    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    #[must_use]
    pub fn brackets(mut self, opening: &[char], closing: &[char]) -> Self {
        self.opening = opening.to_vec();
        self.closing = closing.to_vec();
        self
    }

    #[must_use]
    pub fn require_brackets(mut self) -> Self {
        self.brackets_required = true;
        self
    }

    /// Parses text without a surrounding node.
    ///
    /// # Errors
    /// Fails on missing required brackets, a part count outside the allowed
    /// range, or a part that is not a number.
    pub fn parse_text(&self, raw: &str) -> Result<Value, ConvertError> {
        let mut text = raw.trim();
        let mut brackets = None;
        let mut chars = text.chars();
        if let (Some(first), Some(last)) = (chars.next(), chars.next_back()) {
            if self.opening.contains(&first) && self.closing.contains(&last) {
                text = &text[first.len_utf8()..text.len() - last.len_utf8()];
                brackets = Some((first, last));
            }
        }
        if self.brackets_required && brackets.is_none() {
            return Err(ConvertError::invalid(
                raw,
                self.name.as_str(),
                format!(
                    "expected text that starts with one of {:?} and ends with one of {:?}",
                    self.opening, self.closing
                ),
            ));
        }

        let parts: Vec<&str> = text
            .split(self.separator)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() < self.min_parts || parts.len() > self.max_parts {
            let expected = if self.min_parts == self.max_parts {
                self.min_parts.to_string()
            } else {
                format!("{} to {}", self.min_parts, self.max_parts)
            };
            return Err(ConvertError::invalid(
                raw,
                self.name.as_str(),
                format!("expected {} part(s), found {}", expected, parts.len()),
            ));
        }

        let numbers = parts
            .iter()
            .map(|p| {
                p.parse::<f64>().map_err(|_| {
                    let reason = format!("'{}' is not a number", p);
                    ConvertError::invalid(raw, self.name.as_str(), reason)
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        (self.construct)(&numbers, brackets)
    }
}

impl Converter for CsvConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, ty: TypeHandle, _types: &TypeRegistry) -> bool {
        ty == self.target
    }

    fn parse(&self, ctx: &ParseContext<'_>) -> Result<Option<Value>, ConvertError> {
        self.parse_text(&ctx.text).map(Some)
    }
}
