//! Dynamic values produced by materialization.

use crate::ast::Element;
use crate::types::TypeHandle;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

/// Shared, interior-mutable object. Definitions hold these so that they can
/// reference each other and be patched in place by a reload.
pub type ObjectRef = Rc<RefCell<Object>>;

/// An instance of a registered class.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    ty: TypeHandle,
    id: Option<String>,
    fields: BTreeMap<String, Value>,
}

impl Object {
    pub fn new(ty: TypeHandle) -> Self {
        Object {
            ty,
            id: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn into_ref(self) -> ObjectRef {
        Rc::new(RefCell::new(self))
    }

    pub fn type_handle(&self) -> TypeHandle {
        self.ty
    }

    /// The definition ID, for objects that are definitions.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn set_id(&mut self, id: &str) {
        self.id = Some(id.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn get_object(&self, name: &str) -> Option<ObjectRef> {
        self.get(name).and_then(Value::as_object).cloned()
    }

    pub fn get_list(&self, name: &str) -> Option<&ListValue> {
        self.get(name).and_then(Value::as_list)
    }

    pub fn get_map(&self, name: &str) -> Option<&MapValue> {
        self.get(name).and_then(Value::as_map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub ty: TypeHandle,
    pub name: String,
    pub value: i64,
}

/// Ordered collection: lists, sets, read-only lists and arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct ListValue {
    ty: TypeHandle,
    items: Vec<Value>,
}

impl ListValue {
    pub fn new(ty: TypeHandle) -> Self {
        ListValue {
            ty,
            items: Vec::new(),
        }
    }

    pub fn with_items(ty: TypeHandle, items: Vec<Value>) -> Self {
        ListValue { ty, items }
    }

    pub fn type_handle(&self) -> TypeHandle {
        self.ty
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut Vec<Value> {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains(value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }
}

/// Hashable projection of the key kinds that can be parsed from a tag name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MapKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(u64),
    Char(char),
    String(String),
    Enum(TypeHandle, i64),
    Type(TypeHandle),
    Object(usize),
}

impl MapKey {
    fn of(value: &Value) -> Option<MapKey> {
        Some(match value {
            Value::Bool(b) => MapKey::Bool(*b),
            Value::Int(i) => MapKey::Int(*i),
            Value::UInt(u) => MapKey::UInt(*u),
            Value::Float(f) => MapKey::Float(f.to_bits()),
            Value::Char(c) => MapKey::Char(*c),
            Value::String(s) => MapKey::String(s.clone()),
            Value::Enum(e) => MapKey::Enum(e.ty, e.value),
            Value::Type(t) => MapKey::Type(*t),
            Value::Object(o) => MapKey::Object(Rc::as_ptr(o) as usize),
            _ => return None,
        })
    }
}

/// Insertion-ordered map with a hash index over hashable keys.
#[derive(Debug, Clone)]
pub struct MapValue {
    ty: TypeHandle,
    entries: Vec<(Value, Value)>,
    index: HashMap<MapKey, usize>,
}

impl PartialEq for MapValue {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.entries == other.entries
    }
}

impl MapValue {
    pub fn new(ty: TypeHandle) -> Self {
        MapValue {
            ty,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn type_handle(&self) -> TypeHandle {
        self.ty
    }

    fn position(&self, key: &Value) -> Option<usize> {
        match MapKey::of(key) {
            Some(k) => self.index.get(&k).copied(),
            None => self.entries.iter().position(|(k, _)| k == key),
        }
    }

    /// Inserts or replaces. A replaced entry keeps its original position and
    /// the previous value is returned.
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        if let Some(i) = self.position(&key) {
            return Some(std::mem::replace(&mut self.entries[i].1, value));
        }
        if let Some(k) = MapKey::of(&key) {
            self.index.insert(k, self.entries.len());
        }
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    /// Convenience lookup for string keyed maps.
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.get(&Value::String(key.to_string()))
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.position(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

/// Opaque value produced by a user converter.
#[derive(Clone)]
pub struct CustomValue(Rc<dyn Any>);

impl CustomValue {
    pub fn new<T: Any>(value: T) -> Self {
        CustomValue(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValue(..)")
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    String(String),
    Enum(EnumValue),
    Type(TypeHandle),
    Node(Element),
    List(ListValue),
    Map(MapValue),
    Object(ObjectRef),
    Custom(CustomValue),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // Objects compare by identity.
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Custom(a), Value::Custom(b)) => Rc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            Value::Enum(e) => Some(e.value),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(u) => Some(*u),
            Value::Int(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self {
            Value::Char(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeHandle> {
        match self {
            Value::Type(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Element> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListValue> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_custom<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Custom(c) => c.downcast_ref::<T>(),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident as $as:ty),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(<$as>::from(v))
            }
        })*
    };
}

value_from!(
    bool => Bool as bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
    char => Char as char,
    String => String as String,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keeps_first_position_on_replace() {
        let mut map = MapValue::new(TypeHandle::default());
        assert_eq!(map.insert(Value::from("a"), Value::Int(1)), None);
        assert_eq!(map.insert(Value::from("b"), Value::Int(2)), None);
        assert_eq!(map.insert(Value::from("a"), Value::Int(3)), Some(Value::Int(1)));

        let keys: Vec<&str> = map.iter().filter_map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(map.get_str("a"), Some(&Value::Int(3)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_objects_compare_by_identity() {
        let a = Object::new(TypeHandle::default()).into_ref();
        let b = Object::new(TypeHandle::default()).into_ref();
        assert_eq!(Value::Object(a.clone()), Value::Object(a));
        let other = Object::new(TypeHandle::default()).into_ref();
        assert_ne!(Value::Object(b), Value::Object(other));
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::UInt(5).as_i64(), Some(5));
        assert_eq!(Value::Int(-1).as_u64(), None);
        assert_eq!(Value::Int(2).as_f64(), Some(2.0));
        assert_eq!(Value::from(1.5f32).as_f64(), Some(1.5));
    }

    #[test]
    fn test_custom_values() {
        let v = Value::Custom(CustomValue::new((1, 2)));
        assert_eq!(v.as_custom::<(i32, i32)>(), Some(&(1, 2)));
        assert_eq!(v.as_custom::<String>(), None);
    }
}
