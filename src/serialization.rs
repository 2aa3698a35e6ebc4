use crate::database::Definition;
use crate::types::TypeRegistry;
use crate::value::{Object, Value as DefValue};
use serde::Serialize;
use std::collections::BTreeMap;

/// Key under which an exported object records its type.
pub const TYPE_KEY: &str = "$type";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Unsigned(u64),
    Number(f64),
    Boolean(bool),
    Null,
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

pub(crate) fn definitions_to_value(definitions: &[Definition], types: &TypeRegistry) -> Value {
    let map = definitions
        .iter()
        .map(|d| (d.id().to_string(), object_to_value(&d.borrow(), types)))
        .collect();
    Value::Object(map)
}

fn object_to_value(object: &Object, types: &TypeRegistry) -> Value {
    let mut map = BTreeMap::new();
    map.insert(
        TYPE_KEY.to_string(),
        Value::String(types.display_name(object.type_handle())),
    );
    for (name, value) in object.fields() {
        map.insert(name.to_string(), to_value(value, types));
    }
    Value::Object(map)
}

/// Map keys become strings: enums by name, everything else by its text form.
fn key_to_string(key: &DefValue, types: &TypeRegistry) -> String {
    match to_value(key, types) {
        Value::String(s) => s,
        Value::Integer(i) => i.to_string(),
        Value::Unsigned(u) => u.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn to_value(value: &DefValue, types: &TypeRegistry) -> Value {
    match value {
        DefValue::Null => Value::Null,
        DefValue::Bool(b) => Value::Boolean(*b),
        DefValue::Int(i) => Value::Integer(*i),
        DefValue::UInt(u) => Value::Unsigned(*u),
        DefValue::Float(f) => Value::Number(*f),
        DefValue::Char(c) => Value::String(c.to_string()),
        DefValue::String(s) => Value::String(s.clone()),
        DefValue::Enum(e) => Value::String(e.name.clone()),
        DefValue::Type(t) => Value::String(types.display_name(*t)),
        DefValue::Node(n) => Value::String(n.to_markup()),
        DefValue::List(l) => Value::Array(l.iter().map(|v| to_value(v, types)).collect()),
        DefValue::Map(m) => Value::Object(
            m.iter()
                .map(|(k, v)| (key_to_string(k, types), to_value(v, types)))
                .collect(),
        ),
        DefValue::Object(o) => {
            let object = o.borrow();
            // Definitions are written by ID; that also keeps cycles finite.
            match object.id() {
                Some(id) => Value::String(id.to_string()),
                None => object_to_value(&object, types),
            }
        }
        // Opaque converter output has no generic representation.
        DefValue::Custom(_) => Value::Null,
    }
}
