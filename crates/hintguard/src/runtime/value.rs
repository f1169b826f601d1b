use std::collections::BTreeMap;
use std::sync::Arc;

use crate::runtime::class::{builtins, ClassRef};

/// A runtime value ("pith") checked against hints.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    List(Arc<Vec<Value>>),
    Tuple(Arc<Vec<Value>>),
    Dict(Arc<Vec<(Value, Value)>>),
    Set(Arc<Vec<Value>>),
    FrozenSet(Arc<Vec<Value>>),
    Class(ClassRef),
    Object(Arc<Instance>),
}

#[derive(Debug)]
pub struct Instance {
    pub class: ClassRef,
    pub fields: BTreeMap<String, Value>,
    /// Backing items for user-defined sequence subclasses.
    pub items: Vec<Value>,
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn bytes(b: &[u8]) -> Self {
        Value::Bytes(Arc::from(b))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Arc::new(items))
    }

    pub fn dict(pairs: Vec<(Value, Value)>) -> Self {
        Value::Dict(Arc::new(pairs))
    }

    pub fn set(items: Vec<Value>) -> Self {
        Value::Set(Arc::new(items))
    }

    pub fn frozenset(items: Vec<Value>) -> Self {
        Value::FrozenSet(Arc::new(items))
    }

    pub fn object(class: &ClassRef, fields: BTreeMap<String, Value>) -> Self {
        Value::Object(Arc::new(Instance {
            class: class.clone(),
            fields,
            items: Vec::new(),
        }))
    }

    pub fn instance(class: &ClassRef) -> Self {
        Self::object(class, BTreeMap::new())
    }

    pub fn sequence_object(class: &ClassRef, items: Vec<Value>) -> Self {
        Value::Object(Arc::new(Instance {
            class: class.clone(),
            fields: BTreeMap::new(),
            items,
        }))
    }

    pub fn class(&self) -> ClassRef {
        let b = builtins();
        match self {
            Value::None => b.none_type.clone(),
            Value::Bool(_) => b.bool_.clone(),
            Value::Int(_) => b.int.clone(),
            Value::Float(_) => b.float.clone(),
            Value::Str(_) => b.str_.clone(),
            Value::Bytes(_) => b.bytes.clone(),
            Value::List(_) => b.list.clone(),
            Value::Tuple(_) => b.tuple.clone(),
            Value::Dict(_) => b.dict.clone(),
            Value::Set(_) => b.set.clone(),
            Value::FrozenSet(_) => b.frozenset.clone(),
            Value::Class(_) => b.type_.clone(),
            Value::Object(inst) => inst.class.clone(),
        }
    }

    pub fn has_instance_attr(&self, name: &str) -> bool {
        match self {
            Value::Object(inst) => inst.fields.contains_key(name),
            _ => false,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Class(_) => true,
            Value::Object(inst) => {
                if inst.class.has_attr("__len__") {
                    !inst.items.is_empty()
                } else {
                    true
                }
            }
            other => other.len().map(|n| n > 0).unwrap_or(true),
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            Value::List(items)
            | Value::Tuple(items)
            | Value::Set(items)
            | Value::FrozenSet(items) => Some(items.len()),
            Value::Dict(pairs) => Some(pairs.len()),
            Value::Object(inst) if inst.class.has_attr("__len__") => Some(inst.items.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// `self[index]` for sequences, with Python's negative indexing.
    pub fn index(&self, index: i64) -> Option<Value> {
        let len = self.len()? as i64;
        let i = if index < 0 { len + index } else { index };
        if i < 0 || i >= len {
            return None;
        }
        let i = i as usize;
        match self {
            Value::List(items) | Value::Tuple(items) => items.get(i).cloned(),
            Value::Str(s) => s.chars().nth(i).map(|c| Value::str(&c.to_string())),
            Value::Bytes(b) => b.get(i).map(|x| Value::Int(*x as i64)),
            Value::Object(inst) => inst.items.get(i).cloned(),
            _ => None,
        }
    }

    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::Bytes(b) => format!("b'{}'", String::from_utf8_lossy(b)),
            Value::List(items) => format!("[{}]", join_reprs(items)),
            Value::Tuple(items) => {
                if items.len() == 1 {
                    format!("({},)", items[0].repr())
                } else {
                    format!("({})", join_reprs(items))
                }
            }
            Value::Dict(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Set(items) => {
                if items.is_empty() {
                    "set()".to_string()
                } else {
                    format!("{{{}}}", join_reprs(items))
                }
            }
            Value::FrozenSet(items) => format!("frozenset({{{}}})", join_reprs(items)),
            Value::Class(cls) => format!("<class '{}'>", cls.qualname()),
            Value::Object(inst) => format!("<{} object>", inst.class.qualname()),
        }
    }
}

fn join_reprs(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Bool(a), Value::Int(b)) | (Value::Int(b), Value::Bool(a)) => {
                (*a as i64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len() && a.iter().all(|pair| b.contains(pair))
            }
            (Value::Set(a), Value::Set(b))
            | (Value::FrozenSet(a), Value::FrozenSet(b))
            | (Value::Set(a), Value::FrozenSet(b))
            | (Value::FrozenSet(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.contains(x))
            }
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_container_length() {
        assert!(!Value::list(vec![]).truthy());
        assert!(Value::list(vec![Value::Int(0)]).truthy());
        assert!(!Value::str("").truthy());
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
    }

    #[test]
    fn negative_index_counts_from_the_end() {
        let v = Value::tuple(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(v.index(-1), Some(Value::Int(3)));
        assert_eq!(v.index(3), None);
    }

    #[test]
    fn repr_is_python_like() {
        assert_eq!(Value::tuple(vec![Value::Int(1)]).repr(), "(1,)");
        assert_eq!(Value::str("x").repr(), "'x'");
        assert_eq!(Value::Float(2.0).repr(), "2.0");
        assert_eq!(Value::set(vec![]).repr(), "set()");
    }
}
