/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     value.rs
 * Purpose:  Runtime value representation. This is the core type that flows
 *           through the interpreter; every expression ultimately evaluates
 *           to one of these.
 *
 * License:
 * This file is part of the Pyrite project.
 *
 * Pyrite is dual-licensed under the terms of:
 *   - The MIT License
 *   - The Apache License, Version 2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under these licenses is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *
 * ==========================================================================
 */

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{Param, Stmt};
use crate::error::{type_error, EvalResult, ExceptionObject};
use crate::interpreter::environment::Environment;
use crate::interpreter::{Interp, NativeCall};

/// Pyrite runtime value.
///
/// Primitive kinds copy by value. Compound kinds (list, dict, set, instance)
/// share their storage through `Rc<RefCell<_>>` and mutate in place; tuples
/// are immutable after construction.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bool(bool),
    None,

    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<FxHashMap<Key, Value>>>),
    Set(Rc<RefCell<FxHashSet<Key>>>),
    Tuple(Rc<Vec<Value>>),

    Function(Rc<FunctionObject>),
    BoundMethod(Rc<BoundMethod>),
    Native(Rc<NativeFunction>),

    Class(Rc<ClassObject>),
    Instance(Rc<InstanceObject>),

    Exception(Rc<ExceptionObject>),
    Iterator(Rc<IteratorObject>),

    /// The proxy produced by `super()`; attribute access on it resolves
    /// methods starting one level above its anchor class.
    Super(Rc<SuperProxy>),
}

/// Hashable key domain for dicts and sets: the immutable primitives plus
/// tuples thereof. Float keys hash by bit pattern, so `1` and `1.0` are
/// distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<Key>),
}

impl Key {
    pub fn from_value(v: &Value) -> EvalResult<Key> {
        match v {
            Value::None => Ok(Key::None),
            Value::Bool(b) => Ok(Key::Bool(*b)),
            Value::Int(n) => Ok(Key::Int(*n)),
            Value::Float(f) => Ok(Key::Float(f.to_bits())),
            Value::Str(s) => Ok(Key::Str(s.clone())),
            Value::Tuple(items) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in items.iter() {
                    keys.push(Key::from_value(item)?);
                }
                Ok(Key::Tuple(keys))
            }
            other => Err(type_error(format!(
                "unhashable type: '{}'",
                other.type_name()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(n) => Value::Int(*n),
            Key::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Tuple(keys) => Value::Tuple(Rc::new(keys.iter().map(Key::to_value).collect())),
        }
    }
}

/// A user-defined function or closure. The defining environment frame is
/// captured by reference at creation time, so later mutation of that frame
/// stays visible through the closure.
pub struct FunctionObject {
    pub name: String,
    pub params: Vec<Param>,
    pub vararg: Option<String>,
    pub kwarg: Option<String>,
    pub body: Rc<[Stmt]>,
    pub env: Rc<RefCell<Environment>>,
}

/// A method pulled off an instance (or class), remembering both the
/// receiver and the class in the ancestor chain that supplied the method.
/// The latter anchors zero-argument `super()` inside the method body.
pub struct BoundMethod {
    pub receiver: Value,
    pub func: Rc<FunctionObject>,
    pub defining_class: Option<Rc<ClassObject>>,
}

pub type NativeFn = Arc<dyn Fn(&mut Interp, NativeCall) -> EvalResult<Value>>;

/// A host-registered callable. It receives already-bound argument values
/// plus the cancellation token, and may call back into the interpreter.
pub struct NativeFunction {
    pub name: String,
    pub func: NativeFn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    Instance,
    Static,
    Class,
}

#[derive(Clone)]
pub enum ClassMember {
    Method {
        func: Rc<FunctionObject>,
        kind: MethodKind,
    },
    Property {
        getter: Rc<FunctionObject>,
        setter: Option<Rc<FunctionObject>>,
    },
    Attr(Value),
}

/// A dunder resolved at class-construction time. `depth` locates the
/// defining class: 0 is the class itself, n is `ancestors[n - 1]`.
#[derive(Clone)]
pub struct ProtocolFn {
    pub func: Rc<FunctionObject>,
    pub depth: usize,
}

pub type ProtocolTable = FxHashMap<&'static str, ProtocolFn>;

/// A class object. Immutable once the class statement (and any class
/// decorators) finish executing.
pub struct ClassObject {
    pub name: String,
    pub parent: Option<Rc<ClassObject>>,
    /// Ancestor chain, nearest first; excludes the class itself. Acyclic by
    /// construction since a parent must already exist as a finished class.
    pub ancestors: Vec<Rc<ClassObject>>,
    pub members: FxHashMap<String, ClassMember>,
    /// Dunder capability table resolved once at construction,
    /// nearest-ancestor definition winning.
    pub protocols: ProtocolTable,
}

impl ClassObject {
    /// True when `other` is this class or one of its ancestors.
    pub fn is_subclass_of(self: &Rc<Self>, other: &Rc<ClassObject>) -> bool {
        if Rc::ptr_eq(self, other) {
            return true;
        }
        self.ancestors.iter().any(|a| Rc::ptr_eq(a, other))
    }

    /// Resolves a protocol entry's `depth` back to the defining class.
    pub fn class_at_depth(self: &Rc<Self>, depth: usize) -> Rc<ClassObject> {
        if depth == 0 {
            Rc::clone(self)
        } else {
            Rc::clone(&self.ancestors[depth - 1])
        }
    }
}

/// An instance: a back-reference to its class plus a mutable attribute map
/// populated starting from `__init__`.
pub struct InstanceObject {
    pub class: Rc<ClassObject>,
    pub attrs: RefCell<FxHashMap<String, Value>>,
}

pub struct SuperProxy {
    /// Resolution starts one level above this class in the chain.
    pub anchor: Rc<ClassObject>,
    pub receiver: Value,
}

/// Iterator state plus a sticky exhaustion flag: once exhausted it stays
/// exhausted unless the source's `__iter__` produces a fresh iterator.
pub struct IteratorObject {
    pub state: RefCell<IterState>,
    pub exhausted: Cell<bool>,
}

pub enum IterState {
    /// Snapshot of a built-in collection's elements.
    Items { items: Vec<Value>, pos: usize },
    /// Lazy integer range.
    Range { next: i64, stop: i64, step: i64 },
    /// A user object driven through its `__next__` method.
    Object { obj: Value },
}

impl IteratorObject {
    pub fn from_items(items: Vec<Value>) -> Value {
        Value::Iterator(Rc::new(IteratorObject {
            state: RefCell::new(IterState::Items { items, pos: 0 }),
            exhausted: Cell::new(false),
        }))
    }

    pub fn from_range(start: i64, stop: i64, step: i64) -> Value {
        Value::Iterator(Rc::new(IteratorObject {
            state: RefCell::new(IterState::Range {
                next: start,
                stop,
                step,
            }),
            exhausted: Cell::new(false),
        }))
    }

    pub fn from_object(obj: Value) -> Value {
        Value::Iterator(Rc::new(IteratorObject {
            state: RefCell::new(IterState::Object { obj }),
            exhausted: Cell::new(false),
        }))
    }
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(map: FxHashMap<Key, Value>) -> Value {
        Value::Dict(Rc::new(RefCell::new(map)))
    }

    pub fn set(set: FxHashSet<Key>) -> Value {
        Value::Set(Rc::new(RefCell::new(set)))
    }

    /// Stable type name string, used in error messages and `type()`.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::None => "none",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Tuple(_) => "tuple",
            Value::Function(_) => "function",
            Value::BoundMethod(_) => "method",
            Value::Native(_) => "native",
            Value::Class(_) => "class",
            Value::Instance(i) => &i.class.name,
            Value::Exception(_) => "exception",
            Value::Iterator(_) => "iterator",
            Value::Super(_) => "super",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Identity (`is`): pointer identity for compound kinds, value identity
    /// for primitives.
    pub fn identical(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::None, Value::None) => true,
            (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || x == y,
            (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
            (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
            (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y),
            (Value::Tuple(x), Value::Tuple(y)) => Rc::ptr_eq(x, y),
            (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
            (Value::Native(x), Value::Native(y)) => Rc::ptr_eq(x, y),
            (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
            (Value::Instance(x), Value::Instance(y)) => Rc::ptr_eq(x, y),
            (Value::Exception(x), Value::Exception(y)) => Rc::ptr_eq(x, y),
            (Value::Iterator(x), Value::Iterator(y)) => Rc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Structural equality with no dunder dispatch: numerics by value
    /// (int/float interchangeable), strings by content, collections
    /// element-wise, everything else by identity. Bools are their own kind
    /// and never equal a numeric, matching the dict-key split. Instance
    /// `__eq__` dispatch lives in the interpreter's comparison helpers.
    pub fn equals_structural(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
                (*x as f64) == *y
            }
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::None, Value::None) => true,

            (Value::List(x), Value::List(y)) => {
                if Rc::ptr_eq(x, y) {
                    return true;
                }
                let (x, y) = (x.borrow(), y.borrow());
                x.len() == y.len()
                    && x.iter().zip(y.iter()).all(|(a, b)| Value::equals_structural(a, b))
            }

            (Value::Tuple(x), Value::Tuple(y)) => {
                x.len() == y.len()
                    && x.iter().zip(y.iter()).all(|(a, b)| Value::equals_structural(a, b))
            }

            (Value::Dict(x), Value::Dict(y)) => {
                if Rc::ptr_eq(x, y) {
                    return true;
                }
                let (x, y) = (x.borrow(), y.borrow());
                x.len() == y.len()
                    && x.iter().all(|(k, v)| {
                        y.get(k).is_some_and(|w| Value::equals_structural(v, w))
                    })
            }

            (Value::Set(x), Value::Set(y)) => {
                Rc::ptr_eq(x, y) || *x.borrow() == *y.borrow()
            }

            (Value::Exception(x), Value::Exception(y)) => {
                Rc::ptr_eq(x, y) || (x.kind == y.kind && x.message == y.message)
            }

            _ => Value::identical(a, b),
        }
    }

    /// Converts JSON-safe host data into a value: objects become dicts with
    /// string keys, arrays become lists.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let mut dict = FxHashMap::default();
                for (k, v) in map {
                    dict.insert(Key::Str(Rc::from(k.as_str())), Value::from_json(v));
                }
                Value::dict(dict)
            }
        }
    }

    /// Converts a value to JSON. Fails with a TypeError-kind raise for
    /// kinds with no JSON counterpart (sets, functions, instances, …) and
    /// for dicts with non-string keys.
    pub fn to_json(&self) -> EvalResult<serde_json::Value> {
        match self {
            Value::None => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Int(n) => Ok(serde_json::Value::from(*n)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| type_error("cannot represent non-finite float as JSON")),
            Value::Str(s) => Ok(serde_json::Value::String(s.to_string())),
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.borrow().len());
                for item in items.borrow().iter() {
                    out.push(item.to_json()?);
                }
                Ok(serde_json::Value::Array(out))
            }
            Value::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    out.push(item.to_json()?);
                }
                Ok(serde_json::Value::Array(out))
            }
            Value::Dict(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map.borrow().iter() {
                    match k {
                        Key::Str(s) => {
                            out.insert(s.to_string(), v.to_json()?);
                        }
                        _ => {
                            return Err(type_error(
                                "only string-keyed dicts convert to JSON",
                            ))
                        }
                    }
                }
                Ok(serde_json::Value::Object(out))
            }
            other => Err(type_error(format!(
                "cannot represent '{}' as JSON",
                other.type_name()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        Value::equals_structural(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::None => write!(f, "None"),
            Value::List(items) => write!(f, "List(len={})", items.borrow().len()),
            Value::Dict(map) => write!(f, "Dict(len={})", map.borrow().len()),
            Value::Set(set) => write!(f, "Set(len={})", set.borrow().len()),
            Value::Tuple(items) => write!(f, "Tuple(len={})", items.len()),
            Value::Function(func) => write!(f, "Function({})", func.name),
            Value::BoundMethod(m) => write!(f, "BoundMethod({})", m.func.name),
            Value::Native(n) => write!(f, "Native({})", n.name),
            Value::Class(c) => write!(f, "Class({})", c.name),
            Value::Instance(i) => write!(f, "Instance({})", i.class.name),
            Value::Exception(e) => write!(f, "Exception({}: {})", e.kind, e.message),
            Value::Iterator(_) => write!(f, "Iterator"),
            Value::Super(s) => write!(f, "Super(above {})", s.anchor.name),
        }
    }
}
