//! Candidate values.
//!
//! The value universe the validator works over. It is richer than JSON:
//! besides the JSON kinds it carries big integers, dates, symbols, compiled
//! regular expressions, callables, and instances of classes (which is also
//! how instances of registered shapes are represented).
//!
//! Values are owned trees, so a candidate can never contain a reference
//! cycle.
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;

/// Ordered key → value map; enumeration order is insertion order.
pub type Map = IndexMap<String, Value>;

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Array(Vec<Value>),
    Object(Map),
    Date(DateTime<Utc>),
    Symbol(Symbol),
    RegExp(Regex),
    Function(Function),
    Instance(Instance),
}

// ————————————————————————————————————————————————————————————————————————————
// CLASSES & INSTANCES
// ————————————————————————————————————————————————————————————————————————————

/// A class marker. Identity is by reference: two markers created with the
/// same name are different classes.
#[derive(Clone)]
pub struct ClassRef(Arc<ClassInfo>);

struct ClassInfo {
    name: String,
    parent: Option<ClassRef>,
}

impl ClassRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(ClassInfo { name: name.into(), parent: None }))
    }
    /// A subclass of `parent`.
    pub fn extends(name: impl Into<String>, parent: &ClassRef) -> Self {
        Self(Arc::new(ClassInfo { name: name.into(), parent: Some(parent.clone()) }))
    }
    pub fn name(&self) -> &str {
        &self.0.name
    }
    pub fn parent(&self) -> Option<&ClassRef> {
        self.0.parent.as_ref()
    }
    /// True if `self` is `other` or inherits from it.
    pub fn is_a(&self, other: &ClassRef) -> bool {
        let mut cursor = Some(self);
        while let Some(class) = cursor {
            if class == other {
                return true;
            }
            cursor = class.parent();
        }
        false
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ClassRef {}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {}", self.0.name)
    }
}

/// An object constructed from a class: the class marker plus its own fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    class: ClassRef,
    fields: Map,
}

impl Instance {
    pub fn new(class: ClassRef, fields: Map) -> Self {
        Self { class, fields }
    }
    pub fn class(&self) -> &ClassRef {
        &self.class
    }
    pub fn fields(&self) -> &Map {
        &self.fields
    }
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
    pub fn is_instance_of(&self, class: &ClassRef) -> bool {
        self.class.is_a(class)
    }
    pub(crate) fn replace_fields(&mut self, fields: Map) {
        self.fields = fields;
    }
    pub fn into_fields(self) -> Map {
        self.fields
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SYMBOLS & FUNCTIONS
// ————————————————————————————————————————————————————————————————————————————

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// A unique token; two symbols are equal only if one is a clone of the other.
#[derive(Clone, Debug)]
pub struct Symbol {
    id: u64,
    description: Option<Arc<str>>,
}

impl Symbol {
    pub fn new(description: Option<&str>) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description: description.map(Arc::from),
        }
    }
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

type Callable = dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync;

/// A shared callable value.
#[derive(Clone)]
pub struct Function {
    name: Option<Arc<str>>,
    call: Arc<Callable>,
}

impl Function {
    pub fn new<F>(name: Option<&str>, call: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self { name: name.map(Arc::from), call: Arc::new(call) }
    }
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    pub fn call(&self, args: &[Value]) -> anyhow::Result<Value> {
        (self.call)(args)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.call, &other.call)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}", self.name().unwrap_or("<anonymous>"))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VALUE HELPERS
// ————————————————————————————————————————————————————————————————————————————

impl Value {
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Own keyed fields, for plain objects and instances alike.
    pub fn fields(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            Value::Instance(instance) => Some(instance.fields()),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields().and_then(|map| map.get(key))
    }
}

/// Render a number the way a dynamic-language `String(n)` does, so pattern
/// validators see `5` rather than `5.0`, and `1e+21` / `1e-7` outside the
/// plain decimal range.
pub fn number_to_text(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n != 0.0 && (n.abs() >= 1e21 || n.abs() < 1e-6) {
        let text = format!("{n:e}");
        match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{mantissa}e+{exponent}"),
            _ => text,
        }
    } else if n.fract() == 0.0 {
        format!("{}", n as i128)
    } else {
        format!("{n}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::RegExp(a), Value::RegExp(b)) => a.as_str() == b.as_str(),
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => a == b,
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(xs) => Value::Array(xs.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(m) => {
                Value::Object(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Value::Instance(instance)
    }
}
