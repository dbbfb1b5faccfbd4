//! Kind tags and the type classifier.
use std::fmt;

use crate::value::Value;

/// What a runtime value is. Closed: every value maps to exactly one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    BigInt,
    String,
    Array,
    Object,
    Date,
    Symbol,
    RegExp,
    Function,
}

/// What a descriptor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Any,
    Boolean,
    Number,
    BigInt,
    String,
    Array,
    Object,
    Date,
    Symbol,
    RegExp,
    Function,
    Class,
    Model,
    Mix,
}

/// Classify a possibly absent value. Total and side-effect free.
///
/// Class instances (including instances of registered shapes) classify as
/// `Object`, exactly like plain objects.
pub fn classify(value: Option<&Value>) -> ValueKind {
    let Some(value) = value else {
        return ValueKind::Undefined;
    };
    match value {
        Value::Null => ValueKind::Null,
        Value::Array(_) => ValueKind::Array,
        Value::Date(_) => ValueKind::Date,
        Value::RegExp(_) => ValueKind::RegExp,
        Value::Bool(_) => ValueKind::Boolean,
        Value::Number(_) => ValueKind::Number,
        Value::BigInt(_) => ValueKind::BigInt,
        Value::String(_) => ValueKind::String,
        Value::Symbol(_) => ValueKind::Symbol,
        Value::Function(_) => ValueKind::Function,
        Value::Object(_) | Value::Instance(_) => ValueKind::Object,
    }
}

impl ValueKind {
    /// The descriptor kind a value of this kind matches directly, if any.
    pub fn as_kind(self) -> Option<Kind> {
        match self {
            ValueKind::Undefined | ValueKind::Null => None,
            ValueKind::Boolean => Some(Kind::Boolean),
            ValueKind::Number => Some(Kind::Number),
            ValueKind::BigInt => Some(Kind::BigInt),
            ValueKind::String => Some(Kind::String),
            ValueKind::Array => Some(Kind::Array),
            ValueKind::Object => Some(Kind::Object),
            ValueKind::Date => Some(Kind::Date),
            ValueKind::Symbol => Some(Kind::Symbol),
            ValueKind::RegExp => Some(Kind::RegExp),
            ValueKind::Function => Some(Kind::Function),
        }
    }
}

impl Kind {
    pub const ALL: [Kind; 14] = [
        Kind::Boolean,
        Kind::Number,
        Kind::BigInt,
        Kind::String,
        Kind::Array,
        Kind::Object,
        Kind::Date,
        Kind::Symbol,
        Kind::RegExp,
        Kind::Function,
        Kind::Class,
        Kind::Model,
        Kind::Any,
        Kind::Mix,
    ];

    /// The reserved type token for this kind.
    pub fn token(self) -> &'static str {
        match self {
            Kind::Any => "any",
            Kind::Boolean => "boolean",
            Kind::Number => "number",
            Kind::BigInt => "bigint",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::Date => "date",
            Kind::Symbol => "symbol",
            Kind::RegExp => "regexp",
            Kind::Function => "function",
            Kind::Class => "class",
            Kind::Model => "model",
            Kind::Mix => "mix",
        }
    }

    pub fn from_token(token: &str) -> Option<Kind> {
        Kind::ALL.into_iter().find(|kind| kind.token() == token)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
