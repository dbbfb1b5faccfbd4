//! Compiled schema nodes.
//!
//! A [`Descriptor`] is built once by the compiler and never changes
//! afterwards: fields are private and there is no mutating API. Descriptors
//! are `Send + Sync`, so a compiled tree can be checked from any number of
//! threads at once.
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;

use crate::error::CompileError;
use crate::kind::Kind;
use crate::registry::ShapeId;
use crate::value::{ClassRef, Value, number_to_text};

// ————————————————————————————————————————————————————————————————————————————
// STRATEGY
// ————————————————————————————————————————————————————————————————————————————

/// How an array's elements are matched against a union's choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// every element matches at least one choice
    #[default]
    Any,
    /// every element matches a choice, and every choice is used
    All,
    /// a single choice matches every element
    One,
    /// no element matches any choice
    Not,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [Strategy::Any, Strategy::All, Strategy::One, Strategy::Not];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Any => "any",
            Strategy::All => "all",
            Strategy::One => "one",
            Strategy::Not => "not",
        }
    }
}

impl FromStr for Strategy {
    type Err = CompileError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| CompileError::UnknownStrategy(s.to_string()))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DEFAULTS & VALIDATORS
// ————————————————————————————————————————————————————————————————————————————

type Generator = dyn Fn() -> anyhow::Result<Value> + Send + Sync;
type Predicate = dyn Fn(&Value) -> anyhow::Result<bool> + Send + Sync;

/// A default for a missing key: a constant, or a generator run on demand.
#[derive(Clone)]
pub enum DefaultValue {
    Constant(Value),
    Generator(Arc<Generator>),
}

impl DefaultValue {
    /// Produce the default. A failing or panicking generator produces nothing.
    pub fn produce(&self) -> Option<Value> {
        match self {
            DefaultValue::Constant(value) => Some(value.clone()),
            DefaultValue::Generator(generate) => {
                catch_unwind(AssertUnwindSafe(|| generate())).ok()?.ok()
            }
        }
    }
}

/// An extra check run after the structural match succeeds.
#[derive(Clone)]
pub enum Validator {
    Predicate(Arc<Predicate>),
    /// Only allowed on `string` and `number` descriptors.
    Pattern(Regex),
}

impl Validator {
    /// Errors and panics inside a predicate count as "not valid".
    pub fn is_valid(&self, value: &Value) -> bool {
        match self {
            Validator::Predicate(predicate) => {
                matches!(catch_unwind(AssertUnwindSafe(|| predicate(value))), Ok(Ok(true)))
            }
            Validator::Pattern(pattern) => match value {
                Value::String(s) => pattern.is_match(s),
                Value::Number(n) => pattern.is_match(&number_to_text(*n)),
                _ => false,
            },
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// OPTIONS
// ————————————————————————————————————————————————————————————————————————————

/// Per-node options accepted by the compiler.
#[derive(Clone, Default)]
pub struct Options {
    pub(crate) required: Option<bool>,
    pub(crate) allow_null: bool,
    pub(crate) match_once: bool,
    pub(crate) default: Option<DefaultValue>,
    pub(crate) validator: Option<Validator>,
    pub(crate) strategy: Option<Strategy>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }
    pub fn optional(self) -> Self {
        self.required(false)
    }
    pub fn allow_null(mut self) -> Self {
        self.allow_null = true;
        self
    }
    pub fn match_once(mut self) -> Self {
        self.match_once = true;
        self
    }
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Constant(value.into()));
        self
    }
    pub fn default_with<F>(mut self, generate: F) -> Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Generator(Arc::new(generate)));
        self
    }
    pub fn validator<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.validator = Some(Validator::Predicate(Arc::new(predicate)));
        self
    }
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.validator = Some(Validator::Pattern(pattern));
        self
    }
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DESCRIPTOR
// ————————————————————————————————————————————————————————————————————————————

/// How a schema key is compared with candidate keys.
#[derive(Clone, Debug)]
pub enum KeyMatcher {
    Exact(String),
    /// Compiled from a key written as `/^...$/`.
    Pattern(Regex),
}

impl KeyMatcher {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyMatcher::Exact(exact) => exact == key,
            KeyMatcher::Pattern(pattern) => pattern.is_match(key),
        }
    }
}

impl fmt::Display for KeyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMatcher::Exact(key) => f.write_str(key),
            KeyMatcher::Pattern(pattern) => write!(f, "/{}/", pattern.as_str()),
        }
    }
}

/// Ordered entries of an object descriptor.
pub type Schema = Vec<(KeyMatcher, Descriptor)>;

/// Kind-specific payload.
#[derive(Clone, Debug)]
pub enum Ty {
    Any,
    Boolean,
    Number,
    BigInt,
    String,
    Date,
    Symbol,
    RegExp,
    Function,
    /// `items: None` accepts any element.
    Array { items: Option<Box<Descriptor>> },
    /// `schema: None` accepts any object.
    Object { schema: Option<Schema> },
    Class(ClassRef),
    Model(ShapeId),
    Mix { choices: Vec<Descriptor>, strategy: Strategy },
}

impl Ty {
    pub fn kind(&self) -> Kind {
        match self {
            Ty::Any => Kind::Any,
            Ty::Boolean => Kind::Boolean,
            Ty::Number => Kind::Number,
            Ty::BigInt => Kind::BigInt,
            Ty::String => Kind::String,
            Ty::Date => Kind::Date,
            Ty::Symbol => Kind::Symbol,
            Ty::RegExp => Kind::RegExp,
            Ty::Function => Kind::Function,
            Ty::Array { .. } => Kind::Array,
            Ty::Object { .. } => Kind::Object,
            Ty::Class(_) => Kind::Class,
            Ty::Model(_) => Kind::Model,
            Ty::Mix { .. } => Kind::Mix,
        }
    }
}

#[derive(Clone)]
pub struct Descriptor {
    ty: Ty,
    required: bool,
    allow_null: bool,
    match_once: bool,
    default: Option<DefaultValue>,
    validator: Option<Validator>,
}

impl Descriptor {
    pub(crate) fn new(ty: Ty, options: Options) -> Self {
        Self {
            ty,
            required: options.required.unwrap_or(true),
            allow_null: options.allow_null,
            match_once: options.match_once,
            default: options.default,
            validator: options.validator,
        }
    }

    pub fn kind(&self) -> Kind {
        self.ty.kind()
    }
    pub fn ty(&self) -> &Ty {
        &self.ty
    }
    pub fn required(&self) -> bool {
        self.required
    }
    pub fn allow_null(&self) -> bool {
        self.allow_null
    }
    pub fn match_once(&self) -> bool {
        self.match_once
    }
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
    /// `None` when there is no default or the generator failed.
    pub fn get_default(&self) -> Option<Value> {
        self.default.as_ref().and_then(DefaultValue::produce)
    }
    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }
    /// Run the extra validator; descriptors without one accept everything.
    pub fn is_valid(&self, value: &Value) -> bool {
        self.validator.as_ref().is_none_or(|validator| validator.is_valid(value))
    }
    /// A missing key carrying this descriptor is acceptable.
    pub fn tolerates_absence(&self) -> bool {
        !self.required || self.has_default()
    }

    pub fn items(&self) -> Option<&Descriptor> {
        match &self.ty {
            Ty::Array { items } => items.as_deref(),
            _ => None,
        }
    }
    pub fn schema(&self) -> Option<&Schema> {
        match &self.ty {
            Ty::Object { schema } => schema.as_ref(),
            _ => None,
        }
    }
    /// Descriptor for a candidate key: the first entry whose matcher accepts it.
    pub fn describe_key(&self, key: &str) -> Option<&Descriptor> {
        self.schema()?
            .iter()
            .find(|(matcher, _)| matcher.matches(key))
            .map(|(_, descriptor)| descriptor)
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("ty", &self.ty)
            .field("required", &self.required)
            .field("allow_null", &self.allow_null)
            .field("match_once", &self.match_once)
            .field("has_default", &self.has_default())
            .field("has_validator", &self.has_validator())
            .finish()
    }
}
