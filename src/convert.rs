//! Instance ↔ plain value conversion.
//!
//! Walks a value alongside its descriptor: defaults fill in missing keys,
//! keys the schema does not declare are dropped, nested shapes are handled
//! through their own descriptions. The same walk either flattens instances
//! into plain objects (for `to_object`/`to_json`) or wraps nested shape
//! values into instances (for `create`).
use chrono::SecondsFormat;
use indexmap::IndexSet;

use crate::check::Checker;
use crate::descriptor::{Descriptor, KeyMatcher, Schema, Strategy, Ty};
use crate::registry::{Registry, ShapeId};
use crate::value::{Instance, Map, Value};

/// Output settings for JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOptions {
    pub pretty: bool,
}

impl JsonOptions {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// instances flattened into plain objects
    Plain,
    /// nested shape values wrapped into instances
    Instances,
}

#[derive(Clone, Copy)]
pub struct Converter<'r> {
    registry: &'r Registry,
}

impl<'r> Converter<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Plain object for an instance of the shape described by `description`.
    pub fn to_plain_object(&self, instance: &Instance, description: &Descriptor) -> Value {
        self.convert_fields_of(instance.fields(), description, Target::Plain)
    }

    pub fn to_json_text(
        &self,
        instance: &Instance,
        description: &Descriptor,
        options: JsonOptions,
    ) -> Result<String, serde_json::Error> {
        let json = to_json(&self.to_plain_object(instance, description));
        if options.pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        }
    }

    /// Fields of a new instance built from an already checked candidate.
    /// Array-shaped candidates are stored under their indices.
    pub(crate) fn build_fields(&self, candidate: &Value, description: &Descriptor) -> Map {
        match self.convert(candidate, description, Target::Instances) {
            Value::Object(fields) => fields,
            Value::Instance(instance) => instance.into_fields(),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
            _ => Map::new(),
        }
    }

    /// Convert one value of a field already validated against `description`.
    pub(crate) fn build_value(&self, value: &Value, description: &Descriptor) -> Value {
        self.convert(value, description, Target::Instances)
    }

    fn convert(&self, value: &Value, description: &Descriptor, target: Target) -> Value {
        match (value, description.ty()) {
            (Value::Null, _) => Value::Null,
            (Value::Object(fields), Ty::Object { schema: Some(_) }) => {
                self.convert_fields_of(fields, description, target)
            }
            (Value::Instance(instance), Ty::Object { schema: Some(_) }) => {
                self.convert_fields_of(instance.fields(), description, target)
            }
            (Value::Array(elements), Ty::Array { items: Some(items) }) => Value::Array(
                elements.iter().map(|element| self.convert(element, items, target)).collect(),
            ),
            (_, Ty::Model(id)) => self.convert_model(*id, value, target),
            (_, Ty::Mix { choices, strategy }) if *strategy != Strategy::Not => {
                let checker = Checker::new(self.registry);
                match choices.iter().find(|choice| checker.matches(Some(value), choice)) {
                    Some(choice) => self.convert(value, choice, target),
                    None => plain(value, target),
                }
            }
            _ => plain(value, target),
        }
    }

    fn convert_absent(&self, description: &Descriptor, target: Target) -> Option<Value> {
        let default = description.get_default()?;
        Some(self.convert(&default, description, target))
    }

    /// Keyed content (of an object or an instance) against an object or
    /// array descriptor.
    fn convert_fields_of(&self, fields: &Map, description: &Descriptor, target: Target) -> Value {
        match description.ty() {
            Ty::Object { schema: Some(schema) } => {
                Value::Object(self.convert_schema(fields, schema, description.match_once(), target))
            }
            Ty::Array { items } => Value::Array(
                fields
                    .values()
                    .map(|element| match items {
                        Some(items) => self.convert(element, items, target),
                        None => plain(element, target),
                    })
                    .collect(),
            ),
            _ => Value::Object(fields.iter().map(|(k, v)| (k.clone(), plain(v, target))).collect()),
        }
    }

    fn convert_schema(&self, fields: &Map, schema: &Schema, match_once: bool, target: Target) -> Map {
        let mut out = Map::new();
        let mut remaining: IndexSet<&str> = fields.keys().map(String::as_str).collect();

        for (matcher, nested) in schema {
            match matcher {
                KeyMatcher::Exact(key) => {
                    let converted = match fields.get(key) {
                        Some(value) if remaining.shift_remove(key.as_str()) => {
                            Some(self.convert(value, nested, target))
                        }
                        _ => self.convert_absent(nested, target),
                    };
                    if let Some(converted) = converted {
                        out.insert(key.clone(), converted);
                    }
                }
                KeyMatcher::Pattern(pattern) => {
                    let mut candidates = remaining.iter().copied().filter(|key| pattern.is_match(key));
                    let matched: Vec<&str> = if match_once {
                        candidates.next().into_iter().collect()
                    } else {
                        candidates.collect()
                    };
                    for key in matched {
                        remaining.shift_remove(key);
                        if let Some(value) = fields.get(key) {
                            out.insert(key.to_string(), self.convert(value, nested, target));
                        }
                    }
                }
            }
        }
        out
    }

    fn convert_model(&self, id: ShapeId, value: &Value, target: Target) -> Value {
        let (Some(class), Some(description)) = (self.registry.class(id), self.registry.description(id))
        else {
            return plain(value, target);
        };
        if let Value::Instance(instance) = value {
            if instance.class() == class {
                return match target {
                    Target::Instances => value.clone(),
                    Target::Plain => self.to_plain_object(instance, description),
                };
            }
        }
        let converted = self.convert(value, description, target);
        match (target, converted) {
            (Target::Instances, Value::Object(fields)) => {
                Value::Instance(Instance::new(class.clone(), fields))
            }
            (Target::Instances, Value::Array(items)) => Value::Instance(Instance::new(
                class.clone(),
                items.into_iter().enumerate().map(|(i, item)| (i.to_string(), item)).collect(),
            )),
            (_, converted) => converted,
        }
    }
}

/// Copy a value without a descriptor to guide it.
fn plain(value: &Value, target: Target) -> Value {
    match (value, target) {
        (Value::Instance(instance), Target::Plain) => Value::Object(
            instance.fields().iter().map(|(k, v)| (k.clone(), plain(v, target))).collect(),
        ),
        (Value::Object(fields), Target::Plain) => {
            Value::Object(fields.iter().map(|(k, v)| (k.clone(), plain(v, target))).collect())
        }
        (Value::Array(elements), Target::Plain) => {
            Value::Array(elements.iter().map(|element| plain(element, target)).collect())
        }
        _ => value.clone(),
    }
}

/// JSON rendering of a value. Symbols and functions are dropped from
/// objects and become `null` elsewhere; big integers become strings; dates
/// become ISO-8601 strings; regular expressions become `/source/` strings.
pub fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null | Value::Symbol(_) | Value::Function(_) => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => json_num_pref_i64(*n),
        Value::BigInt(n) => Json::String(n.to_string()),
        Value::String(s) => Json::String(s.clone()),
        Value::Array(elements) => Json::Array(elements.iter().map(to_json).collect()),
        Value::Object(fields) => json_object(fields),
        Value::Instance(instance) => json_object(instance.fields()),
        Value::Date(date) => Json::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Value::RegExp(pattern) => Json::String(format!("/{}/", pattern.as_str())),
    }
}

fn json_object(fields: &Map) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .iter()
            .filter(|(_, v)| !matches!(v, Value::Symbol(_) | Value::Function(_)))
            .map(|(k, v)| (k.clone(), to_json(v)))
            .collect(),
    )
}

// prefer emitting integers when exact; non-finite numbers have no JSON form.
// `i64::MAX as f64` is 2^63, one past the range, hence the strict bound.
fn json_num_pref_i64(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}
