//! JSON declaration documents.
//!
//! ```json
//! { "models": { "User": { "name": "string", "tags": ["string"] } } }
//! ```
//!
//! A string node is a type token, `[]` and `[x]` are arrays, an object with
//! `$type` or `$mix` is a directive node carrying options, and any other
//! object is a keyed mapping. Every model name is declared before the first
//! model compiles, so models may refer to each other in any order.
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::descriptor::{Options, Strategy};
use crate::error::CompileError;
use crate::guard::Guard;
use crate::registry::ShapeId;
use crate::source::{SchemaMap, Source};
use crate::value::Value;

#[derive(thiserror::Error, Debug)]
pub enum DeclarationError {
    #[error("at JSON path {path} → {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("at {path} → {source}")]
    Compile {
        path: String,
        #[source]
        source: CompileError,
    },
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Document {
    pub models: IndexMap<String, Json>,
}

/// Parse `text` and register every model it declares, in document order.
///
/// Models may refer to shapes already in `guard`. Loading is all or nothing:
/// on error `guard` is left exactly as it was.
pub fn load(guard: &mut Guard, text: &str) -> Result<Vec<ShapeId>, DeclarationError> {
    let document: Document = from_str_with_path(text)?;
    let mut staged = guard.fork();

    for name in document.models.keys() {
        staged.declare(name).map_err(|source| compile_error(model_path(name), source))?;
    }

    let mut ids = Vec::with_capacity(document.models.len());
    for (name, node) in &document.models {
        let path = model_path(name);
        let source = Lowering { guard: &staged }.node(node, &path)?;
        let id = staged.model(name, source).map_err(|source| compile_error(path, source))?;
        ids.push(id);
    }

    *guard = staged;
    tracing::debug!(models = ids.len(), "loaded declaration document");
    Ok(ids)
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, DeclarationError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| DeclarationError::Parse {
        path: err.path().to_string(),
        source: err.into_inner(),
    })
}

const DIRECTIVES: [&str; 8] = [
    "$type",
    "$mix",
    "$required",
    "$allowNull",
    "$matchOnce",
    "$default",
    "$validator",
    "$strategy",
];

/// Turns JSON nodes into [`Source`]s. Directive nodes are compiled on the
/// spot, since options only reach the compiler through a descriptor.
struct Lowering<'g> {
    guard: &'g Guard,
}

impl Lowering<'_> {
    fn node(&self, node: &Json, path: &str) -> Result<Source, DeclarationError> {
        match node {
            Json::String(token) => Ok(Source::from(token.as_str())),
            Json::Array(items) => match items.as_slice() {
                [] => Ok(Source::any_array()),
                [item] => Ok(Source::array_of(self.node(item, &format!("{path}[0]"))?)),
                _ => Err(invalid(path, "an array declaration takes at most one item declaration")),
            },
            Json::Object(map) if map.contains_key("$type") || map.contains_key("$mix") => {
                self.directive(map, path)
            }
            Json::Object(map) => {
                let mut schema = SchemaMap::with_capacity(map.len());
                for (key, child) in map {
                    if key.starts_with('$') {
                        return Err(invalid(path, format!("\"{key}\" needs a \"$type\" or \"$mix\" next to it")));
                    }
                    schema.insert(key.clone(), self.node(child, &format!("{path}.{key}"))?);
                }
                Ok(Source::Object(schema))
            }
            Json::Null | Json::Bool(_) | Json::Number(_) => {
                Err(invalid(path, format!("{node} is not a declaration")))
            }
        }
    }

    fn directive(&self, map: &serde_json::Map<String, Json>, path: &str) -> Result<Source, DeclarationError> {
        if let Some(unknown) = map.keys().find(|key| !DIRECTIVES.contains(&key.as_str())) {
            return Err(invalid(path, format!("unknown directive \"{unknown}\"")));
        }

        let source = match (map.get("$type"), map.get("$mix")) {
            (Some(_), Some(_)) => return Err(invalid(path, "\"$type\" and \"$mix\" are exclusive")),
            (Some(ty), None) => self.node(ty, &format!("{path}.$type"))?,
            (None, Some(Json::Array(alternatives))) => Source::Mix(
                alternatives
                    .iter()
                    .enumerate()
                    .map(|(ix, alternative)| self.node(alternative, &format!("{path}.$mix[{ix}]")))
                    .collect::<Result<Vec<_>, DeclarationError>>()?,
            ),
            (None, Some(_)) => return Err(invalid(path, "\"$mix\" takes an array of alternatives")),
            (None, None) => return Err(invalid(path, "a directive needs \"$type\" or \"$mix\"")),
        };

        let options = options(map, path)?;
        let descriptor = self.guard.value(source, options).map_err(|source| compile_error(path.to_string(), source))?;
        Ok(Source::Described(descriptor))
    }
}

fn options(map: &serde_json::Map<String, Json>, path: &str) -> Result<Options, DeclarationError> {
    let mut options = Options::new();
    if let Some(required) = flag(map, "$required", path)? {
        options = options.required(required);
    }
    if flag(map, "$allowNull", path)? == Some(true) {
        options = options.allow_null();
    }
    if flag(map, "$matchOnce", path)? == Some(true) {
        options = options.match_once();
    }
    if let Some(default) = map.get("$default") {
        options = options.default_value(Value::from(default.clone()));
    }
    match map.get("$validator") {
        None => {}
        Some(Json::String(literal)) => options = options.pattern(validator_pattern(literal, path)?),
        Some(_) => return Err(invalid(path, "\"$validator\" must be a \"/.../\" pattern string")),
    }
    match map.get("$strategy") {
        None => {}
        Some(Json::String(name)) => {
            let strategy = name
                .parse::<Strategy>()
                .map_err(|source| compile_error(path.to_string(), source))?;
            options = options.strategy(strategy);
        }
        Some(_) => return Err(invalid(path, "\"$strategy\" must be a string")),
    }
    Ok(options)
}

fn flag(map: &serde_json::Map<String, Json>, key: &str, path: &str) -> Result<Option<bool>, DeclarationError> {
    match map.get(key) {
        None => Ok(None),
        Some(Json::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(invalid(path, format!("\"{key}\" must be a boolean"))),
    }
}

fn validator_pattern(literal: &str, path: &str) -> Result<Regex, DeclarationError> {
    let inner = literal
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
        .ok_or_else(|| invalid(path, format!("validator {literal:?} is not written as /.../")))?;
    Regex::new(inner).map_err(|err| invalid(path, format!("validator {literal:?}: {err}")))
}

fn model_path(name: &str) -> String {
    format!("models.{name}")
}

fn invalid(path: &str, message: impl Into<String>) -> DeclarationError {
    compile_error(path.to_string(), CompileError::InvalidSchema(message.into()))
}

fn compile_error(path: String, source: CompileError) -> DeclarationError {
    DeclarationError::Compile { path, source }
}
