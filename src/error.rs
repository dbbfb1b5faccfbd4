//! Error types for declaring shapes and operating on instances.
//!
//! Validation itself never fails: `matches`/`check` always answer with a
//! boolean. Everything here is either an authoring mistake caught while
//! compiling a declaration ([`CompileError`]) or a misuse of the facade at
//! runtime ([`Error`]).

use thiserror::Error;

use crate::kind::Kind;

/// Result type for facade operations
pub type Result<T> = std::result::Result<T, Error>;

/// Raised while compiling a declaration into a descriptor.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Unknown type or model \"{0}\".")]
    UnknownType(String),

    #[error("Forbidden to use reserved word \"{0}\" as a type or model name.")]
    ReservedWord(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Model name \"{0}\" is invalid.")]
    InvalidModelName(String),

    #[error("Model \"{0}\" already exists.")]
    DuplicateModel(String),

    #[error("A top level schema must be an object or an array, got {0}.")]
    TopLevelKind(Kind),

    #[error("A top level object or array cannot allow null.")]
    TopLevelNull,

    #[error("Pattern key \"{key}\" is invalid: {source}")]
    InvalidPatternKey {
        key: String,
        #[source]
        source: regex::Error,
    },

    #[error("A pattern validator can only be used with \"string\" and \"number\", not \"{0}\".")]
    PatternValidatorKind(Kind),

    #[error("A union must have at least one alternative.")]
    EmptyUnion,

    #[error("Type \"class\" requires a class marker.")]
    MissingClass,

    #[error("Type \"model\" requires a registered model.")]
    MissingModel,

    #[error("Unknown union strategy \"{0}\" (expected any, all, one or not).")]
    UnknownStrategy(String),
}

/// Facade errors
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Invalid object.")]
    InvalidObject,

    #[error("{}", not_an_instance(.model))]
    NotAnInstance { model: Option<String> },

    #[error("No shape registered under \"{0}\".")]
    UnknownShape(String),

    #[error("Key \"{key}\" is not declared by model \"{model}\".")]
    UndeclaredKey { model: String, key: String },

    #[error("Update of \"{key}\" rejected by model \"{model}\".")]
    RejectedUpdate { model: String, key: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn not_an_instance(model: &Option<String>) -> String {
    match model {
        Some(name) => format!("Object is not an instance of the model \"{name}\"."),
        None => "Object is not an instance of any model.".to_string(),
    }
}
