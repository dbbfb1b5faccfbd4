//! Runtime shape declarations for dynamically typed values.
//!
//! A declaration (type tokens, `[item]` arrays, keyed maps with `/^...$/`
//! pattern keys, unions, references to other shapes) is compiled once into an
//! immutable [`Descriptor`] tree. Values are then checked against it as often
//! as needed, and registered shapes can build normalized instances and turn
//! them back into plain objects or JSON.
//!
//! ```
//! use shapeguard::{Guard, Options, Source, Value};
//! use serde_json::json;
//!
//! let mut guard = Guard::new();
//! let age = guard.value("number", Options::new().default_value(0)).unwrap();
//! guard
//!     .model("User", Source::object([("name", Source::from("string")), ("age", age.into())]))
//!     .unwrap();
//!
//! let user = guard.get("User").unwrap();
//! assert!(user.check(&Value::from(json!({ "name": "Ada", "age": 36 }))));
//! let created = user.create(json!({ "name": "Ada" })).unwrap();
//! assert_eq!(created.get("age"), Some(&Value::Number(0.0)));
//! ```
pub mod check;
pub mod cli;
pub mod compile;
pub mod convert;
pub mod declaration;
pub mod descriptor;
pub mod error;
pub mod guard;
pub mod jq_exec;
pub mod kind;
pub mod registry;
pub mod source;
pub mod value;

pub use convert::{JsonOptions, to_json};
pub use declaration::{DeclarationError, load};
pub use descriptor::{Descriptor, KeyMatcher, Options, Strategy};
pub use error::{CompileError, Error, Result};
pub use guard::{Guard, Shape};
pub use kind::{Kind, ValueKind, classify};
pub use registry::{Registry, ShapeId};
pub use source::{SchemaMap, Source, mix, schema};
pub use value::{ClassRef, Instance, Map, Value};
