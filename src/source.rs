//! The declaration vocabulary, normalized.
//!
//! Authors write type tokens, `[item]` arrays, keyed maps, unions, and class
//! markers. Every one of those forms becomes a [`Source`] before the compiler
//! sees it, so the compiler only ever branches on this enum.
use indexmap::IndexMap;

use crate::descriptor::Descriptor;
use crate::value::ClassRef;

/// Keyed mapping from property name (or `/^...$/` pattern) to declaration.
pub type SchemaMap = IndexMap<String, Source>;

#[derive(Clone, Debug)]
pub enum Source {
    /// A reserved primitive tag or the name of a registered shape.
    Type(String),
    /// A class marker; resolves to the owning shape when it is one.
    Class(ClassRef),
    /// Array of the element, or of anything when `None`.
    Array(Option<Box<Source>>),
    Object(SchemaMap),
    /// Alternatives of a union.
    Mix(Vec<Source>),
    /// Already compiled, e.g. the result of `value()`.
    Described(Descriptor),
}

impl Source {
    pub fn array_of(item: impl Into<Source>) -> Self {
        Source::Array(Some(Box::new(item.into())))
    }

    pub fn any_array() -> Self {
        Source::Array(None)
    }

    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Source)>,
    {
        Source::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<&str> for Source {
    fn from(token: &str) -> Self {
        Source::Type(token.to_string())
    }
}

impl From<String> for Source {
    fn from(token: String) -> Self {
        Source::Type(token)
    }
}

impl From<ClassRef> for Source {
    fn from(class: ClassRef) -> Self {
        Source::Class(class)
    }
}

impl From<&ClassRef> for Source {
    fn from(class: &ClassRef) -> Self {
        Source::Class(class.clone())
    }
}

impl From<SchemaMap> for Source {
    fn from(map: SchemaMap) -> Self {
        Source::Object(map)
    }
}

impl From<Descriptor> for Source {
    fn from(descriptor: Descriptor) -> Self {
        Source::Described(descriptor)
    }
}

/// Merge keyed maps left to right. A later key overwrites the value of an
/// earlier one but keeps the position where the key was first seen.
pub fn schema<I>(partials: I) -> SchemaMap
where
    I: IntoIterator<Item = SchemaMap>,
{
    let mut merged = SchemaMap::new();
    for partial in partials {
        for (key, source) in partial {
            merged.insert(key, source);
        }
    }
    merged
}

/// Collect alternatives into a union.
pub fn mix<I, S>(alternatives: I) -> Source
where
    I: IntoIterator<Item = S>,
    S: Into<Source>,
{
    Source::Mix(alternatives.into_iter().map(Into::into).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(source: &Source) -> &str {
        match source {
            Source::Type(token) => token,
            other => panic!("expected a type token, got {other:?}"),
        }
    }

    #[test]
    fn later_partials_overwrite_in_place() {
        let base = SchemaMap::from([("id".into(), "number".into()), ("name".into(), "string".into())]);
        let extra = SchemaMap::from([("tag".into(), "string".into()), ("id".into(), "bigint".into())]);
        let merged = schema([base, extra]);
        let keys: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(keys, ["id", "name", "tag"]);
        assert_eq!(token(&merged["id"]), "bigint");
    }

    #[test]
    fn mix_keeps_alternatives_in_order() {
        let Source::Mix(choices) = mix(["string", "number"]) else {
            panic!("expected a union");
        };
        assert_eq!(choices.iter().map(token).collect::<Vec<_>>(), ["string", "number"]);
    }
}
