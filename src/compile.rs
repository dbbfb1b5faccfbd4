//! Declaration → descriptor compiler.
//!
//! Resolves type tokens against the reserved vocabulary and the registry,
//! compiles `/^...$/` keys into patterns, and checks option combinations.
//! Names of shapes resolve to `Ty::Model(id)` handles; the referenced tree is
//! never copied in.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::descriptor::{Descriptor, KeyMatcher, Options, Schema, Ty, Validator};
use crate::error::CompileError;
use crate::kind::Kind;
use crate::registry::Registry;
use crate::source::{SchemaMap, Source};

/// Keys written as `/^...$/` are patterns.
static PATTERN_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/\^.*\$/$").expect("static pattern"));

pub struct Compiler<'r> {
    registry: &'r Registry,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Compile a schema that will back a shape: it must be an object or an
    /// array, and must not accept null.
    pub fn compile_top_level(&self, source: Source) -> Result<Descriptor, CompileError> {
        let description = self.compile(source, Options::new())?;
        match description.kind() {
            Kind::Object | Kind::Array => {}
            other => return Err(CompileError::TopLevelKind(other)),
        }
        if description.allow_null() {
            return Err(CompileError::TopLevelNull);
        }
        Ok(description)
    }

    pub fn compile(&self, source: Source, options: Options) -> Result<Descriptor, CompileError> {
        let ty = match source {
            Source::Described(descriptor) => {
                self.ensure_local(&descriptor)?;
                return Ok(descriptor);
            }
            Source::Type(token) => self.resolve_token(&token)?,
            Source::Class(class) => match self.registry.lookup_class(&class) {
                Some(id) => Ty::Model(id),
                None => Ty::Class(class),
            },
            Source::Array(item) => {
                let items = match item {
                    Some(item) => Some(Box::new(self.compile(*item, Options::new())?)),
                    None => None,
                };
                Ty::Array { items }
            }
            Source::Object(map) => Ty::Object { schema: self.compile_schema(map)? },
            Source::Mix(alternatives) => {
                if alternatives.is_empty() {
                    return Err(CompileError::EmptyUnion);
                }
                let choices = alternatives
                    .into_iter()
                    .map(|alternative| self.compile(alternative, Options::new()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ty::Mix { choices, strategy: options.strategy.unwrap_or_default() }
            }
        };

        if let Some(Validator::Pattern(_)) = &options.validator {
            let kind = ty.kind();
            if !matches!(kind, Kind::String | Kind::Number) {
                return Err(CompileError::PatternValidatorKind(kind));
            }
        }

        Ok(Descriptor::new(ty, options))
    }

    fn resolve_token(&self, token: &str) -> Result<Ty, CompileError> {
        if let Some(id) = self.registry.lookup(token) {
            return Ok(Ty::Model(id));
        }
        if Registry::is_reserved_name(token) {
            return Err(CompileError::ReservedWord(token.to_string()));
        }
        let Some(kind) = Kind::from_token(token) else {
            return Err(CompileError::UnknownType(token.to_string()));
        };
        let ty = match kind {
            Kind::Any => Ty::Any,
            Kind::Boolean => Ty::Boolean,
            Kind::Number => Ty::Number,
            Kind::BigInt => Ty::BigInt,
            Kind::String => Ty::String,
            Kind::Date => Ty::Date,
            Kind::Symbol => Ty::Symbol,
            Kind::RegExp => Ty::RegExp,
            Kind::Function => Ty::Function,
            Kind::Array => Ty::Array { items: None },
            Kind::Object => Ty::Object { schema: None },
            Kind::Class => return Err(CompileError::MissingClass),
            Kind::Model => return Err(CompileError::MissingModel),
            Kind::Mix => return Err(CompileError::EmptyUnion),
        };
        Ok(ty)
    }

    /// A pre-compiled descriptor may only refer to shapes of this registry.
    fn ensure_local(&self, descriptor: &Descriptor) -> Result<(), CompileError> {
        match descriptor.ty() {
            Ty::Model(id) if !self.registry.owns(*id) => Err(CompileError::MissingModel),
            Ty::Array { items: Some(items) } => self.ensure_local(items),
            Ty::Object { schema: Some(schema) } => {
                schema.iter().try_for_each(|(_, nested)| self.ensure_local(nested))
            }
            Ty::Mix { choices, .. } => choices.iter().try_for_each(|choice| self.ensure_local(choice)),
            _ => Ok(()),
        }
    }

    fn compile_schema(&self, map: SchemaMap) -> Result<Option<Schema>, CompileError> {
        if map.is_empty() {
            return Ok(None);
        }
        let mut schema = Schema::with_capacity(map.len());
        for (key, source) in map {
            let matcher = compile_key(key)?;
            let descriptor = self.compile(source, Options::new())?;
            schema.push((matcher, descriptor));
        }
        Ok(Some(schema))
    }
}

fn compile_key(key: String) -> Result<KeyMatcher, CompileError> {
    if !PATTERN_KEY.is_match(&key) {
        return Ok(KeyMatcher::Exact(key));
    }
    // strip the surrounding slashes, keep the anchors
    let inner = &key[1..key.len() - 1];
    match Regex::new(inner) {
        Ok(pattern) => Ok(KeyMatcher::Pattern(pattern)),
        Err(source) => Err(CompileError::InvalidPatternKey { key, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Strategy;
    use crate::source::mix;
    use crate::value::ClassRef;

    fn compile(registry: &Registry, source: impl Into<Source>) -> Result<Descriptor, CompileError> {
        Compiler::new(registry).compile(source.into(), Options::new())
    }

    #[test]
    fn primitive_tokens_compile_to_their_kind() {
        let registry = Registry::new();
        for token in ["any", "boolean", "number", "bigint", "string", "date", "symbol", "regexp", "function"] {
            let descriptor = compile(&registry, token).unwrap();
            assert_eq!(descriptor.kind().token(), token);
            assert!(descriptor.required());
            assert!(!descriptor.allow_null());
        }
        assert!(compile(&registry, "array").unwrap().items().is_none());
        assert!(compile(&registry, "object").unwrap().schema().is_none());
    }

    #[test]
    fn bad_tokens_are_distinguished() {
        let registry = Registry::new();
        assert!(matches!(compile(&registry, "prototype"), Err(CompileError::ReservedWord(_))));
        assert!(matches!(compile(&registry, "integer"), Err(CompileError::UnknownType(_))));
        assert!(matches!(compile(&registry, "class"), Err(CompileError::MissingClass)));
        assert!(matches!(compile(&registry, "model"), Err(CompileError::MissingModel)));
        assert!(matches!(compile(&registry, "mix"), Err(CompileError::EmptyUnion)));
        assert!(matches!(compile(&registry, Source::Mix(vec![])), Err(CompileError::EmptyUnion)));
    }

    #[test]
    fn registered_names_and_classes_become_model_handles() {
        let mut registry = Registry::new();
        let user = registry.declare("User").unwrap();
        let class = registry.class(user).unwrap().clone();

        let by_name = compile(&registry, "User").unwrap();
        assert!(matches!(by_name.ty(), Ty::Model(id) if *id == user));
        let by_class = compile(&registry, class).unwrap();
        assert!(matches!(by_class.ty(), Ty::Model(id) if *id == user));

        let foreign = compile(&registry, ClassRef::new("User")).unwrap();
        assert_eq!(foreign.kind(), Kind::Class);
    }

    #[test]
    fn object_keys_split_into_exact_and_pattern() {
        let registry = Registry::new();
        let source = Source::object([
            ("id", Source::from("number")),
            ("/^x-.+$/", Source::from("string")),
            ("/not-a-pattern/", Source::from("string")),
        ]);
        let descriptor = compile(&registry, source).unwrap();
        let schema = descriptor.schema().unwrap();
        assert!(matches!(&schema[0].0, KeyMatcher::Exact(k) if k == "id"));
        assert!(matches!(&schema[1].0, KeyMatcher::Pattern(p) if p.as_str() == "^x-.+$"));
        assert!(matches!(&schema[2].0, KeyMatcher::Exact(k) if k == "/not-a-pattern/"));

        let empty = compile(&registry, Source::Object(SchemaMap::new())).unwrap();
        assert!(empty.schema().is_none(), "empty maps carry no shape constraint");
    }

    #[test]
    fn invalid_pattern_keys_fail() {
        let registry = Registry::new();
        let source = Source::object([("/^(unclosed$/", Source::from("string"))]);
        assert!(matches!(
            compile(&registry, source),
            Err(CompileError::InvalidPatternKey { key, .. }) if key == "/^(unclosed$/"
        ));
    }

    #[test]
    fn pattern_validators_only_on_strings_and_numbers() {
        let registry = Registry::new();
        let compiler = Compiler::new(&registry);
        let digits = Regex::new(r"^\d+$").unwrap();
        assert!(compiler.compile("number".into(), Options::new().pattern(digits.clone())).is_ok());
        assert!(compiler.compile("string".into(), Options::new().pattern(digits.clone())).is_ok());
        assert!(matches!(
            compiler.compile("boolean".into(), Options::new().pattern(digits)),
            Err(CompileError::PatternValidatorKind(Kind::Boolean))
        ));
        let predicate = Options::new().validator(|_| Ok(true));
        assert!(compiler.compile("boolean".into(), predicate).is_ok());
    }

    #[test]
    fn unions_take_their_strategy_from_options() {
        let registry = Registry::new();
        let compiler = Compiler::new(&registry);
        let union = compiler
            .compile(mix(["string", "number"]), Options::new().strategy(Strategy::One))
            .unwrap();
        let Ty::Mix { choices, strategy } = union.ty() else {
            panic!("expected a union");
        };
        assert_eq!(choices.len(), 2);
        assert_eq!(*strategy, Strategy::One);
        let defaulted = compiler.compile(mix(["string"]), Options::new()).unwrap();
        assert!(matches!(defaulted.ty(), Ty::Mix { strategy: Strategy::Any, .. }));
    }

    #[test]
    fn top_level_must_be_a_non_null_container() {
        let registry = Registry::new();
        let compiler = Compiler::new(&registry);
        assert!(matches!(
            compiler.compile_top_level("string".into()),
            Err(CompileError::TopLevelKind(Kind::String))
        ));
        let nullable = compiler.compile("object".into(), Options::new().allow_null()).unwrap();
        assert!(matches!(compiler.compile_top_level(nullable.into()), Err(CompileError::TopLevelNull)));
        assert!(compiler.compile_top_level(Source::array_of("number")).is_ok());
    }

    #[test]
    fn described_sources_pass_through() {
        let registry = Registry::new();
        let compiler = Compiler::new(&registry);
        let optional = compiler.compile("string".into(), Options::new().optional()).unwrap();
        let again = compiler.compile(optional.into(), Options::new().allow_null()).unwrap();
        assert!(!again.required());
        assert!(!again.allow_null(), "options on a compiled source are ignored");
    }

    #[test]
    fn described_sources_from_another_registry_are_rejected() {
        let mut ours = Registry::new();
        let mut theirs = Registry::new();
        ours.declare("Point").unwrap();
        theirs.declare("User").unwrap();
        let foreign = compile(&theirs, Source::array_of("User")).unwrap();
        assert!(matches!(compile(&ours, foreign), Err(CompileError::MissingModel)));

        let local = compile(&ours, Source::array_of("Point")).unwrap();
        assert!(compile(&ours, local).is_ok());
    }
}
