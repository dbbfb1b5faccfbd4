//! The public facade.
//!
//! A [`Guard`] owns one registry. Shapes are registered through `&mut Guard`
//! and then checked, created, and converted through `&Guard`, so a fully
//! registered guard can be shared across threads.
use crate::check::Checker;
use crate::compile::Compiler;
use crate::convert::{Converter, JsonOptions};
use crate::descriptor::{Descriptor, Options};
use crate::error::{CompileError, Error, Result};
use crate::registry::{Registry, ShapeId};
use crate::source::{self, SchemaMap, Source};
use crate::value::{ClassRef, Instance, Value};

#[derive(Default)]
pub struct Guard {
    registry: Registry,
}

impl Guard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Staging copy for all-or-nothing registration; see [`Registry::fork`].
    pub(crate) fn fork(&self) -> Guard {
        Guard { registry: self.registry.fork() }
    }

    /// See [`source::schema`].
    pub fn schema<I>(partials: I) -> SchemaMap
    where
        I: IntoIterator<Item = SchemaMap>,
    {
        source::schema(partials)
    }

    /// See [`source::mix`].
    pub fn mix<I, S>(alternatives: I) -> Source
    where
        I: IntoIterator<Item = S>,
        S: Into<Source>,
    {
        source::mix(alternatives)
    }

    /// Compile a standalone descriptor without registering anything.
    pub fn value(&self, source: impl Into<Source>, options: Options) -> std::result::Result<Descriptor, CompileError> {
        Compiler::new(&self.registry).compile(source.into(), options)
    }

    /// Reserve a shape name so other schemas can refer to it before it is
    /// defined.
    pub fn declare(&mut self, name: &str) -> std::result::Result<ShapeId, CompileError> {
        self.registry.declare(name)
    }

    /// Register a shape. The name is reserved before the schema compiles, so
    /// a schema may refer to its own shape.
    pub fn model(&mut self, name: &str, schema: impl Into<Source>) -> std::result::Result<ShapeId, CompileError> {
        let was_declared = self.registry.lookup(name).is_some();
        let id = self.registry.declare(name)?;
        let compiled = Compiler::new(&self.registry).compile_top_level(schema.into());
        let description = match compiled {
            Ok(description) => description,
            Err(error) => {
                if !was_declared {
                    self.registry.retract(id);
                }
                return Err(error);
            }
        };
        self.registry.define(id, description)?;
        tracing::debug!(model = name, "registered model");
        Ok(id)
    }

    /// A defined shape; `None` for unknown or only declared ids.
    pub fn shape(&self, id: ShapeId) -> Option<Shape<'_>> {
        Some(Shape {
            guard: self,
            id,
            name: self.registry.name(id)?,
            class: self.registry.class(id)?,
            description: self.registry.description(id)?,
        })
    }

    pub fn get(&self, name: &str) -> Option<Shape<'_>> {
        self.shape(self.registry.lookup(name)?)
    }

    /// The shape that created `instance`.
    pub fn shape_of(&self, instance: &Instance) -> Option<Shape<'_>> {
        self.shape(self.registry.lookup_class(instance.class())?)
    }

    /// Match a value against a descriptor compiled by this guard.
    pub fn matches(&self, value: &Value, descriptor: &Descriptor) -> bool {
        Checker::new(&self.registry).matches(Some(value), descriptor)
    }

    pub fn to_object(&self, instance: &Instance) -> Result<Value> {
        let shape = self.shape_of(instance).ok_or(Error::NotAnInstance { model: None })?;
        shape.to_object(instance)
    }

    pub fn to_json(&self, instance: &Instance, options: JsonOptions) -> Result<String> {
        let shape = self.shape_of(instance).ok_or(Error::NotAnInstance { model: None })?;
        shape.to_json(instance, options)
    }
}

/// A registered shape, borrowed from its [`Guard`].
#[derive(Clone, Copy)]
pub struct Shape<'g> {
    guard: &'g Guard,
    id: ShapeId,
    name: &'g str,
    class: &'g ClassRef,
    description: &'g Descriptor,
}

impl<'g> Shape<'g> {
    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn name(&self) -> &'g str {
        self.name
    }

    pub fn description(&self) -> &'g Descriptor {
        self.description
    }

    /// The class carried by every instance of this shape.
    pub fn class(&self) -> &'g ClassRef {
        self.class
    }

    /// Instances of this shape are valid without being re-checked.
    pub fn check(&self, candidate: &Value) -> bool {
        self.checker().check_shape(self.id, candidate)
    }

    /// Validate, then construct: defaults applied, undeclared keys dropped,
    /// nested shape values turned into instances of their shapes.
    pub fn create(&self, candidate: impl Into<Value>) -> Result<Instance> {
        let candidate = candidate.into();
        if !self.check(&candidate) {
            return Err(Error::InvalidObject);
        }
        if let Value::Instance(instance) = &candidate {
            if instance.class() == self.class {
                return Ok(instance.clone());
            }
        }
        let fields = self.converter().build_fields(&candidate, self.description);
        Ok(Instance::new(self.class.clone(), fields))
    }

    pub fn to_object(&self, instance: &Instance) -> Result<Value> {
        self.owns(instance)?;
        Ok(self.converter().to_plain_object(instance, self.description))
    }

    pub fn to_json(&self, instance: &Instance, options: JsonOptions) -> Result<String> {
        self.owns(instance)?;
        Ok(self.converter().to_json_text(instance, self.description, options)?)
    }

    /// Set one key on an instance. The change is staged, the whole instance
    /// is re-checked, and the change is committed only if the check passes;
    /// otherwise the instance is left untouched.
    pub fn update(&self, instance: &mut Instance, key: &str, value: impl Into<Value>) -> Result<()> {
        self.owns(instance)?;
        let Some(nested) = self.description.describe_key(key) else {
            return Err(Error::UndeclaredKey { model: self.name.to_string(), key: key.to_string() });
        };
        let value = value.into();

        let mut staged = instance.fields().clone();
        staged.insert(key.to_string(), value.clone());
        let staged = Value::Object(staged);
        if !self.checker().matches(Some(&staged), self.description) {
            tracing::debug!(model = self.name, key, "rejected update");
            return Err(Error::RejectedUpdate { model: self.name.to_string(), key: key.to_string() });
        }

        if let Value::Object(mut committed) = staged {
            committed.insert(key.to_string(), self.converter().build_value(&value, nested));
            instance.replace_fields(committed);
        }
        Ok(())
    }

    fn owns(&self, instance: &Instance) -> Result<()> {
        if instance.class() == self.class {
            Ok(())
        } else {
            Err(Error::NotAnInstance { model: Some(self.name.to_string()) })
        }
    }

    fn checker(&self) -> Checker<'g> {
        Checker::new(&self.guard.registry)
    }

    fn converter(&self) -> Converter<'g> {
        Converter::new(&self.guard.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Strategy;
    use crate::kind::Kind;
    use serde_json::json;

    fn json(value: serde_json::Value) -> Value {
        Value::from(value)
    }

    /// The `User`/`Child` pair: nested arrays of objects, validators,
    /// optional keys, defaults, nullable model references and pattern keys.
    fn family() -> (Guard, ShapeId, ShapeId) {
        let mut guard = Guard::new();
        let age = guard
            .value("number", Options::new().validator(|n| Ok(n.as_f64().is_some_and(|n| n > 0.0 && n < 99.0))))
            .unwrap();
        let adult = guard.value("boolean", Options::new().optional()).unwrap();
        let user = guard
            .model(
                "User",
                Source::object([
                    ("name", "string".into()),
                    ("age", "number".into()),
                    ("children", Source::array_of(Source::object([("name", "string".into()), ("age", age.into())]))),
                    ("18+", adult.into()),
                ]),
            )
            .unwrap();

        let greeting = guard.value("string", Options::new().default_value("Hello, world!")).unwrap();
        let parent = guard.value("User", Options::new().allow_null()).unwrap();
        let wild = guard.value("any", Options::new().allow_null()).unwrap();
        let child = guard
            .model(
                "Child",
                Source::object([
                    ("requiredKeyWithDefaultValue", greeting.into()),
                    ("firstborn", "boolean".into()),
                    ("wildArray", Source::array_of(wild)),
                    ("parents", Source::array_of(parent)),
                    ("/^RegExp.+$/", "string".into()),
                ]),
            )
            .unwrap();
        (guard, user, child)
    }

    #[test]
    fn create_checks_then_builds() {
        let (guard, user, _) = family();
        let user = guard.shape(user).unwrap();
        let jon = user
            .create(json(json!({"name": "Jon Doe", "age": 23, "children": [{"name": "Ellen", "age": 1}]})))
            .unwrap();
        assert_eq!(jon.get("name"), Some(&Value::from("Jon Doe")));
        assert!(user.check(&Value::Instance(jon.clone())));

        let too_old = json(json!({"name": "X", "age": 23, "children": [{"name": "Y", "age": 120}]}));
        assert!(matches!(user.create(too_old), Err(Error::InvalidObject)));
    }

    #[test]
    fn nested_shapes_become_instances_and_defaults_apply() {
        let (guard, user, child) = family();
        let user = guard.shape(user).unwrap();
        let child = guard.shape(child).unwrap();
        let marian = user.create(json(json!({"name": "Marian", "age": 20, "children": [], "18+": false}))).unwrap();

        let mut candidate = json(json!({
            "firstborn": false,
            "wildArray": [1, 4, 6, {"a": 7}, null, null, [[1]]],
            "parents": [{"name": "Jon", "age": 23, "children": []}, null],
            "RegExpKeysWorks": "Yeahhh!"
        }));
        if let Value::Object(fields) = &mut candidate {
            let Some(Value::Array(parents)) = fields.get_mut("parents") else { unreachable!() };
            parents.push(Value::Instance(marian.clone()));
        }
        let ellen = child.create(candidate).unwrap();
        assert_eq!(ellen.get("requiredKeyWithDefaultValue"), Some(&Value::from("Hello, world!")));
        let Some(Value::Array(parents)) = ellen.get("parents") else {
            panic!("parents must be an array");
        };
        assert!(matches!(&parents[0], Value::Instance(i) if i.class() == user.class()));
        assert_eq!(parents[1], Value::Null);
        assert_eq!(parents[2], Value::Instance(marian));
        assert_eq!(ellen.get("RegExpKeysWorks"), Some(&Value::from("Yeahhh!")));
    }

    #[test]
    fn required_key_without_default_fails_with_default_succeeds() {
        let mut guard = Guard::new();
        let strict = guard.model("Strict", Source::object([("label", "string".into())])).unwrap();
        let label = guard.value("string", Options::new().default_value("untitled")).unwrap();
        let lenient = guard.model("Lenient", Source::object([("label", label.into())])).unwrap();

        assert!(!guard.shape(strict).unwrap().check(&json(json!({}))));
        let lenient = guard.shape(lenient).unwrap();
        let created = lenient.create(json(json!({}))).unwrap();
        assert_eq!(lenient.to_object(&created).unwrap(), json(json!({"label": "untitled"})));
    }

    #[test]
    fn cyclic_models_compile_and_check() {
        let mut guard = Guard::new();
        guard.declare("B").unwrap();
        let a = guard.model("A", Source::object([("child", "B".into())])).unwrap();
        let parent = guard.value("A", Options::new().allow_null()).unwrap();
        guard.model("B", Source::object([("parent", parent.into())])).unwrap();
        let a = guard.shape(a).unwrap();
        assert!(a.check(&json(json!({"child": {"parent": null}}))));
        assert!(!a.check(&json(json!({"child": null}))));
    }

    #[test]
    fn self_referencing_model_needs_no_declaration() {
        let mut guard = Guard::new();
        let node = guard
            .model("Node", Source::object([("value", "number".into()), ("next", Guard::mix(["Node", "string"]))]))
            .unwrap();
        let node = guard.shape(node).unwrap();
        assert!(node.check(&json(json!({"value": 1, "next": {"value": 2, "next": "end"}}))));
        assert!(!node.check(&json(json!({"value": 1, "next": {"value": "2", "next": "end"}}))));
    }

    #[test]
    fn names_are_validated() {
        let mut guard = Guard::new();
        let object = || Source::object([("a", "number".into())]);
        assert!(matches!(guard.model("string", object()), Err(CompileError::InvalidModelName(_))));
        assert!(matches!(guard.model("prototype", object()), Err(CompileError::InvalidModelName(_))));
        guard.model("Thing", object()).unwrap();
        assert!(matches!(guard.model("Thing", object()), Err(CompileError::DuplicateModel(_))));
    }

    #[test]
    fn failed_models_leave_no_trace() {
        let mut guard = Guard::new();
        assert!(matches!(guard.model("Scalar", "string"), Err(CompileError::TopLevelKind(Kind::String))));
        assert!(guard.registry().lookup("Scalar").is_none());
        assert!(guard.model("Scalar", Source::object([("a", "number".into())])).is_ok());
    }

    #[test]
    fn round_trip_through_plain_objects() {
        let (guard, user, child) = family();
        let child = guard.shape(child).unwrap();
        let created = child
            .create(json(json!({
                "requiredKeyWithDefaultValue": "Hi",
                "firstborn": true,
                "wildArray": [],
                "parents": [{"name": "Jon", "age": 23, "children": [{"name": "Ellen", "age": 1}]}],
                "RegExpA": "a"
            })))
            .unwrap();
        let plain = guard.to_object(&created).unwrap();
        assert!(child.check(&plain));
        assert_eq!(
            plain.get("parents"),
            Some(&json(json!([{"name": "Jon", "age": 23, "children": [{"name": "Ellen", "age": 1}]}]))),
            "nested instances flatten to plain objects"
        );
        assert!(guard.shape(user).unwrap().to_object(&created).is_err());
    }

    #[test]
    fn to_json_locates_the_owning_shape() {
        let (guard, user, _) = family();
        let user = guard.shape(user).unwrap();
        let jon = user.create(json(json!({"name": "Jon", "age": 23, "children": [], "extra": 1})));
        assert!(jon.is_err(), "undeclared keys fail the check");
        let jon = user.create(json(json!({"name": "Jon", "age": 23, "children": []}))).unwrap();
        assert_eq!(
            guard.to_json(&jon, JsonOptions::default()).unwrap(),
            r#"{"name":"Jon","age":23,"children":[]}"#
        );
        let stranger = Instance::new(ClassRef::new("User"), Default::default());
        assert!(matches!(guard.to_json(&stranger, JsonOptions::default()), Err(Error::NotAnInstance { model: None })));
    }

    #[test]
    fn staged_updates_commit_or_roll_back() {
        let (guard, user, _) = family();
        let user = guard.shape(user).unwrap();
        let mut jon = user.create(json(json!({"name": "Jon", "age": 23, "children": []}))).unwrap();

        user.update(&mut jon, "age", 24).unwrap();
        assert_eq!(jon.get("age"), Some(&Value::Number(24.0)));

        assert!(matches!(user.update(&mut jon, "age", "old"), Err(Error::RejectedUpdate { .. })));
        assert_eq!(jon.get("age"), Some(&Value::Number(24.0)), "rejected updates roll back");

        assert!(matches!(user.update(&mut jon, "nickname", "J"), Err(Error::UndeclaredKey { .. })));
        user.update(&mut jon, "18+", true).unwrap();
        assert_eq!(jon.get("18+"), Some(&Value::Bool(true)));
    }

    #[test]
    fn array_shaped_models() {
        let mut guard = Guard::new();
        let items = Guard::mix(["number", "string"]);
        let choices = guard.value(items, Options::new().strategy(Strategy::All)).unwrap();
        let pair = guard.model("Pair", Source::array_of(choices)).unwrap();
        let pair = guard.shape(pair).unwrap();
        assert!(pair.check(&json(json!([1, "a"]))));
        assert!(!pair.check(&json(json!([1, 2]))));
        let created = pair.create(json(json!(["a", 1]))).unwrap();
        assert!(pair.check(&Value::Instance(created.clone())));
        assert_eq!(pair.to_object(&created).unwrap(), json(json!(["a", 1])));
    }

    #[test]
    fn descriptors_stay_bound_to_their_guard() {
        let mut ours = Guard::new();
        ours.model("User", Source::object([("name", "string".into())])).unwrap();
        let user = ours.value("User", Options::new()).unwrap();
        let mut theirs = Guard::new();
        theirs.model("Point", Source::object([("x", "number".into())])).unwrap();

        assert!(ours.matches(&json(json!({"name": "Ada"})), &user));
        assert!(!theirs.matches(&json(json!({"x": 1})), &user), "same slot index, different guard");
        assert!(!theirs.matches(&json(json!({"name": "Ada"})), &user));
        assert!(matches!(
            theirs.model("Wrapper", Source::object([("user", user.into())])),
            Err(CompileError::MissingModel)
        ));
        assert!(theirs.get("Wrapper").is_none());
    }

    #[test]
    fn one_guard_checks_from_many_threads() {
        use rayon::prelude::*;

        let (guard, user, _) = family();
        let user = guard.shape(user).unwrap();
        let verdicts: Vec<bool> = (0..64)
            .into_par_iter()
            .map(|age| user.check(&json(json!({"name": "T", "age": age, "children": [{"name": "c", "age": age}]}))))
            .collect();
        assert!(!verdicts[0], "children must be older than zero");
        assert!(verdicts[1..].iter().all(|passed| *passed));
    }

    #[test]
    fn guards_are_shareable_across_threads() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<Guard>();
        assert_sync::<Descriptor>();
        assert_sync::<Value>();
    }
}
