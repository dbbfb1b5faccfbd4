//! Reserved vocabulary and the arena of named shapes.
//!
//! Shapes live in a `Vec` and are referred to by [`ShapeId`], an index tagged
//! with the registry that issued it. A model descriptor stores only the id, so
//! two shapes can refer to each other
//! without the compiler ever inlining one tree into the other. Each slot is
//! written once; a name can be reserved (forward-declared) before its
//! schema is compiled, which is what makes cyclic references possible.
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use crate::descriptor::{Descriptor, Strategy};
use crate::error::CompileError;
use crate::kind::Kind;
use crate::value::ClassRef;

/// Property names that may not be used as type or model names.
pub const RESERVED_NAMES: [&str; 13] = [
    "null",
    "undefined",
    "create",
    "check",
    "getName",
    "getDescription",
    "toObject",
    "toJSON",
    "length",
    "name",
    "arguments",
    "caller",
    "prototype",
];

static MODEL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9]|[a-zA-Z0-9][\w\-.]*[a-zA-Z0-9])$").expect("static pattern")
});

static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(1);

/// Index of a shape inside the [`Registry`] that issued it. Other registries
/// do not resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId {
    registry: u64,
    index: u32,
}

impl ShapeId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Clone)]
pub(crate) struct Slot {
    pub(crate) name: String,
    pub(crate) class: ClassRef,
    pub(crate) description: OnceCell<Descriptor>,
}

pub struct Registry {
    id: u64,
    names: IndexMap<String, ShapeId>,
    slots: Vec<Slot>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            id: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            names: IndexMap::new(),
            slots: Vec::new(),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy that answers to the same ids. Only meant to replace `self`
    /// once the copy's changes have all succeeded; two live forks would hand
    /// out clashing ids.
    pub(crate) fn fork(&self) -> Registry {
        Registry { id: self.id, names: self.names.clone(), slots: self.slots.clone() }
    }

    /// Was `id` issued by this registry?
    pub fn owns(&self, id: ShapeId) -> bool {
        id.registry == self.id && id.index() < self.slots.len()
    }

    /// Reserved primitive tag?
    pub fn is_type(token: &str) -> bool {
        Kind::from_token(token).is_some()
    }

    /// Reserved property name?
    pub fn is_reserved_name(token: &str) -> bool {
        RESERVED_NAMES.contains(&token)
    }

    pub fn strategies() -> [Strategy; 4] {
        Strategy::ALL
    }

    /// Check a prospective model name against the reserved vocabulary and the
    /// naming rule. Existing names are checked by [`Registry::declare`].
    pub fn validate_name(name: &str) -> Result<(), CompileError> {
        if Self::is_type(name) || Self::is_reserved_name(name) || !MODEL_NAME.is_match(name) {
            return Err(CompileError::InvalidModelName(name.to_string()));
        }
        Ok(())
    }

    /// Reserve `name`, returning its id. Declaring a name twice returns the
    /// same id as long as it has not been defined yet.
    pub fn declare(&mut self, name: &str) -> Result<ShapeId, CompileError> {
        if let Some(&id) = self.names.get(name) {
            if self.slots[id.index()].description.get().is_some() {
                return Err(CompileError::DuplicateModel(name.to_string()));
            }
            return Ok(id);
        }
        Self::validate_name(name)?;
        let id = self.id_at(self.slots.len());
        self.slots.push(Slot {
            name: name.to_string(),
            class: ClassRef::new(name),
            description: OnceCell::new(),
        });
        self.names.insert(name.to_string(), id);
        tracing::debug!(model = name, index = id.index(), "declared model");
        Ok(id)
    }

    /// Store the compiled description of a declared shape. Slots are
    /// write-once; ids from another registry are rejected.
    pub fn define(&mut self, id: ShapeId, description: Descriptor) -> Result<(), CompileError> {
        let slot = self.slot(id).ok_or(CompileError::MissingModel)?;
        slot.description
            .set(description)
            .map_err(|_| CompileError::DuplicateModel(slot.name.clone()))?;
        tracing::debug!(model = %slot.name, "defined model");
        Ok(())
    }

    /// Forget a declared-but-undefined shape, e.g. after its schema failed to
    /// compile. Only the most recent slot can be dropped, so ids stay stable.
    pub(crate) fn retract(&mut self, id: ShapeId) {
        let is_last = id.index() + 1 == self.slots.len();
        let undefined = self.slot(id).is_some_and(|slot| slot.description.get().is_none());
        if !is_last || !undefined {
            return;
        }
        if let Some(slot) = self.slots.pop() {
            self.names.shift_remove(&slot.name);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ShapeId> {
        self.names.get(name).copied()
    }

    /// The shape whose instances carry `class`.
    pub fn lookup_class(&self, class: &ClassRef) -> Option<ShapeId> {
        self.slots
            .iter()
            .position(|slot| &slot.class == class)
            .map(|index| self.id_at(index))
    }

    pub fn name(&self, id: ShapeId) -> Option<&str> {
        self.slot(id).map(|slot| slot.name.as_str())
    }

    pub fn class(&self, id: ShapeId) -> Option<&ClassRef> {
        self.slot(id).map(|slot| &slot.class)
    }

    /// `None` for unknown ids and for shapes that are declared but not yet
    /// defined.
    pub fn description(&self, id: ShapeId) -> Option<&Descriptor> {
        self.slot(id).and_then(|slot| slot.description.get())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    fn id_at(&self, index: usize) -> ShapeId {
        ShapeId { registry: self.id, index: index as u32 }
    }

    fn slot(&self, id: ShapeId) -> Option<&Slot> {
        if id.registry != self.id {
            return None;
        }
        self.slots.get(id.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Options, Ty};

    #[test]
    fn rejects_reserved_and_malformed_names() {
        for name in ["string", "mix", "prototype", "toJSON", "", "-lead", "trail.", "has space"] {
            assert!(
                matches!(Registry::validate_name(name), Err(CompileError::InvalidModelName(_))),
                "{name:?} should be rejected"
            );
        }
        for name in ["User", "a", "user-profile.v2", "x_1"] {
            assert!(Registry::validate_name(name).is_ok(), "{name:?} should be accepted");
        }
    }

    #[test]
    fn declare_is_idempotent_until_defined() {
        let mut registry = Registry::new();
        let a = registry.declare("A").unwrap();
        assert_eq!(registry.declare("A").unwrap(), a);
        assert!(registry.description(a).is_none());

        let object = Descriptor::new(Ty::Object { schema: None }, Options::new());
        registry.define(a, object.clone()).unwrap();
        assert!(registry.description(a).is_some());
        assert!(matches!(registry.declare("A"), Err(CompileError::DuplicateModel(_))));
        assert!(matches!(registry.define(a, object), Err(CompileError::DuplicateModel(_))));
    }

    #[test]
    fn classes_map_back_to_their_shape() {
        let mut registry = Registry::new();
        let a = registry.declare("A").unwrap();
        let b = registry.declare("B").unwrap();
        let class_b = registry.class(b).unwrap().clone();
        assert_eq!(registry.lookup_class(&class_b), Some(b));
        assert_eq!(registry.lookup_class(&ClassRef::new("B")), None);
        assert_eq!(registry.lookup("A"), Some(a));
        assert_eq!(registry.names().collect::<Vec<_>>(), ["A", "B"]);
    }

    #[test]
    fn retract_only_drops_the_undefined_tail() {
        let mut registry = Registry::new();
        let a = registry.declare("A").unwrap();
        let b = registry.declare("B").unwrap();
        registry.retract(a);
        assert_eq!(registry.len(), 2);
        registry.retract(b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("B"), None);
    }

    #[test]
    fn ids_only_resolve_in_their_own_registry() {
        let mut ours = Registry::new();
        let mut theirs = Registry::new();
        let a = ours.declare("A").unwrap();
        let b = theirs.declare("B").unwrap();
        assert_eq!(a.index(), b.index());

        assert!(ours.owns(a));
        assert!(!ours.owns(b));
        assert!(ours.name(b).is_none());
        assert!(ours.class(b).is_none());

        let object = Descriptor::new(Ty::Object { schema: None }, Options::new());
        assert!(matches!(ours.define(b, object.clone()), Err(CompileError::MissingModel)));
        assert!(ours.description(a).is_none(), "a foreign id must not fill our slot");
        ours.retract(b);
        assert_eq!(ours.len(), 1);
        theirs.define(b, object).unwrap();
    }
}
