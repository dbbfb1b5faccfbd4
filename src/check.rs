//! Structural matching of candidate values against descriptors.
//!
//! Matching never fails: it answers `true` or `false`. Recursion follows the
//! candidate, not the descriptor graph, so cyclic shape references terminate
//! as long as the candidate itself is a finite tree.
use indexmap::IndexSet;

use crate::descriptor::{Descriptor, KeyMatcher, Schema, Strategy, Ty};
use crate::kind::{ValueKind, classify};
use crate::registry::{Registry, ShapeId};
use crate::value::{Map, Value};

/// Matches values against descriptors issued by one registry.
#[derive(Clone, Copy)]
pub struct Checker<'r> {
    registry: &'r Registry,
}

impl<'r> Checker<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Does `value` (absent when `None`) satisfy `descriptor`?
    pub fn matches(&self, value: Option<&Value>, descriptor: &Descriptor) -> bool {
        let kind = classify(value);
        let Some(value) = value else {
            return false;
        };

        if kind.as_kind() == Some(descriptor.kind()) {
            let structural = match (value, descriptor.ty()) {
                (Value::Array(elements), Ty::Array { items: Some(items) }) => {
                    self.matches_elements(elements, items)
                }
                (_, Ty::Object { schema: Some(schema) }) => value
                    .fields()
                    .is_some_and(|fields| self.matches_fields(fields, schema, descriptor.match_once())),
                _ => true,
            };
            return structural && descriptor.is_valid(value);
        }

        if kind == ValueKind::Null {
            return descriptor.allow_null();
        }

        let accepted = match descriptor.ty() {
            Ty::Any => true,
            Ty::Class(class) => matches!(value, Value::Instance(instance) if instance.is_instance_of(class)),
            Ty::Model(id) => self.check_shape(*id, value),
            Ty::Mix { choices, strategy } => {
                let hit = choices.iter().any(|choice| self.matches(Some(value), choice));
                (*strategy != Strategy::Not) == hit
            }
            _ => false,
        };
        accepted && descriptor.is_valid(value)
    }

    /// A shape's own check: its instances pass outright, anything else is
    /// matched against its description. Declared-but-undefined shapes accept
    /// nothing but their instances.
    pub fn check_shape(&self, id: ShapeId, value: &Value) -> bool {
        if let (Value::Instance(instance), Some(class)) = (value, self.registry.class(id)) {
            if instance.class() == class {
                return true;
            }
        }
        self.registry
            .description(id)
            .is_some_and(|description| self.matches(Some(value), description))
    }

    fn matches_elements(&self, elements: &[Value], items: &Descriptor) -> bool {
        let Ty::Mix { choices, strategy } = items.ty() else {
            return elements.iter().all(|element| self.matches(Some(element), items));
        };
        let hits = |element: &Value| choices.iter().any(|choice| self.matches(Some(element), choice));
        match strategy {
            Strategy::Any => elements.iter().all(hits),
            Strategy::Not => !elements.iter().any(hits),
            Strategy::One => choices
                .iter()
                .any(|choice| elements.iter().all(|element| self.matches(Some(element), choice))),
            Strategy::All => {
                let mut covered = vec![false; choices.len()];
                for element in elements {
                    let mut hit = false;
                    for (index, choice) in choices.iter().enumerate() {
                        if self.matches(Some(element), choice) {
                            covered[index] = true;
                            hit = true;
                        }
                    }
                    if !hit {
                        return false;
                    }
                }
                covered.into_iter().all(|used| used)
            }
        }
    }

    fn matches_fields(&self, fields: &Map, schema: &Schema, match_once: bool) -> bool {
        let mut remaining: IndexSet<&str> = fields.keys().map(String::as_str).collect();

        for (matcher, nested) in schema {
            match matcher {
                KeyMatcher::Exact(key) => {
                    if remaining.shift_remove(key.as_str()) {
                        if !self.matches(fields.get(key), nested) {
                            return false;
                        }
                    } else if !nested.tolerates_absence() {
                        return false;
                    }
                }
                KeyMatcher::Pattern(pattern) => {
                    let mut candidates = remaining.iter().copied().filter(|key| pattern.is_match(key));
                    let matched: Vec<&str> = if match_once {
                        candidates.next().into_iter().collect()
                    } else {
                        candidates.collect()
                    };
                    if matched.is_empty() {
                        if !nested.tolerates_absence() {
                            return false;
                        }
                        continue;
                    }
                    for key in matched {
                        if !self.matches(fields.get(key), nested) {
                            return false;
                        }
                        remaining.shift_remove(key);
                    }
                }
            }
        }

        // closed objects: every candidate key must be accounted for
        remaining.is_empty()
    }
}
