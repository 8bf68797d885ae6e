// SPDX-License-Identifier: Apache-2.0
//! The reflected state tree.
//!
//! The host's state is opaque to callers in the original source (reached by
//! runtime reflection over arbitrary structs). A Rust port has no equivalent
//! reflection story without an external derive, so `Value` plays the role
//! the source's reflected struct fields play: a tree of records, ordered
//! sequences, keyed mappings, and scalars that every other subsystem
//! navigates through [`crate::path`].
//!
//! Because the tree is owned (no pointers, no value/reference duality), the
//! usual slice-of-value-type mutation hazard does not arise here:
//! navigating to an element of a `Sequence` and mutating it through a
//! `&mut Value` always writes back into the parent collection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A typed record: an entity or sub-object carrying a `type_name` used by
/// the permission model to look up field write policies.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Schema type name (permission schema lookup key). Empty for anonymous
    /// records that carry no type (e.g. map-style substructures).
    pub type_name: String,
    /// Field values, keyed by field name.
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// Constructs a new, empty record of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }
}

/// A value in the reflected state tree.
///
/// Variants map directly onto the reflected tree's records, ordered
/// sequences, keyed mappings, and scalars: [`Value::Record`] is a typed
/// record,
/// [`Value::Map`] is an untyped keyed mapping (view `groupBy`/`map` output
/// has no schema type and is never permission-checked), [`Value::Sequence`]
/// is an ordered collection, and the remaining variants are scalars.
///
/// `Record` is listed before `Map` deliberately: untagged deserialization
/// tries variants in declaration order and keeps the first structural
/// match, and any JSON object deserializes successfully as a `Map`. Trying
/// `Record` first means a JSON object only becomes a typed record when it
/// actually carries both a `type_name` and a `fields` key; anything else
/// falls through to `Map`, instead of every object silently losing its
/// type (and with it, permission enforcement).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar. Distinguished from [`Value::Float`] so that path
    /// mutation can preserve a field's numeric kind.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar (also used for non-numeric identifiers such as entity
    /// `ID` fields).
    String(String),
    /// Ordered sequence (arrays, entity collections, card lists, ...).
    Sequence(Vec<Value>),
    /// Typed record (game entities, nested structs with an owner field).
    /// Tried before [`Value::Map`] so a `type_name`/`fields` JSON object
    /// deserializes as a record rather than an untyped mapping.
    Record(Record),
    /// Untyped keyed mapping (view aggregation output; never
    /// permission-checked because it carries no `type_name`).
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the schema type name of a [`Value::Record`], if any.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Value::Record(r) => Some(r.type_name.as_str()),
            _ => None,
        }
    }

    /// Looks up a field by name on a [`Value::Record`] or [`Value::Map`].
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(r) => r.fields.get(name),
            Value::Map(m) => m.get(name),
            _ => None,
        }
    }

    /// Mutable field lookup; see [`Value::field`].
    pub fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        match self {
            Value::Record(r) => r.fields.get_mut(name),
            Value::Map(m) => m.get_mut(name),
            _ => None,
        }
    }

    /// Inserts or overwrites a field on a [`Value::Record`] or
    /// [`Value::Map`]. No-op on any other variant.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        match self {
            Value::Record(r) => {
                r.fields.insert(name.into(), value);
            }
            Value::Map(m) => {
                m.insert(name.into(), value);
            }
            _ => {}
        }
    }

    /// Indexes a [`Value::Sequence`].
    #[must_use]
    pub fn index(&self, i: usize) -> Option<&Value> {
        match self {
            Value::Sequence(s) => s.get(i),
            _ => None,
        }
    }

    /// Mutable indexing; see [`Value::index`].
    pub fn index_mut(&mut self, i: usize) -> Option<&mut Value> {
        match self {
            Value::Sequence(s) => s.get_mut(i),
            _ => None,
        }
    }

    /// Returns the sequence backing this value, if any.
    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s.as_slice()),
            _ => None,
        }
    }

    /// Mutable sequence access; see [`Value::as_sequence`].
    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Coerces a scalar value to `f64`. Strings parse as numeric literals;
    /// bools coerce to `0.0`/`1.0`. Returns `None` for records, sequences,
    /// maps, null, and non-numeric strings.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Renders a value as a comparable string (used by `orderBy`'s
    /// lexicographic fallback, `distinct`, and string-operator comparisons).
    #[must_use]
    pub fn as_comparable_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Sequence(_) | Value::Map(_) | Value::Record(_) => format!("{self:?}"),
        }
    }

    /// Truthiness: nil/false/zero/empty-string are false; anything else
    /// (including empty sequences/maps/records) is true.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Sequence(_) | Value::Map(_) | Value::Record(_) => true,
        }
    }

    /// Constructs a float scalar.
    #[must_use]
    pub fn float(v: f64) -> Self {
        Value::Float(v)
    }

    /// Constructs a string scalar.
    #[must_use]
    pub fn string(v: impl Into<String>) -> Self {
        Value::String(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}
