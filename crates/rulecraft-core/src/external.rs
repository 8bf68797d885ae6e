// SPDX-License-Identifier: Apache-2.0
//! External collaborator contracts.
//!
//! These traits are the seams the core hands off to; none are implemented
//! by the core beyond a no-op default, so `emit`/`spawn`/`destroy` are
//! no-ops until the host wires a real collaborator in.

use std::collections::BTreeMap;

use crate::error::EffectError;
use crate::value::Value;

/// Accepts emitted events. No delivery guarantees are specified by the
/// core.
pub trait EventSink: Send + Sync {
    /// Delivers `event_name` with `payload` to `recipient_id` (empty =
    /// broadcast/unspecified).
    fn emit(&self, event_name: &str, payload: &BTreeMap<String, Value>, recipient_id: &str);
}

/// No-op event sink used when the engine is constructed without one wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event_name: &str, _payload: &BTreeMap<String, Value>, _recipient_id: &str) {}
}

/// Constructs entities of a given type from a resolved field map.
pub trait EntityFactory: Send + Sync {
    /// Creates an entity of `entity_type` with the given field values.
    ///
    /// # Errors
    /// Returns an [`EffectError`] if the host rejects the spawn (e.g.
    /// unknown entity type).
    fn spawn(
        &self,
        entity_type: &str,
        fields: &BTreeMap<String, Value>,
    ) -> Result<Value, EffectError>;
}

/// No-op entity factory; `spawn` effects become inert when unwired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEntityFactory;

impl EntityFactory for NullEntityFactory {
    fn spawn(
        &self,
        _entity_type: &str,
        _fields: &BTreeMap<String, Value>,
    ) -> Result<Value, EffectError> {
        Ok(Value::Null)
    }
}

/// Removes entities from the host's collections.
pub trait EntityDestroyer: Send + Sync {
    /// Destroys every entity in `targets`.
    ///
    /// # Errors
    /// Returns an [`EffectError`] if the host cannot destroy one or more
    /// targets.
    fn destroy(&self, targets: &[Value]) -> Result<(), EffectError>;
}

/// No-op destroyer; `destroy` effects become inert when unwired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEntityDestroyer;

impl EntityDestroyer for NullEntityDestroyer {
    fn destroy(&self, _targets: &[Value]) -> Result<(), EffectError> {
        Ok(())
    }
}

/// Receives notifications about missing fields during filtering and about
/// individual predicate outcomes.
pub trait DebugHandler: Send + Sync {
    /// Called when a where-clause leaf references a field absent from the
    /// entity being tested (heterogeneous-entity "no match", not an error).
    fn missing_field(&self, entity_type: &str, field: &str) {
        let _ = (entity_type, field);
    }

    /// Called with the outcome of evaluating a single predicate leaf.
    fn predicate_outcome(&self, field: &str, matched: bool) {
        let _ = (field, matched);
    }
}

/// No-op debug handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDebugHandler;

impl DebugHandler for NullDebugHandler {}

/// Rule lifecycle control surface: `EnableRule` / `DisableRule` /
/// `EnableTrigger` / `DisableTrigger` / `ResetTimer`, each returning
/// whether the named rule was found.
pub trait RuleController: Send + Sync {
    /// Sets a rule's enabled flag. Returns `false` if no rule with that
    /// name is registered.
    fn enable_rule(&mut self, rule_name: &str, enabled: bool) -> bool;

    /// Sets a rule's trigger's enabled flag. Returns `false` if no rule
    /// with that name is registered.
    fn enable_trigger(&mut self, rule_name: &str, enabled: bool) -> bool;

    /// Clears a rule's trigger scratch state (timer start, wait-fired).
    /// Returns `false` if no rule with that name is registered.
    fn reset_timer(&mut self, rule_name: &str) -> bool;
}
