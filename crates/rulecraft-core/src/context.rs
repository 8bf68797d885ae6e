// SPDX-License-Identifier: Apache-2.0
//! The per-evaluation context.
//!
//! One [`EvalContext`] is built fresh per tick or event; "derived" contexts
//! (`with_entity`, `with_event`, `with_sender`) are created by reborrowing
//! the same `&mut Value` state rather than cloning it, so every derived
//! context still ultimately mutates the one tree the engine owns.

use std::cell::RefCell;
use std::collections::BTreeMap;

use rand::rngs::StdRng;

use crate::clock::Clock;
use crate::error::{EffectError, PathError};
use crate::external::{DebugHandler, EntityDestroyer, EntityFactory, EventSink, RuleController};
use crate::path::{self, Segment};
use crate::permission::{self, PermissionSchema};
use crate::registry::Registry;
use crate::value::Value;

/// Event binding attached to a context by [`EvalContext::with_event`].
#[derive(Debug, Clone)]
pub struct EventContext {
    /// Event name, matched against `on-event` triggers.
    pub name: String,
    /// Event payload parameters, merged into the context's params.
    pub params: BTreeMap<String, Value>,
}

/// The per-evaluation context threaded through triggers, views, effects,
/// and transforms.
pub struct EvalContext<'a> {
    /// The host's mutable state tree, rooted at `$`.
    pub state: &'a mut Value,
    /// Delta time for this tick, in milliseconds.
    pub dt_ms: f64,
    /// Monotonically increasing tick counter.
    pub tick: u64,
    /// The event bound for event dispatch, if any.
    pub event: Option<EventContext>,
    /// Parameters available via `param:NAME` (rule-local view parameters,
    /// merged with event params for event dispatch).
    pub params: BTreeMap<String, Value>,
    /// Cache of evaluated view results, available via `view:NAME[.FIELD]`.
    /// Cleared at the start of each rule execution.
    pub views: BTreeMap<String, Value>,
    /// Path from root to the current entity, if one is bound. `None` means
    /// `self.*` fails; `$` falls back to the root state.
    ///
    /// `pub(crate)` so view-pipeline evaluation (`crate::view`) can bind a
    /// scratch candidate (not addressable in the real state tree) as the
    /// current entity by constructing an `EvalContext` directly, rather
    /// than through [`EvalContext::with_entity`], which always reborrows
    /// `self.state`.
    pub(crate) current_entity: Option<Vec<Segment>>,
    /// Index of the current entity within its source collection, if
    /// applicable.
    pub current_index: Option<usize>,
    /// Identifier of the sender that initiated the current event; empty
    /// means "server" for permission purposes.
    pub sender_id: String,
    /// Permission schema consulted by [`EvalContext::set_path`], if wired.
    pub permission_schema: Option<&'a PermissionSchema>,
    /// Wall-clock source for cron/schedule triggers and the `now` transform.
    pub clock: &'a dyn Clock,
    /// Shared random source for the `random`/`uuid` transforms, owned by
    /// the engine and seeded once at construction.
    pub rng: &'a RefCell<StdRng>,
    /// Custom view/effect/transform handlers.
    pub registry: &'a Registry,
    /// External event sink for `emit` effects.
    pub event_sink: &'a dyn EventSink,
    /// External entity factory for `spawn` effects.
    pub entity_factory: &'a dyn EntityFactory,
    /// External entity destroyer for `destroy` effects.
    pub entity_destroyer: &'a dyn EntityDestroyer,
    /// Debug handler for predicate/missing-field notifications.
    pub debug_handler: &'a dyn DebugHandler,
    /// Rule lifecycle control surface for `enable-rule`/`disable-rule`/
    /// `enable-trigger`/`disable-trigger`/`reset-timer` effects. `None`
    /// when the host hasn't wired one, in which case those effects error
    /// rather than silently no-op (unlike `emit`/`spawn`/`destroy`).
    pub rule_controller: Option<&'a mut dyn RuleController>,
}

impl<'a> EvalContext<'a> {
    /// Constructs a fresh top-level context (no current entity bound, no
    /// params/views cached) for a new tick or event dispatch.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        state: &'a mut Value,
        dt_ms: f64,
        tick: u64,
        sender_id: String,
        permission_schema: Option<&'a PermissionSchema>,
        clock: &'a dyn Clock,
        rng: &'a RefCell<StdRng>,
        registry: &'a Registry,
        event_sink: &'a dyn EventSink,
        entity_factory: &'a dyn EntityFactory,
        entity_destroyer: &'a dyn EntityDestroyer,
        debug_handler: &'a dyn DebugHandler,
        rule_controller: Option<&'a mut dyn RuleController>,
    ) -> Self {
        Self {
            state,
            dt_ms,
            tick,
            event: None,
            params: BTreeMap::new(),
            views: BTreeMap::new(),
            current_entity: None,
            current_index: None,
            sender_id,
            permission_schema,
            clock,
            rng,
            registry,
            event_sink,
            entity_factory,
            entity_destroyer,
            debug_handler,
            rule_controller,
        }
    }

    /// Returns the path segments addressing the current entity, if bound.
    #[must_use]
    pub fn current_entity_path(&self) -> Option<&[Segment]> {
        self.current_entity.as_deref()
    }

    /// Resolves the value bound to the current entity.
    ///
    /// # Errors
    /// Returns [`PathError::NoCurrentEntity`] if no entity is bound.
    pub fn current_entity_value(&self) -> Result<&Value, PathError> {
        let segs = self.current_entity.as_deref().ok_or(PathError::NoCurrentEntity)?;
        path::navigate(self.state, segs)
    }

    /// Resolves the base value `$` refers to: the current entity if one is
    /// bound, else the root state.
    #[must_use]
    pub fn dollar_base(&self) -> &Value {
        match &self.current_entity {
            Some(segs) => path::navigate(self.state, segs).unwrap_or(self.state),
            None => self.state,
        }
    }

    /// Produces a derived context bound to the entity at `entity_path`,
    /// reborrowing the same underlying state.
    pub fn with_entity(&mut self, entity_path: Vec<Segment>, index: usize) -> EvalContext<'_> {
        EvalContext {
            state: self.state,
            dt_ms: self.dt_ms,
            tick: self.tick,
            event: self.event.clone(),
            params: self.params.clone(),
            views: self.views.clone(),
            current_entity: Some(entity_path),
            current_index: Some(index),
            sender_id: self.sender_id.clone(),
            permission_schema: self.permission_schema,
            clock: self.clock,
            rng: self.rng,
            registry: self.registry,
            event_sink: self.event_sink,
            entity_factory: self.entity_factory,
            entity_destroyer: self.entity_destroyer,
            debug_handler: self.debug_handler,
            rule_controller: self.rule_controller.as_mut().map(|c| &mut **c),
        }
    }

    /// Produces a derived context bound to `event`, propagating the
    /// event's sender as the context sender and merging its params.
    pub fn with_event(&mut self, event: EventContext, sender_id: String) -> EvalContext<'_> {
        let mut params = self.params.clone();
        params.extend(event.params.clone());
        EvalContext {
            state: self.state,
            dt_ms: self.dt_ms,
            tick: self.tick,
            event: Some(event),
            params,
            views: self.views.clone(),
            current_entity: self.current_entity.clone(),
            current_index: self.current_index,
            sender_id,
            permission_schema: self.permission_schema,
            clock: self.clock,
            rng: self.rng,
            registry: self.registry,
            event_sink: self.event_sink,
            entity_factory: self.entity_factory,
            entity_destroyer: self.entity_destroyer,
            debug_handler: self.debug_handler,
            rule_controller: self.rule_controller.as_mut().map(|c| &mut **c),
        }
    }

    /// Resolves a string expression against the prefix table: `self`,
    /// `$...`/`state:$...`, `param:NAME`, `view:NAME[.FIELD]`,
    /// `const:...`, or a plain literal string. Never fails merely because
    /// a prefix is unrecognized.
    ///
    /// # Errors
    /// Returns a [`PathError`] if a recognized prefix fails to resolve
    /// (unset current entity, missing param/view, bad path syntax).
    pub fn resolve(&self, expr: &str) -> Result<Value, PathError> {
        if expr == "self" {
            return self.current_entity_value().map(Value::clone);
        }
        if let Some(rest) = expr.strip_prefix("self.") {
            let entity = self.current_entity_value()?;
            let segs = path::parse_path(&format!("$.{rest}"))?;
            return path::navigate(entity, &segs).map(Value::clone);
        }
        if let Some(rest) = expr.strip_prefix("state:") {
            return self.resolve_dollar_path(rest);
        }
        if expr.starts_with('$') {
            return self.resolve_dollar_path(expr);
        }
        if let Some(name) = expr.strip_prefix("param:") {
            return self
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| PathError::ParamNotFound(name.to_owned()));
        }
        if let Some(rest) = expr.strip_prefix("view:") {
            let (view_name, field) = rest.split_once('.').map_or((rest, None), |(v, f)| (v, Some(f)));
            let view = self
                .views
                .get(view_name)
                .ok_or_else(|| PathError::ViewNotFound(view_name.to_owned()))?;
            return match field {
                None => Ok(view.clone()),
                Some(field) => view.field(field).cloned().ok_or_else(|| PathError::ViewFieldNotFound {
                    view: view_name.to_owned(),
                    field: field.to_owned(),
                }),
            };
        }
        if let Some(rest) = expr.strip_prefix("const:") {
            return Ok(parse_const(rest));
        }
        Ok(Value::String(expr.to_owned()))
    }

    fn resolve_dollar_path(&self, expr: &str) -> Result<Value, PathError> {
        let segs = path::parse_path(expr)?;
        path::navigate(self.dollar_base(), &segs).map(Value::clone)
    }

    /// Resolves a `self.`/`$...`/`state:$...` expression into the full path
    /// from the root state, honoring the same "`$` means current entity if
    /// one is bound" rule as [`EvalContext::resolve`]. Shared by
    /// [`EvalContext::set_path`] and effect target resolution, both of
    /// which need the addressable path rather than a resolved value.
    ///
    /// # Errors
    /// Returns [`PathError::NoCurrentEntity`] for a `self...` expression
    /// with no entity bound, or [`PathError::InvalidSyntax`] for a
    /// malformed path.
    pub(crate) fn full_path_for(&self, path_expr: &str) -> Result<Vec<Segment>, PathError> {
        let (base_is_entity, rest) = if let Some(rest) = path_expr.strip_prefix("self.") {
            (true, format!("$.{rest}"))
        } else if path_expr == "self" {
            (true, "$".to_owned())
        } else if let Some(rest) = path_expr.strip_prefix("state:") {
            (false, rest.to_owned())
        } else {
            (false, path_expr.to_owned())
        };

        let trailing = path::parse_path(&rest)?;
        let mut full_path = if base_is_entity {
            self.current_entity.clone().ok_or(PathError::NoCurrentEntity)?
        } else if self.current_entity.is_some() {
            self.current_entity.clone().unwrap_or_default()
        } else {
            Vec::new()
        };
        full_path.extend(trailing);
        Ok(full_path)
    }

    /// Sets the value at `path_expr` (a `$...` or `self...` path), applying
    /// the permission check on the final segment and coercing the new
    /// value to the existing field's type when convertible.
    ///
    /// # Errors
    /// Returns [`EffectError::Path`] if the path fails to resolve to a
    /// parent, or [`EffectError::Permission`] if the write is disallowed.
    pub fn set_path(&mut self, path_expr: &str, value: Value) -> Result<(), EffectError> {
        let full_path = self.full_path_for(path_expr).map_err(EffectError::from)?;

        if full_path.is_empty() {
            return Err(EffectError::Path(PathError::InvalidSyntax(
                "cannot set the root value itself".into(),
            )));
        }

        let sender_id = self.sender_id.clone();
        let schema = self.permission_schema;
        let (parent, last) = path::navigate_to_parent(self.state, &full_path).map_err(EffectError::from)?;
        let type_name = parent.type_name().map(str::to_owned);
        if let Segment::Field(name) | Segment::Key(name) = last {
            if let Some(schema) = schema {
                permission::check_write(schema, type_name.as_deref(), name, &sender_id, Some(parent))?;
            }
            let converted = convert_for_write(parent.field(name), value);
            parent.set_field(name.clone(), converted);
            Ok(())
        } else {
            match last {
                Segment::Index(i) => {
                    if let Value::Sequence(seq) = parent {
                        if let Some(slot) = seq.get_mut(*i) {
                            *slot = value;
                            Ok(())
                        } else {
                            Err(EffectError::Path(PathError::IndexOutOfBounds {
                                index: *i,
                                len: seq.len(),
                            }))
                        }
                    } else {
                        Err(EffectError::Path(PathError::NotASequence))
                    }
                }
                _ => Err(EffectError::Path(PathError::InvalidSyntax(
                    "wildcard segments are not writable".into(),
                ))),
            }
        }
    }
}

/// Converts `new` to match `existing`'s numeric kind when both are
/// numeric scalars of different kinds; otherwise assigns `new` as-is.
fn convert_for_write(existing: Option<&Value>, new: Value) -> Value {
    match (existing, &new) {
        (Some(Value::Int(_)), Value::Float(f)) => Value::Int(*f as i64),
        (Some(Value::Float(_)), Value::Int(i)) => Value::Float(*i as f64),
        _ => new,
    }
}

/// Parses a `const:` literal: int, then float, then bool, then string.
fn parse_const(s: &str) -> Value {
    if let Ok(i) = s.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Float(f);
    }
    if let Ok(b) = s.parse::<bool>() {
        return Value::Bool(b);
    }
    Value::String(s.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::external::{NullDebugHandler, NullEntityDestroyer, NullEntityFactory, NullEventSink};
    use crate::value::Record;
    use rand::SeedableRng;

    /// Owns every collaborator an [`EvalContext`] borrows, so tests can
    /// build a context against a freshly-borrowed `state` without leaking
    /// memory or juggling `'static` lifetimes.
    struct Fixture {
        clock: SystemClock,
        rng: RefCell<StdRng>,
        registry: Registry,
        sink: NullEventSink,
        factory: NullEntityFactory,
        destroyer: NullEntityDestroyer,
        debug: NullDebugHandler,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                clock: SystemClock,
                rng: RefCell::new(StdRng::seed_from_u64(0)),
                registry: Registry::new(),
                sink: NullEventSink,
                factory: NullEntityFactory,
                destroyer: NullEntityDestroyer,
                debug: NullDebugHandler,
            }
        }

        fn ctx<'a>(&'a self, state: &'a mut Value) -> EvalContext<'a> {
            EvalContext::new(
                state,
                100.0,
                0,
                String::new(),
                None,
                &self.clock,
                &self.rng,
                &self.registry,
                &self.sink,
                &self.factory,
                &self.destroyer,
                &self.debug,
                None,
            )
        }
    }

    #[test]
    fn resolves_param_view_and_const_prefixes() {
        let fixture = Fixture::new();
        let mut state = Value::Record(Record::new("Root"));
        let mut ctx = fixture.ctx(&mut state);
        ctx.params.insert("x".into(), Value::Int(5));
        ctx.views.insert("y".into(), Value::Int(7));
        assert_eq!(ctx.resolve("param:x").unwrap(), Value::Int(5));
        assert_eq!(ctx.resolve("view:y").unwrap(), Value::Int(7));
        assert_eq!(ctx.resolve("const:3.14").unwrap(), Value::Float(3.14));
        assert_eq!(ctx.resolve("const:true").unwrap(), Value::Bool(true));
        assert_eq!(ctx.resolve("literal").unwrap(), Value::String("literal".into()));
    }

    #[test]
    fn self_fails_without_bound_entity() {
        let fixture = Fixture::new();
        let mut state = Value::Record(Record::new("Root"));
        let ctx = fixture.ctx(&mut state);
        assert!(ctx.resolve("self").is_err());
    }

    #[test]
    fn set_path_round_trips_and_converts_type() {
        let fixture = Fixture::new();
        let mut state = Value::Record(Record::new("Root").with("Score", Value::Int(0)));
        let mut ctx = fixture.ctx(&mut state);
        ctx.set_path("$.Score", Value::Float(15.0)).unwrap();
        assert_eq!(ctx.resolve("$.Score").unwrap(), Value::Int(15));
    }
}
