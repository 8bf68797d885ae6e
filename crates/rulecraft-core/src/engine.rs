// SPDX-License-Identifier: Apache-2.0
//! The engine loop: priority-ordered rule dispatch for ticks and events,
//! global-view merging, rule lifecycle control, and cooperative
//! cancellation.

use std::cell::RefCell;
use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::context::{EvalContext, EventContext};
use crate::effect;
use crate::error::EngineError;
use crate::external::{
    DebugHandler, EntityDestroyer, EntityFactory, EventSink, NullDebugHandler, NullEntityDestroyer,
    NullEntityFactory, NullEventSink, RuleController,
};
use crate::permission::PermissionSchema;
use crate::registry::Registry;
use crate::rule::Rule;
use crate::trigger::TriggerEvaluator;
use crate::value::Value;
use crate::view::{self, ViewSpec};

/// A cooperative cancellation check, consulted between rules in a tick.
/// Returns `Some(reason)` to abort the remainder of the tick.
pub trait CancellationSignal: Send + Sync {
    /// Returns a cancellation reason if the caller wants the tick to stop.
    fn check(&self) -> Option<String>;
}

/// A signal that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl CancellationSignal for NeverCancelled {
    fn check(&self) -> Option<String> {
        None
    }
}

/// Builds an [`Engine`] with its external collaborators, defaulting every
/// unwired one to its no-op implementation. Configuration is constructor
/// arguments and builder methods, not a config file.
pub struct EngineBuilder {
    permission_schema: PermissionSchema,
    registry: Registry,
    clock: Box<dyn Clock>,
    rng_seed: Option<u64>,
    event_sink: Box<dyn EventSink>,
    entity_factory: Box<dyn EntityFactory>,
    entity_destroyer: Box<dyn EntityDestroyer>,
    debug_handler: Box<dyn DebugHandler>,
    cancellation: Box<dyn CancellationSignal>,
    global_views: BTreeMap<String, ViewSpec>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            permission_schema: PermissionSchema::new(),
            registry: Registry::new(),
            clock: Box::new(SystemClock),
            rng_seed: None,
            event_sink: Box::new(NullEventSink),
            entity_factory: Box::new(NullEntityFactory),
            entity_destroyer: Box::new(NullEntityDestroyer),
            debug_handler: Box::new(NullDebugHandler),
            cancellation: Box::new(NeverCancelled),
            global_views: BTreeMap::new(),
        }
    }
}

impl EngineBuilder {
    /// Starts a builder with every collaborator defaulted to its no-op
    /// implementation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires the permission schema consulted by every write.
    #[must_use]
    pub fn permission_schema(mut self, schema: PermissionSchema) -> Self {
        self.permission_schema = schema;
        self
    }

    /// Wires the registry of custom view/effect/transform handlers.
    #[must_use]
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Wires a non-default wall-clock source (primarily for tests).
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Seeds the shared random source used by `random`/`uuid` transforms.
    /// Defaults to a wall-clock-derived seed at [`EngineBuilder::build`]
    /// time.
    #[must_use]
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Wires an event sink for `emit` effects.
    #[must_use]
    pub fn event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.event_sink = Box::new(sink);
        self
    }

    /// Wires an entity factory for `spawn` effects.
    #[must_use]
    pub fn entity_factory(mut self, factory: impl EntityFactory + 'static) -> Self {
        self.entity_factory = Box::new(factory);
        self
    }

    /// Wires an entity destroyer for `destroy` effects.
    #[must_use]
    pub fn entity_destroyer(mut self, destroyer: impl EntityDestroyer + 'static) -> Self {
        self.entity_destroyer = Box::new(destroyer);
        self
    }

    /// Wires a debug handler for predicate/missing-field notifications.
    #[must_use]
    pub fn debug_handler(mut self, handler: impl DebugHandler + 'static) -> Self {
        self.debug_handler = Box::new(handler);
        self
    }

    /// Wires a cooperative cancellation signal, checked between rules.
    #[must_use]
    pub fn cancellation(mut self, signal: impl CancellationSignal + 'static) -> Self {
        self.cancellation = Box::new(signal);
        self
    }

    /// Registers a global view, merged into every rule's view set
    /// (rule-local overrides global on name collision).
    #[must_use]
    pub fn global_view(mut self, name: impl Into<String>, spec: ViewSpec) -> Self {
        self.global_views.insert(name.into(), spec);
        self
    }

    /// Finalizes the engine with no rules registered yet.
    #[must_use]
    pub fn build(self) -> Engine {
        let seed = self.rng_seed.unwrap_or_else(|| self.clock.now_ms() as u64);
        Engine {
            rules: Vec::new(),
            global_views: self.global_views,
            trigger_evaluator: TriggerEvaluator::new(),
            permission_schema: self.permission_schema,
            registry: self.registry,
            clock: self.clock,
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
            event_sink: self.event_sink,
            entity_factory: self.entity_factory,
            entity_destroyer: self.entity_destroyer,
            debug_handler: self.debug_handler,
            cancellation: self.cancellation,
            tick: 0,
        }
    }
}

/// The engine: owns rule registration/ordering, the trigger evaluator's
/// scratch state, and every external collaborator. Implements
/// [`RuleController`] directly so effects can call back into rule
/// lifecycle control.
pub struct Engine {
    rules: Vec<Rule>,
    global_views: BTreeMap<String, ViewSpec>,
    trigger_evaluator: TriggerEvaluator,
    permission_schema: PermissionSchema,
    registry: Registry,
    clock: Box<dyn Clock>,
    rng: RefCell<StdRng>,
    event_sink: Box<dyn EventSink>,
    entity_factory: Box<dyn EntityFactory>,
    entity_destroyer: Box<dyn EntityDestroyer>,
    debug_handler: Box<dyn DebugHandler>,
    cancellation: Box<dyn CancellationSignal>,
    tick: u64,
}

impl Engine {
    /// Starts a builder with every collaborator defaulted.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Registers `rule`, assigns it as the stable timer key for its own
    /// trigger, and re-sorts rules by priority descending (ties by
    /// insertion order.
    ///
    /// # Errors
    /// Returns [`EngineError::DuplicateRuleName`] if a rule with the same
    /// name is already registered.
    pub fn register_rule(&mut self, rule: Rule) -> Result<(), EngineError> {
        if self.rules.iter().any(|r| r.name == rule.name) {
            return Err(EngineError::DuplicateRuleName(rule.name));
        }
        self.rules.push(rule);
        self.stable_sort_by_priority();
        Ok(())
    }

    /// Removes the named rule, preserving the relative order of the rest.
    ///
    /// # Errors
    /// Returns [`EngineError::RuleNotFound`] if no rule with that name is
    /// registered.
    pub fn remove_rule(&mut self, rule_name: &str) -> Result<(), EngineError> {
        let index = self
            .rules
            .iter()
            .position(|r| r.name == rule_name)
            .ok_or_else(|| EngineError::RuleNotFound(rule_name.to_owned()))?;
        self.rules.remove(index);
        self.trigger_evaluator.reset(rule_name);
        Ok(())
    }

    /// Stable sort by descending priority; `Vec::sort_by_key` is stable, so
    /// insertion order among equal priorities is preserved.
    fn stable_sort_by_priority(&mut self) {
        self.rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
    }

    /// Advances the tick counter and fires every enabled rule whose trigger
    /// matches, in descending priority order.
    ///
    /// # Errors
    /// Returns [`EngineError::Cancelled`] if the wired cancellation signal
    /// fires between rules, or the first rule-execution error encountered.
    #[instrument(skip(self, state))]
    pub fn tick(&mut self, state: &mut Value, dt_ms: f64) -> Result<(), EngineError> {
        self.tick += 1;
        let current_tick = self.tick;
        for index in 0..self.rules.len() {
            if let Some(reason) = self.cancellation.check() {
                return Err(EngineError::Cancelled(reason));
            }
            let rule_name = self.rules[index].name.clone();
            if !self.rules[index].is_enabled() {
                continue;
            }
            let fired = match &self.rules[index].trigger {
                None => true,
                Some(_) if !self.rules[index].is_trigger_enabled() => false,
                Some(trigger) => {
                    let ctx = EvalContext::new(
                        state,
                        dt_ms,
                        current_tick,
                        String::new(),
                        Some(&self.permission_schema),
                        self.clock.as_ref(),
                        &self.rng,
                        &self.registry,
                        self.event_sink.as_ref(),
                        self.entity_factory.as_ref(),
                        self.entity_destroyer.as_ref(),
                        self.debug_handler.as_ref(),
                        None,
                    );
                    self.trigger_evaluator
                        .evaluate(&rule_name, trigger, &ctx)
                        .map_err(|source| EngineError::Trigger { rule: rule_name.clone(), source })?
                }
            };
            if fired {
                debug!(rule = %rule_name, tick = current_tick, "rule fired");
                self.execute_rule(index, state, dt_ms, None, String::new())?;
            } else {
                debug!(rule = %rule_name, tick = current_tick, "rule did not fire");
            }
        }
        Ok(())
    }

    /// Builds a context with `event` attached and fires only `on-event`
    /// rules whose event name matches. The event's sender
    /// propagates as the context's sender id; event params merge into the
    /// context's params.
    ///
    /// # Errors
    /// Returns [`EngineError::Cancelled`] or the first rule-execution error.
    #[instrument(skip(self, state, params))]
    pub fn handle_event(
        &mut self,
        state: &mut Value,
        dt_ms: f64,
        event_name: &str,
        params: BTreeMap<String, Value>,
        sender_id: String,
    ) -> Result<(), EngineError> {
        let event = EventContext { name: event_name.to_owned(), params };
        for index in 0..self.rules.len() {
            if let Some(reason) = self.cancellation.check() {
                return Err(EngineError::Cancelled(reason));
            }
            let rule = &self.rules[index];
            if !rule.is_enabled() || !rule.is_trigger_enabled() {
                continue;
            }
            let is_on_event_match = matches!(
                &rule.trigger,
                Some(crate::trigger::Trigger::OnEvent { event_name: n }) if n == event_name
            );
            if !is_on_event_match {
                continue;
            }
            self.execute_rule(index, state, dt_ms, Some(event.clone()), sender_id.clone())?;
        }
        Ok(())
    }

    /// Evaluates every view (global ∪ rule-local, rule-local winning on
    /// name collision), caches results by name, then applies every effect
    /// in declaration order.
    #[instrument(skip(self, state, event))]
    fn execute_rule(
        &mut self,
        rule_index: usize,
        state: &mut Value,
        dt_ms: f64,
        event: Option<EventContext>,
        sender_id: String,
    ) -> Result<(), EngineError> {
        let rule_name = self.rules[rule_index].name.clone();
        let mut merged_views = self.global_views.clone();
        merged_views.extend(self.rules[rule_index].views.clone());
        let effects = self.rules[rule_index].effects.clone();

        let mut controller = EngineController {
            rules: &mut self.rules,
            trigger_evaluator: &mut self.trigger_evaluator,
        };

        let mut ctx = EvalContext::new(
            state,
            dt_ms,
            self.tick,
            sender_id,
            Some(&self.permission_schema),
            self.clock.as_ref(),
            &self.rng,
            &self.registry,
            self.event_sink.as_ref(),
            self.entity_factory.as_ref(),
            self.entity_destroyer.as_ref(),
            self.debug_handler.as_ref(),
            Some(&mut controller),
        );
        if let Some(event) = event {
            ctx.params.extend(event.params.clone());
            ctx.event = Some(event);
        }

        for (name, spec) in &merged_views {
            match view::evaluate(&mut ctx, spec) {
                Ok(output) => {
                    ctx.views.insert(name.clone(), output.into_value());
                }
                Err(source) => {
                    return Err(EngineError::View { rule: rule_name.clone(), view: name.clone(), source });
                }
            }
        }

        for (index, spec) in effects.iter().enumerate() {
            if let Err(source) = effect::apply(&mut ctx, spec) {
                warn!(rule = %rule_name, effect = index, error = %source, "effect failed");
                return Err(EngineError::Effect { rule: rule_name, index, source });
            }
        }
        Ok(())
    }

    /// The current tick counter.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Names of every registered rule, in dispatch order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }
}

/// The [`RuleController`] wired into every rule-execution context, closing
/// over the engine's rule list and trigger scratch state so
/// `enable-rule`/`disable-rule`/`enable-trigger`/`disable-trigger`/
/// `reset-timer` effects can reach back into engine state mid-tick.
struct EngineController<'a> {
    rules: &'a mut Vec<Rule>,
    trigger_evaluator: &'a mut TriggerEvaluator,
}

impl RuleController for EngineController<'_> {
    fn enable_rule(&mut self, rule_name: &str, enabled: bool) -> bool {
        let Some(rule) = self.rules.iter_mut().find(|r| r.name == rule_name) else {
            return false;
        };
        rule.enabled = Some(enabled);
        true
    }

    fn enable_trigger(&mut self, rule_name: &str, enabled: bool) -> bool {
        let Some(rule) = self.rules.iter_mut().find(|r| r.name == rule_name) else {
            return false;
        };
        rule.trigger_enabled = enabled;
        true
    }

    fn reset_timer(&mut self, rule_name: &str) -> bool {
        if !self.rules.iter().any(|r| r.name == rule_name) {
            return false;
        }
        self.trigger_evaluator.reset(rule_name);
        true
    }
}
