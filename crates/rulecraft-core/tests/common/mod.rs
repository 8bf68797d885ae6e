// SPDX-License-Identifier: Apache-2.0
//! Shared fixture for integration tests: a no-op-collaborator context
//! builder, matching the `Fixture` pattern used by the unit tests in
//! `src/*.rs`.

use std::cell::RefCell;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rulecraft_core::{
    EvalContext, NullDebugHandler, NullEntityDestroyer, NullEntityFactory, NullEventSink, Registry, SystemClock,
    Value,
};

pub struct Fixture {
    pub clock: SystemClock,
    pub rng: RefCell<StdRng>,
    pub registry: Registry,
    pub sink: NullEventSink,
    pub factory: NullEntityFactory,
    pub destroyer: NullEntityDestroyer,
    pub debug: NullDebugHandler,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            clock: SystemClock,
            rng: RefCell::new(StdRng::seed_from_u64(7)),
            registry: Registry::new(),
            sink: NullEventSink,
            factory: NullEntityFactory,
            destroyer: NullEntityDestroyer,
            debug: NullDebugHandler,
        }
    }

    pub fn ctx<'a>(&'a self, state: &'a mut Value, dt_ms: f64, tick: u64) -> EvalContext<'a> {
        EvalContext::new(
            state,
            dt_ms,
            tick,
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
