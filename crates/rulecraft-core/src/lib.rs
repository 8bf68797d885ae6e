// SPDX-License-Identifier: Apache-2.0
//! rulecraft-core: a data-driven rule evaluation engine for game logic.
//!
//! Rules pair a trigger (tick interval, timer, wait, on-change, on-event,
//! cron/schedule, distance, or always-on) with read-only views over a
//! reflected state tree and a list of mutating effects. The engine owns
//! rule registration, priority-ordered dispatch, and the scratch state
//! each trigger kind needs between ticks; everything the host would
//! otherwise have to provide — event delivery, entity spawn/destroy, a
//! permission schema, a clock, a source of randomness — is a trait the
//! host wires in, defaulting to a no-op when left unwired.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod clock;
mod context;
mod cron;
mod effect;
mod engine;
mod error;
mod external;
mod geo;
mod path;
mod permission;
mod registry;
mod rule;
mod transform;
mod trigger;
mod util;
mod value;
mod view;

/// A parsed path segment: field, index, key, or wildcard.
pub use path::Segment;
/// The comparison operator used by where-clause leaves.
pub use util::Operator;

/// Wall-clock abstraction for cron/schedule triggers and the `now` transform.
pub use clock::{Clock, FixedClock, SystemClock};
/// The per-evaluation context threaded through triggers, views, and effects.
pub use context::{EvalContext, EventContext};
/// Effect specifications: the mutating half of rule execution. `apply_effect`
/// is the public entry point a host can call directly, bypassing a rule's
/// own effect list (the engine itself uses it this way internally).
pub use effect::{apply as apply_effect, EffectSpec, RemoveSelector, TargetSpec};
/// The engine: rule registration, priority dispatch, and lifecycle control.
pub use engine::{CancellationSignal, Engine, EngineBuilder, NeverCancelled};
/// Error taxonomy for every fallible subsystem.
pub use error::{
    EffectError, EngineError, PathError, PermissionError, RegistryError, TransformError,
    TriggerError, ViewError,
};
/// External collaborator contracts: event sink, entity factory/destroyer,
/// debug handler, and rule controller.
pub use external::{
    DebugHandler, EntityDestroyer, EntityFactory, EventSink, NullDebugHandler, NullEntityDestroyer,
    NullEntityFactory, NullEventSink, RuleController,
};
/// Geodesic primitives shared by views, transforms, and triggers.
pub use geo::{DistanceUnit, GeoPoint};
/// Write-permission schema and policy types.
pub use permission::{check_write, PermissionSchema, TypeSchema, WritePolicy};
/// The escape-hatch registry for custom view/effect/transform kinds.
pub use registry::{EffectHandler, Registry, TransformHandler, ViewOpHandler};
/// A named rule: trigger, views, and effects.
pub use rule::Rule;
/// Transform operators and lazily-resolved operands.
pub use transform::{Operand, Transform};
/// Trigger specifications and their scratch-state evaluator.
pub use trigger::{Trigger, TriggerEvaluator};
/// The reflected state tree: records, sequences, maps, and scalars.
pub use value::{Record, Value};
/// Read-only view pipeline specifications and stage operators.
/// `evaluate_view` is the public entry point for running a [`ViewSpec`]
/// directly, outside of a rule's own view set.
pub use view::{evaluate as evaluate_view, ViewOp, ViewOutput, ViewSpec, WhereClause};
