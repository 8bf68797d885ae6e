// SPDX-License-Identifier: Apache-2.0
//! A replayable step: one tick or one event dispatch, as loaded from a
//! `--steps` JSON file.

use std::collections::BTreeMap;

use rulecraft_core::Value;
use serde::Deserialize;

/// One entry in a recorded step stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Step {
    /// Advances the engine by one tick.
    Tick {
        /// Delta time for this tick, in milliseconds.
        dt_ms: f64,
    },
    /// Dispatches a named event.
    Event {
        /// Event name, matched against `on-event` triggers.
        name: String,
        /// Event payload parameters.
        #[serde(default)]
        params: BTreeMap<String, Value>,
        /// Sender id attached to the dispatch; empty means server.
        #[serde(default)]
        sender: String,
        /// Delta time for this dispatch, in milliseconds.
        dt_ms: f64,
    },
}
