// SPDX-License-Identifier: Apache-2.0
//! Rule specification: trigger + views + effects, keyed by name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::effect::EffectSpec;
use crate::trigger::Trigger;
use crate::view::ViewSpec;

/// A named rule: trigger (when to fire), views (what to read), effects
/// (what to mutate). Identified by `name`; the engine rejects duplicates
/// at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Unique identifier, used as the trigger evaluator's scratch-state key
    /// and the rule-controller's lookup key.
    pub name: String,
    /// Human-readable description; not consulted by evaluation.
    #[serde(default)]
    pub description: String,
    /// Dispatch priority; higher fires first within a tick. Defaults to 0.
    #[serde(default)]
    pub priority: i64,
    /// Tri-state enabled flag: `None` (unset) behaves as `Some(true)`.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// The condition under which this rule fires. `None` unconditionally
    /// fires every tick/event it is considered for.
    #[serde(default)]
    pub trigger: Option<Trigger>,
    /// The trigger's own enabled flag, independent of the rule's. Defaults
    /// to enabled.
    #[serde(default = "default_trigger_enabled")]
    pub trigger_enabled: bool,
    /// Rule-local views, merged over global views on name collision.
    #[serde(default)]
    pub views: BTreeMap<String, ViewSpec>,
    /// Effects applied, in order, when the trigger fires.
    #[serde(default)]
    pub effects: Vec<EffectSpec>,
}

fn default_trigger_enabled() -> bool {
    true
}

impl Rule {
    /// Whether this rule is eligible to be considered for dispatch this
    /// tick/event. An unset `enabled` flag behaves as `true`.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Whether this rule's trigger should be evaluated at all. A disabled
    /// trigger never fires, independent of the rule's own enabled flag.
    #[must_use]
    pub fn is_trigger_enabled(&self) -> bool {
        self.trigger_enabled
    }
}
