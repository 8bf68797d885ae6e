// SPDX-License-Identifier: Apache-2.0
//! Trigger evaluation: on-tick/on-event/on-change/distance/timer/wait/
//! condition/cron/schedule.
//!
//! A [`TriggerEvaluator`] owns all the scratch state a rule's trigger needs
//! across ticks — timer starts, the wait-fired set, `on-change` snapshots,
//! and cron/schedule dedup markers — keyed by the owning rule's name so one
//! evaluator instance serves an entire engine.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::EvalContext;
use crate::cron::CronSchedule;
use crate::error::TriggerError;
use crate::geo::{DistanceUnit, GeoPoint};
use crate::transform::Operand;
use crate::util::{self, Operator};
use crate::value::Value;
use crate::view::WhereClause;

/// A rule's trigger. An absent trigger unconditionally fires — represented
/// as `Option<Trigger>` on the owning [`crate::rule::Rule`] rather than as a
/// variant here, since a Rust `Option` is the idiomatic way to say "maybe
/// absent".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Trigger {
    /// Fires every tick when `interval_ms` is `0`, else when
    /// `tick mod ceil(interval_ms / dt_ms) == 0`.
    OnTick {
        #[serde(default)]
        interval_ms: u64,
    },
    /// Fires when the bound context's event name matches.
    OnEvent { event_name: String },
    /// Fires when any watched path's current value differs from its stored
    /// snapshot (deep equality). The first observation stores a snapshot
    /// without firing.
    OnChange { paths: Vec<String> },
    /// Fires when `haversine(from, to)` compares against `threshold` per
    /// `operator`.
    Distance {
        from: Operand,
        to: Operand,
        operator: Operator,
        threshold: Operand,
        #[serde(default)]
        unit: DistanceUnit,
    },
    /// Fires once elapsed ticks since start reach `ceil(duration_ms /
    /// dt_ms)`; `repeat` resets the start tick on fire, else the timer is
    /// cleared (never fires again until `reset-timer`).
    Timer {
        duration_ms: f64,
        #[serde(default)]
        repeat: bool,
        #[serde(default)]
        start_delay_ms: f64,
    },
    /// A one-shot timer: fires once, then never again until `reset-timer`.
    Wait { duration_ms: f64 },
    /// Fires when a boolean where-clause expression is true.
    Condition { condition: WhereClause },
    /// Fires on the first tick whose wall-clock minute matches a 5-field
    /// cron expression; deduplicated within the same minute.
    Cron { expr: String },
    /// Fires on a wall-clock schedule: either `every_ms` (fires
    /// immediately, then once per interval) or `at` (`"HH:MM"`, optionally
    /// restricted to `days`, Sunday = `0`).
    Schedule {
        #[serde(default)]
        every_ms: Option<u64>,
        #[serde(default)]
        at: Option<String>,
        #[serde(default)]
        days: Option<Vec<u8>>,
    },
}

/// Per-rule scratch state a [`TriggerEvaluator`] needs across calls.
#[derive(Debug, Default)]
struct RuleState {
    timer_start_tick: Option<u64>,
    wait_fired: bool,
    change_snapshot: HashMap<String, Value>,
    last_schedule_minute: Option<String>,
    every_anchor: Option<DateTime<Utc>>,
}

/// Owns every rule's trigger scratch state for one engine instance
/// "State per evaluator").
#[derive(Debug, Default)]
pub struct TriggerEvaluator {
    rules: HashMap<String, RuleState>,
}

impl TriggerEvaluator {
    /// Constructs an evaluator with no rule state yet recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `trigger` for `rule_name` against `ctx`, returning whether
    /// it fires this tick/event.
    ///
    /// # Errors
    /// Returns a [`TriggerError`] if a `distance`/`condition` operand fails
    /// to resolve, or a `cron` expression fails to parse.
    pub fn evaluate(&mut self, rule_name: &str, trigger: &Trigger, ctx: &EvalContext<'_>) -> Result<bool, TriggerError> {
        match trigger {
            Trigger::OnTick { interval_ms } => Ok(on_tick_fires(ctx, *interval_ms)),
            Trigger::OnEvent { event_name } => {
                Ok(ctx.event.as_ref().is_some_and(|e| &e.name == event_name))
            }
            Trigger::OnChange { paths } => Ok(self.on_change_fires(rule_name, paths, ctx)),
            Trigger::Distance { from, to, operator, threshold, unit } => {
                distance_fires(ctx, from, to, *operator, threshold, *unit)
            }
            Trigger::Timer { duration_ms, repeat, start_delay_ms } => {
                Ok(self.timer_fires(rule_name, ctx, *duration_ms, *repeat, *start_delay_ms))
            }
            Trigger::Wait { duration_ms } => Ok(self.wait_fires(rule_name, ctx, *duration_ms)),
            Trigger::Condition { condition } => Ok(condition.eval(ctx)?),
            Trigger::Cron { expr } => self.cron_fires(rule_name, expr, ctx),
            Trigger::Schedule { every_ms, at, days } => {
                Ok(self.schedule_fires(rule_name, ctx, *every_ms, at.as_deref(), days.as_deref()))
            }
        }
    }

    fn state_mut(&mut self, rule_name: &str) -> &mut RuleState {
        self.rules.entry(rule_name.to_owned()).or_default()
    }

    /// Clears a rule's trigger scratch state — timer start, wait-fired,
    /// on-change snapshot, and cron/schedule dedup markers — dropping it
    /// back to its never-evaluated state.
    pub fn reset(&mut self, rule_name: &str) {
        self.rules.remove(rule_name);
    }

    fn on_change_fires(&mut self, rule_name: &str, paths: &[String], ctx: &EvalContext<'_>) -> bool {
        let current: Vec<(String, Value)> = paths
            .iter()
            .map(|p| (p.clone(), ctx.resolve(p).unwrap_or(Value::Null)))
            .collect();
        let state = self.state_mut(rule_name);
        let mut changed = false;
        let is_first_observation = state.change_snapshot.is_empty() && !current.is_empty();
        for (path, value) in &current {
            match state.change_snapshot.get(path) {
                Some(prev) if !util::deep_equal(prev, value) => changed = true,
                Some(_) => {}
                None => {}
            }
        }
        for (path, value) in current {
            state.change_snapshot.insert(path, util::deep_copy(&value));
        }
        changed && !is_first_observation
    }

    fn timer_fires(&mut self, rule_name: &str, ctx: &EvalContext<'_>, duration_ms: f64, repeat: bool, start_delay_ms: f64) -> bool {
        let ticks_per_duration = ceil_ticks(duration_ms, ctx.dt_ms);
        let delay_ticks = ceil_ticks(start_delay_ms, ctx.dt_ms);
        let state = self.state_mut(rule_name);
        let start = *state.timer_start_tick.get_or_insert(ctx.tick);
        let elapsed = ctx.tick.saturating_sub(start);
        if elapsed < delay_ticks {
            return false;
        }
        if elapsed.saturating_sub(delay_ticks) < ticks_per_duration {
            return false;
        }
        if repeat {
            state.timer_start_tick = Some(ctx.tick);
        } else {
            state.timer_start_tick = Some(u64::MAX);
        }
        true
    }

    fn wait_fires(&mut self, rule_name: &str, ctx: &EvalContext<'_>, duration_ms: f64) -> bool {
        let ticks = ceil_ticks(duration_ms, ctx.dt_ms);
        let state = self.state_mut(rule_name);
        if state.wait_fired {
            return false;
        }
        let start = *state.timer_start_tick.get_or_insert(ctx.tick);
        let elapsed = ctx.tick.saturating_sub(start);
        if elapsed < ticks {
            return false;
        }
        state.wait_fired = true;
        true
    }

    fn cron_fires(&mut self, rule_name: &str, expr: &str, ctx: &EvalContext<'_>) -> Result<bool, TriggerError> {
        let schedule = CronSchedule::parse(expr)?;
        let now = ctx.clock.now();
        if !schedule.matches(now) {
            return Ok(false);
        }
        Ok(self.dedup_within_minute(rule_name, now))
    }

    fn schedule_fires(
        &mut self,
        rule_name: &str,
        ctx: &EvalContext<'_>,
        every_ms: Option<u64>,
        at: Option<&str>,
        days: Option<&[u8]>,
    ) -> bool {
        let now = ctx.clock.now();
        if let Some(every_ms) = every_ms {
            let state = self.state_mut(rule_name);
            let Some(anchor) = state.every_anchor else {
                state.every_anchor = Some(now);
                return true;
            };
            let elapsed = (now - anchor).num_milliseconds().max(0) as u64;
            if elapsed >= every_ms {
                state.every_anchor = Some(now);
                true
            } else {
                false
            }
        } else if let Some(at) = at {
            if !time_of_day_matches(now, at) {
                return false;
            }
            if let Some(days) = days {
                use chrono::Datelike;
                let weekday = now.weekday().num_days_from_sunday() as u8;
                if !days.contains(&weekday) {
                    return false;
                }
            }
            self.dedup_within_minute(rule_name, now)
        } else {
            false
        }
    }

    fn dedup_within_minute(&mut self, rule_name: &str, now: DateTime<Utc>) -> bool {
        use chrono::{Datelike, Timelike};
        let key = format!("{}-{:02}-{:02}T{:02}:{:02}", now.format("%Y"), now.month(), now.day(), now.hour(), now.minute());
        let state = self.state_mut(rule_name);
        if state.last_schedule_minute.as_deref() == Some(key.as_str()) {
            return false;
        }
        state.last_schedule_minute = Some(key);
        true
    }
}

/// `on-tick` uses floored integer division of interval by dt (unlike
/// `timer`/`wait`, which round up); a
/// period of zero — a zero interval, or an interval shorter than one
/// tick — fires every tick.
fn on_tick_fires(ctx: &EvalContext<'_>, interval_ms: u64) -> bool {
    if ctx.dt_ms <= 0.0 {
        return true;
    }
    let period = (interval_ms as f64 / ctx.dt_ms).floor() as u64;
    if period == 0 {
        return true;
    }
    ctx.tick % period == 0
}

fn distance_fires(
    ctx: &EvalContext<'_>,
    from: &Operand,
    to: &Operand,
    operator: Operator,
    threshold: &Operand,
    unit: DistanceUnit,
) -> Result<bool, TriggerError> {
    let from = point_of(&from.eval(ctx)?).ok_or_else(|| TriggerError::InvalidOperand("'from' is not a point".into()))?;
    let to = point_of(&to.eval(ctx)?).ok_or_else(|| TriggerError::InvalidOperand("'to' is not a point".into()))?;
    let threshold = threshold
        .eval(ctx)?
        .as_f64()
        .ok_or_else(|| TriggerError::InvalidOperand("'threshold' is not numeric".into()))?;
    let distance = unit.from_meters(crate::geo::haversine_distance_m(from, to));
    Ok(util::compare(&Value::Float(distance), operator, &Value::Float(threshold)))
}

fn point_of(v: &Value) -> Option<GeoPoint> {
    let lat = v.field("lat").or_else(|| v.field("Lat")).and_then(Value::as_f64)?;
    let lon = v.field("lon").or_else(|| v.field("Lon")).and_then(Value::as_f64)?;
    Some(GeoPoint::new(lat, lon))
}

fn ceil_ticks(duration_ms: f64, dt_ms: f64) -> u64 {
    if dt_ms <= 0.0 {
        return 0;
    }
    (duration_ms / dt_ms).ceil().max(0.0) as u64
}

fn time_of_day_matches(now: DateTime<Utc>, at: &str) -> bool {
    use chrono::Timelike;
    let Some((h, m)) = at.split_once(':') else {
        return false;
    };
    let (Ok(h), Ok(m)) = (h.parse::<u32>(), m.parse::<u32>()) else {
        return false;
    };
    now.hour() == h && now.minute() == m
}
