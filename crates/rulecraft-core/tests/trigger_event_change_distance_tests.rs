// SPDX-License-Identifier: Apache-2.0
//! `on-event`, `on-change`, and `distance` trigger behavior through the
//! public API.

mod common;

use std::collections::BTreeMap;

use rulecraft_core::{EventContext, Operand, Record, Trigger, TriggerEvaluator, Value};

fn geo_point(lat: f64, lon: f64) -> Value {
    Value::Record(Record::new("GeoPoint").with("lat", Value::Float(lat)).with("lon", Value::Float(lon)))
}

#[test]
fn on_event_fires_only_for_a_matching_event_name() {
    let fixture = common::Fixture::new();
    let mut evaluator = TriggerEvaluator::new();
    let trigger = Trigger::OnEvent { event_name: "PlayerScored".into() };

    let mut state = Value::Null;
    let mut ctx = fixture.ctx(&mut state, 100.0, 1);
    let mismatched = ctx.with_event(EventContext { name: "PlayerJoined".into(), params: BTreeMap::new() }, String::new());
    assert!(!evaluator.evaluate("on-score", &trigger, &mismatched).unwrap());

    let mut ctx = fixture.ctx(&mut state, 100.0, 1);
    let matched = ctx.with_event(EventContext { name: "PlayerScored".into(), params: BTreeMap::new() }, String::new());
    assert!(evaluator.evaluate("on-score", &trigger, &matched).unwrap());
}

#[test]
fn on_event_never_fires_outside_event_dispatch() {
    let fixture = common::Fixture::new();
    let mut evaluator = TriggerEvaluator::new();
    let trigger = Trigger::OnEvent { event_name: "PlayerScored".into() };
    let mut state = Value::Null;
    let ctx = fixture.ctx(&mut state, 100.0, 1);
    assert!(!evaluator.evaluate("on-score", &trigger, &ctx).unwrap());
}

#[test]
fn on_change_does_not_fire_on_the_first_observation() {
    let fixture = common::Fixture::new();
    let mut evaluator = TriggerEvaluator::new();
    let trigger = Trigger::OnChange { paths: vec!["self.Health".into()] };
    let mut state = Value::Record(Record::new("Root").with("Health", Value::Int(100)));
    let ctx = fixture.ctx(&mut state, 100.0, 0);
    assert!(!evaluator.evaluate("watch-health", &trigger, &ctx).unwrap());
}

#[test]
fn on_change_fires_once_a_watched_path_value_differs() {
    let fixture = common::Fixture::new();
    let mut evaluator = TriggerEvaluator::new();
    let trigger = Trigger::OnChange { paths: vec!["self.Health".into()] };
    let mut state = Value::Record(Record::new("Root").with("Health", Value::Int(100)));

    let ctx = fixture.ctx(&mut state, 100.0, 0);
    assert!(!evaluator.evaluate("watch-health", &trigger, &ctx).unwrap());

    let ctx = fixture.ctx(&mut state, 100.0, 1);
    assert!(!evaluator.evaluate("watch-health", &trigger, &ctx).unwrap(), "unchanged value must not fire");

    state.set_field("Health", Value::Int(80));
    let ctx = fixture.ctx(&mut state, 100.0, 2);
    assert!(evaluator.evaluate("watch-health", &trigger, &ctx).unwrap());

    let ctx = fixture.ctx(&mut state, 100.0, 3);
    assert!(!evaluator.evaluate("watch-health", &trigger, &ctx).unwrap(), "the new snapshot must not re-fire next tick");
}

#[test]
fn distance_fires_when_the_comparison_crosses_threshold() {
    let fixture = common::Fixture::new();
    let mut evaluator = TriggerEvaluator::new();
    let trigger = Trigger::Distance {
        from: Operand::Expr("self.Position".into()),
        to: Operand::Literal(geo_point(0.0, 0.0)),
        operator: rulecraft_core::Operator::Lt,
        threshold: Operand::Literal(Value::Float(1_000.0)),
        unit: rulecraft_core::DistanceUnit::Meters,
    };

    let mut far = Value::Record(Record::new("Root").with("Position", geo_point(10.0, 10.0)));
    let ctx = fixture.ctx(&mut far, 100.0, 0);
    assert!(!evaluator.evaluate("proximity", &trigger, &ctx).unwrap());

    let mut near = Value::Record(Record::new("Root").with("Position", geo_point(0.001, 0.0)));
    let ctx = fixture.ctx(&mut near, 100.0, 0);
    assert!(evaluator.evaluate("proximity", &trigger, &ctx).unwrap());
}
