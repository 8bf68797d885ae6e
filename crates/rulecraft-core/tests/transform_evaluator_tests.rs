// SPDX-License-Identifier: Apache-2.0
//! Transform evaluation through the public API: arithmetic, geo, string,
//! and control-flow operators.

mod common;

use std::cell::RefCell;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rulecraft_core::{
    DistanceUnit, EvalContext, NullDebugHandler, NullEntityDestroyer, NullEntityFactory, NullEventSink, Operand,
    Record, Registry, SystemClock, Transform, TransformError, TransformHandler, Value,
};

fn lit(v: impl Into<Value>) -> Operand {
    Operand::Literal(v.into())
}

#[test]
fn clamp_bounds_an_out_of_range_value() {
    let fixture = common::Fixture::new();
    let mut state = Value::Null;
    let ctx = fixture.ctx(&mut state, 100.0, 0);
    let clamp = Transform::Clamp { value: lit(15i64), min: lit(0i64), max: lit(10i64) };
    assert_eq!(clamp.eval(&ctx).unwrap(), Value::Float(10.0));
}

#[test]
fn modulo_by_zero_is_reported_not_panicked() {
    let fixture = common::Fixture::new();
    let mut state = Value::Null;
    let ctx = fixture.ctx(&mut state, 100.0, 0);
    let modulo = Transform::Modulo { left: lit(7i64), right: lit(0i64) };
    assert!(modulo.eval(&ctx).is_err());
}

#[test]
fn move_towards_advances_a_point_without_overshoot() {
    let fixture = common::Fixture::new();
    let mut state = Value::Null;
    let ctx = fixture.ctx(&mut state, 100.0, 0);
    let zero = Value::Record(Record::new("P").with("lat", Value::Float(0.0)).with("lon", Value::Float(0.0)));
    let far = Value::Record(Record::new("P").with("lat", Value::Float(10.0)).with("lon", Value::Float(0.0)));
    let move_towards = Transform::MoveTowards {
        current: Operand::Literal(zero),
        target: Operand::Literal(far),
        speed_m_per_ms: lit(0.001),
        delta_ms: lit(1000.0),
    };
    let result = move_towards.eval(&ctx).unwrap();
    let Some(Value::Float(moved_lat)) = result.field("lat").copied() else {
        panic!("expected a moved point with a lat field");
    };
    assert!(moved_lat > 0.0 && moved_lat < 10.0);
}

#[test]
fn nested_if_selects_the_truthy_branch() {
    let fixture = common::Fixture::new();
    let mut state = Value::Null;
    let ctx = fixture.ctx(&mut state, 100.0, 0);
    let if_transform = Transform::If {
        condition: Operand::Literal(Value::Bool(false)),
        then: lit("yes"),
        otherwise: Operand::Nested(Box::new(Transform::Concat { values: vec![lit("no"), lit("pe")] })),
    };
    assert_eq!(if_transform.eval(&ctx).unwrap(), Value::String("nope".into()));
}

#[test]
fn point_in_radius_true_for_a_nearby_point() {
    let fixture = common::Fixture::new();
    let mut state = Value::Null;
    let ctx = fixture.ctx(&mut state, 100.0, 0);
    let center = Value::Record(Record::new("P").with("lat", Value::Float(0.0)).with("lon", Value::Float(0.0)));
    let point = Value::Record(Record::new("P").with("lat", Value::Float(0.001)).with("lon", Value::Float(0.0)));
    let check = Transform::PointInRadius {
        point: Operand::Literal(point),
        center: Operand::Literal(center),
        radius: lit(200.0),
        unit: DistanceUnit::Meters,
    };
    assert_eq!(check.eval(&ctx).unwrap(), Value::Bool(true));
}

#[test]
fn custom_transform_dispatches_through_the_registry() {
    let mut registry = Registry::new();
    let double: TransformHandler = Arc::new(|ctx, args| {
        let operand: Operand = serde_json::from_value(args.get("value").cloned().unwrap_or(serde_json::Value::Null))
            .map_err(|e| TransformError::MissingOperand { kind: "double".into(), operand: e.to_string() })?;
        let v = operand.eval(ctx)?;
        v.as_f64()
            .map(|n| Value::Float(n * 2.0))
            .ok_or_else(|| TransformError::NotNumeric("double.value".into()))
    });
    registry.register_transform("double", double).unwrap();

    let clock = SystemClock;
    let rng = RefCell::new(StdRng::seed_from_u64(1));
    let sink = NullEventSink;
    let factory = NullEntityFactory;
    let destroyer = NullEntityDestroyer;
    let debug = NullDebugHandler;
    let mut state = Value::Null;
    let ctx = EvalContext::new(
        &mut state, 100.0, 0, String::new(), None, &clock, &rng, &registry, &sink, &factory, &destroyer, &debug, None,
    );

    let mut args = serde_json::Map::new();
    args.insert("value".to_owned(), serde_json::json!(21.0));
    let custom = Transform::Custom { kind: "double".into(), args };
    assert_eq!(custom.eval(&ctx).unwrap(), Value::Float(42.0));
}
