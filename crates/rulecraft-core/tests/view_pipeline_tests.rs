// SPDX-License-Identifier: Apache-2.0
//! View pipeline stages exercised individually and in combination,
//! through the public [`rulecraft_core::evaluate_view`] entry point.

mod common;

use std::sync::Arc;

use rand::SeedableRng;
use rulecraft_core::{Operand, Record, Value, ViewOp, ViewOpHandler, ViewOutput, ViewSpec};

fn card(id: &str, suit: &str, value: i64) -> Value {
    Value::Record(Record::new("Card").with("ID", Value::string(id)).with("Suit", Value::string(suit)).with("Value", Value::Int(value)))
}

#[test]
fn map_projects_each_entity_through_an_expression() {
    let fixture = common::Fixture::new();
    let mut state = Value::Sequence(vec![card("c1", "hearts", 2), card("c2", "spades", 9)]);
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);
    let spec = ViewSpec { source: "$".into(), pipeline: vec![ViewOp::Map { expr: Operand::Expr("self.Value".into()) }] };
    let ViewOutput::Entities(out) = rulecraft_core::evaluate_view(&mut ctx, &spec).unwrap() else {
        panic!("expected entities");
    };
    assert_eq!(out, vec![Value::Int(2), Value::Int(9)]);
}

#[test]
fn group_by_partitions_by_stringified_field_value() {
    let fixture = common::Fixture::new();
    let mut state = Value::Sequence(vec![
        card("c1", "hearts", 2),
        card("c2", "spades", 9),
        card("c3", "hearts", 5),
    ]);
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);
    let spec = ViewSpec { source: "$".into(), pipeline: vec![ViewOp::GroupBy { field: "Suit".into() }] };
    let ViewOutput::Grouped(groups) = rulecraft_core::evaluate_view(&mut ctx, &spec).unwrap() else {
        panic!("expected groups");
    };
    assert_eq!(groups.get("hearts").map(Vec::len), Some(2));
    assert_eq!(groups.get("spades").map(Vec::len), Some(1));
}

#[test]
fn distinct_by_field_keeps_the_first_occurrence_of_each_key() {
    let fixture = common::Fixture::new();
    let mut state = Value::Sequence(vec![
        card("c1", "hearts", 2),
        card("c2", "hearts", 9),
        card("c3", "spades", 2),
    ]);
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);
    let spec = ViewSpec { source: "$".into(), pipeline: vec![ViewOp::Distinct { field: Some("Suit".into()) }] };
    let ViewOutput::Entities(out) = rulecraft_core::evaluate_view(&mut ctx, &spec).unwrap() else {
        panic!("expected entities");
    };
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].field("ID"), Some(&Value::string("c1")));
    assert_eq!(out[1].field("ID"), Some(&Value::string("c3")));
}

#[test]
fn sum_and_avg_aggregate_a_numeric_field() {
    let fixture = common::Fixture::new();
    let values = [2, 9, 5];
    let mut state = Value::Sequence(values.iter().map(|v| card("c", "s", *v)).collect());
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);

    let sum_spec = ViewSpec { source: "$".into(), pipeline: vec![ViewOp::Sum { field: "Value".into() }] };
    let ViewOutput::Scalar(Value::Float(sum)) = rulecraft_core::evaluate_view(&mut ctx, &sum_spec).unwrap() else {
        panic!("expected a float sum");
    };
    assert!((sum - 16.0).abs() < 1e-9);

    let avg_spec = ViewSpec { source: "$".into(), pipeline: vec![ViewOp::Avg { field: "Value".into() }] };
    let ViewOutput::Scalar(Value::Float(avg)) = rulecraft_core::evaluate_view(&mut ctx, &avg_spec).unwrap() else {
        panic!("expected a float average");
    };
    assert!((avg - 16.0 / 3.0).abs() < 1e-9);
}

#[test]
fn empty_source_reduces_cleanly_to_null_and_zero() {
    let fixture = common::Fixture::new();
    let mut state = Value::Sequence(Vec::new());
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);

    let avg_spec = ViewSpec { source: "$".into(), pipeline: vec![ViewOp::Avg { field: "Value".into() }] };
    assert_eq!(rulecraft_core::evaluate_view(&mut ctx, &avg_spec).unwrap(), ViewOutput::Scalar(Value::Null));

    let count_spec = ViewSpec { source: "$".into(), pipeline: vec![ViewOp::Count] };
    assert_eq!(rulecraft_core::evaluate_view(&mut ctx, &count_spec).unwrap(), ViewOutput::Scalar(Value::Int(0)));
}

#[test]
fn custom_view_op_dispatches_through_the_registry() {
    let mut registry = rulecraft_core::Registry::new();
    let reverse: ViewOpHandler = Arc::new(|_ctx, items, _args| {
        let mut reversed = items.to_vec();
        reversed.reverse();
        Ok(Value::Sequence(reversed))
    });
    registry.register_view_op("reverse", reverse).unwrap();

    let clock = rulecraft_core::SystemClock;
    let rng = std::cell::RefCell::new(rand::rngs::StdRng::seed_from_u64(1));
    let sink = rulecraft_core::NullEventSink;
    let factory = rulecraft_core::NullEntityFactory;
    let destroyer = rulecraft_core::NullEntityDestroyer;
    let debug = rulecraft_core::NullDebugHandler;
    let mut state = Value::Sequence(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let mut ctx = rulecraft_core::EvalContext::new(
        &mut state, 100.0, 0, String::new(), None, &clock, &rng, &registry, &sink, &factory, &destroyer, &debug, None,
    );
    let spec = ViewSpec {
        source: "$".into(),
        pipeline: vec![ViewOp::Custom { kind: "reverse".into(), args: serde_json::Map::new() }],
    };
    let ViewOutput::Entities(out) = rulecraft_core::evaluate_view(&mut ctx, &spec).unwrap() else {
        panic!("expected entities");
    };
    assert_eq!(out, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
}
