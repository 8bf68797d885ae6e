// SPDX-License-Identifier: Apache-2.0
//! Effect application through the public [`rulecraft_core::apply_effect`]
//! entry point: sequence mutation, branching, and event emission.

mod common;

use std::cell::RefCell;
use std::collections::BTreeMap;

use rand::SeedableRng;
use rulecraft_core::{
    EffectSpec, EventSink, Operand, Record, RemoveSelector, TargetSpec, Value, WhereClause,
};

#[test]
fn append_creates_a_sequence_on_an_unset_field() {
    let fixture = common::Fixture::new();
    let mut state = Value::Record(Record::new("Root"));
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);
    let effect = EffectSpec::Append {
        targets: TargetSpec::default(),
        field: "Log".into(),
        value: Operand::Literal(Value::string("first")),
    };
    rulecraft_core::apply_effect(&mut ctx, &effect).unwrap();
    assert_eq!(state.field("Log"), Some(&Value::Sequence(vec![Value::string("first")])));
}

#[test]
fn remove_by_where_clause_drops_every_matching_element() {
    let fixture = common::Fixture::new();
    let mut state = Value::Record(Record::new("Root").with(
        "Items",
        Value::Sequence(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]),
    ));
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);
    let effect = EffectSpec::Remove {
        targets: TargetSpec::default(),
        field: "Items".into(),
        selector: RemoveSelector {
            index: None,
            where_clause: Some(WhereClause::Compare {
                field: Operand::Expr("self".into()),
                operator: rulecraft_core::Operator::Gt,
                value: Operand::Literal(Value::Int(2)),
            }),
        },
    };
    rulecraft_core::apply_effect(&mut ctx, &effect).unwrap();
    assert_eq!(state.field("Items"), Some(&Value::Sequence(vec![Value::Int(1), Value::Int(2)])));
}

#[test]
fn clear_empties_a_sequence_field_in_place() {
    let fixture = common::Fixture::new();
    let mut state = Value::Record(Record::new("Root").with("Items", Value::Sequence(vec![Value::Int(1), Value::Int(2)])));
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);
    let effect = EffectSpec::Clear { targets: TargetSpec::default(), field: "Items".into() };
    rulecraft_core::apply_effect(&mut ctx, &effect).unwrap();
    assert_eq!(state.field("Items"), Some(&Value::Sequence(Vec::new())));
}

#[test]
fn clear_empties_a_mapping_field_without_turning_it_into_a_sequence() {
    let fixture = common::Fixture::new();
    let mut inventory = BTreeMap::new();
    inventory.insert("sword".to_owned(), Value::Int(1));
    inventory.insert("shield".to_owned(), Value::Int(2));
    let mut state = Value::Record(Record::new("Root").with("Inventory", Value::Map(inventory)));
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);
    let effect = EffectSpec::Clear { targets: TargetSpec::default(), field: "Inventory".into() };
    rulecraft_core::apply_effect(&mut ctx, &effect).unwrap();
    assert_eq!(state.field("Inventory"), Some(&Value::Map(BTreeMap::new())));
}

#[test]
fn sequence_effect_applies_every_nested_effect_in_order() {
    let fixture = common::Fixture::new();
    let mut state = Value::Record(Record::new("Root").with("Score", Value::Int(0)));
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);
    let effect = EffectSpec::Sequence {
        effects: vec![
            EffectSpec::Set { targets: TargetSpec::default(), field: "Score".into(), value: Operand::Literal(Value::Int(5)) },
            EffectSpec::Increment {
                targets: TargetSpec::default(),
                field: "Score".into(),
                by: Operand::Literal(Value::Int(3)),
            },
        ],
    };
    rulecraft_core::apply_effect(&mut ctx, &effect).unwrap();
    assert_eq!(state.field("Score"), Some(&Value::Int(8)));
}

#[test]
fn if_effect_runs_the_otherwise_branch_when_condition_is_falsy() {
    let fixture = common::Fixture::new();
    let mut state = Value::Record(Record::new("Root").with("Branch", Value::string("unset")));
    let mut ctx = fixture.ctx(&mut state, 100.0, 0);
    let effect = EffectSpec::If {
        condition: Operand::Literal(Value::Bool(false)),
        then: vec![EffectSpec::Set {
            targets: TargetSpec::default(),
            field: "Branch".into(),
            value: Operand::Literal(Value::string("then")),
        }],
        otherwise: vec![EffectSpec::Set {
            targets: TargetSpec::default(),
            field: "Branch".into(),
            value: Operand::Literal(Value::string("otherwise")),
        }],
    };
    rulecraft_core::apply_effect(&mut ctx, &effect).unwrap();
    assert_eq!(state.field("Branch"), Some(&Value::string("otherwise")));
}

struct RecordingSink {
    events: RefCell<Vec<(String, String)>>,
}

impl EventSink for RecordingSink {
    fn emit(&self, event_name: &str, _payload: &BTreeMap<String, Value>, recipient_id: &str) {
        self.events.borrow_mut().push((event_name.to_owned(), recipient_id.to_owned()));
    }
}

#[test]
fn emit_delivers_the_resolved_event_to_the_wired_sink() {
    let clock = rulecraft_core::SystemClock;
    let rng = RefCell::new(rand::rngs::StdRng::seed_from_u64(1));
    let registry = rulecraft_core::Registry::new();
    let sink = RecordingSink { events: RefCell::new(Vec::new()) };
    let factory = rulecraft_core::NullEntityFactory;
    let destroyer = rulecraft_core::NullEntityDestroyer;
    let debug = rulecraft_core::NullDebugHandler;
    let mut state = Value::Null;
    let mut ctx = rulecraft_core::EvalContext::new(
        &mut state, 100.0, 0, String::new(), None, &clock, &rng, &registry, &sink, &factory, &destroyer, &debug, None,
    );
    let effect = EffectSpec::Emit {
        name: "PlayerScored".into(),
        params: BTreeMap::new(),
        recipient: Some("broadcast".into()),
    };
    rulecraft_core::apply_effect(&mut ctx, &effect).unwrap();
    assert_eq!(sink.events.borrow().as_slice(), &[("PlayerScored".to_owned(), "broadcast".to_owned())]);
}
