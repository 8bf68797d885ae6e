// SPDX-License-Identifier: Apache-2.0
//! Read-only view pipelines: `filter`/`map`/`flatMap`/`orderBy`/`groupBy`/
//! `distinct`/`first`/`last`/`limit`/`min`/`max`/`sum`/`avg`/`count`/
//! `distance`/`nearest`/`farthest`.
//!
//! A view never mutates state: it resolves a source expression into a
//! sequence, runs it through zero or more pipeline stages, and caches the
//! result under the view's name for `view:NAME[.FIELD]` lookups. Effect
//! target resolution deliberately does **not** go through this pipeline —
//! see `crate::effect` and `DESIGN.md` for why.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value as Json;

use crate::context::EvalContext;
use crate::error::{PathError, TransformError, ViewError};
use crate::geo::{self, DistanceUnit, GeoPoint};
use crate::transform::Operand;
use crate::util::{self, Operator};
use crate::value::Value;

/// A recursive where-clause predicate, evaluated per candidate entity with
/// that entity bound as `self`/`$`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum WhereClause {
    /// All sub-clauses must match.
    And { clauses: Vec<WhereClause> },
    /// At least one sub-clause must match.
    Or { clauses: Vec<WhereClause> },
    /// The sub-clause must not match.
    Not { clause: Box<WhereClause> },
    /// A single comparison leaf.
    Compare {
        field: Operand,
        operator: Operator,
        value: Operand,
    },
}

impl WhereClause {
    /// Evaluates this predicate against `ctx`, which must already have the
    /// candidate entity bound as current.
    ///
    /// A missing field on either side of a [`WhereClause::Compare`] leaf is
    /// not an error: it is reported to the context's debug handler and
    /// treated as "does not match".
    ///
    /// # Errors
    /// Propagates operand resolution failures other than a missing field
    /// (malformed path syntax, an unregistered custom transform kind, and
    /// so on).
    pub fn eval(&self, ctx: &EvalContext<'_>) -> Result<bool, ViewError> {
        match self {
            WhereClause::And { clauses } => {
                for c in clauses {
                    if !c.eval(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            WhereClause::Or { clauses } => {
                for c in clauses {
                    if c.eval(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            WhereClause::Not { clause } => Ok(!clause.eval(ctx)?),
            WhereClause::Compare { field, operator, value } => {
                let left = match resolve_or_missing(ctx, field) {
                    Some(v) => v?,
                    None => return Ok(false),
                };
                let right = match resolve_or_missing(ctx, value) {
                    Some(v) => v?,
                    None => return Ok(false),
                };
                Ok(util::compare(&left, *operator, &right))
            }
        }
    }
}

/// Resolves `operand` against `ctx`, reporting a missing field to the
/// debug handler and returning `None` instead of propagating it, per the
/// "missing field during a where-clause predicate is no-match, not an
/// error" rule. Any other resolution failure is returned as `Some(Err(_))`.
fn resolve_or_missing(ctx: &EvalContext<'_>, operand: &Operand) -> Option<Result<Value, ViewError>> {
    match operand.eval(ctx) {
        Ok(v) => Some(Ok(v)),
        Err(TransformError::Path(
            PathError::FieldNotFound(_) | PathError::NotNavigable | PathError::KeyNotFound(_),
        )) => {
            let entity_type = ctx.current_entity_value().ok().and_then(Value::type_name).unwrap_or("unknown");
            let field = match operand {
                Operand::Expr(expr) => expr.as_str(),
                Operand::Literal(_) | Operand::Nested(_) => "<non-path operand>",
            };
            ctx.debug_handler.missing_field(entity_type, field);
            None
        }
        Err(e) => Some(Err(e.into())),
    }
}

/// One stage of a view pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ViewOp {
    /// Keeps entities matching `where_clause`.
    Filter { where_clause: WhereClause },
    /// Projects each entity through `expr` (evaluated with the entity bound
    /// as current), replacing it in the pipeline.
    Map { expr: Operand },
    /// Expands `field` (a sequence-valued field on each entity) into the
    /// pipeline, flattening one level.
    FlatMap { field: String },
    /// Sorts by `field`, numeric if every value coerces, else
    /// lexicographic.
    OrderBy {
        field: String,
        #[serde(default)]
        descending: bool,
    },
    /// Groups entities into a mapping from `field`'s stringified value to
    /// the entities sharing it.
    GroupBy { field: String },
    /// Removes entities whose `field` value (or whole value, if `field` is
    /// unset) has already been seen.
    Distinct {
        #[serde(default)]
        field: Option<String>,
    },
    /// Keeps only the first entity.
    First,
    /// Keeps only the last entity.
    Last,
    /// Keeps at most the first `count` entities.
    Limit { count: usize },
    /// Reduces to the entity with the smallest `field` value.
    Min { field: String },
    /// Reduces to the entity with the largest `field` value.
    Max { field: String },
    /// Reduces to the numeric sum of `field` across all entities.
    Sum { field: String },
    /// Reduces to the numeric mean of `field` across all entities.
    Avg { field: String },
    /// Reduces to the number of entities.
    Count,
    /// Annotates each entity's `field`-named point with its distance from
    /// `from`, replacing the entity with `{entity, distance}`.
    Distance {
        from: Operand,
        field: String,
        #[serde(default)]
        unit: DistanceUnit,
    },
    /// Keeps the `count` entities closest to `from` (by `field`), nearest
    /// first.
    Nearest {
        from: Operand,
        field: String,
        #[serde(default)]
        unit: DistanceUnit,
        #[serde(default = "one")]
        count: usize,
    },
    /// Keeps the `count` entities farthest from `from` (by `field`),
    /// farthest first.
    Farthest {
        from: Operand,
        field: String,
        #[serde(default)]
        unit: DistanceUnit,
        #[serde(default = "one")]
        count: usize,
    },
    /// Escape hatch for a custom pipeline stage registered on
    /// [`crate::registry::Registry`].
    Custom {
        kind: String,
        #[serde(default)]
        args: JsonMap<String, Json>,
    },
}

fn one() -> usize {
    1
}

/// A named view: a source expression plus zero or more pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSpec {
    /// A `self.`/`$...`/`param:`/`view:`/`const:` expression resolving to
    /// the pipeline's input (a sequence, or a single entity wrapped as a
    /// one-element sequence).
    pub source: String,
    /// Pipeline stages, applied in order.
    #[serde(default)]
    pub pipeline: Vec<ViewOp>,
}

/// The result of evaluating a view pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewOutput {
    /// A sequence of entities (possibly filtered/reordered/transformed).
    Entities(Vec<Value>),
    /// A single aggregate scalar (`sum`/`avg`/`count`/`min`/`max`/`first`/
    /// `last` collapse to this).
    Scalar(Value),
    /// A `groupBy` result.
    Grouped(BTreeMap<String, Vec<Value>>),
}

impl ViewOutput {
    /// Flattens this output into a plain [`Value`] for caching under
    /// `view:NAME`.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            ViewOutput::Entities(items) => Value::Sequence(items),
            ViewOutput::Scalar(v) => v,
            ViewOutput::Grouped(groups) => Value::Map(
                groups
                    .into_iter()
                    .map(|(k, v)| (k, Value::Sequence(v)))
                    .collect(),
            ),
        }
    }
}

/// Evaluates `spec` against `ctx`, returning its output without mutating
/// state.
///
/// # Errors
/// Returns a [`ViewError`] if the source expression fails to resolve, a
/// pipeline stage references an unregistered custom kind, or an operand
/// resolves to the wrong shape (non-numeric `field`, non-sequence
/// `flatMap` target, ...).
pub fn evaluate(ctx: &mut EvalContext<'_>, spec: &ViewSpec) -> Result<ViewOutput, ViewError> {
    let source = ctx.resolve(&spec.source)?;
    let items: Vec<Value> = util::as_entity_slice(&source).into_iter().cloned().collect();

    let mut output = ViewOutput::Entities(items);
    for op in &spec.pipeline {
        let ViewOutput::Entities(current) = output else {
            return Err(ViewError::ExpectedSequence(op_name(op)));
        };
        output = apply_op(ctx, op, current)?;
    }
    Ok(output)
}

fn op_name(op: &ViewOp) -> String {
    match op {
        ViewOp::Filter { .. } => "filter",
        ViewOp::Map { .. } => "map",
        ViewOp::FlatMap { .. } => "flatMap",
        ViewOp::OrderBy { .. } => "orderBy",
        ViewOp::GroupBy { .. } => "groupBy",
        ViewOp::Distinct { .. } => "distinct",
        ViewOp::First => "first",
        ViewOp::Last => "last",
        ViewOp::Limit { .. } => "limit",
        ViewOp::Min { .. } => "min",
        ViewOp::Max { .. } => "max",
        ViewOp::Sum { .. } => "sum",
        ViewOp::Avg { .. } => "avg",
        ViewOp::Count => "count",
        ViewOp::Distance { .. } => "distance",
        ViewOp::Nearest { .. } => "nearest",
        ViewOp::Farthest { .. } => "farthest",
        ViewOp::Custom { kind, .. } => return kind.clone(),
    }
    .to_owned()
}

#[allow(clippy::too_many_lines)]
fn apply_op(ctx: &mut EvalContext<'_>, op: &ViewOp, items: Vec<Value>) -> Result<ViewOutput, ViewError> {
    match op {
        ViewOp::Filter { where_clause } => {
            let mut kept = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                let mut scratch = Value::Sequence(vec![item]);
                let matches = {
                    let child = candidate_context(ctx, &mut scratch, i);
                    where_clause.eval(&child)?
                };
                if matches {
                    if let Value::Sequence(mut one) = scratch {
                        kept.push(one.remove(0));
                    }
                }
            }
            Ok(ViewOutput::Entities(kept))
        }
        ViewOp::Map { expr } => {
            let mut mapped = Vec::with_capacity(items.len());
            for item in items {
                let mut scratch = Value::Sequence(vec![item]);
                let value = {
                    let child = candidate_context(ctx, &mut scratch, 0);
                    expr.eval(&child)?
                };
                mapped.push(value);
            }
            Ok(ViewOutput::Entities(mapped))
        }
        ViewOp::FlatMap { field } => {
            let mut flattened = Vec::new();
            for item in &items {
                match item.field(field) {
                    Some(Value::Sequence(nested)) => flattened.extend(nested.iter().cloned()),
                    Some(other) => flattened.push(other.clone()),
                    None => {}
                }
            }
            Ok(ViewOutput::Entities(flattened))
        }
        ViewOp::OrderBy { field, descending } => {
            let mut sortable = items;
            sortable.sort_by(|a, b| compare_field(a, b, field));
            if *descending {
                sortable.reverse();
            }
            Ok(ViewOutput::Entities(sortable))
        }
        ViewOp::GroupBy { field } => {
            let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
            for item in items {
                let key = item.field(field).map(Value::as_comparable_string).unwrap_or_default();
                groups.entry(key).or_default().push(item);
            }
            Ok(ViewOutput::Grouped(groups))
        }
        ViewOp::Distinct { field } => {
            let mut seen = std::collections::HashSet::new();
            let mut kept = Vec::new();
            for item in items {
                let key = field
                    .as_ref()
                    .and_then(|f| item.field(f))
                    .map_or_else(|| item.as_comparable_string(), Value::as_comparable_string);
                if seen.insert(key) {
                    kept.push(item);
                }
            }
            Ok(ViewOutput::Entities(kept))
        }
        ViewOp::First => Ok(ViewOutput::Scalar(items.into_iter().next().unwrap_or(Value::Null))),
        ViewOp::Last => Ok(ViewOutput::Scalar(items.into_iter().next_back().unwrap_or(Value::Null))),
        ViewOp::Limit { count } => Ok(ViewOutput::Entities(items.into_iter().take(*count).collect())),
        ViewOp::Min { field } => Ok(ViewOutput::Scalar(reduce_extreme(&items, field, false))),
        ViewOp::Max { field } => Ok(ViewOutput::Scalar(reduce_extreme(&items, field, true))),
        ViewOp::Sum { field } => {
            let total: f64 = items.iter().filter_map(|i| i.field(field)).filter_map(Value::as_f64).sum();
            Ok(ViewOutput::Scalar(Value::Float(total)))
        }
        ViewOp::Avg { field } => {
            let values: Vec<f64> = items.iter().filter_map(|i| i.field(field)).filter_map(Value::as_f64).collect();
            if values.is_empty() {
                Ok(ViewOutput::Scalar(Value::Null))
            } else {
                Ok(ViewOutput::Scalar(Value::Float(values.iter().sum::<f64>() / values.len() as f64)))
            }
        }
        ViewOp::Count => Ok(ViewOutput::Scalar(Value::Int(items.len() as i64))),
        ViewOp::Distance { from, field, unit } => {
            let origin = from.eval(ctx)?;
            let origin = point_of(&origin).ok_or_else(|| ViewError::MissingOperand {
                op: "distance".into(),
                operand: "from".into(),
            })?;
            let mut annotated = Vec::with_capacity(items.len());
            for item in items {
                let distance = item
                    .field(field)
                    .and_then(point_of)
                    .map(|p| unit.from_meters(geo::haversine_distance_m(origin, p)));
                let mut map = BTreeMap::new();
                map.insert("entity".to_owned(), item);
                map.insert("distance".to_owned(), distance.map_or(Value::Null, Value::Float));
                annotated.push(Value::Map(map));
            }
            Ok(ViewOutput::Entities(annotated))
        }
        ViewOp::Nearest { from, field, unit, count } => nearest_or_farthest(ctx, from, field, *unit, *count, items, false),
        ViewOp::Farthest { from, field, unit, count } => nearest_or_farthest(ctx, from, field, *unit, *count, items, true),
        ViewOp::Custom { kind, args } => {
            let handler = ctx
                .registry
                .view_op(kind)
                .ok_or_else(|| ViewError::UnknownOp(kind.clone()))?
                .clone();
            handler(ctx, &items, args).map(|v| match v {
                Value::Sequence(s) => ViewOutput::Entities(s),
                other => ViewOutput::Scalar(other),
            })
        }
    }
}

/// Builds a scratch context binding a single candidate value (stored in
/// `scratch`, a one-element sequence) as the current entity, so
/// `self`/`self.FIELD` resolve against it even though it may not be
/// addressable within the real state tree (e.g. the output of an earlier
/// `map` stage). Everything else is borrowed straight from `ctx`.
fn candidate_context<'b>(ctx: &'b EvalContext<'_>, scratch: &'b mut Value, index: usize) -> EvalContext<'b> {
    EvalContext {
        state: scratch,
        dt_ms: ctx.dt_ms,
        tick: ctx.tick,
        event: ctx.event.clone(),
        params: ctx.params.clone(),
        views: ctx.views.clone(),
        current_entity: Some(vec![crate::path::Segment::Index(0)]),
        current_index: Some(index),
        sender_id: ctx.sender_id.clone(),
        permission_schema: ctx.permission_schema,
        clock: ctx.clock,
        rng: ctx.rng,
        registry: ctx.registry,
        event_sink: ctx.event_sink,
        entity_factory: ctx.entity_factory,
        entity_destroyer: ctx.entity_destroyer,
        debug_handler: ctx.debug_handler,
        rule_controller: None,
    }
}

fn nearest_or_farthest(
    ctx: &EvalContext<'_>,
    from: &Operand,
    field: &str,
    unit: DistanceUnit,
    count: usize,
    items: Vec<Value>,
    farthest: bool,
) -> Result<ViewOutput, ViewError> {
    let origin = from.eval(ctx)?;
    let origin = point_of(&origin).ok_or_else(|| ViewError::MissingOperand {
        op: if farthest { "farthest".into() } else { "nearest".into() },
        operand: "from".into(),
    })?;
    let mut with_distance: Vec<(f64, Value)> = items
        .into_iter()
        .filter_map(|item| {
            let distance = item.field(field).and_then(point_of).map(|p| geo::haversine_distance_m(origin, p))?;
            Some((unit.from_meters(distance), item))
        })
        .collect();
    with_distance.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    if farthest {
        with_distance.reverse();
    }
    Ok(ViewOutput::Entities(with_distance.into_iter().take(count).map(|(_, v)| v).collect()))
}

fn point_of(v: &Value) -> Option<GeoPoint> {
    let lat = v.field("lat").or_else(|| v.field("Lat")).and_then(Value::as_f64)?;
    let lon = v.field("lon").or_else(|| v.field("Lon")).and_then(Value::as_f64)?;
    Some(GeoPoint::new(lat, lon))
}

fn compare_field(a: &Value, b: &Value, field: &str) -> std::cmp::Ordering {
    let (av, bv) = (a.field(field), b.field(field));
    match (av.and_then(Value::as_f64), bv.and_then(Value::as_f64)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => {
            let ax = av.map(Value::as_comparable_string).unwrap_or_default();
            let bx = bv.map(Value::as_comparable_string).unwrap_or_default();
            ax.cmp(&bx)
        }
    }
}

fn reduce_extreme(items: &[Value], field: &str, want_max: bool) -> Value {
    let mut best: Option<(f64, &Value)> = None;
    for item in items {
        let Some(v) = item.field(field).and_then(Value::as_f64) else {
            continue;
        };
        best = Some(match best {
            None => (v, item),
            Some((bv, bi)) => {
                if (want_max && v > bv) || (!want_max && v < bv) {
                    (v, item)
                } else {
                    (bv, bi)
                }
            }
        });
    }
    best.map_or(Value::Null, |(_, item)| item.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::external::{NullDebugHandler, NullEntityDestroyer, NullEntityFactory, NullEventSink};
    use crate::registry::Registry;
    use crate::value::Record;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;

    struct Fixture {
        clock: SystemClock,
        rng: RefCell<StdRng>,
        registry: Registry,
        sink: NullEventSink,
        factory: NullEntityFactory,
        destroyer: NullEntityDestroyer,
        debug: NullDebugHandler,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                clock: SystemClock,
                rng: RefCell::new(StdRng::seed_from_u64(1)),
                registry: Registry::new(),
                sink: NullEventSink,
                factory: NullEntityFactory,
                destroyer: NullEntityDestroyer,
                debug: NullDebugHandler,
            }
        }

        fn ctx<'a>(&'a self, state: &'a mut Value) -> EvalContext<'a> {
            EvalContext::new(
                state,
                100.0,
                0,
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

    fn players() -> Value {
        Value::Sequence(vec![
            Value::Record(Record::new("Player").with("Name", Value::string("a")).with("Score", Value::Int(10))),
            Value::Record(Record::new("Player").with("Name", Value::string("b")).with("Score", Value::Int(30))),
            Value::Record(Record::new("Player").with("Name", Value::string("c")).with("Score", Value::Int(20))),
        ])
    }

    #[test]
    fn filter_keeps_matching_entities() {
        let fixture = Fixture::new();
        let mut state = Value::Record(Record::new("Root").with("Players", players()));
        let mut ctx = fixture.ctx(&mut state);
        let spec = ViewSpec {
            source: "$.Players".into(),
            pipeline: vec![ViewOp::Filter {
                where_clause: WhereClause::Compare {
                    field: Operand::Expr("self.Score".into()),
                    operator: Operator::Gte,
                    value: Operand::Literal(Value::Int(20)),
                },
            }],
        };
        let ViewOutput::Entities(out) = evaluate(&mut ctx, &spec).unwrap() else {
            panic!("expected entities");
        };
        assert_eq!(out.len(), 2);
    }

    #[derive(Default)]
    struct RecordingDebugHandler {
        missing: RefCell<Vec<(String, String)>>,
    }

    impl crate::external::DebugHandler for RecordingDebugHandler {
        fn missing_field(&self, entity_type: &str, field: &str) {
            self.missing.borrow_mut().push((entity_type.to_owned(), field.to_owned()));
        }
    }

    #[test]
    fn filter_treats_a_missing_field_on_a_candidate_as_no_match_not_an_error() {
        let clock = SystemClock;
        let rng = RefCell::new(StdRng::seed_from_u64(1));
        let registry = Registry::new();
        let sink = NullEventSink;
        let factory = NullEntityFactory;
        let destroyer = NullEntityDestroyer;
        let debug = RecordingDebugHandler::default();
        let mut state = Value::Sequence(vec![
            Value::Record(Record::new("Player").with("Score", Value::Int(30))),
            Value::Record(Record::new("Spectator")),
        ]);
        let mut ctx = EvalContext::new(
            &mut state, 100.0, 0, String::new(), None, &clock, &rng, &registry, &sink, &factory, &destroyer, &debug,
            None,
        );
        let spec = ViewSpec {
            source: "$".into(),
            pipeline: vec![ViewOp::Filter {
                where_clause: WhereClause::Compare {
                    field: Operand::Expr("self.Score".into()),
                    operator: Operator::Gte,
                    value: Operand::Literal(Value::Int(20)),
                },
            }],
        };
        let ViewOutput::Entities(out) = evaluate(&mut ctx, &spec).unwrap() else {
            panic!("expected entities");
        };
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].type_name(), Some("Player"));
        assert_eq!(debug.missing.borrow().as_slice(), &[("Spectator".to_owned(), "self.Score".to_owned())]);
    }

    #[test]
    fn order_by_sum_and_avg_aggregate_numerically() {
        let fixture = Fixture::new();
        let mut state = Value::Record(Record::new("Root").with("Players", players()));
        let mut ctx = fixture.ctx(&mut state);
        let ordered = ViewSpec {
            source: "$.Players".into(),
            pipeline: vec![ViewOp::OrderBy { field: "Score".into(), descending: true }],
        };
        let ViewOutput::Entities(out) = evaluate(&mut ctx, &ordered).unwrap() else {
            panic!("expected entities");
        };
        assert_eq!(out[0].field("Name"), Some(&Value::string("b")));

        let summed = ViewSpec {
            source: "$.Players".into(),
            pipeline: vec![ViewOp::Sum { field: "Score".into() }],
        };
        assert_eq!(evaluate(&mut ctx, &summed).unwrap(), ViewOutput::Scalar(Value::Float(60.0)));

        let averaged = ViewSpec {
            source: "$.Players".into(),
            pipeline: vec![ViewOp::Avg { field: "Score".into() }],
        };
        assert_eq!(evaluate(&mut ctx, &averaged).unwrap(), ViewOutput::Scalar(Value::Float(20.0)));
    }

    #[test]
    fn group_by_partitions_entities() {
        let fixture = Fixture::new();
        let mut state = Value::Sequence(vec![
            Value::Record(Record::new("Card").with("Suit", Value::string("hearts"))),
            Value::Record(Record::new("Card").with("Suit", Value::string("spades"))),
            Value::Record(Record::new("Card").with("Suit", Value::string("hearts"))),
        ]);
        let mut ctx = fixture.ctx(&mut state);
        let spec = ViewSpec {
            source: "$".into(),
            pipeline: vec![ViewOp::GroupBy { field: "Suit".into() }],
        };
        let ViewOutput::Grouped(groups) = evaluate(&mut ctx, &spec).unwrap() else {
            panic!("expected grouped output");
        };
        assert_eq!(groups.get("hearts").map(Vec::len), Some(2));
        assert_eq!(groups.get("spades").map(Vec::len), Some(1));
    }

    #[test]
    fn nearest_orders_by_distance_ascending() {
        let fixture = Fixture::new();
        let mut state = Value::Sequence(vec![
            Value::Record(Record::new("Beacon").with("Pos", geo_point(0.01, 0.0))),
            Value::Record(Record::new("Beacon").with("Pos", geo_point(0.001, 0.0))),
        ]);
        let mut ctx = fixture.ctx(&mut state);
        let spec = ViewSpec {
            source: "$".into(),
            pipeline: vec![ViewOp::Nearest {
                from: Operand::Literal(geo_point(0.0, 0.0)),
                field: "Pos".into(),
                unit: DistanceUnit::Meters,
                count: 1,
            }],
        };
        let ViewOutput::Entities(out) = evaluate(&mut ctx, &spec).unwrap() else {
            panic!("expected entities");
        };
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].field("Pos"), Some(&geo_point(0.001, 0.0)));
    }

    fn geo_point(lat: f64, lon: f64) -> Value {
        Value::Record(Record::new("GeoPoint").with("lat", Value::Float(lat)).with("lon", Value::Float(lon)))
    }

    fn scored_players(scores: &[i64]) -> Value {
        Value::Sequence(
            scores
                .iter()
                .enumerate()
                .map(|(i, s)| Value::Record(Record::new("Player").with("Name", Value::string(format!("p{i}"))).with("Score", Value::Int(*s))))
                .collect(),
        )
    }

    fn gte20() -> WhereClause {
        WhereClause::Compare { field: Operand::Expr("self.Score".into()), operator: Operator::Gte, value: Operand::Literal(Value::Int(20)) }
    }

    fn even_name_len() -> WhereClause {
        WhereClause::Compare { field: Operand::Expr("self.Name".into()), operator: Operator::Ne, value: Operand::Literal(Value::string("p0")) }
    }

    proptest! {
        #[test]
        fn filter_then_filter_matches_filter_of_conjunction(scores in proptest::collection::vec(-50i64..50, 0..8)) {
            let fixture = Fixture::new();
            let mut state_a = scored_players(&scores);
            let mut ctx_a = fixture.ctx(&mut state_a);
            let chained = ViewSpec {
                source: "$".into(),
                pipeline: vec![
                    ViewOp::Filter { where_clause: gte20() },
                    ViewOp::Filter { where_clause: even_name_len() },
                ],
            };
            let ViewOutput::Entities(chained_out) = evaluate(&mut ctx_a, &chained).unwrap() else {
                panic!("expected entities");
            };

            let mut state_b = scored_players(&scores);
            let mut ctx_b = fixture.ctx(&mut state_b);
            let combined = ViewSpec {
                source: "$".into(),
                pipeline: vec![ViewOp::Filter {
                    where_clause: WhereClause::And { clauses: vec![gte20(), even_name_len()] },
                }],
            };
            let ViewOutput::Entities(combined_out) = evaluate(&mut ctx_b, &combined).unwrap() else {
                panic!("expected entities");
            };

            prop_assert_eq!(chained_out.len(), combined_out.len());
            for (a, b) in chained_out.iter().zip(combined_out.iter()) {
                prop_assert_eq!(a.field("Name"), b.field("Name"));
            }
        }

        #[test]
        fn limit_after_order_by_returns_stable_top_n(scores in proptest::collection::vec(-50i64..50, 0..8), n in 0usize..10) {
            let fixture = Fixture::new();
            let mut state = scored_players(&scores);
            let mut ctx = fixture.ctx(&mut state);
            let spec = ViewSpec {
                source: "$".into(),
                pipeline: vec![
                    ViewOp::OrderBy { field: "Score".into(), descending: true },
                    ViewOp::Limit { count: n },
                ],
            };
            let ViewOutput::Entities(out) = evaluate(&mut ctx, &spec).unwrap() else {
                panic!("expected entities");
            };
            prop_assert_eq!(out.len(), n.min(scores.len()));
            for window in out.windows(2) {
                let (Value::Int(a), Value::Int(b)) = (window[0].field("Score").unwrap(), window[1].field("Score").unwrap()) else {
                    panic!("expected ints");
                };
                prop_assert!(a >= b);
            }
        }
    }
}
