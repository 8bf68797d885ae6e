// SPDX-License-Identifier: Apache-2.0
//! Transform expressions: arithmetic, geo, string, logic, time, and utility
//! operators over lazily-resolved operands.
//!
//! Built-in kinds are a closed `match`; [`Transform::Custom`] is the escape
//! hatch dispatched through [`crate::registry::Registry`].

use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value as Json;

use crate::context::EvalContext;
use crate::error::TransformError;
use crate::geo::{self, DistanceUnit, GeoPoint};
use crate::value::Value;

/// A lazily-resolved transform operand: a literal, a path/prefix
/// expression string, or a nested transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// A nested transform, evaluated recursively.
    Nested(Box<Transform>),
    /// A `self.`/`$...`/`param:`/`view:`/`const:`/literal expression string,
    /// resolved via [`EvalContext::resolve`].
    Expr(String),
    /// A literal scalar embedded directly in the spec.
    Literal(Value),
}

impl Operand {
    /// Resolves this operand against `ctx`.
    ///
    /// # Errors
    /// Propagates path resolution failures and nested transform failures.
    pub fn eval(&self, ctx: &EvalContext<'_>) -> Result<Value, TransformError> {
        match self {
            Operand::Nested(t) => t.eval(ctx),
            Operand::Expr(s) => Ok(ctx.resolve(s)?),
            Operand::Literal(v) => Ok(v.clone()),
        }
    }

    fn eval_f64(&self, ctx: &EvalContext<'_>, kind: &str, operand: &str) -> Result<f64, TransformError> {
        let v = self.eval(ctx)?;
        v.as_f64()
            .ok_or_else(|| TransformError::NotNumeric(format!("{kind}.{operand}: {v:?}")))
    }

    fn eval_point(&self, ctx: &EvalContext<'_>, kind: &str, operand: &str) -> Result<GeoPoint, TransformError> {
        let v = self.eval(ctx)?;
        value_to_point(&v).ok_or_else(|| TransformError::NotNumeric(format!("{kind}.{operand}: {v:?}")))
    }
}

fn value_to_point(v: &Value) -> Option<GeoPoint> {
    let lat = v.field("lat").or_else(|| v.field("Lat")).and_then(Value::as_f64)?;
    let lon = v.field("lon").or_else(|| v.field("Lon")).and_then(Value::as_f64)?;
    Some(GeoPoint::new(lat, lon))
}

/// The closed vocabulary of built-in transform kinds, plus [`Transform::Custom`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Transform {
    /// `left + right`.
    Add { left: Operand, right: Operand },
    /// `left - right`.
    Subtract { left: Operand, right: Operand },
    /// `left * right`.
    Multiply { left: Operand, right: Operand },
    /// `left / right`.
    Divide { left: Operand, right: Operand },
    /// `left % right`.
    Modulo { left: Operand, right: Operand },
    /// Clamps `value` into `[min, max]`.
    Clamp {
        value: Operand,
        min: Operand,
        max: Operand,
    },
    /// Rounds to the nearest integer.
    Round { value: Operand },
    /// Rounds down.
    Floor { value: Operand },
    /// Rounds up.
    Ceil { value: Operand },
    /// Absolute value.
    Abs { value: Operand },
    /// Smallest of `values`.
    Min { values: Vec<Operand> },
    /// Largest of `values`.
    Max { values: Vec<Operand> },
    /// A uniformly distributed random float in `[min, max)`.
    Random { min: Operand, max: Operand },
    /// Moves a `{lat, lon}` point towards another at a given speed.
    MoveTowards {
        current: Operand,
        target: Operand,
        speed_m_per_ms: Operand,
        delta_ms: Operand,
    },
    /// Great-circle distance between two `{lat, lon}` points.
    GpsDistance {
        from: Operand,
        to: Operand,
        #[serde(default)]
        unit: DistanceUnit,
    },
    /// Initial compass bearing from one point to another, in degrees.
    GpsBearing { from: Operand, to: Operand },
    /// Whether `point` lies within `radius` of `center`.
    PointInRadius {
        point: Operand,
        center: Operand,
        radius: Operand,
        #[serde(default)]
        unit: DistanceUnit,
    },
    /// Whether `point` lies within a polygon (a sequence of `{lat, lon}`).
    PointInPolygon { point: Operand, polygon: Operand },
    /// Concatenates the string rendering of every operand.
    Concat { values: Vec<Operand> },
    /// Substitutes `{0}`, `{1}`, ... placeholders in `template`.
    Format { template: Operand, values: Vec<Operand> },
    /// Extracts a substring `[start, end)`; `end` defaults to the string's length.
    Substring {
        value: Operand,
        start: Operand,
        end: Option<Operand>,
    },
    /// Uppercases a string.
    ToUpper { value: Operand },
    /// Lowercases a string.
    ToLower { value: Operand },
    /// Trims leading/trailing whitespace.
    Trim { value: Operand },
    /// `condition.truthy() ? then : otherwise`.
    If {
        condition: Operand,
        then: Operand,
        otherwise: Operand,
    },
    /// The first non-null operand, or `Value::Null` if all are null.
    Coalesce { values: Vec<Operand> },
    /// Boolean negation of `value.truthy()`.
    Not { value: Operand },
    /// Current wall-clock time, milliseconds since the Unix epoch.
    Now,
    /// Milliseconds elapsed between `since` (epoch ms) and the current time.
    TimeSince { since: Operand },
    /// Adds `amount_ms` milliseconds to `base` (epoch ms).
    TimeAdd { base: Operand, amount_ms: Operand },
    /// A random (v4) UUID string.
    Uuid,
    /// Escape hatch: dispatches to a [`crate::registry::Registry`]-registered
    /// handler for kinds outside the built-in vocabulary.
    Custom {
        kind: String,
        #[serde(default)]
        args: JsonMap<String, Json>,
    },
}

impl Transform {
    /// Evaluates this transform against `ctx`.
    ///
    /// # Errors
    /// Returns a [`TransformError`] for missing/non-numeric operands,
    /// division/modulo by zero, malformed format templates, or an
    /// unregistered [`Transform::Custom`] kind.
    pub fn eval(&self, ctx: &EvalContext<'_>) -> Result<Value, TransformError> {
        match self {
            Transform::Add { left, right } => {
                Ok(Value::Float(left.eval_f64(ctx, "add", "left")? + right.eval_f64(ctx, "add", "right")?))
            }
            Transform::Subtract { left, right } => Ok(Value::Float(
                left.eval_f64(ctx, "subtract", "left")? - right.eval_f64(ctx, "subtract", "right")?,
            )),
            Transform::Multiply { left, right } => Ok(Value::Float(
                left.eval_f64(ctx, "multiply", "left")? * right.eval_f64(ctx, "multiply", "right")?,
            )),
            Transform::Divide { left, right } => {
                let r = right.eval_f64(ctx, "divide", "right")?;
                if r == 0.0 {
                    return Err(TransformError::DivisionByZero);
                }
                Ok(Value::Float(left.eval_f64(ctx, "divide", "left")? / r))
            }
            Transform::Modulo { left, right } => {
                let r = right.eval_f64(ctx, "modulo", "right")?;
                if r == 0.0 {
                    return Err(TransformError::ModuloByZero);
                }
                Ok(Value::Float(left.eval_f64(ctx, "modulo", "left")? % r))
            }
            Transform::Clamp { value, min, max } => {
                let v = value.eval_f64(ctx, "clamp", "value")?;
                let lo = min.eval_f64(ctx, "clamp", "min")?;
                let hi = max.eval_f64(ctx, "clamp", "max")?;
                Ok(Value::Float(v.clamp(lo, hi)))
            }
            Transform::Round { value } => Ok(Value::Float(value.eval_f64(ctx, "round", "value")?.round())),
            Transform::Floor { value } => Ok(Value::Float(value.eval_f64(ctx, "floor", "value")?.floor())),
            Transform::Ceil { value } => Ok(Value::Float(value.eval_f64(ctx, "ceil", "value")?.ceil())),
            Transform::Abs { value } => Ok(Value::Float(value.eval_f64(ctx, "abs", "value")?.abs())),
            Transform::Min { values } => {
                let mut nums = Vec::with_capacity(values.len());
                for v in values {
                    nums.push(v.eval_f64(ctx, "min", "values")?);
                }
                nums.into_iter()
                    .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
                    .map(Value::Float)
                    .ok_or_else(|| TransformError::MissingOperand {
                        kind: "min".into(),
                        operand: "values".into(),
                    })
            }
            Transform::Max { values } => {
                let mut nums = Vec::with_capacity(values.len());
                for v in values {
                    nums.push(v.eval_f64(ctx, "max", "values")?);
                }
                nums.into_iter()
                    .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
                    .map(Value::Float)
                    .ok_or_else(|| TransformError::MissingOperand {
                        kind: "max".into(),
                        operand: "values".into(),
                    })
            }
            Transform::Random { min, max } => {
                let lo = min.eval_f64(ctx, "random", "min")?;
                let hi = max.eval_f64(ctx, "random", "max")?;
                let sample = {
                    use rand::Rng;
                    ctx.rng.borrow_mut().gen_range(lo..hi.max(lo + f64::EPSILON))
                };
                Ok(Value::Float(sample))
            }
            Transform::MoveTowards {
                current,
                target,
                speed_m_per_ms,
                delta_ms,
            } => {
                let current = current.eval_point(ctx, "moveTowards", "current")?;
                let target = target.eval_point(ctx, "moveTowards", "target")?;
                let speed = speed_m_per_ms.eval_f64(ctx, "moveTowards", "speed_m_per_ms")?;
                let dt = delta_ms.eval_f64(ctx, "moveTowards", "delta_ms")?;
                let moved = geo::move_towards(current, target, speed, dt);
                Ok(point_to_value(moved))
            }
            Transform::GpsDistance { from, to, unit } => {
                let from = from.eval_point(ctx, "gpsDistance", "from")?;
                let to = to.eval_point(ctx, "gpsDistance", "to")?;
                Ok(Value::Float(unit.from_meters(geo::haversine_distance_m(from, to))))
            }
            Transform::GpsBearing { from, to } => {
                let from = from.eval_point(ctx, "gpsBearing", "from")?;
                let to = to.eval_point(ctx, "gpsBearing", "to")?;
                Ok(Value::Float(geo::bearing_deg(from, to)))
            }
            Transform::PointInRadius { point, center, radius, unit } => {
                let point = point.eval_point(ctx, "pointInRadius", "point")?;
                let center = center.eval_point(ctx, "pointInRadius", "center")?;
                let radius = radius.eval_f64(ctx, "pointInRadius", "radius")?;
                Ok(Value::Bool(geo::point_in_radius(point, center, radius, *unit)))
            }
            Transform::PointInPolygon { point, polygon } => {
                let point = point.eval_point(ctx, "pointInPolygon", "point")?;
                let polygon_value = polygon.eval(ctx)?;
                let vertices: Vec<GeoPoint> = polygon_value
                    .as_sequence()
                    .unwrap_or_default()
                    .iter()
                    .filter_map(value_to_point)
                    .collect();
                Ok(Value::Bool(geo::point_in_polygon(point, &vertices)))
            }
            Transform::Concat { values } => {
                let mut out = String::new();
                for v in values {
                    out.push_str(&v.eval(ctx)?.as_comparable_string());
                }
                Ok(Value::String(out))
            }
            Transform::Format { template, values } => {
                let template = template.eval(ctx)?.as_comparable_string();
                let mut resolved = Vec::with_capacity(values.len());
                for v in values {
                    resolved.push(v.eval(ctx)?.as_comparable_string());
                }
                let mut out = template;
                for (i, value) in resolved.iter().enumerate() {
                    out = out.replace(&format!("{{{i}}}"), value);
                }
                Ok(Value::String(out))
            }
            Transform::Substring { value, start, end } => {
                let s = value.eval(ctx)?.as_comparable_string();
                let chars: Vec<char> = s.chars().collect();
                let start = start.eval_f64(ctx, "substring", "start")? as usize;
                let end = match end {
                    Some(e) => e.eval_f64(ctx, "substring", "end")? as usize,
                    None => chars.len(),
                };
                let start = start.min(chars.len());
                let end = end.clamp(start, chars.len());
                Ok(Value::String(chars[start..end].iter().collect()))
            }
            Transform::ToUpper { value } => Ok(Value::String(value.eval(ctx)?.as_comparable_string().to_uppercase())),
            Transform::ToLower { value } => Ok(Value::String(value.eval(ctx)?.as_comparable_string().to_lowercase())),
            Transform::Trim { value } => Ok(Value::String(value.eval(ctx)?.as_comparable_string().trim().to_owned())),
            Transform::If { condition, then, otherwise } => {
                if condition.eval(ctx)?.truthy() {
                    then.eval(ctx)
                } else {
                    otherwise.eval(ctx)
                }
            }
            Transform::Coalesce { values } => {
                for v in values {
                    // A resolution error is treated as nil, not propagated:
                    // coalesce is meant to tolerate an operand that doesn't
                    // apply to every entity shape.
                    let resolved = v.eval(ctx).unwrap_or(Value::Null);
                    if !matches!(resolved, Value::Null) {
                        return Ok(resolved);
                    }
                }
                Ok(Value::Null)
            }
            Transform::Not { value } => Ok(Value::Bool(!value.eval(ctx)?.truthy())),
            Transform::Now => Ok(Value::Int(ctx.clock.now_ms())),
            Transform::TimeSince { since } => {
                let since = since.eval_f64(ctx, "timeSince", "since")?;
                Ok(Value::Float(ctx.clock.now_ms() as f64 - since))
            }
            Transform::TimeAdd { base, amount_ms } => {
                let base = base.eval_f64(ctx, "timeAdd", "base")?;
                let amount = amount_ms.eval_f64(ctx, "timeAdd", "amount_ms")?;
                Ok(Value::Float(base + amount))
            }
            Transform::Uuid => Ok(Value::String(uuid::Uuid::new_v4().to_string())),
            Transform::Custom { kind, args } => {
                let handler = ctx
                    .registry
                    .transform(kind)
                    .ok_or_else(|| TransformError::UnknownKind(kind.clone()))?;
                handler(ctx, args)
            }
        }
    }
}

fn point_to_value(p: GeoPoint) -> Value {
    use crate::value::Record;
    Value::Record(Record::new("GeoPoint").with("lat", Value::Float(p.lat)).with("lon", Value::Float(p.lon)))
}
