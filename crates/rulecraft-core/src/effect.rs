// SPDX-License-Identifier: Apache-2.0
//! Effects: the mutating half of rule execution.
//!
//! Effect targets are deliberately simpler than the read-only view pipeline
//! in [`crate::view`]: a [`TargetSpec`] resolves a source expression
//! straight to addressable paths in the state tree (via
//! [`EvalContext::full_path_for`]) and optionally filters them with a
//! [`WhereClause`], but never passes through `map`/`flatMap`/aggregate
//! stages, which would synthesize values no longer addressable for
//! mutation. See `DESIGN.md` for the rationale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value as Json;

use crate::context::EvalContext;
use crate::error::EffectError;
use crate::path::{self, Segment};
use crate::transform::{Operand, Transform};
use crate::value::Value;
use crate::view::WhereClause;

/// Which entities an effect applies to.
///
/// `source` defaults to `$` (the current entity if one is bound, else the
/// root state, per the Root resolution rule) when unset. If the resolved
/// value is a sequence, every element is a candidate; otherwise the
/// resolved path itself is the sole candidate. `where_clause`, if present,
/// further filters candidates with each bound as the current entity.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    /// `self.`/`$...`/`param:`/`view:`/`const:` expression resolving to the
    /// base path.
    #[serde(default)]
    pub source: Option<String>,
    /// Optional predicate narrowing the candidate set.
    #[serde(default)]
    pub where_clause: Option<WhereClause>,
}

/// Resolves `spec` to the set of addressable paths an effect should apply
/// to.
///
/// # Errors
/// Returns an [`EffectError`] if the source expression fails to resolve or
/// a where-clause leaf fails to evaluate.
pub fn resolve_targets(ctx: &mut EvalContext<'_>, spec: &TargetSpec) -> Result<Vec<Vec<Segment>>, EffectError> {
    let base_expr = spec.source.as_deref().unwrap_or("$");
    let base_path = ctx.full_path_for(base_expr).map_err(EffectError::from)?;
    let sequence_len = match path::navigate(ctx.state, &base_path).map_err(EffectError::from)? {
        Value::Sequence(seq) => Some(seq.len()),
        _ => None,
    };

    let mut candidates: Vec<Vec<Segment>> = match sequence_len {
        Some(len) => (0..len)
            .map(|i| {
                let mut p = base_path.clone();
                p.push(Segment::Index(i));
                p
            })
            .collect(),
        None => vec![base_path],
    };

    if let Some(where_clause) = &spec.where_clause {
        let mut filtered = Vec::with_capacity(candidates.len());
        for (i, candidate_path) in candidates.into_iter().enumerate() {
            let matches = {
                let child = ctx.with_entity(candidate_path.clone(), i);
                where_clause.eval(&child)?
            };
            if matches {
                filtered.push(candidate_path);
            }
        }
        candidates = filtered;
    }
    Ok(candidates)
}

/// How a `remove` effect selects which element(s) of a sequence field to
/// drop.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoveSelector {
    /// Removes the element at this index (evaluated per target).
    #[serde(default)]
    pub index: Option<Operand>,
    /// Removes every element matching this predicate (evaluated with the
    /// element bound as the current entity).
    #[serde(default)]
    pub where_clause: Option<WhereClause>,
}

/// A single effect. Variants that take `targets` apply once per resolved
/// target, with that target bound as the current entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EffectSpec {
    /// Sets `field` on each target to `value`.
    Set {
        #[serde(default)]
        targets: TargetSpec,
        field: String,
        value: Operand,
    },
    /// Adds `by` (default `1`) to `field` on each target.
    Increment {
        #[serde(default)]
        targets: TargetSpec,
        field: String,
        #[serde(default = "default_increment")]
        by: Operand,
    },
    /// Subtracts `by` (default `1`) from `field` on each target.
    Decrement {
        #[serde(default)]
        targets: TargetSpec,
        field: String,
        #[serde(default = "default_increment")]
        by: Operand,
    },
    /// Appends `value` to the sequence at `field` on each target.
    Append {
        #[serde(default)]
        targets: TargetSpec,
        field: String,
        value: Operand,
    },
    /// Removes element(s) from the sequence at `field` on each target, per
    /// `selector`.
    Remove {
        #[serde(default)]
        targets: TargetSpec,
        field: String,
        #[serde(flatten)]
        selector: RemoveSelector,
    },
    /// Empties the sequence at `field` on each target.
    Clear {
        #[serde(default)]
        targets: TargetSpec,
        field: String,
    },
    /// Sets `field` on each target to the result of evaluating `transform`.
    Transform {
        #[serde(default)]
        targets: TargetSpec,
        field: String,
        transform: Transform,
    },
    /// Sets `field` on each target to the result of `view` (optionally
    /// projected through `view_field`).
    SetFromView {
        #[serde(default)]
        targets: TargetSpec,
        field: String,
        view: String,
        #[serde(default)]
        view_field: Option<String>,
    },
    /// Applies `then` if `condition` is truthy, else `otherwise`.
    If {
        condition: Operand,
        #[serde(default)]
        then: Vec<EffectSpec>,
        #[serde(default)]
        otherwise: Vec<EffectSpec>,
    },
    /// Applies each effect in order.
    Sequence { effects: Vec<EffectSpec> },
    /// Emits `name` with `params` (resolved once against the current
    /// context, not per-target) to `recipient`; a no-op if no event sink
    /// is wired.
    Emit {
        name: String,
        #[serde(default)]
        params: BTreeMap<String, Operand>,
        #[serde(default)]
        recipient: Option<String>,
    },
    /// Constructs a new entity via the host's entity factory, if wired.
    Spawn {
        entity_type: String,
        #[serde(default)]
        fields: BTreeMap<String, Operand>,
    },
    /// Destroys every resolved target via the host's entity destroyer, if
    /// wired.
    Destroy {
        #[serde(default)]
        targets: TargetSpec,
    },
    /// Enables or disables a rule by name.
    SetRuleEnabled { rule: String, enabled: bool },
    /// Enables or disables a rule's trigger by name.
    SetTriggerEnabled { rule: String, enabled: bool },
    /// Clears a rule's trigger scratch state (timer start, wait-fired set).
    ResetTimer { rule: String },
    /// Escape hatch: dispatches to a [`crate::registry::Registry`]-registered
    /// handler for kinds outside the built-in vocabulary.
    Custom {
        kind: String,
        #[serde(default)]
        args: JsonMap<String, Json>,
    },
}

fn default_increment() -> Operand {
    Operand::Literal(Value::Int(1))
}

/// Applies `effect` against `ctx`.
///
/// # Errors
/// Returns an [`EffectError`] if target resolution, operand evaluation, or
/// the underlying mutation fails.
pub fn apply(ctx: &mut EvalContext<'_>, effect: &EffectSpec) -> Result<(), EffectError> {
    match effect {
        EffectSpec::Set { targets, field, value } => {
            apply_per_target(ctx, targets, |child| {
                let resolved = value.eval(child)?;
                child.set_path(&format!("self.{field}"), resolved)
            })
        }
        EffectSpec::Increment { targets, field, by } => apply_arithmetic(ctx, targets, field, by, 1.0),
        EffectSpec::Decrement { targets, field, by } => apply_arithmetic(ctx, targets, field, by, -1.0),
        EffectSpec::Append { targets, field, value } => {
            apply_per_target(ctx, targets, |child| {
                let resolved = value.eval(child)?;
                let full_path = child.full_path_for(&format!("self.{field}")).map_err(EffectError::from)?;
                let target = navigate_mut(child.state, &full_path)?;
                match target {
                    Value::Sequence(seq) => {
                        seq.push(resolved);
                        Ok(())
                    }
                    Value::Null => {
                        *target = Value::Sequence(vec![resolved]);
                        Ok(())
                    }
                    _ => Err(EffectError::Path(crate::error::PathError::NotASequence)),
                }
            })
        }
        EffectSpec::Remove { targets, field, selector } => {
            apply_per_target(ctx, targets, |child| remove_from_field(child, field, selector))
        }
        EffectSpec::Clear { targets, field } => apply_per_target(ctx, targets, |child| {
            let full_path = child.full_path_for(&format!("self.{field}")).map_err(EffectError::from)?;
            let target = navigate_mut(child.state, &full_path)?;
            match target {
                Value::Sequence(seq) => {
                    seq.clear();
                    Ok(())
                }
                Value::Map(map) => {
                    map.clear();
                    Ok(())
                }
                Value::Null => Ok(()),
                _ => Err(EffectError::Path(crate::error::PathError::NotNavigable)),
            }
        }),
        EffectSpec::Transform { targets, field, transform } => {
            apply_per_target(ctx, targets, |child| {
                let resolved = transform.eval(child)?;
                child.set_path(&format!("self.{field}"), resolved)
            })
        }
        EffectSpec::SetFromView { targets, field, view, view_field } => {
            apply_per_target(ctx, targets, |child| {
                let expr = view_field.as_ref().map_or_else(|| format!("view:{view}"), |f| format!("view:{view}.{f}"));
                let resolved = child.resolve(&expr).map_err(EffectError::from)?;
                child.set_path(&format!("self.{field}"), resolved)
            })
        }
        EffectSpec::If { condition, then, otherwise } => {
            let taken = condition.eval(ctx)?.truthy();
            for nested in if taken { then } else { otherwise } {
                apply(ctx, nested)?;
            }
            Ok(())
        }
        EffectSpec::Sequence { effects } => {
            for nested in effects {
                apply(ctx, nested)?;
            }
            Ok(())
        }
        EffectSpec::Emit { name, params, recipient } => {
            let mut payload = BTreeMap::new();
            for (key, operand) in params {
                payload.insert(key.clone(), operand.eval(ctx)?);
            }
            ctx.event_sink.emit(name, &payload, recipient.as_deref().unwrap_or(""));
            Ok(())
        }
        EffectSpec::Spawn { entity_type, fields } => {
            let mut resolved = BTreeMap::new();
            for (key, operand) in fields {
                resolved.insert(key.clone(), operand.eval(ctx)?);
            }
            if let Some(schema) = ctx.permission_schema {
                if let Some(owner_field) = schema.owner_field(entity_type) {
                    resolved
                        .entry(owner_field.to_owned())
                        .or_insert_with(|| Value::String(ctx.sender_id.clone()));
                }
            }
            ctx.entity_factory.spawn(entity_type, &resolved)?;
            Ok(())
        }
        EffectSpec::Destroy { targets } => {
            let target_paths = resolve_targets(ctx, targets)?;
            let mut values = Vec::with_capacity(target_paths.len());
            for path in &target_paths {
                values.push(path::navigate(ctx.state, path).map_err(EffectError::from)?.clone());
            }
            ctx.entity_destroyer.destroy(&values)
        }
        EffectSpec::SetRuleEnabled { rule, enabled } => {
            let controller = ctx.rule_controller.as_mut().ok_or(EffectError::NoController)?;
            if controller.enable_rule(rule, *enabled) {
                Ok(())
            } else {
                Err(EffectError::RuleNotFound(rule.clone()))
            }
        }
        EffectSpec::SetTriggerEnabled { rule, enabled } => {
            let controller = ctx.rule_controller.as_mut().ok_or(EffectError::NoController)?;
            if controller.enable_trigger(rule, *enabled) {
                Ok(())
            } else {
                Err(EffectError::RuleNotFound(rule.clone()))
            }
        }
        EffectSpec::ResetTimer { rule } => {
            let controller = ctx.rule_controller.as_mut().ok_or(EffectError::NoController)?;
            if controller.reset_timer(rule) {
                Ok(())
            } else {
                Err(EffectError::RuleNotFound(rule.clone()))
            }
        }
        EffectSpec::Custom { kind, args } => {
            let handler = ctx.registry.effect(kind).ok_or_else(|| EffectError::UnknownKind(kind.clone()))?.clone();
            handler(ctx, args)
        }
    }
}

/// Resolves `targets`, then runs `op` once per resolved candidate with that
/// candidate bound as the current entity.
fn apply_per_target(
    ctx: &mut EvalContext<'_>,
    targets: &TargetSpec,
    op: impl Fn(&mut EvalContext<'_>) -> Result<(), EffectError>,
) -> Result<(), EffectError> {
    let paths = resolve_targets(ctx, targets)?;
    for (i, path) in paths.into_iter().enumerate() {
        let mut child = ctx.with_entity(path, i);
        op(&mut child)?;
    }
    Ok(())
}

fn apply_arithmetic(
    ctx: &mut EvalContext<'_>,
    targets: &TargetSpec,
    field: &str,
    by: &Operand,
    sign: f64,
) -> Result<(), EffectError> {
    apply_per_target(ctx, targets, |child| {
        let delta = by.eval(child)?.as_f64().ok_or_else(|| EffectError::NotNumeric(field.to_owned()))?;
        let current = child
            .resolve(&format!("self.{field}"))
            .map_err(EffectError::from)?
            .as_f64()
            .ok_or_else(|| EffectError::NotNumeric(field.to_owned()))?;
        child.set_path(&format!("self.{field}"), Value::Float(sign.mul_add(delta, current)))
    })
}

fn remove_from_field(child: &mut EvalContext<'_>, field: &str, selector: &RemoveSelector) -> Result<(), EffectError> {
    let full_path = child.full_path_for(&format!("self.{field}")).map_err(EffectError::from)?;
    if let Some(index_operand) = &selector.index {
        let index = index_operand.eval(child)?.as_f64().ok_or_else(|| EffectError::NotNumeric(field.to_owned()))? as usize;
        let target = navigate_mut(child.state, &full_path)?;
        let Value::Sequence(seq) = target else {
            return Err(EffectError::Path(crate::error::PathError::NotASequence));
        };
        if index >= seq.len() {
            return Err(EffectError::IndexOutOfBounds { index, len: seq.len() });
        }
        seq.remove(index);
        return Ok(());
    }
    if let Some(where_clause) = &selector.where_clause {
        let element_count = {
            let target = navigate_mut(child.state, &full_path)?;
            let Value::Sequence(seq) = target else {
                return Err(EffectError::Path(crate::error::PathError::NotASequence));
            };
            seq.len()
        };
        let mut keep = Vec::with_capacity(element_count);
        for i in 0..element_count {
            let mut element_path = full_path.clone();
            element_path.push(Segment::Index(i));
            let matches = {
                let grandchild = child.with_entity(element_path, i);
                where_clause.eval(&grandchild)?
            };
            keep.push(!matches);
        }
        let target = navigate_mut(child.state, &full_path)?;
        let Value::Sequence(seq) = target else {
            return Err(EffectError::Path(crate::error::PathError::NotASequence));
        };
        let mut i = 0;
        seq.retain(|_| {
            let keep_this = keep[i];
            i += 1;
            keep_this
        });
        return Ok(());
    }
    Ok(())
}

fn navigate_mut<'a>(root: &'a mut Value, full_path: &[Segment]) -> Result<&'a mut Value, EffectError> {
    if full_path.is_empty() {
        return Ok(root);
    }
    let (parent, last) = path::navigate_to_parent(root, full_path).map_err(EffectError::from)?;
    match last {
        Segment::Field(name) | Segment::Key(name) => {
            parent.field_mut(name).ok_or_else(|| EffectError::Path(crate::error::PathError::FieldNotFound(name.clone())))
        }
        Segment::Index(i) => {
            let len = parent.as_sequence().map_or(0, <[Value]>::len);
            parent
                .index_mut(*i)
                .ok_or(EffectError::Path(crate::error::PathError::IndexOutOfBounds { index: *i, len }))
        }
        Segment::Wildcard => Err(EffectError::Path(crate::error::PathError::InvalidSyntax(
            "wildcard segments are not writable".into(),
        ))),
    }
}
