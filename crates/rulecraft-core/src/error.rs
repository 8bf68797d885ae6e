// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy for the rule engine, per subsystem.
//!
//! Each fallible subsystem gets its own error type; [`EngineError`] is the
//! top-level union every caller-facing entry point returns. Conversions are
//! derived via `#[from]` so `?` composes across subsystem boundaries without
//! manual wrapping, while still preserving which subsystem failed.

use thiserror::Error;

/// Errors raised while parsing or navigating a path expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    /// The path string did not conform to the path mini-language grammar.
    #[error("invalid path syntax: {0}")]
    InvalidSyntax(String),
    /// A field segment did not resolve on the current value.
    #[error("field not found: {0}")]
    FieldNotFound(String),
    /// An index segment was out of bounds for a sequence.
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Length of the sequence navigated.
        len: usize,
    },
    /// A key segment did not resolve on a keyed mapping.
    #[error("key not found: {0}")]
    KeyNotFound(String),
    /// An index or wildcard segment was applied to a non-sequence value.
    #[error("value is not a sequence")]
    NotASequence,
    /// A field or key segment was applied to a value with no fields (scalar).
    #[error("value has no fields")]
    NotNavigable,
    /// `self` was referenced but no current entity is bound in the context.
    #[error("`self` referenced with no current entity bound")]
    NoCurrentEntity,
    /// `param:NAME` referenced a parameter absent from the context.
    #[error("parameter not found: {0}")]
    ParamNotFound(String),
    /// `view:NAME` referenced a view absent from the context's view cache.
    #[error("view not found: {0}")]
    ViewNotFound(String),
    /// `view:NAME.FIELD` referenced a field absent from a cached view result.
    #[error("field {field} not found on view {view}")]
    ViewFieldNotFound {
        /// View name.
        view: String,
        /// Field name requested on the view's result.
        field: String,
    },
    /// A write target's value could not be converted to the existing type.
    #[error("value not convertible for write: {0}")]
    NotConvertible(String),
}

/// Permission violation: a sender attempted a write disallowed by the
/// permission schema.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("permission denied: sender {sender_id:?} may not write {field_name} ({required_policy:?}; owner {owner_id:?}): {message}")]
pub struct PermissionError {
    /// Field that was denied.
    pub field_name: String,
    /// The policy that rejected the write.
    pub required_policy: crate::permission::WritePolicy,
    /// Identifier of the sender that attempted the write (empty = server).
    pub sender_id: String,
    /// Owner identifier of the target record, if resolvable.
    pub owner_id: Option<String>,
    /// Human-readable explanation.
    pub message: String,
}

/// Errors raised while registering handlers with a [`crate::registry::Registry`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// A view operation kind was already registered.
    #[error("duplicate view operation kind: {0}")]
    DuplicateViewOp(String),
    /// An effect kind was already registered.
    #[error("duplicate effect kind: {0}")]
    DuplicateEffect(String),
    /// A transform kind was already registered.
    #[error("duplicate transform kind: {0}")]
    DuplicateTransform(String),
}

/// Errors raised while evaluating a view pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewError {
    /// Path resolution failed.
    #[error(transparent)]
    Path(#[from] PathError),
    /// A nested transform operand failed to evaluate.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// The named root-level collection does not exist or is not a sequence.
    #[error("view source not found or not a sequence: {0}")]
    SourceNotFound(String),
    /// A pipeline operation kind has no registered handler (built-in or custom).
    #[error("unknown view operation kind: {0}")]
    UnknownOp(String),
    /// A required operand was missing from a view operation's spec.
    #[error("view operation {op} missing operand {operand}")]
    MissingOperand {
        /// Operation kind.
        op: String,
        /// Name of the missing operand.
        operand: String,
    },
    /// A step expected a sequence input but received something else.
    #[error("view operation {0} expects a sequence input")]
    ExpectedSequence(String),
    /// A step expected a single element (scalar/entity) but received a sequence.
    #[error("view operation {0} expects a scalar input")]
    ExpectedScalar(String),
}

/// Errors raised while evaluating a transform expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// Path resolution failed while resolving an operand.
    #[error(transparent)]
    Path(#[from] PathError),
    /// A transform kind has no registered handler (built-in or custom).
    #[error("unknown transform kind: {0}")]
    UnknownKind(String),
    /// A required operand was missing from a transform's spec.
    #[error("transform {kind} missing operand {operand}")]
    MissingOperand {
        /// Transform kind.
        kind: String,
        /// Name of the missing operand.
        operand: String,
    },
    /// Division transform with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,
    /// Modulo transform with a zero divisor.
    #[error("modulo by zero")]
    ModuloByZero,
    /// An operand could not be coerced to a number.
    #[error("operand is not numeric: {0}")]
    NotNumeric(String),
    /// A string-format transform's template was malformed.
    #[error("invalid format template: {0}")]
    InvalidFormat(String),
}

/// Errors raised while applying an effect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EffectError {
    /// Path resolution or mutation failed.
    #[error(transparent)]
    Path(#[from] PathError),
    /// A write was rejected by the permission model.
    #[error(transparent)]
    Permission(#[from] PermissionError),
    /// A view used to resolve effect targets failed.
    #[error(transparent)]
    View(#[from] ViewError),
    /// A nested transform failed.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// An effect kind has no registered handler (built-in or custom).
    #[error("unknown effect kind: {0}")]
    UnknownKind(String),
    /// A required operand was missing from an effect's spec.
    #[error("effect {kind} missing operand {operand}")]
    MissingOperand {
        /// Effect kind.
        kind: String,
        /// Name of the missing operand.
        operand: String,
    },
    /// `targets` resolved to something other than a sequence of entities.
    #[error("effect targets did not resolve to a sequence of entities")]
    InvalidTargets,
    /// An arithmetic effect (increment/decrement) targeted a non-numeric field.
    #[error("target field is not numeric: {0}")]
    NotNumeric(String),
    /// An index-based remove/access was out of bounds.
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Length of the collection.
        len: usize,
    },
    /// A rule/trigger/timer control effect referenced an unknown rule.
    #[error("rule not found: {0}")]
    RuleNotFound(String),
    /// A rule/trigger/timer control effect fired with no controller wired.
    #[error("no rule controller wired to the context")]
    NoController,
}

/// Errors raised while evaluating a trigger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TriggerError {
    /// The `cron` expression failed to parse.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
    /// The `every`/`at` schedule spec failed to parse.
    #[error("invalid schedule expression: {0}")]
    InvalidSchedule(String),
    /// A `condition` trigger's boolean expression failed to resolve.
    #[error(transparent)]
    Path(#[from] PathError),
    /// A `condition` trigger's where-clause leaf failed to evaluate.
    #[error(transparent)]
    Condition(#[from] ViewError),
    /// A `distance` trigger's operand failed to resolve.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// A `distance` trigger's operand resolved to something other than a
    /// `{lat, lon}` point, or its threshold was non-numeric.
    #[error("invalid distance trigger operand: {0}")]
    InvalidOperand(String),
}

/// Top-level error returned by the engine's public entry points.
///
/// Each variant wraps a subsystem error unchanged; the engine adds only a
/// short contextual prefix (rule name, effect index, view name) via the
/// `context` field rather than re-stringifying the cause.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A rule's trigger could not be evaluated.
    #[error("rule {rule}: trigger: {source}")]
    Trigger {
        /// Name of the rule whose trigger failed.
        rule: String,
        /// Underlying trigger error.
        source: TriggerError,
    },
    /// A rule's view failed to evaluate.
    #[error("rule {rule}: view {view}: {source}")]
    View {
        /// Name of the rule being executed.
        rule: String,
        /// Name of the view that failed.
        view: String,
        /// Underlying view error.
        source: ViewError,
    },
    /// A rule's effect failed to apply.
    #[error("rule {rule}: effect {index}: {source}")]
    Effect {
        /// Name of the rule being executed.
        rule: String,
        /// Index of the effect within the rule's effect list.
        index: usize,
        /// Underlying effect error.
        source: EffectError,
    },
    /// A rule name collided with an already-registered rule.
    #[error("duplicate rule name: {0}")]
    DuplicateRuleName(String),
    /// A rule-control operation referenced an unknown rule name.
    #[error("rule not found: {0}")]
    RuleNotFound(String),
    /// The caller's cancellation signal fired between rules.
    #[error("tick cancelled: {0}")]
    Cancelled(String),
    /// A registry registration collided with an existing handler.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
