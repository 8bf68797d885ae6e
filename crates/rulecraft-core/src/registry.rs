// SPDX-License-Identifier: Apache-2.0
//! Per-engine tables of custom view-operation, effect, and transform
//! handlers: registered once at startup, then read-only for the rest of
//! the engine's life, so lookups never need locking.
//!
//! Built-in kinds (`KeepWhere`, `Increment`, `Add`, ...) are dispatched by
//! direct `match` in [`crate::view`], [`crate::effect`], and
//! [`crate::transform`] — a closed, compile-time-checked set, the
//! idiomatic-Rust shape for a fixed vocabulary. This registry is the
//! escape hatch for the open part of that vocabulary: each domain's
//! `Custom` variant carries a string kind and a JSON payload, and the
//! registry maps that kind to a caller-supplied handler. An unknown
//! `Custom` kind with no registered handler is a load-time error.
//!
//! A `HashMap` of boxed trait objects, a `register` that rejects
//! duplicates, and a `get` for lookup.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Map as JsonMap;
use serde_json::Value as Json;

use crate::context::EvalContext;
use crate::error::{EffectError, RegistryError, TransformError, ViewError};
use crate::value::Value;

/// Handler for a custom view-operation kind: receives the pipeline's
/// current input sequence and the operation's JSON operand map, returns
/// the next stage's output.
pub type ViewOpHandler =
    Arc<dyn Fn(&EvalContext<'_>, &[Value], &JsonMap<String, Json>) -> Result<Value, ViewError> + Send + Sync>;

/// Handler for a custom effect kind: receives the (already entity-bound)
/// context and the effect's JSON operand map, mutates state through the
/// context.
pub type EffectHandler = Arc<
    dyn Fn(&mut EvalContext<'_>, &JsonMap<String, Json>) -> Result<(), EffectError> + Send + Sync,
>;

/// Handler for a custom transform kind: receives the context and the
/// transform's JSON operand map, returns the produced value.
pub type TransformHandler = Arc<
    dyn Fn(&EvalContext<'_>, &JsonMap<String, Json>) -> Result<Value, TransformError> + Send + Sync,
>;

/// The engine's escape-hatch registry for custom view/effect/transform
/// kinds.
#[derive(Clone, Default)]
pub struct Registry {
    view_ops: FxHashMap<String, ViewOpHandler>,
    effects: FxHashMap<String, EffectHandler>,
    transforms: FxHashMap<String, TransformHandler>,
}

impl Registry {
    /// Constructs an empty registry (no custom kinds registered).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom view-operation handler.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateViewOp`] if `kind` is already
    /// registered.
    pub fn register_view_op(
        &mut self,
        kind: impl Into<String>,
        handler: ViewOpHandler,
    ) -> Result<(), RegistryError> {
        let kind = kind.into();
        if self.view_ops.contains_key(&kind) {
            return Err(RegistryError::DuplicateViewOp(kind));
        }
        self.view_ops.insert(kind, handler);
        Ok(())
    }

    /// Registers a custom effect handler.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateEffect`] if `kind` is already
    /// registered.
    pub fn register_effect(
        &mut self,
        kind: impl Into<String>,
        handler: EffectHandler,
    ) -> Result<(), RegistryError> {
        let kind = kind.into();
        if self.effects.contains_key(&kind) {
            return Err(RegistryError::DuplicateEffect(kind));
        }
        self.effects.insert(kind, handler);
        Ok(())
    }

    /// Registers a custom transform handler.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateTransform`] if `kind` is already
    /// registered.
    pub fn register_transform(
        &mut self,
        kind: impl Into<String>,
        handler: TransformHandler,
    ) -> Result<(), RegistryError> {
        let kind = kind.into();
        if self.transforms.contains_key(&kind) {
            return Err(RegistryError::DuplicateTransform(kind));
        }
        self.transforms.insert(kind, handler);
        Ok(())
    }

    /// Looks up a custom view-operation handler by kind.
    #[must_use]
    pub fn view_op(&self, kind: &str) -> Option<&ViewOpHandler> {
        self.view_ops.get(kind)
    }

    /// Looks up a custom effect handler by kind.
    #[must_use]
    pub fn effect(&self, kind: &str) -> Option<&EffectHandler> {
        self.effects.get(kind)
    }

    /// Looks up a custom transform handler by kind.
    #[must_use]
    pub fn transform(&self, kind: &str) -> Option<&TransformHandler> {
        self.transforms.get(kind)
    }
}
