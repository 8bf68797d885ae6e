// SPDX-License-Identifier: Apache-2.0
//! The write-permission model: schema, check, and errors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PermissionError;
use crate::value::Value;

/// Write policy for a single field of a typed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Any sender, including the server, may write this field.
    Anyone,
    /// Only the server (empty sender id) may write this field.
    Server,
    /// Only the sender whose id matches the record's owner field may write.
    Owner,
}

/// Per-type field write policy, keyed by field name, plus the name of the
/// field that identifies the record's owning sender.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeSchema {
    /// Name of the field on this type that holds the owning sender's id.
    pub owner_field: String,
    /// Write policy per field name. Fields absent from this map default to
    /// [`WritePolicy::Anyone`].
    pub fields: HashMap<String, WritePolicy>,
}

/// Immutable, process-wide table of `{type-name -> {owner-field, field ->
/// policy}}`. Registered once at engine construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionSchema {
    types: HashMap<String, TypeSchema>,
}

impl PermissionSchema {
    /// Constructs an empty schema (every write is allowed — equivalent to
    /// not wiring a permission checker at all).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the schema for `type_name`.
    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>, schema: TypeSchema) -> Self {
        self.types.insert(type_name.into(), schema);
        self
    }

    /// Looks up the policy for `field` on `type_name`, defaulting to
    /// [`WritePolicy::Anyone`] when the type or field is unregistered.
    #[must_use]
    pub fn policy(&self, type_name: &str, field: &str) -> WritePolicy {
        self.types
            .get(type_name)
            .and_then(|t| t.fields.get(field))
            .copied()
            .unwrap_or(WritePolicy::Anyone)
    }

    /// Looks up the owner-field name registered for `type_name`.
    #[must_use]
    pub fn owner_field(&self, type_name: &str) -> Option<&str> {
        self.types.get(type_name).map(|t| t.owner_field.as_str())
    }
}

/// Checks a write against the permission schema:
///
/// - `anyone` -> always allowed.
/// - `server` -> allowed iff `sender_id` is empty.
/// - `owner` -> allowed iff `sender_id` equals the value of the record's
///   owner field.
///
/// `record` is the record the field is being written on (used to read the
/// owner field's current value for the `owner` policy); it may be `None`
/// when the write target carries no type (e.g. a [`Value::Map`]), in which
/// case the check always passes.
///
/// # Errors
/// Returns [`PermissionError`] when the write is disallowed.
pub fn check_write(
    schema: &PermissionSchema,
    type_name: Option<&str>,
    field: &str,
    sender_id: &str,
    record: Option<&Value>,
) -> Result<(), PermissionError> {
    let Some(type_name) = type_name else {
        return Ok(());
    };
    let policy = schema.policy(type_name, field);
    match policy {
        WritePolicy::Anyone => Ok(()),
        WritePolicy::Server => {
            if sender_id.is_empty() {
                Ok(())
            } else {
                Err(PermissionError {
                    field_name: field.to_owned(),
                    required_policy: policy,
                    sender_id: sender_id.to_owned(),
                    owner_id: None,
                    message: format!("field {field} is server-only"),
                })
            }
        }
        WritePolicy::Owner => {
            let owner_field = schema.owner_field(type_name);
            let owner_id = owner_field
                .and_then(|f| record.and_then(|r| r.field(f)))
                .map(Value::as_comparable_string);
            if owner_id.as_deref() == Some(sender_id) {
                Ok(())
            } else {
                Err(PermissionError {
                    field_name: field.to_owned(),
                    required_policy: policy,
                    sender_id: sender_id.to_owned(),
                    owner_id,
                    message: format!("field {field} may only be written by its owner"),
                })
            }
        }
    }
}
