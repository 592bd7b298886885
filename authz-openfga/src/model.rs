//! The authorization model (schema) kept in the OpenFGA store.

use crate::error::OpenFgaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON form of the authorization model shipped with this crate.
pub const BUILTIN_MODEL: &str = include_str!("model.json");

/// An OpenFGA authorization model as exchanged over the API.
///
/// Type definitions are kept as raw JSON: they are only compared and
/// forwarded, never interpreted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationModel {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    pub schema_version: String,
    #[serde(default)]
    pub type_definitions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Value>,
}

/// What to do with the model currently held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelAction {
    /// The store already holds an equivalent model.
    Keep,
    /// The store has no model, or an outdated one.
    Upload,
}

impl AuthorizationModel {
    /// Parse the built-in model.
    pub fn builtin() -> Result<Self, OpenFgaError> {
        serde_json::from_str(BUILTIN_MODEL)
            .map_err(|e| OpenFgaError::Decode(format!("built-in authorization model: {}", e)))
    }

    /// Type definitions with empty `condition` markers removed.
    ///
    /// Older servers report `"condition": ""` on directly related user types
    /// where newer ones omit the field entirely.
    pub fn normalized_type_definitions(&self) -> Vec<Value> {
        let mut definitions = self.type_definitions.clone();
        for definition in &mut definitions {
            let Some(relations) = definition
                .pointer_mut("/metadata/relations")
                .and_then(Value::as_object_mut)
            else {
                continue;
            };

            for relation in relations.values_mut() {
                let Some(references) = relation
                    .get_mut("directly_related_user_types")
                    .and_then(Value::as_array_mut)
                else {
                    continue;
                };

                for reference in references.iter_mut().filter_map(Value::as_object_mut) {
                    if reference.get("condition").and_then(Value::as_str) == Some("") {
                        reference.remove("condition");
                    }
                }
            }
        }

        definitions
    }

    /// Decide whether `builtin` must be uploaded over `remote`.
    ///
    /// A remote model with a different schema version is never overwritten.
    pub fn reconcile(remote: Option<&Self>, builtin: &Self) -> Result<ModelAction, OpenFgaError> {
        let Some(remote) = remote else {
            return Ok(ModelAction::Upload);
        };

        if remote.schema_version != builtin.schema_version {
            return Err(OpenFgaError::SchemaMismatch {
                existing: remote.schema_version.clone(),
                builtin: builtin.schema_version.clone(),
            });
        }

        if remote.normalized_type_definitions() != builtin.normalized_type_definitions() {
            return Ok(ModelAction::Upload);
        }

        Ok(ModelAction::Keep)
    }
}
