//! Applying one operation to one entity
//!
//! Operations mutate the entity's metadata map (the open schema
//! surface); `ChangeEntityType` rewrites the discriminator. Every
//! operation is written to be idempotent where the semantics allow it,
//! so re-running a plan converges instead of compounding.

use crate::plan::{FieldType, MigrationOperation};
use crate::registry::TransformRegistry;
use recon_core::{BaseEntity, RecondbError, Result};
use serde_json::Value;

/// Apply a single operation to an entity, in place
///
/// # Errors
///
/// Returns `RecondbError::MigrationOperation` when the value shape does
/// not support the operation (wrong type, unparseable conversion) or a
/// named transform is unknown. The entity may be partially mutated on
/// error; callers restore their own pre-operation snapshot.
pub fn apply_operation(
    entity: &mut BaseEntity,
    operation: &MigrationOperation,
    registry: &TransformRegistry,
) -> Result<()> {
    let entity_id = entity.id;
    let label = operation.label();
    let fail = move |message: String| RecondbError::MigrationOperation {
        entity: entity_id,
        operation: label.clone(),
        message,
    };

    match operation {
        MigrationOperation::AddField { field, default } => {
            // Insert only when absent: re-running converges.
            if !entity.metadata.contains_key(field) {
                entity.metadata.insert(field.clone(), default.clone());
            }
            Ok(())
        }

        MigrationOperation::RenameField { from, to } => {
            if let Some(value) = entity.metadata.remove(from) {
                entity.metadata.insert(to.clone(), value);
            }
            Ok(())
        }

        MigrationOperation::RemoveField { field } => {
            entity.metadata.remove(field);
            Ok(())
        }

        MigrationOperation::TransformField { field, transform } => {
            let Some(value) = entity.metadata.get(field) else {
                return Ok(());
            };
            let f = registry
                .get(transform)
                .ok_or_else(|| fail(format!("unknown transform '{}'", transform)))?;
            let rewritten = f(value).map_err(|e| fail(e.to_string()))?;
            entity.metadata.insert(field.clone(), rewritten);
            Ok(())
        }

        MigrationOperation::SplitField {
            field,
            separator,
            targets,
        } => {
            let Some(value) = entity.metadata.get(field) else {
                return Ok(());
            };
            let text = value
                .as_str()
                .ok_or_else(|| fail(format!("cannot split non-string value {}", value)))?
                .to_string();

            let parts: Vec<&str> = text.split(separator.as_str()).collect();
            for (target, part) in targets.iter().zip(parts.iter()) {
                entity
                    .metadata
                    .insert(target.clone(), Value::String(part.trim().to_string()));
            }
            if !targets.contains(field) {
                entity.metadata.remove(field);
            }
            Ok(())
        }

        MigrationOperation::MergeFields {
            fields,
            separator,
            target,
        } => {
            let mut parts = Vec::new();
            for field in fields {
                if let Some(value) = entity.metadata.get(field) {
                    parts.push(match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                }
            }
            if parts.is_empty() {
                return Ok(());
            }
            for field in fields {
                if field != target {
                    entity.metadata.remove(field);
                }
            }
            entity
                .metadata
                .insert(target.clone(), Value::String(parts.join(separator)));
            Ok(())
        }

        MigrationOperation::ConvertType { field, to } => {
            let Some(value) = entity.metadata.get(field) else {
                return Ok(());
            };
            let converted = convert(value, *to).map_err(|message| fail(message))?;
            entity.metadata.insert(field.clone(), converted);
            Ok(())
        }

        MigrationOperation::ChangeEntityType { to } => {
            entity.entity_type = to.clone();
            Ok(())
        }
    }
}

fn convert(value: &Value, to: FieldType) -> std::result::Result<Value, String> {
    match to {
        FieldType::String => Ok(match value {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }),
        FieldType::Number => match value {
            Value::Number(n) => Ok(Value::Number(n.clone())),
            Value::String(s) => serde_json::from_str::<serde_json::Number>(s.trim())
                .map(Value::Number)
                .map_err(|_| format!("cannot parse '{}' as a number", s)),
            Value::Bool(b) => Ok(Value::Number(serde_json::Number::from(u8::from(*b)))),
            other => Err(format!("cannot convert {} to a number", other)),
        },
        FieldType::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("cannot parse '{}' as a boolean", s)),
            },
            Value::Number(n) => Ok(Value::Bool(n.as_f64().unwrap_or(0.0) != 0.0)),
            other => Err(format!("cannot convert {} to a boolean", other)),
        },
    }
}
