//! Migration plans, operations, and results

use recon_core::MigrationLogEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target type for a `ConvertType` operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// JSON string
    String,
    /// JSON number
    Number,
    /// JSON boolean
    Boolean,
}

/// One field-level schema-evolution operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationOperation {
    /// Insert a default value when the field is absent; present fields
    /// are left alone, which makes the operation idempotent
    AddField {
        /// Field to add
        field: String,
        /// Value inserted when absent
        default: Value,
    },
    /// Move a field to a new name; absent sources are a no-op
    RenameField {
        /// Existing field name
        from: String,
        /// New field name
        to: String,
    },
    /// Drop a field; absent fields are a no-op
    RemoveField {
        /// Field to drop
        field: String,
    },
    /// Rewrite a field's value through a named, registered transform
    TransformField {
        /// Field to rewrite
        field: String,
        /// Registry name of the transform function
        transform: String,
    },
    /// Split a string field into multiple target fields
    SplitField {
        /// Source field; removed after the split
        field: String,
        /// Separator to split on
        separator: String,
        /// Target fields, matched to split parts in order
        targets: Vec<String>,
    },
    /// Join several fields into one string field
    MergeFields {
        /// Source fields, in join order; removed after the merge
        fields: Vec<String>,
        /// Separator placed between parts
        separator: String,
        /// Target field
        target: String,
    },
    /// Convert a field's value to another JSON type
    ConvertType {
        /// Field to convert
        field: String,
        /// Target type
        to: FieldType,
    },
    /// Rewrite the entity's type discriminator
    ChangeEntityType {
        /// New entity type
        to: String,
    },
}

impl MigrationOperation {
    /// Short label for logs and audit entries
    pub fn label(&self) -> String {
        match self {
            MigrationOperation::AddField { field, .. } => format!("add_field({})", field),
            MigrationOperation::RenameField { from, to } => {
                format!("rename_field({} -> {})", from, to)
            }
            MigrationOperation::RemoveField { field } => format!("remove_field({})", field),
            MigrationOperation::TransformField { field, transform } => {
                format!("transform_field({}, {})", field, transform)
            }
            MigrationOperation::SplitField { field, .. } => format!("split_field({})", field),
            MigrationOperation::MergeFields { target, .. } => format!("merge_fields({})", target),
            MigrationOperation::ConvertType { field, to } => {
                format!("convert_type({}, {:?})", field, to)
            }
            MigrationOperation::ChangeEntityType { to } => format!("change_entity_type({})", to),
        }
    }
}

/// One plan step: an operation plus its entity-type scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStep {
    /// The operation to apply
    #[serde(flatten)]
    pub operation: MigrationOperation,
    /// Types this step applies to; empty means every type the plan fetches
    #[serde(default)]
    pub entity_types: Vec<String>,
}

impl MigrationStep {
    /// A step scoped to every type in the plan
    pub fn new(operation: MigrationOperation) -> Self {
        Self {
            operation,
            entity_types: Vec::new(),
        }
    }

    /// Builder: restrict the step to the given types
    pub fn scoped_to<I, S>(mut self, entity_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_types = entity_types.into_iter().map(Into::into).collect();
        self
    }

    /// True when the step applies to the given entity type
    pub fn in_scope(&self, entity_type: &str) -> bool {
        self.entity_types.is_empty() || self.entity_types.iter().any(|t| t == entity_type)
    }
}

/// A declarative schema-evolution plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Plan id, unique per plan
    pub id: String,
    /// Schema version this plan migrates to
    pub version: String,
    /// Schema version this plan migrates from
    pub previous_version: String,
    /// Human-readable summary
    #[serde(default)]
    pub description: String,
    /// Entity types the plan fetches and migrates
    pub entity_types: Vec<String>,
    /// Ordered steps
    pub operations: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Start a plan migrating between two schema versions
    pub fn new(
        id: impl Into<String>,
        previous_version: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            previous_version: previous_version.into(),
            description: String::new(),
            entity_types: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Builder: add a fetched entity type
    pub fn for_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_types.push(entity_type.into());
        self
    }

    /// Builder: append a plan-wide step
    pub fn with_operation(mut self, operation: MigrationOperation) -> Self {
        self.operations.push(MigrationStep::new(operation));
        self
    }

    /// Builder: append a scoped step
    pub fn with_step(mut self, step: MigrationStep) -> Self {
        self.operations.push(step);
        self
    }
}

/// Final state of a migration run
///
/// `pending → in_progress → {completed | failed | rolled_back}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Not yet started
    Pending,
    /// Holding the migration mutex and processing entities
    InProgress,
    /// Batch committed; per-entity failures show in the counts
    Completed,
    /// A tier write failed; the batch transaction was unwound
    Failed,
    /// Explicitly reverted after completion
    RolledBack,
}

impl MigrationStatus {
    /// True for states no run leaves again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Completed | MigrationStatus::Failed | MigrationStatus::RolledBack
        )
    }
}

/// Outcome of a migration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Plan that was executed
    pub plan_id: String,
    /// Final state
    pub status: MigrationStatus,
    /// Entities migrated successfully
    pub processed: usize,
    /// Entities whose transform failed; their snapshots were kept
    pub failed: usize,
    /// Failure details, one per failed entity plus any batch failure
    pub errors: Vec<String>,
    /// One entry per operation application, for audit and replay
    pub log: Vec<MigrationLogEntry>,
}
