//! Schema migrations over stored entities
//!
//! Plans are data: a versioned, ordered list of field-level operations
//! scoped to entity types, with transforms referenced by name through a
//! registry rather than captured as closures. Plans therefore serialize,
//! log, and replay deterministically.
//!
//! Execution follows a two-level failure model:
//! - one operation failing on one entity marks that entity failed and
//!   the batch continues
//! - a tier write failing rolls the whole batch back and the run ends
//!   `Failed`

mod apply;
mod plan;
mod registry;
mod runner;

pub use apply::apply_operation;
pub use plan::{
    FieldType, MigrationOperation, MigrationPlan, MigrationResult, MigrationStatus, MigrationStep,
};
pub use registry::{TransformFn, TransformRegistry};
pub use runner::{MigrationContext, MigrationEngine};
