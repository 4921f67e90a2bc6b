//! Migration execution
//!
//! One run: fetch every entity matching the plan's declared types, apply
//! the in-scope operations to each, and write the survivors to the
//! entity store and persistent tier inside a single compensating
//! transaction.
//!
//! Failure handling is two-level:
//! - an operation failing on one entity records the failure, restores
//!   that entity's snapshot (by discarding the working copy), and moves
//!   on — partial failure never aborts the batch
//! - a tier write failing unwinds the whole transaction and the run
//!   reports `Failed`; every previously written entity is restored
//!
//! Only one migration may run at a time, enforced by a global mutex.

use crate::apply::apply_operation;
use crate::plan::{MigrationPlan, MigrationResult, MigrationStatus};
use crate::registry::TransformRegistry;
use chrono::Utc;
use parking_lot::Mutex;
use recon_core::{
    MigrationLogEntry, PersistentBackend, QueryOptions, RecondbError, Result, StoreEvent,
    Transaction,
};
use recon_store::EntityStore;
use tracing::{info, warn};

/// Tiers and collaborators a migration run works against
pub struct MigrationContext<'a> {
    /// Authoritative in-memory tier
    pub store: &'a EntityStore,
    /// Durable tier; `None` for stores running without persistence
    pub backend: Option<&'a dyn PersistentBackend>,
    /// Named transform lookup for `TransformField` operations
    pub registry: &'a TransformRegistry,
    /// Event sink; receives start/log/complete/failed events
    pub emit: &'a dyn Fn(StoreEvent),
}

/// Serializes migration runs and executes plans
#[derive(Default)]
pub struct MigrationEngine {
    /// Global single-migration mutex
    guard: Mutex<()>,
}

impl MigrationEngine {
    /// Create an engine with no run in progress
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute a plan
    ///
    /// Returns the run's `MigrationResult`; batch-level failures are
    /// reported in its `status`, not as an `Err`. The error path is
    /// reserved for rejections before any work starts: a malformed plan
    /// or another migration already in progress.
    pub fn execute(&self, plan: &MigrationPlan, ctx: &MigrationContext<'_>) -> Result<MigrationResult> {
        let _guard = self
            .guard
            .try_lock()
            .ok_or(RecondbError::MigrationInProgress)?;

        if plan.id.trim().is_empty() {
            return Err(RecondbError::validation("migration plan id must not be empty"));
        }
        if plan.entity_types.is_empty() {
            return Err(RecondbError::validation(
                "migration plan must declare at least one entity type",
            ));
        }

        info!(plan = %plan.id, version = %plan.version, "migration started");
        (ctx.emit)(StoreEvent::MigrationStarted {
            plan_id: plan.id.clone(),
            version: plan.version.clone(),
        });

        let targets = ctx.store.query(&QueryOptions {
            types: plan.entity_types.clone(),
            ..Default::default()
        });

        let mut txn = Transaction::new();
        let mut log: Vec<MigrationLogEntry> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut processed = 0usize;
        let mut failed = 0usize;

        for entity in targets {
            let snapshot = entity.clone();
            let mut working = entity;
            let mut entity_error: Option<RecondbError> = None;

            for step in &plan.operations {
                if !step.in_scope(&working.entity_type) {
                    continue;
                }
                let applied = apply_operation(&mut working, &step.operation, ctx.registry);
                let entry = MigrationLogEntry {
                    plan_id: plan.id.clone(),
                    entity_id: snapshot.id,
                    operation: step.operation.label(),
                    success: applied.is_ok(),
                    error: applied.as_ref().err().map(|e| e.to_string()),
                    applied_at: Utc::now(),
                };
                (ctx.emit)(StoreEvent::MigrationLog {
                    entry: entry.clone(),
                });
                log.push(entry);

                if let Err(e) = applied {
                    entity_error = Some(e);
                    break;
                }
            }

            if let Some(e) = entity_error {
                // Discarding the working copy restores the snapshot.
                failed += 1;
                errors.push(e.to_string());
                continue;
            }

            working.touch();
            let id = working.id;
            let store = ctx.store;

            let memory_snapshot = snapshot.clone();
            let memory_write = working.clone();
            let wrote = txn.run_step(
                &format!("migrate-memory:{}", id),
                move || {
                    store.insert_existing(memory_write);
                    Ok(())
                },
                move || {
                    store.insert_existing(memory_snapshot);
                    Ok(())
                },
            );
            if let Err(e) = wrote {
                return Ok(self.batch_failure(plan, ctx, e, errors, log));
            }

            if let Some(backend) = ctx.backend {
                let had_record = backend.contains_entity(&id).unwrap_or(false);
                let disk_snapshot = snapshot.clone();
                let disk_write = working.clone();
                let wrote = txn.run_step(
                    &format!("migrate-persist:{}", id),
                    move || backend.put_entity(&disk_write),
                    move || {
                        if had_record {
                            backend.put_entity(&disk_snapshot)
                        } else {
                            backend.delete_entity(&id)
                        }
                    },
                );
                if let Err(e) = wrote {
                    return Ok(self.batch_failure(plan, ctx, e, errors, log));
                }
            }

            processed += 1;
        }

        if let Err(e) = txn.commit() {
            return Ok(self.batch_failure(plan, ctx, e, errors, log));
        }

        info!(plan = %plan.id, processed, failed, "migration completed");
        (ctx.emit)(StoreEvent::MigrationCompleted {
            plan_id: plan.id.clone(),
            processed,
            failed,
        });

        Ok(MigrationResult {
            plan_id: plan.id.clone(),
            status: MigrationStatus::Completed,
            processed,
            failed,
            errors,
            log,
        })
    }

    /// Wrap up a run whose batch transaction was unwound
    ///
    /// The transaction already rolled back by the time this runs, so no
    /// entity ended up migrated; `processed` reports zero.
    fn batch_failure(
        &self,
        plan: &MigrationPlan,
        ctx: &MigrationContext<'_>,
        error: RecondbError,
        mut errors: Vec<String>,
        log: Vec<MigrationLogEntry>,
    ) -> MigrationResult {
        warn!(plan = %plan.id, error = %error, "migration failed, batch rolled back");
        (ctx.emit)(StoreEvent::MigrationFailed {
            plan_id: plan.id.clone(),
            error: error.to_string(),
        });
        errors.push(error.to_string());
        MigrationResult {
            plan_id: plan.id.clone(),
            status: MigrationStatus::Failed,
            processed: 0,
            failed: 0,
            errors,
            log,
        }
    }
}
