//! Compensating transactions
//!
//! A transaction is an ordered list of (operation, compensating-rollback)
//! pairs. Operations execute strictly in insertion order; rollback runs
//! the recorded compensations in strict reverse order, best-effort: a
//! compensation failure is logged and the rest of the unwind proceeds.
//! Once committed or rolled back, a transaction is immutable.

use crate::error::{RecondbError, Result};
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle of a transaction
///
/// State transitions:
/// - `Pending` → `Committed` (commit)
/// - `Pending` → `RolledBack` (a step failed, or explicit rollback)
///
/// Both `Committed` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Steps may still be executed
    Pending,
    /// All steps applied; compensations discarded
    Committed,
    /// Compensations were executed in reverse order
    RolledBack,
}

type Compensation<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;

/// An all-or-nothing group of tier operations
///
/// Borrows the tiers it compensates against, so a transaction never
/// outlives the call that opened it.
pub struct Transaction<'a> {
    id: Uuid,
    status: TransactionStatus,
    compensations: Vec<(String, Compensation<'a>)>,
}

impl<'a> Transaction<'a> {
    /// Open a new pending transaction
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: TransactionStatus::Pending,
            compensations: Vec::new(),
        }
    }

    /// Transaction id, for log correlation
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Number of completed steps awaiting commit
    pub fn steps(&self) -> usize {
        self.compensations.len()
    }

    /// Execute a step and record its compensation
    ///
    /// On step failure the transaction rolls back immediately — all
    /// previously recorded compensations run in reverse order — and the
    /// failure propagates as `RecondbError::Transaction`, so the caller
    /// never observes a partially applied write.
    pub fn run_step<T>(
        &mut self,
        label: &str,
        operation: impl FnOnce() -> Result<T>,
        compensation: impl FnOnce() -> Result<()> + 'a,
    ) -> Result<T> {
        if self.status != TransactionStatus::Pending {
            return Err(RecondbError::Transaction {
                step: label.to_string(),
                message: format!("transaction is {:?}, not pending", self.status),
            });
        }

        match operation() {
            Ok(value) => {
                self.compensations
                    .push((label.to_string(), Box::new(compensation)));
                Ok(value)
            }
            Err(e) => {
                warn!(txn = %self.id, step = label, error = %e, "transaction step failed");
                self.rollback();
                Err(RecondbError::Transaction {
                    step: label.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Record a compensation for a step that already ran
    ///
    /// Used when the step's outputs (a store-assigned id, a pre-write
    /// snapshot) are needed to build the compensation, so it cannot be
    /// handed to [`Transaction::run_step`] up front.
    pub fn record(
        &mut self,
        label: &str,
        compensation: impl FnOnce() -> Result<()> + 'a,
    ) -> Result<()> {
        if self.status != TransactionStatus::Pending {
            return Err(RecondbError::Transaction {
                step: label.to_string(),
                message: format!("transaction is {:?}, not pending", self.status),
            });
        }
        self.compensations
            .push((label.to_string(), Box::new(compensation)));
        Ok(())
    }

    /// Commit: discard compensations and seal the transaction
    pub fn commit(&mut self) -> Result<()> {
        if self.status != TransactionStatus::Pending {
            return Err(RecondbError::Transaction {
                step: "commit".to_string(),
                message: format!("transaction is {:?}, not pending", self.status),
            });
        }
        debug!(txn = %self.id, steps = self.compensations.len(), "transaction committed");
        self.compensations.clear();
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Roll back: run compensations in strict reverse order, best-effort
    ///
    /// Idempotent; calling on a terminal transaction does nothing.
    pub fn rollback(&mut self) {
        if self.status != TransactionStatus::Pending {
            return;
        }
        while let Some((label, compensation)) = self.compensations.pop() {
            if let Err(e) = compensation() {
                // Best-effort: keep unwinding.
                warn!(txn = %self.id, step = %label, error = %e, "compensation failed");
            }
        }
        self.status = TransactionStatus::RolledBack;
        debug!(txn = %self.id, "transaction rolled back");
    }
}

impl<'a> Default for Transaction<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Drop for Transaction<'a> {
    /// A transaction dropped while pending rolls back, so an early
    /// return can never leave a half-applied write behind.
    fn drop(&mut self) {
        self.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_steps_execute_in_order() {
        let order = RefCell::new(Vec::new());
        let mut txn = Transaction::new();
        txn.run_step("one", || { order.borrow_mut().push(1); Ok(()) }, || Ok(()))
            .unwrap();
        txn.run_step("two", || { order.borrow_mut().push(2); Ok(()) }, || Ok(()))
            .unwrap();
        txn.commit().unwrap();
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_rollback_runs_compensations_in_reverse() {
        let unwound = RefCell::new(Vec::new());
        let mut txn = Transaction::new();
        txn.run_step("one", || Ok(()), || { unwound.borrow_mut().push(1); Ok(()) })
            .unwrap();
        txn.run_step("two", || Ok(()), || { unwound.borrow_mut().push(2); Ok(()) })
            .unwrap();
        txn.rollback();
        assert_eq!(*unwound.borrow(), vec![2, 1]);
        assert_eq!(txn.status(), TransactionStatus::RolledBack);
    }

    #[test]
    fn test_failing_step_rolls_back_prior_steps() {
        let unwound = RefCell::new(false);
        let mut txn = Transaction::new();
        txn.run_step("one", || Ok(()), || { *unwound.borrow_mut() = true; Ok(()) })
            .unwrap();

        let err = txn
            .run_step(
                "two",
                || -> Result<()> { Err(RecondbError::storage("disk write failed")) },
                || Ok(()),
            )
            .unwrap_err();

        assert!(matches!(err, RecondbError::Transaction { .. }));
        assert!(*unwound.borrow());
        assert_eq!(txn.status(), TransactionStatus::RolledBack);
    }

    #[test]
    fn test_commit_discards_compensations() {
        let unwound = RefCell::new(false);
        let mut txn = Transaction::new();
        txn.run_step("one", || Ok(()), || { *unwound.borrow_mut() = true; Ok(()) })
            .unwrap();
        txn.commit().unwrap();
        txn.rollback();
        assert!(!*unwound.borrow());
        assert_eq!(txn.status(), TransactionStatus::Committed);
    }

    #[test]
    fn test_terminal_transactions_are_immutable() {
        let mut txn = Transaction::new();
        txn.commit().unwrap();
        assert!(txn.commit().is_err());
        assert!(txn.run_step("late", || Ok(()), || Ok(())).is_err());
    }

    #[test]
    fn test_compensation_failure_does_not_stop_unwind() {
        let unwound = RefCell::new(Vec::new());
        let mut txn = Transaction::new();
        txn.run_step("one", || Ok(()), || { unwound.borrow_mut().push(1); Ok(()) })
            .unwrap();
        txn.run_step(
            "two",
            || Ok(()),
            || -> Result<()> { Err(RecondbError::storage("compensation broke")) },
        )
        .unwrap();
        txn.run_step("three", || Ok(()), || { unwound.borrow_mut().push(3); Ok(()) })
            .unwrap();

        txn.rollback();
        // Step two's compensation failed but one and three still ran.
        assert_eq!(*unwound.borrow(), vec![3, 1]);
    }

    #[test]
    fn test_drop_while_pending_rolls_back() {
        let unwound = RefCell::new(false);
        {
            let mut txn = Transaction::new();
            txn.run_step("one", || Ok(()), || { *unwound.borrow_mut() = true; Ok(()) })
                .unwrap();
        }
        assert!(*unwound.borrow());
    }
}
