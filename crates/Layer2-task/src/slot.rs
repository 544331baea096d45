//! Result slot - the single source of truth for a task's status
//!
//! The slot moves `unset -> running -> {success | failure | cancelled}`.
//! Both transitions are lock-free: the first is a compare-and-set on
//! `running`, the second is the one-time initialisation of `outcome`.
//! Whoever initialises `outcome` first wins; every later attempt is rejected.

use crate::state::Status;
use errand_foundation::TaskFailure;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Terminal value of a task
#[derive(Debug)]
pub(crate) enum Outcome<O> {
    Success(O),
    Failure(TaskFailure),
    Cancelled,
}

impl<O> Outcome<O> {
    pub(crate) fn status(&self) -> Status {
        match self {
            Outcome::Success(_) => Status::Completed,
            Outcome::Failure(_) => Status::Failed,
            Outcome::Cancelled => Status::Cancelled,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ResultSlot<O> {
    running: AtomicBool,
    outcome: OnceLock<Outcome<O>>,
}

impl<O> ResultSlot<O> {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            outcome: OnceLock::new(),
        }
    }

    pub(crate) fn status(&self) -> Status {
        match self.outcome.get() {
            Some(outcome) => outcome.status(),
            None if self.running.load(Ordering::Acquire) => Status::InProgress,
            None => Status::Pending,
        }
    }

    /// `unset -> running`; false if the slot already left `unset`
    pub(crate) fn start(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn has_started(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// `running -> terminal`; hands the outcome back if the transition is rejected
    pub(crate) fn finish(&self, outcome: Outcome<O>) -> Result<(), Outcome<O>> {
        if !self.has_started() {
            return Err(outcome);
        }
        self.outcome.set(outcome)
    }

    pub(crate) fn outcome(&self) -> Option<&Outcome<O>> {
        self.outcome.get()
    }

    pub(crate) fn output(&self) -> Option<&O> {
        match self.outcome.get() {
            Some(Outcome::Success(output)) => Some(output),
            _ => None,
        }
    }

    pub(crate) fn failure(&self) -> Option<&TaskFailure> {
        match self.outcome.get() {
            Some(Outcome::Failure(failure)) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unset_slot_is_pending() {
        let slot = ResultSlot::<u32>::new();
        assert_eq!(slot.status(), Status::Pending);
        assert!(slot.output().is_none());
        assert!(slot.failure().is_none());
    }

    #[test]
    fn test_finish_before_start_is_rejected() {
        let slot = ResultSlot::new();
        assert!(slot.finish(Outcome::Success(1)).is_err());
        assert_eq!(slot.status(), Status::Pending);
    }

    #[test]
    fn test_start_only_once() {
        let slot = ResultSlot::<u32>::new();
        assert!(slot.start());
        assert!(!slot.start());
        assert_eq!(slot.status(), Status::InProgress);
    }

    #[test]
    fn test_first_outcome_wins() {
        let slot = ResultSlot::new();
        slot.start();
        assert!(slot.finish(Outcome::Cancelled).is_ok());
        assert!(slot.finish(Outcome::Success(7)).is_err());

        assert_eq!(slot.status(), Status::Cancelled);
        assert!(slot.output().is_none());
    }

    #[test]
    fn test_concurrent_finish_has_one_winner() {
        let slot = Arc::new(ResultSlot::new());
        slot.start();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let slot = Arc::clone(&slot);
                std::thread::spawn(move || slot.finish(Outcome::Success(i)).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(slot.status(), Status::Completed);
    }
}
