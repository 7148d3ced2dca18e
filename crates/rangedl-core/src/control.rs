//! Job control for cancellation: a shared registry of per-task abort tokens.
//!
//! The orchestrator registers an abort token when a task starts and checks it
//! (or is told to flip it) to drive `abort()` (spec §4.4). Workers never see
//! this registry directly; the orchestrator holds the token and propagates
//! cancellation to its workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Error returned when a task is stopped by an external abort request.
#[derive(Debug)]
pub struct JobAborted;

impl std::fmt::Display for JobAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task aborted by caller")
    }
}

impl std::error::Error for JobAborted {}

/// Shared registry of task id -> abort token.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<i64, Arc<AtomicBool>>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running task; returns the abort token to pass to the orchestrator.
    pub fn register(&self, task_id: i64) -> Arc<AtomicBool> {
        let token = Arc::new(AtomicBool::new(false));
        self.jobs.write().unwrap().insert(task_id, Arc::clone(&token));
        token
    }

    /// Unregister a task (call when it reaches a terminal state).
    pub fn unregister(&self, task_id: i64) {
        self.jobs.write().unwrap().remove(&task_id);
    }

    /// Request abort for a task. The orchestrator observes the token and calls `abort()`.
    pub fn request_abort(&self, task_id: i64) {
        if let Some(token) = self.jobs.read().unwrap().get(&task_id) {
            token.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_request_abort_sets_token() {
        let control = JobControl::new();
        let token = control.register(1);
        assert!(!token.load(Ordering::Relaxed));
        control.request_abort(1);
        assert!(token.load(Ordering::Relaxed));
    }

    #[test]
    fn request_abort_on_unknown_task_is_noop() {
        let control = JobControl::new();
        control.request_abort(42);
    }

    #[test]
    fn unregister_removes_task() {
        let control = JobControl::new();
        control.register(7);
        control.unregister(7);
        control.request_abort(7);
    }
}
