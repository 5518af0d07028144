//! Per-job cancellation flags. The executor polls these between pipeline
//! steps rather than mid-call, so cancellation is cooperative and bounded by
//! the current step's external call, not instantaneous.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct CancelRegistry {
    flags: Arc<Mutex<HashMap<i64, Arc<AtomicBool>>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag_for(&self, job_id: i64) -> Arc<AtomicBool> {
        self.flags
            .lock()
            .unwrap()
            .entry(job_id)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    pub fn cancel(&self, job_id: i64) {
        self.flag_for(job_id).store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self, job_id: i64) -> bool {
        self.flag_for(job_id).load(Ordering::SeqCst)
    }

    /// Drops the flag once a job reaches a terminal state, so the map doesn't
    /// grow without bound across a long-running worker process.
    pub fn clear(&self, job_id: i64) {
        self.flags.lock().unwrap().remove(&job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_job_is_not_cancelled() {
        let registry = CancelRegistry::new();
        assert!(!registry.is_cancelled(1));
    }

    #[test]
    fn cancel_is_observable_and_per_job() {
        let registry = CancelRegistry::new();
        registry.cancel(1);
        assert!(registry.is_cancelled(1));
        assert!(!registry.is_cancelled(2));
    }

    #[test]
    fn clear_resets_the_flag() {
        let registry = CancelRegistry::new();
        registry.cancel(1);
        registry.clear(1);
        assert!(!registry.is_cancelled(1));
    }
}
