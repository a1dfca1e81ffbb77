use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::ScenarioError;

/// Shared stop signal for one request. Cloning hands out another handle to
/// the same flag; an optional deadline trips it implicitly.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<(Instant, Duration)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some((Instant::now() + timeout, timeout)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    pub fn check(&self) -> Result<(), ScenarioError> {
        if self.flag.load(Ordering::Relaxed) {
            return Err(ScenarioError::Cancelled);
        }
        if let Some((deadline, timeout)) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(ScenarioError::TimedOut(timeout));
        }
        Ok(())
    }
}
