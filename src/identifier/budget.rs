use std::time::{Duration, Instant};

/// Default wall-clock budget of one identifier generation.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the counter strategy may keep looking for a free identifier.
///
/// The budget ends at whichever limit is reached first: the deadline, or the
/// optional cap on counter attempts. A cap of zero leaves only the straight
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationBudget {
    pub timeout: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for GenerationBudget {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_GENERATION_TIMEOUT,
            max_attempts: None,
        }
    }
}

impl GenerationBudget {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            max_attempts: None,
        }
    }

    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            timeout: DEFAULT_GENERATION_TIMEOUT,
            max_attempts: Some(max_attempts),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub(crate) fn allows(&self, started: Instant, attempts: u32) -> bool {
        if let Some(max) = self.max_attempts {
            if attempts >= max {
                return false;
            }
        }
        started.elapsed() < self.timeout
    }
}
