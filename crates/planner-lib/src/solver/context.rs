//! Request-scoped search context
//!
//! Carries the round number, the caller's resource limits and the search
//! counters through one solver invocation.

use crate::error::{SearchAborted, SearchLimit};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::trace;

/// Steps between wall-clock checks
pub const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Caller-supplied resource limits for a planning run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLimits {
    /// Wall-clock budget for the whole run, in milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// Maximum search steps per round
    #[serde(default)]
    pub max_steps: Option<u64>,
}

impl SearchLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis() as u64);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Search state for one round
#[derive(Debug, Clone)]
pub struct SearchContext {
    round: usize,
    started: Instant,
    limits: SearchLimits,
    steps: u64,
    memo_hits: u64,
    memo_entries: u64,
}

impl SearchContext {
    /// Create a context; `started` is when the whole run began
    pub fn new(round: usize, started: Instant, limits: SearchLimits) -> Self {
        Self {
            round,
            started,
            limits,
            steps: 0,
            memo_hits: 0,
            memo_entries: 0,
        }
    }

    /// Context without limits, starting now
    pub fn unbounded(round: usize) -> Self {
        Self::new(round, Instant::now(), SearchLimits::unbounded())
    }

    /// Count one search step and enforce the limits
    pub fn tick(&mut self) -> Result<(), SearchAborted> {
        self.steps += 1;
        if let Some(max_steps) = self.limits.max_steps {
            if self.steps > max_steps {
                return Err(SearchAborted {
                    limit: SearchLimit::Steps,
                });
            }
        }
        if self.steps % DEADLINE_CHECK_INTERVAL == 0 {
            self.check_deadline()?;
        }
        Ok(())
    }

    /// Fail if the run's wall-clock budget is spent
    pub fn check_deadline(&self) -> Result<(), SearchAborted> {
        match self.limits.deadline() {
            Some(deadline) if self.started.elapsed() >= deadline => Err(SearchAborted {
                limit: SearchLimit::Time,
            }),
            _ => Ok(()),
        }
    }

    pub fn record_memo_hit(&mut self) {
        self.memo_hits += 1;
    }

    pub fn record_memo_entry(&mut self) {
        self.memo_entries += 1;
    }

    /// Emit a trace event for a visited search state
    pub fn trace_state(&self, index: usize, residual: &[u32]) {
        trace!(
            round = self.round,
            step = self.steps,
            index = index,
            residual = ?residual,
            "Visiting search state"
        );
    }

    /// Fresh counters sharing this context's round, start and limits
    pub fn fork(&self) -> Self {
        Self::new(self.round, self.started, self.limits)
    }

    /// Add the counters of a forked context
    pub fn absorb(&mut self, other: &SearchContext) {
        self.steps += other.steps;
        self.memo_hits += other.memo_hits;
        self.memo_entries += other.memo_entries;
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn memo_hits(&self) -> u64 {
        self.memo_hits
    }

    pub fn memo_entries(&self) -> u64 {
        self.memo_entries
    }
}
