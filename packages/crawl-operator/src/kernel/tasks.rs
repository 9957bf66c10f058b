//! Supervised pool for work that runs after a reconciliation response.
//!
//! PVC deletion, TTL deletion and post-crawl bookkeeping must not hold up the
//! webhook reply. Instead of detaching them with a bare `tokio::spawn`, every
//! piece of background work is submitted here under a name:
//!
//! - each submission returns a [`TaskHandle`] that can be awaited
//! - finished tasks leave a [`TaskOutcome`] behind; only the most recent
//!   [`MAX_RECORDED_OUTCOMES`] are kept
//! - [`TaskPool::wait_idle`] resolves once nothing is in flight
//! - [`TaskPool::shutdown`] cancels what is left and drains the pool
//!
//! Nothing the next reconciliation cycle needs is locked while tasks run.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, RwLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// Outcomes kept by a pool built with [`TaskPool::new`].
pub const MAX_RECORDED_OUTCOMES: usize = 512;

/// How a background task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub name: String,
    pub result: Result<(), String>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Handle to one submitted task.
pub struct TaskHandle {
    name: String,
    join: JoinHandle<TaskOutcome>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the task and return its outcome.
    pub async fn join(self) -> TaskOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => TaskOutcome {
                name: self.name,
                result: Err(format!("task aborted: {}", e)),
            },
        }
    }
}

#[derive(Clone)]
pub struct TaskPool {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    outcomes: Arc<RwLock<VecDeque<TaskOutcome>>>,
    outcome_limit: usize,
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::with_outcome_limit(MAX_RECORDED_OUTCOMES)
    }
}

impl TaskPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool that keeps at most `limit` outcomes, dropping the oldest first.
    pub fn with_outcome_limit(limit: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            outcomes: Arc::new(RwLock::new(VecDeque::new())),
            outcome_limit: limit,
        }
    }

    /// Submit a named task.
    ///
    /// Errors are logged and recorded, never propagated to the submitter.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F) -> TaskHandle
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let task_name = name.clone();
        let shutdown = self.shutdown.clone();
        let outcomes = Arc::clone(&self.outcomes);
        let limit = self.outcome_limit;

        let join = self.tracker.spawn(async move {
            let result = tokio::select! {
                _ = shutdown.cancelled() => Err("cancelled by shutdown".to_string()),
                result = task => result.map_err(|e| format!("{:#}", e)),
            };

            match &result {
                Ok(()) => debug!(task = %task_name, "background task finished"),
                Err(e) => error!(task = %task_name, error = %e, "background task failed"),
            }

            let outcome = TaskOutcome {
                name: task_name,
                result,
            };
            {
                let mut recorded = outcomes.write().unwrap_or_else(|e| e.into_inner());
                while limit > 0 && recorded.len() >= limit {
                    recorded.pop_front();
                }
                if limit > 0 {
                    recorded.push_back(outcome.clone());
                }
            }
            outcome
        });

        TaskHandle { name, join }
    }

    /// Number of tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Resolve once every task submitted so far (and anything they submit)
    /// has finished. The pool keeps accepting work afterwards.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Recently recorded outcomes, oldest first.
    pub fn outcomes(&self) -> Vec<TaskOutcome> {
        self.outcomes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Outcomes of tasks whose name starts with `prefix`.
    pub fn outcomes_named(&self, prefix: &str) -> Vec<TaskOutcome> {
        self.outcomes()
            .into_iter()
            .filter(|outcome| outcome.name.starts_with(prefix))
            .collect()
    }

    /// Cancel whatever is still running and wait for it to unwind.
    pub async fn shutdown(&self) {
        let pending = self.tracker.len();
        if pending > 0 {
            warn!(pending, "cancelling background tasks");
        }
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
