//! Crawl job state machine
//!
//! Pure decision logic - NO IO, only state transitions. The progress
//! aggregator gathers the inputs from the stores and applies whatever this
//! module decides.

use crate::domains::crawl_jobs::models::CrawlState;

/// Worker marker meaning a crawler replica finished its share.
pub const WORKER_DONE: &str = "done";
/// Worker marker meaning a crawler replica gave up.
pub const WORKER_FAILED: &str = "failed";

/// Everything the machine needs to judge a running crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlProgress {
    pub scale: u32,
    pub done_workers: u32,
    pub failed_workers: u32,
    pub pages_found: u64,
    pub pages_done: u64,
    pub files_added: u64,
    pub stopping: bool,
}

impl CrawlProgress {
    /// Tally per-worker terminal markers from the worker status hash.
    pub fn with_worker_markers<'a>(mut self, markers: impl IntoIterator<Item = &'a str>) -> Self {
        for marker in markers {
            match marker {
                WORKER_DONE => self.done_workers += 1,
                WORKER_FAILED => self.failed_workers += 1,
                _ => {}
            }
        }
        self
    }
}

/// State for a crawl whose children exist, before judging completion.
pub fn capacity_state(any_pod_running: bool) -> CrawlState {
    if any_pod_running {
        CrawlState::Running
    } else {
        CrawlState::WaitingCapacity
    }
}

/// Decide whether a running crawl has reached a terminal state.
///
/// All workers done wins over all workers failed; with one marker per
/// replica both cannot hold at once anyway.
pub fn decide_outcome(progress: &CrawlProgress) -> Option<CrawlState> {
    let scale = progress.scale.max(1);

    if progress.done_workers >= scale {
        // A single page and no files means the crawl never really ran
        if progress.pages_found == 1 && progress.files_added == 0 {
            return Some(CrawlState::Failed);
        }

        let completed = progress.pages_done > 0 && progress.pages_done >= progress.pages_found;
        return Some(if completed {
            CrawlState::Complete
        } else {
            CrawlState::PartialComplete
        });
    }

    if progress.failed_workers >= scale {
        if progress.stopping && progress.pages_done == 0 {
            return Some(CrawlState::Canceled);
        }
        return Some(CrawlState::Failed);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(scale: u32) -> CrawlProgress {
        CrawlProgress {
            scale,
            ..Default::default()
        }
    }

    #[test]
    fn counts_markers() {
        let p = progress(3).with_worker_markers(["done", "failed", "done", "interrupted"]);
        assert_eq!(p.done_workers, 2);
        assert_eq!(p.failed_workers, 1);
    }

    #[test]
    fn keeps_running_until_every_worker_reports() {
        let p = CrawlProgress {
            done_workers: 1,
            pages_found: 10,
            pages_done: 10,
            files_added: 1,
            ..progress(2)
        };
        assert_eq!(decide_outcome(&p), None);
    }

    #[test]
    fn single_page_without_files_fails() {
        let p = CrawlProgress {
            done_workers: 1,
            pages_found: 1,
            pages_done: 1,
            files_added: 0,
            ..progress(1)
        };
        assert_eq!(decide_outcome(&p), Some(CrawlState::Failed));
    }

    #[test]
    fn all_pages_done_completes() {
        let p = CrawlProgress {
            done_workers: 2,
            pages_found: 5,
            pages_done: 5,
            files_added: 1,
            ..progress(2)
        };
        assert_eq!(decide_outcome(&p), Some(CrawlState::Complete));
    }

    #[test]
    fn missing_pages_is_partial() {
        let p = CrawlProgress {
            done_workers: 1,
            pages_found: 5,
            pages_done: 3,
            files_added: 1,
            ..progress(1)
        };
        assert_eq!(decide_outcome(&p), Some(CrawlState::PartialComplete));
    }

    #[test]
    fn no_pages_at_all_is_partial() {
        let p = CrawlProgress {
            done_workers: 1,
            ..progress(1)
        };
        assert_eq!(decide_outcome(&p), Some(CrawlState::PartialComplete));
    }

    #[test]
    fn stopped_before_any_page_is_canceled() {
        let p = CrawlProgress {
            failed_workers: 2,
            stopping: true,
            ..progress(2)
        };
        assert_eq!(decide_outcome(&p), Some(CrawlState::Canceled));
    }

    #[test]
    fn stopped_after_progress_is_failed() {
        let p = CrawlProgress {
            failed_workers: 1,
            stopping: true,
            pages_done: 3,
            ..progress(1)
        };
        assert_eq!(decide_outcome(&p), Some(CrawlState::Failed));
    }

    #[test]
    fn failed_without_stop_is_failed() {
        let p = CrawlProgress {
            failed_workers: 1,
            ..progress(1)
        };
        assert_eq!(decide_outcome(&p), Some(CrawlState::Failed));
    }

    #[test]
    fn capacity_depends_on_running_pods() {
        assert_eq!(capacity_state(false), CrawlState::WaitingCapacity);
        assert_eq!(capacity_state(true), CrawlState::Running);
    }
}
