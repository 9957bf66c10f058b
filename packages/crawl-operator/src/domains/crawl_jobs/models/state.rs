use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a crawl job.
///
/// `Starting -> WaitingOrgLimit -> Starting -> WaitingCapacity -> Running`
/// and then one of the four terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    #[default]
    Starting,
    WaitingOrgLimit,
    WaitingCapacity,
    Running,
    Complete,
    PartialComplete,
    Failed,
    Canceled,
}

impl CrawlState {
    pub const TERMINAL: [CrawlState; 4] = [
        CrawlState::Complete,
        CrawlState::PartialComplete,
        CrawlState::Failed,
        CrawlState::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlState::Starting => "starting",
            CrawlState::WaitingOrgLimit => "waiting_org_limit",
            CrawlState::WaitingCapacity => "waiting_capacity",
            CrawlState::Running => "running",
            CrawlState::Complete => "complete",
            CrawlState::PartialComplete => "partial_complete",
            CrawlState::Failed => "failed",
            CrawlState::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "starting" => CrawlState::Starting,
            "waiting_org_limit" => CrawlState::WaitingOrgLimit,
            "waiting_capacity" => CrawlState::WaitingCapacity,
            "running" => CrawlState::Running,
            "complete" => CrawlState::Complete,
            "partial_complete" => CrawlState::PartialComplete,
            "failed" => CrawlState::Failed,
            "canceled" => CrawlState::Canceled,
            _ => return None,
        })
    }

    /// No further progress transition happens from here.
    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Outcomes that count as a usable crawl (collections, last-crawl stats).
    pub fn is_successful(&self) -> bool {
        matches!(self, CrawlState::Complete | CrawlState::PartialComplete)
    }

    /// Waiting for admission; the reconciler re-checks quotas every cycle.
    pub fn is_pending_admission(&self) -> bool {
        matches!(self, CrawlState::Starting | CrawlState::WaitingOrgLimit)
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
