use serde::{Deserialize, Serialize};

/// Page counters as the workers report them through the progress store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub found: u64,
    pub done: u64,
    pub size: Option<u64>,
}
