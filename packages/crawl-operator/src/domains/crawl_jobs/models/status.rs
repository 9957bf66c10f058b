use serde::{Deserialize, Serialize};

use super::CrawlState;

/// Observed state of a crawl job, stored on the resource's `status` block.
///
/// Once `finished` is set the state is terminal and stays that way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrawlStatus {
    pub state: CrawlState,
    pub pages_found: u64,
    pub pages_done: u64,
    pub size: String,
    pub scale: u32,
    pub files_added: u64,
    pub files_added_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<String>,
    pub stopping: bool,
}

impl Default for CrawlStatus {
    fn default() -> Self {
        Self {
            state: CrawlState::Starting,
            pages_found: 0,
            pages_done: 0,
            size: String::new(),
            scale: 1,
            files_added: 0,
            files_added_size: 0,
            finished: None,
            stopping: false,
        }
    }
}

impl CrawlStatus {
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_status_block_starts() {
        let status: CrawlStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(status.state, CrawlState::Starting);
        assert_eq!(status.scale, 1);
        assert!(!status.is_finished());
    }

    #[test]
    fn unfinished_status_omits_finished() {
        let json = serde_json::to_value(CrawlStatus::default()).unwrap();
        assert!(json.get("finished").is_none());
        assert_eq!(json["pagesFound"], 0);
        assert_eq!(json["filesAddedSize"], 0);
    }
}
