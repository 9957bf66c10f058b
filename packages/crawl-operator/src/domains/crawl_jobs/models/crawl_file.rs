use serde::{Deserialize, Serialize};

/// One entry drained from a crawl's done-mailbox.
///
/// Workers push a JSON blob per finished WACZ; entries without a filename
/// are status chatter and are skipped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MailboxEntry {
    pub filename: Option<String>,
    pub size: u64,
    pub hash: String,
}

/// A file produced by a crawl. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlFile {
    pub filename: String,
    pub size: u64,
    pub hash: String,
    /// Storage the filename is relative to; `None` when the path is absolute.
    pub def_storage_name: Option<String>,
}

impl CrawlFile {
    /// Build the record for a completed file, storing the path relative to
    /// the tenant's storage root when the root occurs inside it.
    pub fn from_completed(
        filename: &str,
        size: u64,
        hash: &str,
        storage_name: &str,
        storage_path: &str,
    ) -> Self {
        let relative_at = if storage_path.is_empty() {
            None
        } else {
            filename.find(storage_path)
        };

        match relative_at {
            Some(index) => Self {
                filename: filename[index..].to_string(),
                size,
                hash: hash.to_string(),
                def_storage_name: Some(storage_name.to_string()),
            },
            None => Self {
                filename: filename.to_string(),
                size,
                hash: hash.to_string(),
                def_storage_name: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bucket_prefix_before_storage_path() {
        let file = CrawlFile::from_completed(
            "s3://bucket/orgs/o1/crawl-1.wacz",
            10,
            "abc",
            "default",
            "orgs/o1/",
        );
        assert_eq!(file.filename, "orgs/o1/crawl-1.wacz");
        assert_eq!(file.def_storage_name.as_deref(), Some("default"));
    }

    #[test]
    fn keeps_path_already_relative() {
        let file =
            CrawlFile::from_completed("orgs/o1/crawl-1.wacz", 10, "abc", "default", "orgs/o1/");
        assert_eq!(file.filename, "orgs/o1/crawl-1.wacz");
        assert_eq!(file.def_storage_name.as_deref(), Some("default"));
    }

    #[test]
    fn unrelated_path_stays_absolute() {
        let file = CrawlFile::from_completed("/tmp/x.wacz", 10, "abc", "default", "orgs/o1/");
        assert_eq!(file.filename, "/tmp/x.wacz");
        assert_eq!(file.def_storage_name, None);
    }

    #[test]
    fn mailbox_entry_tolerates_extra_fields() {
        let entry: MailboxEntry = serde_json::from_str(
            r#"{"filename": "a.wacz", "size": 5, "hash": "h", "completed": true}"#,
        )
        .unwrap();
        assert_eq!(entry.filename.as_deref(), Some("a.wacz"));
        assert_eq!(entry.size, 5);
    }
}
