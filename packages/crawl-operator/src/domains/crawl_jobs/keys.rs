//! Progress-store key schema shared with the crawler workers.
//!
//! Keys live in a store dedicated to one crawl, so most are not prefixed;
//! the ones that are use the crawl id as prefix.

/// List of JSON blobs pushed by workers when a file is finished
pub const DONE_MAILBOX: &str = "crawls-done";

pub const FILES_ADDED: &str = "filesAdded";
pub const FILES_ADDED_SIZE: &str = "filesAddedSize";

/// Set once the error list has been copied to the metadata store
pub const ERRORS_EXPORTED: &str = "errors-exported";

/// Stop flag read by older crawler releases
pub const LEGACY_STOP: &str = "crawl-stop";

/// Hash of crawl id to bytes written so far
pub const CRAWL_SIZE: &str = "crawl-size";

/// Hash of worker ordinal to terminal marker (`done` / `failed`)
pub fn worker_status(crawl_id: &str) -> String {
    format!("{}:status", crawl_id)
}

pub fn stopping(crawl_id: &str) -> String {
    format!("{}:stopping", crawl_id)
}

pub fn errors(crawl_id: &str) -> String {
    format!("{}:e", crawl_id)
}

/// List with one entry per finished page
pub fn pages_done(crawl_id: &str) -> String {
    format!("{}:d", crawl_id)
}

/// Set of every page seen so far
pub fn pages_found(crawl_id: &str) -> String {
    format!("{}:s", crawl_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_keys() {
        assert_eq!(worker_status("abc"), "abc:status");
        assert_eq!(stopping("abc"), "abc:stopping");
        assert_eq!(errors("abc"), "abc:e");
        assert_eq!(pages_done("abc"), "abc:d");
        assert_eq!(pages_found("abc"), "abc:s");
    }
}
