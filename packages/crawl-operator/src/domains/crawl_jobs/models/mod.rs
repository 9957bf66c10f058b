pub mod crawl_file;
pub mod records;
pub mod resources;
pub mod spec;
pub mod state;
pub mod stats;
pub mod status;

pub use crawl_file::{CrawlFile, MailboxEntry};
pub use records::{CrawlConfig, CrawlRecordState, Organization, User};
pub use resources::*;
pub use spec::{CrawlJobSpec, CrawlRef, CrawlSpec};
pub use state::CrawlState;
pub use stats::CrawlStats;
pub use status::CrawlStatus;
