pub mod crawl_jobs;
pub mod profile_browsers;
pub mod scheduled_jobs;
