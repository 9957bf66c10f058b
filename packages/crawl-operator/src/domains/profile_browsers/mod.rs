//! Profile browsers domain

pub mod models;
pub mod reconciler;

pub use models::{ProfileBrowserSyncRequest, ProfileBrowserSyncResponse};
pub use reconciler::sync_profile_browser;
