//! Typed ID definitions for the records the operator touches.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for organizations (tenants).
pub struct Organization;

/// Marker type for crawl configs (workflows).
pub struct CrawlConfig;

/// Marker type for users.
pub struct User;

// ============================================================================
// Type aliases
// ============================================================================

pub type OrgId = Id<Organization>;
pub type CrawlConfigId = Id<CrawlConfig>;
pub type UserId = Id<User>;
