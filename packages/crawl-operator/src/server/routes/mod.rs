// HTTP routes
pub mod crawls;
pub mod cronjobs;
pub mod health;
pub mod profile_browsers;

pub use crawls::*;
pub use cronjobs::*;
pub use health::*;
pub use profile_browsers::*;
