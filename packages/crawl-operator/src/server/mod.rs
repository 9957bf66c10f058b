// HTTP server setup (Axum webhooks for the controller)
pub mod app;
pub mod routes;

pub use app::*;
