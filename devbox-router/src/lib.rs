//! Public routing for user workspaces through the Caddy admin API.
//!
//! Every user gets one host route, `<login>.<base_domain>`, reverse-proxied
//! to the private address of their guest. [`RouteManager::ensure_route`] is
//! an upsert keyed by that host: repeated calls leave exactly one route.

mod caddy;
pub mod config;
pub mod error;
pub mod manager;

pub use config::CaddyConfig;
pub use error::{Result, RouteError};
pub use manager::RouteManager;
