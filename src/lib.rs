/// IPAM admin service
///
/// Role-scoped access control, the user approval lifecycle, an IP address
/// inventory and an append-only audit ledger behind a JSON API.

pub mod access;
pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod ipam;
pub mod metrics;
pub mod operations;
pub mod server;
pub mod sessions;
pub mod users;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{IpamError, IpamResult};
