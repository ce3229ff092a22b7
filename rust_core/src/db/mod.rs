//! Postgres connection pool, result archive and backend health monitoring.

pub mod health;
pub mod pool;
pub mod results;

pub use health::{BackendHealthConfig, BackendHealthMonitor};
pub use pool::{create_pool, DbPoolConfig};
pub use results::PgResultArchive;
