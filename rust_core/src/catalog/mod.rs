//! Catalog and identity collaborators.
//!
//! The catalog owns events, fights and fighters; this crate only reads them.

pub mod http;
pub mod memory;

pub use http::HttpCatalog;
pub use memory::MemoryCatalog;

use crate::models::{Contest, Event};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("malformed catalog payload: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_events(&self) -> Result<Vec<Event>, CatalogError>;
    async fn get_event(&self, event_id: &str) -> Result<Event, CatalogError>;
    async fn list_contests(&self, event_id: &str) -> Result<Vec<Contest>, CatalogError>;
}

/// The current session's user, as supplied by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub authenticated: bool,
}

impl Identity {
    pub fn authenticated(user_id: &str, display_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            authenticated: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user_id: String::new(),
            display_name: String::new(),
            authenticated: false,
        }
    }
}
