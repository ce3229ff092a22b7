use super::{Catalog, CatalogError};
use crate::models::{Contest, Event};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Catalog held in memory. Useful offline and in tests.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    events: RwLock<HashMap<String, Event>>,
    contests: RwLock<HashMap<String, Vec<Contest>>>,
    unavailable: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_event(&self, event: Event, contests: Vec<Contest>) {
        self.contests.write().insert(event.id.clone(), contests);
        self.events.write().insert(event.id.clone(), event);
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CatalogError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CatalogError::Unavailable("catalog offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn list_events(&self) -> Result<Vec<Event>, CatalogError> {
        self.check()?;
        let mut events: Vec<Event> = self.events.read().values().cloned().collect();
        events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn get_event(&self, event_id: &str) -> Result<Event, CatalogError> {
        self.check()?;
        self.events
            .read()
            .get(event_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("event {}", event_id)))
    }

    async fn list_contests(&self, event_id: &str) -> Result<Vec<Contest>, CatalogError> {
        self.check()?;
        self.contests
            .read()
            .get(event_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("fights for event {}", event_id)))
    }
}
