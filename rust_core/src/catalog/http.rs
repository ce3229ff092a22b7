use super::{Catalog, CatalogError};
use crate::circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::models::{Contest, Contestant, Event};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fights without an order sort after everything else.
const UNORDERED_FIGHT: u32 = 999;

/// Catalog REST API client (`/events/`, `/events/{id}`, `/fights/event/{id}`).
#[derive(Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for HttpCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCatalog")
            .field("base_url", &self.base_url)
            .field("circuit_breaker_state", &self.circuit_breaker.state())
            .finish()
    }
}

// Ids arrive as integers from the database-backed API and as strings elsewhere.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Num(i64),
    Str(String),
}

impl IdRepr {
    fn into_string(self) -> String {
        match self {
            IdRepr::Num(n) => n.to_string(),
            IdRepr::Str(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventDto {
    id: IdRepr,
    title: String,
    date: NaiveDate,
    #[serde(default)]
    location: String,
    #[serde(alias = "startTime", alias = "start_time")]
    lock_at: DateTime<Utc>,
    #[serde(alias = "endTime", alias = "end_time")]
    end_at: DateTime<Utc>,
}

impl TryFrom<EventDto> for Event {
    type Error = CatalogError;

    /// Rejects events whose lock instant is not before their end.
    fn try_from(dto: EventDto) -> Result<Self, Self::Error> {
        let event = Event {
            id: dto.id.into_string(),
            title: dto.title,
            date: dto.date,
            location: dto.location,
            lock_at: dto.lock_at,
            end_at: dto.end_at,
        };
        if !event.has_valid_window() {
            return Err(CatalogError::Malformed(format!(
                "event {} locks at {} but ends at {}",
                event.id, event.lock_at, event.end_at
            )));
        }
        Ok(event)
    }
}

#[derive(Debug, Deserialize)]
struct FighterDto {
    fighter_id: IdRepr,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FightDto {
    fight_id: IdRepr,
    #[serde(default)]
    weight_class: String,
    fighter1: FighterDto,
    fighter2: FighterDto,
    #[serde(default)]
    order: Option<u32>,
    #[serde(default)]
    is_main_event: Option<bool>,
}

impl FightDto {
    fn into_contest(self, event_id: &str) -> Contest {
        Contest {
            id: self.fight_id.into_string(),
            event_id: event_id.to_string(),
            weight_class: self.weight_class,
            fighter1: Contestant {
                id: self.fighter1.fighter_id.into_string(),
                name: self.fighter1.name,
            },
            fighter2: Contestant {
                id: self.fighter2.fighter_id.into_string(),
                name: self.fighter2.name,
            },
            order: self.order.unwrap_or(UNORDERED_FIGHT),
            is_main_event: self.is_main_event.unwrap_or(false),
        }
    }
}

impl HttpCatalog {
    pub fn new(base_url: &str) -> Self {
        Self::with_config(base_url, BreakerConfig::default())
    }

    pub fn with_config(base_url: &str, breaker: BreakerConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            circuit_breaker: Arc::new(CircuitBreaker::new("catalog", breaker)),
        }
    }

    pub fn circuit_state(&self) -> BreakerState {
        self.circuit_breaker.state()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CatalogError> {
        if !self.circuit_breaker.is_available() {
            return Err(CatalogError::Unavailable(format!(
                "catalog circuit breaker is open ({})",
                path
            )));
        }

        let result = self.get_json_internal(path).await;
        match &result {
            Ok(_) | Err(CatalogError::NotFound(_)) | Err(CatalogError::Malformed(_)) => {
                self.circuit_breaker.record_success()
            }
            Err(CatalogError::Unavailable(_)) => self.circuit_breaker.record_failure(),
        }
        result
    }

    async fn get_json_internal<T: DeserializeOwned>(&self, path: &str) -> Result<T, CatalogError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(format!("{}: {}", url, e)))?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Err(CatalogError::NotFound(url)),
            s if s.is_server_error() => {
                return Err(CatalogError::Unavailable(format!("{} returned {}", url, s)))
            }
            s if !s.is_success() => {
                return Err(CatalogError::Malformed(format!("{} returned {}", url, s)))
            }
            _ => {}
        }

        resp.json::<T>()
            .await
            .map_err(|e| CatalogError::Malformed(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn list_events(&self) -> Result<Vec<Event>, CatalogError> {
        let events: Vec<EventDto> = self.get_json("/events/").await?;
        // Invalid events are skipped, not fatal.
        Ok(events
            .into_iter()
            .filter_map(|dto| match Event::try_from(dto) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Skipping event: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn get_event(&self, event_id: &str) -> Result<Event, CatalogError> {
        let event: EventDto = self.get_json(&format!("/events/{}", event_id)).await?;
        Event::try_from(event)
    }

    async fn list_contests(&self, event_id: &str) -> Result<Vec<Contest>, CatalogError> {
        let fights: Vec<FightDto> = self.get_json(&format!("/fights/event/{}", event_id)).await?;
        Ok(fights
            .into_iter()
            .map(|f| f.into_contest(event_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_dto_accepts_numeric_id_and_camel_case_times() {
        let raw = r#"{
            "id": 300,
            "title": "UFC 300",
            "date": "2024-04-13",
            "location": "Las Vegas",
            "startTime": "2024-04-13T22:00:00Z",
            "endTime": "2024-04-14T04:00:00Z"
        }"#;
        let event = Event::try_from(serde_json::from_str::<EventDto>(raw).unwrap()).unwrap();
        assert_eq!(event.id, "300");
        assert!(event.has_valid_window());
    }

    #[test]
    fn test_event_dto_rejects_inverted_window() {
        let raw = r#"{
            "id": "ufc-300",
            "title": "UFC 300",
            "date": "2024-04-13",
            "start_time": "2024-04-14T04:00:00Z",
            "end_time": "2024-04-13T22:00:00Z"
        }"#;
        let err = Event::try_from(serde_json::from_str::<EventDto>(raw).unwrap()).unwrap_err();
        assert!(matches!(err, CatalogError::Malformed(_)));
    }

    #[test]
    fn test_fight_dto_defaults() {
        let raw = r#"{
            "fight_id": "f1",
            "weight_class": "Lightweight",
            "fighter1": {"fighter_id": 11, "name": "Red"},
            "fighter2": {"fighter_id": "12", "name": "Blue"}
        }"#;
        let contest = serde_json::from_str::<FightDto>(raw)
            .unwrap()
            .into_contest("300");
        assert_eq!(contest.order, UNORDERED_FIGHT);
        assert!(!contest.is_main_event);
        assert!(contest.has_contestant("11"));
        assert!(contest.has_contestant("12"));
        assert_eq!(contest.event_id, "300");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let catalog = HttpCatalog::new("http://localhost:8000/api/");
        assert_eq!(catalog.base_url, "http://localhost:8000/api");
        assert_eq!(catalog.circuit_state(), BreakerState::Closed);
    }
}
