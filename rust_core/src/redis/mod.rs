pub mod bus;

pub use bus::RedisBus;

/// Channel names used on the message bus.
pub mod channels {
    /// Fight results from the results desk (`ResultPublished` payloads)
    pub const RESULTS_PUBLISHED: &str = "results:published";

    /// Recomputed standings for one event (`LeaderboardResponse` payloads)
    pub fn leaderboard(event_id: &str) -> String {
        format!("leaderboard:{}", event_id)
    }
}
