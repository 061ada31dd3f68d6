// game_state.rs
use anyhow::{anyhow, Context, Result};
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::debug;

use crate::models::{DailyMissionsResponse, FreePackResponse};

/// Live per-player state used by derived-state notifications.
#[trait_variant::make(GameStateSource: Send)]
pub trait LocalGameStateSource {
    async fn daily_missions(&self, wallet: &str) -> Result<DailyMissionsResponse>;

    async fn next_free_pack(&self, wallet: &str) -> Result<FreePackResponse>;
}

#[derive(Clone)]
pub struct DataApiClient {
    http_client: HttpClient,
    base_url: String,
}

impl DataApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        param: &str,
        wallet: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, wallet = %wallet, "Fetching game state");

        let response = self
            .http_client
            .get(&url)
            .query(&[(param, wallet)])
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", path))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Data API {} returned status {} for {}",
                path,
                response.status(),
                wallet
            ));
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", path))
    }
}

impl GameStateSource for DataApiClient {
    async fn daily_missions(&self, wallet: &str) -> Result<DailyMissionsResponse> {
        self.get_json("/api/daily-missions", "player", wallet).await
    }

    async fn next_free_pack(&self, wallet: &str) -> Result<FreePackResponse> {
        self.get_json("/api/next-free-pack-timestamp", "recipient", wallet)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::{DataApiClient, GameStateSource};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetches_daily_missions_by_player() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/daily-missions"))
            .and(query_param("player", "0xabc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "player": "0xabc",
                "missions": [
                    {"player": "0xabc", "day": 3, "mission_id": "easy", "completed": false},
                    {"player": "0xabc", "day": 3, "mission_id": "medium", "completed": true},
                    {"player": "0xabc", "day": 3, "mission_id": "hard", "completed": false}
                ]
            })))
            .mount(&server)
            .await;

        let client = DataApiClient::new(&format!("{}/", server.uri())).unwrap();
        let missions = client.daily_missions("0xabc").await.unwrap();
        assert_eq!(missions.missions.len(), 3);
        assert_eq!(missions.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_fetches_free_pack_by_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/next-free-pack-timestamp"))
            .and(query_param("recipient", "0xabc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "recipient": "0xabc",
                "next_free_pack_timestamp": 1700000000
            })))
            .mount(&server)
            .await;

        let client = DataApiClient::new(&server.uri()).unwrap();
        let pack = client.next_free_pack("0xabc").await.unwrap();
        assert_eq!(pack.next_free_pack_timestamp, Some(1700000000));
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/next-free-pack-timestamp"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = DataApiClient::new(&server.uri()).unwrap();
        assert!(client.next_free_pack("0xabc").await.is_err());
    }
}
