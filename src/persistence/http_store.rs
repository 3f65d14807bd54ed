//! Remote state store: `{base}/api/user-state/{user_id}`
//!
//! - `GET` returns the state, 404 when the user has none
//! - `PUT` replaces it; idempotent, so a failed save can be retried as is
//! - `DELETE` removes it

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{validate_user_id, PersistenceError, Result, StatePersistence};
use crate::scheduler::TubeState;

pub struct HttpStateStore {
    client: Client,
    base_url: String,
}

impl HttpStateStore {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(PersistenceError::InvalidUrl(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self { client, base_url })
    }

    fn state_url(&self, user_id: &str) -> Result<String> {
        validate_user_id(user_id)?;
        Ok(format!("{}/api/user-state/{}", self.base_url, user_id))
    }
}

async fn server_error(response: reqwest::Response) -> PersistenceError {
    PersistenceError::Server {
        status: response.status().as_u16(),
        message: response.text().await.unwrap_or_default(),
    }
}

#[async_trait]
impl StatePersistence for HttpStateStore {
    async fn save(&self, user_id: &str, state: &TubeState) -> Result<()> {
        let response = self
            .client
            .put(self.state_url(user_id)?)
            .json(state)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(server_error(response).await);
        }
        Ok(())
    }

    async fn load(&self, user_id: &str) -> Result<Option<TubeState>> {
        let response = self.client.get(self.state_url(user_id)?).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                // Parse separately so a corrupt blob surfaces as a JSON error
                let body = response.text().await?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            _ => Err(server_error(response).await),
        }
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        let response = self.client.delete(self.state_url(user_id)?).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(server_error(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_url() {
        let store =
            HttpStateStore::new("https://api.example.com/".to_string(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            store.state_url("learner-7").unwrap(),
            "https://api.example.com/api/user-state/learner-7"
        );
        assert!(store.state_url("a/b").is_err());
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(matches!(
            HttpStateStore::new("file:///tmp".to_string(), Duration::from_secs(5)),
            Err(PersistenceError::InvalidUrl(_))
        ));
    }
}
