use crate::calendar::{BlockedSlot, DateRange, NewBlockedSlot};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Blocked slot not found: {0}")]
    NotFound(String),
    #[error("Slot already blocked or unavailable: {0}")]
    Conflict(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Parse error: {0}")]
    ParseError(String),
}

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlockedSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    all_day: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl WireBlockedSlot {
    fn into_blocked_slot(self) -> Result<BlockedSlot, ApiError> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map_err(|e| ApiError::ParseError(format!("Invalid date '{}': {}", self.date, e)))?;

        let time = if self.all_day.unwrap_or(false) {
            None
        } else {
            self.time.filter(|t| !t.is_empty())
        };

        Ok(BlockedSlot {
            id: self.id,
            date,
            time,
            reason: self.reason,
        })
    }

    fn from_new(slot: &NewBlockedSlot) -> Self {
        Self {
            id: None,
            date: slot.date.format(DATE_FORMAT).to_string(),
            time: slot.time.clone(),
            all_day: Some(slot.time.is_none()),
            reason: slot.reason.clone(),
        }
    }
}

/// The persistence collaborator behind the blocked-slot store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlockedSlotsApi: Send + Sync {
    async fn fetch_blocked_slots(
        &self,
        range: Option<DateRange>,
    ) -> Result<Vec<BlockedSlot>, ApiError>;

    async fn create_blocked_slot(&self, slot: &NewBlockedSlot) -> Result<BlockedSlot, ApiError>;

    async fn delete_blocked_slot(&self, id: &str) -> Result<(), ApiError>;
}

pub struct HttpBlockedSlotsClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpBlockedSlotsClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    fn collection_url(&self) -> String {
        format!("{}/blocked-slots", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl BlockedSlotsApi for HttpBlockedSlotsClient {
    async fn fetch_blocked_slots(
        &self,
        range: Option<DateRange>,
    ) -> Result<Vec<BlockedSlot>, ApiError> {
        let url = self.collection_url();
        let mut request = self.authorize(self.client.get(&url));

        if let Some(range) = range {
            tracing::info!("Fetching blocked slots from {} to {}", range.start, range.end);
            request = request.query(&[
                ("from", range.start.format(DATE_FORMAT).to_string()),
                ("to", range.end.format(DATE_FORMAT).to_string()),
            ]);
        } else {
            tracing::info!("Fetching all blocked slots");
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::info!("Fetch blocked slots response status: {}", status);

        if status == 401 {
            tracing::error!("Authentication failed when fetching blocked slots");
            return Err(ApiError::AuthenticationFailed);
        }

        if status == 429 {
            tracing::warn!("Rate limit exceeded");
            return Err(ApiError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await?;
            tracing::error!("Failed to fetch blocked slots. Status: {}, Body: {}", status, body);
            return Err(ApiError::RequestError(format!("Status {}: {}", status, body)));
        }

        let records: Vec<WireBlockedSlot> = response.json().await?;

        let slots: Vec<BlockedSlot> = records
            .into_iter()
            .filter_map(|record| match record.into_blocked_slot() {
                Ok(slot) => Some(slot),
                Err(e) => {
                    tracing::warn!("Skipping malformed blocked slot: {}", e);
                    None
                }
            })
            .collect();

        tracing::info!("Fetched {} blocked slots successfully", slots.len());
        Ok(slots)
    }

    async fn create_blocked_slot(&self, slot: &NewBlockedSlot) -> Result<BlockedSlot, ApiError> {
        let url = self.collection_url();
        let payload = WireBlockedSlot::from_new(slot);

        tracing::info!("Blocking {}", slot.key());
        tracing::debug!("POST {} with payload: {:?}", url, payload);

        let response = self
            .authorize(self.client.post(&url))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        tracing::info!("Create blocked slot response status: {}", status);

        if status == 401 {
            tracing::error!("Authentication failed when blocking {}", slot.key());
            return Err(ApiError::AuthenticationFailed);
        }

        if status == 409 {
            tracing::warn!("Server rejected {} as already blocked", slot.key());
            return Err(ApiError::Conflict(slot.key().to_string()));
        }

        if !status.is_success() {
            let body = response.text().await?;
            tracing::error!("Failed to block {}. Status: {}, Body: {}", slot.key(), status, body);
            return Err(ApiError::RequestError(format!("Status {}: {}", status, body)));
        }

        let created: WireBlockedSlot = response.json().await?;
        let created = created.into_blocked_slot()?;
        tracing::info!("Blocked slot created with ID: {:?}", created.id);

        Ok(created)
    }

    async fn delete_blocked_slot(&self, id: &str) -> Result<(), ApiError> {
        let url = format!("{}/{}", self.collection_url(), urlencoding::encode(id));

        tracing::info!("Removing blocked slot {}", id);

        let response = self.authorize(self.client.delete(&url)).send().await?;

        if response.status() == 401 {
            return Err(ApiError::AuthenticationFailed);
        }

        if response.status() == 404 {
            return Err(ApiError::NotFound(id.to_string()));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            return Err(ApiError::RequestError(format!("Status {}: {}", status, body)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn client_trims_trailing_slash_from_base_url() {
        let client = HttpBlockedSlotsClient::new("http://localhost:3000/api/admin/".to_string());

        assert_eq!(client.collection_url(), "http://localhost:3000/api/admin/blocked-slots");
    }

    #[test]
    fn empty_token_is_not_sent() {
        let client = HttpBlockedSlotsClient::new("http://localhost".to_string())
            .with_token(Some(String::new()));

        assert!(client.token.is_none());
    }

    #[tokio::test]
    async fn fetch_maps_all_day_flag_to_missing_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocked-slots"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "a", "date": "2025-03-10", "allDay": true, "reason": "Congés" },
                { "id": "b", "date": "2025-03-11", "time": "09:30" },
                { "id": "c", "date": "not-a-date", "time": "09:30" }
            ])))
            .mount(&server)
            .await;

        let client = HttpBlockedSlotsClient::new(server.uri());
        let slots = client.fetch_blocked_slots(None).await.unwrap();

        assert_eq!(slots.len(), 2);
        assert!(slots[0].is_all_day());
        assert_eq!(slots[0].reason.as_deref(), Some("Congés"));
        assert_eq!(slots[1].time.as_deref(), Some("09:30"));
    }

    #[tokio::test]
    async fn fetch_sends_range_hint_and_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocked-slots"))
            .and(query_param("from", "2025-03-10"))
            .and(query_param("to", "2025-03-16"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpBlockedSlotsClient::new(server.uri()).with_token(Some("secret".to_string()));
        let range = DateRange::new(date(2025, 3, 10), date(2025, 3, 16));

        let slots = client.fetch_blocked_slots(Some(range)).await.unwrap();

        assert!(slots.is_empty());
    }

    #[tokio::test]
    async fn create_posts_all_day_payload_for_whole_day() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/blocked-slots"))
            .and(body_json(json!({ "date": "2025-03-10", "allDay": true, "reason": "Indisponible" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!(
                { "id": "new", "date": "2025-03-10", "allDay": true, "reason": "Indisponible" }
            )))
            .mount(&server)
            .await;

        let client = HttpBlockedSlotsClient::new(server.uri());
        let payload = NewBlockedSlot {
            date: date(2025, 3, 10),
            time: None,
            reason: Some("Indisponible".to_string()),
        };

        let created = client.create_blocked_slot(&payload).await.unwrap();

        assert_eq!(created.id.as_deref(), Some("new"));
        assert!(created.is_all_day());
    }

    #[tokio::test]
    async fn create_conflict_status_is_conflict_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/blocked-slots"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let client = HttpBlockedSlotsClient::new(server.uri());
        let payload = NewBlockedSlot {
            date: date(2025, 3, 10),
            time: Some("09:00".to_string()),
            reason: None,
        };

        let result = client.create_blocked_slot(&payload).await;

        assert!(matches!(result, Err(ApiError::Conflict(key)) if key == "2025-03-10 09:00"));
    }

    #[tokio::test]
    async fn delete_missing_slot_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/blocked-slots/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpBlockedSlotsClient::new(server.uri());

        let result = client.delete_blocked_slot("gone").await;

        assert!(matches!(result, Err(ApiError::NotFound(id)) if id == "gone"));
    }

    #[tokio::test]
    async fn unauthorized_fetch_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = HttpBlockedSlotsClient::new(server.uri());

        let result = client.fetch_blocked_slots(None).await;

        assert!(matches!(result, Err(ApiError::AuthenticationFailed)));
    }
}
