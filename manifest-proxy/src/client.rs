use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::config::Config;
use crate::flag_definitions::{
    ApiErrorBody, CreateFeatureFlagBody, FeatureFlag, FeatureFlagPage, UpdateFeatureFlagBody,
};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("feature flag {0} not found")]
    NotFound(String),
    #[error("PostHog API error ({status}): {} {}", .body.error_type, .body.detail)]
    Api { status: u16, body: ApiErrorBody },
    #[error("unexpected PostHog response ({status}): {body}")]
    Unexpected { status: u16, body: String },
    #[error("request to PostHog failed: {0}")]
    Request(reqwest::Error),
    #[error("failed to decode PostHog response: {0}")]
    Decode(String),
    #[error("invalid PostHog client configuration: {0}")]
    InvalidConfig(String),
    #[error("timed out waiting for PostHog")]
    Timeout,
}

impl ClientError {
    /// PostHog rejects a create for an existing key with a `unique` validation error.
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            ClientError::Api { body, .. } => {
                body.error_type == "validation_error" && body.code == "unique"
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Request(e)
        }
    }
}

/// The slice of the PostHog feature flag API this service needs.
#[async_trait]
pub trait FlagClient {
    /// All flags in the project, following pagination to the end.
    async fn list_flags(&self) -> Result<Vec<FeatureFlag>, ClientError>;

    async fn get_flag_by_key(&self, key: &str) -> Result<FeatureFlag, ClientError>;

    async fn create_flag(&self, body: &CreateFeatureFlagBody) -> Result<FeatureFlag, ClientError>;

    async fn update_flag(
        &self,
        id: i64,
        body: &UpdateFeatureFlagBody,
    ) -> Result<FeatureFlag, ClientError>;

    async fn delete_flag(&self, id: i64) -> Result<(), ClientError>;
}

pub struct PostHogClient {
    client: reqwest::Client,
    host: String,
    flags_url: String,
}

impl PostHogClient {
    pub fn new(config: &Config) -> Result<PostHogClient, ClientError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", config.posthog_api_key))
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("PostHog Manifest Proxy")
            .timeout(config.posthog_timeout())
            .build()
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;

        let host = config.posthog_host.trim_end_matches('/').to_string();
        let flags_url = format!(
            "{}/api/projects/{}/feature_flags",
            host, config.posthog_project_id
        );

        Ok(PostHogClient {
            client,
            host,
            flags_url,
        })
    }

    // `next` links are usually absolute, but self-hosted instances behind a proxy
    // sometimes hand back a path.
    fn resolve_url(&self, raw: &str) -> String {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("{}{}", self.host, raw)
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        identifier: &str,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        let response = check_status(response, identifier).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

async fn check_status(
    response: reqwest::Response,
    identifier: &str,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(identifier.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let err = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(api_error) if !api_error.detail.is_empty() => ClientError::Api {
            status: status.as_u16(),
            body: api_error,
        },
        _ => ClientError::Unexpected {
            status: status.as_u16(),
            body,
        },
    };

    tracing::warn!("PostHog API error: {}", err);
    Err(err)
}

#[async_trait]
impl FlagClient for PostHogClient {
    #[instrument(skip_all)]
    async fn list_flags(&self) -> Result<Vec<FeatureFlag>, ClientError> {
        let mut next_url = Some(format!("{}/", self.flags_url));
        let mut flags = Vec::new();

        while let Some(url) = next_url {
            let page: FeatureFlagPage = self.send(self.client.get(&url), "list").await?;
            flags.extend(page.results);
            next_url = page
                .next
                .filter(|next| !next.is_empty())
                .map(|next| self.resolve_url(&next));
        }

        tracing::debug!("fetched {} flags from PostHog", flags.len());
        Ok(flags)
    }

    // The detail endpoint accepts either the numeric id or the flag key.
    #[instrument(skip_all, fields(key = %key))]
    async fn get_flag_by_key(&self, key: &str) -> Result<FeatureFlag, ClientError> {
        let url = format!("{}/{}/", self.flags_url, key);
        self.send(self.client.get(url), key).await
    }

    #[instrument(skip_all, fields(key = %body.key))]
    async fn create_flag(&self, body: &CreateFeatureFlagBody) -> Result<FeatureFlag, ClientError> {
        let url = format!("{}/", self.flags_url);
        self.send(self.client.post(url).json(body), &body.key).await
    }

    #[instrument(skip_all, fields(id = id))]
    async fn update_flag(
        &self,
        id: i64,
        body: &UpdateFeatureFlagBody,
    ) -> Result<FeatureFlag, ClientError> {
        let url = format!("{}/{}/", self.flags_url, id);
        self.send(self.client.patch(url).json(body), &id.to_string())
            .await
    }

    #[instrument(skip_all, fields(id = id))]
    async fn delete_flag(&self, id: i64) -> Result<(), ClientError> {
        let url = format!("{}/{}/", self.flags_url, id);
        let response = self.client.delete(url).send().await?;
        check_status(response, &id.to_string()).await?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
enum MockFailure {
    Timeout,
    Api { status: u16, body: ApiErrorBody },
}

impl MockFailure {
    fn to_error(&self) -> ClientError {
        match self {
            MockFailure::Timeout => ClientError::Timeout,
            MockFailure::Api { status, body } => ClientError::Api {
                status: *status,
                body: body.clone(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    flags: Vec<FeatureFlag>,
    next_id: i64,
    created: Vec<CreateFeatureFlagBody>,
    updated: Vec<(i64, UpdateFeatureFlagBody)>,
    deleted: Vec<i64>,
    failure: Option<MockFailure>,
}

/// In-memory stand-in for PostHog. Behaves like the real API for the calls the
/// proxy makes, and remembers every write it receives.
#[derive(Clone, Default)]
pub struct MockFlagClient {
    state: Arc<Mutex<MockState>>,
}

impl MockFlagClient {
    pub fn new() -> MockFlagClient {
        Self::default()
    }

    pub fn with_flags(flags: Vec<FeatureFlag>) -> MockFlagClient {
        let next_id = flags.iter().map(|f| f.id).max().unwrap_or(0);
        MockFlagClient {
            state: Arc::new(Mutex::new(MockState {
                flags,
                next_id,
                ..Default::default()
            })),
        }
    }

    /// Every subsequent call fails with a timeout.
    pub async fn fail_with_timeout(&self) {
        self.state.lock().await.failure = Some(MockFailure::Timeout);
    }

    pub async fn fail_with_api_error(&self, status: u16, body: ApiErrorBody) {
        self.state.lock().await.failure = Some(MockFailure::Api { status, body });
    }

    pub async fn flags(&self) -> Vec<FeatureFlag> {
        self.state.lock().await.flags.clone()
    }

    pub async fn created(&self) -> Vec<CreateFeatureFlagBody> {
        self.state.lock().await.created.clone()
    }

    pub async fn updated(&self) -> Vec<(i64, UpdateFeatureFlagBody)> {
        self.state.lock().await.updated.clone()
    }

    pub async fn deleted(&self) -> Vec<i64> {
        self.state.lock().await.deleted.clone()
    }
}

fn fail_if_configured(state: &MockState) -> Result<(), ClientError> {
    match &state.failure {
        Some(failure) => Err(failure.to_error()),
        None => Ok(()),
    }
}

#[async_trait]
impl FlagClient for MockFlagClient {
    async fn list_flags(&self) -> Result<Vec<FeatureFlag>, ClientError> {
        let state = self.state.lock().await;
        fail_if_configured(&state)?;

        Ok(state.flags.clone())
    }

    async fn get_flag_by_key(&self, key: &str) -> Result<FeatureFlag, ClientError> {
        let state = self.state.lock().await;
        fail_if_configured(&state)?;

        state
            .flags
            .iter()
            .find(|f| f.key == key && !f.deleted)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(key.to_string()))
    }

    async fn create_flag(&self, body: &CreateFeatureFlagBody) -> Result<FeatureFlag, ClientError> {
        let mut state = self.state.lock().await;
        fail_if_configured(&state)?;
        state.created.push(body.clone());

        if state.flags.iter().any(|f| f.key == body.key && !f.deleted) {
            return Err(ClientError::Api {
                status: 400,
                body: ApiErrorBody {
                    error_type: "validation_error".to_string(),
                    code: "unique".to_string(),
                    detail: "There is already a feature flag with this key.".to_string(),
                    attr: Some("key".to_string()),
                },
            });
        }

        state.next_id += 1;
        let now = Utc::now();
        let flag = FeatureFlag {
            id: state.next_id,
            name: body.name.clone(),
            key: body.key.clone(),
            filters: body.filters.clone(),
            deleted: false,
            active: body.active,
            tags: body.tags.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        state.flags.push(flag.clone());

        Ok(flag)
    }

    async fn update_flag(
        &self,
        id: i64,
        body: &UpdateFeatureFlagBody,
    ) -> Result<FeatureFlag, ClientError> {
        let mut state = self.state.lock().await;
        fail_if_configured(&state)?;
        state.updated.push((id, body.clone()));

        let flag = state
            .flags
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| ClientError::NotFound(id.to_string()))?;

        if let Some(name) = &body.name {
            flag.name = name.clone();
        }
        if let Some(filters) = &body.filters {
            flag.filters = filters.clone();
        }
        if let Some(active) = body.active {
            flag.active = active;
        }
        if let Some(tags) = &body.tags {
            flag.tags = tags.clone();
        }
        flag.updated_at = Some(Utc::now());

        Ok(flag.clone())
    }

    async fn delete_flag(&self, id: i64) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        fail_if_configured(&state)?;

        let before = state.flags.len();
        state.flags.retain(|f| f.id != id);
        if state.flags.len() == before {
            return Err(ClientError::NotFound(id.to_string()));
        }
        state.deleted.push(id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::manifest::FlagType;
    use crate::test_utils::{create_request, vendor_flag};
    use crate::transformer::standard_to_vendor_create;

    #[test]
    fn test_duplicate_key_detection() {
        let duplicate = ClientError::Api {
            status: 400,
            body: ApiErrorBody {
                error_type: "validation_error".to_string(),
                code: "unique".to_string(),
                detail: "There is already a feature flag with this key.".to_string(),
                attr: Some("key".to_string()),
            },
        };
        assert!(duplicate.is_duplicate_key());

        let other = ClientError::Api {
            status: 400,
            body: ApiErrorBody {
                error_type: "validation_error".to_string(),
                code: "invalid_input".to_string(),
                detail: "Invalid filters".to_string(),
                attr: None,
            },
        };
        assert!(!other.is_duplicate_key());
        assert!(!ClientError::Timeout.is_duplicate_key());
    }

    #[test]
    fn test_resolve_url() {
        let mut config = Config::default_test_config();
        config.posthog_host = "https://eu.posthog.com/".to_string();
        let client = PostHogClient::new(&config).unwrap();

        assert_eq!(
            client.flags_url,
            "https://eu.posthog.com/api/projects/1/feature_flags"
        );
        assert_eq!(
            client.resolve_url("/api/projects/1/feature_flags/?offset=100"),
            "https://eu.posthog.com/api/projects/1/feature_flags/?offset=100"
        );
        assert_eq!(
            client.resolve_url("https://other.example.com/page/2"),
            "https://other.example.com/page/2"
        );
    }

    #[test]
    fn test_invalid_api_key_is_a_config_error() {
        let mut config = Config::default_test_config();
        config.posthog_api_key = "phx_bad\nkey".to_string();

        assert!(matches!(
            PostHogClient::new(&config),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_client_create_then_get() {
        let client = MockFlagClient::with_flags(vec![vendor_flag(4, "existing")]);
        let body = standard_to_vendor_create(
            &create_request("new-flag", FlagType::Boolean, json!(true)),
            0,
        );

        let created = client.create_flag(&body).await.unwrap();
        assert_eq!(created.id, 5);
        assert_eq!(client.get_flag_by_key("new-flag").await.unwrap(), created);
        assert_eq!(client.created().await, vec![body.clone()]);

        let err = client.create_flag(&body).await.unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[tokio::test]
    async fn test_mock_client_update_and_delete() {
        let client = MockFlagClient::with_flags(vec![vendor_flag(1, "a")]);

        let updated = client
            .update_flag(
                1,
                &UpdateFeatureFlagBody {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.active);
        assert_eq!(updated.name, "a description");

        client.delete_flag(1).await.unwrap();
        assert!(matches!(
            client.get_flag_by_key("a").await,
            Err(ClientError::NotFound(_))
        ));
        assert!(matches!(
            client.delete_flag(1).await,
            Err(ClientError::NotFound(_))
        ));
        assert_eq!(client.deleted().await, vec![1]);
    }

    #[tokio::test]
    async fn test_mock_client_injected_failure() {
        let client = MockFlagClient::with_flags(vec![vendor_flag(1, "a")]);
        client.fail_with_timeout().await;

        assert!(matches!(client.list_flags().await, Err(ClientError::Timeout)));
    }
}
