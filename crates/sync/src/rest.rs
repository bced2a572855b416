// HTTP fallback surface: the existing REST message endpoints.
//
// Responses carry the same `Message` entity the push channel delivers, so
// reconciliation needs no second mapping layer. The bearer token is read
// from the provider per request.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use banter_common::types::{GroupId, Message, MessageId};

use crate::config::SyncConfig;
use crate::error::{ApiError, SyncError};
use crate::token::TokenProvider;

/// Body of the create-message call. `client_temp_id` doubles as the
/// server-side idempotency key, so a fallback racing a successful push
/// publish yields the same message id instead of a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateMessageRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<MessageId>,
    pub client_temp_id: i64,
}

/// The REST endpoints the delivery coordinator falls back to.
#[async_trait]
pub trait MessageApi: Send + Sync + 'static {
    async fn create_message(
        &self,
        group_id: GroupId,
        request: &CreateMessageRequest,
    ) -> Result<Message, ApiError>;

    async fn edit_message(
        &self,
        group_id: GroupId,
        id: MessageId,
        content: &str,
    ) -> Result<Message, ApiError>;

    async fn delete_message(&self, group_id: GroupId, id: MessageId) -> Result<(), ApiError>;

    async fn recent_messages(
        &self,
        group_id: GroupId,
        limit: u32,
    ) -> Result<Vec<Message>, ApiError>;
}

/// reqwest-backed implementation against the configured API base URL.
pub struct HttpMessageApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpMessageApi {
    pub fn new(config: &SyncConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn bearer(&self) -> Result<String, ApiError> {
        self.tokens.bearer_token().map_err(|error| ApiError::Auth(error.to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status: status.as_u16(), body })
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn create_message(
        &self,
        group_id: GroupId,
        request: &CreateMessageRequest,
    ) -> Result<Message, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/v1/groups/{group_id}/messages")))
            .bearer_auth(self.bearer()?)
            .json(request)
            .send()
            .await?;
        expect_success(response)
            .await?
            .json::<Message>()
            .await
            .map_err(|error| ApiError::Decode(error.to_string()))
    }

    async fn edit_message(
        &self,
        group_id: GroupId,
        id: MessageId,
        content: &str,
    ) -> Result<Message, ApiError> {
        let response = self
            .client
            .patch(self.url(&format!("/v1/groups/{group_id}/messages/{id}")))
            .bearer_auth(self.bearer()?)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;
        expect_success(response)
            .await?
            .json::<Message>()
            .await
            .map_err(|error| ApiError::Decode(error.to_string()))
    }

    async fn delete_message(&self, group_id: GroupId, id: MessageId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/v1/groups/{group_id}/messages/{id}")))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        group_id: GroupId,
        limit: u32,
    ) -> Result<Vec<Message>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/groups/{group_id}/messages")))
            .query(&[("limit", limit)])
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        expect_success(response)
            .await?
            .json::<Vec<Message>>()
            .await
            .map_err(|error| ApiError::Decode(error.to_string()))
    }
}
