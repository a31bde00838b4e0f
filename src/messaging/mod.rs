//! Firebase Cloud Messaging module.
//!
//! Sends messages through the FCM HTTP v1 API and manages topic subscriptions through the
//! Instance ID API. The app's current registration token lives in a per-app slot filled
//! from a [`RegistrationTokenSource`].
//!
//! # Examples
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use firebase_kit::app::FirebaseApp;
//! # use firebase_kit::messaging::{models::Message, token::StaticTokenSource};
//! # async fn run(app: FirebaseApp, device_token: String) -> Result<(), firebase_kit::messaging::MessagingError> {
//! let messaging = app
//!     .messaging()?
//!     .with_token_source(Arc::new(StaticTokenSource::new(device_token)));
//!
//! messaging.subscribe_to_topic("news").await?;
//! messaging
//!     .send(&Message {
//!         topic: Some("news".to_string()),
//!         ..Default::default()
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod models;
pub mod token;

use std::borrow::Cow;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::app::AppError;
use crate::core::middleware::AuthMiddleware;
use crate::core::{authorized_client, parse_error_response};
use crate::messaging::models::{
    BatchResponse, Message, SendResponse, SendResponseInternal, TopicManagementError,
    TopicManagementResponse,
};
use crate::messaging::token::{MessagingState, RegistrationTokenSource, UnsupportedTokenSource};


const FCM_API_ORIGIN: &str = "https://fcm.googleapis.com";
const IID_API_ORIGIN: &str = "https://iid.googleapis.com";

/// Largest number of messages accepted by one `send_each` call.
pub const MAX_BATCH_SIZE: usize = 500;
const TOPIC_BATCH_SIZE: usize = 1000;
const SEND_CONCURRENCY: usize = 16;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error(transparent)]
    App(#[from] AppError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The configured platform cannot perform the operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

#[derive(Clone, Debug)]
pub(crate) struct Endpoints {
    pub(crate) fcm: String,
    pub(crate) iid: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            fcm: FCM_API_ORIGIN.to_string(),
            iid: IID_API_ORIGIN.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct FirebaseMessaging {
    client: ClientWithMiddleware,
    project_id: String,
    endpoints: Endpoints,
    state: Arc<MessagingState>,
    token_source: Arc<dyn RegistrationTokenSource>,
}

// Wrapper for the request body required by FCM v1 API
#[derive(Serialize)]
struct SendRequest<'a> {
    validate_only: bool,
    message: &'a Message,
}

#[derive(Serialize)]
struct TopicManagementRequest<'a> {
    to: &'a str,
    registration_tokens: &'a [&'a str],
}

#[derive(Deserialize)]
struct TopicManagementApiResponse {
    results: Option<Vec<TopicManagementApiResult>>,
}

#[derive(Deserialize)]
struct TopicManagementApiResult {
    error: Option<String>,
}

impl FirebaseMessaging {
    pub(crate) fn new(middleware: AuthMiddleware, project_id: String, state: Arc<MessagingState>) -> Self {
        Self {
            client: authorized_client(middleware),
            project_id,
            endpoints: Endpoints::default(),
            state,
            token_source: Arc::new(UnsupportedTokenSource),
        }
    }

    /// Creates a client with a custom HTTP client and endpoints.
    /// Internal use only, primarily for testing.
    #[allow(dead_code)]
    pub(crate) fn new_with_client(
        client: ClientWithMiddleware,
        project_id: &str,
        endpoints: Endpoints,
        state: Arc<MessagingState>,
    ) -> Self {
        Self {
            client,
            project_id: project_id.to_string(),
            endpoints,
            state,
            token_source: Arc::new(UnsupportedTokenSource),
        }
    }

    /// Replaces the platform hook used to obtain registration tokens.
    pub fn with_token_source(mut self, source: Arc<dyn RegistrationTokenSource>) -> Self {
        self.token_source = source;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Whether automatic token initialization is enabled for the app. Defaults to `true`.
    pub fn auto_init_enabled(&self) -> bool {
        self.state.auto_init_enabled()
    }

    pub fn set_auto_init_enabled(&self, enabled: bool) {
        self.state.set_auto_init_enabled(enabled);
    }

    /// Returns the app's registration token, fetching it from the token source on first use.
    pub async fn get_token(&self) -> Result<String, MessagingError> {
        if let Some(token) = self.state.token() {
            return Ok(token);
        }

        let token = self.token_source.fetch_token().await?;
        if token.trim().is_empty() {
            return Err(MessagingError::InvalidArgument(
                "token source returned a blank registration token".to_string(),
            ));
        }

        debug!("stored new registration token");
        self.state.set_token(Some(token.clone()));
        Ok(token)
    }

    /// Revokes the current registration token and clears it from the app.
    pub async fn delete_token(&self) -> Result<(), MessagingError> {
        if let Some(token) = self.state.token() {
            self.token_source.delete_token(&token).await?;
        }
        self.state.set_token(None);
        Ok(())
    }

    /// Subscribes the app's registration token to `topic`.
    pub async fn subscribe_to_topic(&self, topic: &str) -> Result<(), MessagingError> {
        let topic = normalize_topic(topic)?;
        let token = self.get_token().await?;
        let response = self.manage_topic(&topic, &[token.as_str()], true).await?;
        single_token_result(response)
    }

    /// Unsubscribes the app's registration token from `topic`.
    pub async fn unsubscribe_from_topic(&self, topic: &str) -> Result<(), MessagingError> {
        let topic = normalize_topic(topic)?;
        let token = self.get_token().await?;
        let response = self.manage_topic(&topic, &[token.as_str()], false).await?;
        single_token_result(response)
    }

    /// Subscribes `tokens` to `topic`. Per-token failures are reported, not raised.
    pub async fn subscribe_tokens_to_topic(
        &self,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError> {
        let topic = normalize_topic(topic)?;
        validate_tokens(tokens)?;
        self.manage_topic(&topic, tokens, true).await
    }

    /// Unsubscribes `tokens` from `topic`. Per-token failures are reported, not raised.
    pub async fn unsubscribe_tokens_from_topic(
        &self,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError> {
        let topic = normalize_topic(topic)?;
        validate_tokens(tokens)?;
        self.manage_topic(&topic, tokens, false).await
    }

    async fn manage_topic(
        &self,
        topic_path: &str,
        tokens: &[&str],
        subscribe: bool,
    ) -> Result<TopicManagementResponse, MessagingError> {
        let url = if subscribe {
            format!("{}/iid/v1:batchAdd", self.endpoints.iid)
        } else {
            format!("{}/iid/v1:batchRemove", self.endpoints.iid)
        };

        let mut response_summary = TopicManagementResponse::default();

        for (batch_idx, chunk) in tokens.chunks(TOPIC_BATCH_SIZE).enumerate() {
            let request = TopicManagementRequest {
                to: topic_path,
                registration_tokens: chunk,
            };

            let offset = batch_idx * TOPIC_BATCH_SIZE;
            let api_response = match self.send_topic_batch(&url, &request).await {
                Ok(api_response) => api_response,
                // Nothing applied yet: report the failure as is.
                Err(e) if batch_idx == 0 => return Err(e),
                Err(e) => {
                    warn!(topic = topic_path, offset, error = %e, "topic management batch failed");
                    let reason = e.to_string();
                    response_summary.failure_count += chunk.len();
                    response_summary
                        .errors
                        .extend((0..chunk.len()).map(|i| TopicManagementError {
                            index: offset + i,
                            reason: reason.clone(),
                        }));
                    continue;
                }
            };

            for (i, result) in api_response.results.unwrap_or_default().into_iter().enumerate() {
                match result.error {
                    Some(reason) => {
                        response_summary.failure_count += 1;
                        response_summary.errors.push(TopicManagementError {
                            index: offset + i,
                            reason,
                        });
                    }
                    None => response_summary.success_count += 1,
                }
            }
        }

        debug!(
            topic = topic_path,
            subscribe,
            success = response_summary.success_count,
            failure = response_summary.failure_count,
            "topic management finished"
        );
        Ok(response_summary)
    }

    async fn send_topic_batch(
        &self,
        url: &str,
        request: &TopicManagementRequest<'_>,
    ) -> Result<TopicManagementApiResponse, MessagingError> {
        let response = self
            .client
            .post(url)
            .header("access_token_auth", "true")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MessagingError::ApiError(
                parse_error_response(response, "Topic management failed").await,
            ));
        }

        Ok(response.json().await?)
    }

    /// Sends `message` and returns the server-assigned message name.
    pub async fn send(&self, message: &Message) -> Result<String, MessagingError> {
        validate_message(message)?;
        self.send_request(message, false).await
    }

    /// Validates `message` server-side without delivering it.
    pub async fn send_dry_run(&self, message: &Message) -> Result<String, MessagingError> {
        validate_message(message)?;
        self.send_request(message, true).await
    }

    async fn send_request(&self, message: &Message, dry_run: bool) -> Result<String, MessagingError> {
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.endpoints.fcm, self.project_id
        );

        let message = strip_topic_prefix(message);
        let request = SendRequest {
            validate_only: dry_run,
            message: &*message,
        };

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MessagingError::ApiError(
                parse_error_response(response, "FCM send failed").await,
            ));
        }

        let result: SendResponseInternal = response.json().await?;
        Ok(result.name)
    }

    /// Sends every message independently.
    ///
    /// All messages are validated before anything is sent. A message that fails to send does
    /// not stop the others; its error is recorded in the matching slot of the response.
    pub async fn send_each(&self, messages: &[Message]) -> Result<BatchResponse, MessagingError> {
        self.send_each_request(messages, false).await
    }

    pub async fn send_each_dry_run(&self, messages: &[Message]) -> Result<BatchResponse, MessagingError> {
        self.send_each_request(messages, true).await
    }

    async fn send_each_request(&self, messages: &[Message], dry_run: bool) -> Result<BatchResponse, MessagingError> {
        if messages.is_empty() {
            return Ok(BatchResponse::default());
        }

        if messages.len() > MAX_BATCH_SIZE {
            return Err(MessagingError::InvalidArgument(format!(
                "cannot send more than {} messages in a single batch",
                MAX_BATCH_SIZE
            )));
        }

        for message in messages {
            validate_message(message)?;
        }

        let results: Vec<Result<String, MessagingError>> = stream::iter(messages)
            .map(|message| self.send_request(message, dry_run))
            .buffered(SEND_CONCURRENCY)
            .collect()
            .await;

        let responses = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(name) => SendResponse {
                    success: true,
                    message_id: Some(name),
                    error: None,
                },
                Err(e) => {
                    warn!(index, error = %e, "message in batch failed");
                    SendResponse {
                        success: false,
                        message_id: None,
                        error: Some(format!("message {} of {}: {}", index, messages.len(), e)),
                    }
                }
            })
            .collect();

        Ok(BatchResponse::from_responses(responses))
    }

    /// Sends a copy of `message` to each token.
    pub async fn send_multicast(&self, message: &Message, tokens: &[&str]) -> Result<BatchResponse, MessagingError> {
        self.send_multicast_request(message, tokens, false).await
    }

    pub async fn send_multicast_dry_run(&self, message: &Message, tokens: &[&str]) -> Result<BatchResponse, MessagingError> {
        self.send_multicast_request(message, tokens, true).await
    }

    async fn send_multicast_request(&self, base_message: &Message, tokens: &[&str], dry_run: bool) -> Result<BatchResponse, MessagingError> {
        if base_message.token.is_some() || base_message.topic.is_some() || base_message.condition.is_some() {
            return Err(MessagingError::InvalidArgument(
                "multicast base message must not have a target (token, topic, or condition)".to_string(),
            ));
        }
        validate_tokens(tokens)?;

        let messages: Vec<Message> = tokens
            .iter()
            .map(|token| Message {
                token: Some(token.to_string()),
                ..base_message.clone()
            })
            .collect();

        self.send_each_request(&messages, dry_run).await
    }
}

fn validate_message(message: &Message) -> Result<(), MessagingError> {
    let num_targets = [
        message.token.is_some(),
        message.topic.is_some(),
        message.condition.is_some(),
    ]
    .iter()
    .filter(|&&t| t)
    .count();

    if num_targets != 1 {
        return Err(MessagingError::InvalidArgument(
            "message must have exactly one of token, topic, or condition".to_string(),
        ));
    }

    if let Some(token) = &message.token {
        if token.trim().is_empty() {
            return Err(MessagingError::InvalidArgument("registration token must not be blank".to_string()));
        }
    }
    if let Some(topic) = &message.topic {
        normalize_topic(topic)?;
    }
    if let Some(condition) = &message.condition {
        if condition.trim().is_empty() {
            return Err(MessagingError::InvalidArgument("condition must not be blank".to_string()));
        }
    }

    Ok(())
}

fn validate_tokens(tokens: &[&str]) -> Result<(), MessagingError> {
    if tokens.is_empty() {
        return Err(MessagingError::InvalidArgument("registration tokens must not be empty".to_string()));
    }
    if let Some(index) = tokens.iter().position(|t| t.trim().is_empty()) {
        return Err(MessagingError::InvalidArgument(format!(
            "registration token at index {} is blank",
            index
        )));
    }
    Ok(())
}

/// Validates a topic name and returns it in `/topics/<name>` form.
fn normalize_topic(topic: &str) -> Result<String, MessagingError> {
    let name = topic_name(topic);

    if name.is_empty() {
        return Err(MessagingError::InvalidArgument("topic must not be blank".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '%'))
    {
        return Err(MessagingError::InvalidArgument(format!("invalid topic name: {}", topic)));
    }

    Ok(format!("/topics/{}", name))
}

/// Bare topic name: surrounding whitespace and a `/topics/` prefix removed.
fn topic_name(topic: &str) -> &str {
    let trimmed = topic.trim();
    trimmed.strip_prefix("/topics/").unwrap_or(trimmed)
}

fn strip_topic_prefix(message: &Message) -> Cow<'_, Message> {
    match message.topic.as_deref() {
        Some(topic) if topic_name(topic) != topic => Cow::Owned(Message {
            topic: Some(topic_name(topic).to_string()),
            ..message.clone()
        }),
        _ => Cow::Borrowed(message),
    }
}

fn single_token_result(response: TopicManagementResponse) -> Result<(), MessagingError> {
    match response.errors.into_iter().next() {
        Some(error) => Err(MessagingError::ApiError(format!(
            "Topic management failed: {}",
            error.reason
        ))),
        None => Ok(()),
    }
}
