//! HTTP plumbing shared by the service clients.

pub mod middleware;

use middleware::AuthMiddleware;
use reqwest::{header, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;

/// Error envelope returned by Google REST APIs.
#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
}

impl FirebaseErrorResponse {
    pub fn display_message(&self) -> String {
        match &self.error.status {
            Some(status) => format!("{} (code: {}, status: {})", self.error.message, self.error.code, status),
            None => format!("{} (code: {})", self.error.message, self.error.code),
        }
    }
}

/// Consumes a failed response and renders the best message it carries.
pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    match serde_json::from_str::<FirebaseErrorResponse>(&text) {
        Ok(error_resp) => format!("{}: {}", default_msg, error_resp.display_message()),
        Err(_) if text.trim().is_empty() => format!("{}: {}", default_msg, status),
        Err(_) => format!("{} {}: {}", default_msg, status, text.trim()),
    }
}

/// Client used against production endpoints: transient retries, then OAuth2.
pub(crate) fn authorized_client(middleware: AuthMiddleware) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

    ClientBuilder::new(Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(middleware)
        .build()
}

/// Client used against the local emulator suite, which accepts the fixed `owner` token.
pub(crate) fn emulator_client() -> Result<ClientWithMiddleware, reqwest::Error> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::AUTHORIZATION, header::HeaderValue::from_static("Bearer owner"));

    let client = Client::builder().default_headers(headers).build()?;
    Ok(ClientBuilder::new(client).build())
}
