//! Registration tokens.
//!
//! Tokens are minted by the client platform (Android, Apple, Web), not by this crate.
//! A [`RegistrationTokenSource`] is how the host application hands them over; the
//! current token is then cached per app in a single slot.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::messaging::MessagingError;

/// Supplies registration tokens for the platform the host runs on.
#[async_trait]
pub trait RegistrationTokenSource: Send + Sync {
    /// Obtains the current registration token.
    async fn fetch_token(&self) -> Result<String, MessagingError>;

    /// Revokes `token` on the platform side.
    async fn delete_token(&self, _token: &str) -> Result<(), MessagingError> {
        Ok(())
    }
}

/// Source for hosts that already hold a token, e.g. one reported by a device.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl RegistrationTokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> Result<String, MessagingError> {
        Ok(self.token.clone())
    }
}

/// Default source: no client SDK is available to mint tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedTokenSource;

#[async_trait]
impl RegistrationTokenSource for UnsupportedTokenSource {
    async fn fetch_token(&self) -> Result<String, MessagingError> {
        Err(MessagingError::Unsupported(
            "registration tokens are issued by client platforms; configure a RegistrationTokenSource",
        ))
    }

    async fn delete_token(&self, _token: &str) -> Result<(), MessagingError> {
        Err(MessagingError::Unsupported(
            "registration tokens are issued by client platforms; configure a RegistrationTokenSource",
        ))
    }
}

/// Per-app messaging state shared by every messaging handle of the app.
#[derive(Debug)]
pub(crate) struct MessagingState {
    token: RwLock<Option<String>>,
    auto_init_enabled: AtomicBool,
}

impl Default for MessagingState {
    fn default() -> Self {
        Self {
            token: RwLock::new(None),
            auto_init_enabled: AtomicBool::new(true),
        }
    }
}

impl MessagingState {
    pub(crate) fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub(crate) fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    pub(crate) fn auto_init_enabled(&self) -> bool {
        self.auto_init_enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_auto_init_enabled(&self, enabled: bool) {
        self.auto_init_enabled.store(enabled, Ordering::SeqCst);
    }
}
