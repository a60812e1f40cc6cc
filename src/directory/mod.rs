//! Outbound client for the external user directory.
mod sync;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::DirectoryConfig;
use crate::users::model::User;

pub use sync::sync_created_user;

/// Fields pushed to the directory for a new user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DirectoryUser {
    pub name: String,
    pub email: String,
    pub phone_number: String,
}

impl From<&User> for DirectoryUser {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory not configured")]
    NotConfigured,
    #[error("directory responded with status {status}")]
    Rejected { status: u16, body: Value },
    #[error("directory request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Registers the user and returns the directory's JSON response body.
    async fn register_user(&self, user: &DirectoryUser) -> Result<Value, DirectoryError>;
}

/// Directory reached over HTTP with a bearer token.
pub struct HttpDirectoryClient {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl HttpDirectoryClient {
    pub fn new(url: String, token: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create directory HTTP client")?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn register_user(&self, user: &DirectoryUser) -> Result<Value, DirectoryError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(user)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        // Non-JSON bodies are kept verbatim so they still show up in the logs.
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            return Err(DirectoryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// Stand-in used when no directory URL is configured; every sync fails.
pub struct UnconfiguredDirectory;

#[async_trait]
impl DirectoryClient for UnconfiguredDirectory {
    async fn register_user(&self, _user: &DirectoryUser) -> Result<Value, DirectoryError> {
        Err(DirectoryError::NotConfigured)
    }
}

/// Builds the client described by `config`.
pub fn from_config(config: &DirectoryConfig) -> anyhow::Result<Box<dyn DirectoryClient>> {
    match &config.url {
        Some(url) => Ok(Box::new(HttpDirectoryClient::new(
            url.clone(),
            config.token.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => {
            tracing::warn!("USER_SERVICE_URL not set; directory sync disabled");
            Ok(Box::new(UnconfiguredDirectory))
        }
    }
}
