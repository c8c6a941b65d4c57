use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::time::sleep;

use crate::error::{Result, ScienceError};

// ─── PacedClient ──────────────────────────────────────────────────────────────

/// HTTP client that pauses for a fixed delay after every request it sends.
///
/// The pause belongs to the call sequence, not to a request: three calls
/// in a row cost three delays whether they succeed or fail. Failed calls
/// are never retried.
pub struct PacedClient {
    client: reqwest::Client,
    delay: Duration,
    contact_email: Option<String>,
    sent: AtomicU64,
}

impl PacedClient {
    pub fn new(
        delay: Duration,
        timeout: Duration,
        user_agent: &str,
        contact_email: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            delay,
            contact_email: contact_email.filter(|e| !e.trim().is_empty()),
            sent: AtomicU64::new(0),
        })
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.contact_email.as_deref()
    }

    /// Number of requests sent so far.
    pub fn requests_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Adds `mailto=<contact>` when a contact address is configured.
    pub fn polite(&self, mut url: Url) -> Url {
        if let Some(email) = &self.contact_email {
            url.query_pairs_mut().append_pair("mailto", email);
        }
        url
    }

    /// GET `url` (with the polite parameter) and decode the JSON body.
    ///
    /// 404 maps to [`ScienceError::NotFound`], other non-success statuses to
    /// [`ScienceError::ApiError`].
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let url = self.polite(url);
        let outcome = self.fetch_text(&url).await;
        self.pace().await;
        let text = outcome?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }

    async fn fetch_text(&self, url: &Url) -> Result<String> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%url, "GET");
        let resp = self.client.get(url.clone()).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(ScienceError::NotFound(url.path().to_string())),
            status if !status.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                Err(ScienceError::ApiError(
                    url.path().to_string(),
                    format!("HTTP {}: {body}", status.as_u16()),
                ))
            }
            _ => Ok(resp.text().await?),
        }
    }

    async fn pace(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}
