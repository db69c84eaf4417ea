//! HTTP client utilities.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::models::FetchRequest;
use crate::sources::SourceError;

/// Default user agent sent to every provider
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by one adapter.
///
/// reqwest fixes the connect timeout per `Client`, so one client is kept per
/// distinct connect timeout. The read timeout is applied per request. An
/// optional token bucket paces attempts on the client side.
#[derive(Debug, Clone)]
pub struct HttpClient {
    user_agent: String,
    clients: Arc<Mutex<HashMap<Duration, Client>>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl HttpClient {
    /// Create a client with the default user agent and throttle
    pub fn new() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            clients: Arc::new(Mutex::new(HashMap::new())),
            limiter: Some(Arc::new(RateLimiter::direct(Quota::per_second(nonzero!(5u32))))),
        }
    }

    /// Create a client with a custom user agent
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Self::new()
        }
    }

    /// Set the client-side throttle; 0 disables it
    pub fn requests_per_second(mut self, rps: u32) -> Self {
        self.limiter = NonZeroU32::new(rps)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));
        self
    }

    /// The user agent sent with every request
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn client_for(&self, connect_timeout: Duration) -> Result<Client, SourceError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&connect_timeout) {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;
        clients.insert(connect_timeout, client.clone());
        Ok(client)
    }

    /// Perform one GET attempt and return the body.
    ///
    /// Non-success statuses are classified with [`SourceError::from_status`].
    pub async fn get_text(&self, url: &str, request: &FetchRequest) -> Result<String, SourceError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let client = self.client_for(request.connect_timeout)?;
        let response = client
            .get(url)
            .timeout(request.read_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url, status = status.as_u16(), "Provider returned error status");
            return Err(SourceError::from_status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
