use anyhow::{Result, anyhow};
use std::time::Duration;

/// Checker trait for the network side of a probe
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Reach `target` and return the HTTP status code it answered with.
    ///
    /// Any answer counts as `Ok`, whatever its status; `Err` means no
    /// response arrived.
    async fn check(&self, target: &str) -> Result<u16>;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> Result<u16> {
        let response = self.client.get(target).send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow!("Timeout")
            } else if e.is_connect() {
                anyhow!("Connection failed: {}", e)
            } else {
                anyhow!("HTTP request failed: {}", e)
            }
        })?;

        Ok(response.status().as_u16())
    }
}
