//! HTTP IP Detector
//!
//! Implements IpDetector against "what is my IP" services that answer a
//! plain GET with the caller's address as the body.

use crate::domain::errors::DetectError;
use crate::domain::ports::IpDetector;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Well-known plain-text address echo services.
pub const DEFAULT_DETECTOR_URLS: [&str; 2] = ["https://api.ipify.org", "https://icanhazip.com"];

pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpIpDetector {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpIpDetector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    fn request_error(&self, reason: impl ToString) -> DetectError {
        DetectError::Request {
            url: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl IpDetector for HttpIpDetector {
    fn name(&self) -> &str {
        &self.url
    }

    async fn detect(&self) -> Result<IpAddr, DetectError> {
        tracing::debug!("detecting external IP via {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.request_error(format!("unexpected status {}", status)));
        }

        let body = response.text().await.map_err(|e| self.request_error(e))?;
        body.trim()
            .parse::<IpAddr>()
            .map_err(|_| DetectError::InvalidAddress {
                url: self.url.clone(),
                body: body.trim().to_string(),
            })
    }
}
