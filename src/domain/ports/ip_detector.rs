//! IP Detector Port
//!
//! Defines the interface for discovering this host's external address.

use crate::domain::errors::DetectError;
use async_trait::async_trait;
use std::net::IpAddr;

#[async_trait]
pub trait IpDetector: Send + Sync {
    /// Name used in logs (usually the service URL).
    fn name(&self) -> &str;

    async fn detect(&self) -> Result<IpAddr, DetectError>;
}
