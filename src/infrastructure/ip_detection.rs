//! Concurrent external address detection
//!
//! Asks several detectors at once and keeps the first answer.

use crate::domain::errors::DetectError;
use crate::domain::ports::IpDetector;
use crate::infrastructure::first_success::first_success;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;

pub struct ConcurrentIpDetector {
    detectors: Vec<Arc<dyn IpDetector>>,
}

impl ConcurrentIpDetector {
    pub fn new(detectors: Vec<Arc<dyn IpDetector>>) -> Self {
        Self { detectors }
    }
}

#[async_trait]
impl IpDetector for ConcurrentIpDetector {
    fn name(&self) -> &str {
        "concurrent"
    }

    async fn detect(&self) -> Result<IpAddr, DetectError> {
        let lookups = self.detectors.iter().map(|detector| {
            let detector = detector.clone();
            async move { detector.detect().await }
        });

        match first_success(lookups).await {
            Ok((index, ip)) => {
                tracing::info!("external IP {} detected by {}", ip, self.detectors[index].name());
                Ok(ip)
            }
            Err(failures) => {
                for e in &failures {
                    tracing::warn!("external IP detection failed: {}", e);
                }
                Err(DetectError::NoneDetected(self.detectors.len()))
            }
        }
    }
}
