//! Infrastructure Layer
//!
//! Cross-cutting concerns and infrastructure components.

pub mod first_success;
pub mod ip_detection;
pub mod renewal;
pub mod response_cache;
pub mod shutdown;

pub use first_success::first_success;
pub use ip_detection::ConcurrentIpDetector;
pub use renewal::{RenewalScheduler, SchedulerState};
pub use response_cache::open_response_cache;
pub use shutdown::{shutdown_signal, ShutdownController};
