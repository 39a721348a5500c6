mod api_server;

pub use api_server::{router, ApiServer, ApiState, BuildInfo, X_CACHE};

// Re-export for external use (e.g., integration tests)
#[allow(unused_imports)]
pub use api_server::{DatabaseStatus, HealthResponse, VersionResponse, VersionTime};
