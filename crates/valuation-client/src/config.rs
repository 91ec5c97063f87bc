use std::time::Duration;

/// Connection settings for the valuation REST backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("VALUATION_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api".to_string()),
            timeout: Duration::from_secs(
                std::env::var("VALUATION_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }
}
