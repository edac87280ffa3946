pub mod enricher;
pub mod geocoder;
pub mod speed_limit;

pub use enricher::Enricher;
pub use geocoder::NominatimGeocoder;
pub use speed_limit::OverpassSpeedLimits;

use std::time::Duration;

/// Shared HTTP client for the enrichment services, bounded by `timeout`
pub fn http_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {}", e))
}
