/// Posted speed limit lookup against an Overpass API endpoint
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use crate::models::SpeedLimit;

// Radius in metres around the fix searched for tagged ways
const SEARCH_RADIUS_M: u32 = 30;

#[async_trait]
pub trait SpeedLimitSource: Send + Sync {
    /// `Ok(None)` when no nearby way carries a `maxspeed` tag
    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<Option<SpeedLimit>, String>;
}

#[derive(Debug, Default, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Default, Deserialize)]
struct Element {
    #[serde(default)]
    tags: HashMap<String, String>,
}

pub struct OverpassSpeedLimits {
    client: reqwest::Client,
    base_url: Url,
}

impl OverpassSpeedLimits {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, String> {
        let base_url = Url::parse(base_url)
            .map_err(|e| format!("Invalid speed limit URL '{}': {}", base_url, e))?;
        Ok(Self { client, base_url })
    }

    fn request_url(&self, latitude: f64, longitude: f64) -> Url {
        let query = format!(
            "[out:json];way[maxspeed](around:{},{},{});out;",
            SEARCH_RADIUS_M, latitude, longitude
        );
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("data", &query);
        url
    }
}

#[async_trait]
impl SpeedLimitSource for OverpassSpeedLimits {
    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<Option<SpeedLimit>, String> {
        let url = self.request_url(latitude, longitude);
        debug!("Speed limit query {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Speed limit request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Speed limit service returned HTTP {}", response.status()));
        }

        let body: OverpassResponse = response
            .json()
            .await
            .map_err(|e| format!("Speed limit response was not valid JSON: {}", e))?;

        Ok(first_speed_limit(&body))
    }
}

fn first_speed_limit(body: &OverpassResponse) -> Option<SpeedLimit> {
    body.elements
        .iter()
        .filter_map(|element| element.tags.get("maxspeed"))
        .map(|tag| SpeedLimit::from_tag(tag))
        .find(|limit| *limit != SpeedLimit::Unknown)
}
