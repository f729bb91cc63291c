use anyhow::{Context, Result};
use log::info;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use std::time::Duration;

use crate::cache::Cache;
use crate::model::TravelMode;

pub mod overpass;

use overpass::{build_query, GeocodeHit, OverpassResponse};

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Downloader for a place's street network from the public OSM services
pub struct Downloader {
    cache: Cache,
    client: Client,
}

impl Downloader {
    /// Create a new downloader with the given cache
    pub fn new(cache: Cache) -> Result<Self> {
        // Nominatim rejects requests without a user agent
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { cache, client })
    }

    /// Download the ways of `mode` inside `place` along with their nodes
    pub fn download(&self, place: &str, mode: TravelMode) -> Result<OverpassResponse> {
        let hit = self.geocode(place)?;
        info!("Resolved '{}' to {} {} ({})", place, hit.osm_type, hit.osm_id, hit.display_name);

        let area = hit.search_area()
            .context("Geocoder returned an invalid bounding box")?;
        let query = build_query(&area, mode);

        info!("Downloading '{}' network for '{}'", mode, place);
        let request = self.client
            .post(OVERPASS_URL)
            .header("Content-Type", "text/plain")
            .body(query.clone());
        let data = self.fetch(request, &format!("{}\n{}", OVERPASS_URL, query))?;

        let response: OverpassResponse = serde_json::from_slice(&data)
            .context("Failed to parse Overpass response")?;
        info!("Downloaded {} OSM elements", response.elements.len());

        Ok(response)
    }

    /// Resolve a place name to an OSM object with Nominatim
    fn geocode(&self, place: &str) -> Result<GeocodeHit> {
        let url = Url::parse_with_params(
            NOMINATIM_URL,
            &[("q", place), ("format", "json"), ("limit", "1")],
        )?;

        let data = self.fetch(self.client.get(url.clone()), url.as_str())?;
        let hits: Vec<GeocodeHit> = serde_json::from_slice(&data)
            .context("Failed to parse geocoder response")?;

        hits.into_iter()
            .next()
            .with_context(|| format!("Place '{}' not found by the geocoder", place))
    }

    /// Send a request unless its response is already cached
    fn fetch(&self, request: RequestBuilder, cache_key: &str) -> Result<Vec<u8>> {
        if let Some(data) = self.cache.get(cache_key) {
            info!("Using cached response ({} bytes)", data.len());
            return Ok(data);
        }

        // Overpass can take several minutes for a whole municipality
        let response = request
            .timeout(Duration::from_secs(600))
            .send()
            .context("Failed to send request")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download: HTTP {}", response.status());
        }
        let data = response.bytes()
            .context("Failed to read response bytes")?;

        let cache_path = self.cache.save(cache_key, &data)
            .context("Failed to save to cache")?;
        info!("Cached response at {}", cache_path.display());

        Ok(data.to_vec())
    }
}
