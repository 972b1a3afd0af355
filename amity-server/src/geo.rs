//! ZIP code to city/region lookup
//!
//! Profiles store the ZIP code and fill city and region from a public
//! lookup service. The trait lets tests and offline setups swap in a
//! static table.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::ZipCode;

/// Place a ZIP code belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipInfo {
    pub zip: String,
    pub city: String,
    /// State abbreviation, e.g. "CA"
    pub region: String,
}

/// Geo lookup error type
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("unknown zip code: {0}")]
    NotFound(String),

    #[error("zip lookup failed: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait ZipLookup: Send + Sync {
    async fn lookup(&self, zip: &ZipCode) -> Result<ZipInfo, GeoError>;
}

/// Zippopotam-style JSON response
#[derive(Debug, Deserialize)]
struct ZipResponse {
    #[serde(rename = "post code")]
    post_code: String,
    places: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(rename = "place name")]
    place_name: String,
    #[serde(rename = "state abbreviation")]
    state_abbreviation: String,
}

fn parse_response(zip: &ZipCode, body: &str) -> Result<ZipInfo, GeoError> {
    let response: ZipResponse =
        serde_json::from_str(body).map_err(|e| GeoError::Upstream(format!("bad response: {e}")))?;

    let place = response
        .places
        .into_iter()
        .next()
        .ok_or_else(|| GeoError::NotFound(zip.as_str().to_owned()))?;

    Ok(ZipInfo {
        zip: response.post_code,
        city: place.place_name,
        region: place.state_abbreviation,
    })
}

/// Lookup over HTTP against `<base_url>/<zip>`
#[derive(Debug, Clone)]
pub struct HttpZipLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpZipLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("amity/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeoError::Upstream(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl ZipLookup for HttpZipLookup {
    async fn lookup(&self, zip: &ZipCode) -> Result<ZipInfo, GeoError> {
        let url = format!("{}/{}", self.base_url, zip.as_str());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeoError::Upstream(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GeoError::NotFound(zip.as_str().to_owned()));
        }
        if !response.status().is_success() {
            return Err(GeoError::Upstream(format!("status {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeoError::Upstream(e.to_string()))?;
        parse_response(zip, &body)
    }
}

/// Fixed table, for tests and offline use
#[derive(Debug, Clone, Default)]
pub struct StaticZipLookup {
    places: HashMap<String, (String, String)>,
}

impl StaticZipLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, zip: &str, city: &str, region: &str) -> Self {
        self.places
            .insert(zip.to_owned(), (city.to_owned(), region.to_owned()));
        self
    }
}

#[async_trait]
impl ZipLookup for StaticZipLookup {
    async fn lookup(&self, zip: &ZipCode) -> Result<ZipInfo, GeoError> {
        self.places
            .get(zip.as_str())
            .map(|(city, region)| ZipInfo {
                zip: zip.as_str().to_owned(),
                city: city.clone(),
                region: region.clone(),
            })
            .ok_or_else(|| GeoError::NotFound(zip.as_str().to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zippopotam_body() {
        let body = r#"{
            "post code": "90210",
            "country": "United States",
            "country abbreviation": "US",
            "places": [{
                "place name": "Beverly Hills",
                "longitude": "-118.4065",
                "state": "California",
                "state abbreviation": "CA",
                "latitude": "34.0901"
            }]
        }"#;
        let zip = ZipCode::new("90210").unwrap();
        let info = parse_response(&zip, body).unwrap();
        assert_eq!(info.city, "Beverly Hills");
        assert_eq!(info.region, "CA");
        assert_eq!(info.zip, "90210");
    }

    #[test]
    fn empty_places_is_not_found() {
        let zip = ZipCode::new("00000").unwrap();
        let err = parse_response(&zip, r#"{"post code": "00000", "places": []}"#).unwrap_err();
        assert!(matches!(err, GeoError::NotFound(_)));
    }

    #[test]
    fn garbage_is_upstream_error() {
        let zip = ZipCode::new("12345").unwrap();
        assert!(matches!(parse_response(&zip, "<html>").unwrap_err(), GeoError::Upstream(_)));
    }

    #[tokio::test]
    async fn static_lookup() {
        let lookup = StaticZipLookup::new().with("02139", "Cambridge", "MA");
        let info = lookup.lookup(&ZipCode::new("02139-4307").unwrap()).await.unwrap();
        assert_eq!(info.city, "Cambridge");
        assert!(lookup.lookup(&ZipCode::new("10001").unwrap()).await.is_err());
    }
}
