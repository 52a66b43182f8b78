// src/geocode/mapbox.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

use super::{Coordinate, Geocode, GeocodeMiss, GeocodeRequest, Geocoder};
use crate::config::{GeocodeSettings, Region};

#[derive(Debug, Error)]
pub enum GeocoderError {
    #[error("invalid geocoder base URL {url:?}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("geocoder base URL {0} cannot take a path")]
    NotABase(Url),
    #[error("building geocoder HTTP client")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    /// `[lng, lat]`
    center: [f64; 2],
}

/// Forward geocoding against the Mapbox places endpoint.
pub struct MapboxGeocoder {
    client: Client,
    access_token: Option<String>,
    base_url: Url,
    region: Region,
}

impl MapboxGeocoder {
    pub fn new(settings: &GeocodeSettings) -> Result<Self, GeocoderError> {
        let base_url = Url::parse(&settings.base_url).map_err(|source| GeocoderError::BaseUrl {
            url: settings.base_url.clone(),
            source,
        })?;
        if base_url.cannot_be_a_base() {
            return Err(GeocoderError::NotABase(base_url));
        }
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(GeocoderError::Client)?;

        Ok(Self {
            client,
            access_token: settings.access_token.clone(),
            base_url,
            region: settings.region.clone(),
        })
    }

    pub fn has_credential(&self) -> bool {
        self.access_token.is_some()
    }

    fn request_url(&self, query: &str, token: &str) -> Url {
        let leaf = format!("{}.json", query);
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["geocoding", "v5", "mapbox.places", leaf.as_str()]);
        }
        let (lng, lat) = self.region.proximity;
        url.query_pairs_mut()
            .append_pair("access_token", token)
            .append_pair("country", &self.region.country_code)
            .append_pair("proximity", &format!("{},{}", lng, lat))
            .append_pair("limit", "1");
        url
    }

    async fn lookup(&self, query: &str, token: &str) -> Geocode {
        let url = self.request_url(query, token);
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return Geocode::Miss(GeocodeMiss::Transport(e.to_string())),
        };
        let status = resp.status();
        if !status.is_success() {
            return Geocode::Miss(GeocodeMiss::Status(status.as_u16()));
        }
        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(e) => return Geocode::Miss(GeocodeMiss::Transport(e.to_string())),
        };
        parse_response(&body)
    }
}

/// First feature's centre, or the reason there isn't one.
fn parse_response(body: &[u8]) -> Geocode {
    match serde_json::from_slice::<FeatureCollection>(body) {
        Ok(collection) => match collection.features.first() {
            Some(Feature { center: [lng, lat] }) => Geocode::Hit(Coordinate {
                lat: *lat,
                lng: *lng,
            }),
            None => Geocode::Miss(GeocodeMiss::NoResults),
        },
        Err(e) => Geocode::Miss(GeocodeMiss::Malformed(e.to_string())),
    }
}

#[async_trait]
impl Geocoder for MapboxGeocoder {
    async fn geocode(&self, request: &GeocodeRequest) -> Geocode {
        let Some(token) = self.access_token.as_deref() else {
            return Geocode::Miss(GeocodeMiss::NoCredential);
        };
        let query = request.query_text(&self.region);
        let outcome = self.lookup(&query, token).await;
        match &outcome {
            Geocode::Hit(c) => {
                trace!(row = request.origin_row, lat = c.lat, lng = c.lng, "geocoded")
            }
            Geocode::Miss(reason) => {
                debug!(row = request.origin_row, query = %query, %reason, "geocode miss")
            }
        }
        outcome
    }
}
