// src/geocode/mod.rs

use async_trait::async_trait;
use std::fmt;

use crate::config::Region;

pub mod mapbox;

pub use mapbox::{GeocoderError, MapboxGeocoder};

/// A resolved point. Zero is a real place, not "missing".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// Why a lookup produced no coordinate.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeMiss {
    /// No access token configured; no request was made.
    NoCredential,
    /// The service answered but had no candidate.
    NoResults,
    /// Not attempted because the geocoding deadline had passed.
    Skipped,
    Status(u16),
    Transport(String),
    Malformed(String),
}

impl fmt::Display for GeocodeMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeocodeMiss::NoCredential => write!(f, "no access token"),
            GeocodeMiss::NoResults => write!(f, "no results"),
            GeocodeMiss::Skipped => write!(f, "skipped after deadline"),
            GeocodeMiss::Status(code) => write!(f, "HTTP {}", code),
            GeocodeMiss::Transport(e) => write!(f, "transport: {}", e),
            GeocodeMiss::Malformed(e) => write!(f, "malformed response: {}", e),
        }
    }
}

/// Outcome of one lookup. A miss is an ordinary value, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Geocode {
    Hit(Coordinate),
    Miss(GeocodeMiss),
}

impl Geocode {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            Geocode::Hit(c) => Some(*c),
            Geocode::Miss(_) => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Geocode::Hit(_))
    }
}

/// One address to look up, tagged with the data row it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeRequest {
    pub address: String,
    pub postcode: Option<String>,
    pub origin_row: usize,
}

impl GeocodeRequest {
    /// `None` when the address is blank; a blank postcode is dropped.
    pub fn new(address: &str, postcode: Option<&str>, origin_row: usize) -> Option<Self> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }
        let postcode = postcode
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        Some(Self {
            address: address.to_string(),
            postcode,
            origin_row,
        })
    }

    /// Free-text query, always anchored with the city and country.
    pub fn query_text(&self, region: &Region) -> String {
        match &self.postcode {
            Some(postcode) => format!(
                "{}, {}, {}, {}",
                self.address, postcode, region.city, region.country
            ),
            None => format!("{}, {}, {}", self.address, region.city, region.country),
        }
    }
}

/// Address → coordinate lookup. Implementations never fail; every problem
/// comes back as `Geocode::Miss`.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, request: &GeocodeRequest) -> Geocode;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_address_is_not_geocodable() {
        assert!(GeocodeRequest::new("   ", Some("EH1 1AA"), 0).is_none());
    }

    #[test]
    fn query_includes_postcode_when_present() {
        let region = Region::default();
        let req = GeocodeRequest::new(" 1 High St ", Some("EH1 1AA"), 3).unwrap();
        assert_eq!(req.origin_row, 3);
        assert_eq!(req.query_text(&region), "1 High St, EH1 1AA, Edinburgh, UK");

        let req = GeocodeRequest::new("1 High St", Some("  "), 0).unwrap();
        assert_eq!(req.postcode, None);
        assert_eq!(req.query_text(&region), "1 High St, Edinburgh, UK");

        let req = GeocodeRequest::new("1 High St", None, 0).unwrap();
        assert_eq!(req.query_text(&region), "1 High St, Edinburgh, UK");
    }

    #[test]
    fn zero_is_a_hit_not_a_miss() {
        let origin = Geocode::Hit(Coordinate { lat: 0.0, lng: 0.0 });
        assert!(origin.is_hit());
        assert_eq!(origin.coordinate(), Some(Coordinate { lat: 0.0, lng: 0.0 }));
        assert_eq!(Geocode::Miss(GeocodeMiss::NoResults).coordinate(), None);
    }
}
