//! Reverse-geocoded location data and the contracts to the geocoding and
//! airport-lookup collaborators.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Country code used by the geocoder for international waters
pub const INTERNATIONAL_WATERS_CODE: &str = "XZ";

/// What kind of area a position falls in, as classified by the geocoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Land,
    /// Territorial waters of a country (12 nm)
    Territorial,
    /// Exclusive economic zone (200 nm)
    Eez,
    International,
}

impl Zone {
    /// Whether this zone is over water. Admin-1 changes over water are
    /// noise (maritime boundaries shift with the coastline data).
    pub fn is_water(&self) -> bool {
        !matches!(self, Zone::Land)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    /// ISO alpha-2 country code, or "XZ" for international waters
    pub country_code: String,
    pub country_name: String,
    /// First-level administrative division (state, province, region)
    pub admin1: String,
    pub city: String,
    pub zone: Zone,
}

impl LocationInfo {
    /// Display name for border narration: country name, with the "XZ"
    /// sentinel rendered as "International Waters"
    pub fn display_country(&self) -> &str {
        if self.country_code == INTERNATIONAL_WATERS_CODE {
            "International Waters"
        } else {
            &self.country_name
        }
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn get_location(&self, latitude: f64, longitude: f64) -> Result<LocationInfo>;
}

/// Airport proximity lookup, consumed by the briefing gate
#[async_trait]
pub trait AirportLocator: Send + Sync {
    /// Distance to the nearest known airport in kilometers, or `None` when
    /// nothing is within the search radius
    async fn distance_to_nearest_airport_km(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<f64>>;
}
