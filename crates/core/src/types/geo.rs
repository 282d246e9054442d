//! Geographic coordinates.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres, as used by `PostgreSQL`'s `earthdistance`.
pub const EARTH_RADIUS_METERS: f64 = 6_378_168.0;

/// Errors that can occur when building a [`GeoPoint`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    /// Longitude is outside [-180, 180] or not a number.
    #[error("longitude must be between -180 and 180 (got {0})")]
    Longitude(f64),
    /// Latitude is outside [-90, 90] or not a number.
    #[error("latitude must be between -90 and 90 (got {0})")]
    Latitude(f64),
}

/// A WGS84 point, longitude first to match the order stores are entered in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    lng: f64,
    lat: f64,
}

impl GeoPoint {
    /// Create a validated point.
    ///
    /// # Errors
    ///
    /// Returns `GeoError` if either coordinate is out of range or NaN.
    pub fn new(lng: f64, lat: f64) -> Result<Self, GeoError> {
        if !(-180.0..=180.0).contains(&lng) {
            return Err(GeoError::Longitude(lng));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::Latitude(lat));
        }
        Ok(Self { lng, lat })
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.lng
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    /// Great-circle distance to `other` in metres (haversine).
    #[must_use]
    pub fn distance_meters(&self, other: &Self) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}
