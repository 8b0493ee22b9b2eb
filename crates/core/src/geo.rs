//! Coordinates, radii and the micro-degree representation.
//!
//! The same rounding rule (`round(degrees * 1_000_000)`, half away from zero)
//! feeds both the private witness and the public inputs. Any other rounding
//! on one side only would make honest proofs fail verification.

use serde::{Deserialize, Serialize};

use crate::geocell::GeoError;

/// Smallest accepted geofence radius in meters
pub const MIN_RADIUS_METERS: u32 = 10;

/// Largest accepted geofence radius in meters
pub const MAX_RADIUS_METERS: u32 = 500;

/// Micro-degrees per degree
pub const MICRO_DEGREES: f64 = 1_000_000.0;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic coordinates (latitude, longitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl GeoCoordinate {
    /// Create a new geographic coordinate
    ///
    /// # Returns
    /// * `Ok(GeoCoordinate)` - Valid coordinate
    /// * `Err(GeoError)` - Non-finite or out of range
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Calculate haversine distance to another coordinate in meters
    pub fn haversine_distance(&self, other: &GeoCoordinate) -> f64 {
        let lat1_rad = self.latitude.to_radians();
        let lat2_rad = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);

        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    /// Point reached by moving `meters` from this coordinate along `bearing_deg`
    /// (clockwise from north).
    pub fn offset(&self, meters: f64, bearing_deg: f64) -> GeoCoordinate {
        let angular = meters / EARTH_RADIUS_M;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        GeoCoordinate {
            latitude: lat2.to_degrees(),
            longitude: lon2.to_degrees(),
        }
    }

    /// Micro-degree latitude
    pub fn scaled_latitude(&self) -> ScaledCoordinate {
        ScaledCoordinate::from_degrees(self.latitude)
    }

    /// Micro-degree longitude
    pub fn scaled_longitude(&self) -> ScaledCoordinate {
        ScaledCoordinate::from_degrees(self.longitude)
    }
}

/// Integer micro-degree value, `round(degrees * 1_000_000)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScaledCoordinate(pub i64);

impl ScaledCoordinate {
    pub fn from_degrees(degrees: f64) -> Self {
        Self((degrees * MICRO_DEGREES).round() as i64)
    }

    pub fn to_degrees(self) -> f64 {
        self.0 as f64 / MICRO_DEGREES
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

/// Geofence radius in whole meters, within [`MIN_RADIUS_METERS`, `MAX_RADIUS_METERS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Radius(u32);

impl Radius {
    pub fn new(meters: u32) -> Result<Self, GeoError> {
        if !(MIN_RADIUS_METERS..=MAX_RADIUS_METERS).contains(&meters) {
            return Err(GeoError::InvalidRadius(meters as i64));
        }
        Ok(Self(meters))
    }

    pub fn meters(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Radius {
    type Error = GeoError;

    fn try_from(meters: u32) -> Result<Self, Self::Error> {
        Radius::new(meters)
    }
}

impl From<Radius> for u32 {
    fn from(radius: Radius) -> Self {
        radius.0
    }
}
