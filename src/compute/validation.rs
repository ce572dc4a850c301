//! Validation for geographic coordinates and attribute values.

use crate::error::{GeoIndexError, Result};
use flora_types::point::GeoPoint;

/// Validates a point has valid latitude and longitude.
///
/// Latitude: [-90.0, 90.0], Longitude: [-180.0, 180.0]
///
/// # Examples
///
/// ```
/// use flora_geoindex::compute::validation::validate_geographic_point;
/// use flora_geoindex::GeoPoint;
///
/// let asheville = GeoPoint::new(35.538851, -82.7054901);
/// assert!(validate_geographic_point(&asheville).is_ok());
///
/// // Invalid latitude
/// let invalid = GeoPoint::new(95.0, -74.0);
/// assert!(validate_geographic_point(&invalid).is_err());
/// ```
pub fn validate_geographic_point(point: &GeoPoint) -> Result<()> {
    let (lat, lng) = (point.lat, point.lng);

    if !lat.is_finite() {
        return Err(GeoIndexError::InvalidInput(format!(
            "Latitude must be finite, got: {}",
            lat
        )));
    }

    if !lng.is_finite() {
        return Err(GeoIndexError::InvalidInput(format!(
            "Longitude must be finite, got: {}",
            lng
        )));
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(GeoIndexError::InvalidInput(format!(
            "Latitude out of range [-90.0, 90.0]: {}",
            lat
        )));
    }

    if !(-180.0..=180.0).contains(&lng) {
        return Err(GeoIndexError::InvalidInput(format!(
            "Longitude out of range [-180.0, 180.0]: {}",
            lng
        )));
    }

    Ok(())
}

/// Validates a search radius in kilometers.
pub fn validate_radius_km(radius_km: f64) -> Result<()> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(GeoIndexError::InvalidInput(format!(
            "Radius must be a non-negative number of kilometers, got: {}",
            radius_km
        )));
    }
    Ok(())
}

/// Validates a probability attribute lies in [0.0, 1.0].
pub fn validate_probability(value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(GeoIndexError::InvalidInput(format!(
            "Probability out of range [0.0, 1.0]: {}",
            value
        )));
    }
    Ok(())
}
