//! Coordinate validation and great-circle helpers shared by the covering,
//! viewport, index and ranking layers.

pub mod spatial;
pub mod validation;
