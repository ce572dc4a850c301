//! # flora-types
//!
//! Core geographic and temporal data types shared by the flora geoindex.
//!
//! - **Point types**: `GeoPoint`
//! - **Bounding box types**: `BoundingBox`
//! - **Record types**: `Record`, `DateKey`, `PointKind`, `SubjectId`
//! - **Statistics**: `IngestStats`, `IndexStats`
//!
//! All types are serializable with Serde and convert to and from the `geo`
//! crate's primitives where that makes sense.
//!
//! ## Examples
//!
//! ```rust
//! use flora_types::bbox::BoundingBox;
//! use flora_types::point::GeoPoint;
//!
//! let asheville = GeoPoint::new(35.538851, -82.7054901);
//! let region = BoundingBox::new(-83.0, 35.0, -82.0, 36.0);
//! assert!(region.contains_point(&asheville));
//! ```

pub mod bbox;
pub mod point;
pub mod record;
pub mod stats;
