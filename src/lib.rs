//! Spatio-temporal point index and ranked query engine for species forecast
//! maps.
//!
//! Subject datasets are parsed into dated records, indexed per date key as
//! zoom-level clusters or an R*-tree, and queried by viewport or radius.
//! Search areas are turned into S2 cell coverings for remote ranked
//! queries, and per-tick aggregates feed a normalized timeline.
//!
//! ```rust
//! use flora_geoindex::covering::RegionCoverer;
//! use flora_geoindex::viewport::{self, Viewport};
//! use flora_geoindex::GeoPoint;
//!
//! let center = GeoPoint::new(35.538851, -82.7054901);
//! let bounds = viewport::compute(&center, 9, Viewport::new(800, 600), 256);
//! assert!(bounds.is_ready());
//!
//! let covering = RegionCoverer::default().cover_radius(&center, bounds.radius_km);
//! assert!(!covering.is_empty() && covering.len() <= 15);
//! ```

pub mod calendar;
pub mod compute;
pub mod config;
pub mod controller;
pub mod covering;
pub mod error;
pub mod index;
pub mod ingest;
pub mod query;
pub mod ranked;
pub mod session;
pub mod timeline;
pub mod viewport;

pub use config::{
    ClusterConfig, Config, CoveringConfig, IndexStrategy, IngestConfig, RankingConfig,
    StrategyConfig, TimelineConfig, ViewportConfig,
};
pub use error::{BoxError, GeoIndexError, Result};

pub use flora_types::bbox::BoundingBox;
pub use flora_types::point::GeoPoint;
pub use flora_types::record::{DateKey, DatePrecision, PointKind, Record, SubjectId};
pub use flora_types::stats::{IndexStats, IngestStats};

pub use covering::{Covering, CoveringCell, RegionCoverer};
pub use index::{IndexStore, PointIndexBuilder, SubjectIndex};
pub use ingest::{DatasetSource, IngestReport, RecordParser, parse_records};
pub use query::{Aggregate, MapFeature, PointQueryEngine, QueryGeometry};
pub use ranked::{DocumentStore, RankOutcome, RankedAggregator, RankedCandidate};
pub use session::{Session, SessionBuilder};
pub use timeline::{TimeBucket, TimelineBucketer};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoIndexError, Result, Session, SessionBuilder};

    pub use crate::{BoundingBox, DateKey, GeoPoint, PointKind, Record, SubjectId};

    pub use crate::{Config, CoveringConfig, RankingConfig};

    pub use crate::calendar::{Clock, FixedClock, SystemClock};

    pub use crate::viewport::Viewport;

    pub use crate::{DatasetSource, DocumentStore};
}
