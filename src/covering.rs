//! Region coverings over the S2 cell hierarchy.
//!
//! A covering turns a search circle (or a bounding box) into a small set of
//! cell tokens that remote document stores are keyed by. Coverings are
//! deterministic: the same region and limits always yield the same cells in
//! the same order.

use crate::compute::spatial::{EARTH_RADIUS_KM, haversine_km, km_to_radians};
use crate::config::CoveringConfig;
use flora_types::bbox::BoundingBox;
use flora_types::point::GeoPoint;
use s2::cap::Cap;
use s2::cellid::CellID;
use s2::latlng::LatLng;
use s2::point::Point;
use s2::region::RegionCoverer as S2Coverer;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Deepest level of the S2 hierarchy.
pub const MAX_CELL_LEVEL: u8 = 30;

/// Level of the fixed coarse covering kept next to the adaptive one.
pub const COARSE_LEVEL: u8 = 7;

/// One cell of a covering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoveringCell {
    /// Opaque token remote stores are keyed by
    pub token: String,
    pub level: u8,
    id: u64,
}

impl CoveringCell {
    fn from_cell_id(cell: CellID) -> Self {
        Self {
            token: cell.to_token(),
            level: cell.level() as u8,
            id: cell.0,
        }
    }

    pub fn cell_id(&self) -> CellID {
        CellID(self.id)
    }

    /// Whether the cell contains `point`.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        leaf_cell(point).parent(self.level as u64) == self.cell_id()
    }

    /// Average area of cells at this level, in square kilometers.
    pub fn approx_area_km2(&self) -> f64 {
        average_cell_area_km2(self.level)
    }
}

/// An ordered set of cells whose union contains a region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Covering {
    cells: Vec<CoveringCell>,
}

impl Covering {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[CoveringCell] {
        &self.cells
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoveringCell> {
        self.cells.iter()
    }

    pub fn tokens(&self) -> Vec<&str> {
        self.cells.iter().map(|c| c.token.as_str()).collect()
    }

    pub fn max_level(&self) -> Option<u8> {
        self.cells.iter().map(|c| c.level).max()
    }

    /// Whether any cell of the covering contains `point`.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if self.cells.is_empty() || !point.is_valid() {
            return false;
        }
        let leaf = leaf_cell(point);
        self.cells
            .iter()
            .any(|c| leaf.parent(c.level as u64) == c.cell_id())
    }

    /// Approximate area of the union, in square kilometers.
    pub fn approx_area_km2(&self) -> f64 {
        self.cells.iter().map(CoveringCell::approx_area_km2).sum()
    }
}

impl<'a> IntoIterator for &'a Covering {
    type Item = &'a CoveringCell;
    type IntoIter = std::slice::Iter<'a, CoveringCell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

/// Converts search regions into coverings.
///
/// # Examples
///
/// ```rust
/// use flora_geoindex::covering::RegionCoverer;
/// use flora_geoindex::{CoveringConfig, GeoPoint};
///
/// let coverer = RegionCoverer::new(CoveringConfig::default());
/// let covering = coverer.cover_radius(&GeoPoint::new(35.538851, -82.7054901), 20.0);
/// assert!(!covering.is_empty());
/// assert!(covering.len() <= 15);
///
/// // The null point means "no location yet".
/// assert!(coverer.cover_radius(&GeoPoint::new(0.0, 0.0), 20.0).is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct RegionCoverer {
    config: CoveringConfig,
    fixed_level: bool,
}

impl RegionCoverer {
    pub fn new(config: CoveringConfig) -> Self {
        Self {
            config,
            fixed_level: false,
        }
    }

    /// A coverer that only emits cells of `level`.
    ///
    /// The cell limit is a hint here; a fixed level may need more cells.
    pub fn at_level(level: u8) -> Self {
        let level = level.min(MAX_CELL_LEVEL);
        Self {
            config: CoveringConfig {
                max_cells: 1024,
                min_level: level,
                max_level: level,
                level_mod: 1,
            },
            fixed_level: true,
        }
    }

    pub fn config(&self) -> &CoveringConfig {
        &self.config
    }

    /// Cover the circle of `radius_km` around `center`.
    ///
    /// Zero, negative or non-finite radii, invalid centers and the null
    /// point produce an empty covering.
    pub fn cover_radius(&self, center: &GeoPoint, radius_km: f64) -> Covering {
        if !center.is_valid() || center.is_null_island() {
            return Covering::empty();
        }
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Covering::empty();
        }
        let cap = cap_around(center, radius_km);
        self.cover_cap(&cap)
    }

    /// Cover a bounding box through its circumscribing circle.
    pub fn cover_bbox(&self, bbox: &BoundingBox) -> Covering {
        if !bbox.is_valid() {
            return Covering::empty();
        }
        let center = bbox.center();
        let radius_km = bbox
            .corners()
            .iter()
            .map(|corner| haversine_km(&center, corner))
            .fold(0.0, f64::max);
        self.cover_radius(&center, radius_km)
    }

    fn cover_cap(&self, cap: &Cap) -> Covering {
        let coverer = S2Coverer {
            min_level: self.config.min_level,
            max_level: self.config.max_level.min(MAX_CELL_LEVEL),
            level_mod: self.config.level_mod.max(1),
            max_cells: self.config.max_cells,
        };
        let mut cells = coverer.covering(cap).0;
        normalize(&mut cells);
        if !self.fixed_level {
            coarsen(&mut cells, self.config.max_cells);
        }
        log::trace!(
            "covered cap with {} cells (limit {})",
            cells.len(),
            self.config.max_cells
        );
        Covering {
            cells: cells.into_iter().map(CoveringCell::from_cell_id).collect(),
        }
    }
}

impl Default for RegionCoverer {
    fn default() -> Self {
        Self::new(CoveringConfig::default())
    }
}

/// The leaf cell containing `point`.
pub fn leaf_cell(point: &GeoPoint) -> CellID {
    let ll = LatLng::from_degrees(point.lat, point.lng);
    CellID::from(Point::from(&ll))
}

/// Token of the leaf cell containing `point`.
pub fn leaf_token(point: &GeoPoint) -> String {
    leaf_cell(point).to_token()
}

/// Average area of an S2 cell at `level`, in square kilometers.
pub fn average_cell_area_km2(level: u8) -> f64 {
    let steradians = 4.0 * PI / (6.0 * 4f64.powi(level as i32));
    steradians * EARTH_RADIUS_KM * EARTH_RADIUS_KM
}

fn cap_around(center: &GeoPoint, radius_km: f64) -> Cap {
    let ll = LatLng::from_degrees(center.lat, center.lng);
    let axis = Point::from(&ll);
    let angle = km_to_radians(radius_km).min(PI);
    // Cap height is 1 - cos(angle) on the unit sphere.
    Cap::from_center_height(&axis, 1.0 - angle.cos())
}

fn contains_cell(outer: CellID, inner: CellID) -> bool {
    outer.level() <= inner.level() && inner.parent(outer.level()) == outer
}

/// Sort by cell id and drop cells already contained by another cell.
fn normalize(cells: &mut Vec<CellID>) {
    cells.sort_by_key(|c| c.0);
    cells.dedup();
    let snapshot = cells.clone();
    cells.retain(|cell| {
        !snapshot
            .iter()
            .any(|other| other != cell && contains_cell(*other, *cell))
    });
}

/// Replace the finest cells with their parents until at most `max_cells`
/// remain.
fn coarsen(cells: &mut Vec<CellID>, max_cells: usize) {
    while cells.len() > max_cells {
        let Some(finest) = cells.iter().map(|c| c.level()).max() else {
            return;
        };
        if finest == 0 {
            return;
        }
        for cell in cells.iter_mut() {
            if cell.level() == finest {
                *cell = cell.parent(finest - 1);
            }
        }
        normalize(cells);
    }
}
