//! Serializable configuration for coverings, viewport math, clustering,
//! ranking and the timeline.
//!
//! Every field has a default, so a partial JSON (or TOML, with the `toml`
//! feature) document only needs to name what it overrides.

use crate::error::{GeoIndexError, Result};
use flora_types::record::PointKind;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// # Example
///
/// ```rust
/// use flora_geoindex::Config;
///
/// let json = r#"{
///     "covering": { "max_cells": 20 },
///     "ranking": { "distance_weight": 1.0 }
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.covering.max_cells, 20);
/// assert_eq!(config.covering.max_level, 30);
/// assert_eq!(config.ranking.probability_weight, 50.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub covering: CoveringConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

/// Limits handed to the region coverer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoveringConfig {
    #[serde(default = "CoveringConfig::default_max_cells")]
    pub max_cells: usize,
    #[serde(default)]
    pub min_level: u8,
    #[serde(default = "CoveringConfig::default_max_level")]
    pub max_level: u8,
    #[serde(default = "CoveringConfig::default_level_mod")]
    pub level_mod: u8,
}

impl CoveringConfig {
    const fn default_max_cells() -> usize {
        15
    }

    const fn default_max_level() -> u8 {
        30
    }

    const fn default_level_mod() -> u8 {
        1
    }
}

impl Default for CoveringConfig {
    fn default() -> Self {
        Self {
            max_cells: Self::default_max_cells(),
            min_level: 0,
            max_level: Self::default_max_level(),
            level_mod: Self::default_level_mod(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportConfig {
    /// Pixel size of one map tile
    #[serde(default = "ViewportConfig::default_tile_size")]
    pub tile_size: u32,
    /// Lowest zoom a session accepts; smaller values are raised to it
    #[serde(default = "ViewportConfig::default_min_zoom")]
    pub min_zoom: u8,
    #[serde(default = "ViewportConfig::default_zoom")]
    pub default_zoom: u8,
}

impl ViewportConfig {
    const fn default_tile_size() -> u32 {
        256
    }

    const fn default_min_zoom() -> u8 {
        6
    }

    const fn default_zoom() -> u8 {
        9
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            tile_size: Self::default_tile_size(),
            min_zoom: Self::default_min_zoom(),
            default_zoom: Self::default_zoom(),
        }
    }
}

/// Parameters of the hierarchical cluster index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Tile extent the pixel radius is measured against
    #[serde(default = "ClusterConfig::default_extent")]
    pub extent: u32,
    #[serde(default = "ClusterConfig::default_min_zoom")]
    pub min_zoom: u8,
    #[serde(default = "ClusterConfig::default_max_zoom")]
    pub max_zoom: u8,
    /// Minimum number of points that form a cluster
    #[serde(default = "ClusterConfig::default_min_points")]
    pub min_points: usize,
    /// Cluster radius in pixels for prediction subjects
    #[serde(default = "ClusterConfig::default_prediction_radius")]
    pub prediction_radius: f64,
    /// Cluster radius in pixels for occurrence subjects
    #[serde(default = "ClusterConfig::default_occurrence_radius")]
    pub occurrence_radius: f64,
}

impl ClusterConfig {
    const fn default_extent() -> u32 {
        256
    }

    const fn default_min_zoom() -> u8 {
        6
    }

    const fn default_max_zoom() -> u8 {
        16
    }

    const fn default_min_points() -> usize {
        2
    }

    const fn default_prediction_radius() -> f64 {
        128.0
    }

    const fn default_occurrence_radius() -> f64 {
        1.0
    }

    pub fn radius_for(&self, kind: PointKind) -> f64 {
        match kind {
            PointKind::Occurrences => self.occurrence_radius,
            PointKind::Predictions => self.prediction_radius,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            extent: Self::default_extent(),
            min_zoom: Self::default_min_zoom(),
            max_zoom: Self::default_max_zoom(),
            min_points: Self::default_min_points(),
            prediction_radius: Self::default_prediction_radius(),
            occurrence_radius: Self::default_occurrence_radius(),
        }
    }
}

/// Weights of the composite ranking score.
///
/// `score = attribute * probability_weight + area * area_weight - distance * distance_weight`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "RankingConfig::default_probability_weight")]
    pub probability_weight: f64,
    #[serde(default = "RankingConfig::default_area_weight")]
    pub area_weight: f64,
    #[serde(default = "RankingConfig::default_distance_weight")]
    pub distance_weight: f64,
}

impl RankingConfig {
    const fn default_probability_weight() -> f64 {
        50.0
    }

    const fn default_area_weight() -> f64 {
        0.01
    }

    const fn default_distance_weight() -> f64 {
        0.5
    }

    pub fn score(&self, attribute: f64, area_size: f64, distance_km: f64) -> f64 {
        attribute * self.probability_weight + area_size * self.area_weight
            - distance_km * self.distance_weight
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            probability_weight: Self::default_probability_weight(),
            area_weight: Self::default_area_weight(),
            distance_weight: Self::default_distance_weight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Calendar year the x axis spans, independent of the data's year
    #[serde(default = "TimelineConfig::default_reference_year")]
    pub reference_year: i32,
    #[serde(default = "TimelineConfig::default_padding_left")]
    pub padding_left: f64,
    #[serde(default = "TimelineConfig::default_padding_right")]
    pub padding_right: f64,
    /// Length of the prediction range, counted back from today
    #[serde(default = "TimelineConfig::default_prediction_weeks")]
    pub prediction_weeks: u32,
    /// Mean given to occurrence buckets that contain any point
    #[serde(default = "TimelineConfig::default_occurrence_presence")]
    pub occurrence_presence: f64,
}

impl TimelineConfig {
    const fn default_reference_year() -> i32 {
        2017
    }

    const fn default_padding_left() -> f64 {
        10.0
    }

    const fn default_padding_right() -> f64 {
        15.0
    }

    const fn default_prediction_weeks() -> u32 {
        52
    }

    const fn default_occurrence_presence() -> f64 {
        0.65
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            reference_year: Self::default_reference_year(),
            padding_left: Self::default_padding_left(),
            padding_right: Self::default_padding_right(),
            prediction_weeks: Self::default_prediction_weeks(),
            occurrence_presence: Self::default_occurrence_presence(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// How many malformed rows are kept verbatim in an ingest report
    #[serde(default = "IngestConfig::default_error_sample")]
    pub error_sample: usize,
}

impl IngestConfig {
    const fn default_error_sample() -> usize {
        10
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            error_sample: Self::default_error_sample(),
        }
    }
}

/// Which index structure is built for each date key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStrategy {
    /// Zoom-level clusters with attribute reduction
    Cluster,
    /// R*-tree over raw points for radius queries
    Proximity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "StrategyConfig::default_occurrences")]
    pub occurrences: IndexStrategy,
    #[serde(default = "StrategyConfig::default_predictions")]
    pub predictions: IndexStrategy,
}

impl StrategyConfig {
    const fn default_occurrences() -> IndexStrategy {
        IndexStrategy::Proximity
    }

    const fn default_predictions() -> IndexStrategy {
        IndexStrategy::Cluster
    }

    pub fn for_kind(&self, kind: PointKind) -> IndexStrategy {
        match kind {
            PointKind::Occurrences => self.occurrences,
            PointKind::Predictions => self.predictions,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            occurrences: Self::default_occurrences(),
            predictions: Self::default_predictions(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| GeoIndexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(source).map_err(|e| GeoIndexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GeoIndexError::Config(e.to_string()))
    }

    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.covering.max_cells = max_cells;
        self
    }

    pub fn with_max_level(mut self, max_level: u8) -> Self {
        self.covering.max_level = max_level;
        self
    }

    pub fn with_strategy(mut self, kind: PointKind, strategy: IndexStrategy) -> Self {
        match kind {
            PointKind::Occurrences => self.strategy.occurrences = strategy,
            PointKind::Predictions => self.strategy.predictions = strategy,
        }
        self
    }

    pub fn with_ranking(mut self, ranking: RankingConfig) -> Self {
        self.ranking = ranking;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let c = &self.covering;
        if c.max_cells == 0 {
            return Err(GeoIndexError::Config(
                "covering.max_cells must be greater than zero".to_string(),
            ));
        }
        if c.max_level > 30 {
            return Err(GeoIndexError::Config(format!(
                "covering.max_level must be at most 30, got {}",
                c.max_level
            )));
        }
        if c.min_level > c.max_level {
            return Err(GeoIndexError::Config(format!(
                "covering.min_level ({}) must be <= covering.max_level ({})",
                c.min_level, c.max_level
            )));
        }
        if !(1..=3).contains(&c.level_mod) {
            return Err(GeoIndexError::Config(
                "covering.level_mod must be 1, 2 or 3".to_string(),
            ));
        }

        if self.viewport.tile_size == 0 {
            return Err(GeoIndexError::Config(
                "viewport.tile_size must be greater than zero".to_string(),
            ));
        }

        let k = &self.cluster;
        if k.extent == 0 {
            return Err(GeoIndexError::Config(
                "cluster.extent must be greater than zero".to_string(),
            ));
        }
        if k.min_zoom > k.max_zoom {
            return Err(GeoIndexError::Config(format!(
                "cluster.min_zoom ({}) must be <= cluster.max_zoom ({})",
                k.min_zoom, k.max_zoom
            )));
        }
        // Cluster ids pack the zoom into five bits.
        if k.max_zoom > 30 {
            return Err(GeoIndexError::Config(format!(
                "cluster.max_zoom must be at most 30, got {}",
                k.max_zoom
            )));
        }
        if k.min_points == 0 {
            return Err(GeoIndexError::Config(
                "cluster.min_points must be greater than zero".to_string(),
            ));
        }
        for (name, radius) in [
            ("prediction_radius", k.prediction_radius),
            ("occurrence_radius", k.occurrence_radius),
        ] {
            if !radius.is_finite() || radius < 0.0 {
                return Err(GeoIndexError::Config(format!(
                    "cluster.{} must be a non-negative number, got {}",
                    name, radius
                )));
            }
        }

        let r = &self.ranking;
        if ![r.probability_weight, r.area_weight, r.distance_weight]
            .iter()
            .all(|w| w.is_finite())
        {
            return Err(GeoIndexError::Config(
                "ranking weights must be finite".to_string(),
            ));
        }

        let t = &self.timeline;
        if t.prediction_weeks == 0 {
            return Err(GeoIndexError::Config(
                "timeline.prediction_weeks must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&t.occurrence_presence) {
            return Err(GeoIndexError::Config(
                "timeline.occurrence_presence must be within [0, 1]".to_string(),
            ));
        }
        if !t.padding_left.is_finite() || !t.padding_right.is_finite() {
            return Err(GeoIndexError::Config(
                "timeline paddings must be finite".to_string(),
            ));
        }

        Ok(())
    }
}
