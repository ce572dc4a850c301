//! Per-tick aggregate buckets for the timeline strip.
//!
//! Each tick of a [`TickSchedule`] is aggregated through the
//! [`PointQueryEngine`], positioned on a fixed reference-year [`TimeScale`]
//! and normalized against the largest value of the same bucket set. There is
//! no global maximum, so the same absolute count can render at a different
//! intensity for a different view.

pub mod color;
pub mod ticks;

pub use color::{Rgb, bucket_color};
pub use ticks::{Tick, TickSchedule, TimeScale};

use crate::config::TimelineConfig;
use crate::query::{Aggregate, PointQueryEngine, QueryGeometry};
use chrono::NaiveDate;
use flora_types::record::{DateKey, PointKind};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucket {
    pub date: NaiveDate,
    pub key: DateKey,
    pub point_count: usize,
    pub mean_attribute: f64,
    pub normalized_count: f64,
    pub normalized_mean: f64,
    pub x: f64,
    pub color: Rgb,
}

/// Scale `value` into `[0, 1]` against `max`, with the minimum fixed at 0.
pub fn min_max_scale(value: f64, max: f64) -> f64 {
    if max > 0.0 { value / max } else { 0.0 }
}

#[derive(Debug, Clone, Default)]
pub struct TimelineBucketer {
    config: TimelineConfig,
}

impl TimelineBucketer {
    pub fn new(config: TimelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn scale(&self, width: f64) -> TimeScale {
        TimeScale::for_year(
            self.config.reference_year,
            width,
            self.config.padding_left,
            self.config.padding_right,
        )
    }

    /// Aggregate every tick of `schedule` inside `geometry` and turn the
    /// results into buckets. A loading index yields no buckets.
    pub fn buckets(
        &self,
        engine: &PointQueryEngine,
        geometry: &QueryGeometry,
        zoom: u8,
        schedule: &TickSchedule,
        width: f64,
    ) -> Vec<TimeBucket> {
        if engine.store().is_loading() {
            return Vec::new();
        }
        let ticks = schedule.ticks();
        let aggregates: Vec<Aggregate> = ticks
            .iter()
            .map(|tick| engine.get_aggregation(geometry, zoom, &tick.key))
            .collect();
        self.bucket_aggregates(engine.kind(), ticks, &aggregates, width)
    }

    /// Build buckets from already computed per-tick aggregates.
    ///
    /// `ticks` and `aggregates` are paired by position.
    pub fn bucket_aggregates(
        &self,
        kind: PointKind,
        ticks: Vec<Tick>,
        aggregates: &[Aggregate],
        width: f64,
    ) -> Vec<TimeBucket> {
        let scale = self.scale(width);
        let mut buckets: Vec<TimeBucket> = ticks
            .into_iter()
            .zip(aggregates)
            .map(|(tick, aggregate)| {
                let mean_attribute = match kind {
                    PointKind::Occurrences if aggregate.count > 0 => self.config.occurrence_presence,
                    _ => aggregate.mean_attribute,
                };
                TimeBucket {
                    x: scale.x(tick.date),
                    date: tick.date,
                    key: tick.key,
                    point_count: aggregate.count,
                    mean_attribute,
                    normalized_count: 0.0,
                    normalized_mean: 0.0,
                    color: bucket_color(0.0),
                }
            })
            .collect();

        let max_count = buckets.iter().map(|b| b.point_count).max().unwrap_or(0) as f64;
        let max_mean = buckets
            .iter()
            .map(|b| b.mean_attribute)
            .fold(0.0f64, f64::max);

        for bucket in &mut buckets {
            bucket.normalized_count = min_max_scale(bucket.point_count as f64, max_count);
            bucket.normalized_mean = match kind {
                PointKind::Predictions => min_max_scale(bucket.mean_attribute, max_mean),
                PointKind::Occurrences => bucket.mean_attribute,
            };
            bucket.color = bucket_color(bucket.normalized_mean);
        }
        buckets
    }
}
