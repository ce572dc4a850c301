//! Tick schedules and the fixed-year time scale.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use flora_types::record::{DateKey, PointKind};
use serde::{Deserialize, Serialize};

/// One tick of the timeline and the date key its aggregate is queried with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub date: NaiveDate,
    pub key: DateKey,
}

/// Which dates get a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickSchedule {
    /// Every seven days after `start`, while the previous tick is before `end`.
    Weekly { start: NaiveDate, end: NaiveDate },
    /// The first Friday of every month of `year`.
    Monthly { year: i32 },
}

impl TickSchedule {
    /// The schedule the timeline of `kind` uses.
    pub fn for_kind(kind: PointKind, prediction_range: (NaiveDate, NaiveDate), year: i32) -> Self {
        match kind {
            PointKind::Predictions => TickSchedule::Weekly {
                start: prediction_range.0,
                end: prediction_range.1,
            },
            PointKind::Occurrences => TickSchedule::Monthly { year },
        }
    }

    pub fn ticks(&self) -> Vec<Tick> {
        match *self {
            TickSchedule::Weekly { start, end } => {
                let mut ticks = Vec::new();
                let mut date = start;
                while date < end {
                    date += Duration::days(7);
                    ticks.push(Tick {
                        date,
                        key: DateKey::day(date.year(), date.month(), date.day()),
                    });
                }
                ticks
            }
            TickSchedule::Monthly { year } => (1..=12)
                .filter_map(|month| NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Fri, 1))
                .map(|date| Tick {
                    date,
                    key: DateKey::day(date.year(), date.month(), date.day()).to_month(),
                })
                .collect(),
        }
    }
}

/// Linear map from the days of a reference year onto a pixel range.
///
/// Dates of other years are moved into the reference year first, so a tick
/// lands at the same x whatever year its data comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale {
    domain: (NaiveDate, NaiveDate),
    range: (f64, f64),
}

impl TimeScale {
    /// Scale spanning Jan 1 to Dec 31 of `year` onto `[left, width - right]`.
    pub fn for_year(year: i32, width: f64, padding_left: f64, padding_right: f64) -> Self {
        let start = NaiveDate::from_yo_opt(year, 1).unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX);
        Self {
            domain: (start, end),
            range: (padding_left, width - padding_right),
        }
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    fn in_domain_year(&self, date: NaiveDate) -> NaiveDate {
        let year = self.domain.0.year();
        date.with_year(year)
            // Feb 29 has no counterpart in a common year
            .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
            .unwrap_or(date)
    }

    pub fn x(&self, date: NaiveDate) -> f64 {
        let date = self.in_domain_year(date);
        let span = (self.domain.1 - self.domain.0).num_days() as f64;
        if span <= 0.0 {
            return self.range.0;
        }
        let t = (date - self.domain.0).num_days() as f64 / span;
        self.range.0 + t * (self.range.1 - self.range.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monthly_ticks_are_first_fridays() {
        let keys: Vec<String> = TickSchedule::Monthly { year: 2017 }
            .ticks()
            .iter()
            .map(|t| t.date.format("%Y%m%d").to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "20170106", "20170203", "20170303", "20170407", "20170505", "20170602",
                "20170707", "20170804", "20170901", "20171006", "20171103", "20171201",
            ]
        );
        let ticks = TickSchedule::Monthly { year: 2017 }.ticks();
        assert_eq!(ticks[0].key.as_str(), "01");
        assert_eq!(ticks[11].key.as_str(), "12");
    }

    #[test]
    fn test_weekly_ticks_over_52_weeks() {
        let end = ymd(2017, 11, 3);
        let start = end - Duration::weeks(52);
        let ticks = TickSchedule::Weekly { start, end }.ticks();
        assert_eq!(ticks.len(), 52);
        assert_eq!(ticks[0].date, start + Duration::days(7));
        assert_eq!(ticks[51].date, end);
        assert_eq!(ticks[51].key.as_str(), "20171103");
    }

    #[test]
    fn test_weekly_ticks_overshoot_uneven_end() {
        let ticks = TickSchedule::Weekly {
            start: ymd(2017, 1, 1),
            end: ymd(2017, 1, 10),
        }
        .ticks();
        let dates: Vec<NaiveDate> = ticks.iter().map(|t| t.date).collect();
        assert_eq!(dates, vec![ymd(2017, 1, 8), ymd(2017, 1, 15)]);
    }

    #[test]
    fn test_scale_pins_year_ends_to_padding() {
        let scale = TimeScale::for_year(2017, 800.0, 10.0, 15.0);
        assert_eq!(scale.x(ymd(2017, 1, 1)), 10.0);
        assert_eq!(scale.x(ymd(2017, 12, 31)), 785.0);
        assert_eq!(scale.x(ymd(2016, 6, 1)), scale.x(ymd(2017, 6, 1)));
        assert_eq!(scale.x(ymd(2016, 2, 29)), scale.x(ymd(2017, 2, 28)));
    }
}
