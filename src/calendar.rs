//! Clock abstraction and prediction-day arithmetic.
//!
//! Predictions are only generated on Tuesdays and Fridays ("standard days").
//! Any date selected for a prediction query is snapped onto one of them.

use crate::error::{GeoIndexError, Result};
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use flora_types::record::DateKey;

/// Source of "today".
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// The local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to one date, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Direction to search for a standard day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    /// Strictly before the given date
    Backward,
    /// The closest standard day, the given date included; ties go backward
    Nearest,
    /// Strictly after the given date
    Forward,
}

pub fn is_standard_day(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Tue | Weekday::Fri)
}

/// Snap `date` onto a prediction standard day.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use flora_geoindex::calendar::{to_standard_day, Shift};
///
/// let sunday = NaiveDate::from_ymd_opt(2018, 4, 15).unwrap();
/// let friday = NaiveDate::from_ymd_opt(2018, 4, 13).unwrap();
/// assert_eq!(to_standard_day(sunday, Shift::Nearest), friday);
/// ```
pub fn to_standard_day(date: NaiveDate, shift: Shift) -> NaiveDate {
    // Tuesday and Friday are never more than four days apart.
    for offset in 0..=4i64 {
        let candidates: &[i64] = match shift {
            Shift::Backward => &[-offset],
            Shift::Forward => &[offset],
            Shift::Nearest => &[-offset, offset],
        };
        for &delta in candidates {
            if delta == 0 && shift != Shift::Nearest {
                continue;
            }
            let candidate = date + Duration::days(delta);
            if is_standard_day(candidate) {
                return candidate;
            }
        }
    }
    date
}

/// `YYYYMMDD` rendering of a date.
pub fn format_day_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parse a `YYYYMMDD` string into a calendar date.
pub fn parse_day_key(raw: &str) -> Result<NaiveDate> {
    if raw.len() != 8 {
        return Err(GeoIndexError::InvalidDate(format!(
            "Invalid path date [{}]",
            raw
        )));
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map_err(|e| GeoIndexError::InvalidDate(format!("Invalid path date [{}]: {}", raw, e)))
}

/// Range of dates for which predictions exist: the last `weeks` weeks up to
/// and including the standard day nearest `today`.
pub fn prediction_range(today: NaiveDate, weeks: u32) -> (NaiveDate, NaiveDate) {
    let end = to_standard_day(today, Shift::Nearest);
    (end - Duration::weeks(weeks as i64), end)
}

/// The active prediction date of a session.
///
/// Always sits on a standard day; setting any other date moves it back to
/// the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSelection {
    date: NaiveDate,
    today: NaiveDate,
}

impl DateSelection {
    pub fn new(clock: &dyn Clock) -> Self {
        let today = to_standard_day(clock.today(), Shift::Nearest);
        Self { date: today, today }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn is_today(&self) -> bool {
        self.date == self.today
    }

    /// Select a date, snapping back to a standard day.
    ///
    /// Returns whether the selection changed.
    pub fn set(&mut self, date: NaiveDate) -> bool {
        let date = if is_standard_day(date) {
            date
        } else {
            to_standard_day(date, Shift::Backward)
        };
        let changed = self.date != date;
        self.date = date;
        changed
    }

    /// Select a date from its `YYYYMMDD` form.
    pub fn set_formatted(&mut self, raw: &str) -> Result<bool> {
        let date = parse_day_key(raw)?;
        Ok(self.set(date))
    }

    /// Move to the neighbouring standard day.
    pub fn shift(&mut self, shift: Shift) -> bool {
        self.set(to_standard_day(self.date, shift))
    }

    pub fn day_key(&self) -> DateKey {
        DateKey::day(self.date.year(), self.date.month(), self.date.day())
    }

    pub fn month_key(&self) -> DateKey {
        self.day_key().to_month()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_to_standard_day() {
        let cases = [
            (Shift::Nearest, d(2018, 4, 17), d(2018, 4, 17)),
            (Shift::Nearest, d(2018, 4, 16), d(2018, 4, 17)),
            (Shift::Nearest, d(2018, 4, 15), d(2018, 4, 13)),
            (Shift::Nearest, d(2018, 4, 14), d(2018, 4, 13)),
            (Shift::Forward, d(2018, 4, 17), d(2018, 4, 20)),
            (Shift::Backward, d(2018, 4, 17), d(2018, 4, 13)),
        ];
        for (shift, given, expected) in cases {
            assert_eq!(to_standard_day(given, shift), expected, "{:?} {}", shift, given);
        }
    }

    #[test]
    fn test_selection_shift_walks_standard_days() {
        let clock = FixedClock(d(2018, 3, 16));
        let mut selection = DateSelection::new(&clock);
        assert_eq!(selection.day_key().as_str(), "20180316");
        assert_eq!(selection.month_key().as_str(), "03");
        assert!(selection.is_today());

        selection.set_formatted("20180209").unwrap();
        assert_eq!(selection.day_key().as_str(), "20180209");
        selection.shift(Shift::Backward);
        assert_eq!(selection.day_key().as_str(), "20180206");
        selection.shift(Shift::Backward);
        assert_eq!(selection.day_key().as_str(), "20180202");

        selection.set_formatted("20180209").unwrap();
        selection.shift(Shift::Forward);
        assert_eq!(selection.day_key().as_str(), "20180213");
        selection.shift(Shift::Forward);
        assert_eq!(selection.day_key().as_str(), "20180216");
        assert!(!selection.is_today());
    }

    #[test]
    fn test_non_standard_day_snaps_back() {
        let mut selection = DateSelection::new(&FixedClock(d(2018, 3, 16)));
        // Thursday
        selection.set_formatted("20180201").unwrap();
        assert_eq!(selection.day_key().as_str(), "20180130");
    }

    #[test]
    fn test_formatted_dates_are_validated() {
        let mut selection = DateSelection::new(&FixedClock(d(2018, 3, 16)));
        assert!(matches!(
            selection.set_formatted("02"),
            Err(GeoIndexError::InvalidDate(_))
        ));
        assert!(selection.set_formatted("20181345").is_err());
        assert_eq!(selection.day_key().as_str(), "20180316");
    }

    #[test]
    fn test_prediction_range_spans_weeks() {
        let (start, end) = prediction_range(d(2018, 3, 16), 52);
        assert_eq!(end, d(2018, 3, 16));
        assert_eq!(start, d(2017, 3, 17));
        assert_eq!((end - start).num_days(), 364);
    }

    #[test]
    fn test_day_key_round_trip() {
        let date = d(2017, 11, 3);
        assert_eq!(format_day_key(date), "20171103");
        assert_eq!(parse_day_key(&format_day_key(date)).unwrap(), date);
    }
}
