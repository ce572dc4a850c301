use crate::point::GeoPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of the subject (taxon) whose dataset is indexed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The two dataset flavours a subject can be viewed through.
///
/// The variant decides which numeric field is aggregated when points merge
/// and how precise the date keys of its records are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// Raw observations, keyed by month.
    Occurrences,
    /// Modelled probabilities, keyed by exact date.
    #[default]
    Predictions,
}

impl PointKind {
    pub fn date_precision(&self) -> DatePrecision {
        match self {
            PointKind::Occurrences => DatePrecision::Month,
            PointKind::Predictions => DatePrecision::Day,
        }
    }

    /// Whether merged points sum their attribute.
    pub fn sums_attribute(&self) -> bool {
        matches!(self, PointKind::Predictions)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PointKind::Occurrences => "occurrences",
            PointKind::Predictions => "predictions",
        }
    }
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "occurrences" => Ok(PointKind::Occurrences),
            "predictions" => Ok(PointKind::Predictions),
            other => Err(format!("Unrecognized point kind [{}]", other)),
        }
    }
}

/// Resolution of a [`DateKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    /// Two digits, `MM`.
    Month,
    /// Eight digits, `YYYYMMDD`.
    Day,
}

/// A date key as it appears in datasets and queries.
///
/// Either an eight digit `YYYYMMDD` day or a two digit `MM` month. Calendar
/// validity of day keys is not checked here; ingest does that.
///
/// # Examples
///
/// ```
/// use flora_types::record::{DateKey, DatePrecision};
///
/// let day = DateKey::parse("20170908").unwrap();
/// let month = DateKey::parse("9").unwrap();
/// assert_eq!(day.precision(), DatePrecision::Day);
/// assert_eq!(month.as_str(), "09");
/// assert!(day.matches(&month));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(String);

impl DateKey {
    /// Parse a raw key, accepting one or two digit months and eight digit days.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match raw.len() {
            8 => Some(Self(raw.to_string())),
            1 | 2 => {
                let month: u32 = raw.parse().ok()?;
                (1..=12)
                    .contains(&month)
                    .then(|| Self(format!("{:02}", month)))
            }
            _ => None,
        }
    }

    /// Day key from calendar parts. Years are clamped to four digits.
    pub fn day(year: i32, month: u32, day: u32) -> Self {
        Self(format!(
            "{:04}{:02}{:02}",
            year.clamp(0, 9999),
            month.min(99),
            day.min(99)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn precision(&self) -> DatePrecision {
        if self.0.len() == 8 {
            DatePrecision::Day
        } else {
            DatePrecision::Month
        }
    }

    /// The `MM` part of the key.
    pub fn month(&self) -> &str {
        match self.precision() {
            DatePrecision::Day => &self.0[4..6],
            DatePrecision::Month => &self.0,
        }
    }

    pub fn to_month(&self) -> DateKey {
        DateKey(self.month().to_string())
    }

    /// Reduce the key to at most `precision`.
    ///
    /// A month key cannot be widened to a day, so it is returned unchanged.
    pub fn with_precision(&self, precision: DatePrecision) -> DateKey {
        match (self.precision(), precision) {
            (DatePrecision::Day, DatePrecision::Month) => self.to_month(),
            _ => self.clone(),
        }
    }

    /// Whether an index stored under `self` answers a query for `query`.
    ///
    /// Equal precisions compare exactly. Mixed precisions compare on the
    /// month component, so a month query selects every day of that month and
    /// a day query against month-keyed data selects its month.
    pub fn matches(&self, query: &DateKey) -> bool {
        if self.precision() == query.precision() {
            self.0 == query.0
        } else {
            self.month() == query.month()
        }
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DateKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DateKey::parse(&value).ok_or_else(|| format!("Invalid date key [{}]", value))
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.0
    }
}

/// One dated, geotagged row of a subject's dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date_key: DateKey,
    pub point: GeoPoint,
    /// Probability in `[0, 1]`, absent for raw occurrences.
    pub attribute: Option<f64>,
    pub id: Option<String>,
}

impl Record {
    pub fn new(date_key: DateKey, point: GeoPoint, attribute: Option<f64>) -> Self {
        Self {
            date_key,
            point,
            attribute,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_key_parsing() {
        assert_eq!(DateKey::parse("20170908").unwrap().as_str(), "20170908");
        assert_eq!(DateKey::parse("3").unwrap().as_str(), "03");
        assert_eq!(DateKey::parse(" 12 ").unwrap().as_str(), "12");
        assert!(DateKey::parse("13").is_none());
        assert!(DateKey::parse("00").is_none());
        assert!(DateKey::parse("2017090").is_none());
        assert!(DateKey::parse("2017-09-08").is_none());
        assert!(DateKey::parse("").is_none());
    }

    #[test]
    fn test_date_key_matching() {
        let day = DateKey::parse("20170908").unwrap();
        let other_day = DateKey::parse("20170915").unwrap();
        let september = DateKey::parse("09").unwrap();
        let october = DateKey::parse("10").unwrap();

        assert!(day.matches(&day));
        assert!(!day.matches(&other_day));
        assert!(day.matches(&september));
        assert!(!day.matches(&october));
        assert!(september.matches(&day));
        assert!(september.matches(&september));
        assert!(!october.matches(&day));
    }

    #[test]
    fn test_with_precision_never_widens() {
        let day = DateKey::parse("20171103").unwrap();
        assert_eq!(day.with_precision(DatePrecision::Month).as_str(), "11");
        let month = DateKey::parse("11").unwrap();
        assert_eq!(month.with_precision(DatePrecision::Day), month);
    }

    #[test]
    fn test_point_kind_from_str() {
        assert_eq!(
            "Occurrences".parse::<PointKind>().unwrap(),
            PointKind::Occurrences
        );
        assert_eq!(
            "predictions".parse::<PointKind>().unwrap(),
            PointKind::Predictions
        );
        assert!("observations".parse::<PointKind>().is_err());
        assert_eq!(
            PointKind::Predictions.date_precision(),
            DatePrecision::Day
        );
    }
}
