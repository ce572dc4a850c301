//! Dataset ingest: fetching a subject's dataset body and parsing its rows.
//!
//! Bodies are headerless CSV with one point per row:
//!
//! ```text
//! date,latitude,longitude,attribute[,id]
//! ```
//!
//! Prediction rows carry an eight digit `YYYYMMDD` date and a probability in
//! `[0, 1]`. Occurrence rows may use a day or a month date (it is reduced to
//! the month) and may leave the attribute empty. A row that cannot be turned
//! into a [`Record`] is skipped and counted; an I/O failure while reading the
//! body fails the whole ingest.

use crate::calendar::parse_day_key;
use crate::compute::validation::{validate_geographic_point, validate_probability};
use crate::config::IngestConfig;
use crate::error::{BoxError, GeoIndexError, Result};
use flora_types::point::GeoPoint;
use flora_types::record::{DateKey, PointKind, Record, SubjectId};
use flora_types::stats::IngestStats;
use std::future::Future;
use std::io::Read;

/// Where subject datasets come from.
pub trait DatasetSource: Send + Sync {
    /// Fetch the raw dataset body of `subject` for `kind`.
    fn fetch(
        &self,
        subject: &SubjectId,
        kind: PointKind,
    ) -> impl Future<Output = std::result::Result<Vec<u8>, BoxError>> + Send;
}

/// Outcome of parsing one dataset body.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub records: Vec<Record>,
    pub stats: IngestStats,
    /// The first malformed rows, up to the configured sample size
    pub errors: Vec<GeoIndexError>,
}

/// Parses dataset bodies for one subject and kind.
#[derive(Debug, Clone)]
pub struct RecordParser {
    subject: SubjectId,
    kind: PointKind,
    error_sample: usize,
}

impl RecordParser {
    pub fn new(subject: SubjectId, kind: PointKind) -> Self {
        Self::with_config(subject, kind, &IngestConfig::default())
    }

    pub fn with_config(subject: SubjectId, kind: PointKind, config: &IngestConfig) -> Self {
        Self {
            subject,
            kind,
            error_sample: config.error_sample,
        }
    }

    pub fn parse_bytes(&self, body: &[u8]) -> Result<IngestReport> {
        self.parse_reader(body)
    }

    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<IngestReport> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut report = IngestReport::default();
        for (i, result) in csv_reader.records().enumerate() {
            let fallback_line = i as u64 + 1;
            let parsed = match result {
                Ok(row) => {
                    let line = row.position().map_or(fallback_line, |p| p.line());
                    parse_row(self.kind, &row, line)
                }
                Err(e) if e.is_io_error() => {
                    return Err(GeoIndexError::IngestTransportFailure {
                        subject: self.subject.clone(),
                        kind: self.kind,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    let line = e.position().map_or(fallback_line, |p| p.line());
                    Err(GeoIndexError::MalformedRecord {
                        line,
                        reason: e.to_string(),
                    })
                }
            };

            match parsed {
                Ok(record) => {
                    report.stats.record_accepted();
                    report.records.push(record);
                }
                Err(e) => {
                    log::warn!(
                        "Skipping {} row for subject [{}]: {}",
                        self.kind,
                        self.subject,
                        e
                    );
                    report.stats.record_rejected();
                    if report.errors.len() < self.error_sample {
                        report.errors.push(e);
                    }
                }
            }
        }

        log::debug!(
            "Parsed {} {} rows for [{}]: {} accepted, {} rejected",
            report.stats.rows_read,
            self.kind,
            self.subject,
            report.stats.accepted,
            report.stats.rejected
        );
        Ok(report)
    }

    /// Fetch the subject's body from `source` and parse it.
    ///
    /// Transport failures become [`GeoIndexError::IngestTransportFailure`].
    pub async fn fetch_and_parse<S: DatasetSource>(&self, source: &S) -> Result<IngestReport> {
        let body = source
            .fetch(&self.subject, self.kind)
            .await
            .map_err(|source| GeoIndexError::IngestTransportFailure {
                subject: self.subject.clone(),
                kind: self.kind,
                source,
            })?;
        self.parse_bytes(&body)
    }
}

/// Parse a whole body with default settings.
pub fn parse_records(subject: &SubjectId, kind: PointKind, body: &[u8]) -> Result<IngestReport> {
    RecordParser::new(subject.clone(), kind).parse_bytes(body)
}

fn malformed(line: u64, reason: impl Into<String>) -> GeoIndexError {
    GeoIndexError::MalformedRecord {
        line,
        reason: reason.into(),
    }
}

fn parse_row(kind: PointKind, row: &csv::StringRecord, line: u64) -> Result<Record> {
    if row.len() < 3 {
        return Err(malformed(
            line,
            format!("expected at least 3 columns, found {}", row.len()),
        ));
    }

    let date_key = parse_date(kind, &row[0]).map_err(|reason| malformed(line, reason))?;

    let lat: f64 = row[1]
        .parse()
        .map_err(|_| malformed(line, format!("latitude [{}] is not a number", &row[1])))?;
    let lng: f64 = row[2]
        .parse()
        .map_err(|_| malformed(line, format!("longitude [{}] is not a number", &row[2])))?;
    let point = GeoPoint::new(lat, lng);
    validate_geographic_point(&point).map_err(|e| malformed(line, e.to_string()))?;

    let attribute = match row.get(3).filter(|v| !v.is_empty()) {
        Some(raw) => Some(
            raw.parse::<f64>()
                .map_err(|_| malformed(line, format!("attribute [{}] is not a number", raw)))?,
        ),
        None => None,
    };
    if kind.sums_attribute() {
        let value = attribute.ok_or_else(|| malformed(line, "prediction row has no attribute"))?;
        validate_probability(value).map_err(|e| malformed(line, e.to_string()))?;
    }

    let mut record = Record::new(date_key, point, attribute);
    if let Some(id) = row.get(4).filter(|v| !v.is_empty()) {
        record = record.with_id(id);
    }
    Ok(record)
}

fn parse_date(kind: PointKind, raw: &str) -> std::result::Result<DateKey, String> {
    let key = DateKey::parse(raw).ok_or_else(|| format!("date [{}] is not a date key", raw))?;
    if key.as_str().len() == 8 {
        parse_day_key(key.as_str()).map_err(|e| e.to_string())?;
    }
    match kind {
        PointKind::Predictions if key.as_str().len() != 8 => {
            Err(format!("prediction date [{}] must be YYYYMMDD", raw))
        }
        PointKind::Predictions => Ok(key),
        PointKind::Occurrences => Ok(key.to_month()),
    }
}
