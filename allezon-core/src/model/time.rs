//! Timestamp formats, time ranges and one-minute buckets.

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};

use crate::error::ValidationError;

/// Format used when writing tag timestamps.
pub const TAG_TIME_OUTPUT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format of a bucket start inside rollup keys and result rows.
pub const BUCKET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const TAG_TIME_INPUT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const RANGE_TIME_INPUT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const MAX_FRACTION_DIGITS: usize = 3;

/// Parse `YYYY-MM-DDTHH:MM:SS[.fff]Z`.
pub fn parse_datetime_with_zone(text: &str) -> Result<DateTime<Utc>, ValidationError> {
    parse_with(text, TAG_TIME_INPUT, "YYYY-MM-DDTHH:MM:SS[.fff]Z")
}

/// Parse `YYYY-MM-DDTHH:MM:SS[.fff]`, interpreted as UTC.
pub fn parse_datetime(text: &str) -> Result<DateTime<Utc>, ValidationError> {
    parse_with(text, RANGE_TIME_INPUT, "YYYY-MM-DDTHH:MM:SS[.fff]")
}

fn parse_with(
    text: &str,
    format: &str,
    expected: &'static str,
) -> Result<DateTime<Utc>, ValidationError> {
    let invalid = || ValidationError::InvalidDatetime {
        value: text.to_string(),
        expected,
    };

    if let Some((_, fraction)) = text.split_once('.') {
        let digits = fraction.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 || digits > MAX_FRACTION_DIGITS {
            return Err(invalid());
        }
    }

    NaiveDateTime::parse_from_str(text, format)
        .map(|naive| naive.and_utc())
        .map_err(|_| invalid())
}

/// Start of the one-minute bucket containing `time`.
pub fn bucket_start(time: DateTime<Utc>) -> DateTime<Utc> {
    time - Duration::seconds(i64::from(time.second()))
        - Duration::nanoseconds(i64::from(time.nanosecond()))
}

/// Bucket start in its canonical text form.
pub fn format_bucket(bucket: DateTime<Utc>) -> String {
    bucket.format(BUCKET_FORMAT).to_string()
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::EmptyTimeRange {
                start: format_bucket(start),
                end: format_bucket(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse `<start>_<end>`, both without zone.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let (start, end) = text
            .split_once('_')
            .ok_or_else(|| ValidationError::InvalidTimeRange(text.to_string()))?;
        Self::new(parse_datetime(start)?, parse_datetime(end)?)
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time < self.end
    }

    /// Number of one-minute buckets overlapping the range.
    pub fn bucket_count(&self) -> i64 {
        let first = bucket_start(self.start);
        let span = self.end - first;
        let minutes = span.num_minutes();
        if first + Duration::minutes(minutes) < self.end {
            minutes + 1
        } else {
            minutes
        }
    }

    /// Bucket starts from the bucket containing `start` up to `end`, exclusive.
    pub fn buckets(&self) -> impl Iterator<Item = DateTime<Utc>> + use<> {
        let first = bucket_start(self.start);
        (0..self.bucket_count()).map(move |i| first + Duration::minutes(i))
    }
}
