//! Field values for streamed rows

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Largest magnitude an `f64` can have and still truncate into an `i64`.
const I64_FLOAT_LIMIT: f64 = 9_223_372_036_854_775_808.0;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f"];

/// A single typed value read from the upstream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Field {
    /// Absent value
    Null,

    /// Text as read from the source
    String(String),

    /// Signed integer
    Long(i64),

    /// Floating point number
    Double(f64),

    /// Boolean flag
    Bool(bool),

    /// Date-time without a time zone
    Date(NaiveDateTime),

    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Field {
    /// Name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Field::Null => "null",
            Field::String(_) => "string",
            Field::Long(_) => "long",
            Field::Double(_) => "double",
            Field::Bool(_) => "bool",
            Field::Date(_) => "date",
            Field::Bytes(_) => "bytes",
        }
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Raw text for string fields, exactly as the source produced it.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Field::String(value) => Some(value),
            _ => None,
        }
    }

    /// String form of the value; `None` only for null fields.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Field::Null => None,
            Field::String(value) => Some(value.clone()),
            Field::Long(value) => Some(value.to_string()),
            Field::Double(value) => Some(value.to_string()),
            Field::Bool(value) => Some(value.to_string()),
            Field::Date(value) => Some(value.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Field::Bytes(value) => Some(String::from_utf8_lossy(value).into_owned()),
        }
    }

    /// Integer interpretation. Fractional values are truncated toward zero.
    pub fn as_long(&self) -> Result<Option<i64>> {
        match self {
            Field::Null => Ok(None),
            Field::String(value) => parse_long(value).map(Some),
            Field::Long(value) => Ok(Some(*value)),
            Field::Double(value) => float_to_long(*value)
                .map(Some)
                .ok_or_else(|| Error::conversion("double", value.to_string(), "long")),
            Field::Bool(value) => Ok(Some(i64::from(*value))),
            Field::Date(value) => Ok(Some(value.and_utc().timestamp_millis())),
            Field::Bytes(_) => Err(self.unsupported("long")),
        }
    }

    /// Floating point interpretation.
    pub fn as_double(&self) -> Result<Option<f64>> {
        match self {
            Field::Null => Ok(None),
            Field::String(value) => value
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| Error::conversion("string", value.as_str(), "double")),
            #[allow(clippy::cast_precision_loss)]
            Field::Long(value) => Ok(Some(*value as f64)),
            Field::Double(value) => Ok(Some(*value)),
            Field::Bool(_) | Field::Date(_) | Field::Bytes(_) => Err(self.unsupported("double")),
        }
    }

    /// Boolean interpretation. Strings must read `true` or `false`.
    pub fn as_bool(&self) -> Result<Option<bool>> {
        match self {
            Field::Null => Ok(None),
            Field::String(value) => {
                let trimmed = value.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Some(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Some(false))
                } else {
                    Err(Error::conversion("string", value.as_str(), "bool"))
                }
            }
            Field::Long(value) => Ok(Some(*value != 0)),
            Field::Bool(value) => Ok(Some(*value)),
            Field::Double(_) | Field::Date(_) | Field::Bytes(_) => Err(self.unsupported("bool")),
        }
    }

    /// Date-time interpretation. Longs are epoch milliseconds.
    pub fn as_date(&self) -> Result<Option<NaiveDateTime>> {
        match self {
            Field::Null => Ok(None),
            Field::String(value) => parse_date_time(value)
                .map(Some)
                .ok_or_else(|| Error::conversion("string", value.as_str(), "date")),
            Field::Long(value) => DateTime::from_timestamp_millis(*value)
                .map(|date| Some(date.naive_utc()))
                .ok_or_else(|| Error::conversion("long", value.to_string(), "date")),
            Field::Date(value) => Ok(Some(*value)),
            Field::Double(_) | Field::Bool(_) | Field::Bytes(_) => Err(self.unsupported("date")),
        }
    }

    fn unsupported(&self, target: &'static str) -> Error {
        Error::conversion(self.kind(), self.as_string().unwrap_or_default(), target)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::String(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::String(value)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Long(value)
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Double(value)
    }
}

impl From<bool> for Field {
    fn from(value: bool) -> Self {
        Field::Bool(value)
    }
}

impl From<NaiveDateTime> for Field {
    fn from(value: NaiveDateTime) -> Self {
        Field::Date(value)
    }
}

impl<T: Into<Field>> From<Option<T>> for Field {
    fn from(value: Option<T>) -> Self {
        value.map_or(Field::Null, Into::into)
    }
}

fn parse_long(value: &str) -> Result<i64> {
    let trimmed = value.trim();
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Ok(parsed);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(float_to_long)
        .ok_or_else(|| Error::conversion("string", value, "long"))
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_long(value: f64) -> Option<i64> {
    let truncated = value.trunc();
    if truncated.is_finite() && truncated.abs() < I64_FLOAT_LIMIT {
        Some(truncated as i64)
    } else {
        None
    }
}

/// Parse the date-time forms accepted from text sources.
pub fn parse_date_time(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_utc());
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(trimmed, format) {
            return NaiveDate::from_ymd_opt(1970, 1, 1).map(|epoch| epoch.and_time(time));
        }
    }

    None
}
