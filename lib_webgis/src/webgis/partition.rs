//! Groups the records of one dataset response by calendar day.
//!
//! The featureanalyzer service does not commit to a single response shape, so
//! records are discovered heuristically (see [`Partitioner::partition`]). A
//! response that yields no records produces an empty [`Partition`]; the raw
//! dump is still written by the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::configs::TrafficConfig;

/// Object keys tried, in order, for the record array.
const RECORD_KEYS: [&str; 6] = ["values", "data", "features", "records", "items", "rows"];

/// Nested objects that may carry the date field (GIS feature shapes).
const NESTED_KEYS: [&str; 2] = ["attributes", "properties"];

/// Epoch values above this are milliseconds.
const MILLIS_THRESHOLD: f64 = 1e11;

/// Epoch strings shorter than this are not epochs (`20240301` is a date).
const MIN_EPOCH_DIGITS: usize = 9;

// Slash dates are month-first, as the service sends them.
const NAIVE_DATETIME_FORMATS: [&str; 9] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d", "%m/%d/%Y"];

const OFFSET_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Records of one response, keyed by day in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub days: BTreeMap<NaiveDate, Vec<Value>>,
    /// Records dropped because they had no usable date.
    pub skipped: usize,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Number of records kept across all days.
    pub fn record_count(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    /// `(date, DayRecord)` pairs, each DayRecord being a JSON array.
    pub fn into_day_records(self) -> impl Iterator<Item = (NaiveDate, Value)> {
        self.days
            .into_iter()
            .map(|(date, records)| (date, Value::Array(records)))
    }
}

enum Records<'a> {
    Flat(&'a [Value]),
    DayKeyed(Vec<(NaiveDate, &'a Value)>),
    Unrecognised,
}

#[derive(Debug, Clone)]
pub struct Partitioner {
    date_fields: Vec<String>,
    time_zone: Tz,
}

impl Partitioner {
    pub fn new(date_fields: Vec<String>, time_zone: Tz) -> Self {
        Self {
            date_fields,
            time_zone,
        }
    }

    pub fn from_config(config: &TrafficConfig) -> Self {
        Self::new(config.date_fields.clone(), config.time_zone)
    }

    /// Splits `raw` into per-day groups.
    ///
    /// Records are found as follows:
    /// - a top-level array is the record list;
    /// - an object whose keys are all dates is already grouped by day;
    /// - otherwise the array under `values`, `data`, `features`, `records`,
    ///   `items` or `rows`, or the only array-valued field, is the record list.
    ///
    /// Anything else yields an empty partition. Same-day records keep their
    /// input order.
    pub fn partition(&self, raw: &Value) -> Partition {
        let mut partition = Partition::default();

        match discover_records(raw) {
            Records::Flat(records) => {
                for record in records {
                    match self.record_date(record) {
                        Some(date) => partition.days.entry(date).or_default().push(record.clone()),
                        None => partition.skipped += 1,
                    }
                }
            }
            Records::DayKeyed(groups) => {
                for (date, value) in groups {
                    let day = partition.days.entry(date).or_default();
                    match value {
                        Value::Array(records) => day.extend(records.iter().cloned()),
                        other => day.push(other.clone()),
                    }
                }
            }
            Records::Unrecognised => {
                log::warn!("Response has no recognisable record list; no day files will be written");
            }
        }

        if partition.skipped > 0 {
            log::warn!(
                "Skipped {} records without a usable date field",
                partition.skipped
            );
        }
        partition
    }

    /// The service-local date of one record, if it has one.
    pub fn record_date(&self, record: &Value) -> Option<NaiveDate> {
        let object = record.as_object()?;
        self.date_fields
            .iter()
            .find_map(|field| lookup_field(object, field))
            .and_then(|value| self.parse_date(value))
    }

    /// Parses a date-ish JSON value into a service-local date.
    pub fn parse_date(&self, value: &Value) -> Option<NaiveDate> {
        match value {
            Value::String(s) => self.parse_date_str(s),
            Value::Number(n) => n.as_f64().and_then(|epoch| self.epoch_date(epoch)),
            _ => None,
        }
    }

    fn parse_date_str(&self, raw: &str) -> Option<NaiveDate> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&self.time_zone).date_naive());
        }
        for fmt in OFFSET_DATETIME_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Some(dt.with_timezone(&self.time_zone).date_naive());
            }
        }
        for fmt in NAIVE_DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(dt.date());
            }
        }
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                return Some(date);
            }
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            if s.len() == 8 {
                return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
            }
            if s.len() >= MIN_EPOCH_DIGITS {
                return s.parse::<f64>().ok().and_then(|epoch| self.epoch_date(epoch));
            }
        }
        None
    }

    fn epoch_date(&self, epoch: f64) -> Option<NaiveDate> {
        let millis = if epoch.abs() > MILLIS_THRESHOLD {
            epoch
        } else {
            epoch * 1000.0
        };
        if !millis.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis(millis as i64)
            .map(|utc| utc.with_timezone(&self.time_zone).date_naive())
    }
}

fn lookup_field<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    let direct = object.get(field).filter(|v| !v.is_null());
    direct.or_else(|| {
        NESTED_KEYS.iter().find_map(|nested| {
            object
                .get(*nested)
                .and_then(Value::as_object)
                .and_then(|inner| inner.get(field))
                .filter(|v| !v.is_null())
        })
    })
}

fn discover_records(raw: &Value) -> Records<'_> {
    let object = match raw {
        Value::Array(records) => return Records::Flat(records),
        Value::Object(object) => object,
        _ => return Records::Unrecognised,
    };

    if !object.is_empty() {
        let keyed: Vec<(NaiveDate, &Value)> = object
            .iter()
            .filter_map(|(key, value)| {
                NaiveDate::parse_from_str(key.trim(), "%Y-%m-%d")
                    .ok()
                    .map(|date| (date, value))
            })
            .collect();
        if keyed.len() == object.len() {
            return Records::DayKeyed(keyed);
        }
    }

    for key in RECORD_KEYS {
        if let Some(Value::Array(records)) = object.get(key) {
            return Records::Flat(records);
        }
    }

    let mut arrays = object.values().filter_map(Value::as_array);
    match (arrays.next(), arrays.next()) {
        (Some(records), None) => Records::Flat(records),
        _ => Records::Unrecognised,
    }
}
