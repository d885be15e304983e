//! Typed property values

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// A time instant or a closed time interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeValue {
    Instant(DateTime<Utc>),
    Interval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimeValue {
    pub fn now() -> Self {
        Self::Instant(Utc::now())
    }

    pub fn interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::Interval { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        match self {
            Self::Instant(t) => *t,
            Self::Interval { start, .. } => *start,
        }
    }

    /// End of the interval, `None` for instants
    pub fn end(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Instant(_) => None,
            Self::Interval { end, .. } => Some(*end),
        }
    }
}

/// Observation result
///
/// Numbers keep their exact decimal form when it is representable; values that only
/// survive as binary floating point come back as [`ResultValue::Float`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Number(Decimal),
    Float(f64),
    Boolean(bool),
    String(String),
    /// Objects, arrays and null
    Structured(serde_json::Value),
}

impl ResultValue {
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => match Decimal::from_str(&n.to_string()) {
                Ok(d) => Self::Number(d),
                Err(_) => match n.as_f64() {
                    Some(f) => Self::Float(f),
                    None => Self::Structured(serde_json::Value::Number(n)),
                },
            },
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::String(s) => Self::String(s),
            other => Self::Structured(other),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Number(d) => {
                if d.scale() == 0 {
                    if let Some(i) = d.to_i64() {
                        return serde_json::Value::from(i);
                    }
                }
                d.to_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Structured(v) => v.clone(),
        }
    }

    pub fn as_array(&self) -> Option<&Vec<serde_json::Value>> {
        match self {
            Self::Structured(serde_json::Value::Array(items)) => Some(items),
            _ => None,
        }
    }
}

impl From<i64> for ResultValue {
    fn from(v: i64) -> Self {
        Self::Number(Decimal::from(v))
    }
}

impl From<bool> for ResultValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for ResultValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Value of an entity property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Text(String),
    Json(serde_json::Value),
    Time(TimeValue),
    Result(ResultValue),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<&TimeValue> {
        match self {
            Self::Time(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_result(&self) -> Option<&ResultValue> {
        match self {
            Self::Result(r) => Some(r),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<TimeValue> for PropertyValue {
    fn from(v: TimeValue) -> Self {
        Self::Time(v)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Time(TimeValue::Instant(v))
    }
}

impl From<ResultValue> for PropertyValue {
    fn from(v: ResultValue) -> Self {
        Self::Result(v)
    }
}
