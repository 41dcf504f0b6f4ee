//! Data samples: immutable, timestamped, typed values
//!
//! A sample is created once by the hub and then shared by reference between
//! a resource's current/default/override slots and any observation buffer
//! that keeps it. Nothing mutates a sample after construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

use crate::error::{HubError, Result};
use crate::pool::{Pool, PoolLease};

/// Upper bound (exclusive) on the byte length of String and JSON payloads
pub const MAX_STRING_BYTES: usize = 50_001;

/// Shared handle to an immutable sample
pub type SampleRef = Rc<DataSample>;

/// Declared data type of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Trigger,
    Boolean,
    Numeric,
    String,
    Json,
}

impl DataType {
    /// Printable name used by admin tools
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Trigger => "trigger",
            DataType::Boolean => "Boolean",
            DataType::Numeric => "numeric",
            DataType::String => "string",
            DataType::Json => "JSON",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The payload of a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SampleValue {
    Trigger,
    Boolean(bool),
    Numeric(f64),
    String(String),
    Json(String),
}

impl SampleValue {
    pub fn data_type(&self) -> DataType {
        match self {
            SampleValue::Trigger => DataType::Trigger,
            SampleValue::Boolean(_) => DataType::Boolean,
            SampleValue::Numeric(_) => DataType::Numeric,
            SampleValue::String(_) => DataType::String,
            SampleValue::Json(_) => DataType::Json,
        }
    }

    /// Check payload bounds and, for JSON, structural validity
    pub fn validate(&self) -> Result<()> {
        match self {
            SampleValue::String(s) | SampleValue::Json(s) if s.len() >= MAX_STRING_BYTES => {
                Err(HubError::Overflow(format!(
                    "{} value of {} bytes exceeds {} bytes",
                    self.data_type(),
                    s.len(),
                    MAX_STRING_BYTES - 1
                )))
            }
            SampleValue::Json(s) => serde_json::from_str::<serde::de::IgnoredAny>(s)
                .map(|_| ())
                .map_err(|e| HubError::Format(format!("invalid JSON value: {}", e))),
            _ => Ok(()),
        }
    }

    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            SampleValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SampleValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SampleValue::String(s) | SampleValue::Json(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value as JSON text
    pub fn to_json(&self) -> String {
        match self {
            SampleValue::Trigger => "null".to_string(),
            SampleValue::Boolean(v) => v.to_string(),
            SampleValue::Numeric(v) => serde_json::Value::from(*v).to_string(),
            SampleValue::String(s) => serde_json::Value::from(s.as_str()).to_string(),
            SampleValue::Json(s) => s.clone(),
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::String(s) => f.write_str(s),
            other => f.write_str(&other.to_json()),
        }
    }
}

/// A timestamped value
#[derive(Debug)]
pub struct DataSample {
    timestamp: f64,
    value: SampleValue,
    _lease: Option<PoolLease>,
}

impl DataSample {
    /// Build a sample outside of any pool
    pub fn new(timestamp: f64, value: SampleValue) -> Result<SampleRef> {
        value.validate()?;
        Ok(Rc::new(Self {
            timestamp,
            value,
            _lease: None,
        }))
    }

    /// Build a sample that occupies a slot in `pool` for as long as it lives
    pub fn pooled(pool: &Pool, timestamp: f64, value: SampleValue) -> Result<SampleRef> {
        value.validate()?;
        let lease = pool.acquire()?;
        Ok(Rc::new(Self {
            timestamp,
            value,
            _lease: Some(lease),
        }))
    }

    /// Seconds since the epoch
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn value(&self) -> &SampleValue {
        &self.value
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }
}

/// Current wall-clock time in seconds since the epoch
pub fn now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ExhaustionPolicy;

    #[test]
    fn test_data_type_names() {
        assert_eq!(DataType::Trigger.name(), "trigger");
        assert_eq!(DataType::Boolean.name(), "Boolean");
        assert_eq!(DataType::Numeric.name(), "numeric");
        assert_eq!(DataType::String.name(), "string");
        assert_eq!(DataType::Json.name(), "JSON");
    }

    #[test]
    fn test_json_must_parse() {
        assert!(SampleValue::Json(r#"{"x": [1, 2]}"#.to_string()).validate().is_ok());
        assert!(matches!(
            SampleValue::Json("{not json".to_string()).validate(),
            Err(HubError::Format(_))
        ));
    }

    #[test]
    fn test_string_length_bound() {
        let long = "x".repeat(MAX_STRING_BYTES);
        assert!(matches!(
            DataSample::new(1.0, SampleValue::String(long)),
            Err(HubError::Overflow(_))
        ));
        let fits = "x".repeat(MAX_STRING_BYTES - 1);
        assert!(DataSample::new(1.0, SampleValue::String(fits)).is_ok());
    }

    #[test]
    fn test_to_json() {
        assert_eq!(SampleValue::Trigger.to_json(), "null");
        assert_eq!(SampleValue::Boolean(true).to_json(), "true");
        assert_eq!(SampleValue::Numeric(2.5).to_json(), "2.5");
        assert_eq!(SampleValue::String("a\"b".to_string()).to_json(), r#""a\"b""#);
    }

    #[test]
    fn test_pooled_sample_releases_slot() {
        let pool = Pool::new("samples", 1, ExhaustionPolicy::Recoverable);
        let sample = DataSample::pooled(&pool, 1.0, SampleValue::Numeric(1.0)).unwrap();
        let shared = sample.clone();
        assert_eq!(pool.in_use(), 1);
        assert!(DataSample::pooled(&pool, 2.0, SampleValue::Trigger).is_err());

        drop(sample);
        assert_eq!(pool.in_use(), 1);
        drop(shared);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_value_serde_shape() {
        let json = serde_json::to_string(&SampleValue::Numeric(3.0)).unwrap();
        assert_eq!(json, r#"{"type":"numeric","value":3.0}"#);
        let back: SampleValue = serde_json::from_str(r#"{"type":"trigger"}"#).unwrap();
        assert_eq!(back, SampleValue::Trigger);
    }
}
