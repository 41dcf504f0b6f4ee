//! Observations: buffered, filtered resources
//!
//! An observation sits between a producer and its consumers. Every sample
//! offered to it goes through the filter first; rejected samples vanish
//! without an error, accepted ones are appended to the history buffer,
//! become the current value and are dispatched like any other push.
//!
//! The buffer is bounded by a sample count and, optionally, by age. Age is
//! only checked when samples are inserted or read, never on a timer.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::Result;
use crate::resource::Resource;
use crate::sample::{DataSample, DataType, SampleRef, SampleValue};

fn default_max_count() -> usize {
    100
}

/// Filter and buffer settings of one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// Maximum number of buffered samples
    #[serde(default = "default_max_count")]
    pub max_count: usize,
    /// Maximum age of buffered samples in seconds
    #[serde(default)]
    pub max_age: Option<f64>,
    /// Minimum change of a numeric value versus the last accepted one
    #[serde(default)]
    pub change_by: Option<f64>,
    /// Drop samples equal to the last accepted value
    #[serde(default)]
    pub suppress_repeats: bool,
    /// Minimum seconds between accepted samples
    #[serde(default)]
    pub min_period: Option<f64>,
    #[serde(default)]
    pub low_limit: Option<f64>,
    #[serde(default)]
    pub high_limit: Option<f64>,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            max_count: default_max_count(),
            max_age: None,
            change_by: None,
            suppress_repeats: false,
            min_period: None,
            low_limit: None,
            high_limit: None,
        }
    }
}

/// Why a sample did not make it through the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BelowChangeThreshold,
    Repeat,
    TooSoon,
    OutOfRange,
}

/// Result of offering a sample to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl PushOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Accepted)
    }
}

/// Outcome of [`Observation::accept`]
#[derive(Debug)]
pub enum Acceptance {
    /// Carries the value to propagate (the override, if one is set)
    Accepted(SampleRef),
    Rejected(RejectReason),
}

/// Summary of buffered numeric samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug)]
pub struct Observation {
    resource: Resource,
    config: ObservationConfig,
    buffer: VecDeque<SampleRef>,
    last_accepted: Option<SampleRef>,
}

impl Observation {
    pub fn new(resource: Resource, config: ObservationConfig) -> Self {
        Self {
            resource,
            config,
            buffer: VecDeque::new(),
            last_accepted: None,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut Resource {
        &mut self.resource
    }

    pub(crate) fn into_resource(self) -> Resource {
        self.resource
    }

    pub fn config(&self) -> &ObservationConfig {
        &self.config
    }

    /// Replace the settings; the buffer is trimmed to the new count limit
    pub fn set_config(&mut self, config: ObservationConfig) {
        self.config = config;
        self.trim_count();
    }

    /// Run the filter against the last accepted sample, without side effects
    pub fn filter(&self, sample: &DataSample) -> PushOutcome {
        let last = self.last_accepted.as_deref();

        if let (Some(min_period), Some(last)) = (self.config.min_period, last) {
            if sample.timestamp() - last.timestamp() < min_period {
                return PushOutcome::Rejected(RejectReason::TooSoon);
            }
        }

        if let SampleValue::Numeric(value) = sample.value() {
            if !self.within_limits(*value) {
                return PushOutcome::Rejected(RejectReason::OutOfRange);
            }
            if let (Some(threshold), Some(SampleValue::Numeric(prev))) =
                (self.config.change_by, last.map(|s| s.value()))
            {
                if (value - prev).abs() < threshold {
                    return PushOutcome::Rejected(RejectReason::BelowChangeThreshold);
                }
            }
        }

        if self.config.suppress_repeats && last.is_some_and(|l| l.value() == sample.value()) {
            return PushOutcome::Rejected(RejectReason::Repeat);
        }

        PushOutcome::Accepted
    }

    fn within_limits(&self, value: f64) -> bool {
        match (self.config.low_limit, self.config.high_limit) {
            (Some(low), Some(high)) if low <= high => value >= low && value <= high,
            // Inverted limits describe a dead band to drop.
            (Some(low), Some(high)) => value <= high || value >= low,
            (Some(low), None) => value >= low,
            (None, Some(high)) => value <= high,
            (None, None) => true,
        }
    }

    /// Filter, buffer and make current
    pub fn accept(&mut self, sample: SampleRef) -> Result<Acceptance> {
        self.resource.check_type(&sample)?;
        if let PushOutcome::Rejected(reason) = self.filter(&sample) {
            return Ok(Acceptance::Rejected(reason));
        }
        self.record(sample.clone());
        let effective = self.resource.set_current(sample)?;
        Ok(Acceptance::Accepted(effective))
    }

    fn record(&mut self, sample: SampleRef) {
        let reference = sample.timestamp();
        self.last_accepted = Some(sample.clone());
        self.buffer.push_back(sample);
        self.trim_count();
        self.expire(reference);
    }

    fn trim_count(&mut self) {
        while self.buffer.len() > self.config.max_count {
            self.buffer.pop_front();
        }
    }

    /// Drop buffered samples older than `max_age` relative to `now`
    pub fn expire(&mut self, now: f64) {
        if let Some(max_age) = self.config.max_age {
            while self
                .buffer
                .front()
                .is_some_and(|s| now - s.timestamp() > max_age)
            {
                self.buffer.pop_front();
            }
        }
    }

    /// Up to `max_count` most recent samples, oldest first
    pub fn history(&self, max_count: usize) -> Vec<SampleRef> {
        let skip = self.buffer.len().saturating_sub(max_count);
        self.buffer.iter().skip(skip).cloned().collect()
    }

    /// Buffered samples with a timestamp after `start_after`
    pub fn history_since(&self, start_after: f64) -> Vec<SampleRef> {
        self.buffer
            .iter()
            .filter(|s| s.timestamp() > start_after)
            .cloned()
            .collect()
    }

    /// Statistics over buffered numeric samples newer than `start_after`
    pub fn stats(&self, start_after: Option<f64>) -> Option<BufferStats> {
        if self.resource.data_type().is_some_and(|t| t != DataType::Numeric) {
            return None;
        }
        let values: Vec<f64> = self
            .buffer
            .iter()
            .filter(|s| start_after.map_or(true, |t| s.timestamp() > t))
            .filter_map(|s| s.value().as_numeric())
            .collect();
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        Some(BufferStats {
            count,
            min: values.iter().cloned().fold(f64::INFINITY, f64::min),
            max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std_dev: variance.sqrt(),
        })
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Forget buffered samples; the filter also starts over
    pub fn clear_history(&mut self) {
        self.buffer.clear();
        self.last_accepted = None;
    }
}
