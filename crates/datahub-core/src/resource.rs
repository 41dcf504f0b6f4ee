//! Shared state of every data-carrying tree entry
//!
//! Placeholders, Inputs, Outputs and Observations all embed a [`Resource`].
//! A Placeholder's resource has no data type yet; promotion fills it in
//! without touching the handler list or routing links.

use tracing::debug;

use crate::error::{HubError, Result};
use crate::handler::HandlerList;
use crate::sample::{DataSample, DataType, SampleRef};
use crate::tree::EntryId;

/// Upper bound (exclusive) on the byte length of a units string
pub const MAX_UNITS_BYTES: usize = 24;

pub fn validate_units(units: &str) -> Result<()> {
    if units.len() >= MAX_UNITS_BYTES {
        return Err(HubError::Overflow(format!(
            "units '{}' longer than {} bytes",
            units,
            MAX_UNITS_BYTES - 1
        )));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct Resource {
    data_type: Option<DataType>,
    units: String,
    current: Option<SampleRef>,
    default: Option<SampleRef>,
    override_value: Option<SampleRef>,
    handlers: HandlerList,
    source: Option<EntryId>,
    destinations: Vec<EntryId>,
}

impl Resource {
    pub fn new(data_type: DataType, units: &str) -> Self {
        Self {
            data_type: Some(data_type),
            units: units.to_string(),
            ..Self::default()
        }
    }

    /// A resource that has not been given a type yet
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    /// True if type and units are exactly these
    pub fn matches(&self, data_type: DataType, units: &str) -> bool {
        self.data_type == Some(data_type) && self.units == units
    }

    pub fn check_type(&self, sample: &DataSample) -> Result<()> {
        match self.data_type {
            Some(expected) if expected != sample.data_type() => Err(HubError::TypeMismatch {
                expected,
                actual: sample.data_type(),
            }),
            _ => Ok(()),
        }
    }

    /// Record a pushed sample and return the value that propagates onward
    ///
    /// A set override wins over the pushed value for readers and for
    /// propagation, but the pushed sample is still kept as current.
    pub fn set_current(&mut self, sample: SampleRef) -> Result<SampleRef> {
        self.check_type(&sample)?;
        self.current = Some(sample.clone());
        Ok(self.override_value.clone().unwrap_or(sample))
    }

    /// Effective value: override, else current, else default
    pub fn read(&self) -> Option<SampleRef> {
        self.override_value
            .clone()
            .or_else(|| self.current.clone())
            .or_else(|| self.default.clone())
    }

    pub fn current(&self) -> Option<&SampleRef> {
        self.current.as_ref()
    }

    pub fn default_value(&self) -> Option<&SampleRef> {
        self.default.as_ref()
    }

    pub fn override_value(&self) -> Option<&SampleRef> {
        self.override_value.as_ref()
    }

    pub fn set_default(&mut self, sample: SampleRef) -> Result<()> {
        self.check_type(&sample)?;
        self.default = Some(sample);
        Ok(())
    }

    pub fn clear_default(&mut self) {
        self.default = None;
    }

    pub fn set_override(&mut self, sample: SampleRef) -> Result<()> {
        self.check_type(&sample)?;
        self.override_value = Some(sample);
        Ok(())
    }

    pub fn clear_override(&mut self) {
        self.override_value = None;
    }

    /// Anything an administrator attached that pruning would lose
    pub fn has_admin_settings(&self) -> bool {
        self.default.is_some()
            || self.override_value.is_some()
            || !self.handlers.is_empty()
            || self.source.is_some()
            || !self.destinations.is_empty()
    }

    /// Give a typeless resource its type, dropping samples that do not fit
    pub(crate) fn promote(&mut self, data_type: DataType, units: &str) {
        let keep = |slot: &mut Option<SampleRef>| {
            if slot.as_ref().is_some_and(|s| s.data_type() != data_type) {
                *slot = None;
            }
        };
        keep(&mut self.current);
        keep(&mut self.default);
        keep(&mut self.override_value);
        debug!(data_type = %data_type, units = %units, "Resource promoted");
        self.data_type = Some(data_type);
        self.units = units.to_string();
    }

    pub fn handlers(&self) -> &HandlerList {
        &self.handlers
    }

    pub(crate) fn handlers_mut(&mut self) -> &mut HandlerList {
        &mut self.handlers
    }

    pub fn source(&self) -> Option<EntryId> {
        self.source
    }

    pub(crate) fn set_source_link(&mut self, source: Option<EntryId>) {
        self.source = source;
    }

    pub fn destinations(&self) -> &[EntryId] {
        &self.destinations
    }

    pub(crate) fn add_destination(&mut self, dest: EntryId) {
        if !self.destinations.contains(&dest) {
            self.destinations.push(dest);
        }
    }

    pub(crate) fn remove_destination(&mut self, dest: EntryId) {
        self.destinations.retain(|d| *d != dest);
    }

    pub(crate) fn take_destinations(&mut self) -> Vec<EntryId> {
        std::mem::take(&mut self.destinations)
    }
}
