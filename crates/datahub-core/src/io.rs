//! Client operations, confined to the caller's own namespace
//!
//! Clients address resources with paths relative to `/app/<name>`. An
//! absolute path would reach into another app's subtree and is refused.

use tracing::{debug, info};

use crate::error::{HubError, Result};
use crate::handler::HandlerRef;
use crate::hub::Hub;
use crate::observation::PushOutcome;
use crate::path;
use crate::sample::{DataType, SampleRef, SampleValue};
use crate::session::Session;
use crate::tree::{Created, EntryId, EntryType, ResourceKind};

impl Hub {
    fn session_namespace(&self, session: &Session) -> Result<EntryId> {
        let ns = session.namespace().ok_or_else(|| {
            HubError::NotPermitted(format!("session {} has no namespace", session.id()))
        })?;
        if !self.tree().contains(ns) {
            return Err(HubError::NotFound("session namespace".to_string()));
        }
        Ok(ns)
    }

    fn client_path(path: &str) -> Result<&str> {
        if path::is_absolute(path) {
            return Err(HubError::NotPermitted(format!(
                "'{}' is outside the client namespace",
                path
            )));
        }
        Ok(path)
    }

    fn client_entry(&self, session: &Session, path: &str) -> Result<EntryId> {
        let ns = self.session_namespace(session)?;
        self.tree().resolve(ns, Self::client_path(path)?)
    }

    fn create_client_resource(
        &mut self,
        session: &Session,
        path: &str,
        kind: ResourceKind,
        data_type: DataType,
        units: &str,
    ) -> Result<Created> {
        let ns = self.session_namespace(session)?;
        let path = Self::client_path(path)?;
        let (_, created) = self.create_or_get(ns, path, kind, data_type, units)?;
        if created != Created::Existing {
            info!(
                session = %session.id(),
                path = %path,
                kind = ?kind,
                data_type = %data_type,
                units = %units,
                "Client resource created"
            );
        }
        Ok(created)
    }

    /// Create an Input the client will push to
    pub fn create_input(
        &mut self,
        session: &Session,
        path: &str,
        data_type: DataType,
        units: &str,
    ) -> Result<Created> {
        self.create_client_resource(session, path, ResourceKind::Input, data_type, units)
    }

    /// Create an Output the client will read, typically a setting
    pub fn create_output(
        &mut self,
        session: &Session,
        path: &str,
        data_type: DataType,
        units: &str,
    ) -> Result<Created> {
        self.create_client_resource(session, path, ResourceKind::Output, data_type, units)
    }

    pub fn delete_resource(&mut self, session: &Session, path: &str) -> Result<()> {
        let entry = self.client_entry(session, path)?;
        self.delete(entry)?;
        debug!(session = %session.id(), path = %path, "Client resource deleted");
        Ok(())
    }

    /// Push a value into one of the client's Inputs
    pub fn push_input(
        &mut self,
        session: &Session,
        path: &str,
        timestamp: f64,
        value: SampleValue,
    ) -> Result<PushOutcome> {
        let entry = self.client_entry(session, path)?;
        if self.tree().entry_type(entry) != EntryType::Input {
            return Err(HubError::NotPermitted(format!(
                "'{}' is a {}, clients push only to inputs",
                path,
                self.tree().entry_type(entry)
            )));
        }
        self.push(entry, timestamp, value)
    }

    /// Current value of one of the client's Inputs or Outputs
    pub fn get_value(&self, session: &Session, path: &str) -> Result<Option<SampleRef>> {
        let entry = self.client_entry(session, path)?;
        match self.tree().entry_type(entry) {
            EntryType::Input | EntryType::Output => self.read(entry),
            other => Err(HubError::NotPermitted(format!("'{}' is a {}", path, other))),
        }
    }

    /// Set the default of one of the client's resources
    pub fn set_client_default(
        &mut self,
        session: &Session,
        path: &str,
        timestamp: f64,
        value: SampleValue,
    ) -> Result<()> {
        let entry = self.client_entry(session, path)?;
        self.set_default(entry, timestamp, value)
    }

    /// Subscribe to one of the client's resources
    ///
    /// If the resource already has a value, the handler is called with it
    /// before this returns.
    pub fn add_push_handler<C, F>(
        &mut self,
        session: &Session,
        path: &str,
        mut callback: F,
        mut context: C,
    ) -> Result<HandlerRef>
    where
        C: 'static,
        F: FnMut(&mut Hub, f64, &SampleValue, &mut C) + 'static,
    {
        let ns = self.session_namespace(session)?;
        let path = Self::client_path(path)?;
        let entry = self.tree_mut().get_resource(ns, path)?;

        if let Some(sample) = self.read(entry)? {
            callback(self, sample.timestamp(), sample.value(), &mut context);
        }
        self.subscribe(entry, callback, context)
    }

    pub fn remove_push_handler(&mut self, handler: HandlerRef) {
        self.unsubscribe(handler);
    }
}
