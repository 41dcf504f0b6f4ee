//! The hub: resource tree, sample pool and the push pipeline
//!
//! Every push runs to completion inside the call that made it:
//!
//! ```text
//!   push -> type check / filter -> current value -> handlers -> destinations
//!                                                     |              |
//!                                                     +-- may push --+
//! ```
//!
//! Handlers get `&mut Hub` and may push again. Those nested pushes run on the
//! same call stack, capped by `max_push_depth`.

use tracing::{debug, warn};

use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::handler::{self, HandlerRef, PushCallback};
use crate::observation::{Acceptance, BufferStats, ObservationConfig, PushOutcome};
use crate::pool::Pool;
use crate::resource::Resource;
use crate::sample::{self, DataSample, DataType, SampleRef, SampleValue};
use crate::session::{CallerIdentity, Session};
use crate::tree::{Created, EntryId, EntryKind, EntryType, ResourceKind, ResourceTree};

pub struct Hub {
    tree: ResourceTree,
    samples: Pool,
    config: HubConfig,
    clock: Box<dyn Fn() -> f64>,
    next_handler_id: u64,
    push_depth: usize,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let pools = &config.pools;
        let tree = ResourceTree::new(Pool::new("entries", pools.max_entries, pools.exhaustion));
        let samples = Pool::new("samples", pools.max_samples, pools.exhaustion);
        Self {
            tree,
            samples,
            config,
            clock: Box::new(sample::now),
            next_handler_id: 1,
            push_depth: 0,
        }
    }

    /// Replace the wall clock used for "now" timestamps and age eviction
    pub fn with_clock(mut self, clock: impl Fn() -> f64 + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn now(&self) -> f64 {
        (self.clock)()
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn tree(&self) -> &ResourceTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ResourceTree {
        &mut self.tree
    }

    pub fn sample_pool(&self) -> &Pool {
        &self.samples
    }

    /// Allocate a sample; a zero timestamp means "now"
    pub fn new_sample(&self, timestamp: f64, value: SampleValue) -> Result<SampleRef> {
        let timestamp = if timestamp == 0.0 { self.now() } else { timestamp };
        DataSample::pooled(&self.samples, timestamp, value)
    }

    /// Resolve an absolute path from the root
    pub fn resolve(&self, path: &str) -> Result<EntryId> {
        self.tree.resolve(self.tree.root(), path)
    }

    pub fn entry_type(&self, path: &str) -> EntryType {
        self.resolve(path)
            .map(|id| self.tree.entry_type(id))
            .unwrap_or(EntryType::None)
    }

    pub fn create_or_get(
        &mut self,
        anchor: EntryId,
        path: &str,
        kind: ResourceKind,
        data_type: DataType,
        units: &str,
    ) -> Result<(EntryId, Created)> {
        self.tree.create_or_get(anchor, path, kind, data_type, units)
    }

    /// Create an observation (or find a matching one) and apply `config` to it
    pub fn create_observation(
        &mut self,
        path: &str,
        data_type: DataType,
        units: &str,
        config: ObservationConfig,
    ) -> Result<EntryId> {
        let root = self.tree.root();
        let (id, _) =
            self.tree
                .create_or_get(root, path, ResourceKind::Observation, data_type, units)?;
        self.set_observation_config(id, config)?;
        Ok(id)
    }

    pub fn set_observation_config(
        &mut self,
        entry: EntryId,
        config: ObservationConfig,
    ) -> Result<()> {
        let obs = self
            .tree
            .observation_mut(entry)
            .ok_or_else(|| HubError::NotFound("observation".to_string()))?;
        obs.set_config(config);
        Ok(())
    }

    pub fn delete(&mut self, entry: EntryId) -> Result<()> {
        self.tree.delete(entry)
    }

    /// Route `source_path` into `dest_path` (both absolute)
    pub fn set_source(&mut self, dest_path: &str, source_path: &str) -> Result<()> {
        let dest = self.resolve(dest_path)?;
        let source = self.resolve(source_path)?;
        self.tree.set_source(dest, source)?;
        debug!(dest = %dest_path, source = %source_path, "Source set");
        Ok(())
    }

    pub fn clear_source(&mut self, dest_path: &str) -> Result<()> {
        let dest = self.resolve(dest_path)?;
        self.tree.unlink_source(dest);
        Ok(())
    }

    /// Push a value into an entry
    pub fn push(
        &mut self,
        entry: EntryId,
        timestamp: f64,
        value: SampleValue,
    ) -> Result<PushOutcome> {
        let sample = self.new_sample(timestamp, value)?;
        self.deliver(entry, sample)
    }

    /// Push a value into the resource at an absolute path
    pub fn push_path(
        &mut self,
        path: &str,
        timestamp: f64,
        value: SampleValue,
    ) -> Result<PushOutcome> {
        let entry = self.resolve(path)?;
        self.push(entry, timestamp, value)
    }

    /// Run one sample through an entry and everything downstream of it
    pub fn deliver(&mut self, entry: EntryId, sample: SampleRef) -> Result<PushOutcome> {
        if self.push_depth >= self.config.max_push_depth {
            warn!(depth = self.push_depth, "Push chain too deep, sample dropped");
            return Err(HubError::NotPermitted("push chain too deep".to_string()));
        }

        let effective = match self.tree.kind_mut(entry)? {
            EntryKind::Namespace => {
                return Err(HubError::NotPermitted("a namespace holds no value".to_string()))
            }
            EntryKind::Placeholder(r) | EntryKind::Input(r) | EntryKind::Output(r) => {
                r.set_current(sample)?
            }
            EntryKind::Observation(obs) => match obs.accept(sample)? {
                Acceptance::Accepted(effective) => effective,
                Acceptance::Rejected(reason) => {
                    debug!(?reason, "Sample filtered out");
                    return Ok(PushOutcome::Rejected(reason));
                }
            },
        };

        self.push_depth += 1;
        self.notify(entry, &effective);
        let destinations = self
            .tree
            .resource(entry)
            .map(|r| r.destinations().to_vec())
            .unwrap_or_default();
        for dest in destinations {
            if let Err(e) = self.deliver(dest, effective.clone()) {
                warn!(
                    dest = ?self.tree.path_of(dest),
                    error = %e,
                    "Could not deliver to destination"
                );
            }
        }
        self.push_depth -= 1;
        Ok(PushOutcome::Accepted)
    }

    /// Call every handler registered on `entry`, in registration order
    fn notify(&mut self, entry: EntryId, sample: &DataSample) {
        let handlers = match self.tree.resource(entry) {
            Some(r) => r.handlers().snapshot(),
            None => return,
        };
        for (id, callback) in handlers {
            let registered = self
                .tree
                .resource(entry)
                .is_some_and(|r| r.handlers().contains(id));
            if !registered {
                continue;
            }
            match callback.try_borrow_mut() {
                Ok(mut callback) => {
                    let callback: &mut PushCallback = &mut **callback;
                    callback(self, sample);
                }
                Err(_) => warn!(handler = id, "Handler re-entered from its own push, skipped"),
            }
        }
    }

    /// Register a push handler with its own context value
    pub fn subscribe<C, F>(&mut self, entry: EntryId, callback: F, context: C) -> Result<HandlerRef>
    where
        C: 'static,
        F: FnMut(&mut Hub, f64, &SampleValue, &mut C) + 'static,
    {
        let id = self.next_handler_id;
        let resource = self
            .tree
            .resource_mut(entry)
            .ok_or_else(|| HubError::NotFound("resource to subscribe to".to_string()))?;
        resource
            .handlers_mut()
            .add(id, handler::with_context(callback, context));
        self.next_handler_id += 1;
        Ok(HandlerRef { entry, id })
    }

    /// Remove a push handler; removing twice is harmless
    pub fn unsubscribe(&mut self, handler: HandlerRef) {
        if let Some(resource) = self.tree.resource_mut(handler.entry) {
            if resource.handlers_mut().remove(handler.id) {
                debug!(handler = handler.id, "Push handler removed");
            }
        }
    }

    /// Effective value of an entry; `None` if it has none yet
    pub fn read(&self, entry: EntryId) -> Result<Option<SampleRef>> {
        match self.tree.entry_type(entry) {
            EntryType::None => Err(HubError::NotFound("entry no longer exists".to_string())),
            _ => Ok(self.tree.resource(entry).and_then(|r| r.read())),
        }
    }

    /// Up to `max_count` most recent samples of an observation, oldest first
    pub fn history(&mut self, entry: EntryId, max_count: usize) -> Result<Vec<SampleRef>> {
        let now = self.now();
        let obs = self
            .tree
            .observation_mut(entry)
            .ok_or_else(|| HubError::NotFound("observation".to_string()))?;
        obs.expire(now);
        Ok(obs.history(max_count))
    }

    pub fn history_since(&mut self, entry: EntryId, start_after: f64) -> Result<Vec<SampleRef>> {
        let now = self.now();
        let obs = self
            .tree
            .observation_mut(entry)
            .ok_or_else(|| HubError::NotFound("observation".to_string()))?;
        obs.expire(now);
        Ok(obs.history_since(start_after))
    }

    pub fn stats(
        &mut self,
        entry: EntryId,
        start_after: Option<f64>,
    ) -> Result<Option<BufferStats>> {
        let now = self.now();
        let obs = self
            .tree
            .observation_mut(entry)
            .ok_or_else(|| HubError::NotFound("observation".to_string()))?;
        obs.expire(now);
        Ok(obs.stats(start_after))
    }

    pub fn set_default(
        &mut self,
        entry: EntryId,
        timestamp: f64,
        value: SampleValue,
    ) -> Result<()> {
        let sample = self.new_sample(timestamp, value)?;
        self.resource_mut(entry)?.set_default(sample)
    }

    pub fn clear_default(&mut self, entry: EntryId) -> Result<()> {
        self.resource_mut(entry)?.clear_default();
        Ok(())
    }

    /// Pin the value readers and downstream consumers see
    pub fn set_override(
        &mut self,
        entry: EntryId,
        timestamp: f64,
        value: SampleValue,
    ) -> Result<()> {
        let sample = self.new_sample(timestamp, value)?;
        self.resource_mut(entry)?.set_override(sample)
    }

    pub fn clear_override(&mut self, entry: EntryId) -> Result<()> {
        self.resource_mut(entry)?.clear_override();
        Ok(())
    }

    fn resource_mut(&mut self, entry: EntryId) -> Result<&mut Resource> {
        match self.tree.entry_type(entry) {
            EntryType::None => Err(HubError::NotFound("entry no longer exists".to_string())),
            EntryType::Namespace => Err(HubError::NotPermitted(
                "a namespace holds no value".to_string(),
            )),
            _ => self
                .tree
                .resource_mut(entry)
                .ok_or_else(|| HubError::NotFound("entry holds no resource".to_string())),
        }
    }

    /// Seed a default from persistent storage, creating a Placeholder if needed
    pub fn restore_default(
        &mut self,
        path: &str,
        timestamp: f64,
        value: SampleValue,
    ) -> Result<()> {
        let root = self.tree.root();
        let entry = self.tree.get_resource(root, path)?;
        self.set_default(entry, timestamp, value)?;
        debug!(path = %path, "Default restored");
        Ok(())
    }

    /// Every default currently held, keyed by absolute path
    pub fn defaults_snapshot(&self) -> Vec<(String, SampleRef)> {
        self.tree
            .resources()
            .into_iter()
            .filter_map(|id| {
                let sample = self.tree.resource(id)?.default_value()?.clone();
                Some((self.tree.path_of(id)?, sample))
            })
            .collect()
    }

    pub fn bind_session_namespace(
        &mut self,
        session: &mut Session,
        app_identity: &str,
    ) -> Result<EntryId> {
        self.tree.bind_session_namespace(session, app_identity)
    }

    /// The session's namespace, binding it through `identity` on first use
    pub fn client_namespace(
        &mut self,
        session: &mut Session,
        identity: &dyn CallerIdentity,
    ) -> Result<EntryId> {
        if let Some(ns) = session.namespace() {
            return Ok(ns);
        }
        let app = identity.app_name(session.id()).map_err(|e| {
            warn!(session = %session.id(), error = %e, "Unable to resolve client app name");
            e
        })?;
        self.bind_session_namespace(session, &app)
    }

    /// Release whatever the session holds
    pub fn end_session(&mut self, session: &mut Session) {
        self.tree.release_session(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ExhaustionPolicy;
    use crate::session::SessionId;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn hub() -> Hub {
        let mut config = HubConfig::default();
        config.pools.exhaustion = ExhaustionPolicy::Recoverable;
        Hub::new(config).with_clock(|| 1000.0)
    }

    fn input(hub: &mut Hub, path: &str, data_type: DataType) -> EntryId {
        let root = hub.tree().root();
        hub.create_or_get(root, path, ResourceKind::Input, data_type, "")
            .unwrap()
            .0
    }

    #[test]
    fn test_handlers_called_in_registration_order() {
        let mut hub = hub();
        let entry = input(&mut hub, "/x", DataType::Numeric);
        let calls = Rc::new(RefCell::new(Vec::new()));

        for name in ["s1", "s2", "s3"] {
            let calls = calls.clone();
            hub.subscribe(
                entry,
                move |_hub: &mut Hub, ts: f64, value: &SampleValue, ctx: &mut &'static str| {
                    calls.borrow_mut().push((ctx.to_string(), ts, value.clone()))
                },
                name,
            )
            .unwrap();
        }

        hub.push(entry, 5.0, SampleValue::Numeric(1.5)).unwrap();
        let calls = calls.borrow();
        let names: Vec<&str> = calls.iter().map(|c| c.0.as_str()).collect();
        assert_eq!(names, vec!["s1", "s2", "s3"]);
        assert!(calls.iter().all(|c| c.1 == 5.0 && c.2 == SampleValue::Numeric(1.5)));
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let mut hub = hub();
        let entry = input(&mut hub, "/x", DataType::Trigger);
        let count = Rc::new(RefCell::new(0));
        let counter = count.clone();
        let handle = hub
            .subscribe(
                entry,
                move |_: &mut Hub, _: f64, _: &SampleValue, _: &mut ()| {
                    *counter.borrow_mut() += 1
                },
                (),
            )
            .unwrap();

        hub.push(entry, 1.0, SampleValue::Trigger).unwrap();
        hub.unsubscribe(handle);
        hub.unsubscribe(handle);
        hub.push(entry, 2.0, SampleValue::Trigger).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_handler_can_push_further() {
        let mut hub = hub();
        let celsius = input(&mut hub, "/c", DataType::Numeric);
        let root = hub.tree().root();
        let (fahrenheit, _) = hub
            .create_or_get(root, "/f", ResourceKind::Output, DataType::Numeric, "degF")
            .unwrap();

        hub.subscribe(
            celsius,
            |hub: &mut Hub, ts: f64, value: &SampleValue, target: &mut EntryId| {
                if let Some(c) = value.as_numeric() {
                    hub.push(*target, ts, SampleValue::Numeric(c * 9.0 / 5.0 + 32.0))
                        .unwrap();
                }
            },
            fahrenheit,
        )
        .unwrap();

        hub.push(celsius, 1.0, SampleValue::Numeric(100.0)).unwrap();
        let f = hub.read(fahrenheit).unwrap().unwrap();
        assert_eq!(f.value(), &SampleValue::Numeric(212.0));
    }

    #[test]
    fn test_handler_removed_during_dispatch_is_skipped() {
        let mut hub = hub();
        let entry = input(&mut hub, "/x", DataType::Trigger);
        let second_called = Rc::new(RefCell::new(false));
        let victim: Rc<RefCell<Option<HandlerRef>>> = Rc::new(RefCell::new(None));

        let slot = victim.clone();
        hub.subscribe(
            entry,
            move |hub: &mut Hub, _: f64, _: &SampleValue, _: &mut ()| {
                if let Some(h) = *slot.borrow() {
                    hub.unsubscribe(h);
                }
            },
            (),
        )
        .unwrap();
        let flag = second_called.clone();
        let second = hub
            .subscribe(
                entry,
                move |_: &mut Hub, _: f64, _: &SampleValue, _: &mut ()| {
                    *flag.borrow_mut() = true
                },
                (),
            )
            .unwrap();
        *victim.borrow_mut() = Some(second);

        hub.push(entry, 1.0, SampleValue::Trigger).unwrap();
        assert!(!*second_called.borrow());
    }

    #[test]
    fn test_type_mismatch_rejected_without_mutation() {
        let mut hub = hub();
        let entry = input(&mut hub, "/n", DataType::Numeric);
        hub.push(entry, 1.0, SampleValue::Numeric(3.0)).unwrap();
        let err = hub.push(entry, 2.0, SampleValue::String("x".into())).unwrap_err();
        assert!(matches!(err, HubError::TypeMismatch { .. }));
        assert_eq!(hub.read(entry).unwrap().unwrap().timestamp(), 1.0);
    }

    #[test]
    fn test_zero_timestamp_means_now() {
        let mut hub = hub();
        let entry = input(&mut hub, "/t", DataType::Boolean);
        hub.push(entry, 0.0, SampleValue::Boolean(true)).unwrap();
        assert_eq!(hub.read(entry).unwrap().unwrap().timestamp(), 1000.0);
    }

    #[test]
    fn test_observation_filters_between_input_and_consumers() {
        let mut hub = hub();
        let raw = input(&mut hub, "/app/s/raw", DataType::Numeric);
        let obs = hub
            .create_observation(
                "/obs/smooth",
                DataType::Numeric,
                "",
                ObservationConfig {
                    change_by: Some(2.0),
                    max_count: 10,
                    ..Default::default()
                },
            )
            .unwrap();
        hub.set_source("/obs/smooth", "/app/s/raw").unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        hub.subscribe(
            obs,
            move |_: &mut Hub, _: f64, v: &SampleValue, _: &mut ()| {
                sink.borrow_mut().push(v.as_numeric().unwrap_or(f64::NAN))
            },
            (),
        )
        .unwrap();

        for (i, v) in [1.0, 2.0, 3.0, 3.5, 6.0].iter().enumerate() {
            hub.push(raw, (i + 1) as f64, SampleValue::Numeric(*v)).unwrap();
        }
        assert_eq!(*seen.borrow(), vec![1.0, 3.0, 6.0]);
        assert_eq!(hub.history(obs, 100).unwrap().len(), 3);
        assert_eq!(hub.read(raw).unwrap().unwrap().value(), &SampleValue::Numeric(6.0));
    }

    #[test]
    fn test_override_propagates_instead_of_pushed_value() {
        let mut hub = hub();
        let entry = input(&mut hub, "/x", DataType::Numeric);
        hub.set_override(entry, 1.0, SampleValue::Numeric(42.0)).unwrap();
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        hub.subscribe(
            entry,
            move |_: &mut Hub, _: f64, v: &SampleValue, _: &mut ()| {
                *sink.borrow_mut() = Some(v.clone())
            },
            (),
        )
        .unwrap();

        hub.push(entry, 2.0, SampleValue::Numeric(7.0)).unwrap();
        assert_eq!(*seen.borrow(), Some(SampleValue::Numeric(42.0)));
        assert_eq!(hub.read(entry).unwrap().unwrap().value(), &SampleValue::Numeric(42.0));
        hub.clear_override(entry).unwrap();
        assert_eq!(hub.read(entry).unwrap().unwrap().value(), &SampleValue::Numeric(7.0));
    }

    #[test]
    fn test_push_depth_is_capped() {
        let mut config = HubConfig::default();
        config.max_push_depth = 3;
        let mut hub = Hub::new(config);
        let root = hub.tree().root();
        let mut chain = Vec::new();
        for name in ["/a", "/b", "/c", "/d"] {
            chain.push(
                hub.create_or_get(root, name, ResourceKind::Output, DataType::Trigger, "")
                    .unwrap()
                    .0,
            );
        }
        hub.set_source("/b", "/a").unwrap();
        hub.set_source("/c", "/b").unwrap();
        hub.set_source("/d", "/c").unwrap();

        hub.push(chain[0], 1.0, SampleValue::Trigger).unwrap();
        assert!(hub.read(chain[2]).unwrap().is_some());
        assert!(hub.read(chain[3]).unwrap().is_none());
    }

    #[test]
    fn test_defaults_restore_and_snapshot() {
        let mut hub = hub();
        hub.restore_default("/app/sensor/period", 1.0, SampleValue::Numeric(0.5))
            .unwrap();
        let period = hub.resolve("/app/sensor/period").unwrap();
        assert_eq!(hub.tree().entry_type(period), EntryType::Placeholder);

        let root = hub.tree().root();
        let (id, how) = hub
            .create_or_get(root, "/app/sensor/period", ResourceKind::Output, DataType::Numeric, "s")
            .unwrap();
        assert_eq!((id, how), (period, Created::Promoted));
        assert_eq!(hub.read(id).unwrap().unwrap().value(), &SampleValue::Numeric(0.5));

        let snapshot = hub.defaults_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, "/app/sensor/period");
    }

    #[test]
    fn test_client_namespace_resolved_once() {
        let mut hub = hub();
        let mut session = Session::new();
        let lookups = Rc::new(RefCell::new(0));
        let counter = lookups.clone();
        let identity = move |_: SessionId| -> Result<String> {
            *counter.borrow_mut() += 1;
            Ok("sensor".to_string())
        };

        let ns = hub.client_namespace(&mut session, &identity).unwrap();
        assert_eq!(hub.client_namespace(&mut session, &identity).unwrap(), ns);
        assert_eq!(*lookups.borrow(), 1);
        assert_eq!(hub.tree().path_of(ns).unwrap(), "/app/sensor");
    }

    #[test]
    fn test_namespace_pinned_until_session_ends() {
        let mut hub = hub();
        let mut session = Session::new();
        let ns = hub.bind_session_namespace(&mut session, "sensor").unwrap();

        assert!(matches!(hub.delete(ns), Err(HubError::NotPermitted(_))));
        hub.end_session(&mut session);
        assert!(session.namespace().is_none());
        hub.delete(ns).unwrap();
        assert!(!hub.tree().contains(ns));
    }

    #[test]
    fn test_sample_pool_exhaustion_is_recoverable() {
        let mut config = HubConfig::default();
        config.pools.max_samples = 2;
        config.pools.exhaustion = ExhaustionPolicy::Recoverable;
        let mut hub = Hub::new(config);
        let root = hub.tree().root();
        let (entry, _) = hub
            .create_or_get(root, "/o", ResourceKind::Observation, DataType::Numeric, "")
            .unwrap();

        hub.push(entry, 1.0, SampleValue::Numeric(1.0)).unwrap();
        hub.push(entry, 2.0, SampleValue::Numeric(2.0)).unwrap();
        assert_eq!(
            hub.push(entry, 3.0, SampleValue::Numeric(3.0)).unwrap_err(),
            HubError::OutOfMemory("samples")
        );
    }
}
