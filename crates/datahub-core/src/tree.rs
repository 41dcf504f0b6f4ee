//! Resource tree: the hub's hierarchical namespace
//!
//! Entries live in a generational arena. An [`EntryId`] stays valid for as
//! long as its entry exists, including across promotion from Placeholder to
//! a typed resource; once the entry is deleted, the id resolves to nothing
//! even if its slot is reused.

use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::{HubError, Result};
use crate::observation::{Observation, ObservationConfig};
use crate::path;
use crate::pool::{Pool, PoolLease};
use crate::resource::{validate_units, Resource};
use crate::sample::DataType;
use crate::session::Session;

/// Name of the namespace holding one child namespace per client app
pub const APP_NAMESPACE: &str = "app";

/// Stable handle to a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
    index: u32,
    generation: u32,
}

/// Kind of a tree entry as shown to admin tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    None,
    Namespace,
    Placeholder,
    Input,
    Output,
    Observation,
}

impl EntryType {
    pub fn name(&self) -> &'static str {
        match self {
            EntryType::None => "** none **",
            EntryType::Namespace => "namespace",
            EntryType::Placeholder => "placeholder",
            EntryType::Input => "input",
            EntryType::Output => "output",
            EntryType::Observation => "observation",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed resource variants that can be created explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Input,
    Output,
    Observation,
}

impl From<ResourceKind> for EntryType {
    fn from(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Input => EntryType::Input,
            ResourceKind::Output => EntryType::Output,
            ResourceKind::Observation => EntryType::Observation,
        }
    }
}

/// How `create_or_get` satisfied the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    /// A new entry was added to the tree
    Fresh,
    /// An existing Namespace or Placeholder was turned into the resource
    Promoted,
    /// A resource of the same kind, type and units was already there
    Existing,
}

#[derive(Debug)]
pub(crate) enum EntryKind {
    Namespace,
    Placeholder(Resource),
    Input(Resource),
    Output(Resource),
    Observation(Box<Observation>),
}

impl EntryKind {
    fn entry_type(&self) -> EntryType {
        match self {
            EntryKind::Namespace => EntryType::Namespace,
            EntryKind::Placeholder(_) => EntryType::Placeholder,
            EntryKind::Input(_) => EntryType::Input,
            EntryKind::Output(_) => EntryType::Output,
            EntryKind::Observation(_) => EntryType::Observation,
        }
    }

    fn resource(&self) -> Option<&Resource> {
        match self {
            EntryKind::Namespace => None,
            EntryKind::Placeholder(r) | EntryKind::Input(r) | EntryKind::Output(r) => Some(r),
            EntryKind::Observation(obs) => Some(obs.resource()),
        }
    }

    fn resource_mut(&mut self) -> Option<&mut Resource> {
        match self {
            EntryKind::Namespace => None,
            EntryKind::Placeholder(r) | EntryKind::Input(r) | EntryKind::Output(r) => Some(r),
            EntryKind::Observation(obs) => Some(obs.resource_mut()),
        }
    }

    fn into_resource(self) -> Option<Resource> {
        match self {
            EntryKind::Namespace => None,
            EntryKind::Placeholder(r) | EntryKind::Input(r) | EntryKind::Output(r) => Some(r),
            EntryKind::Observation(obs) => Some(obs.into_resource()),
        }
    }

    fn typed(kind: ResourceKind, resource: Resource) -> Self {
        match kind {
            ResourceKind::Input => EntryKind::Input(resource),
            ResourceKind::Output => EntryKind::Output(resource),
            ResourceKind::Observation => EntryKind::Observation(Box::new(Observation::new(
                resource,
                ObservationConfig::default(),
            ))),
        }
    }
}

#[derive(Debug)]
struct Node {
    name: String,
    parent: Option<EntryId>,
    children: BTreeMap<String, EntryId>,
    kind: EntryKind,
    /// Session bindings holding this entry
    pins: u32,
    _lease: Option<PoolLease>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug)]
pub struct ResourceTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: EntryId,
    pool: Pool,
}

impl ResourceTree {
    /// Create a tree holding only the root namespace
    ///
    /// The root does not count against `pool`.
    pub fn new(pool: Pool) -> Self {
        let root_node = Node {
            name: String::new(),
            parent: None,
            children: BTreeMap::new(),
            kind: EntryKind::Namespace,
            pins: 1,
            _lease: None,
        };
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(root_node),
            }],
            free: Vec::new(),
            root: EntryId {
                index: 0,
                generation: 0,
            },
            pool,
        }
    }

    pub fn root(&self) -> EntryId {
        self.root
    }

    /// Number of entries, root included
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.node(id).is_ok()
    }

    fn node(&self, id: EntryId) -> Result<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
            .ok_or_else(|| HubError::NotFound("entry no longer exists".to_string()))
    }

    fn node_mut(&mut self, id: EntryId) -> Result<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or_else(|| HubError::NotFound("entry no longer exists".to_string()))
    }

    pub(crate) fn kind_mut(&mut self, id: EntryId) -> Result<&mut EntryKind> {
        Ok(&mut self.node_mut(id)?.kind)
    }

    /// `EntryType::None` for a handle whose entry is gone
    pub fn entry_type(&self, id: EntryId) -> EntryType {
        self.node(id)
            .map(|n| n.kind.entry_type())
            .unwrap_or(EntryType::None)
    }

    pub fn name(&self, id: EntryId) -> Option<&str> {
        self.node(id).ok().map(|n| n.name.as_str())
    }

    pub fn parent(&self, id: EntryId) -> Option<EntryId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    /// Children in name order
    pub fn children(&self, id: EntryId) -> Vec<EntryId> {
        self.node(id)
            .map(|n| n.children.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn child(&self, id: EntryId, name: &str) -> Option<EntryId> {
        self.node(id).ok().and_then(|n| n.children.get(name).copied())
    }

    /// Absolute path of an entry; the root is "/"
    pub fn path_of(&self, id: EntryId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = id;
        while current != self.root {
            let node = self.node(current).ok()?;
            names.push(node.name.as_str());
            current = node.parent?;
        }
        names.reverse();
        Some(format!("/{}", names.join("/")))
    }

    pub fn resource(&self, id: EntryId) -> Option<&Resource> {
        self.node(id).ok().and_then(|n| n.kind.resource())
    }

    pub fn resource_mut(&mut self, id: EntryId) -> Option<&mut Resource> {
        self.node_mut(id).ok().and_then(|n| n.kind.resource_mut())
    }

    pub fn observation(&self, id: EntryId) -> Option<&Observation> {
        match &self.node(id).ok()?.kind {
            EntryKind::Observation(obs) => Some(obs),
            _ => None,
        }
    }

    pub fn observation_mut(&mut self, id: EntryId) -> Option<&mut Observation> {
        match &mut self.node_mut(id).ok()?.kind {
            EntryKind::Observation(obs) => Some(obs),
            _ => None,
        }
    }

    /// Every entry that carries a resource, depth first in name order
    pub fn resources(&self) -> Vec<EntryId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Ok(node) = self.node(id) {
                if node.kind.resource().is_some() {
                    found.push(id);
                }
                stack.extend(node.children.values().rev().copied());
            }
        }
        found
    }

    fn start(&self, anchor: EntryId, path: &str) -> EntryId {
        if path::is_absolute(path) {
            self.root
        } else {
            anchor
        }
    }

    /// Look up an existing entry
    pub fn resolve(&self, anchor: EntryId, path: &str) -> Result<EntryId> {
        path::validate(path)?;
        let mut current = self.start(anchor, path);
        self.node(current)?;
        for name in path::segments(path) {
            current = self
                .child(current, name)
                .ok_or_else(|| HubError::NotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Look up an entry, creating missing segments as Namespaces
    pub fn get_entry(&mut self, anchor: EntryId, path: &str) -> Result<EntryId> {
        path::validate(path)?;
        let start = self.start(anchor, path);
        self.node(start)?;
        let names: Vec<&str> = path::segments(path).collect();
        let mut created = Vec::new();
        let entry = self.create_namespaces(start, &names, &mut created);
        if entry.is_err() {
            self.roll_back(created);
        }
        entry
    }

    /// Look up a resource, creating it as a Placeholder if needed
    ///
    /// A Namespace found at the path becomes a Placeholder in place, unless a
    /// session has it bound.
    pub fn get_resource(&mut self, anchor: EntryId, path: &str) -> Result<EntryId> {
        let mut created = Vec::new();
        let (parent, name) = self.split_leaf(anchor, path, &mut created)?;
        let id = match self.child(parent, &name) {
            Some(id) => id,
            None => {
                let placeholder = EntryKind::Placeholder(Resource::placeholder());
                let inserted = self.insert(parent, &name, placeholder);
                if inserted.is_err() {
                    self.roll_back(created);
                }
                return inserted;
            }
        };
        let node = self.node_mut(id)?;
        if matches!(node.kind, EntryKind::Namespace) {
            if node.pins > 0 {
                return Err(HubError::NotPermitted(format!(
                    "'{}' is bound to a client session",
                    path
                )));
            }
            debug!(name = %name, "Namespace replaced by placeholder");
            node.kind = EntryKind::Placeholder(Resource::placeholder());
        }
        Ok(id)
    }

    /// Create a typed resource, or confirm that an identical one exists
    pub fn create_or_get(
        &mut self,
        anchor: EntryId,
        path: &str,
        kind: ResourceKind,
        data_type: DataType,
        units: &str,
    ) -> Result<(EntryId, Created)> {
        validate_units(units)?;
        let mut created = Vec::new();
        let (parent, name) = self.split_leaf(anchor, path, &mut created)?;

        let id = match self.child(parent, &name) {
            Some(id) => id,
            None => {
                let typed = EntryKind::typed(kind, Resource::new(data_type, units));
                let id = match self.insert(parent, &name, typed) {
                    Ok(id) => id,
                    Err(e) => {
                        self.roll_back(created);
                        return Err(e);
                    }
                };
                debug!(
                    path = %path,
                    kind = %EntryType::from(kind),
                    data_type = %data_type,
                    "Resource created"
                );
                return Ok((id, Created::Fresh));
            }
        };

        let node = self.node_mut(id)?;
        let existing = node.kind.entry_type();
        if let (true, Some(resource)) = (existing == EntryType::from(kind), node.kind.resource()) {
            return if resource.matches(data_type, units) {
                Ok((id, Created::Existing))
            } else {
                Err(HubError::Duplicate(format!(
                    "'{}' exists as {} with type {} and units '{}'",
                    path,
                    existing,
                    resource.data_type().map_or("none", |t| t.name()),
                    resource.units()
                )))
            };
        }

        match existing {
            EntryType::Namespace if node.pins > 0 => Err(HubError::NotPermitted(format!(
                "'{}' is bound to a client session",
                path
            ))),
            EntryType::Namespace | EntryType::Placeholder => {
                let old = std::mem::replace(&mut node.kind, EntryKind::Namespace);
                let mut resource = old.into_resource().unwrap_or_default();
                resource.promote(data_type, units);
                node.kind = EntryKind::typed(kind, resource);
                debug!(
                    path = %path,
                    from = %existing,
                    to = %EntryType::from(kind),
                    "Entry promoted"
                );
                if kind == ResourceKind::Input {
                    self.unlink_source(id);
                }
                Ok((id, Created::Promoted))
            }
            _ => Err(HubError::Duplicate(format!(
                "'{}' exists as {}",
                path, existing
            ))),
        }
    }

    /// Validate a path and create its parent chain; returns (parent, leaf name)
    ///
    /// Namespaces created here are appended to `created` so a caller that
    /// fails later can take them back out.
    fn split_leaf(
        &mut self,
        anchor: EntryId,
        path: &str,
        created: &mut Vec<EntryId>,
    ) -> Result<(EntryId, String)> {
        path::validate(path)?;
        let names: Vec<&str> = path::segments(path).collect();
        let (leaf, parents) = names
            .split_last()
            .ok_or_else(|| HubError::MalformedPath("empty resource path".to_string()))?;
        let start = self.start(anchor, path);
        self.node(start)?;
        match self.create_namespaces(start, parents, created) {
            Ok(parent) => Ok((parent, leaf.to_string())),
            Err(e) => {
                self.roll_back(std::mem::take(created));
                Err(e)
            }
        }
    }

    /// Walk `names` below `start`, inserting missing ones as Namespaces
    fn create_namespaces(
        &mut self,
        start: EntryId,
        names: &[&str],
        created: &mut Vec<EntryId>,
    ) -> Result<EntryId> {
        let mut current = start;
        for name in names {
            current = match self.child(current, name) {
                Some(child) => child,
                None => {
                    let id = self.insert(current, name, EntryKind::Namespace)?;
                    created.push(id);
                    id
                }
            };
        }
        Ok(current)
    }

    /// Remove entries a failed operation inserted, deepest first
    fn roll_back(&mut self, created: Vec<EntryId>) {
        for id in created.into_iter().rev() {
            if let Some(removed) = self.remove(id) {
                debug!(name = %removed.name, "Rolled back partial creation");
            }
        }
    }

    fn insert(&mut self, parent: EntryId, name: &str, kind: EntryKind) -> Result<EntryId> {
        let lease = self.pool.acquire()?;
        let node = Node {
            name: name.to_string(),
            parent: Some(parent),
            children: BTreeMap::new(),
            kind,
            pins: 0,
            _lease: Some(lease),
        };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                EntryId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                EntryId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.node_mut(parent)?.children.insert(name.to_string(), id);
        Ok(id)
    }

    fn remove(&mut self, id: EntryId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        if let Some(parent) = node.parent {
            if let Ok(p) = self.node_mut(parent) {
                p.children.remove(&node.name);
            }
        }
        Some(node)
    }

    /// Delete an entry and reclaim ancestors left empty
    ///
    /// A resource that still has children is turned into a Namespace instead
    /// of being removed.
    pub fn delete(&mut self, id: EntryId) -> Result<()> {
        if id == self.root {
            return Err(HubError::NotPermitted("the root cannot be deleted".to_string()));
        }
        let node = self.node(id)?;
        if node.pins > 0 {
            return Err(HubError::NotPermitted(format!(
                "'{}' is bound to a client session",
                node.name
            )));
        }
        let is_namespace = matches!(node.kind, EntryKind::Namespace);
        if is_namespace && !node.children.is_empty() {
            return Err(HubError::NotPermitted(format!(
                "namespace '{}' has children",
                node.name
            )));
        }

        self.unlink_source(id);
        let destinations = self
            .resource_mut(id)
            .map(|r| r.take_destinations())
            .unwrap_or_default();
        for dest in destinations {
            if let Some(r) = self.resource_mut(dest) {
                r.set_source_link(None);
            }
        }

        let node = self.node_mut(id)?;
        if !node.children.is_empty() {
            node.kind = EntryKind::Namespace;
            debug!(name = %node.name, "Resource with children demoted to namespace");
            return Ok(());
        }

        let parent = node.parent;
        if let Some(removed) = self.remove(id) {
            debug!(name = %removed.name, kind = %removed.kind.entry_type(), "Entry deleted");
        }
        if let Some(parent) = parent {
            self.prune(parent);
        }
        Ok(())
    }

    /// Walk up from `id`, removing empty Namespaces and bare Placeholders
    fn prune(&mut self, mut id: EntryId) {
        while id != self.root {
            let Ok(node) = self.node(id) else { return };
            let reclaimable = node.children.is_empty()
                && node.pins == 0
                && match &node.kind {
                    EntryKind::Namespace => true,
                    EntryKind::Placeholder(r) => !r.has_admin_settings(),
                    _ => false,
                };
            if !reclaimable {
                return;
            }
            let parent = node.parent;
            if let Some(removed) = self.remove(id) {
                debug!(name = %removed.name, "Empty ancestor reclaimed");
            }
            match parent {
                Some(p) => id = p,
                None => return,
            }
        }
    }

    /// Route samples accepted by `source` into `dest`
    pub fn set_source(&mut self, dest: EntryId, source: EntryId) -> Result<()> {
        match self.entry_type(dest) {
            EntryType::None => return Err(HubError::NotFound("destination".to_string())),
            EntryType::Namespace => {
                return Err(HubError::NotPermitted("a namespace cannot have a source".to_string()))
            }
            EntryType::Input => {
                return Err(HubError::NotPermitted("an input cannot have a source".to_string()))
            }
            _ => {}
        }
        if self.resource(source).is_none() {
            return Err(HubError::NotFound("source resource".to_string()));
        }

        // Refuse loops: dest must not already feed source.
        let mut upstream = Some(source);
        while let Some(current) = upstream {
            if current == dest {
                return Err(HubError::Duplicate("source would create a loop".to_string()));
            }
            upstream = self.resource(current).and_then(|r| r.source());
        }

        self.unlink_source(dest);
        if let Some(r) = self.resource_mut(source) {
            r.add_destination(dest);
        }
        if let Some(r) = self.resource_mut(dest) {
            r.set_source_link(Some(source));
        }
        Ok(())
    }

    /// Detach `id` from its source, if it has one
    pub fn unlink_source(&mut self, id: EntryId) {
        let Some(source) = self.resource(id).and_then(|r| r.source()) else {
            return;
        };
        if let Some(r) = self.resource_mut(source) {
            r.remove_destination(id);
        }
        if let Some(r) = self.resource_mut(id) {
            r.set_source_link(None);
        }
    }

    /// Bind a session to its `/app/<app_identity>` namespace, creating it if needed
    pub fn bind_session_namespace(
        &mut self,
        session: &mut Session,
        app_identity: &str,
    ) -> Result<EntryId> {
        if session.namespace().is_some() {
            return Err(HubError::Duplicate(format!(
                "session {} already has a namespace",
                session.id()
            )));
        }
        if app_identity.is_empty() || app_identity.contains('/') {
            return Err(HubError::MalformedPath(format!(
                "app name '{}' is not a single path element",
                app_identity
            )));
        }
        let apps = self.get_entry(self.root, APP_NAMESPACE)?;
        let ns = self.get_entry(apps, app_identity)?;
        self.node_mut(ns)?.pins += 1;
        session.bind(ns);
        debug!(session = %session.id(), app = %app_identity, "Session namespace bound");
        Ok(ns)
    }

    /// Drop a session's hold on its namespace
    pub fn release_session(&mut self, session: &mut Session) {
        if let Some(ns) = session.unbind() {
            if let Ok(node) = self.node_mut(ns) {
                node.pins = node.pins.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ExhaustionPolicy;

    fn tree() -> ResourceTree {
        ResourceTree::new(Pool::new("entries", 64, ExhaustionPolicy::Recoverable))
    }

    #[test]
    fn test_idempotent_typed_creation() {
        let mut t = tree();
        let root = t.root();
        let (id, how) = t
            .create_or_get(root, "sensor/temp", ResourceKind::Input, DataType::Numeric, "degC")
            .unwrap();
        assert_eq!(how, Created::Fresh);

        let (again, how) = t
            .create_or_get(root, "sensor/temp", ResourceKind::Input, DataType::Numeric, "degC")
            .unwrap();
        assert_eq!((again, how), (id, Created::Existing));

        for (kind, data_type, units) in [
            (ResourceKind::Input, DataType::String, "degC"),
            (ResourceKind::Input, DataType::Numeric, "K"),
            (ResourceKind::Output, DataType::Numeric, "degC"),
            (ResourceKind::Observation, DataType::Numeric, "degC"),
        ] {
            let err = t.create_or_get(root, "sensor/temp", kind, data_type, units).unwrap_err();
            assert!(matches!(err, HubError::Duplicate(_)));
        }
        assert!(t.resource(id).unwrap().matches(DataType::Numeric, "degC"));
        assert_eq!(t.entry_type(id), EntryType::Input);
    }

    #[test]
    fn test_intermediate_segments_are_namespaces() {
        let mut t = tree();
        let root = t.root();
        let (id, _) = t
            .create_or_get(root, "/a/b/c", ResourceKind::Output, DataType::Boolean, "")
            .unwrap();
        let b = t.resolve(root, "a/b").unwrap();
        assert_eq!(t.entry_type(b), EntryType::Namespace);
        assert_eq!(t.parent(id), Some(b));
        assert_eq!(t.path_of(id).unwrap(), "/a/b/c");
        assert_eq!(t.resolve(b, "c").unwrap(), id);
    }

    #[test]
    fn test_resolve_not_found_and_malformed() {
        let t = tree();
        assert!(matches!(t.resolve(t.root(), "nope"), Err(HubError::NotFound(_))));
        assert!(matches!(t.resolve(t.root(), "a..b"), Err(HubError::MalformedPath(_))));
        assert_eq!(t.resolve(t.root(), "").unwrap(), t.root());
    }

    #[test]
    fn test_resolution_is_case_sensitive() {
        let mut t = tree();
        let root = t.root();
        t.get_entry(root, "Sensor").unwrap();
        assert!(t.resolve(root, "sensor").is_err());
    }

    #[test]
    fn test_placeholder_promotion_keeps_identity() {
        let mut t = tree();
        let root = t.root();
        let ph = t.get_resource(root, "x/y").unwrap();
        assert_eq!(t.entry_type(ph), EntryType::Placeholder);
        t.resource_mut(ph)
            .unwrap()
            .handlers_mut()
            .add(7, Box::new(|_, _| {}));

        let (id, how) = t
            .create_or_get(root, "x/y", ResourceKind::Input, DataType::Numeric, "m")
            .unwrap();
        assert_eq!((id, how), (ph, Created::Promoted));
        assert_eq!(t.entry_type(id), EntryType::Input);
        assert!(t.resource(id).unwrap().handlers().contains(7));
    }

    #[test]
    fn test_namespace_becomes_placeholder() {
        let mut t = tree();
        let root = t.root();
        let ns = t.get_entry(root, "grp").unwrap();
        t.get_entry(ns, "child").unwrap();
        assert_eq!(t.get_resource(root, "grp").unwrap(), ns);
        assert_eq!(t.entry_type(ns), EntryType::Placeholder);
        assert_eq!(t.children(ns).len(), 1);
    }

    #[test]
    fn test_delete_prunes_empty_ancestors() {
        let mut t = tree();
        let root = t.root();
        let (keep, _) = t
            .create_or_get(root, "a/keep", ResourceKind::Input, DataType::Trigger, "")
            .unwrap();
        let (gone, _) = t
            .create_or_get(root, "a/b/c/gone", ResourceKind::Input, DataType::Trigger, "")
            .unwrap();

        t.delete(gone).unwrap();
        assert_eq!(t.entry_type(gone), EntryType::None);
        assert!(t.resolve(root, "a/b").is_err());
        let a = t.resolve(root, "a").unwrap();
        assert_eq!(t.children(a), vec![keep]);
    }

    #[test]
    fn test_delete_namespace_with_children_fails() {
        let mut t = tree();
        let root = t.root();
        t.create_or_get(root, "ns/leaf", ResourceKind::Input, DataType::Trigger, "")
            .unwrap();
        let ns = t.resolve(root, "ns").unwrap();
        assert!(matches!(t.delete(ns), Err(HubError::NotPermitted(_))));
        assert!(t.delete(root).is_err());
    }

    #[test]
    fn test_delete_resource_with_children_demotes() {
        let mut t = tree();
        let root = t.root();
        let (parent, _) = t
            .create_or_get(root, "p", ResourceKind::Output, DataType::Numeric, "")
            .unwrap();
        t.create_or_get(root, "p/q", ResourceKind::Input, DataType::Numeric, "")
            .unwrap();
        t.delete(parent).unwrap();
        assert_eq!(t.entry_type(parent), EntryType::Namespace);
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut t = tree();
        let root = t.root();
        let (old, _) = t
            .create_or_get(root, "r", ResourceKind::Input, DataType::Numeric, "")
            .unwrap();
        t.delete(old).unwrap();
        let (new, how) = t
            .create_or_get(root, "r", ResourceKind::Input, DataType::Numeric, "")
            .unwrap();
        assert_eq!(how, Created::Fresh);
        assert_ne!(old, new);
        assert!(!t.contains(old));
        assert!(t.resource(old).is_none());
    }

    #[test]
    fn test_source_loops_refused() {
        let mut t = tree();
        let root = t.root();
        let (input, _) = t
            .create_or_get(root, "in", ResourceKind::Input, DataType::Numeric, "")
            .unwrap();
        let (a, _) = t
            .create_or_get(root, "a", ResourceKind::Observation, DataType::Numeric, "")
            .unwrap();
        let (b, _) = t
            .create_or_get(root, "b", ResourceKind::Observation, DataType::Numeric, "")
            .unwrap();

        t.set_source(a, input).unwrap();
        t.set_source(b, a).unwrap();
        assert!(matches!(t.set_source(a, b), Err(HubError::Duplicate(_))));
        assert!(matches!(t.set_source(input, b), Err(HubError::NotPermitted(_))));

        t.delete(a).unwrap();
        assert!(t.resource(b).unwrap().source().is_none());
        assert!(t.resource(input).unwrap().destinations().is_empty());
    }

    #[test]
    fn test_session_binding_once() {
        let mut t = tree();
        let mut session = Session::new();
        let ns = t.bind_session_namespace(&mut session, "sensor").unwrap();
        assert_eq!(t.path_of(ns).unwrap(), "/app/sensor");
        assert!(matches!(
            t.bind_session_namespace(&mut session, "sensor"),
            Err(HubError::Duplicate(_))
        ));

        // A bound namespace survives deletion of its last child.
        let (leaf, _) = t
            .create_or_get(ns, "counter", ResourceKind::Input, DataType::Numeric, "")
            .unwrap();
        t.delete(leaf).unwrap();
        assert!(t.contains(ns));

        t.release_session(&mut session);
        assert!(session.namespace().is_none());
        t.delete(ns).unwrap();
    }

    #[test]
    fn test_entry_pool_exhaustion() {
        let mut t = ResourceTree::new(Pool::new("entries", 2, ExhaustionPolicy::Recoverable));
        let root = t.root();
        t.get_entry(root, "a/b").unwrap();
        assert_eq!(t.get_entry(root, "c").unwrap_err(), HubError::OutOfMemory("entries"));
    }

    #[test]
    fn test_failed_creation_leaves_no_namespaces() {
        let mut t = ResourceTree::new(Pool::new("entries", 2, ExhaustionPolicy::Recoverable));
        let root = t.root();

        let err = t
            .create_or_get(root, "a/b/leaf", ResourceKind::Input, DataType::Numeric, "")
            .unwrap_err();
        assert_eq!(err, HubError::OutOfMemory("entries"));
        assert_eq!(t.len(), 1);
        assert!(t.resolve(root, "a").is_err());

        assert!(t.get_resource(root, "x/y/leaf").is_err());
        assert!(t.get_entry(root, "x/y/z").is_err());
        assert_eq!(t.len(), 1);
        assert_eq!(t.pool().in_use(), 0);

        // Existing ancestors are left alone.
        let x = t.get_entry(root, "x").unwrap();
        assert!(t.get_entry(x, "y/z").is_err());
        assert!(t.contains(x));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_bound_namespace_is_not_promoted() {
        let mut t = tree();
        let root = t.root();
        let mut session = Session::new();
        let ns = t.bind_session_namespace(&mut session, "sensor").unwrap();

        let err = t
            .create_or_get(root, "/app/sensor", ResourceKind::Input, DataType::Numeric, "")
            .unwrap_err();
        assert!(matches!(err, HubError::NotPermitted(_)));
        assert!(matches!(
            t.get_resource(root, "/app/sensor"),
            Err(HubError::NotPermitted(_))
        ));
        assert_eq!(t.entry_type(ns), EntryType::Namespace);

        t.release_session(&mut session);
        assert_eq!(t.get_resource(root, "/app/sensor").unwrap(), ns);
        assert_eq!(t.entry_type(ns), EntryType::Placeholder);
    }

    #[test]
    fn test_entry_type_names() {
        assert_eq!(EntryType::None.name(), "** none **");
        assert_eq!(EntryType::Placeholder.to_string(), "placeholder");
        assert_eq!(EntryType::Observation.name(), "observation");
    }
}
