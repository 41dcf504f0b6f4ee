//! Client sessions and caller identity
//!
//! A [`Session`] is the per-client context passed into every client
//! operation. It caches the client's `/app/<name>` namespace once bound.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::Result;
use crate::tree::EntryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-client context
///
/// Binding pins the namespace so it is never pruned or deleted. The pin is
/// held by the tree, not by this value: a session must be handed to
/// [`Hub::end_session`](crate::Hub::end_session) when the client goes away,
/// otherwise its namespace stays pinned for the life of the hub.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    namespace: Option<EntryId>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            namespace: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The bound namespace, if any
    pub fn namespace(&self) -> Option<EntryId> {
        self.namespace
    }

    pub(crate) fn bind(&mut self, namespace: EntryId) {
        self.namespace = Some(namespace);
    }

    pub(crate) fn unbind(&mut self) -> Option<EntryId> {
        self.namespace.take()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a session to the name of the app behind it
pub trait CallerIdentity {
    fn app_name(&self, session: SessionId) -> Result<String>;
}

impl<F> CallerIdentity for F
where
    F: Fn(SessionId) -> Result<String>,
{
    fn app_name(&self, session: SessionId) -> Result<String> {
        self(session)
    }
}
