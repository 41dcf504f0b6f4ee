//! Data Hub Core - Resource tree, observations and push dispatch
//!
//! This crate provides the data-routing core of the Data Hub:
//! - Data samples: immutable, timestamped, typed values shared by reference
//! - Resource tree: hierarchical namespace of Namespaces, Placeholders,
//!   Inputs, Outputs and Observations
//! - Observations: filtered, buffered resources interposed between producers
//!   and consumers
//! - Push dispatch: synchronous, ordered notification of subscribers
//! - Client sessions bound to their `/app/<name>` namespace
//!
//! Everything runs on one thread: an operation, including every push it
//! triggers, completes before the next one starts.

pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod io;
pub mod observation;
pub mod path;
pub mod pool;
pub mod resource;
pub mod sample;
pub mod session;
pub mod tree;

pub use config::{HubConfig, PoolConfig};
pub use error::{HubError, Result};
pub use handler::HandlerRef;
pub use hub::Hub;
pub use observation::{BufferStats, ObservationConfig, PushOutcome, RejectReason};
pub use pool::ExhaustionPolicy;
pub use sample::{DataSample, DataType, SampleRef, SampleValue};
pub use session::{CallerIdentity, Session, SessionId};
pub use tree::{Created, EntryId, EntryType, ResourceKind, ResourceTree};
