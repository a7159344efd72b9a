//! Artigraph is a declarative engine for data pipelines: users describe a
//! graph of [`Artifact`]s (typed datasets in some storage) and [`Producer`]s
//! (pure functions building Artifacts from other Artifacts), and the engine
//! resolves, fingerprints, and incrementally materializes that graph,
//! reusing previously computed partitions whenever their inputs are
//! unchanged.
//!
//! The pieces compose as follows:
//! - a [`GraphBuilder`](graph::GraphBuilder) assembles artifacts and
//!   producers and seals them into an acyclic [`Graph`];
//! - [`Graph::snapshot`] captures the graph plus the content
//!   [`Fingerprint`]s of every raw input partition;
//! - an [`Executor`](executor::Executor), given a snapshot and a
//!   [`Backend`](backend::Backend) connection, walks the nodes in
//!   topological order and builds only the partitions whose per-partition
//!   input fingerprints are not already present.

pub mod artifact;
pub mod backend;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod format;
pub mod graph;
pub mod io;
pub mod partition;
pub mod producer;
pub mod storage;
pub mod types;
pub mod version;
pub mod view;

pub use crate::artifact::{Annotation, Artifact, ProducerOutput, Statistic};
pub use crate::backend::{Backend, BackendConnection, Connection};
pub use crate::error::{Error, Result};
pub use crate::executor::{Executor, LocalExecutor};
pub use crate::fingerprint::Fingerprint;
pub use crate::format::Format;
pub use crate::graph::{ArtifactId, Graph, GraphBuilder, GraphSnapshot, Node, ProducerId};
pub use crate::io::Datum;
pub use crate::partition::{
    CompositeKey, CompositeKeyTypes, InputFingerprints, PartitionKey, PartitionKeyType,
};
pub use crate::producer::{Producer, ProducerBuilder};
pub use crate::storage::{Storage, StoragePartition};
pub use crate::types::{Type, TypeKind, TypeSystem};
pub use crate::version::Version;
pub use crate::view::{Access, Representation, View};
