//! Metadata store contract.
//!
//! A `Backend` tracks, over time: artifact partitions (keyed by storage),
//! snapshot-partition linkage, graph and snapshot records, and named snapshot
//! tags. Connections are scoped acquisitions; dropping one releases it on
//! every exit path.

use crate::artifact::Artifact;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::partition::InputFingerprints;
use crate::storage::StoragePartition;

pub mod memory;

pub use memory::{MemoryBackend, MemoryConnection};

/// Persisted snapshot metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub graph_name: String,
    pub snapshot_id: Fingerprint,
    pub graph_fingerprint: Fingerprint,
}

/// Persisted graph metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphRecord {
    pub name: String,
    pub fingerprint: Fingerprint,
}

/// The operations every backend connection supports.
pub trait BackendConnection {
    /// All known partitions for this artifact's storage. When
    /// `input_fingerprints` is non-empty, only partitions whose
    /// `(keys, input_fingerprint)` pair is expected are returned.
    fn read_artifact_partitions(
        &self,
        artifact: &Artifact,
        input_fingerprints: &InputFingerprints,
    ) -> Result<Vec<StoragePartition>>;

    /// Record partitions for this artifact's storage: a deduplicated union
    /// with whatever is already known. Every partition must have (or be able
    /// to compute) its content fingerprint.
    fn write_artifact_partitions(
        &mut self,
        artifact: &Artifact,
        partitions: &[StoragePartition],
    ) -> Result<()>;

    /// Partitions linked into a snapshot under an artifact's key.
    fn read_snapshot_partitions(
        &self,
        snapshot_id: Fingerprint,
        artifact_key: &str,
        artifact: &Artifact,
    ) -> Result<Vec<StoragePartition>>;

    /// Link partitions into a snapshot under an artifact's key.
    fn write_snapshot_partitions(
        &mut self,
        snapshot_id: Fingerprint,
        artifact_key: &str,
        artifact: &Artifact,
        partitions: &[StoragePartition],
    ) -> Result<()>;

    fn read_snapshot(&self, graph_name: &str, snapshot_id: Fingerprint) -> Result<SnapshotRecord>;

    fn write_snapshot(&mut self, snapshot: &SnapshotRecord) -> Result<()>;

    /// Resolve a named pointer to a snapshot id.
    fn read_snapshot_tag(&self, graph_name: &str, tag: &str) -> Result<Fingerprint>;

    /// Point a named tag at a snapshot. Retargeting an existing tag requires
    /// `overwrite`.
    fn write_snapshot_tag(
        &mut self,
        graph_name: &str,
        tag: &str,
        snapshot_id: Fingerprint,
        overwrite: bool,
    ) -> Result<()>;

    fn read_graph(&self, name: &str, fingerprint: Fingerprint) -> Result<GraphRecord>;

    fn write_graph(&mut self, graph: &GraphRecord) -> Result<()>;
}

/// Backend factories, enum-dispatched.
#[derive(Clone, Debug)]
pub enum Backend {
    Memory(MemoryBackend),
}

impl Backend {
    pub fn memory() -> Backend {
        Backend::Memory(MemoryBackend::new())
    }

    pub fn connect(&self) -> Result<Connection> {
        match self {
            Backend::Memory(backend) => Ok(Connection::Memory(backend.connect())),
        }
    }
}

/// An open backend connection.
pub enum Connection {
    Memory(MemoryConnection),
}

impl BackendConnection for Connection {
    fn read_artifact_partitions(
        &self,
        artifact: &Artifact,
        input_fingerprints: &InputFingerprints,
    ) -> Result<Vec<StoragePartition>> {
        match self {
            Connection::Memory(connection) => {
                connection.read_artifact_partitions(artifact, input_fingerprints)
            }
        }
    }

    fn write_artifact_partitions(
        &mut self,
        artifact: &Artifact,
        partitions: &[StoragePartition],
    ) -> Result<()> {
        match self {
            Connection::Memory(connection) => {
                connection.write_artifact_partitions(artifact, partitions)
            }
        }
    }

    fn read_snapshot_partitions(
        &self,
        snapshot_id: Fingerprint,
        artifact_key: &str,
        artifact: &Artifact,
    ) -> Result<Vec<StoragePartition>> {
        match self {
            Connection::Memory(connection) => {
                connection.read_snapshot_partitions(snapshot_id, artifact_key, artifact)
            }
        }
    }

    fn write_snapshot_partitions(
        &mut self,
        snapshot_id: Fingerprint,
        artifact_key: &str,
        artifact: &Artifact,
        partitions: &[StoragePartition],
    ) -> Result<()> {
        match self {
            Connection::Memory(connection) => {
                connection.write_snapshot_partitions(snapshot_id, artifact_key, artifact, partitions)
            }
        }
    }

    fn read_snapshot(&self, graph_name: &str, snapshot_id: Fingerprint) -> Result<SnapshotRecord> {
        match self {
            Connection::Memory(connection) => connection.read_snapshot(graph_name, snapshot_id),
        }
    }

    fn write_snapshot(&mut self, snapshot: &SnapshotRecord) -> Result<()> {
        match self {
            Connection::Memory(connection) => connection.write_snapshot(snapshot),
        }
    }

    fn read_snapshot_tag(&self, graph_name: &str, tag: &str) -> Result<Fingerprint> {
        match self {
            Connection::Memory(connection) => connection.read_snapshot_tag(graph_name, tag),
        }
    }

    fn write_snapshot_tag(
        &mut self,
        graph_name: &str,
        tag: &str,
        snapshot_id: Fingerprint,
        overwrite: bool,
    ) -> Result<()> {
        match self {
            Connection::Memory(connection) => {
                connection.write_snapshot_tag(graph_name, tag, snapshot_id, overwrite)
            }
        }
    }

    fn read_graph(&self, name: &str, fingerprint: Fingerprint) -> Result<GraphRecord> {
        match self {
            Connection::Memory(connection) => connection.read_graph(name, fingerprint),
        }
    }

    fn write_graph(&mut self, graph: &GraphRecord) -> Result<()> {
        match self {
            Connection::Memory(connection) => connection.write_graph(graph),
        }
    }
}
