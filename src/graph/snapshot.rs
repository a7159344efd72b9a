//! Graph snapshots: a sealed Graph plus the content identity of its raw
//! inputs at a point in time.

use std::collections::BTreeMap;

use crate::backend::{BackendConnection, Connection, SnapshotRecord};
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::graph::{ArtifactId, Graph};
use crate::io::{self, Datum};
use crate::partition::{CompositeKey, InputFingerprints};
use crate::storage::StoragePartition;
use crate::view::View;

/// An immutable capture of a Graph and its raw partitions. Executors and
/// backends work against snapshots, never open graphs.
#[derive(Debug)]
pub struct GraphSnapshot<'g> {
    pub graph: &'g Graph,
    pub snapshot_id: Fingerprint,
    raw_partitions: BTreeMap<ArtifactId, Vec<StoragePartition>>,
}

impl Graph {
    /// Capture a snapshot: discover every raw artifact's partitions and fold
    /// the snapshot id from the graph, its named artifacts and producers,
    /// and the raw partition contents.
    pub fn snapshot(&self) -> Result<GraphSnapshot<'_>> {
        let mut snapshot_id = self.fingerprint();
        for (key, id) in self.named_artifacts() {
            snapshot_id = snapshot_id
                .combine(Fingerprint::from_string(key))
                .combine(self.artifact(id).fingerprint());
        }
        for id in self.producer_ids() {
            snapshot_id = snapshot_id.combine(self.producer(id).fingerprint());
        }

        let mut raw_partitions = BTreeMap::new();
        for (key, id) in self.named_artifacts() {
            let artifact = self.artifact(id);
            if !artifact.is_raw() {
                continue;
            }
            let partitions = artifact
                .storage
                .discover_partitions(&artifact.partition_key_types()?, &InputFingerprints::new())?;
            if partitions.is_empty() {
                return Err(Error::MissingData(format!(
                    "No data (partitions) found for '{}'",
                    key
                )));
            }
            for partition in &partitions {
                snapshot_id = snapshot_id.combine(partition.content_fingerprint());
            }
            raw_partitions.insert(id, partitions);
        }

        Ok(GraphSnapshot { graph: self, snapshot_id, raw_partitions })
    }
}

impl<'g> GraphSnapshot<'g> {
    pub fn record(&self) -> SnapshotRecord {
        SnapshotRecord {
            graph_name: self.graph.name().to_string(),
            snapshot_id: self.snapshot_id,
            graph_fingerprint: self.graph.fingerprint(),
        }
    }

    /// The raw partitions captured when this snapshot was taken.
    pub fn raw_partitions(&self, id: ArtifactId) -> &[StoragePartition] {
        self.raw_partitions.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Read an artifact through `view`, scoped to the partitions linked to
    /// this snapshot.
    pub fn read(&self, connection: &Connection, id: ArtifactId, view: &View) -> Result<Datum> {
        let artifact = self.graph.artifact(id);
        let partitions = connection.read_snapshot_partitions(
            self.snapshot_id,
            self.graph.artifact_key(id),
            artifact,
        )?;
        self.read_partitions(id, &partitions, view)
    }

    /// Read specific partitions of an artifact through `view`.
    pub fn read_partitions(
        &self,
        id: ArtifactId,
        partitions: &[StoragePartition],
        view: &View,
    ) -> Result<Datum> {
        let artifact = self.graph.artifact(id);
        if partitions.is_empty() {
            return Err(Error::MissingData(format!(
                "No data (partitions) found for '{}'",
                self.graph.artifact_key(id)
            )));
        }
        io::read(&artifact.type_, &artifact.format, partitions, view)
    }

    /// Write one output partition and link it into this snapshot.
    ///
    /// Raw artifacts are rejected: their contents participate in the
    /// snapshot id, so writing them would change this snapshot's identity.
    pub fn write(
        &self,
        connection: &mut Connection,
        data: &Datum,
        id: ArtifactId,
        keys: &CompositeKey,
        input_fingerprint: Fingerprint,
        view: &View,
    ) -> Result<StoragePartition> {
        let artifact = self.graph.artifact(id);
        if artifact.is_raw() {
            return Err(Error::Validation(format!(
                "Writing to raw artifact '{}' within a snapshot is not supported, as it would change the snapshot id",
                self.graph.artifact_key(id)
            )));
        }
        let partition = artifact.storage.generate_partition(keys, input_fingerprint, false)?;
        let written = io::write(data, &artifact.type_, &artifact.format, &partition, view)?;
        connection.write_artifact_partitions(artifact, &[written.clone()])?;
        connection.write_snapshot_partitions(
            self.snapshot_id,
            self.graph.artifact_key(id),
            artifact,
            &[written.clone()],
        )?;
        Ok(written)
    }
}
