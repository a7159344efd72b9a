//! The reference in-memory backend. It satisfies every connection contract
//! and serves as the testing oracle for alternate backends.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use crate::artifact::Artifact;
use crate::backend::{BackendConnection, GraphRecord, SnapshotRecord};
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::partition::{display_composite_key, InputFingerprints};
use crate::storage::StoragePartition;

#[derive(Debug, Default)]
struct MemoryState {
    // Storage fingerprint -> all known partitions for that storage.
    artifact_partitions: BTreeMap<Fingerprint, Vec<StoragePartition>>,
    // (snapshot id, artifact key) -> linked partition fingerprints.
    snapshot_partitions: BTreeMap<(Fingerprint, String), BTreeSet<Fingerprint>>,
    snapshots: BTreeMap<(String, Fingerprint), SnapshotRecord>,
    tags: BTreeMap<(String, String), Fingerprint>,
    graphs: BTreeMap<(String, Fingerprint), GraphRecord>,
}

/// Shared-state backend; cloning shares the underlying store, as separate
/// connections to one database would.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }

    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection { state: self.state.clone() }
    }
}

pub struct MemoryConnection {
    state: Arc<RwLock<MemoryState>>,
}

impl BackendConnection for MemoryConnection {
    fn read_artifact_partitions(
        &self,
        artifact: &Artifact,
        input_fingerprints: &InputFingerprints,
    ) -> Result<Vec<StoragePartition>> {
        let state = self.state.read().expect("memory backend poisoned");
        let partitions = state
            .artifact_partitions
            .get(&artifact.storage.fingerprint())
            .cloned()
            .unwrap_or_default();
        if input_fingerprints.is_empty() {
            return Ok(partitions);
        }
        Ok(partitions
            .into_iter()
            .filter(|partition| {
                input_fingerprints.get(partition.keys()) == Some(&partition.input_fingerprint())
            })
            .collect())
    }

    fn write_artifact_partitions(
        &mut self,
        artifact: &Artifact,
        partitions: &[StoragePartition],
    ) -> Result<()> {
        let mut incoming = Vec::with_capacity(partitions.len());
        for partition in partitions {
            incoming.push(partition.with_content_fingerprint(true)?);
        }
        // Two partitions for the same (keys, input fingerprint) with
        // disagreeing contents cannot be recorded in one batch.
        for (i, a) in incoming.iter().enumerate() {
            for b in &incoming[i + 1..] {
                if a.keys() == b.keys()
                    && a.input_fingerprint() == b.input_fingerprint()
                    && a.content_fingerprint() != b.content_fingerprint()
                {
                    return Err(Error::Backend(format!(
                        "Conflicting partitions for ({}) with input fingerprint {}",
                        display_composite_key(a.keys()),
                        a.input_fingerprint()
                    )));
                }
            }
        }
        let mut state = self.state.write().expect("memory backend poisoned");
        let known = state
            .artifact_partitions
            .entry(artifact.storage.fingerprint())
            .or_default();
        // Careful about deduping, otherwise we might have dup reads.
        let seen: BTreeSet<Fingerprint> = known.iter().map(StoragePartition::fingerprint).collect();
        for partition in incoming {
            if !seen.contains(&partition.fingerprint()) {
                known.push(partition);
            }
        }
        Ok(())
    }

    fn read_snapshot_partitions(
        &self,
        snapshot_id: Fingerprint,
        artifact_key: &str,
        artifact: &Artifact,
    ) -> Result<Vec<StoragePartition>> {
        let state = self.state.read().expect("memory backend poisoned");
        let linked = match state
            .snapshot_partitions
            .get(&(snapshot_id, artifact_key.to_string()))
        {
            Some(linked) => linked,
            None => return Ok(vec![]),
        };
        let known = state
            .artifact_partitions
            .get(&artifact.storage.fingerprint())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Ok(known
            .iter()
            .filter(|partition| linked.contains(&partition.fingerprint()))
            .cloned()
            .collect())
    }

    fn write_snapshot_partitions(
        &mut self,
        snapshot_id: Fingerprint,
        artifact_key: &str,
        artifact: &Artifact,
        partitions: &[StoragePartition],
    ) -> Result<()> {
        // Ensure the partitions themselves are recorded before linking.
        self.write_artifact_partitions(artifact, partitions)?;
        let mut fingerprints = Vec::with_capacity(partitions.len());
        for partition in partitions {
            fingerprints.push(partition.with_content_fingerprint(true)?.fingerprint());
        }
        let mut state = self.state.write().expect("memory backend poisoned");
        state
            .snapshot_partitions
            .entry((snapshot_id, artifact_key.to_string()))
            .or_default()
            .extend(fingerprints);
        Ok(())
    }

    fn read_snapshot(&self, graph_name: &str, snapshot_id: Fingerprint) -> Result<SnapshotRecord> {
        let state = self.state.read().expect("memory backend poisoned");
        state
            .snapshots
            .get(&(graph_name.to_string(), snapshot_id))
            .cloned()
            .ok_or_else(|| {
                Error::Backend(format!(
                    "Unknown snapshot {} of graph '{}'",
                    snapshot_id, graph_name
                ))
            })
    }

    fn write_snapshot(&mut self, snapshot: &SnapshotRecord) -> Result<()> {
        let mut state = self.state.write().expect("memory backend poisoned");
        state
            .snapshots
            .insert((snapshot.graph_name.clone(), snapshot.snapshot_id), snapshot.clone());
        Ok(())
    }

    fn read_snapshot_tag(&self, graph_name: &str, tag: &str) -> Result<Fingerprint> {
        let state = self.state.read().expect("memory backend poisoned");
        state
            .tags
            .get(&(graph_name.to_string(), tag.to_string()))
            .copied()
            .ok_or_else(|| {
                Error::Backend(format!("Unknown tag '{}' for graph '{}'", tag, graph_name))
            })
    }

    fn write_snapshot_tag(
        &mut self,
        graph_name: &str,
        tag: &str,
        snapshot_id: Fingerprint,
        overwrite: bool,
    ) -> Result<()> {
        let mut state = self.state.write().expect("memory backend poisoned");
        let key = (graph_name.to_string(), tag.to_string());
        if let Some(existing) = state.tags.get(&key) {
            if *existing != snapshot_id && !overwrite {
                return Err(Error::Backend(format!(
                    "Tag '{}' already points at snapshot {}",
                    tag, existing
                )));
            }
        }
        state.tags.insert(key, snapshot_id);
        Ok(())
    }

    fn read_graph(&self, name: &str, fingerprint: Fingerprint) -> Result<GraphRecord> {
        let state = self.state.read().expect("memory backend poisoned");
        state
            .graphs
            .get(&(name.to_string(), fingerprint))
            .cloned()
            .ok_or_else(|| Error::Backend(format!("Unknown graph '{}' ({})", name, fingerprint)))
    }

    fn write_graph(&mut self, graph: &GraphRecord) -> Result<()> {
        let mut state = self.state.write().expect("memory backend poisoned");
        state
            .graphs
            .insert((graph.name.clone(), graph.fingerprint), graph.clone());
        Ok(())
    }
}
