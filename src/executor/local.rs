//! The single-threaded reference executor.

use log::info;

use crate::backend::BackendConnection;
use crate::error::Result;
use crate::executor::Executor;
use crate::graph::{GraphSnapshot, Node};

/// Walks the snapshot's nodes in topological order, linking raw partitions
/// and building only the producer partitions whose input fingerprints are
/// not already present. Rerunning an unchanged snapshot is a no-op.
#[derive(Debug, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> LocalExecutor {
        LocalExecutor
    }
}

impl Executor for LocalExecutor {
    fn build(&self, snapshot: &GraphSnapshot<'_>) -> Result<()> {
        let graph = snapshot.graph;
        let mut connection = graph.backend().connect()?;
        connection.write_graph(&crate::backend::GraphRecord {
            name: graph.name().to_string(),
            fingerprint: graph.fingerprint(),
        })?;
        connection.write_snapshot(&snapshot.record())?;

        for node in graph.topological_order() {
            match *node {
                Node::Artifact(id) => {
                    let artifact = graph.artifact(id);
                    if artifact.is_raw() {
                        // Raw partitions were captured at snapshot time;
                        // produced ones are linked by their producer below.
                        info!("Syncing '{}'...", graph.artifact_key(id));
                        connection.write_snapshot_partitions(
                            snapshot.snapshot_id,
                            graph.artifact_key(id),
                            artifact,
                            snapshot.raw_partitions(id),
                        )?;
                    }
                }
                Node::Producer(id) => {
                    info!("Building {}...", graph.producer(id).name());
                    let input_partitions =
                        self.get_producer_inputs(snapshot, &connection, id)?;
                    let (partition_dependencies, input_fingerprints) =
                        graph.producer(id).compute_dependencies(&input_partitions)?;
                    let existing_keys = self.discover_producer_partitions(
                        snapshot,
                        &mut connection,
                        id,
                        &input_fingerprints,
                    )?;
                    for (partition_key, dependency_partitions) in &partition_dependencies {
                        self.build_producer_partition(
                            snapshot,
                            &mut connection,
                            id,
                            partition_key,
                            dependency_partitions,
                            input_fingerprints[partition_key],
                            &existing_keys,
                        )?;
                    }
                }
            }
        }
        info!("Build finished.");
        Ok(())
    }
}
