//! Executors: drivers that materialize a `GraphSnapshot`.

use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::backend::{BackendConnection, Connection};
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::graph::{GraphSnapshot, ProducerId};
use crate::io::Datum;
use crate::partition::{display_composite_key, CompositeKey, InputFingerprints};
use crate::producer::{InputPartitions, StoragePartitions};

pub mod local;

pub use local::LocalExecutor;

/// The shared producer-build steps; `build` supplies the driving strategy.
pub trait Executor {
    fn build(&self, snapshot: &GraphSnapshot<'_>) -> Result<()>;

    /// Load each declared input's partitions, scoped to this snapshot.
    fn get_producer_inputs(
        &self,
        snapshot: &GraphSnapshot<'_>,
        connection: &Connection,
        producer_id: ProducerId,
    ) -> Result<InputPartitions> {
        let graph = snapshot.graph;
        let producer = graph.producer(producer_id);
        let mut inputs = InputPartitions::new();
        for input in producer.inputs() {
            let partitions = connection.read_snapshot_partitions(
                snapshot.snapshot_id,
                graph.artifact_key(input.artifact),
                graph.artifact(input.artifact),
            )?;
            inputs.insert(input.name.clone(), partitions);
        }
        Ok(inputs)
    }

    /// Find output partitions that are already built for the expected input
    /// fingerprints and link them into the snapshot. Returns the composite
    /// keys that need no rebuild.
    ///
    /// The partitions may exist but not yet be associated with this snapshot
    /// (eg: raw data changed without trickling into this producer), so the
    /// lookup goes against all partitions of each output's storage.
    fn discover_producer_partitions(
        &self,
        snapshot: &GraphSnapshot<'_>,
        connection: &mut Connection,
        producer_id: ProducerId,
        input_fingerprints: &InputFingerprints,
    ) -> Result<BTreeSet<CompositeKey>> {
        let graph = snapshot.graph;
        let mut existing_keys = BTreeSet::new();
        for output in graph.producer_outputs(producer_id) {
            let artifact = graph.artifact(*output);
            let existing = connection.read_artifact_partitions(artifact, input_fingerprints)?;
            connection.write_snapshot_partitions(
                snapshot.snapshot_id,
                graph.artifact_key(*output),
                artifact,
                &existing,
            )?;
            existing_keys.extend(existing.iter().map(|partition| partition.keys().clone()));
        }
        Ok(existing_keys)
    }

    /// Build one output partition: read the dependency partitions into the
    /// declared views, invoke `build`, validate, and persist every output.
    ///
    /// Returns whether the partition was actually built (false = skipped).
    fn build_producer_partition(
        &self,
        snapshot: &GraphSnapshot<'_>,
        connection: &mut Connection,
        producer_id: ProducerId,
        partition_key: &CompositeKey,
        dependency_partitions: &BTreeMap<String, StoragePartitions>,
        input_fingerprint: Fingerprint,
        existing_keys: &BTreeSet<CompositeKey>,
    ) -> Result<bool> {
        let graph = snapshot.graph;
        let producer = graph.producer(producer_id);
        if existing_keys.contains(partition_key) {
            info!(
                "Skipping existing {} output for ({})",
                producer.name(),
                display_composite_key(partition_key)
            );
            return Ok(false);
        }
        info!(
            "Building {} output for ({}) and inputs {}...",
            producer.name(),
            display_composite_key(partition_key),
            input_fingerprint
        );
        let mut arguments: BTreeMap<String, Datum> = BTreeMap::new();
        for input in producer.build_inputs() {
            let view = input.view.as_ref().expect("build inputs carry a view");
            let partitions = dependency_partitions.get(&input.name).ok_or_else(|| {
                Error::Validation(format!(
                    "{}.map did not provide partitions for '{}'",
                    producer.name(),
                    input.name
                ))
            })?;
            arguments.insert(
                input.name.clone(),
                snapshot.read_partitions(input.artifact, partitions, view)?,
            );
        }
        let outputs = producer.run_build(&arguments)?;
        let (passed, message) = producer.run_validate(&outputs);
        if !passed {
            return Err(Error::BuildValidation {
                producer: producer.name().to_string(),
                keys: display_composite_key(partition_key),
                input_fingerprint,
                message,
            });
        }
        for (position, output) in outputs.iter().enumerate() {
            let artifact_id = graph.producer_outputs(producer_id)[position];
            snapshot.write(
                connection,
                output,
                artifact_id,
                partition_key,
                input_fingerprint,
                &producer.outputs()[position],
            )?;
        }
        Ok(true)
    }
}
