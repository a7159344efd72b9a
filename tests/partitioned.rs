//! Partitioned discovery and per-partition incremental builds.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use maplit::btreemap;

use artigraph::producer::PartitionDependencies;
use artigraph::{
    Artifact, ArtifactId, Backend, BackendConnection, Executor, Format, Graph, InputFingerprints,
    LocalExecutor, PartitionKey, Producer, Storage, Type, View,
};

fn spend_type() -> Type {
    Type::collection(
        Type::structure(
            "spend",
            vec![("i".to_string(), Type::int64()), ("v".to_string(), Type::int64())],
        ),
        vec!["i".to_string()],
        vec![],
    )
    .unwrap()
}

fn write_partition(dir: &std::path::Path, i: i64, v: i64) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(format!("{}.json", i)),
        serde_json::to_vec(&serde_json::json!([{"i": i, "v": v}])).unwrap(),
    )
    .unwrap();
}

struct DoubleGraph {
    graph: Graph,
    ds: ArtifactId,
    out: ArtifactId,
    calls: Arc<AtomicUsize>,
}

/// A raw partitioned collection and a producer that doubles `v`, one output
/// partition per input partition.
fn double_graph(dir: &std::path::Path, backend: Backend) -> DoubleGraph {
    let mut builder = Graph::builder("spend").with_backend(backend);
    let ds = builder
        .add(
            "ds",
            Artifact::new(
                spend_type(),
                Format::json(),
                Storage::local_file(&format!("{}/raw/{{i.key}}.{{extension}}", dir.display()))
                    .unwrap(),
            )
            .unwrap(),
        )
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let build_calls = calls.clone();
    let producer = Producer::builder("double")
        .input("ds", ds, View::read(spend_type()))
        .map(&["ds"], |inputs| {
            let mut dependencies = PartitionDependencies::new();
            for partition in &inputs["ds"] {
                dependencies.insert(
                    partition.keys().clone(),
                    btreemap! {"ds".to_string() => vec![partition.clone()]},
                );
            }
            Ok(dependencies)
        })
        .build(move |args| {
            build_calls.fetch_add(1, Ordering::SeqCst);
            let rows = args["ds"].as_array().expect("collection reads as an array");
            let doubled: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    serde_json::json!({
                        "i": row["i"],
                        "v": row["v"].as_i64().unwrap() * 2,
                    })
                })
                .collect();
            Ok(vec![serde_json::Value::Array(doubled)])
        })
        .output(View::write(spend_type()))
        .finish()
        .unwrap();
    let out = builder
        .produce_single(
            "doubled",
            Artifact::new(
                spend_type(),
                Format::json(),
                Storage::local_file(&format!(
                    "{}/doubled/{{i.key}}/{{input_fingerprint}}.{{extension}}",
                    dir.display()
                ))
                .unwrap(),
            )
            .unwrap(),
            producer,
        )
        .unwrap();
    DoubleGraph { graph: builder.finish().unwrap(), ds, out, calls }
}

#[test]
fn test_partitioned_discovery_through_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    write_partition(&dir.path().join("raw"), 1, 10);
    write_partition(&dir.path().join("raw"), 2, 20);

    let setup = double_graph(dir.path(), Backend::memory());
    let snapshot = setup.graph.snapshot().unwrap();

    let partitions = snapshot.raw_partitions(setup.ds);
    assert_eq!(partitions.len(), 2);
    let keys: BTreeSet<_> = partitions.iter().map(|partition| partition.keys().clone()).collect();
    assert_eq!(
        keys,
        vec![
            btreemap! {"i".to_string() => PartitionKey::Int64(1)},
            btreemap! {"i".to_string() => PartitionKey::Int64(2)},
        ]
        .into_iter()
        .collect(),
    );

    LocalExecutor::new().build(&snapshot).unwrap();
    let connection = setup.graph.backend().connect().unwrap();
    let rows = snapshot.read(&connection, setup.ds, &View::read(spend_type())).unwrap();
    assert_eq!(rows, serde_json::json!([{"i": 1, "v": 10}, {"i": 2, "v": 20}]));
}

#[test]
fn test_per_partition_incremental_build() {
    let dir = tempfile::tempdir().unwrap();
    write_partition(&dir.path().join("raw"), 1, 10);
    write_partition(&dir.path().join("raw"), 2, 20);

    let setup = double_graph(dir.path(), Backend::memory());
    let snapshot = setup.graph.snapshot().unwrap();
    LocalExecutor::new().build(&snapshot).unwrap();
    assert_eq!(setup.calls.load(Ordering::SeqCst), 2);

    let connection = setup.graph.backend().connect().unwrap();
    let rows = snapshot.read(&connection, setup.out, &View::read(spend_type())).unwrap();
    assert_eq!(rows, serde_json::json!([{"i": 1, "v": 20}, {"i": 2, "v": 40}]));
    drop(connection);

    // A new raw partition only builds the new output partition.
    write_partition(&dir.path().join("raw"), 3, 30);
    let changed = setup.graph.snapshot().unwrap();
    assert_ne!(changed.snapshot_id, snapshot.snapshot_id);
    LocalExecutor::new().build(&changed).unwrap();
    assert_eq!(setup.calls.load(Ordering::SeqCst), 3);

    let connection = setup.graph.backend().connect().unwrap();
    let rows = snapshot.read(&connection, setup.out, &View::read(spend_type())).unwrap();
    assert_eq!(rows, serde_json::json!([{"i": 1, "v": 20}, {"i": 2, "v": 40}]));
    let rows = connection
        .read_artifact_partitions(setup.graph.artifact(setup.out), &InputFingerprints::new())
        .unwrap();
    assert_eq!(rows.len(), 3);

    // Rebuilding the changed snapshot stays a no-op.
    LocalExecutor::new().build(&changed).unwrap();
    assert_eq!(setup.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_map_returning_no_keys_builds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_partition(&dir.path().join("raw"), 1, 10);

    let mut builder = Graph::builder("spend").with_backend(Backend::memory());
    let ds = builder
        .add(
            "ds",
            Artifact::new(
                spend_type(),
                Format::json(),
                Storage::local_file(&format!("{}/raw/{{i.key}}.json", dir.path().display()))
                    .unwrap(),
            )
            .unwrap(),
        )
        .unwrap();
    let producer = Producer::builder("never")
        .input("ds", ds, View::read(spend_type()))
        .map(&["ds"], |_| Ok(PartitionDependencies::new()))
        .build(|_| panic!("map returned no keys, build must not run"))
        .output(View::write(spend_type()))
        .finish()
        .unwrap();
    let out = builder
        .produce_single(
            "out",
            Artifact::new(
                spend_type(),
                Format::json(),
                Storage::local_file(&format!(
                    "{}/out/{{i.key}}/{{input_fingerprint}}.json",
                    dir.path().display()
                ))
                .unwrap(),
            )
            .unwrap(),
            producer,
        )
        .unwrap();
    let graph = builder.finish().unwrap();

    let snapshot = graph.snapshot().unwrap();
    LocalExecutor::new().build(&snapshot).unwrap();

    let connection = graph.backend().connect().unwrap();
    assert!(connection
        .read_artifact_partitions(graph.artifact(out), &InputFingerprints::new())
        .unwrap()
        .is_empty());
}
