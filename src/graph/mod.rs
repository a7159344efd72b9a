//! Graph assembly and sealed-graph queries.
//!
//! A `GraphBuilder` owns the artifact and producer arenas while the graph is
//! open; `finish` seals it into an immutable `Graph` whose dependency DAG has
//! been cycle-checked and whose derived queries are memoized.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;

use crate::artifact::{Artifact, ProducerOutput};
use crate::backend::{Backend, BackendConnection};
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::io::{self, Datum};
use crate::partition::{CompositeKey, InputFingerprints};
use crate::producer::Producer;
use crate::storage::StoragePartition;
use crate::types::rust::LiteralValue;
use crate::view::View;

pub mod snapshot;

pub use snapshot::GraphSnapshot;

/// Arena handle for an Artifact within one Graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId(pub(crate) usize);

/// Arena handle for a Producer within one Graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProducerId(pub(crate) usize);

/// A node of the dependency graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Node {
    Artifact(ArtifactId),
    Producer(ProducerId),
}

/// Note: relations are directed from the dependency to the dependent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Relation {
    /// The source artifact is consumed by the target producer as the named
    /// input.
    ConsumedBy(String),
    /// The target artifact is produced by the source producer at the given
    /// output position.
    Produces(usize),
}

type DependencyDag = daggy::Dag<Node, Relation, petgraph::graph::DefaultIx>;

#[derive(Debug, Default)]
struct Namespace {
    children: BTreeMap<String, Namespace>,
    leaf: Option<ArtifactId>,
}

impl Namespace {
    fn put(&mut self, path: &str, segments: &[&str], id: ArtifactId) -> Result<()> {
        let (head, tail) = segments.split_first().expect("validated non-empty path");
        let child = self.children.entry((*head).to_string()).or_default();
        if tail.is_empty() {
            if child.leaf.is_some() {
                return Err(Error::Definition(format!(
                    "'{}' is already assigned an artifact",
                    path
                )));
            }
            if !child.children.is_empty() {
                return Err(Error::Definition(format!(
                    "'{}' is already a namespace and cannot hold an artifact",
                    path
                )));
            }
            child.leaf = Some(id);
            return Ok(());
        }
        if child.leaf.is_some() {
            return Err(Error::Definition(format!(
                "'{}' nests under '{}', which is already an artifact",
                path, head
            )));
        }
        child.put(path, tail, id)
    }
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if path.is_empty() || segments.iter().any(|segment| segment.is_empty()) {
        return Err(Error::Definition(format!("Invalid artifact path: '{}'", path)));
    }
    Ok(segments)
}

/// Assembles a Graph. The builder is the single owner of the open graph, so
/// no other holder can observe it before sealing.
pub struct GraphBuilder {
    name: String,
    backend: Backend,
    path_tags: BTreeMap<String, String>,
    artifacts: Vec<Artifact>,
    producers: Vec<Producer>,
    outputs_by_producer: Vec<Vec<ArtifactId>>,
    namespace: Namespace,
    paths: BTreeMap<String, ArtifactId>,
}

impl GraphBuilder {
    pub fn new<S: Into<String>>(name: S) -> GraphBuilder {
        GraphBuilder {
            name: name.into(),
            backend: Backend::memory(),
            path_tags: BTreeMap::new(),
            artifacts: Vec::new(),
            producers: Vec::new(),
            outputs_by_producer: Vec::new(),
            namespace: Namespace::default(),
            paths: BTreeMap::new(),
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_path_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.path_tags.insert(key.into(), value.into());
        self
    }

    /// Add an artifact under a dotted path, resolving the storage template
    /// against the graph name, the name chain, the path tags, and the
    /// format's extension.
    pub fn add(&mut self, path: &str, artifact: Artifact) -> Result<ArtifactId> {
        if artifact.producer_output().is_some() {
            return Err(Error::Definition(format!(
                "'{}': produced artifacts are bound through produce()",
                path
            )));
        }
        let segments = split_path(path)?;
        let names: Vec<String> = segments.iter().map(|s| (*s).to_string()).collect();
        let mut artifact = artifact;
        artifact.storage = artifact
            .storage
            .resolve_graph_name(&self.name)
            .resolve_names(&names)
            .resolve_path_tags(&self.path_tags)
            .resolve_extension(artifact.format.extension());

        let id = ArtifactId(self.artifacts.len());
        self.namespace.put(path, &segments, id)?;
        self.paths.insert(path.to_string(), id);
        self.artifacts.push(artifact);
        Ok(id)
    }

    /// Cast a host scalar to a literal artifact and add it.
    pub fn literal<T: LiteralValue>(&mut self, path: &str, value: T) -> Result<ArtifactId> {
        self.add(path, Artifact::cast(value)?)
    }

    /// Bind a producer to already-added output artifacts, position by
    /// position against the producer's declared outputs.
    pub fn produce_into(&mut self, outputs: &[ArtifactId], producer: Producer) -> Result<ProducerId> {
        let expected = producer.outputs().len();
        if outputs.len() != expected {
            return Err(Error::Resolution(format!(
                "{}.out() expected {} output artifact(s), got {}. Multi-output producers must be destructured.",
                producer.name(),
                expected,
                outputs.len()
            )));
        }
        for input in producer.inputs() {
            let artifact = self.artifact_checked(input.artifact, producer.name())?;
            if let Some(ref view) = input.view {
                view.check_artifact_compatibility(artifact).map_err(|e| {
                    Error::Validation(format!("{}.{}: {}", producer.name(), input.name, e))
                })?;
            }
        }
        let id = ProducerId(self.producers.len());
        for (position, artifact_id) in outputs.iter().enumerate() {
            let name = producer.name().to_string();
            let view = producer.outputs()[position].clone();
            let artifact = self.artifact_checked(*artifact_id, &name)?;
            if let Some(existing) = artifact.producer_output() {
                return Err(Error::Resolution(format!(
                    "{} is already produced by {}!",
                    self.display_artifact(*artifact_id),
                    self.producers[existing.producer.0].name()
                )));
            }
            view.check_artifact_compatibility(artifact).map_err(|e| {
                Error::Validation(format!("{}.out() argument {}: {}", name, position + 1, e))
            })?;
            if !artifact.storage.includes_input_fingerprint_template() {
                return Err(Error::Resolution(format!(
                    "{} is produced by {} but its storage does not embed an {{input_fingerprint}} template",
                    self.display_artifact(*artifact_id),
                    name
                )));
            }
            self.artifacts[artifact_id.0].producer_output =
                Some(ProducerOutput { producer: id, position });
        }
        self.outputs_by_producer.push(outputs.to_vec());
        self.producers.push(producer);
        Ok(id)
    }

    /// Add the output artifacts then bind the producer to them.
    pub fn produce(
        &mut self,
        outputs: Vec<(&str, Artifact)>,
        producer: Producer,
    ) -> Result<Vec<ArtifactId>> {
        let ids = outputs
            .into_iter()
            .map(|(path, artifact)| self.add(path, artifact))
            .collect::<Result<Vec<_>>>()?;
        self.produce_into(&ids, producer)?;
        Ok(ids)
    }

    /// Single-output convenience for `produce`.
    pub fn produce_single(
        &mut self,
        path: &str,
        artifact: Artifact,
        producer: Producer,
    ) -> Result<ArtifactId> {
        Ok(self.produce(vec![(path, artifact)], producer)?[0])
    }

    fn artifact_checked(&self, id: ArtifactId, producer: &str) -> Result<&Artifact> {
        self.artifacts.get(id.0).ok_or_else(|| {
            Error::Validation(format!(
                "{} references an artifact from another graph",
                producer
            ))
        })
    }

    fn display_artifact(&self, id: ArtifactId) -> String {
        self.paths
            .iter()
            .find(|(_, artifact_id)| **artifact_id == id)
            .map(|(path, _)| format!("'{}'", path))
            .unwrap_or_else(|| format!("artifact #{}", id.0))
    }

    /// Seal the graph: check invariants, build the dependency DAG, verify
    /// acyclicity, and memoize the derived queries.
    pub fn finish(self) -> Result<Graph> {
        let GraphBuilder {
            name,
            backend,
            path_tags,
            artifacts,
            producers,
            outputs_by_producer,
            namespace: _,
            paths,
        } = self;

        let artifact_to_key: BTreeMap<ArtifactId, String> =
            paths.iter().map(|(path, id)| (*id, path.clone())).collect();

        for (id, artifact) in artifacts.iter().enumerate() {
            if artifact.producer_output().is_none()
                && artifact.storage.includes_input_fingerprint_template()
            {
                return Err(Error::Validation(format!(
                    "Raw artifact {} must not embed an {{input_fingerprint}} template",
                    artifact_to_key
                        .get(&ArtifactId(id))
                        .map(|key| format!("'{}'", key))
                        .unwrap_or_else(|| format!("#{}", id))
                )));
            }
        }

        let mut dag = DependencyDag::new();
        let artifact_nodes: Vec<_> = (0..artifacts.len())
            .map(|i| dag.add_node(Node::Artifact(ArtifactId(i))))
            .collect();
        let producer_nodes: Vec<_> = (0..producers.len())
            .map(|i| dag.add_node(Node::Producer(ProducerId(i))))
            .collect();
        for (i, producer) in producers.iter().enumerate() {
            for input in producer.inputs() {
                dag.add_edge(
                    artifact_nodes[input.artifact.0],
                    producer_nodes[i],
                    Relation::ConsumedBy(input.name.clone()),
                )?;
            }
            for (position, output) in outputs_by_producer[i].iter().enumerate() {
                dag.add_edge(
                    producer_nodes[i],
                    artifact_nodes[output.0],
                    Relation::Produces(position),
                )?;
            }
        }
        let topological_order: Vec<Node> = toposort(dag.graph(), None)
            .map_err(|_| Error::Resolution("Graph contains a dependency cycle".into()))?
            .into_iter()
            .map(|idx| dag[idx])
            .collect();

        let mut dependencies: BTreeMap<Node, BTreeSet<Node>> = BTreeMap::new();
        for (i, artifact) in artifacts.iter().enumerate() {
            let deps = match artifact.producer_output() {
                Some(output) => {
                    let mut deps = BTreeSet::new();
                    deps.insert(Node::Producer(output.producer));
                    deps
                }
                None => BTreeSet::new(),
            };
            dependencies.insert(Node::Artifact(ArtifactId(i)), deps);
        }
        for (i, producer) in producers.iter().enumerate() {
            let deps = producer
                .inputs()
                .iter()
                .map(|input| Node::Artifact(input.artifact))
                .collect();
            dependencies.insert(Node::Producer(ProducerId(i)), deps);
        }

        let producer_outputs: BTreeMap<ProducerId, Vec<ArtifactId>> = outputs_by_producer
            .into_iter()
            .enumerate()
            .map(|(i, outputs)| (ProducerId(i), outputs))
            .collect();

        let fingerprint = Fingerprint::from_string(
            &serde_json::to_string(&(&name, &path_tags)).expect("graph header serializes"),
        );

        Ok(Graph {
            name,
            backend,
            path_tags,
            artifacts,
            producers,
            paths,
            artifact_to_key,
            dependencies,
            producer_outputs,
            topological_order,
            fingerprint,
        })
    }
}

/// A sealed, immutable web of Artifacts connected by Producers.
#[derive(Debug)]
pub struct Graph {
    name: String,
    backend: Backend,
    path_tags: BTreeMap<String, String>,
    artifacts: Vec<Artifact>,
    producers: Vec<Producer>,
    paths: BTreeMap<String, ArtifactId>,
    artifact_to_key: BTreeMap<ArtifactId, String>,
    dependencies: BTreeMap<Node, BTreeSet<Node>>,
    producer_outputs: BTreeMap<ProducerId, Vec<ArtifactId>>,
    topological_order: Vec<Node>,
    fingerprint: Fingerprint,
}

impl Graph {
    pub fn builder<S: Into<String>>(name: S) -> GraphBuilder {
        GraphBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn path_tags(&self) -> &BTreeMap<String, String> {
        &self.path_tags
    }

    pub fn artifact(&self, id: ArtifactId) -> &Artifact {
        &self.artifacts[id.0]
    }

    pub fn producer(&self, id: ProducerId) -> &Producer {
        &self.producers[id.0]
    }

    pub fn artifact_by_path(&self, path: &str) -> Option<ArtifactId> {
        self.paths.get(path).copied()
    }

    /// The dotted name an artifact was assigned under.
    pub fn artifact_key(&self, id: ArtifactId) -> &str {
        &self.artifact_to_key[&id]
    }

    /// Every named artifact, in path order.
    pub fn named_artifacts(&self) -> impl Iterator<Item = (&str, ArtifactId)> {
        self.paths.iter().map(|(path, id)| (path.as_str(), *id))
    }

    pub fn producer_ids(&self) -> impl Iterator<Item = ProducerId> {
        (0..self.producers.len()).map(ProducerId)
    }

    /// Upstream nodes of each node.
    pub fn dependencies(&self) -> &BTreeMap<Node, BTreeSet<Node>> {
        &self.dependencies
    }

    /// A producer's output artifacts, ordered by position.
    pub fn producer_outputs(&self, id: ProducerId) -> &[ArtifactId] {
        &self.producer_outputs[&id]
    }

    pub fn topological_order(&self) -> &[Node] {
        &self.topological_order
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Read an artifact's data through `view`, loading the partitions from
    /// the backend when not supplied.
    pub fn read(
        &self,
        id: ArtifactId,
        partitions: Option<Vec<StoragePartition>>,
        view: &View,
    ) -> Result<Datum> {
        let artifact = self.artifact(id);
        let partitions = match partitions {
            Some(partitions) => partitions,
            None => {
                let connection = self.backend.connect()?;
                connection.read_artifact_partitions(artifact, &InputFingerprints::new())?
            }
        };
        if partitions.is_empty() {
            return Err(Error::MissingData(format!(
                "No data (partitions) found for '{}'",
                self.artifact_key(id)
            )));
        }
        io::read(&artifact.type_, &artifact.format, &partitions, view)
    }

    /// Write data for one partition of an artifact and record it in the
    /// backend.
    pub fn write(
        &self,
        data: &Datum,
        id: ArtifactId,
        keys: &CompositeKey,
        input_fingerprint: Fingerprint,
        view: &View,
    ) -> Result<StoragePartition> {
        let artifact = self.artifact(id);
        let partition = artifact.storage.generate_partition(keys, input_fingerprint, false)?;
        let written = io::write(data, &artifact.type_, &artifact.format, &partition, view)?;
        let mut connection = self.backend.connect()?;
        connection.write_artifact_partitions(artifact, &[written.clone()])?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use crate::storage::Storage;
    use crate::types::Type;

    fn int_artifact(path_spec: &str) -> Artifact {
        Artifact::new(
            Type::int64(),
            Format::json(),
            Storage::local_file(path_spec).unwrap(),
        )
        .unwrap()
    }

    fn noop_producer(name: &str, inputs: &[(&str, ArtifactId)]) -> Producer {
        let mut builder = Producer::builder(name);
        for (input_name, id) in inputs {
            builder = builder.input(*input_name, *id, View::read(Type::int64()));
        }
        builder
            .build(|_| Ok(vec![serde_json::json!(0)]))
            .output(View::write(Type::int64()))
            .finish()
            .unwrap()
    }

    #[test]
    fn test_duplicate_path_is_rejected() {
        let mut builder = Graph::builder("demo");
        builder.literal("a.b", 1i64).unwrap();
        let err = builder.literal("a.b", 2i64).unwrap_err();
        assert!(matches!(err, Error::Definition(_)));
        // A namespace cannot shadow an artifact, nor the reverse.
        assert!(matches!(builder.literal("a.b.c", 3i64), Err(Error::Definition(_))));
        assert!(matches!(builder.literal("a", 3i64), Err(Error::Definition(_))));
    }

    #[test]
    fn test_storage_resolution_on_add() {
        let mut builder = Graph::builder("demo").with_path_tag("env", "test");
        let id = builder
            .add("a.b", int_artifact("/tmp/{graph_name}/{path_tags}/{names}/{name}.{extension}"))
            .unwrap();
        let graph = builder.finish().unwrap();
        match &graph.artifact(id).storage {
            Storage::LocalFile(local) => {
                assert_eq!(local.spec(), "/tmp/demo/env=test/a/b/b.json")
            }
            other => panic!("expected local file storage, got: {:?}", other),
        }
    }

    #[test]
    fn test_produced_artifacts_require_fingerprint_template() {
        let mut builder = Graph::builder("demo");
        let x = builder.literal("x", 1i64).unwrap();
        let producer = noop_producer("p", &[("x", x)]);
        let err = builder
            .produce_single("z", int_artifact("/tmp/demo/z.json"), producer)
            .unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_raw_artifacts_reject_fingerprint_template() {
        let mut builder = Graph::builder("demo");
        builder
            .add("y", int_artifact("/tmp/demo/{input_fingerprint}/y.json"))
            .unwrap();
        let err = builder.finish().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_output_count_must_match() {
        let mut builder = Graph::builder("demo");
        let x = builder.literal("x", 1i64).unwrap();
        let producer = noop_producer("p", &[("x", x)]);
        // One declared output, two bindings.
        let a = builder.add("a", int_artifact("/tmp/demo/{input_fingerprint}/a.json")).unwrap();
        let b = builder.add("b", int_artifact("/tmp/demo/{input_fingerprint}/b.json")).unwrap();
        let err = builder.produce_into(&[a, b], producer).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_an_artifact_cannot_be_produced_twice() {
        let mut builder = Graph::builder("demo");
        let x = builder.literal("x", 1i64).unwrap();
        let z = builder
            .produce_single(
                "z",
                int_artifact("/tmp/demo/{input_fingerprint}/z.json"),
                noop_producer("p1", &[("x", x)]),
            )
            .unwrap();
        let err = builder.produce_into(&[z], noop_producer("p2", &[("x", x)])).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
        assert!(err.to_string().contains("already produced by p1"));
    }

    #[test]
    fn test_dependencies_and_producer_outputs() {
        let mut builder = Graph::builder("demo");
        let x = builder.literal("x", 1i64).unwrap();
        let y = builder.literal("y", 2i64).unwrap();
        let z = builder
            .produce_single(
                "z",
                int_artifact("/tmp/demo/{input_fingerprint}/z.json"),
                noop_producer("add", &[("x", x), ("y", y)]),
            )
            .unwrap();
        let graph = builder.finish().unwrap();

        let producer_id = graph.artifact(z).producer_output().unwrap().producer;
        assert_eq!(graph.artifact(z).producer_output().unwrap().position, 0);
        assert_eq!(graph.producer_outputs(producer_id).to_vec(), vec![z]);

        let dependencies = graph.dependencies();
        assert_eq!(dependencies[&Node::Artifact(z)], {
            let mut deps = BTreeSet::new();
            deps.insert(Node::Producer(producer_id));
            deps
        });
        assert!(dependencies[&Node::Artifact(x)].is_empty());
        let producer_deps = &dependencies[&Node::Producer(producer_id)];
        assert!(producer_deps.contains(&Node::Artifact(x)));
        assert!(producer_deps.contains(&Node::Artifact(y)));

        // Topological order respects dependencies.
        let order = graph.topological_order();
        let position = |node: Node| order.iter().position(|n| *n == node).unwrap();
        assert!(position(Node::Artifact(x)) < position(Node::Producer(producer_id)));
        assert!(position(Node::Producer(producer_id)) < position(Node::Artifact(z)));
    }

    #[test]
    fn test_cycle_detection() {
        let mut builder = Graph::builder("cycle");
        let a = builder.add("a", int_artifact("/tmp/cycle/{input_fingerprint}/a.json")).unwrap();
        let b = builder.add("b", int_artifact("/tmp/cycle/{input_fingerprint}/b.json")).unwrap();
        builder.produce_into(&[a], noop_producer("p1", &[("b", b)])).unwrap();
        builder.produce_into(&[b], noop_producer("p2", &[("a", a)])).unwrap();
        let err = builder.finish().unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_empty_graph_seals() {
        let graph = Graph::builder("empty").finish().unwrap();
        assert!(graph.topological_order().is_empty());
        assert!(graph.dependencies().is_empty());
    }

    #[test]
    fn test_graph_fingerprint_depends_on_name_and_tags() {
        let a = Graph::builder("a").finish().unwrap();
        let b = Graph::builder("b").finish().unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        let tagged = Graph::builder("a").with_path_tag("env", "test").finish().unwrap();
        assert_ne!(a.fingerprint(), tagged.fingerprint());
    }
}
