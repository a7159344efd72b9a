//! Producers: pure-function nodes that build Artifacts from other Artifacts.
//!
//! The contracts a Producer declares (inputs, build, optional map, optional
//! validation, version) are assembled through `ProducerBuilder` and validated
//! once at `finish`; a `Producer` value is immutable afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::graph::ArtifactId;
use crate::io::Datum;
use crate::partition::{composite_key_types, not_partitioned, CompositeKey, InputFingerprints};
use crate::storage::StoragePartition;
use crate::version::Version;
use crate::view::{Access, View};

pub type StoragePartitions = Vec<StoragePartition>;

/// Partitions for each of a Producer's inputs, by input name.
pub type InputPartitions = BTreeMap<String, StoragePartitions>;

/// For each output composite key, the input partitions used to build it.
pub type PartitionDependencies = BTreeMap<CompositeKey, InputPartitions>;

pub type BuildFn = dyn Fn(&BTreeMap<String, Datum>) -> Result<Vec<Datum>> + Send + Sync;
pub type MapFn = dyn Fn(&InputPartitions) -> Result<PartitionDependencies> + Send + Sync;
pub type ValidateFn = dyn Fn(&[Datum]) -> (bool, String) + Send + Sync;

/// One declared input: the bound Artifact plus how the Producer consumes it.
#[derive(Clone)]
pub struct ProducerInput {
    pub name: String,
    pub artifact: ArtifactId,
    /// The READ view `build` sees this input through; None for map-only
    /// inputs.
    pub view: Option<View>,
    pub consumed_by_build: bool,
    pub consumed_by_map: bool,
}

/// An immutable task that builds one or more Artifacts.
#[derive(Clone)]
pub struct Producer {
    name: String,
    version: Version,
    inputs: Vec<ProducerInput>,
    build: Arc<BuildFn>,
    map: Arc<MapFn>,
    map_inputs: BTreeSet<String>,
    validate: Arc<ValidateFn>,
    outputs: Vec<View>,
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("inputs", &self.inputs.iter().map(|i| &i.name).collect::<Vec<_>>())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

impl Producer {
    pub fn builder<S: Into<String>>(name: S) -> ProducerBuilder {
        ProducerBuilder {
            name: name.into(),
            version: Version::default(),
            inputs: Vec::new(),
            build: None,
            map: None,
            map_input_names: Vec::new(),
            validate: None,
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn inputs(&self) -> &[ProducerInput] {
        &self.inputs
    }

    pub fn build_inputs(&self) -> impl Iterator<Item = &ProducerInput> {
        self.inputs.iter().filter(|input| input.consumed_by_build)
    }

    pub fn outputs(&self) -> &[View] {
        &self.outputs
    }

    /// Producer identity: the class key mixed with the declared version, so
    /// two Producers with identical inputs stay distinguishable.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_string(&self.name).combine(self.version.fingerprint())
    }

    /// Derive the identity of the inputs used to build one output partition.
    ///
    /// Only the *code* (class and version) and *input partition contents*
    /// matter; input paths changing with unchanged content do not.
    pub fn compute_input_fingerprint(
        &self,
        dependency_partitions: &InputPartitions,
    ) -> Result<Fingerprint> {
        let input_names: BTreeSet<&str> =
            dependency_partitions.keys().map(String::as_str).collect();
        let expected_names: BTreeSet<&str> =
            self.build_inputs().map(|input| input.name.as_str()).collect();
        if input_names != expected_names {
            return Err(Error::Validation(format!(
                "Mismatched dependency inputs; expected {:?}, got {:?}",
                expected_names, input_names
            )));
        }
        let mut fingerprint =
            Fingerprint::from_string(&self.name).combine(self.version.fingerprint());
        for partitions in dependency_partitions.values() {
            for partition in partitions {
                let partition = partition.with_content_fingerprint(true)?;
                fingerprint = fingerprint.combine(partition.content_fingerprint());
            }
        }
        Ok(fingerprint)
    }

    /// Map the input partitions onto output partitions and derive each
    /// output partition's input fingerprint.
    pub fn compute_dependencies(
        &self,
        input_partitions: &InputPartitions,
    ) -> Result<(PartitionDependencies, InputFingerprints)> {
        let map_args: InputPartitions = input_partitions
            .iter()
            .filter(|(name, _)| self.map_inputs.contains(*name))
            .map(|(name, partitions)| (name.clone(), partitions.clone()))
            .collect();
        let partition_dependencies = (self.map)(&map_args)?;
        let mut partition_input_fingerprints = InputFingerprints::new();
        for (composite_key, dependency_partitions) in &partition_dependencies {
            partition_input_fingerprints.insert(
                composite_key.clone(),
                self.compute_input_fingerprint(dependency_partitions)?,
            );
        }
        Ok((partition_dependencies, partition_input_fingerprints))
    }

    pub(crate) fn run_build(&self, arguments: &BTreeMap<String, Datum>) -> Result<Vec<Datum>> {
        let outputs = (self.build)(arguments)?;
        if outputs.len() != self.outputs.len() {
            return Err(Error::Validation(format!(
                "{}.build returned {} values, expected {}",
                self.name,
                outputs.len(),
                self.outputs.len()
            )));
        }
        Ok(outputs)
    }

    pub(crate) fn run_validate(&self, outputs: &[Datum]) -> (bool, String) {
        (self.validate)(outputs)
    }
}

pub struct ProducerBuilder {
    name: String,
    version: Version,
    inputs: Vec<ProducerInput>,
    build: Option<Arc<BuildFn>>,
    map: Option<Arc<MapFn>>,
    map_input_names: Vec<String>,
    validate: Option<Arc<ValidateFn>>,
    outputs: Vec<View>,
}

impl ProducerBuilder {
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Declare an input consumed by `build`, read through `view`.
    pub fn input<S: Into<String>>(mut self, name: S, artifact: ArtifactId, view: View) -> Self {
        self.inputs.push(ProducerInput {
            name: name.into(),
            artifact,
            view: Some(view),
            consumed_by_build: true,
            consumed_by_map: false,
        });
        self
    }

    /// Declare an input consumed only by `map` (its partitions steer the
    /// output partitioning but its data is never read by `build`).
    pub fn map_input<S: Into<String>>(mut self, name: S, artifact: ArtifactId) -> Self {
        self.inputs.push(ProducerInput {
            name: name.into(),
            artifact,
            view: None,
            consumed_by_build: false,
            consumed_by_map: true,
        });
        self
    }

    pub fn build<F>(mut self, build: F) -> Self
    where
        F: Fn(&BTreeMap<String, Datum>) -> Result<Vec<Datum>> + Send + Sync + 'static,
    {
        self.build = Some(Arc::new(build));
        self
    }

    /// Provide a custom partition mapping over the named inputs.
    pub fn map<F>(mut self, inputs: &[&str], map: F) -> Self
    where
        F: Fn(&InputPartitions) -> Result<PartitionDependencies> + Send + Sync + 'static,
    {
        self.map = Some(Arc::new(map));
        self.map_input_names = inputs.iter().map(|name| (*name).to_string()).collect();
        self
    }

    pub fn validate_outputs<F>(mut self, validate: F) -> Self
    where
        F: Fn(&[Datum]) -> (bool, String) + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn output(mut self, view: View) -> Self {
        self.outputs.push(view);
        self
    }

    pub fn finish(self) -> Result<Producer> {
        let ProducerBuilder { name, version, mut inputs, build, map, map_input_names, validate, outputs } =
            self;
        let definition_err = |message: String| Err(Error::Definition(format!("{}: {}", name, message)));

        if name.is_empty() {
            return Err(Error::Definition("Producer name must not be empty".to_string()));
        }
        let mut seen = BTreeSet::new();
        for input in &inputs {
            if !seen.insert(input.name.clone()) {
                return definition_err(format!("duplicate input '{}'", input.name));
            }
            if let Some(ref view) = input.view {
                if !view.mode.contains(Access::Read) {
                    return definition_err(format!(
                        ".{} param: view must be readable",
                        input.name
                    ));
                }
            }
        }

        let build = match build {
            Some(build) => build,
            None => return definition_err(".build: must be implemented".to_string()),
        };
        if outputs.is_empty() {
            return definition_err(
                ".build: a return value must be set with the output Artifact(s)".to_string(),
            );
        }
        for (i, view) in outputs.iter().enumerate() {
            if !view.mode.contains(Access::Write) {
                return definition_err(format!(".build: return {} view must be writable", i + 1));
            }
        }

        // All outputs must share one partition scheme: same field names and
        // key types.
        let mut schemes = BTreeSet::new();
        for view in &outputs {
            schemes.insert(composite_key_types(&view.type_).map_err(|e| {
                Error::Definition(format!("{}: .build: {}", name, e))
            })?);
        }
        if schemes.len() != 1 {
            return definition_err(
                ".build: all outputs must have the same partitioning scheme".to_string(),
            );
        }
        let partitioned = outputs.iter().any(|view| view.type_.is_partitioned());

        for map_input in &map_input_names {
            if !inputs.iter().any(|input| input.name == *map_input) {
                return definition_err(format!(
                    ".map: the '{}' parameter must be defined as an input",
                    map_input
                ));
            }
        }

        let build_input_names: BTreeSet<String> = inputs
            .iter()
            .filter(|input| input.consumed_by_build)
            .map(|input| input.name.clone())
            .collect();
        let (map, map_inputs) = match map {
            Some(map) => (map, map_input_names.into_iter().collect::<BTreeSet<_>>()),
            None => {
                if partitioned {
                    return definition_err(
                        ".map: must be implemented when the build outputs are partitioned"
                            .to_string(),
                    );
                }
                // Synthesize the default: everything feeds the single
                // unpartitioned output.
                let default: Arc<MapFn> = Arc::new(|inputs: &InputPartitions| {
                    let mut dependencies = PartitionDependencies::new();
                    dependencies.insert(not_partitioned(), inputs.clone());
                    Ok(dependencies)
                });
                (default, build_input_names.clone())
            }
        };

        // The map's declared parameters are authoritative for what it
        // consumes, whether synthesized or user provided.
        for input in &mut inputs {
            input.consumed_by_map = map_inputs.contains(&input.name);
        }
        if let Some(unused) = inputs
            .iter()
            .find(|input| !input.consumed_by_build && !input.consumed_by_map)
        {
            return definition_err(format!(
                "the '{}' input isn't used in .build or .map",
                unused.name
            ));
        }

        let validate: Arc<ValidateFn> = validate
            .unwrap_or_else(|| Arc::new(|_| (true, "No validation performed.".to_string())));

        Ok(Producer { name, version, inputs, build, map, map_inputs, validate, outputs })
    }
}
