//! Artifacts: descriptors of existing or generated datasets.

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::format::Format;
use crate::graph::ProducerId;
use crate::partition::{composite_key_types, CompositeKeyTypes};
use crate::storage::Storage;
use crate::types::rust::{LiteralValue, RUST_TYPE_SYSTEM};
use crate::types::Type;

/// A piece of human knowledge attached to an Artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Annotation {
    pub key: String,
    pub value: String,
}

/// A derived characteristic tracked for an Artifact over time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Statistic {
    pub key: String,
    pub value: String,
}

/// The edge from a produced Artifact back to its Producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProducerOutput {
    pub producer: ProducerId,
    pub position: usize,
}

/// An Artifact describes a dataset by three key elements:
/// - `type_`: spec of the data's structure
/// - `format`: the data's serialized format
/// - `storage`: the data's persistent location
///
/// An Artifact without a `producer_output` is *raw*: its data arrives from
/// outside the graph. A produced Artifact is built by its Producer.
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    pub type_: Type,
    pub format: Format,
    pub storage: Storage,
    pub annotations: Vec<Annotation>,
    pub statistics: Vec<Statistic>,
    pub(crate) producer_output: Option<ProducerOutput>,
}

impl Artifact {
    pub fn new(type_: Type, format: Format, storage: Storage) -> Result<Artifact> {
        format.supports(&type_)?;
        storage.supports(&type_, &format)?;
        Ok(Artifact {
            type_,
            format,
            storage,
            annotations: Vec::new(),
            statistics: Vec::new(),
            producer_output: None,
        })
    }

    /// Cast a host scalar to a literal Artifact: the type is inferred
    /// through the rust type system and the value becomes the storage.
    pub fn cast<T: LiteralValue>(value: T) -> Result<Artifact> {
        let type_ = RUST_TYPE_SYSTEM
            .to_artigraph(&value.rust_type())
            .map_err(|e| Error::Definition(format!("Cannot cast value to an Artifact: {}", e)))?;
        let serialized = serde_json::to_string(&value.to_datum())?;
        Artifact::new(type_, Format::json(), Storage::string_literal_value(serialized))
    }

    pub fn with_annotation<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Artifact {
        self.annotations.push(Annotation { key: key.into(), value: value.into() });
        self
    }

    pub fn producer_output(&self) -> Option<ProducerOutput> {
        self.producer_output
    }

    pub fn is_raw(&self) -> bool {
        self.producer_output.is_none()
    }

    /// The partition scheme of this artifact's type.
    pub fn partition_key_types(&self) -> Result<CompositeKeyTypes> {
        composite_key_types(&self.type_)
    }

    /// Identity over the core triple. Annotations and statistics are
    /// excluded, as is the producer linkage (which would be cyclic).
    pub fn fingerprint(&self) -> Fingerprint {
        self.type_
            .fingerprint()
            .combine(self.format.fingerprint())
            .combine(self.storage.fingerprint())
    }
}
