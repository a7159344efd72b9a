//! Addressable, partitionable locations for artifact data.
//!
//! Concrete drivers are enum-dispatched; the contract every driver upholds is
//! the one the executor consumes: deterministic partition generation from a
//! path template, discovery of existing partitions, and content
//! fingerprinting of stored bytes.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::format::Format;
use crate::partition::{
    composite_key_fingerprint, composite_key_types, CompositeKey, CompositeKeyTypes,
    InputFingerprints,
};
use crate::types::Type;

pub mod literal;
pub mod local;
pub mod template;

pub use literal::{StringLiteral, StringLiteralPartition};
pub use local::{LocalFile, LocalFilePartition};

/// Discriminates storage drivers for IO dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    LocalFile,
    StringLiteral,
}

/// A spec for a partitionable location.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Storage {
    LocalFile(LocalFile),
    StringLiteral(StringLiteral),
}

impl Storage {
    pub fn local_file(spec: &str) -> Result<Storage> {
        Ok(Storage::LocalFile(LocalFile::new(spec)?))
    }

    pub fn string_literal() -> Storage {
        Storage::StringLiteral(StringLiteral { value: None })
    }

    pub fn string_literal_value<S: Into<String>>(value: S) -> Storage {
        Storage::StringLiteral(StringLiteral { value: Some(value.into()) })
    }

    pub fn kind(&self) -> StorageKind {
        match *self {
            Storage::LocalFile(_) => StorageKind::LocalFile,
            Storage::StringLiteral(_) => StorageKind::StringLiteral,
        }
    }

    /// Validate that this storage can hold the given type and format.
    pub fn supports(&self, type_: &Type, format: &Format) -> Result<()> {
        let key_types = composite_key_types(type_)?;
        match *self {
            Storage::LocalFile(ref storage) => storage.supports(&key_types, format),
            Storage::StringLiteral(ref storage) => storage.supports(&key_types, format),
        }
    }

    /// Producer outputs must embed their input fingerprint in the location;
    /// raw artifacts must not.
    pub fn includes_input_fingerprint_template(&self) -> bool {
        match *self {
            Storage::LocalFile(ref storage) => storage.template.includes_input_fingerprint(),
            Storage::StringLiteral(_) => false,
        }
    }

    pub fn resolve_graph_name(&self, graph_name: &str) -> Storage {
        self.map_template(|template| template.resolve_graph_name(graph_name))
    }

    pub fn resolve_names(&self, names: &[String]) -> Storage {
        self.map_template(|template| template.resolve_names(names))
    }

    pub fn resolve_path_tags(&self, path_tags: &BTreeMap<String, String>) -> Storage {
        self.map_template(|template| template.resolve_path_tags(path_tags))
    }

    pub fn resolve_extension(&self, extension: &str) -> Storage {
        self.map_template(|template| template.resolve_extension(extension))
    }

    fn map_template<F>(&self, f: F) -> Storage
    where
        F: FnOnce(&template::PathTemplate) -> template::PathTemplate,
    {
        match *self {
            Storage::LocalFile(ref storage) => {
                Storage::LocalFile(LocalFile { template: f(&storage.template) })
            }
            Storage::StringLiteral(ref storage) => Storage::StringLiteral(storage.clone()),
        }
    }

    /// Deterministically materialize the location for one partition.
    pub fn generate_partition(
        &self,
        keys: &CompositeKey,
        input_fingerprint: Fingerprint,
        with_content_fingerprint: bool,
    ) -> Result<StoragePartition> {
        match *self {
            Storage::LocalFile(ref storage) => {
                storage.generate_partition(keys, input_fingerprint, with_content_fingerprint)
            }
            Storage::StringLiteral(ref storage) => {
                storage.generate_partition(keys, input_fingerprint, with_content_fingerprint)
            }
        }
    }

    /// Enumerate existing partitions matching the path template. When
    /// `input_fingerprints` is non-empty, only partitions carrying one of the
    /// expected fingerprints for their keys are returned.
    pub fn discover_partitions(
        &self,
        key_types: &CompositeKeyTypes,
        input_fingerprints: &InputFingerprints,
    ) -> Result<Vec<StoragePartition>> {
        let partitions = match *self {
            Storage::LocalFile(ref storage) => storage.discover_partitions(key_types)?,
            Storage::StringLiteral(ref storage) => {
                storage.discover_partitions(key_types, input_fingerprints)?
            }
        };
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

    /// The storage identity recorded by backends.
    pub fn fingerprint(&self) -> Fingerprint {
        match *self {
            Storage::LocalFile(ref storage) => {
                Fingerprint::from_string(&format!("LocalFile:{}", storage.template.spec()))
            }
            Storage::StringLiteral(ref storage) => Fingerprint::from_string(&format!(
                "StringLiteral:{}",
                storage.value.as_deref().unwrap_or("")
            )),
        }
    }
}

/// One concrete location holding (or about to hold) data for one partition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StoragePartition {
    LocalFile(LocalFilePartition),
    StringLiteral(StringLiteralPartition),
}

impl StoragePartition {
    pub fn kind(&self) -> StorageKind {
        match *self {
            StoragePartition::LocalFile(_) => StorageKind::LocalFile,
            StoragePartition::StringLiteral(_) => StorageKind::StringLiteral,
        }
    }

    pub fn keys(&self) -> &CompositeKey {
        match *self {
            StoragePartition::LocalFile(ref partition) => &partition.keys,
            StoragePartition::StringLiteral(ref partition) => &partition.keys,
        }
    }

    pub fn input_fingerprint(&self) -> Fingerprint {
        match *self {
            StoragePartition::LocalFile(ref partition) => partition.input_fingerprint,
            StoragePartition::StringLiteral(ref partition) => partition.input_fingerprint,
        }
    }

    /// The fingerprint of the stored bytes; empty until computed.
    pub fn content_fingerprint(&self) -> Fingerprint {
        match *self {
            StoragePartition::LocalFile(ref partition) => partition.content_fingerprint,
            StoragePartition::StringLiteral(ref partition) => partition.content_fingerprint,
        }
    }

    /// Return a copy with the content fingerprint computed from the stored
    /// data. With `keep_existing`, an already-computed fingerprint is kept.
    pub fn with_content_fingerprint(&self, keep_existing: bool) -> Result<StoragePartition> {
        if keep_existing && !self.content_fingerprint().is_empty() {
            return Ok(self.clone());
        }
        Ok(match *self {
            StoragePartition::LocalFile(ref partition) => {
                let mut partition = partition.clone();
                partition.content_fingerprint = partition.compute_content_fingerprint()?;
                StoragePartition::LocalFile(partition)
            }
            StoragePartition::StringLiteral(ref partition) => {
                let mut partition = partition.clone();
                partition.content_fingerprint = partition.compute_content_fingerprint()?;
                StoragePartition::StringLiteral(partition)
            }
        })
    }

    /// A stable identity over `(location, keys, input_fingerprint,
    /// content_fingerprint)`, used for backend dedup and linkage.
    pub fn fingerprint(&self) -> Fingerprint {
        let location = match *self {
            StoragePartition::LocalFile(ref partition) => {
                Fingerprint::from_string(&format!("LocalFile:{}", partition.path))
            }
            StoragePartition::StringLiteral(ref partition) => Fingerprint::from_string(&format!(
                "StringLiteral:{}",
                partition.value.as_deref().unwrap_or("")
            )),
        };
        location
            .combine(composite_key_fingerprint(self.keys()))
            .combine(Fingerprint::from_string(&format!("input:{}", self.input_fingerprint())))
            .combine(Fingerprint::from_string(&format!("content:{}", self.content_fingerprint())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::not_partitioned;

    #[test]
    fn test_storage_fingerprint_distinguishes_drivers() {
        let local = Storage::local_file("data/x.json").unwrap();
        let literal = Storage::string_literal_value("data/x.json");
        assert_ne!(local.fingerprint(), literal.fingerprint());
    }

    #[test]
    fn test_includes_input_fingerprint_template() {
        assert!(Storage::local_file("out/{input_fingerprint}/z.json")
            .unwrap()
            .includes_input_fingerprint_template());
        assert!(!Storage::local_file("y.json").unwrap().includes_input_fingerprint_template());
        assert!(!Storage::string_literal().includes_input_fingerprint_template());
    }

    #[test]
    fn test_partition_fingerprint_components() {
        let storage = Storage::string_literal_value("1");
        let partition = storage
            .generate_partition(&not_partitioned(), Fingerprint::empty(), true)
            .unwrap();
        let same = storage
            .generate_partition(&not_partitioned(), Fingerprint::empty(), true)
            .unwrap();
        assert_eq!(partition.fingerprint(), same.fingerprint());

        let other = Storage::string_literal_value("2")
            .generate_partition(&not_partitioned(), Fingerprint::empty(), true)
            .unwrap();
        assert_ne!(partition.fingerprint(), other.fingerprint());
    }
}
