//! Local filesystem storage.

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::format::Format;
use crate::partition::{CompositeKey, CompositeKeyTypes};
use crate::storage::template::PathTemplate;
use crate::storage::StoragePartition;

/// Files addressed by a path template.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalFile {
    pub(crate) template: PathTemplate,
}

impl LocalFile {
    pub fn new(spec: &str) -> Result<LocalFile> {
        Ok(LocalFile { template: PathTemplate::parse(spec)? })
    }

    pub fn spec(&self) -> String {
        self.template.spec()
    }

    pub(crate) fn supports(
        &self,
        key_types: &CompositeKeyTypes,
        _format: &Format,
    ) -> Result<()> {
        let consumed = self.template.field_names();
        for name in key_types.keys() {
            if !consumed.contains(name.as_str()) {
                return Err(Error::Validation(format!(
                    "Path template '{}' does not consume the '{}' partition field; partitions would collide",
                    self.template.spec(),
                    name
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn generate_partition(
        &self,
        keys: &CompositeKey,
        input_fingerprint: Fingerprint,
        with_content_fingerprint: bool,
    ) -> Result<StoragePartition> {
        let path = self.template.format(keys, input_fingerprint)?;
        let mut partition = LocalFilePartition {
            path,
            keys: keys.clone(),
            input_fingerprint,
            content_fingerprint: Fingerprint::empty(),
        };
        if with_content_fingerprint {
            partition.content_fingerprint = partition.compute_content_fingerprint()?;
        }
        Ok(StoragePartition::LocalFile(partition))
    }

    pub(crate) fn discover_partitions(
        &self,
        key_types: &CompositeKeyTypes,
    ) -> Result<Vec<StoragePartition>> {
        let wildcard = self.template.to_wildcard(key_types)?;
        let parser = self.template.compile_parser(key_types)?;
        let mut partitions = Vec::new();
        let paths = glob::glob(&wildcard)
            .map_err(|e| Error::Storage(format!("Invalid discovery pattern '{}': {}", wildcard, e)))?;
        for entry in paths {
            let path = entry.map_err(|e| Error::Storage(e.to_string()))?;
            if !path.is_file() {
                continue;
            }
            let path = path.to_string_lossy().into_owned();
            let (keys, input_fingerprint) = parser.parse(&path)?;
            let mut partition = LocalFilePartition {
                path,
                keys,
                input_fingerprint,
                content_fingerprint: Fingerprint::empty(),
            };
            partition.content_fingerprint = partition.compute_content_fingerprint()?;
            partitions.push(StoragePartition::LocalFile(partition));
        }
        Ok(partitions)
    }
}

/// One file holding one partition's data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalFilePartition {
    pub path: String,
    pub keys: CompositeKey,
    pub input_fingerprint: Fingerprint,
    pub content_fingerprint: Fingerprint,
}

impl LocalFilePartition {
    /// Fingerprint the file's bytes (via their SHA-1 digest).
    pub fn compute_content_fingerprint(&self) -> Result<Fingerprint> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| Error::Storage(format!("Unable to read '{}': {}", self.path, e)))?;
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        Ok(Fingerprint::from_string(&hex::encode(hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use super::*;
    use crate::partition::{not_partitioned, PartitionKey, PartitionKeyType};
    use crate::partition::InputFingerprints;
    use crate::storage::Storage;

    fn write(path: &std::path::Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_discover_partitioned_files() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("1.json"), r#"[{"i": 1}]"#);
        write(&dir.path().join("2.json"), r#"[{"i": 2}]"#);

        let storage = Storage::local_file(&format!("{}/{{i.key}}.json", dir.path().display())).unwrap();
        let key_types = btreemap! {"i".to_string() => PartitionKeyType::Int64};
        let mut partitions = storage
            .discover_partitions(&key_types, &InputFingerprints::new())
            .unwrap();
        partitions.sort_by_key(|partition| partition.keys().clone());

        assert_eq!(partitions.len(), 2);
        assert_eq!(
            partitions[0].keys(),
            &btreemap! {"i".to_string() => PartitionKey::Int64(1)},
        );
        assert_eq!(
            partitions[1].keys(),
            &btreemap! {"i".to_string() => PartitionKey::Int64(2)},
        );
        for partition in &partitions {
            assert!(partition.input_fingerprint().is_empty());
            assert!(!partition.content_fingerprint().is_empty());
        }
    }

    #[test]
    fn test_discover_with_input_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("17/z.json"), "2");
        write(&dir.path().join("23/z.json"), "3");

        let storage = Storage::local_file(&format!(
            "{}/{{input_fingerprint}}/z.json",
            dir.path().display()
        ))
        .unwrap();
        let expected: InputFingerprints =
            btreemap! {not_partitioned() => Fingerprint::from_int64(17)};
        let partitions = storage
            .discover_partitions(&CompositeKeyTypes::new(), &expected)
            .unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].input_fingerprint(), Fingerprint::from_int64(17));
    }

    #[test]
    fn test_content_fingerprint_tracks_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("y.json");
        write(&path, "1");

        let storage = Storage::local_file(&path.display().to_string()).unwrap();
        let first = storage
            .generate_partition(&not_partitioned(), Fingerprint::empty(), true)
            .unwrap();
        write(&path, "2");
        let second = storage
            .generate_partition(&not_partitioned(), Fingerprint::empty(), true)
            .unwrap();
        assert_ne!(first.content_fingerprint(), second.content_fingerprint());
    }

    #[test]
    fn test_supports_requires_all_partition_fields() {
        let storage = LocalFile::new("data/{i.key}.json").unwrap();
        let partitioned = btreemap! {
            "i".to_string() => PartitionKeyType::Int64,
            "date".to_string() => PartitionKeyType::Date,
        };
        assert!(storage.supports(&partitioned, &Format::json()).is_err());
        assert!(storage
            .supports(&btreemap! {"i".to_string() => PartitionKeyType::Int64}, &Format::json())
            .is_ok());
    }
}
