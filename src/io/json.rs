//! JSON readers and writers for the reference storage drivers.

use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::format::{Format, FormatKind};
use crate::io::{Datum, ReadHandler, Registry, WriteHandler};
use crate::storage::{StorageKind, StoragePartition, StringLiteralPartition};
use crate::types::Type;
use crate::view::{Representation, View};

pub(super) fn register(registry: &Registry) {
    registry.register_reader(ReadHandler {
        key: "json+local_file+json_view",
        priority: 0,
        matches: matches_local,
        read: read_json_local,
    });
    registry.register_writer(WriteHandler {
        key: "json+local_file+json_view",
        priority: 0,
        matches: matches_local,
        write: write_json_local,
    });
    registry.register_reader(ReadHandler {
        key: "json+string_literal+json_view",
        priority: 0,
        matches: matches_literal,
        read: read_json_literal,
    });
    registry.register_writer(WriteHandler {
        key: "json+string_literal+json_view",
        priority: 0,
        matches: matches_literal,
        write: write_json_literal,
    });
}

fn matches_local(_type: &Type, format: &Format, storage: StorageKind, view: &View) -> bool {
    format.kind() == FormatKind::Json
        && storage == StorageKind::LocalFile
        && view.representation == Representation::Json
}

fn matches_literal(_type: &Type, format: &Format, storage: StorageKind, view: &View) -> bool {
    format.kind() == FormatKind::Json
        && storage == StorageKind::StringLiteral
        && view.representation == Representation::Json
}

fn the_partition<'a>(partitions: &'a [StoragePartition]) -> Result<&'a StoragePartition> {
    if partitions.len() != 1 {
        return Err(Error::Storage(format!(
            "Expected exactly one partition for an unpartitioned read, got {}",
            partitions.len()
        )));
    }
    Ok(&partitions[0])
}

fn read_json_file(path: &str) -> Result<Value> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Storage(format!("Unable to read '{}': {}", path, e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn local_path(partition: &StoragePartition) -> Result<&str> {
    match partition {
        StoragePartition::LocalFile(partition) => Ok(&partition.path),
        other => Err(Error::Storage(format!(
            "Expected a local file partition, got: {:?}",
            other.kind()
        ))),
    }
}

fn read_json_local(
    type_: &Type,
    _format: &Format,
    partitions: &[StoragePartition],
    _view: &View,
) -> Result<Datum> {
    if type_.is_partitioned() {
        // Concatenate the element arrays of every partition, in key order.
        let mut ordered: Vec<&StoragePartition> = partitions.iter().collect();
        ordered.sort_by_key(|partition| partition.keys().clone());
        let mut elements = Vec::new();
        for partition in ordered {
            let path = local_path(partition)?;
            match read_json_file(path)? {
                Value::Array(mut chunk) => elements.append(&mut chunk),
                other => {
                    return Err(Error::Storage(format!(
                        "Expected a JSON array in '{}', got: {}",
                        path, other
                    )))
                }
            }
        }
        return Ok(Value::Array(elements));
    }
    read_json_file(local_path(the_partition(partitions)?)?)
}

fn write_json_local(
    data: &Datum,
    _type: &Type,
    _format: &Format,
    partition: &StoragePartition,
    _view: &View,
) -> Result<StoragePartition> {
    let path = local_path(partition)?;
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Storage(format!("Unable to create '{}': {}", parent.display(), e)))?;
    }
    std::fs::write(path, serde_json::to_vec(data)?)
        .map_err(|e| Error::Storage(format!("Unable to write '{}': {}", path, e)))?;
    partition.with_content_fingerprint(false)
}

fn read_json_literal(
    _type: &Type,
    _format: &Format,
    partitions: &[StoragePartition],
    _view: &View,
) -> Result<Datum> {
    match the_partition(partitions)? {
        StoragePartition::StringLiteral(partition) => match partition.value {
            Some(ref value) => Ok(serde_json::from_str(value)?),
            None => Err(Error::MissingData("Literal has not been written yet".to_string())),
        },
        other => Err(Error::Storage(format!(
            "Expected a string literal partition, got: {:?}",
            other.kind()
        ))),
    }
}

fn write_json_literal(
    data: &Datum,
    _type: &Type,
    _format: &Format,
    partition: &StoragePartition,
    _view: &View,
) -> Result<StoragePartition> {
    match partition {
        StoragePartition::StringLiteral(partition) => {
            let mut written = StringLiteralPartition {
                value: Some(serde_json::to_string(data)?),
                keys: partition.keys.clone(),
                input_fingerprint: partition.input_fingerprint,
                content_fingerprint: crate::fingerprint::Fingerprint::empty(),
            };
            written.content_fingerprint = written.compute_content_fingerprint()?;
            Ok(StoragePartition::StringLiteral(written))
        }
        other => Err(Error::Storage(format!(
            "Expected a string literal partition, got: {:?}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::io;
    use crate::partition::{not_partitioned, PartitionKey};
    use crate::storage::Storage;

    #[test]
    fn test_local_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage =
            Storage::local_file(&format!("{}/x.json", dir.path().display())).unwrap();
        let partition = storage
            .generate_partition(&not_partitioned(), Fingerprint::empty(), false)
            .unwrap();
        let view = View::read_write(Type::int64());

        let written = io::write(&serde_json::json!(3), &Type::int64(), &Format::json(), &partition, &view)
            .unwrap();
        assert!(!written.content_fingerprint().is_empty());

        let value = io::read(&Type::int64(), &Format::json(), &[written], &view).unwrap();
        assert_eq!(value, serde_json::json!(3));
    }

    #[test]
    fn test_literal_round_trip() {
        let storage = Storage::string_literal();
        let partition = storage
            .generate_partition(&not_partitioned(), Fingerprint::from_int64(1), false)
            .unwrap();
        let view = View::read_write(Type::int64());

        let written = io::write(&serde_json::json!(5), &Type::int64(), &Format::json(), &partition, &view)
            .unwrap();
        let value = io::read(&Type::int64(), &Format::json(), &[written], &view).unwrap();
        assert_eq!(value, serde_json::json!(5));
    }

    #[test]
    fn test_partitioned_read_concatenates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.json"), r#"[{"i": 1}]"#).unwrap();
        std::fs::write(dir.path().join("2.json"), r#"[{"i": 2}]"#).unwrap();

        let collection = Type::collection(
            Type::structure("anon", vec![("i".to_string(), Type::int64())]),
            vec!["i".to_string()],
            vec![],
        )
        .unwrap();
        let storage =
            Storage::local_file(&format!("{}/{{i.key}}.json", dir.path().display())).unwrap();
        let partitions = storage
            .discover_partitions(
                &btreemap! {"i".to_string() => crate::partition::PartitionKeyType::Int64},
                &Default::default(),
            )
            .unwrap();
        assert_eq!(partitions.len(), 2);

        let view = View::read(collection.clone());
        let value = io::read(&collection, &Format::json(), &partitions, &view).unwrap();
        assert_eq!(value, serde_json::json!([{"i": 1}, {"i": 2}]));

        // Reading a subset only sees that partition's rows.
        let only_two: Vec<StoragePartition> = partitions
            .iter()
            .filter(|partition| {
                partition.keys() == &btreemap! {"i".to_string() => PartitionKey::Int64(2)}
            })
            .cloned()
            .collect();
        let value = io::read(&collection, &Format::json(), &only_two, &view).unwrap();
        assert_eq!(value, serde_json::json!([{"i": 2}]));
    }

    #[test]
    fn test_zero_partition_read_is_missing_data() {
        let view = View::read(Type::int64());
        let err = io::read(&Type::int64(), &Format::json(), &[], &view).unwrap_err();
        assert!(matches!(err, Error::MissingData(_)));
    }
}
