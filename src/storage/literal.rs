//! String-literal storage: the value *is* the partition, recorded directly
//! in the backend rather than at an external location.

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::format::Format;
use crate::partition::{CompositeKey, CompositeKeyTypes, InputFingerprints};
use crate::storage::StoragePartition;

fn cannot_be_partitioned() -> Error {
    Error::Validation("Literal storage cannot be partitioned".to_string())
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StringLiteral {
    pub value: Option<String>,
}

impl StringLiteral {
    pub(crate) fn supports(&self, key_types: &CompositeKeyTypes, _format: &Format) -> Result<()> {
        if !key_types.is_empty() {
            return Err(cannot_be_partitioned());
        }
        Ok(())
    }

    pub(crate) fn generate_partition(
        &self,
        keys: &CompositeKey,
        input_fingerprint: Fingerprint,
        with_content_fingerprint: bool,
    ) -> Result<StoragePartition> {
        if !keys.is_empty() {
            return Err(cannot_be_partitioned());
        }
        let mut partition = StringLiteralPartition {
            value: self.value.clone(),
            keys: keys.clone(),
            input_fingerprint,
            content_fingerprint: Fingerprint::empty(),
        };
        if with_content_fingerprint {
            partition.content_fingerprint = partition.compute_content_fingerprint()?;
        }
        Ok(StoragePartition::StringLiteral(partition))
    }

    pub(crate) fn discover_partitions(
        &self,
        key_types: &CompositeKeyTypes,
        input_fingerprints: &InputFingerprints,
    ) -> Result<Vec<StoragePartition>> {
        if !key_types.is_empty() {
            return Err(cannot_be_partitioned());
        }
        if !input_fingerprints.is_empty() && self.value.is_some() {
            return Err(Error::Validation(format!(
                "Literal storage cannot have a preset value ('{}') for a Producer output",
                self.value.as_deref().unwrap_or_default()
            )));
        }
        let value = match self.value {
            Some(ref value) => value,
            None => return Ok(vec![]),
        };
        let mut partition = StringLiteralPartition {
            value: Some(value.clone()),
            keys: CompositeKey::new(),
            input_fingerprint: Fingerprint::empty(),
            content_fingerprint: Fingerprint::empty(),
        };
        partition.content_fingerprint = partition.compute_content_fingerprint()?;
        Ok(vec![StoragePartition::StringLiteral(partition)])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StringLiteralPartition {
    pub value: Option<String>,
    pub keys: CompositeKey,
    pub input_fingerprint: Fingerprint,
    pub content_fingerprint: Fingerprint,
}

impl StringLiteralPartition {
    pub fn compute_content_fingerprint(&self) -> Result<Fingerprint> {
        match self.value {
            Some(ref value) => Ok(Fingerprint::from_string(value)),
            None => Err(Error::MissingData("Literal has not been written yet".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use super::*;
    use crate::partition::{not_partitioned, PartitionKeyType};
    use crate::storage::Storage;

    #[test]
    fn test_discovers_its_own_value() {
        let storage = Storage::string_literal_value("1");
        let partitions = storage
            .discover_partitions(&CompositeKeyTypes::new(), &InputFingerprints::new())
            .unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].content_fingerprint(), Fingerprint::from_string("1"));
    }

    #[test]
    fn test_unwritten_literal_has_no_partitions() {
        let storage = Storage::string_literal();
        assert!(storage
            .discover_partitions(&CompositeKeyTypes::new(), &InputFingerprints::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_rejects_partitioning() {
        let storage = Storage::string_literal_value("1");
        let key_types = btreemap! {"i".to_string() => PartitionKeyType::Int64};
        assert!(storage.discover_partitions(&key_types, &InputFingerprints::new()).is_err());
    }

    #[test]
    fn test_rejects_preset_value_for_producer_output() {
        let storage = Storage::string_literal_value("1");
        let expected = btreemap! {not_partitioned() => Fingerprint::from_int64(1)};
        assert!(storage.discover_partitions(&CompositeKeyTypes::new(), &expected).is_err());
    }

    #[test]
    fn test_unwritten_partition_fingerprint_errors() {
        let partition = StringLiteralPartition {
            value: None,
            keys: not_partitioned(),
            input_fingerprint: Fingerprint::empty(),
            content_fingerprint: Fingerprint::empty(),
        };
        assert!(partition.compute_content_fingerprint().is_err());
    }
}
