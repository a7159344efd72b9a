//! Typed partition field values and composite keys.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::types::{Type, TypeKind};

/// A typed value for one partition field.
///
/// Each variant projects one or more named *key components*: string
/// renderings suitable for embedding in a storage path. `from_key_components`
/// is the inverse parse and accepts any sufficient combination (eg: a date
/// can be rebuilt from `key`, `iso`, or `Y`/`m`/`d`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartitionKey {
    Date(NaiveDate),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Null,
}

/// The key class for a partition field, derived from the field's `Type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartitionKeyType {
    Date,
    Int8,
    Int16,
    Int32,
    Int64,
    Null,
}

impl PartitionKeyType {
    /// The key class registered for a field type, if the type is
    /// partitionable.
    pub fn from_field_type(type_: &Type) -> Option<PartitionKeyType> {
        match type_.kind {
            TypeKind::Date => Some(PartitionKeyType::Date),
            TypeKind::Int8 => Some(PartitionKeyType::Int8),
            TypeKind::Int16 => Some(PartitionKeyType::Int16),
            TypeKind::Int32 => Some(PartitionKeyType::Int32),
            TypeKind::Int64 => Some(PartitionKeyType::Int64),
            TypeKind::Null => Some(PartitionKeyType::Null),
            _ => None,
        }
    }

    pub fn key_components(self) -> &'static [&'static str] {
        match self {
            PartitionKeyType::Date => &["key", "Y", "m", "d", "iso"],
            PartitionKeyType::Int8
            | PartitionKeyType::Int16
            | PartitionKeyType::Int32
            | PartitionKeyType::Int64 => &["key", "hex"],
            PartitionKeyType::Null => &["key"],
        }
    }

    /// Parse a key back out of component renderings.
    pub fn from_key_components(
        self,
        components: &BTreeMap<String, String>,
    ) -> Result<PartitionKey> {
        let names: Vec<&str> = components.keys().map(String::as_str).collect();
        let insufficient = || {
            Error::Validation(format!(
                "Unable to parse {:?} from key components: {:?}",
                self, names
            ))
        };
        let parse_date = |value: &str| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_err(|e| Error::Validation(format!("Invalid date '{}': {}", value, e)))
        };
        match self {
            PartitionKeyType::Date => {
                if let Some(value) = only(components, &["key"]).or_else(|| only(components, &["iso"])) {
                    return Ok(PartitionKey::Date(parse_date(value)?));
                }
                if names == ["Y", "d", "m"] || names == ["Y", "m", "d"] {
                    let ymd = format!("{}-{:0>2}-{:0>2}", components["Y"], components["m"], components["d"]);
                    return Ok(PartitionKey::Date(parse_date(&ymd)?));
                }
                Err(insufficient())
            }
            PartitionKeyType::Int8 => parse_int(self, components).map(|i| PartitionKey::Int8(i as i8)),
            PartitionKeyType::Int16 => parse_int(self, components).map(|i| PartitionKey::Int16(i as i16)),
            PartitionKeyType::Int32 => parse_int(self, components).map(|i| PartitionKey::Int32(i as i32)),
            PartitionKeyType::Int64 => parse_int(self, components).map(PartitionKey::Int64),
            PartitionKeyType::Null => match only(components, &["key"]) {
                Some("null") => Ok(PartitionKey::Null),
                Some(other) => Err(Error::Validation(format!(
                    "NullKey can only be used with 'null', got: '{}'",
                    other
                ))),
                None => Err(insufficient()),
            },
        }
    }
}

fn only<'a>(components: &'a BTreeMap<String, String>, names: &[&str]) -> Option<&'a str> {
    if components.len() == names.len() && names.iter().all(|name| components.contains_key(*name)) {
        components.get(names[0]).map(String::as_str)
    } else {
        None
    }
}

fn parse_int(key_type: PartitionKeyType, components: &BTreeMap<String, String>) -> Result<i64> {
    let parsed = if let Some(value) = only(components, &["key"]) {
        value.parse::<i64>().ok()
    } else if let Some(value) = only(components, &["hex"]) {
        i64::from_str_radix(value.trim_start_matches("0x"), 16).ok()
    } else {
        None
    };
    parsed.ok_or_else(|| {
        Error::Validation(format!(
            "Unable to parse {:?} from key components: {:?}",
            key_type, components
        ))
    })
}

impl PartitionKey {
    pub fn date(year: i32, month: u32, day: u32) -> Result<PartitionKey> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(PartitionKey::Date)
            .ok_or_else(|| {
                Error::Validation(format!("Invalid date: {}-{}-{}", year, month, day))
            })
    }

    pub fn key_type(&self) -> PartitionKeyType {
        match *self {
            PartitionKey::Date(_) => PartitionKeyType::Date,
            PartitionKey::Int8(_) => PartitionKeyType::Int8,
            PartitionKey::Int16(_) => PartitionKeyType::Int16,
            PartitionKey::Int32(_) => PartitionKeyType::Int32,
            PartitionKey::Int64(_) => PartitionKeyType::Int64,
            PartitionKey::Null => PartitionKeyType::Null,
        }
    }

    /// Render the named component of this key.
    pub fn key_component(&self, component: &str) -> Result<String> {
        let value = match (self, component) {
            (PartitionKey::Date(date), "key") | (PartitionKey::Date(date), "iso") => {
                date.format("%Y-%m-%d").to_string()
            }
            (PartitionKey::Date(date), "Y") => date.year().to_string(),
            (PartitionKey::Date(date), "m") => date.month().to_string(),
            (PartitionKey::Date(date), "d") => date.day().to_string(),
            (PartitionKey::Int8(i), "key") => i.to_string(),
            (PartitionKey::Int16(i), "key") => i.to_string(),
            (PartitionKey::Int32(i), "key") => i.to_string(),
            (PartitionKey::Int64(i), "key") => i.to_string(),
            (PartitionKey::Int8(i), "hex") => format!("{:#x}", i),
            (PartitionKey::Int16(i), "hex") => format!("{:#x}", i),
            (PartitionKey::Int32(i), "hex") => format!("{:#x}", i),
            (PartitionKey::Int64(i), "hex") => format!("{:#x}", i),
            (PartitionKey::Null, "key") => "null".to_string(),
            _ => {
                return Err(Error::Validation(format!(
                    "{:?} has no key component '{}'",
                    self.key_type(),
                    component
                )))
            }
        };
        Ok(value)
    }
}

/// An ordered mapping of partition-field name to key value. The empty
/// mapping is the `NotPartitioned` sentinel.
pub type CompositeKey = BTreeMap<String, PartitionKey>;

/// An ordered mapping of partition-field name to key class.
pub type CompositeKeyTypes = BTreeMap<String, PartitionKeyType>;

/// Per-composite-key input fingerprints for a Producer's output partitions.
pub type InputFingerprints = BTreeMap<CompositeKey, Fingerprint>;

/// The sole dependency key when nothing is partitioned.
pub fn not_partitioned() -> CompositeKey {
    CompositeKey::new()
}

/// Extract the partition scheme of a type: the key class for each
/// `partition_by` field of a Collection, or an empty mapping for scalars.
pub fn composite_key_types(type_: &Type) -> Result<CompositeKeyTypes> {
    let mut key_types = CompositeKeyTypes::new();
    for (name, field_type) in type_.partition_fields() {
        let key_type = PartitionKeyType::from_field_type(field_type).ok_or_else(|| {
            Error::Validation(format!(
                "No partition key registered for field '{}' of type {}",
                name, field_type
            ))
        })?;
        key_types.insert(name.to_string(), key_type);
    }
    Ok(key_types)
}

/// A stable identity for a composite key.
pub fn composite_key_fingerprint(keys: &CompositeKey) -> Fingerprint {
    Fingerprint::from_string(&serde_json::to_string(keys).expect("CompositeKey serializes"))
}

/// Human-oriented rendering for log and error messages.
pub fn display_composite_key(keys: &CompositeKey) -> String {
    if keys.is_empty() {
        return "<not partitioned>".to_string();
    }
    keys.iter()
        .map(|(name, key)| {
            let component = key.key_component("key").unwrap_or_else(|_| "?".to_string());
            format!("{}={}", name, component)
        })
        .join(", ")
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use super::*;

    #[test]
    fn test_date_key_components() {
        let key = PartitionKey::date(2021, 2, 3).unwrap();
        assert_eq!(key.key_component("key").unwrap(), "2021-02-03");
        assert_eq!(key.key_component("iso").unwrap(), "2021-02-03");
        assert_eq!(key.key_component("Y").unwrap(), "2021");
        assert_eq!(key.key_component("m").unwrap(), "2");
        assert_eq!(key.key_component("d").unwrap(), "3");
        assert!(key.key_component("hex").is_err());
    }

    #[test]
    fn test_date_key_parse_combinations() {
        let expected = PartitionKey::date(2021, 2, 3).unwrap();
        let from = |components: BTreeMap<String, String>| {
            PartitionKeyType::Date.from_key_components(&components).unwrap()
        };
        assert_eq!(from(btreemap! {"key".to_string() => "2021-02-03".to_string()}), expected);
        assert_eq!(from(btreemap! {"iso".to_string() => "2021-02-03".to_string()}), expected);
        assert_eq!(
            from(btreemap! {
                "Y".to_string() => "2021".to_string(),
                "m".to_string() => "2".to_string(),
                "d".to_string() => "3".to_string(),
            }),
            expected,
        );
        assert!(PartitionKeyType::Date
            .from_key_components(&btreemap! {"Y".to_string() => "2021".to_string()})
            .is_err());
    }

    #[test]
    fn test_int_key_components() {
        let key = PartitionKey::Int64(31);
        assert_eq!(key.key_component("key").unwrap(), "31");
        assert_eq!(key.key_component("hex").unwrap(), "0x1f");
        assert_eq!(
            PartitionKeyType::Int64
                .from_key_components(&btreemap! {"hex".to_string() => "0x1f".to_string()})
                .unwrap(),
            key,
        );
        assert_eq!(
            PartitionKeyType::Int64
                .from_key_components(&btreemap! {"key".to_string() => "31".to_string()})
                .unwrap(),
            key,
        );
    }

    #[test]
    fn test_null_key() {
        assert_eq!(PartitionKey::Null.key_component("key").unwrap(), "null");
        assert_eq!(
            PartitionKeyType::Null
                .from_key_components(&btreemap! {"key".to_string() => "null".to_string()})
                .unwrap(),
            PartitionKey::Null,
        );
        assert!(PartitionKeyType::Null
            .from_key_components(&btreemap! {"key".to_string() => "1".to_string()})
            .is_err());
    }

    #[test]
    fn test_composite_key_types_from_type() {
        let collection = Type::collection(
            Type::structure(
                "spend",
                vec![
                    ("date".to_string(), Type::date()),
                    ("i".to_string(), Type::int64()),
                    ("amount".to_string(), Type::float64()),
                ],
            ),
            vec!["date".to_string(), "i".to_string()],
            vec![],
        )
        .unwrap();
        assert_eq!(
            composite_key_types(&collection).unwrap(),
            btreemap! {
                "date".to_string() => PartitionKeyType::Date,
                "i".to_string() => PartitionKeyType::Int64,
            },
        );
        assert!(composite_key_types(&Type::int64()).unwrap().is_empty());
    }

    #[test]
    fn test_non_partitionable_field() {
        let collection = Type::collection(
            Type::structure("anon", vec![("amount".to_string(), Type::float64())]),
            vec!["amount".to_string()],
            vec![],
        )
        .unwrap();
        assert!(composite_key_types(&collection).is_err());
    }

    #[test]
    fn test_composite_key_fingerprint_is_stable() {
        let keys = btreemap! {"i".to_string() => PartitionKey::Int64(1)};
        assert_eq!(composite_key_fingerprint(&keys), composite_key_fingerprint(&keys.clone()));
        assert_ne!(
            composite_key_fingerprint(&keys),
            composite_key_fingerprint(&not_partitioned()),
        );
    }
}
