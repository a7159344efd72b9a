//! Structural type model and pluggable adapters to foreign type systems.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;

pub mod json;
pub mod rust;

/// Timestamp precision, finest to coarsest ordering not significant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimePrecision {
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

/// The closed world of data shapes Artigraph understands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Binary,
    Boolean,
    Date,
    DateTime,
    Time,
    Timestamp { precision: TimePrecision },
    Float16,
    Float32,
    Float64,
    Geography,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Null,
    String,
    List { element: Box<Type> },
    Set { element: Box<Type> },
    Map { key: Box<Type>, value: Box<Type> },
    Struct { name: String, fields: Vec<(String, Type)> },
    Collection {
        element: Box<Type>,
        partition_by: Vec<String>,
        cluster_by: Vec<String>,
    },
}

/// A data type: a `TypeKind` plus the common attributes every type carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Type {
    pub kind: TypeKind,
    pub nullable: bool,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl Type {
    pub fn new(kind: TypeKind) -> Type {
        Type {
            kind,
            nullable: false,
            description: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn boolean() -> Type {
        Type::new(TypeKind::Boolean)
    }

    pub fn date() -> Type {
        Type::new(TypeKind::Date)
    }

    pub fn float64() -> Type {
        Type::new(TypeKind::Float64)
    }

    pub fn int64() -> Type {
        Type::new(TypeKind::Int64)
    }

    pub fn null() -> Type {
        Type::new(TypeKind::Null)
    }

    pub fn string() -> Type {
        Type::new(TypeKind::String)
    }

    pub fn list(element: Type) -> Type {
        Type::new(TypeKind::List { element: Box::new(element) })
    }

    pub fn structure<S: Into<String>>(name: S, fields: Vec<(String, Type)>) -> Type {
        Type::new(TypeKind::Struct { name: name.into(), fields })
    }

    /// A partitionable collection of `element` Structs.
    ///
    /// The element must be a Struct and every `partition_by`/`cluster_by`
    /// entry must name one of its fields.
    pub fn collection(
        element: Type,
        partition_by: Vec<String>,
        cluster_by: Vec<String>,
    ) -> Result<Type> {
        let fields = match element.kind {
            TypeKind::Struct { ref fields, .. } => fields,
            _ => {
                return Err(Error::Validation(format!(
                    "Collection element must be a Struct, got: {}",
                    element
                )))
            }
        };
        for name in partition_by.iter().chain(cluster_by.iter()) {
            if !fields.iter().any(|(field, _)| field == name) {
                return Err(Error::Validation(format!(
                    "Collection refers to '{}', which is not a field of the element Struct",
                    name
                )));
            }
        }
        Ok(Type::new(TypeKind::Collection {
            element: Box::new(element),
            partition_by,
            cluster_by,
        }))
    }

    pub fn with_nullable(mut self, nullable: bool) -> Type {
        self.nullable = nullable;
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Type {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Type {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether values of this type are addressed by partition keys.
    pub fn is_partitioned(&self) -> bool {
        match self.kind {
            TypeKind::Collection { ref partition_by, .. } => !partition_by.is_empty(),
            _ => false,
        }
    }

    /// The `(field name, field type)` pairs named by `partition_by`, in
    /// declaration order. Empty for unpartitioned types.
    pub fn partition_fields(&self) -> Vec<(&str, &Type)> {
        match self.kind {
            TypeKind::Collection { ref element, ref partition_by, .. } => {
                let fields = match element.kind {
                    TypeKind::Struct { ref fields, .. } => fields,
                    _ => return vec![],
                };
                partition_by
                    .iter()
                    .filter_map(|name| {
                        fields
                            .iter()
                            .find(|(field, _)| field == name)
                            .map(|(field, type_)| (field.as_str(), type_))
                    })
                    .collect()
            }
            _ => vec![],
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        // serde output over this model is deterministic: all maps are ordered.
        Fingerprint::from_string(&serde_json::to_string(self).expect("Type serializes"))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Struct { ref name, .. } => write!(f, "Struct({})", name),
            TypeKind::Collection { ref element, ref partition_by, .. } => {
                write!(f, "Collection({}, partition_by={:?})", element, partition_by)
            }
            TypeKind::List { ref element } => write!(f, "List({})", element),
            ref kind => write!(f, "{:?}", kind),
        }
    }
}

/// Maps between Artigraph types and one type of a foreign type system `S`.
pub trait TypeAdapter<S>: Send + Sync {
    fn key(&self) -> &'static str;

    /// Higher priority adapters win on dispatch.
    fn priority(&self) -> i32 {
        0
    }

    fn matches_artigraph(&self, type_: &Type) -> bool;

    fn to_artigraph(&self, type_: &S) -> Result<Type>;

    fn matches_system(&self, type_: &S) -> bool;

    fn to_system(&self, type_: &Type) -> Result<S>;
}

/// A registry of `TypeAdapter`s bridging Artigraph to one foreign system.
///
/// Dispatch scans adapters in descending priority and uses the first match.
/// A system built with `extend` inherits its parent's adapters beneath its
/// own, so local registrations always win ties against inherited ones.
pub struct TypeSystem<S> {
    key: String,
    // tiers[0] holds this system's own adapters; later tiers are inherited.
    tiers: Vec<Vec<Arc<dyn TypeAdapter<S>>>>,
}

impl<S> TypeSystem<S> {
    pub fn new<K: Into<String>>(key: K) -> TypeSystem<S> {
        TypeSystem { key: key.into(), tiers: vec![vec![]] }
    }

    pub fn extend<K: Into<String>>(key: K, parent: &TypeSystem<S>) -> TypeSystem<S> {
        let mut tiers = vec![vec![]];
        tiers.extend(parent.tiers.iter().cloned());
        TypeSystem { key: key.into(), tiers }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn register(&mut self, adapter: Arc<dyn TypeAdapter<S>>) {
        self.tiers[0].push(adapter);
    }

    fn priority_sorted(&self) -> impl Iterator<Item = &Arc<dyn TypeAdapter<S>>> {
        self.tiers.iter().flat_map(|tier| {
            let mut sorted: Vec<_> = tier.iter().collect();
            sorted.sort_by_key(|adapter| -adapter.priority());
            sorted
        })
    }

    pub fn to_artigraph(&self, type_: &S) -> Result<Type>
    where
        S: fmt::Debug,
    {
        for adapter in self.priority_sorted() {
            if adapter.matches_system(type_) {
                return adapter.to_artigraph(type_);
            }
        }
        Err(Error::Validation(format!(
            "No '{}' adapter for system type: {:?}",
            self.key, type_
        )))
    }

    pub fn to_system(&self, type_: &Type) -> Result<S> {
        for adapter in self.priority_sorted() {
            if adapter.matches_artigraph(type_) {
                return adapter.to_system(type_);
            }
        }
        Err(Error::Validation(format!(
            "No '{}' adapter for Artigraph type: {}",
            self.key, type_
        )))
    }

    /// Whether some adapter can express `type_` in this system.
    pub fn supports(&self, type_: &Type) -> bool {
        self.priority_sorted().any(|adapter| adapter.matches_artigraph(type_))
    }
}
