//! The JSON type system: the reference foreign system used by the JSON
//! format to decide which Artigraph types it can serialize.

use std::sync::Arc;

use lazy_static::lazy_static;

use crate::error::Result;
use crate::types::{Type, TypeAdapter, TypeKind, TypeSystem};

/// The shapes a JSON document can take.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonType {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Array(Box<JsonType>),
    Object(Vec<(String, JsonType)>),
}

lazy_static! {
    pub static ref JSON_TYPE_SYSTEM: TypeSystem<JsonType> = {
        let mut system = TypeSystem::new("json");
        system.register(Arc::new(NullAdapter));
        system.register(Arc::new(BooleanAdapter));
        system.register(Arc::new(IntegerAdapter));
        system.register(Arc::new(FloatAdapter));
        system.register(Arc::new(StringAdapter));
        system.register(Arc::new(DateAdapter));
        system.register(Arc::new(ListAdapter));
        system.register(Arc::new(StructAdapter));
        system.register(Arc::new(CollectionAdapter));
        system
    };
}

struct NullAdapter;

impl TypeAdapter<JsonType> for NullAdapter {
    fn key(&self) -> &'static str {
        "json.Null"
    }

    fn matches_artigraph(&self, type_: &Type) -> bool {
        type_.kind == TypeKind::Null
    }

    fn to_artigraph(&self, _type_: &JsonType) -> Result<Type> {
        Ok(Type::null())
    }

    fn matches_system(&self, type_: &JsonType) -> bool {
        *type_ == JsonType::Null
    }

    fn to_system(&self, _type_: &Type) -> Result<JsonType> {
        Ok(JsonType::Null)
    }
}

struct BooleanAdapter;

impl TypeAdapter<JsonType> for BooleanAdapter {
    fn key(&self) -> &'static str {
        "json.Boolean"
    }

    fn matches_artigraph(&self, type_: &Type) -> bool {
        type_.kind == TypeKind::Boolean
    }

    fn to_artigraph(&self, _type_: &JsonType) -> Result<Type> {
        Ok(Type::boolean())
    }

    fn matches_system(&self, type_: &JsonType) -> bool {
        *type_ == JsonType::Boolean
    }

    fn to_system(&self, _type_: &Type) -> Result<JsonType> {
        Ok(JsonType::Boolean)
    }
}

/// All integral widths serialize to a JSON number; parsing defaults to Int64.
struct IntegerAdapter;

impl TypeAdapter<JsonType> for IntegerAdapter {
    fn key(&self) -> &'static str {
        "json.Integer"
    }

    fn matches_artigraph(&self, type_: &Type) -> bool {
        matches!(
            type_.kind,
            TypeKind::Int8
                | TypeKind::Int16
                | TypeKind::Int32
                | TypeKind::Int64
                | TypeKind::UInt8
                | TypeKind::UInt16
                | TypeKind::UInt32
                | TypeKind::UInt64
        )
    }

    fn to_artigraph(&self, _type_: &JsonType) -> Result<Type> {
        Ok(Type::int64())
    }

    fn matches_system(&self, type_: &JsonType) -> bool {
        *type_ == JsonType::Integer
    }

    fn to_system(&self, _type_: &Type) -> Result<JsonType> {
        Ok(JsonType::Integer)
    }
}

struct FloatAdapter;

impl TypeAdapter<JsonType> for FloatAdapter {
    fn key(&self) -> &'static str {
        "json.Float"
    }

    fn matches_artigraph(&self, type_: &Type) -> bool {
        matches!(type_.kind, TypeKind::Float16 | TypeKind::Float32 | TypeKind::Float64)
    }

    fn to_artigraph(&self, _type_: &JsonType) -> Result<Type> {
        Ok(Type::float64())
    }

    fn matches_system(&self, type_: &JsonType) -> bool {
        *type_ == JsonType::Float
    }

    fn to_system(&self, _type_: &Type) -> Result<JsonType> {
        Ok(JsonType::Float)
    }
}

struct StringAdapter;

impl TypeAdapter<JsonType> for StringAdapter {
    fn key(&self) -> &'static str {
        "json.String"
    }

    fn matches_artigraph(&self, type_: &Type) -> bool {
        type_.kind == TypeKind::String
    }

    fn to_artigraph(&self, _type_: &JsonType) -> Result<Type> {
        Ok(Type::string())
    }

    fn matches_system(&self, type_: &JsonType) -> bool {
        *type_ == JsonType::String
    }

    fn to_system(&self, _type_: &Type) -> Result<JsonType> {
        Ok(JsonType::String)
    }
}

/// Dates render as ISO strings. One-way: a bare JSON string parses back as
/// String, not Date.
struct DateAdapter;

impl TypeAdapter<JsonType> for DateAdapter {
    fn key(&self) -> &'static str {
        "json.Date"
    }

    fn matches_artigraph(&self, type_: &Type) -> bool {
        matches!(type_.kind, TypeKind::Date | TypeKind::DateTime | TypeKind::Time)
    }

    fn to_artigraph(&self, _type_: &JsonType) -> Result<Type> {
        Ok(Type::string())
    }

    fn matches_system(&self, _type_: &JsonType) -> bool {
        false
    }

    fn to_system(&self, _type_: &Type) -> Result<JsonType> {
        Ok(JsonType::String)
    }
}

struct ListAdapter;

impl TypeAdapter<JsonType> for ListAdapter {
    fn key(&self) -> &'static str {
        "json.List"
    }

    fn matches_artigraph(&self, type_: &Type) -> bool {
        matches!(type_.kind, TypeKind::List { .. } | TypeKind::Set { .. })
    }

    fn to_artigraph(&self, type_: &JsonType) -> Result<Type> {
        match type_ {
            JsonType::Array(element) => Ok(Type::list(JSON_TYPE_SYSTEM.to_artigraph(element)?)),
            _ => unreachable!("guarded by matches_system"),
        }
    }

    fn matches_system(&self, type_: &JsonType) -> bool {
        matches!(type_, JsonType::Array(_))
    }

    fn to_system(&self, type_: &Type) -> Result<JsonType> {
        match type_.kind {
            TypeKind::List { ref element } | TypeKind::Set { ref element } => Ok(JsonType::Array(
                Box::new(JSON_TYPE_SYSTEM.to_system(element)?),
            )),
            _ => unreachable!("guarded by matches_artigraph"),
        }
    }
}

struct StructAdapter;

impl TypeAdapter<JsonType> for StructAdapter {
    fn key(&self) -> &'static str {
        "json.Struct"
    }

    fn matches_artigraph(&self, type_: &Type) -> bool {
        matches!(type_.kind, TypeKind::Struct { .. })
    }

    fn to_artigraph(&self, type_: &JsonType) -> Result<Type> {
        match type_ {
            JsonType::Object(fields) => {
                let fields = fields
                    .iter()
                    .map(|(name, field)| {
                        Ok((name.clone(), JSON_TYPE_SYSTEM.to_artigraph(field)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Type::structure("anon", fields))
            }
            _ => unreachable!("guarded by matches_system"),
        }
    }

    fn matches_system(&self, type_: &JsonType) -> bool {
        matches!(type_, JsonType::Object(_))
    }

    fn to_system(&self, type_: &Type) -> Result<JsonType> {
        match type_.kind {
            TypeKind::Struct { ref fields, .. } => {
                let fields = fields
                    .iter()
                    .map(|(name, field)| Ok((name.clone(), JSON_TYPE_SYSTEM.to_system(field)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(JsonType::Object(fields))
            }
            _ => unreachable!("guarded by matches_artigraph"),
        }
    }
}

/// Collections serialize as an array of element objects. One-way: the
/// partition scheme cannot be recovered from the serialized shape.
struct CollectionAdapter;

impl TypeAdapter<JsonType> for CollectionAdapter {
    fn key(&self) -> &'static str {
        "json.Collection"
    }

    fn matches_artigraph(&self, type_: &Type) -> bool {
        matches!(type_.kind, TypeKind::Collection { .. })
    }

    fn to_artigraph(&self, _type_: &JsonType) -> Result<Type> {
        unreachable!("never matches_system")
    }

    fn matches_system(&self, _type_: &JsonType) -> bool {
        false
    }

    fn to_system(&self, type_: &Type) -> Result<JsonType> {
        match type_.kind {
            TypeKind::Collection { ref element, .. } => Ok(JsonType::Array(Box::new(
                JSON_TYPE_SYSTEM.to_system(element)?,
            ))),
            _ => unreachable!("guarded by matches_artigraph"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trips() {
        for type_ in vec![
            Type::null(),
            Type::boolean(),
            Type::int64(),
            Type::float64(),
            Type::string(),
        ] {
            let system = JSON_TYPE_SYSTEM.to_system(&type_).unwrap();
            assert_eq!(JSON_TYPE_SYSTEM.to_artigraph(&system).unwrap(), type_);
        }
    }

    #[test]
    fn test_container_round_trips() {
        let type_ = Type::list(Type::structure(
            "anon",
            vec![("i".to_string(), Type::int64())],
        ));
        let system = JSON_TYPE_SYSTEM.to_system(&type_).unwrap();
        assert_eq!(JSON_TYPE_SYSTEM.to_artigraph(&system).unwrap(), type_);
    }

    #[test]
    fn test_lossy_mappings() {
        // Narrow integers widen to Int64 on the way back.
        let system = JSON_TYPE_SYSTEM.to_system(&Type::new(TypeKind::Int16)).unwrap();
        assert_eq!(JSON_TYPE_SYSTEM.to_artigraph(&system).unwrap(), Type::int64());
        // Dates render as strings.
        assert_eq!(JSON_TYPE_SYSTEM.to_system(&Type::date()).unwrap(), JsonType::String);
    }

    #[test]
    fn test_unsupported_type() {
        let geography = Type::new(TypeKind::Geography);
        assert!(!JSON_TYPE_SYSTEM.supports(&geography));
        assert!(JSON_TYPE_SYSTEM.to_system(&geography).is_err());
    }

    #[test]
    fn test_collection_serializes_as_array() {
        let collection = Type::collection(
            Type::structure("anon", vec![("i".to_string(), Type::int64())]),
            vec!["i".to_string()],
            vec![],
        )
        .unwrap();
        match JSON_TYPE_SYSTEM.to_system(&collection).unwrap() {
            JsonType::Array(element) => assert!(matches!(*element, JsonType::Object(_))),
            other => panic!("expected an array, got {:?}", other),
        }
    }
}
