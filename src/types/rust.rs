//! The Rust-native type system: bridges between host scalars and Artigraph
//! types, backing the literal cast table used during graph assembly.

use std::sync::Arc;

use lazy_static::lazy_static;
use serde_json::Value;

use crate::error::Result;
use crate::types::{Type, TypeAdapter, TypeKind, TypeSystem};

/// Tags for the host-language values the cast table understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RustType {
    Bool,
    F64,
    I64,
    Str,
    Unit,
}

lazy_static! {
    pub static ref RUST_TYPE_SYSTEM: TypeSystem<RustType> = {
        let mut system = TypeSystem::new("rust");
        system.register(Arc::new(ScalarAdapter {
            key: "rust.Bool",
            rust: RustType::Bool,
            kind: TypeKind::Boolean,
        }));
        system.register(Arc::new(ScalarAdapter {
            key: "rust.F64",
            rust: RustType::F64,
            kind: TypeKind::Float64,
        }));
        system.register(Arc::new(ScalarAdapter {
            key: "rust.I64",
            rust: RustType::I64,
            kind: TypeKind::Int64,
        }));
        system.register(Arc::new(ScalarAdapter {
            key: "rust.Str",
            rust: RustType::Str,
            kind: TypeKind::String,
        }));
        system.register(Arc::new(ScalarAdapter {
            key: "rust.Unit",
            rust: RustType::Unit,
            kind: TypeKind::Null,
        }));
        system
    };
}

struct ScalarAdapter {
    key: &'static str,
    rust: RustType,
    kind: TypeKind,
}

impl TypeAdapter<RustType> for ScalarAdapter {
    fn key(&self) -> &'static str {
        self.key
    }

    fn matches_artigraph(&self, type_: &Type) -> bool {
        type_.kind == self.kind
    }

    fn to_artigraph(&self, _type_: &RustType) -> Result<Type> {
        Ok(Type::new(self.kind.clone()))
    }

    fn matches_system(&self, type_: &RustType) -> bool {
        *type_ == self.rust
    }

    fn to_system(&self, _type_: &Type) -> Result<RustType> {
        Ok(self.rust)
    }
}

/// A host value that can be cast to a literal Artifact.
///
/// Implementations supply the type tag (resolved to an Artigraph `Type`
/// through `RUST_TYPE_SYSTEM`) and the JSON datum stored in the literal.
pub trait LiteralValue {
    fn rust_type(&self) -> RustType;

    fn to_datum(&self) -> Value;
}

impl LiteralValue for bool {
    fn rust_type(&self) -> RustType {
        RustType::Bool
    }

    fn to_datum(&self) -> Value {
        Value::Bool(*self)
    }
}

impl LiteralValue for f64 {
    fn rust_type(&self) -> RustType {
        RustType::F64
    }

    fn to_datum(&self) -> Value {
        serde_json::json!(*self)
    }
}

impl LiteralValue for i64 {
    fn rust_type(&self) -> RustType {
        RustType::I64
    }

    fn to_datum(&self) -> Value {
        Value::from(*self)
    }
}

impl LiteralValue for &str {
    fn rust_type(&self) -> RustType {
        RustType::Str
    }

    fn to_datum(&self) -> Value {
        Value::String((*self).to_string())
    }
}

impl LiteralValue for String {
    fn rust_type(&self) -> RustType {
        RustType::Str
    }

    fn to_datum(&self) -> Value {
        Value::String(self.clone())
    }
}
