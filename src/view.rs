//! In-memory representation contracts.
//!
//! A `View` declares how a Producer wants to see (or emit) an Artifact's
//! data: the access mode, the expected type, and the in-memory
//! representation used to select a read/write implementation.

use enumset::{EnumSet, EnumSetType};

use crate::artifact::Artifact;
use crate::error::{Error, Result};
use crate::types::Type;

#[derive(EnumSetType, Debug, Hash)]
pub enum Access {
    Read,
    Write,
}

/// Discriminates in-memory representations for IO dispatch. The reference
/// representation is a JSON datum (`serde_json::Value`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Representation {
    Json,
}

#[derive(Clone, Debug, PartialEq)]
pub struct View {
    pub mode: EnumSet<Access>,
    pub type_: Type,
    pub representation: Representation,
}

impl View {
    pub fn read(type_: Type) -> View {
        View {
            mode: EnumSet::only(Access::Read),
            type_,
            representation: Representation::Json,
        }
    }

    pub fn write(type_: Type) -> View {
        View {
            mode: EnumSet::only(Access::Write),
            type_,
            representation: Representation::Json,
        }
    }

    pub fn read_write(type_: Type) -> View {
        View {
            mode: Access::Read | Access::Write,
            type_,
            representation: Representation::Json,
        }
    }

    /// Check that this view can be used against `artifact`: the types must
    /// match and a read/write handler must be registered for every access
    /// this view's mode requires.
    pub fn check_artifact_compatibility(&self, artifact: &Artifact) -> Result<()> {
        if self.type_ != artifact.type_ {
            return Err(Error::Validation(format!(
                "the specified Type ({}) is not compatible with the Artifact's Type ({})",
                self.type_, artifact.type_
            )));
        }
        if self.mode.contains(Access::Read) {
            crate::io::registry().lookup_read(
                &artifact.type_,
                &artifact.format,
                artifact.storage.kind(),
                self,
            )?;
        }
        if self.mode.contains(Access::Write) {
            crate::io::registry().lookup_write(
                &artifact.type_,
                &artifact.format,
                artifact.storage.kind(),
                self,
            )?;
        }
        Ok(())
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.representation, self.type_)
    }
}
