//! Serialization format descriptors.

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::types::json::JSON_TYPE_SYSTEM;
use crate::types::Type;

/// Discriminates formats for IO dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Json,
}

/// A serialization format, tied to the type system that decides which types
/// it can express.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Json { extension: String },
}

impl Format {
    pub fn json() -> Format {
        Format::Json { extension: "json".to_string() }
    }

    pub fn json_with_extension<S: Into<String>>(extension: S) -> Format {
        Format::Json { extension: extension.into() }
    }

    pub fn kind(&self) -> FormatKind {
        match *self {
            Format::Json { .. } => FormatKind::Json,
        }
    }

    pub fn extension(&self) -> &str {
        match *self {
            Format::Json { ref extension } => extension,
        }
    }

    /// Whether this format can express `type_`.
    pub fn supports(&self, type_: &Type) -> Result<()> {
        match *self {
            Format::Json { .. } => {
                if !JSON_TYPE_SYSTEM.supports(type_) {
                    return Err(Error::Validation(format!(
                        "JSON format does not support type: {}",
                        type_
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match *self {
            Format::Json { ref extension } => {
                Fingerprint::from_string(&format!("Json:{}", extension))
            }
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Format::Json { ref extension } => write!(f, "Json({})", extension),
        }
    }
}
