//! Shared identifier wrappers for Corral.
//!
//! All coordinator entities are addressed by opaque string identifiers.
//! `generate()` produces a UUIDv4-backed id; callers may also supply their
//! own (any non-empty string is a valid identifier).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Error returned when parsing an identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_opaque_id {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh UUIDv4-backed identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap a caller-supplied identifier. Empty strings are rejected.
            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                if value.trim().is_empty() {
                    return Err(IdParseError::new(format!("Empty {}", $label)));
                }
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_opaque_id!(AgentId, "agent ID");
define_opaque_id!(NodeId, "node ID");
define_opaque_id!(JobId, "job ID");
define_opaque_id!(ProofId, "proof ID");
define_opaque_id!(SnapshotId, "snapshot ID");
define_opaque_id!(ComponentId, "component ID");
