// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed identifiers.
//!
//! Every entity gets its own newtype over a UUIDv4 so a `RunId` can never
//! be handed to an API expecting a `WorkspaceId`. IDs serialize as the
//! canonical hyphenated string.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error parsing an identifier from its string form.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid id {input:?}: {reason}")]
pub struct IdError {
    pub input: String,
    pub reason: String,
}

/// Define a newtype ID wrapper over [`uuid::Uuid`].
///
/// Generates `new()` for random generation, `parse()` for the string form,
/// `as_uuid()`, plus `Display`, `FromStr`, and transparent serde.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random (v4) identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from the canonical hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, $crate::id::IdError> {
                Uuid::parse_str(s).map(Self).map_err(|e| $crate::id::IdError {
                    input: s.to_string(),
                    reason: e.to_string(),
                })
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::id::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

define_id! {
    /// Identity anchor; owner of every other row.
    pub struct UserId;
}

define_id! {
    /// Credential row consumed by the external auth layer.
    pub struct ApiKeyId;
}

define_id! {
    /// Logical grouping owning at most one workspace at a time.
    pub struct ProjectId;
}

define_id! {
    /// Durable handle to a sandbox container + volume.
    pub struct WorkspaceId;
}

define_id! {
    /// One prompt execution against a warm workspace.
    pub struct RunId;
}

define_id! {
    /// Evidence bundle row, unique per run.
    pub struct BundleId;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
