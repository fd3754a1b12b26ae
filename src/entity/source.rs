//! Object source (provenance) of an entity

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where an entity came from. Decides whether it may carry an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectSource {
    /// Loaded from the store
    Database,
    /// Read from an import file, not yet persisted
    Import,
    /// Created by the user, not yet persisted
    UserNew,
    /// Edited copy of a stored entity
    DbEdit,
    /// Derived by computation, not yet persisted
    Computed,
    /// Read back from a backup that kept its ids
    Restore,
    /// Shipped with the application
    Inbuilt,
    /// Test fixture, unconstrained
    Test,
}

impl ObjectSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectSource::Database => "database",
            ObjectSource::Import => "import",
            ObjectSource::UserNew => "user_new",
            ObjectSource::DbEdit => "db_edit",
            ObjectSource::Computed => "computed",
            ObjectSource::Restore => "restore",
            ObjectSource::Inbuilt => "inbuilt",
            ObjectSource::Test => "test",
        }
    }

    pub fn all() -> &'static [ObjectSource] {
        &[
            ObjectSource::Database,
            ObjectSource::Import,
            ObjectSource::UserNew,
            ObjectSource::DbEdit,
            ObjectSource::Computed,
            ObjectSource::Restore,
            ObjectSource::Inbuilt,
            ObjectSource::Test,
        ]
    }

    /// Sources whose entities must carry an id
    pub fn requires_id(&self) -> bool {
        matches!(
            self,
            ObjectSource::Database | ObjectSource::DbEdit | ObjectSource::Restore | ObjectSource::Inbuilt
        )
    }

    /// Sources whose entities must not carry an id
    pub fn forbids_id(&self) -> bool {
        matches!(
            self,
            ObjectSource::Import | ObjectSource::UserNew | ObjectSource::Computed
        )
    }

    /// Sources allowed to hold pending foreign key references
    pub fn is_pending(&self) -> bool {
        self.forbids_id() || *self == ObjectSource::Test
    }

    /// Check the id invariant for this source
    pub fn check_id(&self, table: &str, id: Option<i64>) -> Result<()> {
        match id {
            Some(id) if self.forbids_id() => Err(Error::Integrity(format!(
                "{} object from {} must not have an id (found {})",
                table,
                self.as_str(),
                id
            ))),
            None if self.requires_id() => Err(Error::Integrity(format!(
                "{} object from {} must have an id",
                table,
                self.as_str()
            ))),
            _ => Ok(()),
        }
    }
}

impl FromStr for ObjectSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectSource::all()
            .iter()
            .copied()
            .find(|src| src.as_str() == s.to_lowercase())
            .ok_or_else(|| Error::Type(format!("Unknown object source: {}", s)))
    }
}

impl std::fmt::Display for ObjectSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
