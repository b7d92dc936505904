//! The occupant directory is an external collaborator: it owns identity and
//! approval, and keeps a cached room reference per occupant that the engine
//! instructs it to update.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupantRecord {
    pub id: Ulid,
    pub name: String,
    pub approved: bool,
    /// Cached reference; room membership in the engine is authoritative.
    pub room_id: Option<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryError(pub String);

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "directory error: {}", self.0)
    }
}

impl std::error::Error for DirectoryError {}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn lookup(&self, occupant_id: Ulid) -> Result<Option<OccupantRecord>, DirectoryError>;

    /// Idempotently record the occupant's room reference.
    async fn set_room(&self, occupant_id: Ulid, room_id: Option<Ulid>) -> Result<(), DirectoryError>;

    /// `None` when the occupant does not exist.
    async fn is_approved_occupant(&self, occupant_id: Ulid) -> Result<Option<bool>, DirectoryError> {
        Ok(self.lookup(occupant_id).await?.map(|r| r.approved))
    }

    async fn current_room_of(&self, occupant_id: Ulid) -> Result<Option<Ulid>, DirectoryError> {
        Ok(self.lookup(occupant_id).await?.and_then(|r| r.room_id))
    }
}

/// Directory kept in process memory. Used by embedders without a separate
/// identity service, and by tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    occupants: DashMap<Ulid, OccupantRecord>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an occupant with no room.
    pub fn register(&self, id: Ulid, name: impl Into<String>, approved: bool) {
        self.occupants.insert(
            id,
            OccupantRecord {
                id,
                name: name.into(),
                approved,
                room_id: None,
            },
        );
    }

    pub fn set_approved(&self, id: &Ulid, approved: bool) -> bool {
        match self.occupants.get_mut(id) {
            Some(mut record) => {
                record.approved = approved;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &Ulid) -> Option<OccupantRecord> {
        self.occupants.get(id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.occupants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn lookup(&self, occupant_id: Ulid) -> Result<Option<OccupantRecord>, DirectoryError> {
        Ok(self.get(&occupant_id))
    }

    async fn set_room(&self, occupant_id: Ulid, room_id: Option<Ulid>) -> Result<(), DirectoryError> {
        match self.occupants.get_mut(&occupant_id) {
            Some(mut record) => {
                record.room_id = room_id;
                Ok(())
            }
            None => Err(DirectoryError(format!("unknown occupant {occupant_id}"))),
        }
    }
}
