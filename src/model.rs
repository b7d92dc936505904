use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::directory::OccupantRecord;

/// Amounts are carried in minor currency units (e.g. cents).
pub type Money = u64;

/// Room status. `Maintenance` and `Blocked` are administrative and sticky:
/// assignment traffic never overwrites them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Available,
    Occupied,
    Maintenance,
    Blocked,
}

impl RoomStatus {
    pub fn is_sticky(self) -> bool {
        matches!(self, RoomStatus::Maintenance | RoomStatus::Blocked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Occupied => "occupied",
            RoomStatus::Maintenance => "maintenance",
            RoomStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Single,
    Double,
    Triple,
    Quad,
    Dormitory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Amenity {
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "WiFi")]
    WiFi,
    #[serde(rename = "Attached Bathroom")]
    AttachedBathroom,
    Balcony,
    #[serde(rename = "Study Table")]
    StudyTable,
    Wardrobe,
    Fan,
    Window,
    Geyser,
    Refrigerator,
}

/// Trim and upper-case a room number so "a-101 " and "A-101" collide.
pub fn normalize_room_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// A physical room. `occupants` is the authoritative membership set;
/// `current_occupancy` and `status` are derived from it on every applied event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub room_number: String,
    pub floor: u32,
    pub capacity: u32,
    /// Occupant ids in assignment order, no duplicates.
    pub occupants: Vec<Ulid>,
    pub current_occupancy: u32,
    pub status: RoomStatus,
    pub room_type: RoomType,
    pub monthly_rent: Money,
    pub security_deposit: Money,
    pub amenities: Vec<Amenity>,
    pub description: Option<String>,
    /// Bumped by every applied event; the compare-and-swap token.
    pub version: u64,
}

impl Room {
    pub fn new(id: Ulid, new_room: &NewRoom) -> Self {
        Self {
            id,
            room_number: normalize_room_number(&new_room.room_number),
            floor: new_room.floor,
            capacity: new_room.capacity,
            occupants: Vec::new(),
            current_occupancy: 0,
            status: new_room.status,
            room_type: new_room.room_type,
            monthly_rent: new_room.monthly_rent,
            security_deposit: new_room.security_deposit,
            amenities: new_room.amenities.clone(),
            description: new_room.description.clone(),
            version: 0,
        }
    }

    pub fn has_occupant(&self, occupant_id: &Ulid) -> bool {
        self.occupants.contains(occupant_id)
    }

    pub fn free_slots(&self) -> u32 {
        self.capacity.saturating_sub(self.current_occupancy)
    }

    pub fn is_available(&self) -> bool {
        self.status == RoomStatus::Available && self.current_occupancy < self.capacity
    }

    /// Rounded occupancy percentage.
    pub fn occupancy_percentage(&self) -> u32 {
        if self.capacity == 0 {
            return 0;
        }
        (self.current_occupancy * 100 + self.capacity / 2) / self.capacity
    }
}

/// Input for creating a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoom {
    pub room_number: String,
    pub floor: u32,
    pub capacity: u32,
    pub room_type: RoomType,
    pub monthly_rent: Money,
    pub security_deposit: Money,
    pub amenities: Vec<Amenity>,
    pub description: Option<String>,
    /// Initial status; only `Available`, `Maintenance` or `Blocked` are accepted.
    pub status: RoomStatus,
}

impl NewRoom {
    pub fn new(room_number: impl Into<String>, floor: u32, capacity: u32, room_type: RoomType) -> Self {
        Self {
            room_number: room_number.into(),
            floor,
            capacity,
            room_type,
            monthly_rent: 0,
            security_deposit: 0,
            amenities: Vec::new(),
            description: None,
            status: RoomStatus::Available,
        }
    }
}

/// Partial administrative update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUpdate {
    pub room_number: Option<String>,
    pub floor: Option<u32>,
    pub capacity: Option<u32>,
    pub room_type: Option<RoomType>,
    pub monthly_rent: Option<Money>,
    pub security_deposit: Option<Money>,
    pub amenities: Option<Vec<Amenity>>,
    pub description: Option<Option<String>>,
}

/// Flat event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        room_number: String,
        floor: u32,
        capacity: u32,
        room_type: RoomType,
        monthly_rent: Money,
        security_deposit: Money,
        amenities: Vec<Amenity>,
        description: Option<String>,
        status: RoomStatus,
    },
    RoomUpdated {
        id: Ulid,
        room_number: String,
        floor: u32,
        capacity: u32,
        room_type: RoomType,
        monthly_rent: Money,
        security_deposit: Money,
        amenities: Vec<Amenity>,
        description: Option<String>,
    },
    RoomStatusSet {
        id: Ulid,
        status: RoomStatus,
    },
    RoomDeleted {
        id: Ulid,
    },
    OccupantAssigned {
        room_id: Ulid,
        occupant_id: Ulid,
    },
    OccupantRemoved {
        room_id: Ulid,
        occupant_id: Ulid,
    },
}

impl Event {
    pub fn room_id(&self) -> Ulid {
        match self {
            Event::RoomCreated { id, .. }
            | Event::RoomUpdated { id, .. }
            | Event::RoomStatusSet { id, .. }
            | Event::RoomDeleted { id } => *id,
            Event::OccupantAssigned { room_id, .. } | Event::OccupantRemoved { room_id, .. } => {
                *room_id
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::RoomCreated { .. } => "room_created",
            Event::RoomUpdated { .. } => "room_updated",
            Event::RoomStatusSet { .. } => "room_status_set",
            Event::RoomDeleted { .. } => "room_deleted",
            Event::OccupantAssigned { .. } => "occupant_assigned",
            Event::OccupantRemoved { .. } => "occupant_removed",
        }
    }
}

// ── Query types ──────────────────────────────────────────────────

/// A room with its occupant list resolved through the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomView {
    pub room: Room,
    /// Records for occupants the directory could resolve, in membership order.
    pub occupants: Vec<OccupantRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomFilter {
    pub status: Option<RoomStatus>,
    pub floor: Option<u32>,
    pub capacity: Option<u32>,
    pub room_type: Option<RoomType>,
    /// Case-insensitive substring of the room number.
    pub search: Option<String>,
    /// 1-based page number (defaults to 1).
    pub page: Option<usize>,
    /// Page size (defaults to 10, clamped to 1..=100).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPage {
    pub rooms: Vec<Room>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}
