//! Pure room invariants. Nothing here touches storage or raises: every check
//! returns an outcome for the assignment layer to translate.

use std::collections::HashMap;

use ulid::Ulid;

use crate::limits::{MAX_CAPACITY, MIN_CAPACITY};
use crate::model::{Room, RoomStatus};

use super::error::IneligibleReason;

/// What the checker needs to know about an occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupantState {
    pub id: Ulid,
    pub approved: bool,
    /// Room the occupant is currently a member of, per room membership.
    pub room_id: Option<Ulid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignRejection {
    AlreadyFull,
    AlreadyAssigned,
    RoomNotAvailable,
    OccupantNotEligible(IneligibleReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveRejection {
    NotAssignedHere,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    OccupancyMismatch { room_id: Ulid, recorded: u32, actual: u32 },
    OverCapacity { room_id: Ulid, occupancy: u32, capacity: u32 },
    CapacityOutOfRange { room_id: Ulid, capacity: u32 },
    DuplicateOccupant { room_id: Ulid, occupant_id: Ulid },
    StatusMismatch { room_id: Ulid, status: RoomStatus, occupancy: u32, capacity: u32 },
    SharedOccupant { occupant_id: Ulid, rooms: (Ulid, Ulid) },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::OccupancyMismatch { room_id, recorded, actual } => write!(
                f,
                "room {room_id}: occupancy {recorded} but {actual} occupants"
            ),
            Violation::OverCapacity { room_id, occupancy, capacity } => write!(
                f,
                "room {room_id}: {occupancy} occupants exceed capacity {capacity}"
            ),
            Violation::CapacityOutOfRange { room_id, capacity } => {
                write!(f, "room {room_id}: capacity {capacity} out of range")
            }
            Violation::DuplicateOccupant { room_id, occupant_id } => {
                write!(f, "room {room_id}: occupant {occupant_id} listed twice")
            }
            Violation::StatusMismatch { room_id, status, occupancy, capacity } => write!(
                f,
                "room {room_id}: status {status} inconsistent with {occupancy}/{capacity}"
            ),
            Violation::SharedOccupant { occupant_id, rooms } => write!(
                f,
                "occupant {occupant_id} is a member of rooms {} and {}",
                rooms.0, rooms.1
            ),
        }
    }
}

pub fn derive_occupancy(occupants: &[Ulid]) -> u32 {
    occupants.len() as u32
}

/// Occupied iff full, else available. Maintenance and blocked survive any
/// occupancy change; only an administrative status change clears them.
pub fn derive_status(occupancy: u32, capacity: u32, previous: RoomStatus) -> RoomStatus {
    if previous.is_sticky() {
        previous
    } else if occupancy >= capacity {
        RoomStatus::Occupied
    } else {
        RoomStatus::Available
    }
}

/// Recompute `current_occupancy` and `status` from membership.
pub fn refresh_derived(room: &mut Room) {
    room.current_occupancy = derive_occupancy(&room.occupants);
    room.status = derive_status(room.current_occupancy, room.capacity, room.status);
}

pub fn can_assign(room: &Room, occupant: &OccupantState) -> Result<(), AssignRejection> {
    if room.has_occupant(&occupant.id) {
        return Err(AssignRejection::AlreadyAssigned);
    }
    if !occupant.approved {
        return Err(AssignRejection::OccupantNotEligible(IneligibleReason::NotApproved));
    }
    if room.current_occupancy >= room.capacity {
        return Err(AssignRejection::AlreadyFull);
    }
    if room.status != RoomStatus::Available {
        return Err(AssignRejection::RoomNotAvailable);
    }
    if let Some(current) = occupant.room_id
        && current != room.id
    {
        return Err(AssignRejection::OccupantNotEligible(IneligibleReason::AssignedElsewhere(
            current,
        )));
    }
    Ok(())
}

pub fn can_remove(room: &Room, occupant_id: &Ulid) -> Result<(), RemoveRejection> {
    if room.has_occupant(occupant_id) {
        Ok(())
    } else {
        Err(RemoveRejection::NotAssignedHere)
    }
}

/// Occupancy, capacity, uniqueness and status checks on a single room.
pub fn check_room(room: &Room) -> Vec<Violation> {
    let mut violations = Vec::new();
    let actual = derive_occupancy(&room.occupants);

    if room.current_occupancy != actual {
        violations.push(Violation::OccupancyMismatch {
            room_id: room.id,
            recorded: room.current_occupancy,
            actual,
        });
    }
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&room.capacity) {
        violations.push(Violation::CapacityOutOfRange {
            room_id: room.id,
            capacity: room.capacity,
        });
    }
    if actual > room.capacity {
        violations.push(Violation::OverCapacity {
            room_id: room.id,
            occupancy: actual,
            capacity: room.capacity,
        });
    }
    for (i, id) in room.occupants.iter().enumerate() {
        if room.occupants[..i].contains(id) {
            violations.push(Violation::DuplicateOccupant {
                room_id: room.id,
                occupant_id: *id,
            });
        }
    }

    let full = actual == room.capacity;
    let status_ok = match room.status {
        RoomStatus::Maintenance | RoomStatus::Blocked => true,
        RoomStatus::Occupied => full,
        RoomStatus::Available => actual < room.capacity,
    };
    if !status_ok {
        violations.push(Violation::StatusMismatch {
            room_id: room.id,
            status: room.status,
            occupancy: actual,
            capacity: room.capacity,
        });
    }
    violations
}

/// No occupant may be a member of two rooms.
pub fn check_membership<'a>(rooms: impl IntoIterator<Item = &'a Room>) -> Vec<Violation> {
    let mut seen: HashMap<Ulid, Ulid> = HashMap::new();
    let mut violations = Vec::new();
    for room in rooms {
        for occupant_id in &room.occupants {
            if let Some(first) = seen.insert(*occupant_id, room.id)
                && first != room.id
            {
                violations.push(Violation::SharedOccupant {
                    occupant_id: *occupant_id,
                    rooms: (first, room.id),
                });
            }
        }
    }
    violations
}
