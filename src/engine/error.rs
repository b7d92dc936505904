use ulid::Ulid;

use crate::model::RoomStatus;

/// Why an occupant cannot be placed in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibleReason {
    NotApproved,
    /// Already a member of another room; remove or reassign first.
    AssignedElsewhere(Ulid),
}

/// Coarse error classes callers act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    /// Lost a concurrency race after bounded retries. Safe to retry.
    Conflict,
    /// Removed from the source room, not placed in the destination.
    PartialReassignment,
    Internal,
}

#[derive(Debug)]
pub enum EngineError {
    RoomNotFound(Ulid),
    OccupantNotFound(Ulid),
    OccupantNotEligible {
        occupant_id: Ulid,
        reason: IneligibleReason,
    },
    RoomFull {
        room_id: Ulid,
        capacity: u32,
    },
    RoomNotAvailable {
        room_id: Ulid,
        status: RoomStatus,
    },
    NotAssignedHere {
        room_id: Ulid,
        occupant_id: Ulid,
    },
    /// Occupant holds no room at all.
    NotAssigned(Ulid),
    Conflict(Ulid),
    PartialReassignment {
        occupant_id: Ulid,
        from: Ulid,
        to: Ulid,
        cause: Box<EngineError>,
    },
    AlreadyExists(Ulid),
    RoomNumberTaken(String),
    InvalidCapacity(u32),
    CapacityBelowOccupancy {
        capacity: u32,
        occupancy: u32,
    },
    RoomOccupied(Ulid),
    InvalidStatusChange(RoomStatus),
    InvalidRoomNumber(&'static str),
    LimitExceeded(&'static str),
    InvariantViolation(String),
    Directory(String),
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::RoomNotFound(_) | EngineError::OccupantNotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::PartialReassignment { .. } => ErrorKind::PartialReassignment,
            EngineError::InvariantViolation(_)
            | EngineError::Directory(_)
            | EngineError::WalError(_) => ErrorKind::Internal,
            _ => ErrorKind::PreconditionFailed,
        }
    }

    /// True when repeating the same call may succeed without changing input.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::PartialReassignment)
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            EngineError::RoomNotFound(_) => "room_not_found",
            EngineError::OccupantNotFound(_) => "occupant_not_found",
            EngineError::OccupantNotEligible { .. } => "occupant_not_eligible",
            EngineError::RoomFull { .. } => "room_full",
            EngineError::RoomNotAvailable { .. } => "room_not_available",
            EngineError::NotAssignedHere { .. } => "not_assigned_here",
            EngineError::NotAssigned(_) => "not_assigned",
            EngineError::Conflict(_) => "conflict",
            EngineError::PartialReassignment { .. } => "partial_reassignment",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::RoomNumberTaken(_) => "room_number_taken",
            EngineError::InvalidCapacity(_) => "invalid_capacity",
            EngineError::CapacityBelowOccupancy { .. } => "capacity_below_occupancy",
            EngineError::RoomOccupied(_) => "room_occupied",
            EngineError::InvalidStatusChange(_) => "invalid_status_change",
            EngineError::InvalidRoomNumber(_) => "invalid_room_number",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::InvariantViolation(_) => "invariant_violation",
            EngineError::Directory(_) => "directory",
            EngineError::WalError(_) => "wal",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::OccupantNotFound(id) => write!(f, "occupant not found: {id}"),
            EngineError::OccupantNotEligible { occupant_id, reason } => match reason {
                IneligibleReason::NotApproved => {
                    write!(f, "occupant {occupant_id} is not approved")
                }
                IneligibleReason::AssignedElsewhere(room) => {
                    write!(f, "occupant {occupant_id} is already assigned to room {room}")
                }
            },
            EngineError::RoomFull { room_id, capacity } => {
                write!(f, "room {room_id} is at full capacity ({capacity})")
            }
            EngineError::RoomNotAvailable { room_id, status } => {
                write!(f, "room {room_id} is not available (status: {status})")
            }
            EngineError::NotAssignedHere { room_id, occupant_id } => {
                write!(f, "occupant {occupant_id} is not assigned to room {room_id}")
            }
            EngineError::NotAssigned(id) => write!(f, "occupant {id} is not assigned to any room"),
            EngineError::Conflict(id) => {
                write!(f, "conflict: room {id} kept changing, retries exhausted")
            }
            EngineError::PartialReassignment { occupant_id, from, to, cause } => write!(
                f,
                "occupant {occupant_id} removed from room {from} but not assigned to room {to}: {cause}"
            ),
            EngineError::AlreadyExists(id) => write!(f, "room already exists: {id}"),
            EngineError::RoomNumberTaken(n) => write!(f, "room number already in use: {n}"),
            EngineError::InvalidCapacity(c) => write!(f, "invalid capacity {c}"),
            EngineError::CapacityBelowOccupancy { capacity, occupancy } => write!(
                f,
                "cannot reduce capacity to {capacity} below current occupancy {occupancy}"
            ),
            EngineError::RoomOccupied(id) => {
                write!(f, "cannot delete room {id}: occupants still assigned")
            }
            EngineError::InvalidStatusChange(s) => write!(f, "status cannot be set to {s} directly"),
            EngineError::InvalidRoomNumber(msg) => write!(f, "invalid room number: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
            EngineError::Directory(e) => write!(f, "directory error: {e}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::PartialReassignment { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<crate::directory::DirectoryError> for EngineError {
    fn from(e: crate::directory::DirectoryError) -> Self {
        EngineError::Directory(e.0)
    }
}
