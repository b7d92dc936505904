use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::invariant::refresh_derived;

pub type SharedRoom = Arc<RwLock<Room>>;

/// In-memory room records plus the two derived indexes: normalized room
/// number → room, and occupant → room (rebuilt from membership, never
/// written independently).
pub struct RoomStore {
    rooms: DashMap<Ulid, SharedRoom>,
    room_numbers: DashMap<String, Ulid>,
    membership: DashMap<Ulid, Ulid>,
    /// Ids claimed by a create that has not been inserted yet.
    creating: DashSet<Ulid>,
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply a per-room event to the record's own fields, then re-derive
/// occupancy and status. Pure: no index maintenance.
pub fn transition(room: &mut Room, event: &Event) {
    match event {
        Event::RoomUpdated {
            room_number,
            floor,
            capacity,
            room_type,
            monthly_rent,
            security_deposit,
            amenities,
            description,
            ..
        } => {
            room.room_number = room_number.clone();
            room.floor = *floor;
            room.capacity = *capacity;
            room.room_type = *room_type;
            room.monthly_rent = *monthly_rent;
            room.security_deposit = *security_deposit;
            room.amenities = amenities.clone();
            room.description = description.clone();
        }
        Event::RoomStatusSet { status, .. } => {
            // Non-sticky targets are re-derived below.
            room.status = if status.is_sticky() {
                *status
            } else {
                RoomStatus::Available
            };
        }
        Event::OccupantAssigned { occupant_id, .. } => {
            if !room.has_occupant(occupant_id) {
                room.occupants.push(*occupant_id);
            }
        }
        Event::OccupantRemoved { occupant_id, .. } => {
            room.occupants.retain(|o| o != occupant_id);
        }
        // Creation and deletion are handled at the map level.
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } => return,
    }
    refresh_derived(room);
    room.version += 1;
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            room_numbers: DashMap::new(),
            membership: DashMap::new(),
            creating: DashSet::new(),
        }
    }

    // ── Room records ─────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn get(&self, id: &Ulid) -> Option<SharedRoom> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    /// True if `shared` is still the live record for `id` (not deleted or replaced).
    pub fn is_current(&self, id: &Ulid, shared: &SharedRoom) -> bool {
        self.rooms
            .get(id)
            .is_some_and(|e| Arc::ptr_eq(e.value(), shared))
    }

    /// Clone of the room's current state.
    pub async fn snapshot(&self, id: &Ulid) -> Option<Room> {
        let shared = self.get(id)?;
        let guard = shared.read().await;
        Some(guard.clone())
    }

    /// Clones of every room. Each room is read under its own lock, so the set
    /// as a whole is only eventually consistent.
    pub async fn snapshot_all(&self) -> Vec<Room> {
        let shared: Vec<SharedRoom> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut rooms = Vec::with_capacity(shared.len());
        for room in shared {
            rooms.push(room.read().await.clone());
        }
        rooms
    }

    pub fn room_ids(&self) -> Vec<Ulid> {
        self.rooms.iter().map(|e| *e.key()).collect()
    }

    /// Claim `id` for a create in flight. False if a room with that id exists
    /// or another create holds the claim.
    pub fn reserve_id(&self, id: Ulid) -> bool {
        if !self.creating.insert(id) {
            return false;
        }
        // `insert` adds to `rooms` before dropping the claim, so a finished
        // create is always visible here.
        if self.rooms.contains_key(&id) {
            self.creating.remove(&id);
            return false;
        }
        true
    }

    pub fn release_id(&self, id: &Ulid) {
        self.creating.remove(id);
    }

    /// Insert a freshly created room and drop its id claim. The caller has
    /// already reserved its number.
    pub fn insert(&self, room: Room) {
        let id = room.id;
        self.room_numbers.insert(room.room_number.clone(), id);
        for occupant_id in &room.occupants {
            self.membership.insert(*occupant_id, id);
        }
        self.rooms.insert(id, Arc::new(RwLock::new(room)));
        self.creating.remove(&id);
    }

    /// Drop a room and its index entries. Caller holds the room's write lock.
    pub fn remove(&self, room: &Room) {
        self.rooms.remove(&room.id);
        self.room_numbers.remove_if(&room.room_number, |_, id| *id == room.id);
        for occupant_id in &room.occupants {
            self.membership.remove_if(occupant_id, |_, rid| *rid == room.id);
        }
    }

    // ── Room-number index ────────────────────────────────────

    pub fn room_for_number(&self, number: &str) -> Option<Ulid> {
        self.room_numbers
            .get(&normalize_room_number(number))
            .map(|e| *e.value())
    }

    /// Claim `number` for `room_id`. False if another room holds it.
    pub fn reserve_number(&self, number: &str, room_id: Ulid) -> bool {
        let entry = self.room_numbers.entry(number.to_string()).or_insert(room_id);
        *entry.value() == room_id
    }

    pub fn release_number(&self, number: &str, room_id: Ulid) {
        self.room_numbers.remove_if(number, |_, id| *id == room_id);
    }

    // ── Membership index ─────────────────────────────────────

    /// Room the occupant is a member of, per room membership.
    pub fn room_of(&self, occupant_id: &Ulid) -> Option<Ulid> {
        self.membership.get(occupant_id).map(|e| *e.value())
    }

    pub fn assigned_count(&self) -> usize {
        self.membership.len()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a per-room event and keep the indexes in step. Caller holds the
    /// room's write lock.
    pub fn apply_event(&self, room: &mut Room, event: &Event) {
        let previous_number = room.room_number.clone();
        transition(room, event);
        match event {
            Event::RoomUpdated { id, room_number, .. } if *room_number != previous_number => {
                self.room_numbers.insert(room_number.clone(), *id);
                self.release_number(&previous_number, *id);
            }
            Event::OccupantAssigned { room_id, occupant_id } => {
                self.membership.insert(*occupant_id, *room_id);
            }
            Event::OccupantRemoved { room_id, occupant_id } => {
                self.membership.remove_if(occupant_id, |_, rid| rid == room_id);
            }
            _ => {}
        }
    }
}
