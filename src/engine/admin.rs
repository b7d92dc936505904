use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if (MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
        Ok(())
    } else {
        Err(EngineError::InvalidCapacity(capacity))
    }
}

fn validate_room_number(raw: &str) -> Result<String, EngineError> {
    let number = normalize_room_number(raw);
    if number.is_empty() {
        return Err(EngineError::InvalidRoomNumber("empty"));
    }
    if number.len() > MAX_ROOM_NUMBER_LEN {
        return Err(EngineError::InvalidRoomNumber("too long"));
    }
    Ok(number)
}

fn validate_description(description: Option<&String>) -> Result<(), EngineError> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => {
            Err(EngineError::LimitExceeded("description too long"))
        }
        _ => Ok(()),
    }
}

impl Engine {
    pub async fn create_room(&self, id: Ulid, new_room: NewRoom) -> Result<Room, EngineError> {
        if self.store.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        validate_capacity(new_room.capacity)?;
        let room_number = validate_room_number(&new_room.room_number)?;
        validate_description(new_room.description.as_ref())?;
        if new_room.status == RoomStatus::Occupied {
            return Err(EngineError::InvalidStatusChange(RoomStatus::Occupied));
        }
        if !self.store.reserve_id(id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if !self.store.reserve_number(&room_number, id) {
            self.store.release_id(&id);
            return Err(EngineError::RoomNumberTaken(room_number));
        }

        let event = Event::RoomCreated {
            id,
            room_number: room_number.clone(),
            floor: new_room.floor,
            capacity: new_room.capacity,
            room_type: new_room.room_type,
            monthly_rent: new_room.monthly_rent,
            security_deposit: new_room.security_deposit,
            amenities: new_room.amenities.clone(),
            description: new_room.description.clone(),
            status: new_room.status,
        };
        let _gate = self.log_gate().await;
        if let Err(e) = self.wal_append(&event).await {
            self.store.release_number(&room_number, id);
            self.store.release_id(&id);
            return Err(e);
        }
        let room = Room::new(id, &new_room);
        self.store.insert(room.clone());
        self.notify.send(&event);
        info!("room {room_number} ({id}) created, capacity {}", room.capacity);
        Ok(room)
    }

    /// Partial update of the descriptive fields and capacity. Capacity may not
    /// drop below the current occupancy.
    pub async fn update_room(&self, id: Ulid, update: RoomUpdate) -> Result<Room, EngineError> {
        let shared = self.store.get(&id).ok_or(EngineError::RoomNotFound(id))?;
        let _gate = self.log_gate().await;
        let mut guard = shared.write().await;
        if !self.store.is_current(&id, &shared) {
            return Err(EngineError::RoomNotFound(id));
        }

        let capacity = update.capacity.unwrap_or(guard.capacity);
        validate_capacity(capacity)?;
        if capacity < guard.current_occupancy {
            return Err(EngineError::CapacityBelowOccupancy {
                capacity,
                occupancy: guard.current_occupancy,
            });
        }
        let room_number = match &update.room_number {
            Some(raw) => validate_room_number(raw)?,
            None => guard.room_number.clone(),
        };
        let description = update.description.unwrap_or_else(|| guard.description.clone());
        validate_description(description.as_ref())?;

        let renumbered = room_number != guard.room_number;
        if renumbered && !self.store.reserve_number(&room_number, id) {
            return Err(EngineError::RoomNumberTaken(room_number));
        }

        let event = Event::RoomUpdated {
            id,
            room_number: room_number.clone(),
            floor: update.floor.unwrap_or(guard.floor),
            capacity,
            room_type: update.room_type.unwrap_or(guard.room_type),
            monthly_rent: update.monthly_rent.unwrap_or(guard.monthly_rent),
            security_deposit: update.security_deposit.unwrap_or(guard.security_deposit),
            amenities: update.amenities.unwrap_or_else(|| guard.amenities.clone()),
            description,
        };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            if renumbered {
                self.store.release_number(&room_number, id);
            }
            return Err(e);
        }
        Ok(guard.clone())
    }

    /// Administrative status change. `Maintenance` and `Blocked` stick until an
    /// explicit `Available`, which re-derives the status from occupancy.
    pub async fn set_room_status(&self, id: Ulid, status: RoomStatus) -> Result<Room, EngineError> {
        if status == RoomStatus::Occupied {
            return Err(EngineError::InvalidStatusChange(status));
        }
        let shared = self.store.get(&id).ok_or(EngineError::RoomNotFound(id))?;
        let _gate = self.log_gate().await;
        let mut guard = shared.write().await;
        if !self.store.is_current(&id, &shared) {
            return Err(EngineError::RoomNotFound(id));
        }
        let previous = guard.status;
        let event = Event::RoomStatusSet { id, status };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("room {} status {previous} → {}", guard.room_number, guard.status);
        Ok(guard.clone())
    }

    /// Delete an empty room.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let shared = self.store.get(&id).ok_or(EngineError::RoomNotFound(id))?;
        let _gate = self.log_gate().await;
        let guard = shared.write().await;
        if !self.store.is_current(&id, &shared) {
            return Err(EngineError::RoomNotFound(id));
        }
        if guard.current_occupancy > 0 {
            return Err(EngineError::RoomOccupied(id));
        }

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        self.store.remove(&guard);
        self.notify.send(&event);
        self.notify.remove(&id);
        info!("room {} ({id}) deleted", guard.room_number);
        Ok(())
    }
}
