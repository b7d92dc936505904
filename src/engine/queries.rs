use ulid::Ulid;

use crate::limits::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::model::*;

use super::invariant::{self, Violation};
use super::{Engine, EngineError};

fn sort_by_location(rooms: &mut [Room]) {
    rooms.sort_by(|a, b| {
        a.floor
            .cmp(&b.floor)
            .then_with(|| a.room_number.cmp(&b.room_number))
    });
}

impl RoomFilter {
    pub fn matches(&self, room: &Room) -> bool {
        self.status.is_none_or(|s| room.status == s)
            && self.floor.is_none_or(|f| room.floor == f)
            && self.capacity.is_none_or(|c| room.capacity == c)
            && self.room_type.is_none_or(|t| room.room_type == t)
            && self
                .search
                .as_ref()
                .is_none_or(|s| room.room_number.contains(&normalize_room_number(s)))
    }
}

impl Engine {
    pub async fn get_room(&self, id: Ulid) -> Result<Room, EngineError> {
        self.store
            .snapshot(&id)
            .await
            .ok_or(EngineError::RoomNotFound(id))
    }

    pub fn room_by_number(&self, number: &str) -> Option<Ulid> {
        self.store.room_for_number(number)
    }

    /// Room plus its occupants as the directory knows them.
    pub async fn room_view(&self, id: Ulid) -> Result<RoomView, EngineError> {
        let room = self.get_room(id).await?;
        let mut occupants = Vec::with_capacity(room.occupants.len());
        for occupant_id in &room.occupants {
            if let Some(record) = self.directory.lookup(*occupant_id).await? {
                occupants.push(record);
            }
        }
        Ok(RoomView { room, occupants })
    }

    pub fn room_count(&self) -> usize {
        self.store.len()
    }

    pub async fn list_rooms(&self, filter: &RoomFilter) -> RoomPage {
        let mut rooms: Vec<Room> = self
            .store
            .snapshot_all()
            .await
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        sort_by_location(&mut rooms);

        let limit = filter.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        let page = filter.page.unwrap_or(1).max(1);
        let total = rooms.len();
        let rooms = rooms
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        RoomPage {
            rooms,
            total,
            page,
            pages: total.div_ceil(limit),
        }
    }

    /// Rooms that can take another occupant right now, optionally only those
    /// with at least `min_capacity` beds.
    pub async fn find_available_rooms(&self, min_capacity: Option<u32>) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .store
            .snapshot_all()
            .await
            .into_iter()
            .filter(|r| r.is_available())
            .filter(|r| min_capacity.is_none_or(|c| r.capacity >= c))
            .collect();
        sort_by_location(&mut rooms);
        rooms
    }

    /// Run every invariant over the whole store.
    pub async fn audit_invariants(&self) -> Vec<Violation> {
        let rooms = self.store.snapshot_all().await;
        let mut violations: Vec<Violation> = rooms.iter().flat_map(invariant::check_room).collect();
        violations.extend(invariant::check_membership(&rooms));
        violations
    }
}
