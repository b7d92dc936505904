use serde::Serialize;

use crate::model::{Room, RoomStatus};

use super::Engine;

/// Read-only rollup over the room set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyStats {
    pub total_rooms: usize,
    pub total_capacity: u64,
    pub total_occupied: u64,
    pub available_rooms: usize,
    pub occupied_rooms: usize,
    pub maintenance_rooms: usize,
    pub blocked_rooms: usize,
    /// Free beds in rooms currently accepting occupants.
    pub vacancies: u64,
    /// Rounded `total_occupied / total_capacity` percentage.
    pub occupancy_rate: u32,
}

impl OccupancyStats {
    pub fn count(&self, status: RoomStatus) -> usize {
        match status {
            RoomStatus::Available => self.available_rooms,
            RoomStatus::Occupied => self.occupied_rooms,
            RoomStatus::Maintenance => self.maintenance_rooms,
            RoomStatus::Blocked => self.blocked_rooms,
        }
    }
}

pub fn aggregate<'a>(rooms: impl IntoIterator<Item = &'a Room>) -> OccupancyStats {
    let mut stats = OccupancyStats::default();
    for room in rooms {
        stats.total_rooms += 1;
        stats.total_capacity += u64::from(room.capacity);
        stats.total_occupied += u64::from(room.current_occupancy);
        match room.status {
            RoomStatus::Available => {
                stats.available_rooms += 1;
                stats.vacancies += u64::from(room.free_slots());
            }
            RoomStatus::Occupied => stats.occupied_rooms += 1,
            RoomStatus::Maintenance => stats.maintenance_rooms += 1,
            RoomStatus::Blocked => stats.blocked_rooms += 1,
        }
    }
    if stats.total_capacity > 0 {
        stats.occupancy_rate = ((stats.total_occupied * 100 + stats.total_capacity / 2)
            / stats.total_capacity) as u32;
    }
    stats
}

impl Engine {
    pub async fn occupancy_stats(&self) -> OccupancyStats {
        aggregate(&self.store.snapshot_all().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::invariant::refresh_derived;
    use crate::model::{NewRoom, RoomType};
    use ulid::Ulid;

    fn room(capacity: u32, occupants: usize, status: RoomStatus) -> Room {
        let mut r = Room::new(Ulid::new(), &NewRoom::new("S", 0, capacity, RoomType::Quad));
        r.status = status;
        r.occupants = (0..occupants).map(|_| Ulid::new()).collect();
        refresh_derived(&mut r);
        r
    }

    #[test]
    fn empty_store() {
        let stats = aggregate(&Vec::<Room>::new());
        assert_eq!(stats, OccupancyStats::default());
    }

    #[test]
    fn rollup_counts() {
        let rooms = vec![
            room(2, 2, RoomStatus::Available),
            room(4, 1, RoomStatus::Available),
            room(3, 0, RoomStatus::Maintenance),
            room(1, 1, RoomStatus::Blocked),
        ];
        let stats = aggregate(&rooms);
        assert_eq!(stats.total_rooms, 4);
        assert_eq!(stats.total_capacity, 10);
        assert_eq!(stats.total_occupied, 4);
        assert_eq!(stats.count(RoomStatus::Occupied), 1);
        assert_eq!(stats.count(RoomStatus::Available), 1);
        assert_eq!(stats.count(RoomStatus::Maintenance), 1);
        assert_eq!(stats.count(RoomStatus::Blocked), 1);
        assert_eq!(stats.vacancies, 3);
        assert_eq!(stats.occupancy_rate, 40);
    }

    #[test]
    fn serializes_camel_case() {
        let stats = aggregate(&[room(2, 1, RoomStatus::Available)]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalRooms"], 1);
        assert_eq!(json["totalCapacity"], 2);
        assert_eq!(json["totalOccupied"], 1);
        assert_eq!(json["maintenanceRooms"], 0);
        assert_eq!(json["occupancyRate"], 50);
    }
}
