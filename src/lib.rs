//! Room occupancy engine.
//!
//! Assigns, removes and reassigns occupants across rooms while keeping every
//! room within capacity, its status consistent with its occupancy, and every
//! occupant in at most one room. Room membership is authoritative; the
//! occupant directory's room reference is a cache the engine keeps reconciled.

pub mod config;
pub mod directory;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reconciler;
pub mod wal;

pub use config::EngineConfig;
pub use directory::{Directory, DirectoryError, InMemoryDirectory, OccupantRecord};
pub use engine::{Engine, EngineError, ErrorKind, IneligibleReason, OccupancyStats};
pub use model::{NewRoom, Room, RoomFilter, RoomStatus, RoomType, RoomUpdate};
