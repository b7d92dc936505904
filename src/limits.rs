/// Smallest capacity a room may be created or updated with.
pub const MIN_CAPACITY: u32 = 1;

/// Largest capacity a room may be created or updated with.
pub const MAX_CAPACITY: u32 = 6;

/// Max length of a normalized room number.
pub const MAX_ROOM_NUMBER_LEN: usize = 16;

/// Max length of a room description.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Max rooms held by a single engine.
pub const MAX_ROOMS: usize = 100_000;

/// Default read-evaluate-commit attempts before an operation reports `Conflict`.
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 5;

/// Upper bound on the configurable commit attempts.
pub const MAX_COMMIT_ATTEMPTS: u32 = 16;

/// Default page size for room listings.
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Max page size for room listings.
pub const MAX_PAGE_LIMIT: usize = 100;
