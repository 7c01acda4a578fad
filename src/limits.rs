use std::time::Duration;

/// Longest stay a single reservation may cover.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Widest window accepted by searches and interval listings.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 731;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_GUEST_FIELD_LEN: usize = 255;

/// Upper bound on `remove.len() + add.len()` for one room's edit set.
pub const MAX_EDITS_PER_ROOM: usize = 62;

pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Depth of the group-commit channel between callers and the WAL writer.
pub const WAL_CHANNEL_CAPACITY: usize = 4096;
