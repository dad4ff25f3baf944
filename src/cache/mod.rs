// Cache module.
// Local store (tier 1), published snapshot (tier 2), and the tiered lookup that falls through to a live fetch.

pub mod paths;
pub mod snapshot;
pub mod store;
pub mod tiered;

pub use snapshot::{
    FileSnapshotSource, HttpSnapshotSource, RawSnapshot, Snapshot, SnapshotMetadata,
    SnapshotSource,
};
pub use store::{CacheEntry, LocalStore};
pub use tiered::{
    ALL_STUDENTS_KEY, CacheInfo, Clock, DEFAULT_LOCAL_TTL, DEFAULT_SNAPSHOT_TTL, DataSource,
    TieredCache, is_valid_payload, is_within_ttl,
};
