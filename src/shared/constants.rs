/// Joins client id and route into a cache key (`clientId:route`)
pub const CACHE_KEY_SEPARATOR: &str = ":";

/// Monitor capacity reported for a bucket whose config is not cached
pub const UNKNOWN_CAPACITY: i64 = -1;
