/// Prefix for entities created by `CREATE` (rendered as `wd:NEW1`, `wd:NEW2`, ...)
pub const NEW_ENTITY_PREFIX: &str = "NEW";

/// Item used as the unit of dimensionless quantities
pub const UNITLESS_UNIT: &str = "Q199";

/// Calendar models for time values
pub const GREGORIAN_CALENDAR: &str = "Q1985727";
pub const JULIAN_CALENDAR: &str = "Q1985786";

/// Default time precision (11 = day)
pub const DEFAULT_TIME_PRECISION: u8 = 11;

/// Highest time precision on the Wikibase scale (14 = second)
pub const MAX_TIME_PRECISION: u8 = 14;

/// Globe for coordinates (Earth)
pub const DEFAULT_GLOBE: &str = "Q2";

/// Default coordinate precision when the token gives none (one arcsecond)
pub const DEFAULT_GEO_PRECISION: &str = "0.00027777777777778";

/// Version of the on-disk node cache format
pub const NODE_CACHE_VERSION: u32 = 1;

/// Progress update interval (tick every N rows)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Buffer size for N-Triples output writers
pub const OUTPUT_BUFFER_SIZE: usize = 128 * 1024;
