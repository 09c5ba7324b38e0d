//! Project-wide constants.

use std::path::PathBuf;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Port used when neither `--port` nor `PORT` is given.
pub const DEFAULT_PORT: u16 = 10_000;

/// Collection that holds one combined document per scraped profile.
pub const DEFAULT_COLLECTION: &str = "instagram_data";

/// Records per language-model call in the analysis pipeline.
pub const DEFAULT_CHUNK_SIZE: usize = 5;

/// Upper bound on in-flight language-model calls for one analysis.
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 8;

/// Posts fetched when the request does not say.
pub const DEFAULT_RESULTS_LIMIT: u32 = 5;

/// Inclusive bounds for `results_limit`.
pub const MIN_RESULTS_LIMIT: u32 = 1;
pub const MAX_RESULTS_LIMIT: u32 = 50;

/// How long a scrape result stays servable from cache.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60;

/// Most usernames the scrape cache holds at once.
pub const MAX_CACHE_ENTRIES: usize = 100;

/// Seconds the scraping actor may run before the vendor aborts it.
pub const ACTOR_TIMEOUT_SECS: u64 = 100;

/// Message sent by `/test-config`.
pub const TEST_MESSAGE: &str = "Hello, this is a test message";

/// Default database path: `~/.quant-relay/relay.db`.
/// Falls back to the working directory when there is no home.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".quant-relay"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relay.db")
}
