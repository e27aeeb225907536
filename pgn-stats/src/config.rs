//! Defaults for the `pgn-stats` command line.
//!
//! Every value has a compile-time default that a dedicated environment
//! variable can override. Command-line flags take precedence over both.

use std::path::PathBuf;

/// Default number of half-moves per game that feed the statistics.
pub const DEFAULT_MAX_PLIES: usize = 20;

/// Default number of games between two flushes to the store.
pub const DEFAULT_BATCH_SIZE: u64 = 25_000;

/// Default minimum games a (position, move) pair needs within a batch.
pub const DEFAULT_MIN_GAMES: u64 = 2;

/// Default statistics snapshot location.
const DEFAULT_STORE_PATH: &str = "opening-stats.json";

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %value, "ignoring unparsable value");
            default
        }),
        Err(_) => default,
    }
}

/// Get the ply cap.
///
/// Priority:
/// 1. `PGN_STATS_MAX_PLIES` env variable if set and parsable
/// 2. `20` as fallback
pub fn get_max_plies() -> usize {
    env_or("PGN_STATS_MAX_PLIES", DEFAULT_MAX_PLIES)
}

/// Get the number of games per batch.
///
/// Priority:
/// 1. `PGN_STATS_BATCH_SIZE` env variable if set and parsable
/// 2. `25000` as fallback
pub fn get_batch_size() -> u64 {
    env_or("PGN_STATS_BATCH_SIZE", DEFAULT_BATCH_SIZE)
}

/// Get the per-batch minimum games threshold.
///
/// Priority:
/// 1. `PGN_STATS_MIN_GAMES` env variable if set and parsable
/// 2. `2` as fallback
pub fn get_min_games() -> u64 {
    env_or("PGN_STATS_MIN_GAMES", DEFAULT_MIN_GAMES)
}

/// Get the statistics store path.
///
/// Priority:
/// 1. `PGN_STATS_STORE_PATH` env variable if set
/// 2. `opening-stats.json` in the working directory as fallback
pub fn get_store_path() -> PathBuf {
    if let Ok(path) = std::env::var("PGN_STATS_STORE_PATH") {
        return PathBuf::from(path);
    }

    PathBuf::from(DEFAULT_STORE_PATH)
}
