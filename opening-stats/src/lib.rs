//! Position/move outcome statistics built by replaying PGN games.
//!
//! [`Aggregator`] replays one game at a time and counts outcomes per
//! (normalized FEN, SAN move). [`Importer`] drives it over a PGN stream,
//! flushing bounded batches into a [`StatsStore`].

pub mod aggregator;
pub mod import;
pub mod ranking;
pub mod store;

pub use aggregator::{Aggregator, Outcomes, PositionKey, ReplayError, ResultPerspective, StatEntry};
pub use import::{Checkpoint, ImportConfig, ImportError, ImportSummary, Importer};
pub use ranking::{rank_moves, RankedMove};
pub use store::{JsonStatsStore, MemoryStatsStore, StatsStore, StoreError};
