//! Batched, resumable import of PGN games into a statistics store.

use std::io::BufRead;
use std::path::Path;

use chess::pgn::{GameRecord, PgnError, PgnReader, PromotionPolicy, ResolverOptions};

use crate::aggregator::{Aggregator, ResultPerspective};
use crate::store::{StatsStore, StoreError};

/// Import tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportConfig {
    /// Half-moves of each game that contribute statistics.
    pub max_plies: usize,
    /// Games accumulated in memory between flushes.
    pub batch_size: u64,
    /// Pairs seen in fewer games than this within a batch are not flushed.
    pub min_games: u64,
    pub resume_byte_offset: u64,
    pub resume_game_skip: u64,
    pub promotion: PromotionPolicy,
    pub perspective: ResultPerspective,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_plies: 20,
            batch_size: 25_000,
            min_games: 2,
            resume_byte_offset: 0,
            resume_game_skip: 0,
            promotion: PromotionPolicy::default(),
            perspective: ResultPerspective::default(),
        }
    }
}

/// Position in the input up to which results are committed to the store.
///
/// Restarting with `resume_byte_offset = byte_offset` and no game skip
/// continues with the first game that was not committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub byte_offset: u64,
    pub games_committed: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub games_read: u64,
    pub games_recorded: u64,
    /// Games that counted nothing, usually for lack of a result.
    pub games_skipped: u64,
    /// Games whose replay stopped on a move that could not be resolved.
    pub games_failed: u64,
    /// Pairs counted, including those of failed games before their bad move.
    pub plies_recorded: u64,
    pub batches: u64,
    pub entries_flushed: u64,
    pub checkpoint: Checkpoint,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read PGN input: {0}")]
    Pgn(#[from] PgnError),
    #[error("failed to flush batch (committed up to byte {}): {source}", .checkpoint.byte_offset)]
    Flush {
        checkpoint: Checkpoint,
        #[source]
        source: StoreError,
    },
}

/// Streams games through an [`Aggregator`] and flushes into a store.
pub struct Importer<S> {
    store: S,
    config: ImportConfig,
}

impl<S: StatsStore> Importer<S> {
    pub fn new(store: S, config: ImportConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Import a PGN file, starting at the configured resume point.
    pub fn import_file(&mut self, path: &Path) -> Result<ImportSummary, ImportError> {
        let reader = PgnReader::open(
            path,
            self.config.resume_byte_offset,
            self.config.resume_game_skip,
        )?;
        tracing::info!(
            path = %path.display(),
            offset = reader.offset(),
            total_bytes = ?reader.total_bytes(),
            "importing PGN file"
        );
        self.import_reader(reader)
    }

    /// Import every remaining game from `reader`.
    ///
    /// A batch is flushed every `batch_size` games and once more at the end
    /// of the stream.
    pub fn import_reader<R: BufRead>(
        &mut self,
        mut reader: PgnReader<R>,
    ) -> Result<ImportSummary, ImportError> {
        let mut aggregator = Aggregator::new(
            self.config.max_plies,
            ResolverOptions {
                promotion: self.config.promotion,
            },
            self.config.perspective,
        );
        let mut summary = ImportSummary {
            checkpoint: Checkpoint {
                byte_offset: reader.offset(),
                games_committed: 0,
            },
            ..Default::default()
        };
        let mut pending = 0u64;
        let mut last_offset = reader.offset();

        while let Some(raw) = reader.next_game()? {
            let game = GameRecord::from(raw);
            summary.games_read += 1;
            last_offset = game.end_offset;

            match aggregator.record_game(&game) {
                Ok(0) => summary.games_skipped += 1,
                Ok(plies) => {
                    summary.games_recorded += 1;
                    summary.plies_recorded += plies as u64;
                }
                Err(e) => {
                    tracing::debug!(game = game.ordinal, error = %e, "abandoning game replay");
                    summary.games_failed += 1;
                    summary.plies_recorded += e.plies_recorded() as u64;
                }
            }

            pending += 1;
            if pending >= self.config.batch_size.max(1) {
                self.flush(&mut aggregator, &reader, last_offset, &mut summary)?;
                pending = 0;
            }
        }

        if pending > 0 {
            self.flush(&mut aggregator, &reader, last_offset, &mut summary)?;
        }

        tracing::info!(
            games = summary.games_read,
            recorded = summary.games_recorded,
            skipped = summary.games_skipped,
            failed = summary.games_failed,
            batches = summary.batches,
            entries = summary.entries_flushed,
            byte_offset = summary.checkpoint.byte_offset,
            "import finished"
        );
        Ok(summary)
    }

    fn flush<R: BufRead>(
        &mut self,
        aggregator: &mut Aggregator,
        reader: &PgnReader<R>,
        end_offset: u64,
        summary: &mut ImportSummary,
    ) -> Result<(), ImportError> {
        let batch = aggregator.drain_batch(self.config.min_games);
        self.store
            .apply_batch(&batch)
            .map_err(|source| ImportError::Flush {
                checkpoint: summary.checkpoint,
                source,
            })?;

        summary.batches += 1;
        summary.entries_flushed += batch.len() as u64;
        summary.checkpoint = Checkpoint {
            byte_offset: end_offset,
            games_committed: summary.games_read,
        };

        tracing::info!(
            batch = summary.batches,
            games = summary.games_read,
            entries = batch.len(),
            byte_offset = end_offset,
            percent = reader.progress_percent().unwrap_or(0.0),
            "flushed batch"
        );
        Ok(())
    }
}
