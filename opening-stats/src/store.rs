//! Persistence for aggregated statistics.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aggregator::{Outcomes, StatEntry};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for flushed (position, move) counters.
///
/// Upserts are additive: an existing pair has the delta added to its
/// counters, a new pair is inserted with the delta as its counters.
pub trait StatsStore {
    fn find(&self, fen: &str, mv: &str) -> Result<Option<Outcomes>, StoreError>;

    fn upsert(&mut self, fen: &str, mv: &str, delta: Outcomes) -> Result<(), StoreError>;

    /// Apply a whole batch of deltas.
    ///
    /// Implementations that can should make this all-or-nothing. A caller
    /// that retries a failed batch must know whether it was applied, since
    /// applying the same deltas twice double counts them.
    fn apply_batch(&mut self, batch: &[StatEntry]) -> Result<(), StoreError> {
        for entry in batch {
            self.upsert(&entry.fen, &entry.mv, entry.outcomes)?;
        }
        Ok(())
    }

    /// Every move stored for the normalized position `fen`.
    fn moves_for(&self, fen: &str) -> Result<Vec<StatEntry>, StoreError>;
}

/// Statistics kept in memory, grouped by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStatsStore {
    positions: BTreeMap<String, BTreeMap<String, Outcomes>>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct positions.
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of (position, move) pairs.
    pub fn entry_count(&self) -> usize {
        self.positions.values().map(BTreeMap::len).sum()
    }

    /// Every stored pair, ordered by position then move.
    pub fn entries(&self) -> impl Iterator<Item = StatEntry> + '_ {
        self.positions.iter().flat_map(|(fen, moves)| {
            moves.iter().map(move |(mv, outcomes)| StatEntry {
                fen: fen.clone(),
                mv: mv.clone(),
                outcomes: *outcomes,
            })
        })
    }

    /// Add `delta` to `(fen, mv)`. Returns whether the pair was new.
    fn add(&mut self, fen: &str, mv: &str, delta: Outcomes) -> bool {
        let moves = self.positions.entry(fen.to_string()).or_default();
        match moves.get_mut(mv) {
            Some(outcomes) => {
                *outcomes += delta;
                false
            }
            None => {
                moves.insert(mv.to_string(), delta);
                true
            }
        }
    }

    /// Undo an [`add`](Self::add) of `delta`, dropping the pair if the add
    /// created it.
    fn undo_add(&mut self, fen: &str, mv: &str, delta: Outcomes, created: bool) {
        let Some(moves) = self.positions.get_mut(fen) else {
            return;
        };
        if created {
            moves.remove(mv);
        } else if let Some(outcomes) = moves.get_mut(mv) {
            outcomes.wins -= delta.wins;
            outcomes.draws -= delta.draws;
            outcomes.losses -= delta.losses;
        }
        if moves.is_empty() {
            self.positions.remove(fen);
        }
    }
}

impl StatsStore for MemoryStatsStore {
    fn find(&self, fen: &str, mv: &str) -> Result<Option<Outcomes>, StoreError> {
        Ok(self.positions.get(fen).and_then(|moves| moves.get(mv)).copied())
    }

    fn upsert(&mut self, fen: &str, mv: &str, delta: Outcomes) -> Result<(), StoreError> {
        self.add(fen, mv, delta);
        Ok(())
    }

    fn moves_for(&self, fen: &str) -> Result<Vec<StatEntry>, StoreError> {
        Ok(self
            .positions
            .get(fen)
            .map(|moves| {
                moves
                    .iter()
                    .map(|(mv, outcomes)| StatEntry {
                        fen: fen.to_string(),
                        mv: mv.clone(),
                        outcomes: *outcomes,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Statistics snapshot kept in a single JSON file.
///
/// Each write goes to a sibling temporary file which is then renamed over
/// the snapshot, so readers see either the previous or the new contents.
#[derive(Debug)]
pub struct JsonStatsStore {
    path: PathBuf,
    data: MemoryStatsStore,
}

impl JsonStatsStore {
    /// Open the snapshot at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            MemoryStatsStore::new()
        };
        tracing::debug!(
            path = %path.display(),
            positions = data.position_count(),
            "opened statistics store"
        );
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &MemoryStatsStore {
        &self.data
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persist(&self, data: &MemoryStatsStore) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.temp_path();
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, data)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StatsStore for JsonStatsStore {
    fn find(&self, fen: &str, mv: &str) -> Result<Option<Outcomes>, StoreError> {
        self.data.find(fen, mv)
    }

    fn upsert(&mut self, fen: &str, mv: &str, delta: Outcomes) -> Result<(), StoreError> {
        let created = self.data.add(fen, mv, delta);
        if let Err(e) = self.persist(&self.data) {
            self.data.undo_add(fen, mv, delta, created);
            return Err(e);
        }
        Ok(())
    }

    /// Apply the batch in place and write the snapshot. If the write fails
    /// the batch is taken back out, leaving the store as it was.
    fn apply_batch(&mut self, batch: &[StatEntry]) -> Result<(), StoreError> {
        let created: Vec<bool> = batch
            .iter()
            .map(|entry| self.data.add(&entry.fen, &entry.mv, entry.outcomes))
            .collect();
        if let Err(e) = self.persist(&self.data) {
            for (entry, created) in batch.iter().zip(created).rev() {
                self.data
                    .undo_add(&entry.fen, &entry.mv, entry.outcomes, created);
            }
            tracing::warn!(
                path = %self.path.display(),
                entries = batch.len(),
                error = %e,
                "rolled back batch after failed write"
            );
            return Err(e);
        }
        Ok(())
    }

    fn moves_for(&self, fen: &str) -> Result<Vec<StatEntry>, StoreError> {
        self.data.moves_for(fen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(fen: &str, mv: &str, wins: u64, draws: u64, losses: u64) -> StatEntry {
        StatEntry {
            fen: fen.to_string(),
            mv: mv.to_string(),
            outcomes: Outcomes {
                wins,
                draws,
                losses,
            },
        }
    }

    #[test]
    fn test_memory_upsert_is_additive() {
        let mut store = MemoryStatsStore::new();
        assert_eq!(store.find("fen", "e4").unwrap(), None);

        store.upsert("fen", "e4", Outcomes::WIN).unwrap();
        store.upsert("fen", "e4", Outcomes::DRAW).unwrap();
        store.upsert("fen", "d4", Outcomes::LOSS).unwrap();

        assert_eq!(
            store.find("fen", "e4").unwrap(),
            Some(Outcomes {
                wins: 1,
                draws: 1,
                losses: 0
            })
        );
        assert_eq!(store.position_count(), 1);
        assert_eq!(store.entry_count(), 2);
    }

    #[test]
    fn test_moves_for_position() {
        let mut store = MemoryStatsStore::new();
        store
            .apply_batch(&[
                entry("a", "e4", 1, 0, 0),
                entry("a", "d4", 0, 1, 0),
                entry("b", "c5", 0, 0, 1),
            ])
            .unwrap();

        let moves: Vec<String> = store
            .moves_for("a")
            .unwrap()
            .into_iter()
            .map(|e| e.mv)
            .collect();
        assert_eq!(moves, vec!["d4", "e4"]);
        assert!(store.moves_for("missing").unwrap().is_empty());
    }

    #[test]
    fn test_json_store_persists_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let mut store = JsonStatsStore::open(&path).unwrap();
        assert_eq!(store.data().entry_count(), 0);
        store
            .apply_batch(&[entry("a", "e4", 2, 0, 1), entry("a", "d4", 0, 3, 0)])
            .unwrap();
        store.apply_batch(&[entry("a", "e4", 1, 0, 0)]).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("stats.json.tmp").exists());

        let reopened = JsonStatsStore::open(&path).unwrap();
        assert_eq!(
            reopened.find("a", "e4").unwrap(),
            Some(Outcomes {
                wins: 3,
                draws: 0,
                losses: 1
            })
        );
        assert_eq!(reopened.data(), store.data());
    }

    #[test]
    fn test_json_store_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.json");
        let mut store = JsonStatsStore::open(&path).unwrap();
        store.upsert("a", "e4", Outcomes::WIN).unwrap();
        assert_eq!(store.path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonStatsStore::open(&path),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the snapshot file should be makes the rename fail.
        let path = dir.path().join("stats.json");
        let mut store = JsonStatsStore::open(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        assert!(store.apply_batch(&[entry("a", "e4", 1, 0, 0)]).is_err());
        assert_eq!(store.find("a", "e4").unwrap(), None);
    }

    #[test]
    fn test_failed_batch_is_rolled_back_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let mut store = JsonStatsStore::open(&path).unwrap();
        store
            .apply_batch(&[entry("a", "e4", 2, 1, 0), entry("b", "c5", 0, 0, 1)])
            .unwrap();
        let before = store.data().clone();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        // Existing pairs, new pairs and a pair repeated within the batch.
        let batch = [
            entry("a", "e4", 1, 0, 0),
            entry("a", "d4", 0, 1, 0),
            entry("c", "Nf3", 1, 0, 0),
            entry("c", "Nf3", 0, 0, 2),
        ];
        assert!(store.apply_batch(&batch).is_err());
        assert_eq!(store.data(), &before);
        assert!(store.upsert("a", "e4", Outcomes::WIN).is_err());
        assert!(store.upsert("d", "g3", Outcomes::WIN).is_err());
        assert_eq!(store.data(), &before);
    }

    #[test]
    fn test_entries_lists_every_pair() {
        let mut store = MemoryStatsStore::new();
        store
            .apply_batch(&[entry("b", "c5", 0, 0, 1), entry("a", "e4", 1, 0, 0)])
            .unwrap();
        let pairs: Vec<(String, String)> = store.entries().map(|e| (e.fen, e.mv)).collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "e4".to_string()),
                ("b".to_string(), "c5".to_string())
            ]
        );
    }
}
