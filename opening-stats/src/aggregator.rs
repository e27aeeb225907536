//! In-memory (position, move) outcome accumulation.

use std::collections::HashMap;
use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

use chess::fen::normalized_fen;
use chess::pgn::{canonical_san, GameRecord, GameResult, ResolverOptions, SanError, SanResolver};
use chess::{Board, FenError, PieceColor};
use serde::{Deserialize, Serialize};

/// Win/draw/loss counters for one (position, move) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcomes {
    pub wins: u64,
    pub draws: u64,
    pub losses: u64,
}

impl Outcomes {
    pub const WIN: Self = Self { wins: 1, draws: 0, losses: 0 };
    pub const DRAW: Self = Self { wins: 0, draws: 1, losses: 0 };
    pub const LOSS: Self = Self { wins: 0, draws: 0, losses: 1 };

    pub fn total(&self) -> u64 {
        self.wins + self.draws + self.losses
    }

    /// Same counts with wins and losses exchanged.
    pub fn flipped(self) -> Self {
        Self {
            wins: self.losses,
            draws: self.draws,
            losses: self.wins,
        }
    }

    /// Share of points scored by the side the counts are written for,
    /// draws counting half. Zero when empty.
    pub fn score(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.wins as f64 + self.draws as f64 / 2.0) / total as f64
    }
}

impl AddAssign for Outcomes {
    fn add_assign(&mut self, rhs: Self) {
        self.wins += rhs.wins;
        self.draws += rhs.draws;
        self.losses += rhs.losses;
    }
}

/// Whose point of view the win and loss counters take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultPerspective {
    /// Wins count white victories and losses black victories, for every move.
    #[default]
    Absolute,
    /// Wins and losses are those of the player making the move.
    Mover,
}

impl ResultPerspective {
    /// Counter delta for one move by `mover` in a game ending with `result`.
    pub fn outcome(self, result: GameResult, mover: PieceColor) -> Option<Outcomes> {
        let absolute = match result {
            GameResult::WhiteWins => Outcomes::WIN,
            GameResult::BlackWins => Outcomes::LOSS,
            GameResult::Draw => Outcomes::DRAW,
            GameResult::Unknown => return None,
        };
        Some(match (self, mover) {
            (Self::Mover, PieceColor::Black) => absolute.flipped(),
            _ => absolute,
        })
    }
}

impl fmt::Display for ResultPerspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Mover => write!(f, "mover"),
        }
    }
}

impl FromStr for ResultPerspective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "absolute" => Ok(Self::Absolute),
            "mover" => Ok(Self::Mover),
            other => Err(format!("unknown result perspective '{other}' (expected absolute or mover)")),
        }
    }
}

/// Normalized FEN (first four fields) plus the SAN move played from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey {
    pub fen: String,
    pub mv: String,
}

/// One row of aggregated statistics, as handed to a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEntry {
    pub fen: String,
    pub mv: String,
    pub outcomes: Outcomes,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("invalid starting position: {0}")]
    StartPosition(#[from] FenError),
    #[error("move {ply} ({san}) could not be replayed: {source}")]
    Move {
        ply: usize,
        san: String,
        /// Pairs counted before the failing move.
        recorded: usize,
        #[source]
        source: SanError,
    },
}

impl ReplayError {
    /// Pairs the failed game still counted.
    pub fn plies_recorded(&self) -> usize {
        match self {
            Self::StartPosition(_) => 0,
            Self::Move { recorded, .. } => *recorded,
        }
    }
}

/// Accumulates outcome counts per (position, move) across games.
#[derive(Debug, Clone)]
pub struct Aggregator {
    max_plies: usize,
    resolver: SanResolver,
    perspective: ResultPerspective,
    counts: HashMap<PositionKey, Outcomes>,
    games: u64,
}

impl Aggregator {
    pub fn new(max_plies: usize, options: ResolverOptions, perspective: ResultPerspective) -> Self {
        Self {
            max_plies,
            resolver: SanResolver::new(options),
            perspective,
            counts: HashMap::new(),
            games: 0,
        }
    }

    /// Replay `game` and count its result against each of its first
    /// `max_plies` (position, move) pairs.
    ///
    /// Returns the number of pairs counted. Games with an unknown result
    /// count nothing. A move that cannot be resolved ends the replay with an
    /// error; pairs counted before that move are kept.
    ///
    /// A pair is counted only once its move resolves, so the failing move
    /// itself is never counted.
    pub fn record_game(&mut self, game: &GameRecord) -> Result<usize, ReplayError> {
        if game.result == GameResult::Unknown {
            tracing::debug!(game = game.ordinal, "skipping game without a decisive or drawn result");
            return Ok(0);
        }

        let mut board = match &game.start_fen {
            Some(fen) => Board::from_fen(fen)?,
            None => Board::starting_position(),
        };
        self.games += 1;

        let mut recorded = 0;
        for (ply, san) in game.moves.iter().take(self.max_plies).enumerate() {
            let fen = normalized_fen(&board);
            let mover = board.side_to_move;
            self.resolver
                .resolve(&mut board, san)
                .map_err(|source| ReplayError::Move {
                    ply: ply + 1,
                    san: san.clone(),
                    recorded,
                    source,
                })?;
            if let Some(delta) = self.perspective.outcome(game.result, mover) {
                self.record(fen, canonical_san(san).to_string(), delta);
                recorded += 1;
            }
        }
        Ok(recorded)
    }

    /// Add `delta` to the counters of `(fen, mv)`.
    pub fn record(&mut self, fen: String, mv: String, delta: Outcomes) {
        *self.counts.entry(PositionKey { fen, mv }).or_default() += delta;
    }

    pub fn get(&self, fen: &str, mv: &str) -> Option<Outcomes> {
        self.counts
            .get(&PositionKey {
                fen: fen.to_string(),
                mv: mv.to_string(),
            })
            .copied()
    }

    /// Add every counter of `other` into this aggregator.
    pub fn merge(&mut self, other: Aggregator) {
        self.games += other.games;
        for (key, delta) in other.counts {
            *self.counts.entry(key).or_default() += delta;
        }
    }

    /// Distinct (position, move) pairs held.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Games that contributed counts since creation.
    pub fn games_recorded(&self) -> u64 {
        self.games
    }

    /// Take the accumulated counters, sorted by key, leaving the aggregator
    /// empty. Pairs seen in fewer than `min_games` games are dropped.
    pub fn drain_batch(&mut self, min_games: u64) -> Vec<StatEntry> {
        let held = self.counts.len();
        let mut entries: Vec<StatEntry> = self
            .counts
            .drain()
            .filter(|(_, outcomes)| outcomes.total() >= min_games)
            .map(|(key, outcomes)| StatEntry {
                fen: key.fen,
                mv: key.mv,
                outcomes,
            })
            .collect();
        entries.sort_by(|a, b| (&a.fen, &a.mv).cmp(&(&b.fen, &b.mv)));
        tracing::debug!(
            kept = entries.len(),
            dropped = held - entries.len(),
            min_games,
            "drained batch"
        );
        entries
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(20, ResolverOptions::default(), ResultPerspective::default())
    }
}
