//! Ordering of candidate moves for a position.

use std::cmp::Ordering;

use chess::PieceColor;

use crate::aggregator::{Outcomes, StatEntry};

#[derive(Debug, Clone, PartialEq)]
pub struct RankedMove {
    pub mv: String,
    pub outcomes: Outcomes,
    /// Share of points for `side_to_move`, draws counting half.
    pub score: f64,
}

/// Rank the moves stored for one position.
///
/// Counters are read as absolute results (wins are white wins). Moves are
/// ordered by games played, then by score for `side_to_move`, then by SAN.
/// For counters already kept from the mover's point of view pass
/// [`PieceColor::White`].
pub fn rank_moves(entries: &[StatEntry], side_to_move: PieceColor) -> Vec<RankedMove> {
    let mut ranked: Vec<RankedMove> = entries
        .iter()
        .map(|entry| {
            let outcomes = match side_to_move {
                PieceColor::White => entry.outcomes,
                PieceColor::Black => entry.outcomes.flipped(),
            };
            RankedMove {
                mv: entry.mv.clone(),
                outcomes: entry.outcomes,
                score: outcomes.score(),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.outcomes
            .total()
            .cmp(&a.outcomes.total())
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
            .then_with(|| a.mv.cmp(&b.mv))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mv: &str, wins: u64, draws: u64, losses: u64) -> StatEntry {
        StatEntry {
            fen: "fen".to_string(),
            mv: mv.to_string(),
            outcomes: Outcomes {
                wins,
                draws,
                losses,
            },
        }
    }

    #[test]
    fn test_most_played_first() {
        let entries = [entry("d4", 1, 0, 0), entry("e4", 3, 2, 5)];
        let ranked = rank_moves(&entries, PieceColor::White);
        assert_eq!(ranked[0].mv, "e4");
        assert_eq!(ranked[1].mv, "d4");
    }

    #[test]
    fn test_score_depends_on_side_to_move() {
        // Same number of games: the better move for the side to move wins.
        let entries = [entry("c5", 3, 0, 1), entry("e5", 1, 0, 3)];

        let for_white = rank_moves(&entries, PieceColor::White);
        assert_eq!(for_white[0].mv, "c5");
        assert!((for_white[0].score - 0.75).abs() < 1e-9);

        let for_black = rank_moves(&entries, PieceColor::Black);
        assert_eq!(for_black[0].mv, "e5");
        assert!((for_black[0].score - 0.75).abs() < 1e-9);
        // Raw counters are reported unchanged.
        assert_eq!(for_black[0].outcomes.wins, 1);
    }

    #[test]
    fn test_ties_break_by_san() {
        let entries = [entry("Nf3", 1, 0, 0), entry("Nc3", 1, 0, 0)];
        let ranked = rank_moves(&entries, PieceColor::White);
        assert_eq!(ranked[0].mv, "Nc3");
        assert!(rank_moves(&[], PieceColor::Black).is_empty());
    }
}
