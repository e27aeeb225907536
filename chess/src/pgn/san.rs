//! Standard Algebraic Notation: token parsing, move resolution and application.
//!
//! The resolver works on trusted game data. It checks piece geometry and
//! blocking pieces but never looks at checks or pins: a pinned piece that
//! could geometrically reach the destination still counts as a candidate,
//! so a move that is only unambiguous because of a pin is reported as
//! [`SanError::AmbiguousMove`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use smallvec::SmallVec;

use crate::board::Board;
use crate::types::{Piece, PieceColor, PieceKind, Square};

static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([NBRQK])?([a-h])?([1-8])?(x)?([a-h][1-8])(?:=?([NBRQnbrq]))?[+#]?[!?]*$")
        .expect("SAN move pattern is valid")
});

static CASTLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:[O0]-[O0](-[O0])?)[+#]?[!?]*$").expect("castling pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastleSide {
    Kingside,
    Queenside,
}

/// A non-castling SAN move, decomposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanMove {
    pub piece: PieceKind,
    pub file_hint: Option<u8>,
    pub rank_hint: Option<u8>,
    pub capture: bool,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

/// A parsed SAN token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanToken {
    Castle(CastleSide),
    Move(SanMove),
}

impl FromStr for SanToken {
    type Err = SanError;

    fn from_str(san: &str) -> Result<Self, Self::Err> {
        if let Some(caps) = CASTLE_RE.captures(san) {
            let side = if caps.get(1).is_some() {
                CastleSide::Queenside
            } else {
                CastleSide::Kingside
            };
            return Ok(SanToken::Castle(side));
        }

        let caps = MOVE_RE
            .captures(san)
            .ok_or_else(|| SanError::InvalidFormat(san.to_string()))?;

        let first_char = |i: usize| caps.get(i).and_then(|m| m.as_str().chars().next());

        let piece = first_char(1)
            .and_then(PieceKind::from_char)
            .unwrap_or(PieceKind::Pawn);
        let to = caps[5]
            .parse::<Square>()
            .map_err(|_| SanError::InvalidFormat(san.to_string()))?;
        let promotion = first_char(6).and_then(PieceKind::from_char);

        if promotion.is_some() && piece != PieceKind::Pawn {
            return Err(SanError::InvalidPromotion(san.to_string()));
        }

        Ok(SanToken::Move(SanMove {
            piece,
            file_hint: first_char(2).and_then(Square::file_index),
            rank_hint: first_char(3).and_then(Square::rank_index),
            capture: caps.get(4).is_some(),
            to,
            promotion,
        }))
    }
}

/// Drop check, mate and annotation suffixes (`+ # ! ?`) from a SAN token.
pub fn canonical_san(san: &str) -> &str {
    san.trim_end_matches(['+', '#', '!', '?'])
}

/// Whether the promotion suffix changes the piece placed on the last rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromotionPolicy {
    /// The pawn itself lands on the promotion square. Boards and statistics
    /// keys derived this way match those of earlier imports.
    #[default]
    Legacy,
    /// The promoted piece is placed.
    Apply,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolverOptions {
    pub promotion: PromotionPolicy,
}

/// Source and destination of a resolved move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

impl ResolvedMove {
    /// Format in UCI notation (e.g., "e2e4", "e7e8q", "e1g1").
    pub fn uci(&self) -> String {
        let mut s = format!("{}{}", self.from, self.to);
        if let Some(promo) = self.promotion {
            s.push(promo.to_char_lower());
        }
        s
    }
}

impl fmt::Display for ResolvedMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uci())
    }
}

/// Resolves SAN tokens against a board and plays them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SanResolver {
    options: ResolverOptions,
}

impl SanResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    /// Resolve `san` for the side to move and apply it to `board`.
    ///
    /// The board is left untouched when an error is returned.
    pub fn resolve(&self, board: &mut Board, san: &str) -> Result<ResolvedMove, SanError> {
        match san.parse::<SanToken>()? {
            SanToken::Castle(side) => Ok(castle(board, side)),
            SanToken::Move(mv) => {
                let from = find_source(board, &mv, san)?;
                Ok(self.apply(board, from, &mv))
            }
        }
    }

    fn apply(&self, board: &mut Board, from: Square, mv: &SanMove) -> ResolvedMove {
        let color = board.side_to_move;
        let moving = Piece::new(mv.piece, color);
        let to = mv.to;
        let mut captured = board.piece_at(to);

        if mv.piece == PieceKind::Pawn && from.file != to.file && captured.is_none() {
            let passed = Square::new(from.rank, to.file);
            if board.piece_at(passed) == Some(Piece::new(PieceKind::Pawn, color.opposite())) {
                captured = board.piece_at(passed);
                board.put(passed, None);
            }
        }

        let placed = match (mv.promotion, self.options.promotion) {
            (Some(kind), PromotionPolicy::Apply) => Piece::new(kind, color),
            _ => moving,
        };
        board.put(from, None);
        board.put(to, Some(placed));

        match mv.piece {
            PieceKind::King => board.castling.revoke_all(color),
            PieceKind::Rook => board.castling.revoke_for_rook_square(color, from),
            _ => {}
        }
        if let Some(victim) = captured {
            if victim.kind == PieceKind::Rook {
                board.castling.revoke_for_rook_square(victim.color, to);
            }
        }

        board.en_passant = None;
        if mv.piece == PieceKind::Pawn && from.rank.abs_diff(to.rank) == 2 {
            let enemy_pawn = Piece::new(PieceKind::Pawn, color.opposite());
            let capturable = [-1, 1]
                .into_iter()
                .filter_map(|df| to.offset(0, df))
                .any(|sq| board.piece_at(sq) == Some(enemy_pawn));
            if capturable {
                board.en_passant = from.offset(color.forward(), 0);
            }
        }

        if mv.piece == PieceKind::Pawn || captured.is_some() {
            board.halfmove_clock = 0;
        } else {
            board.halfmove_clock = board.halfmove_clock.saturating_add(1);
        }
        finish_turn(board);

        ResolvedMove {
            from,
            to,
            promotion: mv.promotion,
        }
    }
}

/// Resolve and apply `san` with default options.
pub fn resolve_san(board: &mut Board, san: &str) -> Result<ResolvedMove, SanError> {
    SanResolver::default().resolve(board, san)
}

fn find_source(board: &Board, mv: &SanMove, san: &str) -> Result<Square, SanError> {
    let color = board.side_to_move;
    let wanted = Piece::new(mv.piece, color);

    if board.piece_at(mv.to).is_some_and(|p| p.color == color) {
        return Err(SanError::NoLegalMove(san.to_string()));
    }

    let candidates: SmallVec<[Square; 2]> = board
        .occupied()
        .filter(|&(from, piece)| {
            piece == wanted
                && mv.file_hint.is_none_or(|f| from.file == f)
                && mv.rank_hint.is_none_or(|r| from.rank == r)
                && (mv.piece != PieceKind::Pawn || mv.capture == (from.file != mv.to.file))
                && can_piece_reach(board, wanted, from, mv.to)
        })
        .map(|(from, _)| from)
        .collect();

    match candidates.as_slice() {
        [from] => Ok(*from),
        [] => Err(SanError::NoLegalMove(san.to_string())),
        _ => Err(SanError::AmbiguousMove(san.to_string())),
    }
}

/// Whether `piece` standing on `from` could move to `to`, by geometry and
/// blocking pieces alone.
pub fn can_piece_reach(board: &Board, piece: Piece, from: Square, to: Square) -> bool {
    if from == to {
        return false;
    }
    let d_rank = to.rank as i8 - from.rank as i8;
    let d_file = to.file as i8 - from.file as i8;

    match piece.kind {
        PieceKind::Pawn => {
            let forward = piece.color.forward();
            if d_file == 0 {
                if board.piece_at(to).is_some() {
                    return false;
                }
                d_rank == forward
                    || (d_rank == 2 * forward
                        && from.rank == piece.color.pawn_home_rank()
                        && is_path_clear(board, from, to))
            } else {
                d_file.abs() == 1 && d_rank == forward
            }
        }
        PieceKind::Knight => d_rank * d_rank + d_file * d_file == 5,
        PieceKind::Bishop => d_rank.abs() == d_file.abs() && is_path_clear(board, from, to),
        PieceKind::Rook => (d_rank == 0 || d_file == 0) && is_path_clear(board, from, to),
        PieceKind::Queen => {
            (d_rank == 0 || d_file == 0 || d_rank.abs() == d_file.abs())
                && is_path_clear(board, from, to)
        }
        PieceKind::King => d_rank.abs().max(d_file.abs()) == 1,
    }
}

/// Whether every square strictly between two aligned squares is empty.
pub fn is_path_clear(board: &Board, from: Square, to: Square) -> bool {
    let step_rank = (to.rank as i8 - from.rank as i8).signum();
    let step_file = (to.file as i8 - from.file as i8).signum();
    let mut current = from;
    loop {
        current = match current.offset(step_rank, step_file) {
            Some(sq) => sq,
            None => return false,
        };
        if current == to {
            return true;
        }
        if board.piece_at(current).is_some() {
            return false;
        }
    }
}

fn castle(board: &mut Board, side: CastleSide) -> ResolvedMove {
    let color = board.side_to_move;
    let rank = color.back_rank();
    let (king_to, rook_from, rook_to) = match side {
        CastleSide::Kingside => (6, 7, 5),
        CastleSide::Queenside => (2, 0, 3),
    };

    board.set(rank, 4, None);
    board.set(rank, rook_from, None);
    board.set(rank, king_to, Some(Piece::new(PieceKind::King, color)));
    board.set(rank, rook_to, Some(Piece::new(PieceKind::Rook, color)));
    board.castling.revoke_all(color);
    board.en_passant = None;
    board.halfmove_clock = board.halfmove_clock.saturating_add(1);
    finish_turn(board);

    ResolvedMove {
        from: Square::new(rank, 4),
        to: Square::new(rank, king_to),
        promotion: None,
    }
}

fn finish_turn(board: &mut Board) {
    if board.side_to_move == PieceColor::Black {
        board.fullmove_number = board.fullmove_number.saturating_add(1);
    }
    board.toggle_side();
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanError {
    #[error("No piece can play: {0}")]
    NoLegalMove(String),
    #[error("Ambiguous move: {0}")]
    AmbiguousMove(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Invalid promotion: {0}")]
    InvalidPromotion(String),
}

impl SanError {
    /// True for zero or several candidates, false for malformed tokens.
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::NoLegalMove(_) | Self::AmbiguousMove(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fen::STARTING_FEN;

    fn sq(s: &str) -> Square {
        s.parse().unwrap()
    }

    fn play(board: &mut Board, moves: &[&str]) -> Vec<String> {
        moves
            .iter()
            .map(|san| resolve_san(board, san).unwrap().uci())
            .collect()
    }

    #[test]
    fn test_parse_token_shapes() {
        assert_eq!(
            "Nbd7".parse::<SanToken>().unwrap(),
            SanToken::Move(SanMove {
                piece: PieceKind::Knight,
                file_hint: Some(1),
                rank_hint: None,
                capture: false,
                to: sq("d7"),
                promotion: None,
            })
        );
        assert_eq!(
            "exd5".parse::<SanToken>().unwrap(),
            SanToken::Move(SanMove {
                piece: PieceKind::Pawn,
                file_hint: Some(4),
                rank_hint: None,
                capture: true,
                to: sq("d5"),
                promotion: None,
            })
        );
        let SanToken::Move(promo) = "e8=Q+".parse::<SanToken>().unwrap() else {
            panic!("expected a move");
        };
        assert_eq!(promo.promotion, Some(PieceKind::Queen));
        let SanToken::Move(hinted) = "R1a3".parse::<SanToken>().unwrap() else {
            panic!("expected a move");
        };
        assert_eq!(hinted.rank_hint, Square::rank_index('1'));
    }

    #[test]
    fn test_parse_castling_variants() {
        for token in ["O-O", "o-o", "0-0", "O-O+"] {
            assert_eq!(
                token.parse::<SanToken>().unwrap(),
                SanToken::Castle(CastleSide::Kingside),
                "{token}"
            );
        }
        for token in ["O-O-O", "0-0-0#", "o-o-o"] {
            assert_eq!(
                token.parse::<SanToken>().unwrap(),
                SanToken::Castle(CastleSide::Queenside),
                "{token}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for token in ["", "Zf3", "e9", "Nf", "--", "1-0", "Ke8=Q"] {
            assert!(token.parse::<SanToken>().is_err(), "{token}");
        }
        assert_eq!(
            "Ke8=Q".parse::<SanToken>(),
            Err(SanError::InvalidPromotion("Ke8=Q".to_string()))
        );
    }

    #[test]
    fn test_canonical_san() {
        assert_eq!(canonical_san("Nf3+"), "Nf3");
        assert_eq!(canonical_san("Qxf7#"), "Qxf7");
        assert_eq!(canonical_san("e4!?"), "e4");
        assert_eq!(canonical_san("O-O"), "O-O");
    }

    #[test]
    fn test_ruy_lopez_scenario() {
        let mut board = Board::starting_position();
        let ucis = play(&mut board, &["e4", "e5", "Nf3", "Nc6", "Bb5"]);
        assert_eq!(ucis, vec!["e2e4", "e7e5", "g1f3", "b8c6", "f1b5"]);

        let white = |k| Some(Piece::new(k, PieceColor::White));
        let black = |k| Some(Piece::new(k, PieceColor::Black));
        assert_eq!(board.piece_at(sq("f3")), white(PieceKind::Knight));
        assert_eq!(board.piece_at(sq("b5")), white(PieceKind::Bishop));
        assert_eq!(board.piece_at(sq("c6")), black(PieceKind::Knight));
        assert_eq!(board.piece_at(sq("e4")), white(PieceKind::Pawn));
        assert_eq!(board.piece_at(sq("e5")), black(PieceKind::Pawn));
        for origin in ["e2", "e7", "g1", "b8", "f1"] {
            assert_eq!(board.piece_at(sq(origin)), None, "{origin}");
        }
        assert_eq!(board.side_to_move, PieceColor::Black);
        assert_eq!(
            board.to_fen(),
            "r1bqkbnr/pppp1ppp/2n5/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3"
        );
    }

    #[test]
    fn test_white_kingside_castling() {
        let mut board = Board::starting_position();
        play(&mut board, &["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"]);
        let castle = resolve_san(&mut board, "O-O").unwrap();

        assert_eq!(castle.from, sq("e1"));
        assert_eq!(castle.to, sq("g1"));
        assert_eq!(
            board.piece_at(sq("g1")),
            Some(Piece::new(PieceKind::King, PieceColor::White))
        );
        assert_eq!(
            board.piece_at(sq("f1")),
            Some(Piece::new(PieceKind::Rook, PieceColor::White))
        );
        assert_eq!(board.piece_at(sq("e1")), None);
        assert_eq!(board.piece_at(sq("h1")), None);
        assert!(!board.castling.kingside(PieceColor::White));
        assert!(!board.castling.queenside(PieceColor::White));
        assert!(board.castling.kingside(PieceColor::Black));
        assert_eq!(board.side_to_move, PieceColor::Black);
    }

    #[test]
    fn test_black_queenside_castling() {
        let mut board =
            Board::from_fen("r3k2r/pppq1ppp/2npbn2/4p3/4P3/2NPBN2/PPPQ1PPP/R3K2R b KQkq - 0 8")
                .unwrap();
        let castle = resolve_san(&mut board, "O-O-O").unwrap();
        assert_eq!(castle.uci(), "e8c8");
        assert_eq!(
            board.piece_at(sq("d8")),
            Some(Piece::new(PieceKind::Rook, PieceColor::Black))
        );
        assert_eq!(board.piece_at(sq("a8")), None);
        assert_eq!(board.to_fen().split(' ').nth(2), Some("KQ"));
        assert_eq!(board.fullmove_number, 9);
    }

    #[test]
    fn test_pawn_double_step() {
        let mut board = Board::starting_position();
        let mv = resolve_san(&mut board, "e4").unwrap();
        assert_eq!((mv.from, mv.to), (sq("e2"), sq("e4")));
    }

    #[test]
    fn test_pawn_double_step_blocked() {
        let mut board = Board::starting_position();
        board.put(sq("e3"), Some(Piece::new(PieceKind::Knight, PieceColor::Black)));
        let before = board.clone();

        let err = resolve_san(&mut board, "e4").unwrap_err();
        assert!(err.is_unresolvable());
        assert_eq!(board, before);
    }

    #[test]
    fn test_pawn_double_step_only_from_home_rank() {
        let fen = "4k3/8/8/8/8/4P3/8/4K3 w - - 0 1";
        let mut board = Board::from_fen(fen).unwrap();
        assert_eq!(resolve_san(&mut board, "e4").unwrap().from, sq("e3"));

        let mut board = Board::from_fen(fen).unwrap();
        assert!(matches!(
            resolve_san(&mut board, "e5"),
            Err(SanError::NoLegalMove(_))
        ));
    }

    #[test]
    fn test_file_and_rank_hints() {
        // Knights on b8 and f6 both reach d7.
        let fen = "rn1qkb1r/ppp2ppp/5n2/3pp3/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let mut board = Board::from_fen(fen).unwrap();
        assert_eq!(resolve_san(&mut board, "Nbd7").unwrap().from, sq("b8"));

        let mut board = Board::from_fen(fen).unwrap();
        assert_eq!(resolve_san(&mut board, "Nfd7").unwrap().from, sq("f6"));

        let mut board = Board::from_fen(fen).unwrap();
        assert!(matches!(
            resolve_san(&mut board, "Nd7"),
            Err(SanError::AmbiguousMove(_))
        ));

        // Rooks on a1 and a5 both reach a3.
        let fen = "4k3/8/8/R7/8/8/8/R3K3 w - - 0 1";
        let mut board = Board::from_fen(fen).unwrap();
        assert_eq!(resolve_san(&mut board, "R1a3").unwrap().from, sq("a1"));
        let mut board = Board::from_fen(fen).unwrap();
        assert_eq!(resolve_san(&mut board, "R5a3").unwrap().from, sq("a5"));
    }

    #[test]
    fn test_sliding_pieces_are_blocked() {
        let mut board = Board::starting_position();
        assert!(resolve_san(&mut board, "Bc4").unwrap_err().is_unresolvable());
        assert!(resolve_san(&mut board, "Qh5").unwrap_err().is_unresolvable());
        assert!(resolve_san(&mut board, "Ra3").unwrap_err().is_unresolvable());
        assert_eq!(board, Board::starting_position());
    }

    #[test]
    fn test_pinned_piece_still_counts_as_candidate() {
        // The c3 knight is pinned against e1 by the b4 bishop, so real chess
        // would accept "Ne2" as the g1 knight. Geometry alone sees two.
        let fen = "4k3/8/8/8/1b6/2N5/8/4K1N1 w - - 0 1";
        let mut board = Board::from_fen(fen).unwrap();
        assert!(matches!(
            resolve_san(&mut board, "Ne2"),
            Err(SanError::AmbiguousMove(_))
        ));

        let mut board = Board::from_fen(fen).unwrap();
        assert_eq!(resolve_san(&mut board, "Nge2").unwrap().from, sq("g1"));
    }

    #[test]
    fn test_capture_and_en_passant() {
        let mut board = Board::starting_position();
        play(&mut board, &["e4", "d5", "exd5", "c5"]);
        assert_eq!(board.en_passant, Some(sq("c6")));

        let mv = resolve_san(&mut board, "dxc6").unwrap();
        assert_eq!(mv.uci(), "d5c6");
        assert_eq!(board.piece_at(sq("c5")), None);
        assert_eq!(
            board.piece_at(sq("c6")),
            Some(Piece::new(PieceKind::Pawn, PieceColor::White))
        );
        assert_eq!(board.en_passant, None);
    }

    #[test]
    fn test_en_passant_square_only_when_capturable() {
        let mut board = Board::starting_position();
        resolve_san(&mut board, "e4").unwrap();
        assert_eq!(board.en_passant, None);
        assert_eq!(board.to_fen(), "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1");
    }

    #[test]
    fn test_promotion_policies() {
        let fen = "8/4P3/8/8/8/8/k7/4K3 w - - 0 1";

        let mut legacy = Board::from_fen(fen).unwrap();
        let mv = resolve_san(&mut legacy, "e8=Q").unwrap();
        assert_eq!(mv.uci(), "e7e8q");
        assert_eq!(
            legacy.piece_at(sq("e8")),
            Some(Piece::new(PieceKind::Pawn, PieceColor::White))
        );

        let resolver = SanResolver::new(ResolverOptions {
            promotion: PromotionPolicy::Apply,
        });
        let mut applied = Board::from_fen(fen).unwrap();
        resolver.resolve(&mut applied, "e8=Q").unwrap();
        assert_eq!(
            applied.piece_at(sq("e8")),
            Some(Piece::new(PieceKind::Queen, PieceColor::White))
        );
    }

    #[test]
    fn test_rook_moves_and_captures_revoke_castling() {
        let mut board = Board::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        resolve_san(&mut board, "Rxa8").unwrap();
        assert!(!board.castling.white_queenside);
        assert!(!board.castling.black_queenside);
        assert!(board.castling.white_kingside);
        assert!(board.castling.black_kingside);

        resolve_san(&mut board, "Kd7").unwrap();
        assert!(!board.castling.black_kingside);
        assert_eq!(board.to_fen(), "R6r/3k4/8/8/8/8/8/4K2R w K - 1 2");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let start = Board::from_fen(STARTING_FEN).unwrap();
        let mut a = start.clone();
        let mut b = start.clone();
        for san in ["d4", "Nf6", "c4", "e6", "Nc3", "Bb4"] {
            assert_eq!(resolve_san(&mut a, san), resolve_san(&mut b, san));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_cannot_land_on_own_piece() {
        let mut board = Board::starting_position();
        assert!(resolve_san(&mut board, "Nd2").unwrap_err().is_unresolvable());
    }

    #[test]
    fn test_counters_saturate_at_maximum() {
        let mut board =
            Board::from_fen("4k3/8/8/8/8/8/8/4K1NR w K - 4294967295 4294967295").unwrap();
        resolve_san(&mut board, "Ng3").unwrap();
        resolve_san(&mut board, "Kd7").unwrap();
        assert_eq!(board.halfmove_clock, u32::MAX);
        assert_eq!(board.fullmove_number, u32::MAX);

        resolve_san(&mut board, "O-O").unwrap();
        assert_eq!(board.halfmove_clock, u32::MAX);
    }
}
