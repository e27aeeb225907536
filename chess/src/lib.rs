pub mod board;
pub mod fen;
pub mod pgn;
pub mod types;

pub use board::{Board, CastlingRights};
pub use fen::{format_fen, normalized_fen, parse_fen, FenError, STARTING_FEN};
pub use pgn::{
    normalize_movetext, parse_pgn, resolve_san, GameRecord, GameResult, PgnError, PgnReader,
    PromotionPolicy, RawGame, ResolvedMove, ResolverOptions, SanError, SanResolver,
};
pub use types::{Piece, PieceColor, PieceKind, Square};
