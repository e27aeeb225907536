//! PGN input: streaming reader, movetext normalization and SAN resolution.

pub mod movetext;
pub mod parser;
pub mod reader;
pub mod san;

pub use movetext::normalize_movetext;
pub use parser::{parse_pgn, parse_tag_line, GameRecord, GameResult, PgnError};
pub use reader::{PgnReader, RawGame};
pub use san::{
    can_piece_reach, canonical_san, is_path_clear, resolve_san, CastleSide, PromotionPolicy,
    ResolvedMove, ResolverOptions, SanError, SanMove, SanResolver, SanToken,
};
