//! FEN codec for [`Board`].

use crate::board::{Board, CastlingRights};
use crate::types::{Piece, PieceColor, Square};

/// The standard initial position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Parse a FEN string into a Board.
///
/// Only the placement field is mandatory. Missing trailing fields default to
/// white to move, no castling, no en-passant square, halfmove 0, fullmove 1.
pub fn parse_fen(fen: &str) -> Result<Board, FenError> {
    let mut parts = fen.split_whitespace();
    let placement = parts.next().ok_or(FenError::InvalidFormat)?;

    let mut board = Board::empty();
    parse_placement(placement, &mut board)?;

    board.side_to_move = match parts.next() {
        None | Some("w") => PieceColor::White,
        Some("b") => PieceColor::Black,
        Some(other) => return Err(FenError::InvalidSideToMove(other.to_string())),
    };

    board.castling = match parts.next() {
        None => CastlingRights::NONE,
        Some(field) => parse_castling(field)?,
    };

    board.en_passant = match parts.next() {
        None | Some("-") => None,
        Some(field) => Some(
            field
                .parse::<Square>()
                .map_err(|_| FenError::InvalidEnPassant(field.to_string()))?,
        ),
    };

    board.halfmove_clock = parse_counter(parts.next(), 0)?;
    board.fullmove_number = parse_counter(parts.next(), 1)?;

    Ok(board)
}

/// Format a Board as a six-field FEN string.
pub fn format_fen(board: &Board) -> String {
    format!(
        "{} {} {}",
        normalized_fen(board),
        board.halfmove_clock,
        board.fullmove_number
    )
}

/// The first four FEN fields (placement, side, castling, en passant).
///
/// Move counters are left out so that transpositions share a key.
pub fn normalized_fen(board: &Board) -> String {
    let en_passant = board
        .en_passant
        .map(|sq| sq.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {} {} {}",
        format_placement(board),
        match board.side_to_move {
            PieceColor::White => 'w',
            PieceColor::Black => 'b',
        },
        format_castling(&board.castling),
        en_passant
    )
}

fn parse_placement(placement: &str, board: &mut Board) -> Result<(), FenError> {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::MalformedPlacement(placement.to_string()));
    }

    for (rank, rank_str) in ranks.iter().enumerate() {
        let mut file = 0usize;
        for c in rank_str.chars() {
            if let Some(skip) = c.to_digit(10) {
                if !(1..=8).contains(&skip) {
                    return Err(FenError::MalformedPlacement(placement.to_string()));
                }
                file += skip as usize;
            } else {
                if file >= 8 {
                    return Err(FenError::MalformedPlacement(placement.to_string()));
                }
                let piece = Piece::from_fen_char(c).ok_or(FenError::InvalidPiece(c))?;
                board.set(rank as u8, file as u8, Some(piece));
                file += 1;
            }
        }
        if file != 8 {
            return Err(FenError::MalformedPlacement(placement.to_string()));
        }
    }

    Ok(())
}

fn format_placement(board: &Board) -> String {
    let mut out = String::with_capacity(64);
    for rank in 0..8u8 {
        if rank > 0 {
            out.push('/');
        }
        let mut empty = 0u8;
        for file in 0..8u8 {
            match board.get(rank, file) {
                Some(piece) => {
                    if empty > 0 {
                        out.push((b'0' + empty) as char);
                        empty = 0;
                    }
                    out.push(piece.to_fen_char());
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            out.push((b'0' + empty) as char);
        }
    }
    out
}

fn parse_castling(field: &str) -> Result<CastlingRights, FenError> {
    let mut rights = CastlingRights::NONE;
    if field == "-" {
        return Ok(rights);
    }
    for c in field.chars() {
        match c {
            'K' => rights.white_kingside = true,
            'Q' => rights.white_queenside = true,
            'k' => rights.black_kingside = true,
            'q' => rights.black_queenside = true,
            _ => return Err(FenError::InvalidCastling(field.to_string())),
        }
    }
    Ok(rights)
}

fn format_castling(rights: &CastlingRights) -> String {
    if rights.is_empty() {
        return "-".to_string();
    }
    let mut out = String::with_capacity(4);
    for (set, c) in [
        (rights.white_kingside, 'K'),
        (rights.white_queenside, 'Q'),
        (rights.black_kingside, 'k'),
        (rights.black_queenside, 'q'),
    ] {
        if set {
            out.push(c);
        }
    }
    out
}

fn parse_counter(field: Option<&str>, default: u32) -> Result<u32, FenError> {
    match field {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| FenError::InvalidCounter(s.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    #[error("Invalid FEN format")]
    InvalidFormat,
    #[error("Malformed FEN placement (expected 8 ranks of 8 files): {0}")]
    MalformedPlacement(String),
    #[error("Invalid piece character: {0}")]
    InvalidPiece(char),
    #[error("Invalid side to move: {0}")]
    InvalidSideToMove(String),
    #[error("Invalid castling field: {0}")]
    InvalidCastling(String),
    #[error("Invalid en passant field: {0}")]
    InvalidEnPassant(String),
    #[error("Invalid move counter: {0}")]
    InvalidCounter(String),
}
