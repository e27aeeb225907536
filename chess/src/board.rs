//! Mutable 8x8 board state used for SAN replay.

use crate::fen::{self, FenError};
use crate::types::{Piece, PieceColor, PieceKind, Square};

/// Independent castling availability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl CastlingRights {
    pub const ALL: Self = Self {
        white_kingside: true,
        white_queenside: true,
        black_kingside: true,
        black_queenside: true,
    };

    pub const NONE: Self = Self {
        white_kingside: false,
        white_queenside: false,
        black_kingside: false,
        black_queenside: false,
    };

    pub fn kingside(&self, color: PieceColor) -> bool {
        match color {
            PieceColor::White => self.white_kingside,
            PieceColor::Black => self.black_kingside,
        }
    }

    pub fn queenside(&self, color: PieceColor) -> bool {
        match color {
            PieceColor::White => self.white_queenside,
            PieceColor::Black => self.black_queenside,
        }
    }

    pub fn revoke_kingside(&mut self, color: PieceColor) {
        match color {
            PieceColor::White => self.white_kingside = false,
            PieceColor::Black => self.black_kingside = false,
        }
    }

    pub fn revoke_queenside(&mut self, color: PieceColor) {
        match color {
            PieceColor::White => self.white_queenside = false,
            PieceColor::Black => self.black_queenside = false,
        }
    }

    pub fn revoke_all(&mut self, color: PieceColor) {
        self.revoke_kingside(color);
        self.revoke_queenside(color);
    }

    /// Revoke `color`'s right tied to the rook corner `square`, if it is one.
    pub fn revoke_for_rook_square(&mut self, color: PieceColor, square: Square) {
        if square.rank != color.back_rank() {
            return;
        }
        match square.file {
            0 => self.revoke_queenside(color),
            7 => self.revoke_kingside(color),
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

impl Default for CastlingRights {
    fn default() -> Self {
        Self::ALL
    }
}

/// Piece placement, side to move, castling rights and the remaining FEN
/// counters for one position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Board {
    squares: [[Option<Piece>; 8]; 8],
    pub side_to_move: PieceColor,
    pub castling: CastlingRights,
    pub en_passant: Option<Square>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
}

impl Board {
    /// A board with no pieces, white to move and no castling rights.
    pub fn empty() -> Self {
        Self {
            squares: [[None; 8]; 8],
            side_to_move: PieceColor::White,
            castling: CastlingRights::NONE,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    pub fn starting_position() -> Self {
        let mut board = Self::empty();
        let back = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];
        for (file, kind) in back.into_iter().enumerate() {
            board.squares[0][file] = Some(Piece::new(kind, PieceColor::Black));
            board.squares[1][file] = Some(Piece::new(PieceKind::Pawn, PieceColor::Black));
            board.squares[6][file] = Some(Piece::new(PieceKind::Pawn, PieceColor::White));
            board.squares[7][file] = Some(Piece::new(kind, PieceColor::White));
        }
        board.castling = CastlingRights::ALL;
        board
    }

    /// Parse a board from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        fen::parse_fen(fen)
    }

    /// Export the board as a six-field FEN string.
    pub fn to_fen(&self) -> String {
        fen::format_fen(self)
    }

    /// Piece at `(rank, file)`; both must be in `0..8`.
    pub fn get(&self, rank: u8, file: u8) -> Option<Piece> {
        self.squares[rank as usize][file as usize]
    }

    /// Place or clear `(rank, file)`; both must be in `0..8`.
    pub fn set(&mut self, rank: u8, file: u8, piece: Option<Piece>) {
        self.squares[rank as usize][file as usize] = piece;
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.get(square.rank, square.file)
    }

    pub fn put(&mut self, square: Square, piece: Option<Piece>) {
        self.set(square.rank, square.file, piece);
    }

    /// Every occupied square with its piece, rank by rank from the eighth.
    pub fn occupied(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        self.squares.iter().enumerate().flat_map(|(rank, row)| {
            row.iter().enumerate().filter_map(move |(file, cell)| {
                cell.map(|piece| (Square::new(rank as u8, file as u8), piece))
            })
        })
    }

    pub fn toggle_side(&mut self) {
        self.side_to_move = self.side_to_move.opposite();
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::starting_position()
    }
}
