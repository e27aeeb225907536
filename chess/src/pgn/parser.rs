use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::movetext::{normalize_movetext, trailing_result};
use super::reader::{PgnReader, RawGame};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[\s*(\w+)\s+"((?:[^"\\]|\\.)*)"\s*\]"#).expect("tag pattern is valid")
});

/// A game ready for replay: tags, mainline SAN tokens and declared result.
#[derive(Debug, Clone)]
pub struct GameRecord {
    /// 1-based position of the game in the stream it was read from.
    pub ordinal: u64,
    pub tags: HashMap<String, String>,
    pub moves: Vec<String>,
    pub result: GameResult,
    /// Starting position when the game carries a `FEN` tag.
    pub start_fen: Option<String>,
    /// Byte offset in the stream at which the next game starts.
    pub end_offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    Unknown,
}

impl GameResult {
    pub fn from_pgn(s: &str) -> Self {
        match s.trim() {
            "1-0" => Self::WhiteWins,
            "0-1" => Self::BlackWins,
            "1/2-1/2" => Self::Draw,
            _ => Self::Unknown,
        }
    }

    pub fn as_pgn(self) -> &'static str {
        match self {
            Self::WhiteWins => "1-0",
            Self::BlackWins => "0-1",
            Self::Draw => "1/2-1/2",
            Self::Unknown => "*",
        }
    }
}

impl GameRecord {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }
}

impl From<RawGame> for GameRecord {
    fn from(raw: RawGame) -> Self {
        let tags: HashMap<String, String> = raw.tags.into_iter().collect();

        let mut result = tags
            .get("Result")
            .map(|r| GameResult::from_pgn(r))
            .unwrap_or(GameResult::Unknown);
        if result == GameResult::Unknown {
            if let Some(marker) = trailing_result(&raw.movetext) {
                result = GameResult::from_pgn(marker);
            }
        }

        let start_fen = tags
            .get("FEN")
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        GameRecord {
            ordinal: raw.ordinal,
            moves: normalize_movetext(&raw.movetext),
            tags,
            result,
            start_fen,
            end_offset: raw.end_offset,
        }
    }
}

/// Parse every `[Key "Value"]` pair on a tag line.
pub fn parse_tag_line(line: &str) -> Vec<(String, String)> {
    TAG_RE
        .captures_iter(line)
        .map(|cap| (cap[1].to_string(), unescape(&cap[2])))
        .collect()
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse an in-memory PGN text holding any number of games.
pub fn parse_pgn(input: &str) -> Result<Vec<GameRecord>, PgnError> {
    PgnReader::new(input.as_bytes())
        .map(|raw| raw.map(GameRecord::from))
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum PgnError {
    #[error("IO error reading PGN: {0}")]
    Io(#[from] std::io::Error),
}
