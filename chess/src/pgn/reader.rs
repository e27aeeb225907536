//! Streaming multi-game PGN reader.
//!
//! Games are produced one at a time from any [`BufRead`]; the whole input is
//! never held in memory. The reader counts the bytes it consumes so callers
//! can remember where a game ended and later resume from there.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use super::parser::{parse_tag_line, PgnError};

/// One game as it appears in the stream, before movetext normalization.
#[derive(Debug, Clone, Default)]
pub struct RawGame {
    /// 1-based position of the game in the stream, counting skipped games.
    pub ordinal: u64,
    pub tags: Vec<(String, String)>,
    pub movetext: String,
    /// Byte offset at which the next game starts (or end of stream).
    pub end_offset: u64,
}

pub struct PgnReader<R> {
    inner: R,
    offset: u64,
    games_read: u64,
    line: Vec<u8>,
    /// Tags read from the line that closed the previous game.
    carried_tags: Vec<(String, String)>,
    carried_game: bool,
    total_bytes: Option<u64>,
}

impl<R: BufRead> PgnReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_offset(inner, 0)
    }

    /// Wrap a stream that has already been positioned at `offset`.
    pub fn with_offset(inner: R, offset: u64) -> Self {
        Self {
            inner,
            offset,
            games_read: 0,
            line: Vec::with_capacity(256),
            carried_tags: Vec::new(),
            carried_game: false,
            total_bytes: None,
        }
    }

    /// Size of the underlying input when known, for progress reporting.
    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    /// Percentage of the input consumed, when its size is known.
    pub fn progress_percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some(self.offset as f64 * 100.0 / total as f64),
            None => None,
        }
    }

    /// Bytes consumed from the start of the stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Games produced or skipped so far.
    pub fn games_read(&self) -> u64 {
        self.games_read
    }

    /// Read and discard up to `n` games. Returns how many were skipped.
    pub fn skip_games(&mut self, n: u64) -> Result<u64, PgnError> {
        let mut skipped = 0;
        while skipped < n {
            if self.next_game()?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Read the next game, or `None` at end of stream.
    ///
    /// A game is complete when a tag line follows its movetext, or when the
    /// stream ends.
    pub fn next_game(&mut self) -> Result<Option<RawGame>, PgnError> {
        let mut tags = std::mem::take(&mut self.carried_tags);
        let mut has_content = std::mem::take(&mut self.carried_game);
        let mut movetext = String::new();
        let mut in_comment = false;

        loop {
            let line_start = self.offset;
            self.line.clear();
            let n = self.inner.read_until(b'\n', &mut self.line)?;
            if n == 0 {
                if !has_content {
                    return Ok(None);
                }
                let end = self.offset;
                return Ok(Some(self.finish(tags, movetext, end)));
            }
            self.offset += n as u64;

            match classify_line(&self.line, &mut in_comment, &mut movetext) {
                Line::Skip => {}
                Line::Tags(parsed) if !movetext.is_empty() => {
                    self.carried_tags = parsed;
                    self.carried_game = true;
                    return Ok(Some(self.finish(tags, movetext, line_start)));
                }
                Line::Tags(parsed) => {
                    tags.extend(parsed);
                    has_content = true;
                }
                Line::Movetext => has_content = true,
            }
        }
    }

    fn finish(&mut self, tags: Vec<(String, String)>, movetext: String, end_offset: u64) -> RawGame {
        self.games_read += 1;
        RawGame {
            ordinal: self.games_read,
            tags,
            movetext,
            end_offset,
        }
    }
}

enum Line {
    Skip,
    Tags(Vec<(String, String)>),
    Movetext,
}

/// Classify one raw line, appending it to `movetext` when it is movetext.
fn classify_line(raw: &[u8], in_comment: &mut bool, movetext: &mut String) -> Line {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() || (!*in_comment && trimmed.starts_with('%')) {
        return Line::Skip;
    }

    if !*in_comment && trimmed.starts_with('[') {
        let parsed = parse_tag_line(trimmed);
        if parsed.is_empty() {
            tracing::debug!("ignoring malformed tag line: {}", trimmed);
        }
        return Line::Tags(parsed);
    }

    for c in trimmed.chars() {
        match c {
            '{' => *in_comment = true,
            '}' => *in_comment = false,
            // Rest-of-line comment: its braces do not open anything.
            ';' if !*in_comment => break,
            _ => {}
        }
    }
    movetext.push_str(trimmed);
    movetext.push('\n');
    Line::Movetext
}

impl<R: BufRead + Seek> PgnReader<R> {
    /// Seek `inner` to `offset` and skip `skip_games` games from there.
    ///
    /// The pair is the checkpoint an interrupted import recorded.
    pub fn resume(mut inner: R, offset: u64, skip_games: u64) -> Result<Self, PgnError> {
        let total = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(offset))?;
        let mut reader = Self::with_offset(inner, offset);
        reader.total_bytes = Some(total);
        let skipped = reader.skip_games(skip_games)?;
        if skipped < skip_games {
            tracing::warn!(
                offset,
                requested = skip_games,
                skipped,
                "stream ended while skipping already processed games"
            );
        }
        Ok(reader)
    }
}

impl PgnReader<BufReader<File>> {
    /// Open a PGN file and resume at `offset`, skipping `skip_games` games.
    pub fn open(path: &Path, offset: u64, skip_games: u64) -> Result<Self, PgnError> {
        let file = File::open(path)?;
        tracing::debug!(path = %path.display(), offset, skip_games, "opening PGN file");
        Self::resume(BufReader::new(file), offset, skip_games)
    }
}

impl<R: BufRead> Iterator for PgnReader<R> {
    type Item = Result<RawGame, PgnError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_game().transpose()
    }
}
