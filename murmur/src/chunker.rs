//! Line-break aware text chunking for length-limited chat messages.
//!
//! Text is split at Unicode line-break opportunities (UAX #14): a *unit* is the
//! text between two consecutive opportunities, e.g. a word plus its trailing
//! whitespace. Chunks are packed greedily from whole units; a unit longer than
//! the limit is hard-cut at exactly `max_length`.
//!
//! Lengths are counted in `char`s (Unicode scalar values), which is how chat
//! platforms count their message limits.
//!
//! - [`chunks`]: one-shot, lazy iterator over a complete text.
//! - [`IncrementalChunker`]: streaming variant fed with arbitrary fragments.

use thiserror::Error;
use unicode_linebreak::linebreaks;

/// Errors from constructing a chunker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    /// Precondition violation (e.g. a zero chunk length).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn check_max_length(max_length: usize) -> Result<(), ChunkError> {
    if max_length == 0 {
        return Err(ChunkError::InvalidArgument(
            "max_length must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Returns a lazy iterator over `text` split into chunks of at most `max_length` chars.
///
/// Concatenating the yielded pieces reproduces `text` exactly. The iterator is
/// `Clone`, so the sequence can be restarted from any point.
pub fn chunks(text: &str, max_length: usize) -> Result<Chunks<'_>, ChunkError> {
    check_max_length(max_length)?;
    Ok(Chunks::over(text, max_length))
}

/// Iterator returned by [`chunks`].
///
/// `text[start..end]` is the accumulated, not yet emitted chunk and `len` is its
/// length in chars. It may temporarily exceed `max_length` when a single unit is
/// oversized; the next call carves it down.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    max_length: usize,
    unit_ends: std::vec::IntoIter<usize>,
    start: usize,
    end: usize,
    len: usize,
}

impl<'a> Chunks<'a> {
    /// Builds the iterator for an already validated `max_length`.
    fn over(text: &'a str, max_length: usize) -> Self {
        let unit_ends: Vec<usize> = linebreaks(text)
            .map(|(idx, _)| idx)
            .filter(|&idx| idx > 0)
            .collect();
        Self {
            text,
            max_length,
            unit_ends: unit_ends.into_iter(),
            start: 0,
            end: 0,
            len: 0,
        }
    }

    fn take_pending(&mut self) -> &'a str {
        let piece = &self.text[self.start..self.end];
        self.start = self.end;
        self.len = 0;
        piece
    }

    fn carve_prefix(&mut self) -> &'a str {
        let pending = &self.text[self.start..self.end];
        let cut = pending
            .char_indices()
            .nth(self.max_length)
            .map(|(i, _)| self.start + i)
            .unwrap_or(self.end);
        let piece = &self.text[self.start..cut];
        self.start = cut;
        self.len -= self.max_length;
        piece
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            if self.len > self.max_length {
                return Some(self.carve_prefix());
            }
            match self.unit_ends.next() {
                Some(unit_end) => {
                    let unit_len = self.text[self.end..unit_end].chars().count();
                    if unit_len == 0 {
                        continue;
                    }
                    if self.len > 0 && self.len + unit_len > self.max_length {
                        let piece = self.take_pending();
                        self.end = unit_end;
                        self.len = unit_len;
                        return Some(piece);
                    }
                    self.end = unit_end;
                    self.len += unit_len;
                }
                None => {
                    if self.start < self.end {
                        return Some(self.take_pending());
                    }
                    return None;
                }
            }
        }
    }
}

/// Streaming chunker: feed fragments with [`write`](IncrementalChunker::write), drain the
/// tail with [`flush`](IncrementalChunker::flush).
///
/// Each `write` re-chunks the buffered text plus the new text and holds back the last
/// chunk, because more text may still merge into its final unit or extend it. Only
/// chunks followed by at least one more chunk are committed, so the result does not
/// depend on how the text was split across writes.
///
/// The buffer always starts at a line-break opportunity of the whole text: after a
/// hard cut the unit being cut stays buffered from its start, and `committed` marks
/// how much of it has already been emitted. Break rules look at preceding
/// characters, so re-chunking from the middle of a unit could find breaks the full
/// text does not have.
///
/// **Interaction**: One per completion cycle; the coordinator writes every streamed
/// fragment and sends each returned chunk as a message.
#[derive(Debug)]
pub struct IncrementalChunker {
    max_length: usize,
    pending: String,
    /// Byte offset into `pending` up to which chunks were already returned.
    committed: usize,
}

impl IncrementalChunker {
    pub fn new(max_length: usize) -> Result<Self, ChunkError> {
        check_max_length(max_length)?;
        Ok(Self {
            max_length,
            pending: String::new(),
            committed: 0,
        })
    }

    /// Appends `text` and returns the chunks that are now committed.
    pub fn write(&mut self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.pending.push_str(text);

        let pieces: Vec<&str> = Chunks::over(&self.pending, self.max_length).collect();
        let Some((_, committable)) = pieces.split_last() else {
            return Vec::new();
        };
        let boundaries: Vec<usize> = linebreaks(&self.pending).map(|(idx, _)| idx).collect();

        let mut out = Vec::new();
        // Last committed piece end that is also a unit boundary; re-chunking from
        // there reproduces everything after it.
        let mut restart = 0;
        let mut offset = 0;
        for piece in committable {
            let end = offset + piece.len();
            if end > self.committed {
                out.push(self.pending[offset.max(self.committed)..end].to_string());
            }
            if boundaries.binary_search(&end).is_ok() {
                restart = end;
            }
            offset = end;
        }

        self.committed = offset.max(self.committed) - restart;
        self.pending.drain(..restart);
        out
    }

    /// Returns the held-back text and resets the chunker to a fresh session.
    pub fn flush(&mut self) -> String {
        let rest = self.pending.get(self.committed..).unwrap_or_default().to_string();
        self.pending.clear();
        self.committed = 0;
        rest
    }
}
