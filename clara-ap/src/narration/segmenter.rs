//! Text segmentation for narration
//!
//! A segment is a run of ordinary characters followed by the run of
//! terminators (`.`, `!`, `?`, newline) after it. Segments are trimmed and
//! those shorter than the minimum are dropped, since synthesizing a stray
//! "a." or "1." only produces noise.

use serde::Serialize;
use thiserror::Error;

/// Characters that end a segment; they stay attached to it
pub const TERMINATORS: [char; 4] = ['.', '!', '?', '\n'];

/// Default minimum segment length in characters
pub const DEFAULT_MIN_SEGMENT_CHARS: usize = 4;

fn is_terminator(c: char) -> bool {
    TERMINATORS.contains(&c)
}

/// One unit of text submitted to synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    /// Position in the narration, starting at 0
    pub index: usize,
    pub text: String,
}

impl TextSegment {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self { index, text: text.into() }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("text is too short to narrate ({chars} characters, at least {min} needed)")]
    TooShort { chars: usize, min: usize },
}

/// Splits text into narratable segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    min_chars: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SEGMENT_CHARS)
    }
}

impl Segmenter {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars: min_chars.max(1) }
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    /// Sentence-like segments of `text`
    ///
    /// When no individual sentence is long enough but the whole text is,
    /// the whole trimmed text becomes the only segment. A successful result
    /// therefore always yields at least one segment.
    pub fn segments<'a>(&self, text: &'a str) -> Result<Segments<'a>, SegmentError> {
        self.check_length(text)?;

        let sentences = Segments {
            source: text,
            cursor: 0,
            next_index: 0,
            min_chars: self.min_chars,
            whole: false,
        };

        if sentences.clone().next().is_some() {
            Ok(sentences)
        } else {
            Ok(Segments { whole: true, ..sentences })
        }
    }

    /// The whole text as a single segment
    pub fn utterance<'a>(&self, text: &'a str) -> Result<Segments<'a>, SegmentError> {
        self.check_length(text)?;
        Ok(Segments {
            source: text,
            cursor: 0,
            next_index: 0,
            min_chars: self.min_chars,
            whole: true,
        })
    }

    fn check_length(&self, text: &str) -> Result<(), SegmentError> {
        let chars = text.trim().chars().count();
        if chars < self.min_chars {
            return Err(SegmentError::TooShort { chars, min: self.min_chars });
        }
        Ok(())
    }
}

/// Lazy, finite segment sequence
///
/// Cloning before iterating gives an independent restart point; `restart()`
/// rewinds in place.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    source: &'a str,
    cursor: usize,
    next_index: usize,
    min_chars: usize,
    /// Yield the whole trimmed text once instead of splitting
    whole: bool,
}

impl<'a> Segments<'a> {
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.next_index = 0;
    }

    /// Next raw piece: leading terminators skipped, body, trailing terminators
    fn next_piece(&mut self) -> Option<&'a str> {
        let rest = &self.source[self.cursor..];
        let start = rest.find(|c: char| !is_terminator(c))?;
        let body = &rest[start..];
        let body_len = body.find(is_terminator).unwrap_or(body.len());
        let tail = &body[body_len..];
        let tail_len = tail.find(|c: char| !is_terminator(c)).unwrap_or(tail.len());

        let end = start + body_len + tail_len;
        self.cursor += end;
        Some(&rest[start..end])
    }

    fn emit(&mut self, text: &str) -> TextSegment {
        let segment = TextSegment::new(self.next_index, text);
        self.next_index += 1;
        segment
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = TextSegment;

    fn next(&mut self) -> Option<TextSegment> {
        if self.whole {
            if self.cursor > 0 {
                return None;
            }
            self.cursor = self.source.len().max(1);
            let text = self.source.trim();
            return Some(self.emit(text));
        }

        while let Some(piece) = self.next_piece() {
            let trimmed = piece.trim();
            if trimmed.chars().count() >= self.min_chars {
                return Some(self.emit(trimmed));
            }
        }
        None
    }
}
