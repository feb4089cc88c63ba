use crate::error::IngestError;

pub const DEFAULT_CHUNK_SIZE: usize = 1_500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Sizes are counted in characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A slice of the source text. `start..end` are character offsets into the
/// text that was chunked; consecutive chunks satisfy `next.start <= prev.end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub position: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Cleans extracted page text while keeping paragraph structure: whitespace
/// runs inside a line collapse to one space, blank-line runs collapse to a
/// single paragraph break.
pub fn normalize_page_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut normalized = String::with_capacity(unified.len());
    let mut blank_run = 0usize;

    for line in unified.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            continue;
        }

        if !normalized.is_empty() {
            normalized.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        normalized.push_str(&collapsed);
        blank_run = 0;
    }

    normalized
}

/// Splits `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Each cut prefers, in order: a paragraph break, a line break, the end of a
/// sentence, any whitespace. Only when none exists past the overlap window is
/// the text cut mid-word. The next chunk starts at most `overlap` characters
/// before the previous cut, moved forward to the next word start when one is
/// available. Whitespace-only input yields no chunks.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    if chars.iter().all(|ch| ch.is_whitespace()) {
        return Vec::new();
    }

    let size = config.chunk_size.max(1);
    let overlap = config.overlap.min(size - 1);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + size).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            find_breakpoint(&chars, start + overlap + 1, hard_end).unwrap_or(hard_end)
        };

        chunks.push(TextChunk {
            position: chunks.len(),
            text: chars[start..end].iter().collect(),
            start,
            end,
        });

        if end == chars.len() {
            break;
        }

        let earliest = end.saturating_sub(overlap).max(start + 1);
        start = snap_to_word_start(&chars, earliest, end);
    }

    chunks
}

pub fn chunk_texts(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_text(text, config)
        .into_iter()
        .map(|chunk| chunk.text)
        .collect()
}

/// Latest cut position in `min_end..=hard_end` for the most preferred kind of
/// boundary. A cut at `p` keeps `chars[..p]` in the current chunk.
fn find_breakpoint(chars: &[char], min_end: usize, hard_end: usize) -> Option<usize> {
    type Boundary = fn(&[char], usize) -> bool;

    let boundaries: [Boundary; 4] = [
        |chars, p| p >= 2 && chars[p - 2] == '\n' && chars[p - 1] == '\n',
        |chars, p| chars[p - 1] == '\n',
        |chars, p| p >= 2 && chars[p - 1] == ' ' && matches!(chars[p - 2], '.' | '!' | '?'),
        |chars, p| chars[p - 1].is_whitespace(),
    ];

    let min_end = min_end.max(1);
    if min_end > hard_end {
        return None;
    }

    boundaries
        .iter()
        .find_map(|is_boundary| (min_end..=hard_end).rev().find(|&p| is_boundary(chars, p)))
}

fn snap_to_word_start(chars: &[char], from: usize, end: usize) -> usize {
    if from == 0 || chars[from - 1].is_whitespace() {
        return from;
    }

    (from..end)
        .find(|&index| chars[index].is_whitespace())
        .map(|index| index + 1)
        .unwrap_or(from)
}
