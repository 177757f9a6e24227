//! Split long replies into numbered fragments that fit one mesh payload.
//!
//! Input is a list of logical blocks (an alert title, its source, its body).
//! Consecutive blocks share a fragment when they fit together; a block that
//! fits in a fragment on its own is never split. Oversized blocks are broken
//! at the last space before the limit, and a single word longer than the
//! limit is cut on a UTF-8 boundary. Every fragment is rendered with a
//! ` (k/n)` marker and the rendered text, marker included, stays within the
//! configured byte limit.

use std::mem;

/// One numbered fragment of a multi-part reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyChunk {
    pub index: usize,
    pub total: usize,
    pub body: String,
}

impl ReplyChunk {
    pub fn marker(&self) -> String {
        format!(" ({}/{})", self.index, self.total)
    }

    pub fn render(&self) -> String {
        format!("{}{}", self.body, self.marker())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertChunker {
    max_bytes: usize,
}

impl AlertChunker {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Chunk `blocks` into numbered fragments. Whitespace inside a block is
    /// collapsed to single spaces; empty blocks are skipped.
    pub fn chunk<S: AsRef<str>>(&self, blocks: &[S]) -> Vec<ReplyChunk> {
        let blocks: Vec<String> = blocks
            .iter()
            .map(|b| collapse_whitespace(b.as_ref()))
            .filter(|b| !b.is_empty())
            .collect();
        if blocks.is_empty() {
            return Vec::new();
        }

        // The marker width depends on how many fragments there are, so repack
        // with a wider reservation until the digit count stops growing.
        let mut digits = 1;
        loop {
            let budget = self.max_bytes.saturating_sub(marker_width(digits)).max(1);
            let bodies = pack(&blocks, budget);
            let needed = digit_count(bodies.len());
            if needed <= digits {
                let total = bodies.len();
                return bodies
                    .into_iter()
                    .enumerate()
                    .map(|(i, body)| ReplyChunk {
                        index: i + 1,
                        total,
                        body,
                    })
                    .collect();
            }
            digits = needed;
        }
    }

    /// Render a single free-form message for sending. Text that already fits
    /// goes out untouched; anything longer is chunked with markers.
    pub fn split_message(&self, text: &str) -> Vec<String> {
        if text.len() <= self.max_bytes {
            return vec![text.to_string()];
        }
        self.chunk(&[text]).iter().map(ReplyChunk::render).collect()
    }
}

fn marker_width(digits: usize) -> usize {
    // " (" + index + "/" + total + ")"
    4 + 2 * digits
}

fn digit_count(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn pack(blocks: &[String], budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for block in blocks {
        let joined = if current.is_empty() {
            block.len()
        } else {
            current.len() + 1 + block.len()
        };
        if joined <= budget {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(block);
            continue;
        }
        if !current.is_empty() {
            chunks.push(mem::take(&mut current));
        }
        if block.len() <= budget {
            current.push_str(block);
        } else {
            chunks.extend(split_words(block, budget));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_words(text: &str, budget: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut line = String::new();
    for word in text.split(' ') {
        if word.len() > budget {
            if !line.is_empty() {
                out.push(mem::take(&mut line));
            }
            let mut rest = word;
            while rest.len() > budget {
                let cut = char_boundary_at_or_below(rest, budget);
                out.push(rest[..cut].to_string());
                rest = &rest[cut..];
            }
            line.push_str(rest);
            continue;
        }
        let needed = if line.is_empty() {
            word.len()
        } else {
            line.len() + 1 + word.len()
        };
        if needed > budget {
            out.push(mem::take(&mut line));
        } else if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        out.push(line);
    }
    out
}

/// Largest char boundary <= `max`, but always at least one whole char.
fn char_boundary_at_or_below(text: &str, max: usize) -> usize {
    let mut end = max.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    if end == 0 {
        end = text.chars().next().map(char::len_utf8).unwrap_or(text.len());
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    const BODY: &str = "The National Weather Service has issued a flood warning for low lying \
        areas along the river until Tuesday evening. Residents near the levee should move \
        valuables to higher ground and avoid driving through flooded roadways. Additional \
        rainfall of two to three inches is expected overnight with locally higher amounts.";

    #[test]
    fn short_blocks_share_one_chunk() {
        let chunker = AlertChunker::new(200);
        let chunks = chunker.chunk(&["ALERT 1/1: Flood Warning", "From: NWS Portland"]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].body, "ALERT 1/1: Flood Warning\nFrom: NWS Portland");
        assert_eq!(chunks[0].render(), "ALERT 1/1: Flood Warning\nFrom: NWS Portland (1/1)");
    }

    #[test]
    fn every_rendered_chunk_fits_and_content_survives() {
        for max in [40usize, 64, 100, 140, 200] {
            let chunker = AlertChunker::new(max);
            let blocks = ["ALERT 1/2: Flood Warning", "From: NWS", BODY];
            let chunks = chunker.chunk(&blocks);
            assert!(!chunks.is_empty());
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, i + 1);
                assert_eq!(chunk.total, chunks.len());
                assert!(
                    chunk.render().len() <= max,
                    "chunk {} is {} bytes with max {}",
                    chunk.index,
                    chunk.render().len(),
                    max
                );
            }
            let joined: String = chunks.iter().map(|c| c.body.as_str()).collect();
            assert_eq!(squash(&joined), squash(&blocks.concat()));
        }
    }

    #[test]
    fn block_that_fits_is_not_split() {
        let first = "Severe thunderstorm watch until 9 PM.";
        let second = "Seek shelter indoors if you hear thunder.";
        let chunker = AlertChunker::new(first.len().max(second.len()) + 8);
        let chunks = chunker.chunk(&[first, second]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].body, first);
        assert_eq!(chunks[1].body, second);
    }

    #[test]
    fn oversized_block_breaks_on_spaces() {
        let chunker = AlertChunker::new(60);
        let chunks = chunker.chunk(&[BODY]);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.body.starts_with(' '));
            assert!(!chunk.body.ends_with(' '));
            // every word boundary is preserved: no word appears cut in half
            for word in chunk.body.split(' ') {
                assert!(BODY.contains(word));
            }
        }
    }

    #[test]
    fn many_chunks_reserve_wider_markers() {
        let text = "word ".repeat(200);
        let chunker = AlertChunker::new(40);
        let chunks = chunker.chunk(&[text.as_str()]);
        assert!(chunks.len() >= 10);
        for chunk in &chunks {
            assert!(chunk.render().len() <= 40, "{:?}", chunk.render());
        }
    }

    #[test]
    fn unbroken_word_is_cut_on_char_boundary() {
        let word = "é".repeat(50);
        let chunker = AlertChunker::new(32);
        let chunks = chunker.chunk(&[word.as_str()]);
        assert!(chunks.len() > 1);
        let joined: String = chunks.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(joined, word);
        for chunk in &chunks {
            assert!(chunk.render().len() <= 32);
        }
    }

    #[test]
    fn chunking_is_deterministic_and_skips_empty_blocks() {
        let chunker = AlertChunker::new(80);
        assert!(chunker.chunk::<&str>(&[]).is_empty());
        assert!(chunker.chunk(&["", "   "]).is_empty());
        assert_eq!(chunker.chunk(&[BODY]), chunker.chunk(&[BODY]));
    }

    #[test]
    fn split_message_leaves_short_text_alone() {
        let chunker = AlertChunker::new(50);
        assert_eq!(chunker.split_message("Net tonight at 7"), vec!["Net tonight at 7"]);
        let parts = chunker.split_message(BODY);
        assert!(parts.len() > 1);
        assert!(parts[0].ends_with(&format!(" (1/{})", parts.len())));
    }
}
