//! Text chunking for embedding and FTS indexing.

use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

use crate::memory::Chunk;

/// Split `content` into character-bounded chunks for one paper.
///
/// `text-splitter` picks semantic boundaries (sentences, then words) within
/// the size cap, so chunks never split mid-word. Positions are byte offsets
/// into the original text.
pub fn chunk_text(paper_id: &str, content: &str, chunk_size: usize) -> Vec<Chunk> {
    if content.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let splitter = TextSplitter::new(ChunkConfig::new(chunk_size));
    let chunks: Vec<Chunk> = splitter
        .chunk_indices(content)
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(position, text)| Chunk {
            id: uuid::Uuid::now_v7().to_string(),
            paper_id: paper_id.to_string(),
            text: text.to_string(),
            position,
        })
        .collect();

    debug!(
        paper_id,
        input_len = content.len(),
        chunk_count = chunks.len(),
        chunk_size,
        "text chunked"
    );

    chunks
}
