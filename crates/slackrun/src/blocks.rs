use serde_json::Value;

/// Slack rejects messages carrying more blocks than this.
pub const MAX_BLOCKS_PER_MESSAGE: usize = 50;

/// A single Block Kit element. Dispatch code never looks inside one.
pub type Block = Value;

/// Split `blocks` into consecutive runs of at most `size` elements.
///
/// An empty input produces no chunks at all rather than one empty chunk.
pub fn chunk_blocks(blocks: &[Block], size: usize) -> Vec<Vec<Block>> {
    blocks
        .chunks(size.max(1))
        .map(<[Block]>::to_vec)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn numbered(count: usize) -> Vec<Block> {
        (0..count).map(|i| json!({ "n": i })).collect()
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_blocks(&[], MAX_BLOCKS_PER_MESSAGE).is_empty());
    }

    #[test]
    fn chunk_count_and_order_are_preserved() {
        for (len, size) in [(1, 50), (50, 50), (51, 50), (52, 50), (101, 50), (7, 3)] {
            let blocks = numbered(len);
            let chunks = chunk_blocks(&blocks, size);

            assert_eq!(chunks.len(), len.div_ceil(size), "len={len} size={size}");
            let (last, full) = chunks.split_last().unwrap();
            assert!(full.iter().all(|c| c.len() == size));
            assert!(!last.is_empty() && last.len() <= size);
            assert_eq!(chunks.concat(), blocks);
        }
    }

    #[test]
    fn zero_size_degrades_to_single_block_chunks() {
        let chunks = chunk_blocks(&numbered(3), 0);
        assert_eq!(chunks.len(), 3);
    }
}
