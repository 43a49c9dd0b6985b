//! Defragmentation steps for compacting sub-allocated linear resources.
//!
//! A defrag pass copies every live block of an old resource into a fresh one,
//! packed contiguously. Each [`DefragStep`] describes one block: the byte range
//! it occupied in the source and the offset it lands at in the destination.
//!
//! Clients holding an offset into the old resource translate it with
//! [`resolve_offset`] once they observe the reposition event.

use std::ops::Range;

/// One block moved by a defrag pass, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DefragStep {
    /// Start of the block in the source resource.
    pub source_start: u32,
    /// End of the block in the source resource, exclusive.
    pub source_end: u32,
    /// Start of the block in the destination resource.
    pub destination: u32,
}

impl DefragStep {
    /// Number of bytes moved by this step.
    pub fn len(&self) -> u32 {
        self.source_end.saturating_sub(self.source_start)
    }

    /// True for a step that moves nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `offset` lies in the source range of this step.
    pub fn contains(&self, offset: u32) -> bool {
        (self.source_start..self.source_end).contains(&offset)
    }
}

/// Compute the steps that compact `allocated` blocks into a fresh resource.
///
/// Blocks are placed smallest first, and the returned steps are ordered by
/// source offset. Empty blocks are ignored.
pub fn calculate_defrag_steps(allocated: &[Range<u32>]) -> Vec<DefragStep> {
    let mut blocks: Vec<Range<u32>> = allocated
        .iter()
        .filter(|block| block.start < block.end)
        .cloned()
        .collect();
    blocks.sort_by_key(|block| (block.end - block.start, block.start));

    let mut position = 0u32;
    let mut steps: Vec<DefragStep> = blocks
        .into_iter()
        .map(|block| {
            let step = DefragStep {
                source_start: block.start,
                source_end: block.end,
                destination: position,
            };
            position += block.end - block.start;
            step
        })
        .collect();

    steps.sort_by_key(|step| step.source_start);
    steps
}

/// Translate an offset into the pre-defrag resource to its new location.
///
/// Returns `None` when no step moved the byte at `offset`, meaning the client
/// referenced memory that was not live during the defrag.
pub fn resolve_offset(offset: u32, size: u32, steps: &[DefragStep]) -> Option<u32> {
    let step = steps.iter().find(|step| step.contains(offset))?;
    // `contains` guarantees offset < source_end
    if size > step.source_end - offset {
        log::warn!(
            "Block at {offset}+{size} straddles defrag step {}..{}",
            step.source_start,
            step.source_end
        );
    }
    Some(offset - step.source_start + step.destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compaction_is_smallest_first() {
        let steps = calculate_defrag_steps(&[0..64, 128..144, 200..232]);

        assert_eq!(steps.len(), 3);
        // Sorted by source for the copy pass
        assert_eq!(steps[0].source_start, 0);
        assert_eq!(steps[1].source_start, 128);
        assert_eq!(steps[2].source_start, 200);

        // 16-byte block first, then 32, then 64
        assert_eq!(steps[1].destination, 0);
        assert_eq!(steps[2].destination, 16);
        assert_eq!(steps[0].destination, 48);

        let total: u32 = steps.iter().map(DefragStep::len).sum();
        assert_eq!(total, 112);
    }

    #[test]
    fn test_empty_blocks_ignored() {
        let steps = calculate_defrag_steps(&[10..10, 20..30]);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].destination, 0);
    }

    #[test]
    fn test_resolve_offset() {
        let steps = calculate_defrag_steps(&[0..64, 128..144]);
        assert_eq!(resolve_offset(128, 16, &steps), Some(0));
        assert_eq!(resolve_offset(8, 8, &steps), Some(24));
        assert_eq!(resolve_offset(100, 4, &steps), None);
    }

    #[test]
    fn test_resolve_offset_oversized_block() {
        let steps = calculate_defrag_steps(&[0..64, 128..144]);
        assert_eq!(resolve_offset(130, u32::MAX, &steps), Some(2));
        assert_eq!(resolve_offset(u32::MAX - 1, 8, &steps), None);
    }
}
