//! Pitch-aware copies of texel data between CPU buffers.

use crate::types::{Box2D, TextureDesc, TextureFormat, TexturePitches};

/// Texel extent of a region copied by [`copy_mip_level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyExtent {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth slices.
    pub depth: u32,
}

impl CopyExtent {
    /// Extent of mip `level` of `desc`, or of `box2d` scaled to that mip.
    ///
    /// A box is clamped to the mip's extents.
    pub fn for_mip(desc: &TextureDesc, level: u32, box2d: Box2D) -> Self {
        let (width, height, depth) = desc.mip_size(level);
        if box2d.is_empty() {
            return Self {
                width,
                height,
                depth,
            };
        }
        let scaled = box2d.at_mip(level);
        Self {
            width: scaled.right.min(width).saturating_sub(scaled.left),
            height: scaled.bottom.min(height).saturating_sub(scaled.top),
            depth,
        }
    }
}

/// Copy a block of texels from `src` into `dst`, honoring both pitches.
///
/// `dst_origin` is the top-left texel of the region in `dst`. Rows that fall
/// outside either buffer are clipped. Returns the number of bytes copied.
pub fn copy_mip_level(
    dst: &mut [u8],
    dst_pitches: TexturePitches,
    dst_origin: [u32; 2],
    src: &[u8],
    src_pitches: TexturePitches,
    extent: CopyExtent,
    format: TextureFormat,
) -> usize {
    let block = format.block_dimension();
    let row_bytes = (format.blocks_wide(extent.width) * format.block_size()) as usize;
    let rows = format.blocks_high(extent.height) as usize;
    let dst_x = (dst_origin[0] / block * format.block_size()) as usize;
    let dst_y = (dst_origin[1] / block) as usize;

    // Tightly matching layouts collapse into one copy
    if dst_pitches == src_pitches
        && dst_origin == [0, 0]
        && row_bytes == src_pitches.row_pitch as usize
        && rows * row_bytes == src_pitches.slice_pitch as usize
    {
        let len = (src_pitches.slice_pitch as usize * extent.depth.max(1) as usize)
            .min(src.len())
            .min(dst.len());
        dst[..len].copy_from_slice(&src[..len]);
        return len;
    }

    let mut copied = 0;
    for slice in 0..extent.depth.max(1) as usize {
        for row in 0..rows {
            let src_offset = slice * src_pitches.slice_pitch as usize + row * src_pitches.row_pitch as usize;
            let dst_offset = slice * dst_pitches.slice_pitch as usize
                + (dst_y + row) * dst_pitches.row_pitch as usize
                + dst_x;
            if src_offset >= src.len() || dst_offset >= dst.len() {
                continue;
            }
            let len = row_bytes
                .min(src.len() - src_offset)
                .min(dst.len() - dst_offset)
                .min((dst_pitches.row_pitch as usize).saturating_sub(dst_x));
            dst[dst_offset..dst_offset + len].copy_from_slice(&src[src_offset..src_offset + len]);
            copied += len;
        }
    }
    copied
}
