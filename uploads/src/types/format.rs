//! Texture formats and the pitch math that depends on them.

/// Texture format enumeration.
///
/// Block-compressed formats store 4x4 texel blocks; every size calculation in
/// this crate works in blocks, so uncompressed formats are treated as 1x1
/// blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    // 8-bit formats
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 8-bit red channel, unsigned integer.
    R8Uint,

    // 16-bit formats
    /// 16-bit red channel, float.
    R16Float,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,

    // 32-bit formats
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,

    // 64-bit formats
    /// 16-bit RGBA channels, float.
    Rgba16Float,

    // 128-bit formats
    /// 32-bit RGBA channels, float.
    Rgba32Float,

    // Block-compressed formats
    /// BC1 (DXT1) RGBA, 8 bytes per 4x4 block.
    Bc1RgbaUnorm,
    /// BC2 (DXT3) RGBA, 16 bytes per 4x4 block.
    Bc2RgbaUnorm,
    /// BC3 (DXT5) RGBA, 16 bytes per 4x4 block.
    Bc3RgbaUnorm,
    /// BC4 single channel, 8 bytes per 4x4 block.
    Bc4RUnorm,
    /// BC5 two channel, 16 bytes per 4x4 block.
    Bc5RgUnorm,
    /// BC6H HDR RGB, 16 bytes per 4x4 block.
    Bc6hRgbUfloat,
    /// BC7 RGBA, 16 bytes per 4x4 block.
    Bc7RgbaUnorm,
}

impl TextureFormat {
    /// Returns true for block-compressed formats.
    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            Self::Bc1RgbaUnorm
                | Self::Bc2RgbaUnorm
                | Self::Bc3RgbaUnorm
                | Self::Bc4RUnorm
                | Self::Bc5RgUnorm
                | Self::Bc6hRgbUfloat
                | Self::Bc7RgbaUnorm
        )
    }

    /// Returns the size in bytes per pixel/block.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm | Self::R8Uint => 1,
            Self::R16Float | Self::Rg8Unorm => 2,
            Self::R32Float
            | Self::R32Uint
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm => 4,
            Self::Rgba16Float | Self::Bc1RgbaUnorm | Self::Bc4RUnorm => 8,
            Self::Rgba32Float
            | Self::Bc2RgbaUnorm
            | Self::Bc3RgbaUnorm
            | Self::Bc5RgUnorm
            | Self::Bc6hRgbUfloat
            | Self::Bc7RgbaUnorm => 16,
        }
    }

    /// Width and height of one block in texels.
    pub fn block_dimension(&self) -> u32 {
        if self.is_compressed() { 4 } else { 1 }
    }

    /// Number of block columns covering `width` texels.
    pub fn blocks_wide(&self, width: u32) -> u32 {
        width.div_ceil(self.block_dimension())
    }

    /// Number of block rows covering `height` texels.
    pub fn blocks_high(&self, height: u32) -> u32 {
        height.div_ceil(self.block_dimension())
    }

    /// Tightly packed pitches for a surface of the given size.
    pub fn pitches(&self, width: u32, height: u32, depth: u32) -> TexturePitches {
        let row_pitch = self.blocks_wide(width) * self.block_size();
        let slice_pitch = row_pitch * self.blocks_high(height);
        TexturePitches {
            row_pitch,
            slice_pitch,
            array_pitch: slice_pitch * depth.max(1),
        }
    }
}

/// Memory layout of one sub-resource in a CPU-visible buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TexturePitches {
    /// Bytes between the starts of two block rows.
    pub row_pitch: u32,
    /// Bytes between the starts of two depth slices.
    pub slice_pitch: u32,
    /// Bytes between the starts of two array layers.
    pub array_pitch: u32,
}

impl TexturePitches {
    /// Pitches for a linear buffer, where only the total size matters.
    pub fn linear(size: u32) -> Self {
        Self {
            row_pitch: size,
            slice_pitch: size,
            array_pitch: size,
        }
    }
}

/// Extent of `extent` at mip `level`, never below one texel.
pub fn mip_extent(extent: u32, level: u32) -> u32 {
    extent.checked_shr(level).unwrap_or(0).max(1)
}

/// Total byte size of a mip chain for one array layer.
pub fn texture_data_size(
    width: u32,
    height: u32,
    depth: u32,
    mip_count: u32,
    format: TextureFormat,
) -> u64 {
    (0..mip_count.max(1))
        .map(|level| {
            let pitches = format.pitches(
                mip_extent(width, level),
                mip_extent(height, level),
                mip_extent(depth, level),
            );
            pitches.array_pitch as u64
        })
        .sum()
}
