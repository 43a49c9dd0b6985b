//! Resource descriptors and access flags.

use bitflags::bitflags;

use super::format::{TexturePitches, TextureFormat, mip_extent, texture_data_size};
use crate::error::UploadError;

bitflags! {
    /// Ways a resource can be bound to the pipeline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        /// Vertex buffer input.
        const VERTEX_BUFFER = 1 << 0;
        /// Index buffer input.
        const INDEX_BUFFER = 1 << 1;
        /// Constant (uniform) buffer.
        const CONSTANT_BUFFER = 1 << 2;
        /// Sampled or read in a shader.
        const SHADER_RESOURCE = 1 << 3;
        /// Read/write storage access.
        const UNORDERED_ACCESS = 1 << 4;
        /// Color render target.
        const RENDER_TARGET = 1 << 5;
        /// Depth/stencil target.
        const DEPTH_STENCIL = 1 << 6;
        /// Source of a transfer (copy) operation.
        const TRANSFER_SRC = 1 << 7;
        /// Destination of a transfer (copy) operation.
        const TRANSFER_DST = 1 << 8;
    }
}

bitflags! {
    /// CPU access to a resource's memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CpuAccess: u32 {
        /// CPU can map for reading.
        const READ = 1 << 0;
        /// CPU can map for writing.
        const WRITE = 1 << 1;
        /// CPU rewrites the whole resource frequently (write-discard).
        const WRITE_DYNAMIC = (1 << 2) | Self::WRITE.bits();
    }
}

bitflags! {
    /// GPU access to a resource's memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GpuAccess: u32 {
        /// GPU reads the resource.
        const READ = 1 << 0;
        /// GPU writes the resource.
        const WRITE = 1 << 1;
    }
}

bitflags! {
    /// Hints about how the resource memory should be allocated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AllocationRules: u32 {
        /// Keep the resource permanently mapped.
        const PERSISTENT_MAPPED = 1 << 0;
        /// Intermediate resource used only to feed a GPU-side copy.
        const STAGING = 1 << 1;
        /// Resource may be sub-allocated from a larger batch.
        const BATCHED = 1 << 2;
    }
}

impl Default for BindFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for CpuAccess {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for GpuAccess {
    fn default() -> Self {
        Self::READ
    }
}

impl Default for AllocationRules {
    fn default() -> Self {
        Self::empty()
    }
}

/// Layout of a linear (untyped) buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinearBufferDesc {
    /// Size in bytes.
    pub size_in_bytes: u32,
    /// Element stride for structured buffers, zero otherwise.
    pub structure_byte_size: u32,
}

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    /// One dimensional texture.
    Tex1D,
    /// Two dimensional texture.
    #[default]
    Tex2D,
    /// Volume texture.
    Tex3D,
    /// Cube map, six layers per cube.
    CubeMap,
}

/// Layout of a texture.
///
/// `array_count` of zero means "not an array"; it still addresses one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth in texels (volume textures only).
    pub depth: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Dimensionality.
    pub dimension: TextureDimension,
    /// Number of mip levels.
    pub mip_count: u32,
    /// Number of array layers, zero for a plain texture.
    pub array_count: u32,
    /// Sample count for multisampling.
    pub samples: u32,
}

impl TextureDesc {
    /// Create a 2D texture descriptor with a single mip.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            depth: 1,
            format,
            dimension: TextureDimension::Tex2D,
            mip_count: 1,
            array_count: 0,
            samples: 1,
        }
    }

    /// Create a cube map descriptor; the six faces are array layers.
    pub fn new_cube(size: u32, format: TextureFormat) -> Self {
        Self {
            dimension: TextureDimension::CubeMap,
            array_count: 6,
            ..Self::new_2d(size, size, format)
        }
    }

    /// Set the mip level count.
    pub fn with_mip_count(mut self, count: u32) -> Self {
        self.mip_count = count;
        self
    }

    /// Set the array layer count.
    pub fn with_array_count(mut self, count: u32) -> Self {
        self.array_count = count;
        self
    }

    /// Set the depth, switching the texture to 3D.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self.dimension = TextureDimension::Tex3D;
        self
    }

    /// Number of addressable array layers (at least one).
    pub fn layer_count(&self) -> u32 {
        self.array_count.max(1)
    }

    /// Number of mip levels (at least one).
    pub fn level_count(&self) -> u32 {
        self.mip_count.max(1)
    }

    /// Descriptor of the chain starting at `level`.
    ///
    /// Compressed formats round the top extent up to a whole block.
    pub fn mip_desc(&self, level: u32) -> Self {
        let mut width = mip_extent(self.width, level);
        let mut height = mip_extent(self.height, level);
        if self.format.is_compressed() {
            let block = self.format.block_dimension();
            width = width.next_multiple_of(block);
            height = height.next_multiple_of(block);
        }
        Self {
            width,
            height,
            depth: mip_extent(self.depth, level),
            mip_count: self.level_count().saturating_sub(level).max(1),
            ..*self
        }
    }

    /// Texel extent of mip `level` (not rounded to blocks).
    pub fn mip_size(&self, level: u32) -> (u32, u32, u32) {
        (
            mip_extent(self.width, level),
            mip_extent(self.height, level),
            mip_extent(self.depth, level),
        )
    }

    /// Tightly packed pitches of mip `level`.
    pub fn pitches(&self, level: u32) -> TexturePitches {
        let (w, h, d) = self.mip_size(level);
        self.format.pitches(w, h, d)
    }

    /// Total byte size of every sub-resource.
    pub fn byte_count(&self) -> u64 {
        texture_data_size(self.width, self.height, self.depth, self.mip_count, self.format)
            * self.layer_count() as u64
    }
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self::new_2d(1, 1, TextureFormat::default())
    }
}

/// What kind of resource a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Untyped linear memory.
    LinearBuffer(LinearBufferDesc),
    /// Texture with mips and array layers.
    Texture(TextureDesc),
}

impl ResourceKind {
    /// Human readable kind name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LinearBuffer(_) => "linear buffer",
            Self::Texture(_) => "texture",
        }
    }
}

/// Full description of a GPU resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    /// Buffer or texture layout.
    pub kind: ResourceKind,
    /// Pipeline bindings.
    pub bind_flags: BindFlags,
    /// CPU access.
    pub cpu_access: CpuAccess,
    /// GPU access.
    pub gpu_access: GpuAccess,
    /// Allocation hints.
    pub allocation_rules: AllocationRules,
    /// Debug label.
    pub label: Option<String>,
}

impl ResourceDesc {
    /// Describe a linear buffer of `size_in_bytes`.
    pub fn linear_buffer(size_in_bytes: u32, bind_flags: BindFlags) -> Self {
        Self {
            kind: ResourceKind::LinearBuffer(LinearBufferDesc {
                size_in_bytes,
                structure_byte_size: 0,
            }),
            bind_flags,
            cpu_access: CpuAccess::empty(),
            gpu_access: GpuAccess::READ,
            allocation_rules: AllocationRules::empty(),
            label: None,
        }
    }

    /// Describe a texture.
    pub fn texture(desc: TextureDesc, bind_flags: BindFlags) -> Self {
        Self {
            kind: ResourceKind::Texture(desc),
            bind_flags,
            cpu_access: CpuAccess::empty(),
            gpu_access: GpuAccess::READ,
            allocation_rules: AllocationRules::empty(),
            label: None,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set CPU access.
    pub fn with_cpu_access(mut self, access: CpuAccess) -> Self {
        self.cpu_access = access;
        self
    }

    /// Set GPU access.
    pub fn with_gpu_access(mut self, access: GpuAccess) -> Self {
        self.gpu_access = access;
        self
    }

    /// Set allocation rules.
    pub fn with_allocation_rules(mut self, rules: AllocationRules) -> Self {
        self.allocation_rules = rules;
        self
    }

    /// Buffer layout, or an error if this describes a texture.
    pub fn linear_buffer_desc(&self) -> Result<&LinearBufferDesc, UploadError> {
        match &self.kind {
            ResourceKind::LinearBuffer(desc) => Ok(desc),
            other => Err(UploadError::InvalidResourceKind {
                expected: "linear buffer",
                found: other.name(),
            }),
        }
    }

    /// Texture layout, or an error if this describes a buffer.
    pub fn texture_desc(&self) -> Result<&TextureDesc, UploadError> {
        match &self.kind {
            ResourceKind::Texture(desc) => Ok(desc),
            other => Err(UploadError::InvalidResourceKind {
                expected: "texture",
                found: other.name(),
            }),
        }
    }

    /// Total byte size of the resource contents.
    pub fn byte_count(&self) -> u64 {
        match &self.kind {
            ResourceKind::LinearBuffer(desc) => desc.size_in_bytes as u64,
            ResourceKind::Texture(desc) => desc.byte_count(),
        }
    }

    /// The same layout as a CPU-writable staging resource.
    pub fn as_staging(&self) -> Self {
        Self {
            kind: self.kind,
            bind_flags: BindFlags::TRANSFER_SRC,
            cpu_access: CpuAccess::READ | CpuAccess::WRITE,
            gpu_access: GpuAccess::empty(),
            allocation_rules: AllocationRules::STAGING,
            label: self.label.as_ref().map(|l| format!("{l} (staging)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_desc() {
        let desc = TextureDesc::new_2d(256, 128, TextureFormat::Rgba8Unorm).with_mip_count(8);
        let mip = desc.mip_desc(2);
        assert_eq!((mip.width, mip.height), (64, 32));
        assert_eq!(mip.mip_count, 6);
    }

    #[test]
    fn test_mip_desc_compressed_rounds_to_block() {
        let desc = TextureDesc::new_2d(64, 64, TextureFormat::Bc1RgbaUnorm).with_mip_count(7);
        let mip = desc.mip_desc(5);
        assert_eq!((mip.width, mip.height), (4, 4));
    }

    #[test]
    fn test_byte_count() {
        let buffer = ResourceDesc::linear_buffer(1024, BindFlags::VERTEX_BUFFER);
        assert_eq!(buffer.byte_count(), 1024);

        let tex = ResourceDesc::texture(
            TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm)
                .with_mip_count(3)
                .with_array_count(2),
            BindFlags::SHADER_RESOURCE,
        );
        assert_eq!(tex.byte_count(), 84 * 2);
    }

    #[test]
    fn test_kind_accessors() {
        let buffer = ResourceDesc::linear_buffer(16, BindFlags::INDEX_BUFFER);
        assert!(buffer.linear_buffer_desc().is_ok());
        assert_eq!(
            buffer.texture_desc(),
            Err(UploadError::InvalidResourceKind {
                expected: "texture",
                found: "linear buffer",
            })
        );
    }

    #[test]
    fn test_as_staging() {
        let desc = ResourceDesc::texture(TextureDesc::default(), BindFlags::SHADER_RESOURCE)
            .with_label("albedo");
        let staging = desc.as_staging();
        assert_eq!(staging.kind, desc.kind);
        assert_eq!(staging.bind_flags, BindFlags::TRANSFER_SRC);
        assert!(staging.cpu_access.contains(CpuAccess::WRITE | CpuAccess::READ));
        assert!(staging.gpu_access.is_empty());
        assert_eq!(staging.allocation_rules, AllocationRules::STAGING);
        assert_eq!(staging.label.as_deref(), Some("albedo (staging)"));
    }
}
