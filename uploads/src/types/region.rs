//! Sub-resource addressing: mip/layer ids, 2D boxes and partial update regions.

use super::desc::TextureDesc;

/// One addressable (mip level, array layer) unit of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct SubResourceId {
    /// Mip level.
    pub mip: u32,
    /// Array layer.
    pub array_layer: u32,
}

impl SubResourceId {
    /// Create a sub-resource id.
    pub fn new(mip: u32, array_layer: u32) -> Self {
        Self { mip, array_layer }
    }
}

/// Axis aligned rectangle in texels of the top mip.
///
/// The default (all zero) box means "the whole resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Box2D {
    /// Left edge, inclusive.
    pub left: u32,
    /// Top edge, inclusive.
    pub top: u32,
    /// Right edge, exclusive.
    pub right: u32,
    /// Bottom edge, exclusive.
    pub bottom: u32,
}

impl Box2D {
    /// Create a box from its edges.
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// True for the default box, which addresses the whole resource.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// True when the box is empty or spans the full top mip of `desc`.
    pub fn covers_plane(&self, desc: &TextureDesc) -> bool {
        self.is_empty()
            || (self.left == 0
                && self.top == 0
                && self.right == desc.width
                && self.bottom == desc.height)
    }

    /// The box scaled down to mip `level`, never smaller than one texel.
    pub fn at_mip(&self, level: u32) -> Self {
        let left = self.left >> level;
        let top = self.top >> level;
        Self {
            left,
            top,
            right: (self.right >> level).max(left + 1),
            bottom: (self.bottom >> level).max(top + 1),
        }
    }

    /// The box translated by `(-x, -y)`.
    pub fn offset_by(&self, x: u32, y: u32) -> Self {
        Self {
            left: self.left.saturating_sub(x),
            top: self.top.saturating_sub(y),
            right: self.right.saturating_sub(x),
            bottom: self.bottom.saturating_sub(y),
        }
    }
}

/// A region of a texture to update: a 2D box, a lod range and an array range.
///
/// Ranges are inclusive. The default value addresses lod 0 of layer 0 over
/// the whole plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PartialResource {
    /// 2D region, empty for the whole plane.
    pub box2d: Box2D,
    /// First mip level.
    pub lod_level_min: u32,
    /// Last mip level.
    pub lod_level_max: u32,
    /// First array layer.
    pub array_index_min: u32,
    /// Last array layer.
    pub array_index_max: u32,
}

impl PartialResource {
    /// Every sub-resource of `desc`.
    pub fn whole(desc: &TextureDesc) -> Self {
        Self {
            box2d: Box2D::default(),
            lod_level_min: 0,
            lod_level_max: desc.level_count() - 1,
            array_index_min: 0,
            array_index_max: desc.layer_count() - 1,
        }
    }

    /// Set the 2D region.
    pub fn with_box(mut self, box2d: Box2D) -> Self {
        self.box2d = box2d;
        self
    }

    /// Set the inclusive lod range.
    pub fn with_lod_levels(mut self, min: u32, max: u32) -> Self {
        self.lod_level_min = min;
        self.lod_level_max = max;
        self
    }

    /// Set the inclusive array layer range.
    pub fn with_array_indices(mut self, min: u32, max: u32) -> Self {
        self.array_index_min = min;
        self.array_index_max = max;
        self
    }

    /// True when the lod range covers every mip of `desc`.
    pub fn is_all_lod_levels(&self, desc: &TextureDesc) -> bool {
        let last = desc.level_count() - 1;
        self.lod_level_min == 0 && self.lod_level_max.min(last) == last
    }

    /// True when the array range covers every layer of `desc`.
    pub fn is_all_array_layers(&self, desc: &TextureDesc) -> bool {
        let last = desc.layer_count() - 1;
        self.array_index_min == 0 && self.array_index_max.min(last) == last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureFormat;

    #[test]
    fn test_box_covers_plane() {
        let desc = TextureDesc::new_2d(256, 256, TextureFormat::Rgba8Unorm);
        assert!(Box2D::default().covers_plane(&desc));
        assert!(Box2D::new(0, 0, 256, 256).covers_plane(&desc));
        assert!(!Box2D::new(0, 0, 64, 256).covers_plane(&desc));
        assert!(!Box2D::new(0, 0, 256, 64).covers_plane(&desc));
    }

    #[test]
    fn test_box_at_mip() {
        let b = Box2D::new(32, 16, 96, 64);
        assert_eq!(b.at_mip(1), Box2D::new(16, 8, 48, 32));
        // Never collapses to zero area
        let tiny = b.at_mip(10);
        assert_eq!((tiny.width(), tiny.height()), (1, 1));
    }

    #[test]
    fn test_partial_ranges() {
        let desc = TextureDesc::new_2d(256, 256, TextureFormat::Rgba8Unorm)
            .with_mip_count(8)
            .with_array_count(4);
        let whole = PartialResource::whole(&desc);
        assert!(whole.is_all_lod_levels(&desc));
        assert!(whole.is_all_array_layers(&desc));

        let part = whole.with_lod_levels(2, 4).with_array_indices(1, 1);
        assert!(!part.is_all_lod_levels(&desc));
        assert!(!part.is_all_array_layers(&desc));

        // Maximums past the end clamp to the last level and layer
        let open_ended = whole
            .with_lod_levels(0, u32::MAX)
            .with_array_indices(0, u32::MAX);
        assert!(open_ended.is_all_lod_levels(&desc));
        assert!(open_ended.is_all_array_layers(&desc));
        assert!(!open_ended.with_lod_levels(1, u32::MAX).is_all_lod_levels(&desc));
    }
}
