//! Source data for texture and buffer writes, addressed per sub-resource.

use std::collections::BTreeMap;

use crate::types::{SubResourceId, TextureDesc, TexturePitches};

/// CPU-side bytes for one or more sub-resources.
///
/// Writers query each sub-resource they intend to fill; an empty slice means
/// the packet has no data for it and the sub-resource is skipped.
pub trait DataPacket: Send + Sync {
    /// Bytes of `sub_resource`, empty when absent.
    fn data(&self, sub_resource: SubResourceId) -> &[u8];

    /// Layout of the bytes returned by [`data`](Self::data).
    fn pitches(&self, sub_resource: SubResourceId) -> TexturePitches;
}

/// A [`DataPacket`] that owns one byte vector per sub-resource.
#[derive(Debug, Clone, Default)]
pub struct BasicDataPacket {
    entries: BTreeMap<SubResourceId, (Vec<u8>, TexturePitches)>,
}

impl BasicDataPacket {
    /// Create an empty packet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Packet holding `bytes` for sub-resource (0, 0) of a linear buffer.
    pub fn linear(bytes: Vec<u8>) -> Self {
        let mut packet = Self::new();
        let pitches = TexturePitches::linear(bytes.len() as u32);
        packet.insert(SubResourceId::default(), bytes, pitches);
        packet
    }

    /// Packet holding plain-old-data values for a linear buffer.
    pub fn from_pod<T: bytemuck::Pod>(values: &[T]) -> Self {
        Self::linear(bytemuck::cast_slice(values).to_vec())
    }

    /// Packet filling every sub-resource of `desc` by calling `fill`.
    ///
    /// `fill` receives the sub-resource and a zeroed, tightly pitched buffer.
    pub fn for_texture(desc: &TextureDesc, mut fill: impl FnMut(SubResourceId, &mut [u8])) -> Self {
        let mut packet = Self::new();
        for array_layer in 0..desc.layer_count() {
            for mip in 0..desc.level_count() {
                let sub = SubResourceId::new(mip, array_layer);
                let pitches = desc.pitches(mip);
                let mut bytes = vec![0u8; pitches.array_pitch as usize];
                fill(sub, &mut bytes);
                packet.insert(sub, bytes, pitches);
            }
        }
        packet
    }

    /// Set the bytes of one sub-resource.
    pub fn insert(&mut self, sub_resource: SubResourceId, bytes: Vec<u8>, pitches: TexturePitches) {
        self.entries.insert(sub_resource, (bytes, pitches));
    }

    /// Total bytes across all sub-resources.
    pub fn byte_count(&self) -> usize {
        self.entries.values().map(|(bytes, _)| bytes.len()).sum()
    }
}

impl DataPacket for BasicDataPacket {
    fn data(&self, sub_resource: SubResourceId) -> &[u8] {
        self.entries
            .get(&sub_resource)
            .map(|(bytes, _)| bytes.as_slice())
            .unwrap_or(&[])
    }

    fn pitches(&self, sub_resource: SubResourceId) -> TexturePitches {
        self.entries
            .get(&sub_resource)
            .map(|(_, pitches)| *pitches)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureFormat;

    #[test]
    fn test_missing_sub_resource_is_empty() {
        let packet = BasicDataPacket::linear(vec![1, 2, 3]);
        assert_eq!(packet.data(SubResourceId::default()), &[1, 2, 3]);
        assert!(packet.data(SubResourceId::new(1, 0)).is_empty());
        assert_eq!(packet.pitches(SubResourceId::new(1, 0)), TexturePitches::default());
    }

    #[test]
    fn test_from_pod() {
        let packet = BasicDataPacket::from_pod(&[1u32, 2u32]);
        assert_eq!(packet.byte_count(), 8);
        assert_eq!(packet.pitches(SubResourceId::default()).row_pitch, 8);
    }

    #[test]
    fn test_for_texture_covers_every_sub_resource() {
        let desc = TextureDesc::new_2d(8, 8, TextureFormat::R8Unorm)
            .with_mip_count(2)
            .with_array_count(3);
        let packet = BasicDataPacket::for_texture(&desc, |sub, bytes| {
            bytes.fill(sub.mip as u8 + 10 * sub.array_layer as u8)
        });
        assert_eq!(packet.byte_count(), (64 + 16) * 3);
        assert_eq!(packet.data(SubResourceId::new(1, 2))[0], 21);
        assert_eq!(packet.pitches(SubResourceId::new(1, 0)).row_pitch, 4);
    }
}
