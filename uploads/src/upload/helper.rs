//! Thin facade over a device context's resource update primitives.

use std::sync::Arc;

use crate::backend::{CopyDestination, CopySource, GpuContext, MapTarget};
use crate::error::UploadError;
use crate::resources::{DataPacket, Resource, ResourceLocator};
use crate::types::{AllocationRules, BindFlags, Box2D, DefragStep, ResourceDesc, ResourceKind, SubResourceId};
use crate::{profile_function, profile_scope};

use super::copy::{CopyExtent, copy_mip_level};
use super::staging::StagingToFinalMapping;

/// Pushes bytes into GPU resources through one device context.
///
/// The helper holds no state beyond the context it is bound to, so it is
/// cheap to construct for a single call. Every write is issued on that
/// context: on a deferred context it takes effect when the resolved command
/// list executes, on the immediate context it takes effect right away.
///
/// Maps are not synchronized. Callers must ensure nothing else touches the
/// same resource region during a write.
///
/// # Example
///
/// ```ignore
/// let helper = ResourceUploadHelper::new(context.as_ref());
/// let written = helper.write_to_buffer_via_map(&locator, &desc, 0, &vertices)?;
/// ```
pub struct ResourceUploadHelper<'a> {
    context: &'a dyn GpuContext,
}

impl<'a> ResourceUploadHelper<'a> {
    /// Bind a helper to `context`.
    pub fn new(context: &'a dyn GpuContext) -> Self {
        Self { context }
    }

    /// The bound context.
    pub fn context(&self) -> &'a dyn GpuContext {
        self.context
    }

    /// Write `data` at `offset` into a linear buffer, discarding previous contents of the mapped range.
    ///
    /// For a sub-range locator `offset` is relative to the locator and gets
    /// rebased into the containing resource. Returns the number of bytes
    /// copied, which is `data.len()` clipped to the end of the locator.
    ///
    /// # Errors
    ///
    /// Fails with [`UploadError::InvalidResourceKind`] unless `desc` describes a
    /// linear buffer, and with [`UploadError::InvalidParameter`] when `offset`
    /// lies past the end of the locator.
    pub fn write_to_buffer_via_map(
        &self,
        locator: &ResourceLocator,
        desc: &ResourceDesc,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, UploadError> {
        profile_function!();
        desc.linear_buffer_desc()?;
        let resource = locator.containing_resource();
        let container_size = resource.desc().linear_buffer_desc()?.size_in_bytes as u64;

        let (start, limit) = match locator.range_in_containing_resource() {
            Some(range) => (range.start + offset, range.end),
            None => (offset, container_size),
        };
        if start > limit {
            return Err(UploadError::InvalidParameter(format!(
                "write offset {offset} past the end of the locator"
            )));
        }
        let end = (start + data.len() as u64).min(limit);

        self.context
            .map_write(resource, MapTarget::Range(start..end), &mut |mapped, _| {
                let len = mapped.len().min(data.len());
                mapped[..len].copy_from_slice(&data[..len]);
                len
            })
    }

    /// Write texture data through memory maps.
    ///
    /// An empty `box2d` writes every sub-resource the packet has data for. A
    /// non-empty box writes that region of every such sub-resource, scaled
    /// down per mip; the rest of each mapped sub-resource is discarded.
    /// Returns the total number of bytes copied.
    ///
    /// # Errors
    ///
    /// The locator must be a whole texture. A non-empty box on a device that
    /// only maps whole resources is [`UploadError::Unsupported`].
    pub fn write_to_texture_via_map(
        &self,
        locator: &ResourceLocator,
        desc: &ResourceDesc,
        box2d: Box2D,
        data: &dyn DataPacket,
    ) -> Result<usize, UploadError> {
        profile_function!();
        let tex = desc.texture_desc()?;
        let resource = locator.require_whole("texture write destination")?;

        if !self.context.supports_sub_resource_map() {
            if !box2d.is_empty() {
                return Err(UploadError::Unsupported(
                    "partial texture writes need sub-resource maps".to_string(),
                ));
            }
            return self.context.map_write(resource, MapTarget::Whole, &mut |mapped, _| {
                let mut offset = 0usize;
                let mut copied = 0;
                for array_layer in 0..tex.layer_count() {
                    for mip in 0..tex.level_count() {
                        let pitches = tex.pitches(mip);
                        let size = pitches.array_pitch as usize;
                        let sub = SubResourceId::new(mip, array_layer);
                        let src = data.data(sub);
                        if !src.is_empty() && offset < mapped.len() {
                            let end = (offset + size).min(mapped.len());
                            copied += copy_mip_level(
                                &mut mapped[offset..end],
                                pitches,
                                [0, 0],
                                src,
                                data.pitches(sub),
                                CopyExtent::for_mip(tex, mip, Box2D::default()),
                                tex.format,
                            );
                        }
                        offset += size;
                    }
                }
                copied
            });
        }

        let mut copied = 0;
        for mip in 0..tex.level_count() {
            for array_layer in 0..tex.layer_count() {
                let sub = SubResourceId::new(mip, array_layer);
                let src = data.data(sub);
                if src.is_empty() {
                    continue;
                }
                let extent = CopyExtent::for_mip(tex, mip, box2d);
                let origin = if box2d.is_empty() {
                    [0, 0]
                } else {
                    let scaled = box2d.at_mip(mip);
                    [scaled.left, scaled.top]
                };
                let src_pitches = data.pitches(sub);
                copied += self.context.map_write(
                    resource,
                    MapTarget::SubResource(sub),
                    &mut |mapped, pitches| {
                        copy_mip_level(mapped, pitches, origin, src, src_pitches, extent, tex.format)
                    },
                )?;
            }
        }
        Ok(copied)
    }

    /// Copy a filled staging texture into the final texture.
    ///
    /// Covers the whole destination with a single copy when the mapping spans
    /// every mip, every layer and the full plane. Otherwise copies one
    /// sub-resource at a time, translating destination coordinates into the
    /// staging texture with the mapping's offsets.
    ///
    /// # Errors
    ///
    /// Both locators must be whole resources and `destination_desc` must
    /// describe a texture.
    pub fn update_final_resource_from_staging(
        &self,
        final_resource: &ResourceLocator,
        staging_resource: &ResourceLocator,
        destination_desc: &ResourceDesc,
        mapping: &StagingToFinalMapping,
    ) -> Result<(), UploadError> {
        profile_function!();
        let dst = final_resource.require_whole("final resource")?;
        let src = staging_resource.require_whole("staging resource")?;
        let tex = destination_desc.texture_desc()?;

        let lod_max = mapping.dst_lod_level_max.min(tex.level_count() - 1);
        let layer_max = mapping.dst_array_layer_max.min(tex.layer_count() - 1);
        let all_lods = mapping.dst_lod_level_min == 0 && lod_max == tex.level_count() - 1;
        let all_layers = mapping.dst_array_layer_min == 0 && layer_max == tex.layer_count() - 1;
        let entire_plane = mapping.dst_box.covers_plane(tex);

        self.context.capture_for_bind(dst, BindFlags::TRANSFER_DST);
        self.context.capture_for_bind(src, BindFlags::TRANSFER_SRC);

        if all_lods && all_layers && entire_plane {
            return self.context.copy_resource(dst, src);
        }

        for array_layer in mapping.dst_array_layer_min..=layer_max {
            for mip in mapping.dst_lod_level_min..=lod_max {
                let staging_sub = SubResourceId::new(
                    mip.checked_sub(mapping.staging_lod_offset).ok_or_else(|| {
                        UploadError::InvalidParameter(format!(
                            "mip {mip} precedes staging lod offset {}",
                            mapping.staging_lod_offset
                        ))
                    })?,
                    array_layer.checked_sub(mapping.staging_array_offset).ok_or_else(|| {
                        UploadError::InvalidParameter(format!(
                            "layer {array_layer} precedes staging array offset {}",
                            mapping.staging_array_offset
                        ))
                    })?,
                );

                let (origin, src_box) = if entire_plane {
                    ([0, 0], Box2D::default())
                } else {
                    let (width, height, _) = tex.mip_size(mip);
                    let scaled = mapping.dst_box.at_mip(mip);
                    let src_left = scaled.left.saturating_sub(mapping.staging_xy_offset[0] >> mip);
                    let src_top = scaled.top.saturating_sub(mapping.staging_xy_offset[1] >> mip);
                    let src_box = Box2D::new(
                        src_left,
                        src_top,
                        src_left + scaled.right.min(width).saturating_sub(scaled.left),
                        src_top + scaled.bottom.min(height).saturating_sub(scaled.top),
                    );
                    ([scaled.left, scaled.top], src_box)
                };

                self.context.copy_partial(
                    CopyDestination {
                        resource: dst,
                        sub_resource: SubResourceId::new(mip, array_layer),
                        origin,
                    },
                    CopySource {
                        resource: src,
                        sub_resource: staging_sub,
                        box2d: src_box,
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Create a CPU-writable staging copy of `desc`, optionally pre-filled.
    pub fn create_staging_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&dyn DataPacket>,
    ) -> Result<Arc<Resource>, UploadError> {
        let staging = if desc.allocation_rules.contains(AllocationRules::STAGING) {
            desc.clone()
        } else {
            desc.as_staging()
        };
        self.context.create_resource(&staging, initial_data)
    }

    /// Copy the whole contents of `source` into `destination`.
    pub fn resource_copy(&self, destination: &Resource, source: &Resource) -> Result<(), UploadError> {
        self.context.capture_for_bind(destination, BindFlags::TRANSFER_DST);
        self.context.capture_for_bind(source, BindFlags::TRANSFER_SRC);
        self.context.copy_resource(destination, source)
    }

    /// Apply defrag steps from `source` into `destination`, in the given order.
    pub fn resource_copy_defrag_steps(
        &self,
        destination: &Resource,
        source: &Resource,
        steps: &[DefragStep],
    ) -> Result<(), UploadError> {
        profile_scope!("resource_copy_defrag_steps");
        destination.desc().linear_buffer_desc()?;
        source.desc().linear_buffer_desc()?;

        self.context.capture_for_bind(destination, BindFlags::TRANSFER_DST);
        self.context.capture_for_bind(source, BindFlags::TRANSFER_SRC);
        for step in steps.iter().filter(|step| !step.is_empty()) {
            self.context.copy_buffer_region(
                destination,
                step.destination as u64,
                source,
                step.source_start as u64..step.source_end as u64,
            )?;
        }
        Ok(())
    }

    /// Read back the located bytes, or one sub-resource of a texture.
    pub fn read_back(
        &self,
        locator: &ResourceLocator,
        sub_resource: SubResourceId,
    ) -> Result<Vec<u8>, UploadError> {
        let resource = locator.containing_resource();
        let target = match (&resource.desc().kind, locator.range_in_containing_resource()) {
            (ResourceKind::Texture(_), _) => MapTarget::SubResource(sub_resource),
            (ResourceKind::LinearBuffer(_), Some(range)) => MapTarget::Range(range),
            (ResourceKind::LinearBuffer(buffer), None) => {
                MapTarget::Range(0..buffer.size_in_bytes as u64)
            }
        };
        self.context.read_back(resource, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuDevice;
    use crate::backend::dummy::DummyDevice;
    use crate::resources::BasicDataPacket;
    use crate::types::{PartialResource, TextureDesc, TextureFormat};
    use crate::upload::calculate_partial_staging_desc;

    fn texture_desc() -> ResourceDesc {
        ResourceDesc::texture(
            TextureDesc::new_2d(8, 8, TextureFormat::R8Unorm)
                .with_mip_count(4)
                .with_array_count(2),
            BindFlags::SHADER_RESOURCE,
        )
    }

    fn pattern(desc: &ResourceDesc) -> BasicDataPacket {
        BasicDataPacket::for_texture(desc.texture_desc().unwrap(), |sub, bytes| {
            for (i, b) in bytes.iter_mut().enumerate() {
                *b = (sub.mip * 50 + sub.array_layer * 100) as u8 + i as u8;
            }
        })
    }

    #[test]
    fn test_write_to_buffer_rebases_sub_range() {
        let device = DummyDevice::new();
        let desc = ResourceDesc::linear_buffer(16, BindFlags::VERTEX_BUFFER);
        let container = device.create_resource(&desc, None).unwrap();
        let locator = ResourceLocator::sub_range(container.clone(), 8..12).unwrap();
        let helper = ResourceUploadHelper::new(device.immediate().as_ref());

        let written = helper
            .write_to_buffer_via_map(&locator, &desc, 1, &[1, 2, 3, 4, 5])
            .unwrap();
        assert_eq!(written, 3);

        let bytes = helper.read_back(&ResourceLocator::whole(container), SubResourceId::default()).unwrap();
        assert_eq!(bytes[8..12], [0, 1, 2, 3]);
        assert_eq!(bytes[12], 0);
    }

    #[test]
    fn test_write_to_buffer_rejects_texture_desc() {
        let device = DummyDevice::new();
        let desc = ResourceDesc::linear_buffer(16, BindFlags::VERTEX_BUFFER);
        let buffer = device.create_resource(&desc, None).unwrap();
        let helper = ResourceUploadHelper::new(device.immediate().as_ref());
        let err = helper
            .write_to_buffer_via_map(&buffer.into(), &texture_desc(), 0, &[0; 4])
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidResourceKind { .. }));
    }

    #[test]
    fn test_write_texture_per_sub_resource() {
        let device = DummyDevice::new();
        let desc = texture_desc();
        let tex = device.create_resource(&desc, None).unwrap();
        let helper = ResourceUploadHelper::new(device.immediate().as_ref());
        let data = pattern(&desc);

        let written = helper
            .write_to_texture_via_map(&tex.clone().into(), &desc, Box2D::default(), &data)
            .unwrap();
        assert_eq!(written as u64, desc.byte_count());

        let sub = SubResourceId::new(2, 1);
        let locator = ResourceLocator::whole(tex);
        assert_eq!(helper.read_back(&locator, sub).unwrap(), data.data(sub));
    }

    #[test]
    fn test_write_texture_whole_resource_map() {
        let device = DummyDevice::with_sub_resource_map(false);
        let desc = texture_desc();
        let tex = device.create_resource(&desc, None).unwrap();
        let helper = ResourceUploadHelper::new(device.immediate().as_ref());
        let data = pattern(&desc);

        let written = helper
            .write_to_texture_via_map(&tex.clone().into(), &desc, Box2D::default(), &data)
            .unwrap();
        assert_eq!(written as u64, desc.byte_count());
        let locator = ResourceLocator::whole(tex.clone());
        for sub in [SubResourceId::new(0, 0), SubResourceId::new(3, 1)] {
            assert_eq!(helper.read_back(&locator, sub).unwrap(), data.data(sub));
        }

        let err = helper
            .write_to_texture_via_map(&tex.into(), &desc, Box2D::new(0, 0, 4, 4), &data)
            .unwrap_err();
        assert!(matches!(err, UploadError::Unsupported(_)));
    }

    #[test]
    fn test_write_texture_skips_missing_sub_resources() {
        let device = DummyDevice::new();
        let desc = texture_desc();
        let tex = device.create_resource(&desc, None).unwrap();
        let helper = ResourceUploadHelper::new(device.immediate().as_ref());
        let mut data = BasicDataPacket::new();
        let pitches = desc.texture_desc().unwrap().pitches(1);
        data.insert(SubResourceId::new(1, 0), vec![7; 16], pitches);

        let written = helper
            .write_to_texture_via_map(&tex.into(), &desc, Box2D::default(), &data)
            .unwrap();
        assert_eq!(written, 16);
    }

    #[test]
    fn test_staging_round_trip_with_lod_offset() {
        let device = DummyDevice::new();
        let dst_desc = texture_desc();
        let dst = device.create_resource(&dst_desc, None).unwrap();
        let helper = ResourceUploadHelper::new(device.immediate().as_ref());

        let part = PartialResource::whole(dst_desc.texture_desc().unwrap()).with_lod_levels(1, 2);
        let (staging_desc, mapping) = calculate_partial_staging_desc(&dst_desc, &part).unwrap();
        let staging_data = pattern(&staging_desc);
        let staging = helper
            .create_staging_resource(&staging_desc, Some(&staging_data))
            .unwrap();

        helper
            .update_final_resource_from_staging(
                &dst.clone().into(),
                &staging.clone().into(),
                &dst_desc,
                &mapping,
            )
            .unwrap();

        let dst_locator = ResourceLocator::whole(dst);
        // Destination mip 2, layer 1 comes from staging mip 1, layer 1
        assert_eq!(
            helper.read_back(&dst_locator, SubResourceId::new(2, 1)).unwrap(),
            staging_data.data(SubResourceId::new(1, 1))
        );
        // Mip 0 untouched
        assert!(helper
            .read_back(&dst_locator, SubResourceId::new(0, 0))
            .unwrap()
            .iter()
            .all(|b| *b == 0));
    }

    #[test]
    fn test_staging_round_trip_with_box() {
        let device = DummyDevice::new();
        let dst_desc = ResourceDesc::texture(
            TextureDesc::new_2d(8, 8, TextureFormat::R8Unorm),
            BindFlags::SHADER_RESOURCE,
        );
        let dst = device.create_resource(&dst_desc, None).unwrap();
        let helper = ResourceUploadHelper::new(device.immediate().as_ref());

        let part = PartialResource::default().with_box(Box2D::new(4, 2, 6, 4));
        let (staging_desc, mapping) = calculate_partial_staging_desc(&dst_desc, &part).unwrap();
        let mut staging_data = BasicDataPacket::new();
        staging_data.insert(
            SubResourceId::default(),
            vec![1, 2, 3, 4],
            staging_desc.texture_desc().unwrap().pitches(0),
        );
        let staging = helper
            .create_staging_resource(&staging_desc, Some(&staging_data))
            .unwrap();
        helper
            .update_final_resource_from_staging(&dst.clone().into(), &staging.into(), &dst_desc, &mapping)
            .unwrap();

        let bytes = helper.read_back(&dst.into(), SubResourceId::default()).unwrap();
        assert_eq!(bytes[2 * 8 + 4..2 * 8 + 6], [1, 2]);
        assert_eq!(bytes[3 * 8 + 4..3 * 8 + 6], [3, 4]);
        assert_eq!(bytes.iter().map(|b| *b as u32).sum::<u32>(), 10);
    }

    #[test]
    fn test_update_requires_whole_resources() {
        let device = DummyDevice::new();
        let buffer_desc = ResourceDesc::linear_buffer(64, BindFlags::VERTEX_BUFFER);
        let container = device.create_resource(&buffer_desc, None).unwrap();
        let sub = ResourceLocator::sub_range(container.clone(), 0..16).unwrap();
        let helper = ResourceUploadHelper::new(device.immediate().as_ref());

        let err = helper
            .update_final_resource_from_staging(
                &sub,
                &container.into(),
                &texture_desc(),
                &StagingToFinalMapping::default(),
            )
            .unwrap_err();
        assert!(matches!(err, UploadError::NotWholeResource(_)));
    }

    #[test]
    fn test_update_transitions_resources() {
        let device = DummyDevice::new();
        let desc = texture_desc();
        let dst = device.create_resource(&desc, None).unwrap();
        let src = device.create_resource(&desc.as_staging(), None).unwrap();
        let helper = ResourceUploadHelper::new(device.immediate().as_ref());
        helper
            .update_final_resource_from_staging(
                &dst.clone().into(),
                &src.clone().into(),
                &desc,
                &StagingToFinalMapping::default(),
            )
            .unwrap();

        let state = |r: &Resource| match r.gpu_handle() {
            crate::backend::GpuResource::Dummy(m) => m.bind_state(),
            #[cfg(feature = "wgpu-backend")]
            _ => unreachable!(),
        };
        assert_eq!(state(&dst), BindFlags::TRANSFER_DST);
        assert_eq!(state(&src), BindFlags::TRANSFER_SRC);
    }

    #[test]
    fn test_defrag_steps_apply_in_order() {
        let device = DummyDevice::new();
        let desc = ResourceDesc::linear_buffer(8, BindFlags::VERTEX_BUFFER);
        let src_data = BasicDataPacket::linear((1..=8).collect());
        let src = device.create_resource(&desc, Some(&src_data)).unwrap();
        let dst = device.create_resource(&desc, None).unwrap();
        let helper = ResourceUploadHelper::new(device.immediate().as_ref());

        let steps = [
            DefragStep {
                source_start: 4,
                source_end: 8,
                destination: 0,
            },
            DefragStep {
                source_start: 0,
                source_end: 2,
                destination: 4,
            },
        ];
        helper.resource_copy_defrag_steps(&dst, &src, &steps).unwrap();
        let bytes = helper.read_back(&dst.into(), SubResourceId::default()).unwrap();
        assert_eq!(bytes, [5, 6, 7, 8, 1, 2, 0, 0]);
    }
}
