//! Sizing staging resources for partial texture updates.

use crate::error::UploadError;
use crate::types::{Box2D, PartialResource, ResourceDesc, ResourceKind, TextureDesc};

/// Which part of a (possibly shrunk) staging texture lands where in the final texture.
///
/// Destination ranges are inclusive; `u32::MAX` as a maximum means "through the
/// last mip/layer of the destination".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StagingToFinalMapping {
    /// Destination region, empty for the whole plane.
    pub dst_box: Box2D,
    /// First destination mip.
    pub dst_lod_level_min: u32,
    /// Last destination mip.
    pub dst_lod_level_max: u32,
    /// First destination array layer.
    pub dst_array_layer_min: u32,
    /// Last destination array layer.
    pub dst_array_layer_max: u32,
    /// Destination mip `m` reads staging mip `m - staging_lod_offset`.
    pub staging_lod_offset: u32,
    /// Destination layer `a` reads staging layer `a - staging_array_offset`.
    pub staging_array_offset: u32,
    /// Destination texel of staging texel (0, 0) at the top mip.
    pub staging_xy_offset: [u32; 2],
}

impl Default for StagingToFinalMapping {
    fn default() -> Self {
        Self {
            dst_box: Box2D::default(),
            dst_lod_level_min: 0,
            dst_lod_level_max: u32::MAX,
            dst_array_layer_min: 0,
            dst_array_layer_max: u32::MAX,
            staging_lod_offset: 0,
            staging_array_offset: 0,
            staging_xy_offset: [0, 0],
        }
    }
}

/// Compute the smallest staging descriptor that can carry `part` of `dst_desc`.
///
/// When `part` covers the full 2D plane, the staging texture keeps only the
/// requested mips, sized to the first of them. When it covers only part of the
/// plane, every mip must be requested and the staging texture shrinks to the
/// box instead. Array layers are narrowed independently in both cases.
///
/// # Errors
///
/// Returns [`UploadError::PartialPlaneRequiresAllLods`] for a partial box with
/// a partial lod range, and [`UploadError::InvalidParameter`] for empty or
/// out-of-range regions.
pub fn calculate_partial_staging_desc(
    dst_desc: &ResourceDesc,
    part: &PartialResource,
) -> Result<(ResourceDesc, StagingToFinalMapping), UploadError> {
    let tex = dst_desc.texture_desc()?;
    validate_part(tex, part)?;

    let mut staging = *tex;
    let mut mapping = StagingToFinalMapping {
        dst_box: part.box2d,
        ..Default::default()
    };

    if part.box2d.covers_plane(tex) {
        if !part.is_all_lod_levels(tex) {
            let lod_max = part.lod_level_max.min(tex.level_count() - 1);
            mapping.staging_lod_offset = part.lod_level_min;
            mapping.dst_lod_level_min = part.lod_level_min;
            mapping.dst_lod_level_max = lod_max;
            staging = tex.mip_desc(part.lod_level_min);
            staging.mip_count = lod_max + 1 - part.lod_level_min;
        }
    } else {
        if !part.is_all_lod_levels(tex) {
            return Err(UploadError::PartialPlaneRequiresAllLods);
        }
        mapping.staging_xy_offset = [part.box2d.left, part.box2d.top];
        staging.width = part.box2d.width();
        staging.height = part.box2d.height();
    }

    if !part.is_all_array_layers(tex) {
        let layer_max = part.array_index_max.min(tex.layer_count() - 1);
        mapping.staging_array_offset = part.array_index_min;
        mapping.dst_array_layer_min = part.array_index_min;
        mapping.dst_array_layer_max = layer_max;
        staging.array_count = layer_max + 1 - part.array_index_min;
        if staging.array_count == 1 {
            staging.array_count = 0;
        }
    }

    let mut staging_desc = dst_desc.as_staging();
    staging_desc.kind = ResourceKind::Texture(staging);
    Ok((staging_desc, mapping))
}

fn validate_part(tex: &TextureDesc, part: &PartialResource) -> Result<(), UploadError> {
    if part.lod_level_min > part.lod_level_max || part.lod_level_min >= tex.level_count() {
        return Err(UploadError::InvalidParameter(format!(
            "lod range {}..={} invalid for {} mips",
            part.lod_level_min,
            part.lod_level_max,
            tex.level_count()
        )));
    }
    if part.array_index_min > part.array_index_max || part.array_index_min >= tex.layer_count() {
        return Err(UploadError::InvalidParameter(format!(
            "array range {}..={} invalid for {} layers",
            part.array_index_min,
            part.array_index_max,
            tex.layer_count()
        )));
    }
    let b = part.box2d;
    if !b.is_empty() && (b.width() == 0 || b.height() == 0 || b.right > tex.width || b.bottom > tex.height)
    {
        return Err(UploadError::InvalidParameter(format!(
            "box {b:?} is empty or exceeds {}x{}",
            tex.width, tex.height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AllocationRules, BindFlags, TextureFormat};

    fn dst_desc() -> ResourceDesc {
        ResourceDesc::texture(
            TextureDesc::new_2d(256, 256, TextureFormat::Rgba8Unorm)
                .with_mip_count(8)
                .with_array_count(4),
            BindFlags::SHADER_RESOURCE,
        )
    }

    #[test]
    fn test_full_plane_lod_subset() {
        let part = PartialResource::whole(dst_desc().texture_desc().unwrap()).with_lod_levels(2, 4);
        let (staging, mapping) = calculate_partial_staging_desc(&dst_desc(), &part).unwrap();
        let tex = staging.texture_desc().unwrap();

        assert_eq!((tex.width, tex.height), (64, 64));
        assert_eq!(tex.mip_count, 3);
        assert_eq!(tex.array_count, 4);
        assert_eq!(mapping.staging_lod_offset, 2);
        assert_eq!((mapping.dst_lod_level_min, mapping.dst_lod_level_max), (2, 4));
        assert_eq!(staging.allocation_rules, AllocationRules::STAGING);
    }

    #[test]
    fn test_partial_box_all_lods() {
        let part = PartialResource::whole(dst_desc().texture_desc().unwrap())
            .with_box(Box2D::new(0, 0, 64, 64))
            .with_lod_levels(0, 7);
        let (staging, mapping) = calculate_partial_staging_desc(&dst_desc(), &part).unwrap();
        let tex = staging.texture_desc().unwrap();

        assert_eq!((tex.width, tex.height), (64, 64));
        assert_eq!(tex.mip_count, 8);
        assert_eq!(tex.array_count, 4);
        assert_eq!(mapping.staging_lod_offset, 0);
        assert_eq!(mapping.staging_xy_offset, [0, 0]);
        assert_eq!(mapping.dst_box, Box2D::new(0, 0, 64, 64));
    }

    #[test]
    fn test_partial_box_offset_recorded() {
        let part = PartialResource::whole(dst_desc().texture_desc().unwrap())
            .with_box(Box2D::new(32, 16, 96, 48));
        let (staging, mapping) = calculate_partial_staging_desc(&dst_desc(), &part).unwrap();
        let tex = staging.texture_desc().unwrap();
        assert_eq!((tex.width, tex.height), (64, 32));
        assert_eq!(mapping.staging_xy_offset, [32, 16]);
    }

    #[test]
    fn test_partial_box_partial_lods_rejected() {
        let part = PartialResource::whole(dst_desc().texture_desc().unwrap())
            .with_box(Box2D::new(0, 0, 64, 64))
            .with_lod_levels(1, 3);
        assert_eq!(
            calculate_partial_staging_desc(&dst_desc(), &part),
            Err(UploadError::PartialPlaneRequiresAllLods)
        );
    }

    #[test]
    fn test_array_narrowing() {
        let part = PartialResource::whole(dst_desc().texture_desc().unwrap()).with_array_indices(1, 2);
        let (staging, mapping) = calculate_partial_staging_desc(&dst_desc(), &part).unwrap();
        assert_eq!(staging.texture_desc().unwrap().array_count, 2);
        assert_eq!(mapping.staging_array_offset, 1);
        assert_eq!((mapping.dst_array_layer_min, mapping.dst_array_layer_max), (1, 2));

        // A single layer becomes a plain texture
        let part = PartialResource::whole(dst_desc().texture_desc().unwrap()).with_array_indices(3, 3);
        let (staging, mapping) = calculate_partial_staging_desc(&dst_desc(), &part).unwrap();
        assert_eq!(staging.texture_desc().unwrap().array_count, 0);
        assert_eq!(mapping.staging_array_offset, 3);
    }

    #[test]
    fn test_open_ended_ranges_clamp_to_last_level() {
        let part = PartialResource::whole(dst_desc().texture_desc().unwrap())
            .with_lod_levels(2, u32::MAX)
            .with_array_indices(0, u32::MAX);
        let (staging, mapping) = calculate_partial_staging_desc(&dst_desc(), &part).unwrap();
        let tex = staging.texture_desc().unwrap();

        assert_eq!((tex.width, tex.height), (64, 64));
        assert_eq!(tex.mip_count, 6);
        assert_eq!(tex.array_count, 4);
        assert_eq!(mapping.staging_lod_offset, 2);
        assert_eq!((mapping.dst_lod_level_min, mapping.dst_lod_level_max), (2, 7));
        assert_eq!(mapping.staging_array_offset, 0);
        assert_eq!(mapping.dst_array_layer_max, u32::MAX);

        // Open-ended layers past the first still narrow the staging array
        let part = PartialResource::whole(dst_desc().texture_desc().unwrap())
            .with_box(Box2D::new(0, 0, 32, 32))
            .with_lod_levels(0, u32::MAX)
            .with_array_indices(1, u32::MAX);
        let (staging, mapping) = calculate_partial_staging_desc(&dst_desc(), &part).unwrap();
        let tex = staging.texture_desc().unwrap();
        assert_eq!((tex.width, tex.height, tex.mip_count), (32, 32, 8));
        assert_eq!(tex.array_count, 3);
        assert_eq!((mapping.dst_array_layer_min, mapping.dst_array_layer_max), (1, 3));
    }

    #[test]
    fn test_rejects_buffers_and_bad_ranges() {
        let buffer = ResourceDesc::linear_buffer(64, BindFlags::VERTEX_BUFFER);
        assert!(matches!(
            calculate_partial_staging_desc(&buffer, &PartialResource::default()),
            Err(UploadError::InvalidResourceKind { .. })
        ));

        let part = PartialResource::default().with_lod_levels(9, 9);
        assert!(matches!(
            calculate_partial_staging_desc(&dst_desc(), &part),
            Err(UploadError::InvalidParameter(_))
        ));

        let part = PartialResource::whole(dst_desc().texture_desc().unwrap())
            .with_box(Box2D::new(0, 0, 512, 64));
        assert!(matches!(
            calculate_partial_staging_desc(&dst_desc(), &part),
            Err(UploadError::InvalidParameter(_))
        ));
    }
}
