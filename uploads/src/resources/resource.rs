//! GPU resources and locators into them.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::GpuResource;
use crate::error::UploadError;
use crate::types::ResourceDesc;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// A GPU resource together with the descriptor it was created from.
///
/// Resources are shared through `Arc`; the backend handle is released when
/// the last reference drops.
pub struct Resource {
    id: u64,
    desc: ResourceDesc,
    gpu: GpuResource,
}

impl Resource {
    /// Wrap a backend handle (called by backends).
    pub(crate) fn new(desc: ResourceDesc, gpu: GpuResource) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
            desc,
            gpu,
        })
    }

    /// Process-unique id, stable for the lifetime of the resource.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Descriptor the resource was created from.
    pub fn desc(&self) -> &ResourceDesc {
        &self.desc
    }

    /// Debug label, if any.
    pub fn label(&self) -> Option<&str> {
        self.desc.label.as_deref()
    }

    /// Backend handle.
    pub fn gpu_handle(&self) -> &GpuResource {
        &self.gpu
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("label", &self.desc.label)
            .field("kind", &self.desc.kind.name())
            .finish_non_exhaustive()
    }
}

/// A whole resource, or a byte range of a containing linear buffer.
///
/// Batched buffers hand out locators into one large container resource;
/// writes through such a locator are rebased into container coordinates.
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    resource: Arc<Resource>,
    range: Option<Range<u64>>,
}

impl ResourceLocator {
    /// Locator for the whole resource.
    pub fn whole(resource: Arc<Resource>) -> Self {
        Self {
            resource,
            range: None,
        }
    }

    /// Locator for `range` bytes of a containing linear buffer.
    pub fn sub_range(resource: Arc<Resource>, range: Range<u64>) -> Result<Self, UploadError> {
        let size = resource.desc().linear_buffer_desc()?.size_in_bytes as u64;
        if range.start > range.end || range.end > size {
            return Err(UploadError::InvalidParameter(format!(
                "locator range {}..{} exceeds container of {size} bytes",
                range.start, range.end
            )));
        }
        Ok(Self {
            resource,
            range: Some(range),
        })
    }

    /// True when the locator covers the entire resource.
    pub fn is_whole_resource(&self) -> bool {
        self.range.is_none()
    }

    /// The containing resource.
    pub fn containing_resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Byte range within the containing resource, `None` for a whole resource.
    pub fn range_in_containing_resource(&self) -> Option<Range<u64>> {
        self.range.clone()
    }

    /// Offset of the locator within the containing resource.
    pub fn offset(&self) -> u64 {
        self.range.as_ref().map_or(0, |r| r.start)
    }

    /// Size of the located bytes.
    pub fn size(&self) -> u64 {
        match &self.range {
            Some(range) => range.end - range.start,
            None => self.resource.desc().byte_count(),
        }
    }

    /// Fail unless the locator is a whole resource.
    pub(crate) fn require_whole(&self, what: &str) -> Result<&Arc<Resource>, UploadError> {
        if self.is_whole_resource() {
            Ok(&self.resource)
        } else {
            log::error!(
                "{what} refers to a sub-range of resource {:?}",
                self.resource.label()
            );
            Err(UploadError::NotWholeResource(what.to_string()))
        }
    }
}

impl From<Arc<Resource>> for ResourceLocator {
    fn from(resource: Arc<Resource>) -> Self {
        Self::whole(resource)
    }
}

static_assertions::assert_impl_all!(Resource: Send, Sync);
static_assertions::assert_impl_all!(ResourceLocator: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuDevice;
    use crate::backend::dummy::DummyDevice;
    use crate::types::{BindFlags, TextureDesc, TextureFormat};

    #[test]
    fn test_sub_range_locator() {
        let device = DummyDevice::new();
        let buffer = device
            .create_resource(&ResourceDesc::linear_buffer(128, BindFlags::VERTEX_BUFFER), None)
            .unwrap();

        let locator = ResourceLocator::sub_range(buffer.clone(), 32..96).unwrap();
        assert!(!locator.is_whole_resource());
        assert_eq!(locator.offset(), 32);
        assert_eq!(locator.size(), 64);
        assert!(locator.require_whole("test").is_err());

        let whole = ResourceLocator::from(buffer.clone());
        assert_eq!(whole.size(), 128);
        assert_eq!(whole.require_whole("test").unwrap().id(), buffer.id());

        assert!(ResourceLocator::sub_range(buffer, 64..256).is_err());
    }

    #[test]
    fn test_sub_range_of_texture_rejected() {
        let device = DummyDevice::new();
        let texture = device
            .create_resource(
                &ResourceDesc::texture(
                    TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm),
                    BindFlags::SHADER_RESOURCE,
                ),
                None,
            )
            .unwrap();
        assert!(matches!(
            ResourceLocator::sub_range(texture, 0..4),
            Err(UploadError::InvalidResourceKind { .. })
        ));
    }
}
