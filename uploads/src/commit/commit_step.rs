use std::sync::Arc;

use crate::backend::GpuContext;
use crate::error::UploadError;
use crate::resources::{Resource, ResourceLocator};
use crate::types::{DefragStep, ResourceDesc};
use crate::upload::ResourceUploadHelper;

/// A buffer write postponed until the committing thread runs it.
#[derive(Debug)]
pub struct DeferredCopy {
    /// Buffer to fill.
    pub destination: ResourceLocator,
    /// Descriptor of the destination.
    pub desc: ResourceDesc,
    /// Bytes written at offset 0 of the destination.
    pub temporary_buffer: Vec<u8>,
}

/// A buffer relocation postponed until after its command list was submitted.
#[derive(Debug)]
pub struct DeferredDefragCopy {
    /// Compacted buffer.
    pub destination: Arc<Resource>,
    /// Buffer being compacted.
    pub source: Arc<Resource>,
    /// Moves to apply, in order.
    pub steps: Vec<DefragStep>,
}

/// Work that must run on the thread owning the immediate context.
///
/// Deferred copies run before the owning command list executes, defrag copies
/// run after it. Both drain on commit, so committing twice does nothing the
/// second time.
#[derive(Debug, Default)]
pub struct CommitStep {
    deferred_copies: Vec<DeferredCopy>,
    deferred_defrag_copies: Vec<DeferredDefragCopy>,
}

impl CommitStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_deferred_copy(&mut self, copy: DeferredCopy) {
        self.deferred_copies.push(copy);
    }

    pub fn add_deferred_defrag_copy(&mut self, copy: DeferredDefragCopy) {
        self.deferred_defrag_copies.push(copy);
    }

    /// Run every deferred copy on `context` in insertion order, then forget them.
    ///
    /// Returns the number of buffer writes issued. On error the failing copy
    /// and everything after it stay pending, so the call can be retried.
    pub fn commit_to_immediate_pre_command_list(
        &mut self,
        context: &dyn GpuContext,
    ) -> Result<usize, UploadError> {
        if self.deferred_copies.is_empty() {
            return Ok(0);
        }
        let helper = ResourceUploadHelper::new(context);
        drain_applied(&mut self.deferred_copies, |copy| {
            helper
                .write_to_buffer_via_map(&copy.destination, &copy.desc, 0, &copy.temporary_buffer)
                .map(drop)
        })
    }

    /// Run every deferred defrag copy on `context` in insertion order, then forget them.
    ///
    /// Returns the number of resource copies issued. Failures keep the
    /// remaining copies pending like the pre-command-list step does.
    pub fn commit_to_immediate_post_command_list(
        &mut self,
        context: &dyn GpuContext,
    ) -> Result<usize, UploadError> {
        if self.deferred_defrag_copies.is_empty() {
            return Ok(0);
        }
        let helper = ResourceUploadHelper::new(context);
        drain_applied(&mut self.deferred_defrag_copies, |copy| {
            helper.resource_copy_defrag_steps(&copy.destination, &copy.source, &copy.steps)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.deferred_copies.is_empty() && self.deferred_defrag_copies.is_empty()
    }

    /// Number of pending (copy, defrag copy) operations.
    pub fn pending(&self) -> (usize, usize) {
        (self.deferred_copies.len(), self.deferred_defrag_copies.len())
    }

    pub fn swap(&mut self, other: &mut CommitStep) {
        std::mem::swap(self, other);
    }
}

/// Apply `items` front to back, removing each one only once `apply` succeeded.
fn drain_applied<T>(
    items: &mut Vec<T>,
    mut apply: impl FnMut(&T) -> Result<(), UploadError>,
) -> Result<usize, UploadError> {
    let mut applied = 0;
    let result = items.iter().try_for_each(|item| {
        apply(item)?;
        applied += 1;
        Ok(())
    });
    items.drain(..applied);
    result.map(|()| applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuDevice;
    use crate::backend::dummy::DummyDevice;
    use crate::resources::BasicDataPacket;
    use crate::types::{BindFlags, SubResourceId, TextureDesc, TextureFormat};

    fn buffer_desc(size: u32) -> ResourceDesc {
        ResourceDesc::linear_buffer(size, BindFlags::VERTEX_BUFFER)
    }

    #[test]
    fn test_pre_command_list_drains_once() {
        let device = DummyDevice::new();
        let desc = buffer_desc(4);
        let a = device.create_resource(&desc, None).unwrap();
        let b = device.create_resource(&desc, None).unwrap();

        let mut step = CommitStep::new();
        for (res, byte) in [(&a, 1u8), (&b, 2u8)] {
            step.add_deferred_copy(DeferredCopy {
                destination: ResourceLocator::whole(res.clone()),
                desc: desc.clone(),
                temporary_buffer: vec![byte; 4],
            });
        }
        assert!(!step.is_empty());

        let ctx = device.immediate().as_ref();
        assert_eq!(step.commit_to_immediate_pre_command_list(ctx).unwrap(), 2);
        assert_eq!(step.commit_to_immediate_pre_command_list(ctx).unwrap(), 0);
        assert!(step.is_empty());

        let helper = ResourceUploadHelper::new(ctx);
        let read = |r: &Arc<Resource>| helper.read_back(&r.clone().into(), SubResourceId::default()).unwrap();
        assert_eq!(read(&a), vec![1; 4]);
        assert_eq!(read(&b), vec![2; 4]);
    }

    #[test]
    fn test_failed_copy_stays_pending() {
        let device = DummyDevice::new();
        let desc = buffer_desc(4);
        let good = device.create_resource(&desc, None).unwrap();
        let texture = TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm);
        let bad = device
            .create_resource(&ResourceDesc::texture(texture, BindFlags::SHADER_RESOURCE), None)
            .unwrap();

        let mut step = CommitStep::new();
        step.add_deferred_copy(DeferredCopy {
            destination: ResourceLocator::whole(good.clone()),
            desc: desc.clone(),
            temporary_buffer: vec![7; 4],
        });
        step.add_deferred_copy(DeferredCopy {
            destination: ResourceLocator::whole(bad.clone()),
            desc: bad.desc().clone(),
            temporary_buffer: vec![0; 64],
        });
        step.add_deferred_copy(DeferredCopy {
            destination: ResourceLocator::whole(good.clone()),
            desc: desc.clone(),
            temporary_buffer: vec![9; 4],
        });

        let ctx = device.immediate().as_ref();
        let err = step.commit_to_immediate_pre_command_list(ctx).unwrap_err();
        assert!(matches!(err, UploadError::InvalidResourceKind { .. }));
        // The applied copy is gone; the failing one and its successor remain
        assert_eq!(step.pending(), (2, 0));

        let bytes = ResourceUploadHelper::new(ctx)
            .read_back(&good.into(), SubResourceId::default())
            .unwrap();
        assert_eq!(bytes, vec![7; 4]);
        assert!(step.commit_to_immediate_pre_command_list(ctx).is_err());
        assert_eq!(step.pending(), (2, 0));
    }

    #[test]
    fn test_post_command_list_applies_defrag() {
        let device = DummyDevice::new();
        let desc = buffer_desc(4);
        let source = device
            .create_resource(&desc, Some(&BasicDataPacket::linear(vec![1, 2, 3, 4])))
            .unwrap();
        let destination = device.create_resource(&desc, None).unwrap();

        let mut step = CommitStep::new();
        step.add_deferred_defrag_copy(DeferredDefragCopy {
            destination: destination.clone(),
            source,
            steps: vec![DefragStep {
                source_start: 2,
                source_end: 4,
                destination: 0,
            }],
        });
        assert_eq!(step.pending(), (0, 1));

        let ctx = device.immediate().as_ref();
        assert_eq!(step.commit_to_immediate_pre_command_list(ctx).unwrap(), 0);
        assert_eq!(step.commit_to_immediate_post_command_list(ctx).unwrap(), 1);
        assert_eq!(step.commit_to_immediate_post_command_list(ctx).unwrap(), 0);

        let bytes = ResourceUploadHelper::new(ctx)
            .read_back(&destination.into(), SubResourceId::default())
            .unwrap();
        assert_eq!(bytes, [3, 4, 0, 0]);
    }

    #[test]
    fn test_swap() {
        let device = DummyDevice::new();
        let desc = buffer_desc(4);
        let res = device.create_resource(&desc, None).unwrap();

        let mut a = CommitStep::new();
        a.add_deferred_copy(DeferredCopy {
            destination: res.into(),
            desc,
            temporary_buffer: vec![0; 4],
        });
        let mut b = CommitStep::new();
        a.swap(&mut b);
        assert!(a.is_empty());
        assert_eq!(b.pending(), (1, 0));
    }
}
