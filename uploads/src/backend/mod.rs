//! GPU device abstraction used by the upload system.
//!
//! The upload core never talks to a graphics API directly. It records work
//! through [`GpuContext`], which covers exactly what uploads need: command
//! list recording, memory-mapped writes, resource-to-resource copies with
//! sub-resource addressing and state transitions.
//!
//! # Available Backends
//!
//! - `dummy` (always available): in-memory backend for tests and tooling. Resources
//!   hold their bytes in CPU memory and deferred contexts replay recorded
//!   commands when the immediate context executes them.
//! - `wgpu-backend`: cross-platform backend using wgpu. Deferred contexts
//!   record into a `CommandEncoder`, the immediate context submits to the
//!   queue.
//!
//! # Contexts
//!
//! Every device has one immediate context, which can execute work, and any
//! number of deferred contexts, which only record. Operations issued on a
//! deferred context take effect when its resolved command list is executed
//! on the immediate context.

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub mod dummy;

use std::ops::Range;
use std::sync::Arc;

use crate::error::UploadError;
use crate::resources::{DataPacket, Resource};
use crate::types::{BindFlags, Box2D, ResourceDesc, SubResourceId, TexturePitches};

/// Backend handle of a resource.
pub enum GpuResource {
    /// Dummy backend memory.
    Dummy(Arc<dummy::DummyMemory>),
    /// wgpu buffer.
    #[cfg(feature = "wgpu-backend")]
    WgpuBuffer(wgpu::Buffer),
    /// wgpu texture.
    #[cfg(feature = "wgpu-backend")]
    WgpuTexture(wgpu::Texture),
}

impl std::fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(memory) => f.debug_tuple("GpuResource::Dummy").field(memory).finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::WgpuBuffer(buffer) => f.debug_tuple("GpuResource::WgpuBuffer").field(buffer).finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::WgpuTexture(texture) => {
                f.debug_tuple("GpuResource::WgpuTexture").field(texture).finish()
            }
        }
    }
}

/// Opaque list of commands recorded on a deferred context.
pub enum DeviceCommandList {
    /// Dummy backend recording.
    Dummy(dummy::DummyCommandList),
    /// Finished wgpu command buffer.
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu::CommandBuffer),
}

impl std::fmt::Debug for DeviceCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(list) => f.debug_tuple("DeviceCommandList::Dummy").field(list).finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(_) => write!(f, "DeviceCommandList::Wgpu"),
        }
    }
}

/// Whether a context submits directly or only records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// The single context that can submit work to the GPU.
    Immediate,
    /// A recording-only context.
    Deferred,
}

/// Which memory a map or readback addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapTarget {
    /// Every sub-resource, packed in (array layer, mip) order.
    Whole,
    /// A single texture sub-resource.
    SubResource(SubResourceId),
    /// A byte range of a linear buffer.
    Range(Range<u64>),
}

/// Source of a partial copy.
#[derive(Debug, Clone, Copy)]
pub struct CopySource<'a> {
    /// Resource to read.
    pub resource: &'a Resource,
    /// Sub-resource to read.
    pub sub_resource: SubResourceId,
    /// Region of the sub-resource, empty for all of it.
    pub box2d: Box2D,
}

/// Destination of a partial copy.
#[derive(Debug, Clone, Copy)]
pub struct CopyDestination<'a> {
    /// Resource to write.
    pub resource: &'a Resource,
    /// Sub-resource to write.
    pub sub_resource: SubResourceId,
    /// Top-left texel the source region lands on.
    pub origin: [u32; 2],
}

/// Callback filling mapped memory; returns the number of bytes written.
pub type MapWriteFn<'a> = dyn FnMut(&mut [u8], TexturePitches) -> usize + 'a;

/// A device that owns resources and hands out contexts.
pub trait GpuDevice: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// The device's immediate context.
    fn immediate_context(&self) -> Arc<dyn GpuContext>;

    /// Create a new recording-only context.
    fn create_deferred_context(&self) -> Result<Arc<dyn GpuContext>, UploadError>;

    /// Create a resource, optionally filled from `initial_data`.
    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&dyn DataPacket>,
    ) -> Result<Arc<Resource>, UploadError>;
}

/// A device context: either the immediate context or a deferred recorder.
pub trait GpuContext: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Whether this context submits or records.
    fn kind(&self) -> ContextKind;

    /// Frame the device is currently producing.
    fn frame_id(&self) -> u64;

    /// Ensure a recording session is open. Idempotent.
    fn begin_command_list(&self);

    /// Close the current recording and return it.
    ///
    /// Deferred contexts only. A fresh recording is begun lazily by the next
    /// command or [`begin_command_list`](Self::begin_command_list).
    fn resolve_command_list(&self) -> Result<DeviceCommandList, UploadError>;

    /// Execute a resolved command list. Immediate context only.
    fn execute_command_list(
        &self,
        list: DeviceCommandList,
        preserve_state: bool,
    ) -> Result<(), UploadError>;

    /// Whether single sub-resources can be mapped, as opposed to whole resources only.
    fn supports_sub_resource_map(&self) -> bool;

    /// Map `target` with write-discard semantics and let `write` fill it.
    fn map_write(
        &self,
        resource: &Resource,
        target: MapTarget,
        write: &mut MapWriteFn<'_>,
    ) -> Result<usize, UploadError>;

    /// Copy the current contents of `target` back to the CPU.
    fn read_back(&self, resource: &Resource, target: MapTarget) -> Result<Vec<u8>, UploadError>;

    /// Copy every sub-resource of `src` into `dst`.
    fn copy_resource(&self, dst: &Resource, src: &Resource) -> Result<(), UploadError>;

    /// Copy a region of one sub-resource into another.
    fn copy_partial(
        &self,
        dst: CopyDestination<'_>,
        src: CopySource<'_>,
    ) -> Result<(), UploadError>;

    /// Copy a byte range between linear buffers.
    fn copy_buffer_region(
        &self,
        dst: &Resource,
        dst_offset: u64,
        src: &Resource,
        src_range: Range<u64>,
    ) -> Result<(), UploadError>;

    /// Transition `resource` so it can be used as `usage`.
    fn capture_for_bind(&self, resource: &Resource, usage: BindFlags);

    /// Create a resource on the owning device.
    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&dyn DataPacket>,
    ) -> Result<Arc<Resource>, UploadError>;

    /// Ask the GPU to report `marker` once all previously executed work completed.
    fn signal_marker(&self, marker: u64);

    /// Highest marker the GPU has reported complete.
    fn completed_marker(&self) -> u64;
}

/// Selects and creates the appropriate device based on available features.
pub fn create_device() -> Result<Arc<dyn GpuDevice>, UploadError> {
    #[cfg(feature = "wgpu-backend")]
    {
        match wgpu_backend::WgpuDevice::new() {
            Ok(device) => {
                log::info!("Using wgpu backend");
                return Ok(Arc::new(device));
            }
            Err(e) => {
                log::warn!("Failed to create wgpu device: {}", e);
            }
        }
    }

    // Fall back to dummy backend
    log::info!("Using dummy backend");
    Ok(Arc::new(dummy::DummyDevice::new()))
}

/// Check if a real GPU backend is available.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}
