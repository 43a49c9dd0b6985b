//! # RedLilium Uploads
//!
//! Asynchronous GPU resource uploads for RedLilium.
//!
//! ## Overview
//!
//! Background threads prepare buffer and texture data and record the GPU
//! work into deferred device contexts. One primary thread owns the
//! immediate context and periodically commits what the background threads
//! resolved, strictly in order.
//!
//! This crate provides:
//! - [`ResourceUploadHelper`] - Map, copy and staging primitives over one device context
//! - [`CommitStep`] - Work that must run on the committing thread
//! - [`ThreadContext`] - Command list ids, the resolved-list queue and the commit loop
//! - [`EventList`] - Notifications for clients of relocated (defragmented) buffers
//! - [`backend`] - The device abstraction, with dummy and wgpu implementations
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_uploads::{ResourceUploadHelper, ThreadContext, create_device};
//!
//! let device = create_device()?;
//! let uploads = ThreadContext::new(device.create_deferred_context()?);
//!
//! let helper = ResourceUploadHelper::new(uploads.device_context().as_ref());
//! helper.write_to_buffer_via_map(&locator, &desc, 0, &vertices)?;
//! uploads.resolve_command_list()?;
//!
//! // On the render thread
//! uploads.commit_to_immediate(device.immediate_context().as_ref(), None)?;
//! ```

#[macro_use]
pub mod profiling;

pub mod backend;
pub mod commit;
pub mod context;
pub mod error;
pub mod resources;
pub mod types;
pub mod upload;

// Re-export main types for convenience
pub use backend::{
    ContextKind, DeviceCommandList, GpuContext, GpuDevice, MapTarget, create_device,
    has_gpu_backend,
};
pub use commit::{
    CommandList, CommandListId, CommandListMetrics, CommitProgress, CommitStep, DeferredCopy,
    DeferredDefragCopy,
};
pub use context::{
    EventList, EventListId, EventListRef, FramePriorityQueue, ResourceRepositionEvent,
    ThreadContext, ThreadContextConfig,
};
pub use error::UploadError;
pub use resources::{BasicDataPacket, DataPacket, Resource, ResourceLocator};
pub use types::{
    BindFlags, Box2D, DefragStep, PartialResource, ResourceDesc, SubResourceId, TextureDesc,
    TextureFormat,
};
pub use upload::{ResourceUploadHelper, StagingToFinalMapping, calculate_partial_staging_desc};

/// Uploads library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
