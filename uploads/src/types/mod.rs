//! Descriptors and addressing types for uploadable resources.
//!
//! This module contains format enums, access flags, resource descriptors,
//! sub-resource regions and defrag steps used throughout the upload system.

mod defrag;
mod desc;
mod format;
mod region;

pub use defrag::{DefragStep, calculate_defrag_steps, resolve_offset};
pub use desc::{
    AllocationRules, BindFlags, CpuAccess, GpuAccess, LinearBufferDesc, ResourceDesc,
    ResourceKind, TextureDesc, TextureDimension,
};
pub use format::{TexturePitches, TextureFormat, mip_extent, texture_data_size};
pub use region::{Box2D, PartialResource, SubResourceId};
