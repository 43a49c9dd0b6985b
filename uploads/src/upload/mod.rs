//! Writing CPU data into GPU resources.
//!
//! [`ResourceUploadHelper`] wraps one device context and performs the actual
//! map, copy and transition calls. [`calculate_partial_staging_desc`] sizes
//! the staging texture for a partial update and records how it maps back onto
//! the final texture.

mod copy;
mod helper;
mod staging;

pub use copy::{CopyExtent, copy_mip_level};
pub use helper::ResourceUploadHelper;
pub use staging::{StagingToFinalMapping, calculate_partial_staging_desc};
