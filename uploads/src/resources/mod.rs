//! Resource handles, locators and CPU-side source data.

mod data_packet;
mod resource;

pub use data_packet::{BasicDataPacket, DataPacket};
pub use resource::{Resource, ResourceLocator};
