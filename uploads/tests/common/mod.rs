//! Common utilities for upload integration tests.
//!
//! Everything here runs on the dummy backend, which keeps resources in CPU
//! memory and logs every command list the immediate context executes.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use rstest::fixture;

use redlilium_uploads::backend::dummy::DummyDevice;
use redlilium_uploads::{
    BindFlags, GpuDevice, Resource, ResourceDesc, ResourceLocator, ResourceUploadHelper,
    SubResourceId, TextureDesc, ThreadContext,
};

/// Route `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Generate a recognizable byte pattern of the given size.
pub fn generate_test_pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Fresh dummy device with logging initialised.
#[fixture]
pub fn test_context() -> TestContext {
    TestContext::new()
}

/// Dummy device plus the resources a test creates on it.
pub struct TestContext {
    pub device: DummyDevice,
}

impl TestContext {
    pub fn new() -> Self {
        init_logging();
        Self {
            device: DummyDevice::new(),
        }
    }

    /// Thread context wrapping a fresh deferred context.
    pub fn background(&self) -> ThreadContext {
        ThreadContext::new(self.device.create_deferred())
    }

    /// Thread context wrapping the immediate context.
    pub fn foreground(&self) -> ThreadContext {
        ThreadContext::new(self.device.immediate().clone())
    }

    pub fn create_buffer(&self, size: u32) -> Arc<Resource> {
        self.device
            .create_resource(
                &ResourceDesc::linear_buffer(size, BindFlags::VERTEX_BUFFER).with_label("test buffer"),
                None,
            )
            .unwrap()
    }

    pub fn create_texture(&self, desc: TextureDesc) -> Arc<Resource> {
        self.device
            .create_resource(
                &ResourceDesc::texture(desc, BindFlags::SHADER_RESOURCE).with_label("test texture"),
                None,
            )
            .unwrap()
    }

    /// Current bytes of a buffer or texture sub-resource.
    pub fn read(&self, resource: &Arc<Resource>, sub: SubResourceId) -> Vec<u8> {
        ResourceUploadHelper::new(self.device.immediate().as_ref())
            .read_back(&ResourceLocator::whole(resource.clone()), sub)
            .unwrap()
    }

    /// Commit `context` until `id` is committed or the deadline passes.
    pub fn commit_until(&self, context: &ThreadContext, id: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while context.command_list_id_committed_to_immediate() < id {
            if Instant::now() > deadline {
                return false;
            }
            context
                .commit_to_immediate(self.device.immediate().as_ref(), None)
                .unwrap();
            std::thread::yield_now();
        }
        true
    }
}
