//! wgpu GPU backend implementation.
//!
//! This backend uses wgpu for cross-platform GPU access, supporting
//! Vulkan, Metal, DX12, and WebGPU.
//!
//! wgpu has no CPU-visible maps of device-local memory, so "map for write"
//! fills a CPU buffer and uploads it: through `Queue::write_buffer` /
//! `Queue::write_texture` on the immediate context, through a staging buffer
//! copy recorded into the command encoder on deferred contexts. Resource
//! states are tracked by wgpu itself, which makes `capture_for_bind` a no-op.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use crate::error::UploadError;
use crate::resources::{DataPacket, Resource};
use crate::types::{
    BindFlags, ResourceDesc, ResourceKind, SubResourceId, TextureDesc, TextureDimension,
    TextureFormat, TexturePitches,
};
use crate::upload::{CopyExtent, copy_mip_level};

use super::{
    ContextKind, CopyDestination, CopySource, DeviceCommandList, GpuContext, GpuDevice,
    GpuResource, MapTarget, MapWriteFn,
};

struct WgpuShared {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
    frame_id: AtomicU64,
    completed_marker: Arc<AtomicU64>,
}

impl WgpuShared {
    fn check_lost(&self) -> Result<(), UploadError> {
        if self.lost.load(Ordering::Acquire) {
            Err(UploadError::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&dyn DataPacket>,
    ) -> Result<Arc<Resource>, UploadError> {
        self.check_lost()?;
        let gpu = match &desc.kind {
            ResourceKind::LinearBuffer(buffer) => {
                let size = (buffer.size_in_bytes as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
                let gpu_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: desc.label.as_deref(),
                    size,
                    usage: convert_buffer_usage(desc.bind_flags),
                    mapped_at_creation: false,
                });
                if let Some(packet) = initial_data {
                    let data = packet.data(SubResourceId::default());
                    let len = data.len().min(buffer.size_in_bytes as usize);
                    write_buffer_padded(&self.queue, &gpu_buffer, 0, &data[..len]);
                }
                GpuResource::WgpuBuffer(gpu_buffer)
            }
            ResourceKind::Texture(tex) => {
                let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                    label: desc.label.as_deref(),
                    size: texture_size(tex),
                    mip_level_count: tex.level_count(),
                    sample_count: tex.samples.max(1),
                    dimension: convert_dimension(tex.dimension),
                    format: convert_texture_format(tex.format),
                    usage: convert_texture_usage(desc.bind_flags),
                    view_formats: &[],
                });
                if let Some(packet) = initial_data {
                    for array_layer in 0..tex.layer_count() {
                        for mip in 0..tex.level_count() {
                            let sub = SubResourceId::new(mip, array_layer);
                            let data = packet.data(sub);
                            if data.is_empty() {
                                continue;
                            }
                            let tight = repack(tex, mip, data, packet.pitches(sub));
                            write_sub_resource(&self.queue, &texture, tex, sub, &tight);
                        }
                    }
                }
                GpuResource::WgpuTexture(texture)
            }
        };
        log::trace!("wgpu: created {} {:?}", desc.kind.name(), desc.label);
        Ok(Resource::new(desc.clone(), gpu))
    }
}

/// wgpu-backed device.
pub struct WgpuDevice {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    shared: Arc<WgpuShared>,
    immediate: Arc<WgpuContext>,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("adapter", &self.adapter.get_info().name)
            .finish()
    }
}

impl WgpuDevice {
    /// Create a new wgpu device on the best available adapter.
    pub fn new() -> Result<Self, UploadError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| UploadError::Backend(format!("No compatible GPU adapter: {e}")))?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        // Block-compressed uploads need BC support; request it when the adapter has it
        let required_features = adapter.features() & wgpu::Features::TEXTURE_COMPRESSION_BC;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("RedLilium Upload Device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| UploadError::Backend(format!("Device creation failed: {e}")))?;

        let lost = Arc::new(AtomicBool::new(false));
        {
            let lost = lost.clone();
            device.set_device_lost_callback(move |reason, message| {
                log::error!("wgpu device lost ({reason:?}): {message}");
                lost.store(true, Ordering::Release);
            });
        }

        let shared = Arc::new(WgpuShared {
            device,
            queue,
            lost,
            frame_id: AtomicU64::new(0),
            completed_marker: Arc::new(AtomicU64::new(0)),
        });
        let immediate = Arc::new(WgpuContext::new(shared.clone(), ContextKind::Immediate));
        Ok(Self {
            instance,
            adapter,
            shared,
            immediate,
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.shared.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.shared.queue
    }

    /// Start a new frame.
    pub fn advance_frame(&self) -> u64 {
        self.shared.frame_id.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl GpuDevice for WgpuDevice {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn immediate_context(&self) -> Arc<dyn GpuContext> {
        self.immediate.clone()
    }

    fn create_deferred_context(&self) -> Result<Arc<dyn GpuContext>, UploadError> {
        self.shared.check_lost()?;
        Ok(Arc::new(WgpuContext::new(self.shared.clone(), ContextKind::Deferred)))
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&dyn DataPacket>,
    ) -> Result<Arc<Resource>, UploadError> {
        self.shared.create_resource(desc, initial_data)
    }
}

/// Immediate or deferred wgpu context.
pub struct WgpuContext {
    shared: Arc<WgpuShared>,
    kind: ContextKind,
    encoder: Mutex<Option<wgpu::CommandEncoder>>,
}

impl std::fmt::Debug for WgpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuContext")
            .field("kind", &self.kind)
            .field("recording", &self.encoder.lock().is_some())
            .finish()
    }
}

impl WgpuContext {
    fn new(shared: Arc<WgpuShared>, kind: ContextKind) -> Self {
        Self {
            shared,
            kind,
            encoder: Mutex::new(None),
        }
    }

    fn create_encoder(&self) -> wgpu::CommandEncoder {
        self.shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Upload Encoder"),
            })
    }

    /// Record with the open encoder (deferred) or a one-shot submission (immediate).
    fn encode(&self, record: impl FnOnce(&mut wgpu::CommandEncoder)) -> Result<(), UploadError> {
        self.shared.check_lost()?;
        match self.kind {
            ContextKind::Deferred => {
                let mut encoder = self.encoder.lock();
                record(encoder.get_or_insert_with(|| self.create_encoder()));
            }
            ContextKind::Immediate => {
                let mut encoder = self.create_encoder();
                record(&mut encoder);
                self.shared.queue.submit(std::iter::once(encoder.finish()));
            }
        }
        Ok(())
    }

    fn upload_buffer(&self, buffer: &wgpu::Buffer, offset: u64, bytes: &[u8]) -> Result<(), UploadError> {
        check_buffer_alignment(offset, bytes.len() as u64)?;
        if bytes.is_empty() {
            return Ok(());
        }
        match self.kind {
            ContextKind::Immediate => {
                self.shared.check_lost()?;
                self.shared.queue.write_buffer(buffer, offset, bytes);
                Ok(())
            }
            ContextKind::Deferred => {
                let staging = self.staging_buffer(bytes);
                self.encode(|encoder| {
                    encoder.copy_buffer_to_buffer(&staging, 0, buffer, offset, bytes.len() as u64);
                })
            }
        }
    }

    fn upload_sub_resource(
        &self,
        texture: &wgpu::Texture,
        tex: &TextureDesc,
        sub: SubResourceId,
        tight: &[u8],
    ) -> Result<(), UploadError> {
        match self.kind {
            ContextKind::Immediate => {
                self.shared.check_lost()?;
                write_sub_resource(&self.shared.queue, texture, tex, sub, tight);
                Ok(())
            }
            ContextKind::Deferred => {
                let (aligned, row_pitch) = align_rows(tex, sub.mip, tight);
                let staging = self.staging_buffer(&aligned);
                let rows = tex.format.blocks_high(tex.mip_size(sub.mip).1);
                self.encode(|encoder| {
                    encoder.copy_buffer_to_texture(
                        wgpu::TexelCopyBufferInfo {
                            buffer: &staging,
                            layout: wgpu::TexelCopyBufferLayout {
                                offset: 0,
                                bytes_per_row: Some(row_pitch),
                                rows_per_image: Some(rows),
                            },
                        },
                        texture_copy_info(texture, tex, sub, [0, 0]),
                        mip_copy_extent(tex, sub.mip),
                    );
                })
            }
        }
    }

    fn staging_buffer(&self, contents: &[u8]) -> wgpu::Buffer {
        self.shared
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Upload Staging Buffer"),
                contents,
                usage: wgpu::BufferUsages::COPY_SRC,
            })
    }

    fn read_buffer_range(&self, buffer: &wgpu::Buffer, range: Range<u64>) -> Result<Vec<u8>, UploadError> {
        let start = range.start - range.start % wgpu::COPY_BUFFER_ALIGNMENT;
        let end = range.end.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT).min(buffer.size());
        let readback = self.readback_buffer(end - start);

        let mut encoder = self.create_encoder();
        encoder.copy_buffer_to_buffer(buffer, start, &readback, 0, end - start);
        let bytes = self.finish_readback(encoder, &readback)?;
        let skip = (range.start - start) as usize;
        Ok(bytes[skip..skip + (range.end - range.start) as usize].to_vec())
    }

    fn read_sub_resource(
        &self,
        texture: &wgpu::Texture,
        tex: &TextureDesc,
        sub: SubResourceId,
    ) -> Result<Vec<u8>, UploadError> {
        let pitches = tex.pitches(sub.mip);
        let rows = tex.format.blocks_high(tex.mip_size(sub.mip).1);
        let depth = tex.mip_size(sub.mip).2.max(1);
        let aligned_row = pitches
            .row_pitch
            .next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = self.readback_buffer(aligned_row as u64 * rows as u64 * depth as u64);

        let mut encoder = self.create_encoder();
        encoder.copy_texture_to_buffer(
            texture_copy_info(texture, tex, sub, [0, 0]),
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_row),
                    rows_per_image: Some(rows),
                },
            },
            mip_copy_extent(tex, sub.mip),
        );
        let padded = self.finish_readback(encoder, &readback)?;

        let mut tight = vec![0u8; pitches.array_pitch as usize];
        let padded_pitches = TexturePitches {
            row_pitch: aligned_row,
            slice_pitch: aligned_row * rows,
            array_pitch: aligned_row * rows * depth,
        };
        copy_mip_level(
            &mut tight,
            pitches,
            [0, 0],
            &padded,
            padded_pitches,
            CopyExtent::for_mip(tex, sub.mip, Default::default()),
            tex.format,
        );
        Ok(tight)
    }

    fn readback_buffer(&self, size: u64) -> wgpu::Buffer {
        self.shared.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Read Staging Buffer"),
            size: size.max(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        })
    }

    fn finish_readback(
        &self,
        encoder: wgpu::CommandEncoder,
        readback: &wgpu::Buffer,
    ) -> Result<Vec<u8>, UploadError> {
        let index = self.shared.queue.submit(std::iter::once(encoder.finish()));
        let _ = self.shared.device.poll(wgpu::PollType::Wait {
            submission_index: Some(index),
            timeout: Some(std::time::Duration::from_secs(10)),
        });

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.shared.device.poll(wgpu::PollType::wait_indefinitely());

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(UploadError::MapFailed(e.to_string())),
            Err(e) => return Err(UploadError::MapFailed(e.to_string())),
        }
        let data = slice.get_mapped_range().to_vec();
        readback.unmap();
        Ok(data)
    }
}

impl GpuContext for WgpuContext {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn kind(&self) -> ContextKind {
        self.kind
    }

    fn frame_id(&self) -> u64 {
        self.shared.frame_id.load(Ordering::Acquire)
    }

    fn begin_command_list(&self) {
        if self.kind == ContextKind::Deferred {
            let mut encoder = self.encoder.lock();
            if encoder.is_none() {
                *encoder = Some(self.create_encoder());
            }
        }
    }

    fn resolve_command_list(&self) -> Result<DeviceCommandList, UploadError> {
        self.shared.check_lost()?;
        if self.kind == ContextKind::Immediate {
            return Err(UploadError::InvalidParameter(
                "the immediate context executes directly and cannot resolve command lists"
                    .to_string(),
            ));
        }
        let encoder = self
            .encoder
            .lock()
            .take()
            .unwrap_or_else(|| self.create_encoder());
        Ok(DeviceCommandList::Wgpu(encoder.finish()))
    }

    fn execute_command_list(
        &self,
        list: DeviceCommandList,
        _preserve_state: bool,
    ) -> Result<(), UploadError> {
        self.shared.check_lost()?;
        if self.kind != ContextKind::Immediate {
            return Err(UploadError::InvalidParameter(
                "command lists can only be executed on the immediate context".to_string(),
            ));
        }
        match list {
            DeviceCommandList::Wgpu(command_buffer) => {
                self.shared.queue.submit(std::iter::once(command_buffer));
                Ok(())
            }
            DeviceCommandList::Dummy(_) => Err(UploadError::Backend(
                "dummy command list passed to the wgpu backend".to_string(),
            )),
        }
    }

    fn supports_sub_resource_map(&self) -> bool {
        true
    }

    fn map_write(
        &self,
        resource: &Resource,
        target: MapTarget,
        write: &mut MapWriteFn<'_>,
    ) -> Result<usize, UploadError> {
        self.shared.check_lost()?;
        match (resource.gpu_handle(), &resource.desc().kind, target) {
            (GpuResource::WgpuBuffer(buffer), ResourceKind::LinearBuffer(desc), target) => {
                let range = match target {
                    MapTarget::Range(range) => range,
                    _ => 0..desc.size_in_bytes as u64,
                };
                if range.start > range.end || range.end > desc.size_in_bytes as u64 {
                    return Err(UploadError::InvalidParameter(format!(
                        "range {}..{} exceeds buffer of {} bytes",
                        range.start, range.end, desc.size_in_bytes
                    )));
                }
                let mut bytes = vec![0u8; (range.end - range.start) as usize];
                let written = write(&mut bytes, TexturePitches::linear(bytes.len() as u32));
                self.upload_buffer(buffer, range.start, &bytes)?;
                Ok(written)
            }
            (GpuResource::WgpuTexture(texture), ResourceKind::Texture(tex), MapTarget::SubResource(sub)) => {
                let pitches = tex.pitches(sub.mip);
                let mut bytes = vec![0u8; pitches.array_pitch as usize];
                let written = write(&mut bytes, pitches);
                self.upload_sub_resource(texture, tex, sub, &bytes)?;
                Ok(written)
            }
            (GpuResource::WgpuTexture(texture), ResourceKind::Texture(tex), MapTarget::Whole) => {
                let total = tex.byte_count() as usize;
                let mut bytes = vec![0u8; total];
                let written = write(&mut bytes, tex.pitches(0));
                let mut offset = 0usize;
                for array_layer in 0..tex.layer_count() {
                    for mip in 0..tex.level_count() {
                        let size = tex.pitches(mip).array_pitch as usize;
                        let sub = SubResourceId::new(mip, array_layer);
                        self.upload_sub_resource(texture, tex, sub, &bytes[offset..offset + size])?;
                        offset += size;
                    }
                }
                Ok(written)
            }
            (_, kind, target) => Err(UploadError::Unsupported(format!(
                "cannot map {target:?} of a {}",
                kind.name()
            ))),
        }
    }

    fn read_back(&self, resource: &Resource, target: MapTarget) -> Result<Vec<u8>, UploadError> {
        self.shared.check_lost()?;
        match (resource.gpu_handle(), &resource.desc().kind, target) {
            (GpuResource::WgpuBuffer(buffer), ResourceKind::LinearBuffer(desc), target) => {
                let range = match target {
                    MapTarget::Range(range) => range,
                    _ => 0..desc.size_in_bytes as u64,
                };
                self.read_buffer_range(buffer, range)
            }
            (GpuResource::WgpuTexture(texture), ResourceKind::Texture(tex), MapTarget::SubResource(sub)) => {
                self.read_sub_resource(texture, tex, sub)
            }
            (GpuResource::WgpuTexture(texture), ResourceKind::Texture(tex), MapTarget::Whole) => {
                let mut bytes = Vec::with_capacity(tex.byte_count() as usize);
                for array_layer in 0..tex.layer_count() {
                    for mip in 0..tex.level_count() {
                        bytes.extend(self.read_sub_resource(texture, tex, SubResourceId::new(mip, array_layer))?);
                    }
                }
                Ok(bytes)
            }
            (_, kind, target) => Err(UploadError::Unsupported(format!(
                "cannot read back {target:?} of a {}",
                kind.name()
            ))),
        }
    }

    fn copy_resource(&self, dst: &Resource, src: &Resource) -> Result<(), UploadError> {
        match (dst.gpu_handle(), src.gpu_handle()) {
            (GpuResource::WgpuBuffer(dst_buffer), GpuResource::WgpuBuffer(src_buffer)) => {
                let size = dst_buffer.size().min(src_buffer.size());
                self.encode(|encoder| encoder.copy_buffer_to_buffer(src_buffer, 0, dst_buffer, 0, size))
            }
            (GpuResource::WgpuTexture(dst_texture), GpuResource::WgpuTexture(src_texture)) => {
                let tex = dst.desc().texture_desc()?;
                self.encode(|encoder| {
                    for mip in 0..tex.level_count() {
                        let mut extent = mip_copy_extent(tex, mip);
                        extent.depth_or_array_layers = match tex.dimension {
                            TextureDimension::Tex3D => extent.depth_or_array_layers,
                            _ => tex.layer_count(),
                        };
                        encoder.copy_texture_to_texture(
                            texture_copy_info(src_texture, tex, SubResourceId::new(mip, 0), [0, 0]),
                            texture_copy_info(dst_texture, tex, SubResourceId::new(mip, 0), [0, 0]),
                            extent,
                        );
                    }
                })
            }
            _ => Err(UploadError::InvalidParameter(
                "copy_resource requires two buffers or two textures".to_string(),
            )),
        }
    }

    fn copy_partial(
        &self,
        dst: CopyDestination<'_>,
        src: CopySource<'_>,
    ) -> Result<(), UploadError> {
        let (GpuResource::WgpuTexture(dst_texture), GpuResource::WgpuTexture(src_texture)) =
            (dst.resource.gpu_handle(), src.resource.gpu_handle())
        else {
            return Err(UploadError::InvalidParameter(
                "copy_partial requires two textures".to_string(),
            ));
        };
        let dst_tex = dst.resource.desc().texture_desc()?;
        let src_tex = src.resource.desc().texture_desc()?;

        let (src_width, src_height, src_depth) = src_tex.mip_size(src.sub_resource.mip);
        let (dst_width, dst_height, _) = dst_tex.mip_size(dst.sub_resource.mip);
        let (left, top, width, height) = if src.box2d.is_empty() {
            (0, 0, src_width, src_height)
        } else {
            (
                src.box2d.left,
                src.box2d.top,
                src.box2d.right.min(src_width).saturating_sub(src.box2d.left),
                src.box2d.bottom.min(src_height).saturating_sub(src.box2d.top),
            )
        };
        let width = width.min(dst_width.saturating_sub(dst.origin[0]));
        let height = height.min(dst_height.saturating_sub(dst.origin[1]));
        if width == 0 || height == 0 {
            return Ok(());
        }

        self.encode(|encoder| {
            encoder.copy_texture_to_texture(
                texture_copy_info(src_texture, src_tex, src.sub_resource, [left, top]),
                texture_copy_info(dst_texture, dst_tex, dst.sub_resource, dst.origin),
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: match src_tex.dimension {
                        TextureDimension::Tex3D => src_depth,
                        _ => 1,
                    },
                },
            );
        })
    }

    fn copy_buffer_region(
        &self,
        dst: &Resource,
        dst_offset: u64,
        src: &Resource,
        src_range: Range<u64>,
    ) -> Result<(), UploadError> {
        let (GpuResource::WgpuBuffer(dst_buffer), GpuResource::WgpuBuffer(src_buffer)) =
            (dst.gpu_handle(), src.gpu_handle())
        else {
            return Err(UploadError::InvalidParameter(
                "copy_buffer_region requires two buffers".to_string(),
            ));
        };
        let size = src_range.end.saturating_sub(src_range.start);
        check_buffer_alignment(src_range.start, size)?;
        check_buffer_alignment(dst_offset, size)?;
        self.encode(|encoder| {
            encoder.copy_buffer_to_buffer(src_buffer, src_range.start, dst_buffer, dst_offset, size);
        })
    }

    fn capture_for_bind(&self, resource: &Resource, usage: BindFlags) {
        log::trace!("wgpu: {:?} used as {usage:?} (tracked by wgpu)", resource.label());
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&dyn DataPacket>,
    ) -> Result<Arc<Resource>, UploadError> {
        self.shared.create_resource(desc, initial_data)
    }

    fn signal_marker(&self, marker: u64) {
        let completed = self.shared.completed_marker.clone();
        self.shared.queue.on_submitted_work_done(move || {
            completed.fetch_max(marker, Ordering::AcqRel);
        });
    }

    fn completed_marker(&self) -> u64 {
        let _ = self.shared.device.poll(wgpu::PollType::Poll);
        self.shared.completed_marker.load(Ordering::Acquire)
    }
}

static_assertions::assert_impl_all!(WgpuDevice: Send, Sync);
static_assertions::assert_impl_all!(WgpuContext: Send, Sync);

// ============================================================================
// Helpers
// ============================================================================

fn check_buffer_alignment(offset: u64, size: u64) -> Result<(), UploadError> {
    if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || size % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(UploadError::Unsupported(format!(
            "wgpu buffer copies need {}-byte alignment (offset {offset}, size {size})",
            wgpu::COPY_BUFFER_ALIGNMENT
        )));
    }
    Ok(())
}

fn write_buffer_padded(queue: &wgpu::Queue, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
    let padded_len = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize;
    if padded_len == data.len() {
        queue.write_buffer(buffer, offset, data);
    } else {
        let mut padded = data.to_vec();
        padded.resize(padded_len, 0);
        queue.write_buffer(buffer, offset, &padded);
    }
}

/// Tightly packed copy of `data`, whatever its source pitches.
fn repack(tex: &TextureDesc, mip: u32, data: &[u8], pitches: TexturePitches) -> Vec<u8> {
    let tight = tex.pitches(mip);
    if pitches == tight {
        return data.to_vec();
    }
    let mut out = vec![0u8; tight.array_pitch as usize];
    copy_mip_level(
        &mut out,
        tight,
        [0, 0],
        data,
        pitches,
        CopyExtent::for_mip(tex, mip, Default::default()),
        tex.format,
    );
    out
}

/// Rows padded to `COPY_BYTES_PER_ROW_ALIGNMENT`, with the padded row pitch.
fn align_rows(tex: &TextureDesc, mip: u32, tight: &[u8]) -> (Vec<u8>, u32) {
    let pitches = tex.pitches(mip);
    let aligned_row = pitches
        .row_pitch
        .next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    if aligned_row == pitches.row_pitch {
        return (tight.to_vec(), aligned_row);
    }
    let rows = pitches.slice_pitch / pitches.row_pitch.max(1);
    let depth = tex.mip_size(mip).2.max(1);
    let aligned = TexturePitches {
        row_pitch: aligned_row,
        slice_pitch: aligned_row * rows,
        array_pitch: aligned_row * rows * depth,
    };
    let mut out = vec![0u8; aligned.array_pitch as usize];
    copy_mip_level(
        &mut out,
        aligned,
        [0, 0],
        tight,
        pitches,
        CopyExtent::for_mip(tex, mip, Default::default()),
        tex.format,
    );
    (out, aligned_row)
}

fn write_sub_resource(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    tex: &TextureDesc,
    sub: SubResourceId,
    tight: &[u8],
) {
    let pitches = tex.pitches(sub.mip);
    queue.write_texture(
        texture_copy_info(texture, tex, sub, [0, 0]),
        tight,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(pitches.row_pitch),
            rows_per_image: Some(tex.format.blocks_high(tex.mip_size(sub.mip).1)),
        },
        mip_copy_extent(tex, sub.mip),
    );
}

fn texture_copy_info<'a>(
    texture: &'a wgpu::Texture,
    tex: &TextureDesc,
    sub: SubResourceId,
    origin: [u32; 2],
) -> wgpu::TexelCopyTextureInfo<'a> {
    wgpu::TexelCopyTextureInfo {
        texture,
        mip_level: sub.mip,
        origin: wgpu::Origin3d {
            x: origin[0],
            y: origin[1],
            z: match tex.dimension {
                TextureDimension::Tex3D => 0,
                _ => sub.array_layer,
            },
        },
        aspect: wgpu::TextureAspect::All,
    }
}

/// Copy extent of one sub-resource, rounded up to whole blocks.
fn mip_copy_extent(tex: &TextureDesc, mip: u32) -> wgpu::Extent3d {
    let (width, height, depth) = tex.mip_size(mip);
    let block = tex.format.block_dimension();
    wgpu::Extent3d {
        width: width.next_multiple_of(block),
        height: height.next_multiple_of(block),
        depth_or_array_layers: match tex.dimension {
            TextureDimension::Tex3D => depth,
            _ => 1,
        },
    }
}

fn texture_size(tex: &TextureDesc) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: tex.width,
        height: tex.height,
        depth_or_array_layers: match tex.dimension {
            TextureDimension::Tex3D => tex.depth.max(1),
            _ => tex.layer_count(),
        },
    }
}

fn convert_dimension(dimension: TextureDimension) -> wgpu::TextureDimension {
    match dimension {
        TextureDimension::Tex1D => wgpu::TextureDimension::D1,
        TextureDimension::Tex2D | TextureDimension::CubeMap => wgpu::TextureDimension::D2,
        TextureDimension::Tex3D => wgpu::TextureDimension::D3,
    }
}

fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::R8Uint => wgpu::TextureFormat::R8Uint,
        TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
        TextureFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::R32Uint => wgpu::TextureFormat::R32Uint,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Bc1RgbaUnorm => wgpu::TextureFormat::Bc1RgbaUnorm,
        TextureFormat::Bc2RgbaUnorm => wgpu::TextureFormat::Bc2RgbaUnorm,
        TextureFormat::Bc3RgbaUnorm => wgpu::TextureFormat::Bc3RgbaUnorm,
        TextureFormat::Bc4RUnorm => wgpu::TextureFormat::Bc4RUnorm,
        TextureFormat::Bc5RgUnorm => wgpu::TextureFormat::Bc5RgUnorm,
        TextureFormat::Bc6hRgbUfloat => wgpu::TextureFormat::Bc6hRgbUfloat,
        TextureFormat::Bc7RgbaUnorm => wgpu::TextureFormat::Bc7RgbaUnorm,
    }
}

fn convert_buffer_usage(bind_flags: BindFlags) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;
    if bind_flags.contains(BindFlags::VERTEX_BUFFER) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if bind_flags.contains(BindFlags::INDEX_BUFFER) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if bind_flags.contains(BindFlags::CONSTANT_BUFFER) {
        result |= wgpu::BufferUsages::UNIFORM;
    }
    if bind_flags.intersects(BindFlags::SHADER_RESOURCE | BindFlags::UNORDERED_ACCESS) {
        result |= wgpu::BufferUsages::STORAGE;
    }
    result
}

fn convert_texture_usage(bind_flags: BindFlags) -> wgpu::TextureUsages {
    let mut result = wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
    if bind_flags.contains(BindFlags::SHADER_RESOURCE) {
        result |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if bind_flags.contains(BindFlags::UNORDERED_ACCESS) {
        result |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if bind_flags.intersects(BindFlags::RENDER_TARGET | BindFlags::DEPTH_STENCIL) {
        result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    result
}
