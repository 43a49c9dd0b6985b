//! Dummy GPU backend for testing and development.
//!
//! Resources live in CPU memory, one byte vector per sub-resource, so tests
//! can read back exactly what an upload produced. The immediate context
//! applies every operation on the spot; deferred contexts record operations
//! into a [`DummyCommandList`] that is replayed when the immediate context
//! executes it. The immediate context keeps an execution log so tests can
//! verify submission order.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::UploadError;
use crate::resources::{DataPacket, Resource};
use crate::types::{BindFlags, Box2D, ResourceDesc, ResourceKind, SubResourceId, TexturePitches};
use crate::upload::{CopyExtent, copy_mip_level};

use super::{
    ContextKind, CopyDestination, CopySource, DeviceCommandList, GpuContext, GpuDevice,
    GpuResource, MapTarget, MapWriteFn,
};

// ============================================================================
// Memory
// ============================================================================

/// CPU-side storage standing in for a GPU allocation.
pub struct DummyMemory {
    desc: ResourceDesc,
    sub_resources: Mutex<Vec<Vec<u8>>>,
    bind_state: Mutex<BindFlags>,
}

impl std::fmt::Debug for DummyMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyMemory")
            .field("label", &self.desc.label)
            .field("kind", &self.desc.kind.name())
            .finish_non_exhaustive()
    }
}

impl DummyMemory {
    fn new(desc: &ResourceDesc) -> Self {
        let sub_resources = match &desc.kind {
            ResourceKind::LinearBuffer(buffer) => vec![vec![0u8; buffer.size_in_bytes as usize]],
            ResourceKind::Texture(tex) => (0..tex.layer_count())
                .flat_map(|_| (0..tex.level_count()).map(move |mip| tex.pitches(mip).array_pitch))
                .map(|size| vec![0u8; size as usize])
                .collect(),
        };
        Self {
            desc: desc.clone(),
            sub_resources: Mutex::new(sub_resources),
            bind_state: Mutex::new(BindFlags::empty()),
        }
    }

    /// Usage the resource was last transitioned to.
    pub fn bind_state(&self) -> BindFlags {
        *self.bind_state.lock()
    }

    fn sub_index(&self, sub: SubResourceId) -> Result<usize, UploadError> {
        match &self.desc.kind {
            ResourceKind::LinearBuffer(_) if sub == SubResourceId::default() => Ok(0),
            ResourceKind::LinearBuffer(_) => Err(UploadError::InvalidParameter(format!(
                "linear buffer has no sub-resource {sub:?}"
            ))),
            ResourceKind::Texture(tex) => {
                if sub.mip >= tex.level_count() || sub.array_layer >= tex.layer_count() {
                    return Err(UploadError::InvalidParameter(format!(
                        "sub-resource {sub:?} out of range ({} mips, {} layers)",
                        tex.level_count(),
                        tex.layer_count()
                    )));
                }
                Ok((sub.array_layer * tex.level_count() + sub.mip) as usize)
            }
        }
    }

    fn pitches(&self, target: &MapTarget) -> TexturePitches {
        match (&self.desc.kind, target) {
            (ResourceKind::Texture(tex), MapTarget::SubResource(sub)) => tex.pitches(sub.mip),
            (ResourceKind::Texture(tex), _) => tex.pitches(0),
            (_, MapTarget::Range(range)) => TexturePitches::linear((range.end - range.start) as u32),
            (ResourceKind::LinearBuffer(buffer), _) => TexturePitches::linear(buffer.size_in_bytes),
        }
    }

    fn target_size(&self, target: &MapTarget) -> Result<usize, UploadError> {
        let subs = self.sub_resources.lock();
        match target {
            MapTarget::Whole => Ok(subs.iter().map(Vec::len).sum()),
            MapTarget::SubResource(sub) => Ok(subs[self.sub_index(*sub)?].len()),
            MapTarget::Range(range) => {
                let buffer = self.desc.linear_buffer_desc()?;
                if range.start > range.end || range.end > buffer.size_in_bytes as u64 {
                    return Err(UploadError::InvalidParameter(format!(
                        "range {}..{} exceeds buffer of {} bytes",
                        range.start, range.end, buffer.size_in_bytes
                    )));
                }
                Ok((range.end - range.start) as usize)
            }
        }
    }

    /// Copy of the bytes addressed by `target`.
    pub fn contents(&self, target: &MapTarget) -> Result<Vec<u8>, UploadError> {
        self.target_size(target)?;
        let subs = self.sub_resources.lock();
        Ok(match target {
            MapTarget::Whole => subs.concat(),
            MapTarget::SubResource(sub) => subs[self.sub_index(*sub)?].clone(),
            MapTarget::Range(range) => subs[0][range.start as usize..range.end as usize].to_vec(),
        })
    }

    fn write(&self, target: &MapTarget, bytes: &[u8]) -> Result<(), UploadError> {
        self.target_size(target)?;
        let mut subs = self.sub_resources.lock();
        match target {
            MapTarget::Whole => {
                let mut remaining = bytes;
                for sub in subs.iter_mut() {
                    let len = sub.len().min(remaining.len());
                    sub[..len].copy_from_slice(&remaining[..len]);
                    remaining = &remaining[len..];
                }
            }
            MapTarget::SubResource(id) => {
                let sub = &mut subs[self.sub_index(*id)?];
                let len = sub.len().min(bytes.len());
                sub[..len].copy_from_slice(&bytes[..len]);
            }
            MapTarget::Range(range) => {
                let start = range.start as usize;
                let len = ((range.end - range.start) as usize).min(bytes.len());
                subs[0][start..start + len].copy_from_slice(&bytes[..len]);
            }
        }
        Ok(())
    }

    fn copy_all_from(&self, src: &DummyMemory) -> Result<(), UploadError> {
        let snapshot = src.sub_resources.lock().clone();
        let mut subs = self.sub_resources.lock();
        let compatible = snapshot.len() == subs.len()
            && snapshot.iter().zip(subs.iter()).all(|(a, b)| a.len() == b.len());
        if !compatible {
            return Err(UploadError::InvalidParameter(
                "copy_resource requires resources with identical layouts".to_string(),
            ));
        }
        *subs = snapshot;
        Ok(())
    }

    fn copy_partial_from(
        &self,
        dst_sub: SubResourceId,
        origin: [u32; 2],
        src: &DummyMemory,
        src_sub: SubResourceId,
        box2d: Box2D,
    ) -> Result<(), UploadError> {
        let src_tex = src.desc.texture_desc()?;
        let dst_tex = self.desc.texture_desc()?;
        if src_tex.format.block_size() != dst_tex.format.block_size() {
            return Err(UploadError::InvalidParameter(
                "copy_partial between formats of different block size".to_string(),
            ));
        }

        let src_bytes = src.sub_resources.lock()[src.sub_index(src_sub)?].clone();
        let src_pitches = src_tex.pitches(src_sub.mip);
        let (src_w, src_h, src_d) = src_tex.mip_size(src_sub.mip);
        let (left, top, extent) = if box2d.is_empty() {
            (0, 0, CopyExtent { width: src_w, height: src_h, depth: src_d })
        } else {
            let extent = CopyExtent {
                width: box2d.right.min(src_w).saturating_sub(box2d.left),
                height: box2d.bottom.min(src_h).saturating_sub(box2d.top),
                depth: src_d,
            };
            (box2d.left, box2d.top, extent)
        };

        let block = src_tex.format.block_dimension();
        let start = (top / block * src_pitches.row_pitch
            + left / block * src_tex.format.block_size()) as usize;
        let src_region = src_bytes.get(start..).unwrap_or(&[]);

        let index = self.sub_index(dst_sub)?;
        let mut subs = self.sub_resources.lock();
        copy_mip_level(
            &mut subs[index],
            dst_tex.pitches(dst_sub.mip),
            origin,
            src_region,
            src_pitches,
            extent,
            dst_tex.format,
        );
        Ok(())
    }

    fn copy_region_from(
        &self,
        dst_offset: u64,
        src: &DummyMemory,
        src_range: Range<u64>,
    ) -> Result<(), UploadError> {
        let bytes = src.contents(&MapTarget::Range(src_range.clone()))?;
        let dst_range = dst_offset..dst_offset + (src_range.end - src_range.start);
        self.write(&MapTarget::Range(dst_range), &bytes)
    }
}

fn memory_of(resource: &Resource) -> Result<&Arc<DummyMemory>, UploadError> {
    match resource.gpu_handle() {
        GpuResource::Dummy(memory) => Ok(memory),
        #[cfg(feature = "wgpu-backend")]
        _ => Err(UploadError::Backend(format!(
            "resource {:?} does not belong to the dummy backend",
            resource.label()
        ))),
    }
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug)]
enum DummyCommand {
    Write {
        memory: Arc<DummyMemory>,
        target: MapTarget,
        bytes: Vec<u8>,
    },
    CopyResource {
        dst: Arc<DummyMemory>,
        src: Arc<DummyMemory>,
    },
    CopyPartial {
        dst: Arc<DummyMemory>,
        dst_sub: SubResourceId,
        origin: [u32; 2],
        src: Arc<DummyMemory>,
        src_sub: SubResourceId,
        box2d: Box2D,
    },
    CopyBufferRegion {
        dst: Arc<DummyMemory>,
        dst_offset: u64,
        src: Arc<DummyMemory>,
        src_range: Range<u64>,
    },
    Transition {
        memory: Arc<DummyMemory>,
        usage: BindFlags,
    },
}

impl DummyCommand {
    fn apply(&self) -> Result<(), UploadError> {
        match self {
            Self::Write {
                memory,
                target,
                bytes,
            } => memory.write(target, bytes),
            Self::CopyResource { dst, src } => dst.copy_all_from(src),
            Self::CopyPartial {
                dst,
                dst_sub,
                origin,
                src,
                src_sub,
                box2d,
            } => dst.copy_partial_from(*dst_sub, *origin, src, *src_sub, *box2d),
            Self::CopyBufferRegion {
                dst,
                dst_offset,
                src,
                src_range,
            } => dst.copy_region_from(*dst_offset, src, src_range.clone()),
            Self::Transition { memory, usage } => {
                *memory.bind_state.lock() = *usage;
                Ok(())
            }
        }
    }
}

/// Commands recorded by a dummy deferred context.
#[derive(Debug)]
pub struct DummyCommandList {
    context_index: u32,
    serial: u64,
    commands: Vec<DummyCommand>,
}

impl DummyCommandList {
    /// Index of the deferred context that recorded the list.
    pub fn context_index(&self) -> u32 {
        self.context_index
    }

    /// 1-based position of the list among its context's resolved lists.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Number of recorded commands.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// One entry of the immediate context's execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutedList {
    /// Index of the deferred context that recorded the list.
    pub context_index: u32,
    /// Serial of the list within that context.
    pub serial: u64,
    /// Number of commands replayed.
    pub command_count: usize,
}

// ============================================================================
// Device
// ============================================================================

#[derive(Debug)]
struct DummyShared {
    sub_resource_map: bool,
    lost: AtomicBool,
    frame_id: AtomicU64,
    completed_marker: AtomicU64,
    next_context_index: AtomicU32,
    execution_log: Mutex<Vec<ExecutedList>>,
}

impl DummyShared {
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
        log::trace!(
            "DummyDevice: creating {} {:?} ({} bytes)",
            desc.kind.name(),
            desc.label,
            desc.byte_count()
        );
        let memory = DummyMemory::new(desc);
        if let Some(packet) = initial_data {
            let mut subs = memory.sub_resources.lock();
            match &desc.kind {
                ResourceKind::LinearBuffer(_) => {
                    let data = packet.data(SubResourceId::default());
                    let len = data.len().min(subs[0].len());
                    subs[0][..len].copy_from_slice(&data[..len]);
                }
                ResourceKind::Texture(tex) => {
                    for array_layer in 0..tex.layer_count() {
                        for mip in 0..tex.level_count() {
                            let sub = SubResourceId::new(mip, array_layer);
                            let data = packet.data(sub);
                            if data.is_empty() {
                                continue;
                            }
                            let index = (array_layer * tex.level_count() + mip) as usize;
                            copy_mip_level(
                                &mut subs[index],
                                tex.pitches(mip),
                                [0, 0],
                                data,
                                packet.pitches(sub),
                                CopyExtent::for_mip(tex, mip, Box2D::default()),
                                tex.format,
                            );
                        }
                    }
                }
            }
        }
        Ok(Resource::new(desc.clone(), GpuResource::Dummy(Arc::new(memory))))
    }
}

/// In-memory device.
#[derive(Debug)]
pub struct DummyDevice {
    shared: Arc<DummyShared>,
    immediate: Arc<DummyContext>,
}

impl DummyDevice {
    /// Create a device whose contexts can map single sub-resources.
    pub fn new() -> Self {
        Self::with_sub_resource_map(true)
    }

    /// Create a device, choosing whether sub-resource maps are supported.
    ///
    /// Without them, texture writes go through whole-resource maps.
    pub fn with_sub_resource_map(supported: bool) -> Self {
        let shared = Arc::new(DummyShared {
            sub_resource_map: supported,
            lost: AtomicBool::new(false),
            frame_id: AtomicU64::new(0),
            completed_marker: AtomicU64::new(0),
            next_context_index: AtomicU32::new(1),
            execution_log: Mutex::new(Vec::new()),
        });
        let immediate = Arc::new(DummyContext::new(shared.clone(), ContextKind::Immediate, 0));
        Self { shared, immediate }
    }

    /// Immediate context with its concrete type.
    pub fn immediate(&self) -> &Arc<DummyContext> {
        &self.immediate
    }

    /// Create a deferred context with its concrete type.
    pub fn create_deferred(&self) -> Arc<DummyContext> {
        let index = self.shared.next_context_index.fetch_add(1, Ordering::Relaxed);
        Arc::new(DummyContext::new(self.shared.clone(), ContextKind::Deferred, index))
    }

    /// Start a new frame.
    pub fn advance_frame(&self) -> u64 {
        self.shared.frame_id.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Simulate (or clear) device loss; every call fails with `DeviceLost` while set.
    pub fn set_lost(&self, lost: bool) {
        log::info!("DummyDevice: device lost = {lost}");
        self.shared.lost.store(lost, Ordering::Release);
    }

    /// Command lists executed on the immediate context, in order.
    pub fn execution_log(&self) -> Vec<ExecutedList> {
        self.shared.execution_log.lock().clone()
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for DummyDevice {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn immediate_context(&self) -> Arc<dyn GpuContext> {
        self.immediate.clone()
    }

    fn create_deferred_context(&self) -> Result<Arc<dyn GpuContext>, UploadError> {
        self.shared.check_lost()?;
        Ok(self.create_deferred())
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&dyn DataPacket>,
    ) -> Result<Arc<Resource>, UploadError> {
        self.shared.create_resource(desc, initial_data)
    }
}

// ============================================================================
// Context
// ============================================================================

/// Immediate or deferred dummy context.
#[derive(Debug)]
pub struct DummyContext {
    shared: Arc<DummyShared>,
    kind: ContextKind,
    index: u32,
    recording: Mutex<Option<Vec<DummyCommand>>>,
    resolved: AtomicU64,
}

impl DummyContext {
    fn new(shared: Arc<DummyShared>, kind: ContextKind, index: u32) -> Self {
        Self {
            shared,
            kind,
            index,
            recording: Mutex::new(None),
            resolved: AtomicU64::new(0),
        }
    }

    /// Index of this context; 0 is the immediate context.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Number of commands recorded since the last resolve.
    pub fn pending_command_count(&self) -> usize {
        self.recording.lock().as_ref().map_or(0, Vec::len)
    }

    fn submit(&self, command: DummyCommand) -> Result<(), UploadError> {
        self.shared.check_lost()?;
        match self.kind {
            ContextKind::Immediate => {
                log::trace!("DummyContext[{}]: applying {:?}", self.index, command);
                command.apply()
            }
            ContextKind::Deferred => {
                log::trace!("DummyContext[{}]: recording {:?}", self.index, command);
                self.recording.lock().get_or_insert_with(Vec::new).push(command);
                Ok(())
            }
        }
    }
}

impl GpuContext for DummyContext {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn kind(&self) -> ContextKind {
        self.kind
    }

    fn frame_id(&self) -> u64 {
        self.shared.frame_id.load(Ordering::Acquire)
    }

    fn begin_command_list(&self) {
        let mut recording = self.recording.lock();
        if recording.is_none() {
            log::trace!("DummyContext[{}]: begin command list", self.index);
            *recording = Some(Vec::new());
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
        let commands = self.recording.lock().take().unwrap_or_default();
        let serial = self.resolved.fetch_add(1, Ordering::AcqRel) + 1;
        log::trace!(
            "DummyContext[{}]: resolved list {} with {} commands",
            self.index,
            serial,
            commands.len()
        );
        Ok(DeviceCommandList::Dummy(DummyCommandList {
            context_index: self.index,
            serial,
            commands,
        }))
    }

    fn execute_command_list(
        &self,
        list: DeviceCommandList,
        preserve_state: bool,
    ) -> Result<(), UploadError> {
        self.shared.check_lost()?;
        if self.kind != ContextKind::Immediate {
            return Err(UploadError::InvalidParameter(
                "command lists can only be executed on the immediate context".to_string(),
            ));
        }
        let list = match list {
            DeviceCommandList::Dummy(list) => list,
            #[cfg(feature = "wgpu-backend")]
            DeviceCommandList::Wgpu(_) => {
                return Err(UploadError::Backend(
                    "wgpu command list passed to the dummy backend".to_string(),
                ));
            }
        };
        log::trace!(
            "DummyContext[0]: executing list {}:{} ({} commands, preserve_state={preserve_state})",
            list.context_index,
            list.serial,
            list.commands.len()
        );
        for command in &list.commands {
            command.apply()?;
        }
        self.shared.execution_log.lock().push(ExecutedList {
            context_index: list.context_index,
            serial: list.serial,
            command_count: list.commands.len(),
        });
        Ok(())
    }

    fn supports_sub_resource_map(&self) -> bool {
        self.shared.sub_resource_map
    }

    fn map_write(
        &self,
        resource: &Resource,
        target: MapTarget,
        write: &mut MapWriteFn<'_>,
    ) -> Result<usize, UploadError> {
        self.shared.check_lost()?;
        let memory = memory_of(resource)?;
        if matches!(target, MapTarget::SubResource(_)) && !self.shared.sub_resource_map {
            return Err(UploadError::Unsupported(
                "sub-resource maps are disabled on this device".to_string(),
            ));
        }
        let mut bytes = vec![0u8; memory.target_size(&target)?];
        let written = write(&mut bytes, memory.pitches(&target));
        self.submit(DummyCommand::Write {
            memory: memory.clone(),
            target,
            bytes,
        })?;
        Ok(written)
    }

    fn read_back(&self, resource: &Resource, target: MapTarget) -> Result<Vec<u8>, UploadError> {
        self.shared.check_lost()?;
        memory_of(resource)?.contents(&target)
    }

    fn copy_resource(&self, dst: &Resource, src: &Resource) -> Result<(), UploadError> {
        self.submit(DummyCommand::CopyResource {
            dst: memory_of(dst)?.clone(),
            src: memory_of(src)?.clone(),
        })
    }

    fn copy_partial(
        &self,
        dst: CopyDestination<'_>,
        src: CopySource<'_>,
    ) -> Result<(), UploadError> {
        self.submit(DummyCommand::CopyPartial {
            dst: memory_of(dst.resource)?.clone(),
            dst_sub: dst.sub_resource,
            origin: dst.origin,
            src: memory_of(src.resource)?.clone(),
            src_sub: src.sub_resource,
            box2d: src.box2d,
        })
    }

    fn copy_buffer_region(
        &self,
        dst: &Resource,
        dst_offset: u64,
        src: &Resource,
        src_range: Range<u64>,
    ) -> Result<(), UploadError> {
        self.submit(DummyCommand::CopyBufferRegion {
            dst: memory_of(dst)?.clone(),
            dst_offset,
            src: memory_of(src)?.clone(),
            src_range,
        })
    }

    fn capture_for_bind(&self, resource: &Resource, usage: BindFlags) {
        let Ok(memory) = memory_of(resource) else {
            log::warn!("capture_for_bind on a foreign resource {:?}", resource.label());
            return;
        };
        if let Err(e) = self.submit(DummyCommand::Transition {
            memory: memory.clone(),
            usage,
        }) {
            log::warn!("capture_for_bind failed: {e}");
        }
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&dyn DataPacket>,
    ) -> Result<Arc<Resource>, UploadError> {
        self.shared.create_resource(desc, initial_data)
    }

    fn signal_marker(&self, marker: u64) {
        self.shared.completed_marker.fetch_max(marker, Ordering::AcqRel);
    }

    fn completed_marker(&self) -> u64 {
        self.shared.completed_marker.load(Ordering::Acquire)
    }
}

static_assertions::assert_impl_all!(DummyDevice: Send, Sync);
static_assertions::assert_impl_all!(DummyContext: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TextureDesc, TextureFormat};

    fn buffer(device: &DummyDevice, size: u32) -> Arc<Resource> {
        device
            .create_resource(&ResourceDesc::linear_buffer(size, BindFlags::VERTEX_BUFFER), None)
            .unwrap()
    }

    #[test]
    fn test_immediate_write_applies_at_once() {
        let device = DummyDevice::new();
        let res = buffer(&device, 8);
        let ctx = device.immediate();
        let written = ctx
            .map_write(&res, MapTarget::Whole, &mut |dst, _| {
                dst.copy_from_slice(&[7; 8]);
                8
            })
            .unwrap();
        assert_eq!(written, 8);
        assert_eq!(ctx.read_back(&res, MapTarget::Whole).unwrap(), vec![7; 8]);
    }

    #[test]
    fn test_deferred_write_waits_for_execute() {
        let device = DummyDevice::new();
        let res = buffer(&device, 4);
        let deferred = device.create_deferred();
        deferred
            .map_write(&res, MapTarget::Range(1..3), &mut |dst, _| {
                dst.copy_from_slice(&[9, 9]);
                2
            })
            .unwrap();
        assert_eq!(deferred.pending_command_count(), 1);
        assert_eq!(memory_of(&res).unwrap().contents(&MapTarget::Whole).unwrap(), vec![0; 4]);

        let list = deferred.resolve_command_list().unwrap();
        device.immediate().execute_command_list(list, false).unwrap();
        assert_eq!(memory_of(&res).unwrap().contents(&MapTarget::Whole).unwrap(), vec![0, 9, 9, 0]);

        let log = device.execution_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].serial, 1);
        assert_eq!(log[0].context_index, deferred.index());
    }

    #[test]
    fn test_immediate_cannot_resolve() {
        let device = DummyDevice::new();
        assert!(device.immediate().resolve_command_list().is_err());
    }

    #[test]
    fn test_texture_sub_resource_layout() {
        let device = DummyDevice::new();
        let desc = ResourceDesc::texture(
            TextureDesc::new_2d(4, 4, TextureFormat::R8Unorm)
                .with_mip_count(2)
                .with_array_count(2),
            BindFlags::SHADER_RESOURCE,
        );
        let tex = device.create_resource(&desc, None).unwrap();
        let memory = memory_of(&tex).unwrap();
        assert_eq!(memory.contents(&MapTarget::Whole).unwrap().len(), (16 + 4) * 2);
        assert_eq!(
            memory
                .contents(&MapTarget::SubResource(SubResourceId::new(1, 1)))
                .unwrap()
                .len(),
            4
        );
        assert!(memory.contents(&MapTarget::SubResource(SubResourceId::new(2, 0))).is_err());
    }

    #[test]
    fn test_copy_partial_box() {
        let device = DummyDevice::new();
        let ctx = device.immediate();
        let tex_desc = TextureDesc::new_2d(4, 4, TextureFormat::R8Unorm);
        let src_data = crate::resources::BasicDataPacket::for_texture(&tex_desc, |_, bytes| {
            for (i, b) in bytes.iter_mut().enumerate() {
                *b = i as u8;
            }
        });
        let desc = ResourceDesc::texture(tex_desc, BindFlags::SHADER_RESOURCE);
        let src = device.create_resource(&desc, Some(&src_data)).unwrap();
        let dst = device.create_resource(&desc, None).unwrap();

        ctx.copy_partial(
            CopyDestination {
                resource: &dst,
                sub_resource: SubResourceId::default(),
                origin: [0, 0],
            },
            CopySource {
                resource: &src,
                sub_resource: SubResourceId::default(),
                box2d: Box2D::new(2, 2, 4, 4),
            },
        )
        .unwrap();

        let out = ctx.read_back(&dst, MapTarget::Whole).unwrap();
        assert_eq!(out[0..2], [10, 11]);
        assert_eq!(out[4..6], [14, 15]);
        assert_eq!(out[2], 0);
    }

    #[test]
    fn test_device_lost() {
        let device = DummyDevice::new();
        let res = buffer(&device, 4);
        device.set_lost(true);
        assert_eq!(
            device.immediate().read_back(&res, MapTarget::Whole),
            Err(UploadError::DeviceLost)
        );
        device.set_lost(false);
        assert!(device.immediate().read_back(&res, MapTarget::Whole).is_ok());
    }

    #[test]
    fn test_markers_are_monotone() {
        let device = DummyDevice::new();
        let ctx = device.immediate();
        ctx.signal_marker(5);
        ctx.signal_marker(3);
        assert_eq!(ctx.completed_marker(), 5);
    }
}
