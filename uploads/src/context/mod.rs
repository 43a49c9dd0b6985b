//! Per-thread command list lifecycle.
//!
//! A [`ThreadContext`] wraps one device context and turns the work recorded
//! on it into a stream of numbered command lists. Background threads record
//! uploads and resolve them; the thread owning the immediate context drains
//! the resolved lists and executes them in order.
//!
//! # Lifecycle
//!
//! | State | Where | Leaves by |
//! |-------|-------|-----------|
//! | Under construction | device context recording + [`CommitStep`] | [`ThreadContext::resolve_command_list`] |
//! | Queued | lock-free FIFO inside the context | [`ThreadContext::commit_to_immediate`] |
//! | Committed | executed on the immediate context | GPU completion |
//!
//! Command lists get ids in resolve order, starting at 1, and are committed
//! in that same order. The committed watermark only moves forward.
//!
//! # Module Contents
//!
//! - [`ThreadContext`] - The orchestrator
//! - [`ThreadContextConfig`] - Ring sizes, metrics and queue limits
//! - [`EventList`] / [`EventListRef`] - Resource-reposition notifications
//! - [`FramePriorityQueue`] - Work the current frame waits on
//! - [`GpuEventStack`] - GPU completion of committed lists
//!
//! # Example
//!
//! ```ignore
//! let device = create_device()?;
//! let background = ThreadContext::new(device.create_deferred_context()?);
//!
//! // Background thread
//! ResourceUploadHelper::new(background.device_context().as_ref())
//!     .write_to_buffer_via_map(&locator, &desc, 0, &bytes)?;
//! let id = background.resolve_command_list()?;
//!
//! // Main thread, once per frame
//! background.commit_to_immediate(device.immediate_context().as_ref(), None)?;
//! assert!(background.command_list_id_committed_to_immediate() >= id);
//! ```

mod config;
mod event_list;
mod frame_priority;
mod gpu_events;
mod wakeup;

pub use config::ThreadContextConfig;
pub use event_list::{EventList, EventListId, EventListRef, ResourceRepositionEvent};
pub use frame_priority::FramePriorityQueue;
pub use gpu_events::GpuEventStack;
pub use wakeup::WakeupEvent;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::queue::{ArrayQueue, SegQueue};
use parking_lot::Mutex;

use crate::backend::{ContextKind, GpuContext};
use crate::commit::{
    CommandList, CommandListId, CommandListMetrics, CommitProgress, CommitStep, DeferredCopy,
    DeferredDefragCopy,
};
use crate::error::UploadError;
use crate::{profile_function, profile_plot, profile_scope};

/// How resolved work reaches the immediate context.
enum ContextRole {
    /// Resolving runs the commit step directly.
    Immediate,
    /// Resolved lists wait in a FIFO for the committer. A list that failed
    /// to commit waits in `stalled` and goes first on the next pass.
    Deferred {
        queue: SegQueue<CommandList>,
        stalled: Mutex<Option<CommandList>>,
    },
}

/// State of the command list currently being recorded.
struct Construction {
    id: CommandListId,
    metrics: CommandListMetrics,
    commit_step: CommitStep,
}

/// Owns one device context and the lifecycle of the command lists recorded on it.
///
/// Any number of threads may record and resolve; a single thread should call
/// [`commit_to_immediate`](Self::commit_to_immediate). Concurrent committers
/// are serialized.
pub struct ThreadContext {
    context: Arc<dyn GpuContext>,
    role: ContextRole,
    config: ThreadContextConfig,

    construction: Mutex<Construction>,
    committed: AtomicU64,
    commit_lock: Mutex<()>,

    commit_count: AtomicU32,
    commit_count_last_resolve: AtomicU32,

    metrics: Option<ArrayQueue<CommandListMetrics>>,
    events: EventList,
    gpu_events: GpuEventStack,
    frame_priority: FramePriorityQueue,
    wakeup: WakeupEvent,
}

impl ThreadContext {
    /// Wrap `context` with the default configuration.
    pub fn new(context: Arc<dyn GpuContext>) -> Self {
        Self::build(context, ThreadContextConfig::default())
    }

    /// Wrap `context` with a custom configuration.
    pub fn with_config(
        context: Arc<dyn GpuContext>,
        config: ThreadContextConfig,
    ) -> Result<Self, UploadError> {
        config.validate()?;
        Ok(Self::build(context, config))
    }

    fn build(context: Arc<dyn GpuContext>, config: ThreadContextConfig) -> Self {
        let role = match context.kind() {
            ContextKind::Immediate => ContextRole::Immediate,
            ContextKind::Deferred => ContextRole::Deferred {
                queue: SegQueue::new(),
                stalled: Mutex::new(None),
            },
        };
        log::info!(
            "Created {:?} thread context on {} ({} event slots)",
            context.kind(),
            context.name(),
            config.event_list_slots
        );

        Self {
            role,
            construction: Mutex::new(Construction {
                id: 1,
                metrics: CommandListMetrics::new(Instant::now()),
                commit_step: CommitStep::new(),
            }),
            committed: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
            commit_count: AtomicU32::new(0),
            commit_count_last_resolve: AtomicU32::new(0),
            metrics: config
                .record_metrics
                .then(|| ArrayQueue::new(config.metrics_capacity)),
            events: EventList::new(config.event_list_slots),
            gpu_events: GpuEventStack::new(),
            frame_priority: FramePriorityQueue::new(config.frame_priority_capacity),
            wakeup: WakeupEvent::new(),
            context,
            config,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The wrapped device context. Uploads for this thread are recorded on it.
    pub fn device_context(&self) -> &Arc<dyn GpuContext> {
        &self.context
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self.role, ContextRole::Immediate)
    }

    pub fn config(&self) -> &ThreadContextConfig {
        &self.config
    }

    /// Queue of frame-critical work associated with this context.
    pub fn frame_priority_queue(&self) -> &FramePriorityQueue {
        &self.frame_priority
    }

    /// Id the next resolved command list will get.
    pub fn command_list_id_under_construction(&self) -> CommandListId {
        self.construction.lock().id
    }

    /// Highest id whose work has executed on the immediate context.
    pub fn command_list_id_committed_to_immediate(&self) -> CommandListId {
        self.committed.load(Ordering::Acquire)
    }

    /// Highest id the GPU is known to have finished, as of the last commit.
    pub fn command_list_id_completed_by_gpu(&self) -> CommandListId {
        self.gpu_events.command_list_id_completed_by_gpu()
    }

    /// Poll `immediate` for finished markers and return the completed watermark.
    pub fn update_gpu_tracking(&self, immediate: &dyn GpuContext) -> CommandListId {
        self.gpu_events.update(immediate)
    }

    /// Resolved lists waiting for the committer.
    pub fn queued_command_list_count(&self) -> usize {
        match &self.role {
            ContextRole::Immediate => 0,
            ContextRole::Deferred { queue, stalled } => {
                queue.len() + usize::from(stalled.lock().is_some())
            }
        }
    }

    /// Number of completed [`commit_to_immediate`](Self::commit_to_immediate) passes.
    pub fn commit_count_current(&self) -> u32 {
        self.commit_count.load(Ordering::Acquire)
    }

    /// Commit count observed by the most recent resolve.
    pub fn commit_count_last_resolve(&self) -> u32 {
        self.commit_count_last_resolve.load(Ordering::Acquire)
    }

    pub fn set_commit_count_last_resolve(&self, count: u32) {
        self.commit_count_last_resolve.store(count, Ordering::Release);
    }

    /// Retired metrics, oldest first, one per call.
    ///
    /// Returns `None` when empty or when metrics are disabled. When producers
    /// outpace this reader the oldest records are discarded.
    pub fn pop_metrics(&self) -> Option<CommandListMetrics> {
        self.metrics.as_ref()?.pop()
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Make sure the device context is recording.
    pub fn begin_command_list(&self) {
        self.context.begin_command_list();
    }

    /// Run `f` on the commit step of the command list under construction.
    pub fn with_commit_step<R>(&self, f: impl FnOnce(&mut CommitStep) -> R) -> R {
        f(&mut self.construction.lock().commit_step)
    }

    /// Queue a buffer write for the committing thread.
    pub fn add_deferred_copy(&self, copy: DeferredCopy) {
        self.with_commit_step(|step| step.add_deferred_copy(copy));
    }

    /// Queue a defrag copy for the committing thread.
    pub fn add_deferred_defrag_copy(&self, copy: DeferredDefragCopy) {
        self.with_commit_step(|step| step.add_deferred_defrag_copy(copy));
    }

    /// Close the command list under construction and return its id.
    ///
    /// On a deferred context the recorded work and commit step are queued for
    /// [`commit_to_immediate`](Self::commit_to_immediate). On the immediate
    /// context the commit step runs right away and the list counts as
    /// committed on return.
    ///
    /// With `max_queued_command_lists` set, this yields until the committer
    /// has drained the queue below the limit, so it must not be called from
    /// the committing thread in that configuration.
    ///
    /// # Errors
    ///
    /// Backend failures are returned as-is. When the backend fails to resolve,
    /// the id is not consumed and the commit step stays pending.
    pub fn resolve_command_list(&self) -> Result<CommandListId, UploadError> {
        profile_function!();
        self.apply_backpressure();

        let now = Instant::now();
        let mut construction = self.construction.lock();
        let id = construction.id;
        let mut metrics = construction.metrics;
        metrics.id = id;
        metrics.processing_end = now;
        metrics.resolve_time = now;

        match &self.role {
            ContextRole::Deferred { queue, .. } => {
                let device_command_list = self.context.resolve_command_list()?;
                queue.push(CommandList {
                    id,
                    device_command_list: Some(device_command_list),
                    commit_step: std::mem::take(&mut construction.commit_step),
                    metrics,
                    progress: CommitProgress::Pending,
                });

                let depth = queue.len();
                profile_plot!("queued command lists", depth);
                if depth == self.config.queue_warning_threshold + 1 {
                    log::warn!(
                        "{depth} command lists waiting for commit; the committing thread is falling behind"
                    );
                }
                log::debug!("Resolved command list {id} (queue depth {depth})");
            }
            ContextRole::Immediate => {
                let step = &mut construction.commit_step;
                step.commit_to_immediate_pre_command_list(self.context.as_ref())?;
                step.commit_to_immediate_post_command_list(self.context.as_ref())?;
                self.committed.fetch_max(id, Ordering::AcqRel);
                self.gpu_events.record(self.context.as_ref(), id);

                metrics.commit_time = Some(now);
                metrics.frame_id = self.context.frame_id();
                self.record_metrics(metrics);
                log::debug!("Resolved and committed command list {id} on the immediate context");
                self.wakeup.signal();
            }
        }

        construction.id += 1;
        construction.metrics = CommandListMetrics::new(Instant::now());
        self.set_commit_count_last_resolve(self.commit_count_current());
        Ok(id)
    }

    fn apply_backpressure(&self) {
        let (Some(limit), ContextRole::Deferred { queue, .. }) =
            (self.config.max_queued_command_lists, &self.role)
        else {
            return;
        };
        if queue.len() < limit {
            return;
        }
        profile_scope!("resolve_backpressure");
        log::debug!("Command list queue full ({limit}), waiting for the committer");
        while queue.len() >= limit {
            std::thread::yield_now();
        }
    }

    // ========================================================================
    // Committing
    // ========================================================================

    /// Execute every queued command list on `commit_to`, in resolve order.
    ///
    /// While `frame_priority` has pending work the committer keeps draining,
    /// yielding between passes, so frame-critical uploads land before the
    /// frame is presented. Returns the number of command lists committed.
    ///
    /// # Errors
    ///
    /// The first backend error stops the pass. The failing list stays at the
    /// front of the queue and the committed watermark stays below it; the next
    /// pass resumes it from the step that failed. A list whose recorded work
    /// the backend rejected keeps failing until
    /// [`on_lost_device`](Self::on_lost_device) discards it.
    pub fn commit_to_immediate(
        &self,
        commit_to: &dyn GpuContext,
        frame_priority: Option<&FramePriorityQueue>,
    ) -> Result<usize, UploadError> {
        profile_function!();
        let ContextRole::Deferred { queue, stalled } = &self.role else {
            return Ok(0);
        };

        let _committer = self.commit_lock.lock();
        let result = self.drain_queue(queue, stalled, commit_to, frame_priority);
        self.gpu_events.update(commit_to);

        let pass = self.commit_count.fetch_add(1, Ordering::AcqRel) + 1;
        self.wakeup.signal();
        if let Ok(count) = &result
            && *count > 0
        {
            log::debug!(
                "Commit pass {pass}: {count} command lists, committed through {}",
                self.command_list_id_committed_to_immediate()
            );
        }
        result
    }

    fn drain_queue(
        &self,
        queue: &SegQueue<CommandList>,
        stalled: &Mutex<Option<CommandList>>,
        commit_to: &dyn GpuContext,
        frame_priority: Option<&FramePriorityQueue>,
    ) -> Result<usize, UploadError> {
        let mut committed = 0;
        let mut last_retired = Instant::now();

        loop {
            let priority_pending = frame_priority.is_some_and(FramePriorityQueue::has_pending);

            loop {
                let front = stalled.lock().take();
                let Some(mut list) = front.or_else(|| queue.pop()) else {
                    break;
                };
                list.metrics.frame_priority_stall_time = last_retired.elapsed();

                if let Err(error) = Self::commit_command_list(&mut list, commit_to) {
                    log::warn!("Command list {} failed to commit: {error}", list.id);
                    *stalled.lock() = Some(list);
                    return Err(error);
                }

                self.committed.fetch_max(list.id, Ordering::AcqRel);
                self.gpu_events.record(commit_to, list.id);

                last_retired = Instant::now();
                list.metrics.commit_time = Some(last_retired);
                list.metrics.frame_id = commit_to.frame_id();
                self.record_metrics(list.metrics);
                committed += 1;
            }

            if !priority_pending {
                return Ok(committed);
            }
            std::thread::yield_now();
        }
    }

    /// Run one list's pre-command-list copies, recorded work and
    /// post-command-list copies, resuming after whatever already succeeded.
    fn commit_command_list(
        list: &mut CommandList,
        commit_to: &dyn GpuContext,
    ) -> Result<(), UploadError> {
        profile_scope!("commit_command_list");
        if let CommitProgress::ExecuteFailed(error) = &list.progress {
            return Err(error.clone());
        }
        if list.progress == CommitProgress::Pending {
            list.commit_step.commit_to_immediate_pre_command_list(commit_to)?;
            if let Some(device_command_list) = list.device_command_list.take()
                && let Err(error) = commit_to.execute_command_list(device_command_list, false)
            {
                list.progress = CommitProgress::ExecuteFailed(error.clone());
                return Err(error);
            }
            list.progress = CommitProgress::Executed;
        }
        list.commit_step.commit_to_immediate_post_command_list(commit_to)?;
        Ok(())
    }

    fn record_metrics(&self, metrics: CommandListMetrics) {
        if let Some(queue) = &self.metrics {
            queue.force_push(metrics);
        }
    }

    /// Block until a commit pass finishes. Returns `false` on timeout.
    pub fn wait_for_commit(&self, timeout: Duration) -> bool {
        self.wakeup.wait(timeout)
    }

    /// Block until command list `id` has been committed. Returns `false` on timeout.
    pub fn wait_for_committed(&self, id: CommandListId, timeout: Duration) -> bool {
        self.wakeup
            .wait_until(timeout, || self.command_list_id_committed_to_immediate() >= id)
    }

    // ========================================================================
    // Event list
    // ========================================================================

    /// The resource-reposition event ring.
    pub fn event_list(&self) -> &EventList {
        &self.events
    }

    pub fn event_list_push(&self, event: ResourceRepositionEvent) -> Result<EventListId, UploadError> {
        self.events.push(event)
    }

    pub fn event_list_get(&self, id: EventListId) -> Option<EventListRef<'_>> {
        self.events.get(id)
    }

    pub fn event_list_publish(&self, id: EventListId) {
        self.events.publish(id);
    }

    pub fn event_list_written_id(&self) -> EventListId {
        self.events.written_id()
    }

    pub fn event_list_published_id(&self) -> EventListId {
        self.events.published_id()
    }

    pub fn event_list_processed_id(&self) -> EventListId {
        self.events.processed_id()
    }

    // ========================================================================
    // Device loss
    // ========================================================================

    /// Drop everything that refers to the lost device.
    ///
    /// Clears the event ring, discards queued command lists and treats all
    /// outstanding GPU work as finished. Ids keep counting from where they
    /// were, so watermarks stay monotone.
    pub fn on_lost_device(&self) {
        let _committer = self.commit_lock.lock();
        self.events.clear();

        let mut dropped = 0;
        if let ContextRole::Deferred { queue, stalled } = &self.role {
            dropped += usize::from(stalled.lock().take().is_some());
            while queue.pop().is_some() {
                dropped += 1;
            }
        }
        self.construction.lock().commit_step = CommitStep::new();
        self.gpu_events.reset();
        self.wakeup.signal();

        log::info!(
            "Device lost: dropped {dropped} queued command lists, committed through {}",
            self.command_list_id_committed_to_immediate()
        );
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("backend", &self.context.name())
            .field("kind", &self.context.kind())
            .field("queued", &self.queued_command_list_count())
            .field("committed", &self.command_list_id_committed_to_immediate())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(ThreadContext: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuDevice;
    use crate::backend::dummy::DummyDevice;
    use crate::resources::ResourceLocator;
    use crate::types::{BindFlags, ResourceDesc, SubResourceId};
    use crate::upload::ResourceUploadHelper;

    fn deferred(device: &DummyDevice) -> ThreadContext {
        ThreadContext::new(device.create_deferred())
    }

    #[test]
    fn test_ids_start_at_one() {
        let device = DummyDevice::new();
        let context = deferred(&device);
        assert_eq!(context.command_list_id_under_construction(), 1);
        assert_eq!(context.command_list_id_committed_to_immediate(), 0);
        assert!(!context.is_immediate());

        assert_eq!(context.resolve_command_list().unwrap(), 1);
        assert_eq!(context.resolve_command_list().unwrap(), 2);
        assert_eq!(context.command_list_id_under_construction(), 3);
        assert_eq!(context.queued_command_list_count(), 2);
        assert_eq!(context.command_list_id_committed_to_immediate(), 0);
    }

    #[test]
    fn test_commit_drains_in_order() {
        let device = DummyDevice::new();
        let context = deferred(&device);
        for _ in 0..3 {
            context.resolve_command_list().unwrap();
        }
        let committed = context
            .commit_to_immediate(device.immediate().as_ref(), None)
            .unwrap();
        assert_eq!(committed, 3);
        assert_eq!(context.command_list_id_committed_to_immediate(), 3);
        assert_eq!(context.commit_count_current(), 1);

        let serials: Vec<u64> = device.execution_log().iter().map(|e| e.serial).collect();
        assert_eq!(serials, [1, 2, 3]);
        assert_eq!(context.command_list_id_completed_by_gpu(), 3);
    }

    #[test]
    fn test_immediate_context_commits_on_resolve() {
        let device = DummyDevice::new();
        let context = ThreadContext::new(device.immediate().clone());
        assert!(context.is_immediate());

        let desc = ResourceDesc::linear_buffer(4, BindFlags::VERTEX_BUFFER);
        let buffer = device.create_resource(&desc, None).unwrap();
        context.add_deferred_copy(DeferredCopy {
            destination: ResourceLocator::whole(buffer.clone()),
            desc,
            temporary_buffer: vec![5; 4],
        });

        assert_eq!(context.resolve_command_list().unwrap(), 1);
        assert_eq!(context.command_list_id_committed_to_immediate(), 1);
        assert_eq!(context.queued_command_list_count(), 0);
        assert_eq!(
            context
                .commit_to_immediate(device.immediate().as_ref(), None)
                .unwrap(),
            0
        );

        let bytes = ResourceUploadHelper::new(device.immediate().as_ref())
            .read_back(&buffer.into(), SubResourceId::default())
            .unwrap();
        assert_eq!(bytes, [5; 4]);
    }

    #[test]
    fn test_metrics_are_recorded_and_lossy() {
        let device = DummyDevice::new();
        let config = ThreadContextConfig::new().with_metrics(true, 2);
        let context = ThreadContext::with_config(device.create_deferred(), config).unwrap();
        for _ in 0..3 {
            context.resolve_command_list().unwrap();
        }
        device.advance_frame();
        context
            .commit_to_immediate(device.immediate().as_ref(), None)
            .unwrap();

        let first = context.pop_metrics().unwrap();
        let second = context.pop_metrics().unwrap();
        assert!(context.pop_metrics().is_none());
        assert_eq!((first.id, second.id), (2, 3));
        assert_eq!(first.frame_id, 1);
        assert!(first.commit_time.is_some());
        assert!(first.resolve_time >= first.processing_start);
    }

    #[test]
    fn test_metrics_disabled() {
        let device = DummyDevice::new();
        let config = ThreadContextConfig::new().with_metrics(false, 0);
        let context = ThreadContext::with_config(device.create_deferred(), config).unwrap();
        context.resolve_command_list().unwrap();
        context
            .commit_to_immediate(device.immediate().as_ref(), None)
            .unwrap();
        assert!(context.pop_metrics().is_none());
    }

    #[test]
    fn test_failed_resolve_keeps_id() {
        let device = DummyDevice::new();
        let context = deferred(&device);
        device.set_lost(true);
        assert_eq!(context.resolve_command_list(), Err(UploadError::DeviceLost));
        assert_eq!(context.command_list_id_under_construction(), 1);
        device.set_lost(false);
        assert_eq!(context.resolve_command_list().unwrap(), 1);
    }

    #[test]
    fn test_commit_counts() {
        let device = DummyDevice::new();
        let context = deferred(&device);
        context
            .commit_to_immediate(device.immediate().as_ref(), None)
            .unwrap();
        context
            .commit_to_immediate(device.immediate().as_ref(), None)
            .unwrap();
        assert_eq!(context.commit_count_current(), 2);
        context.resolve_command_list().unwrap();
        assert_eq!(context.commit_count_last_resolve(), 2);
        context.set_commit_count_last_resolve(7);
        assert_eq!(context.commit_count_last_resolve(), 7);
    }

    #[test]
    fn test_lost_device_drops_queue() {
        let device = DummyDevice::new();
        let context = deferred(&device);
        context.resolve_command_list().unwrap();
        context.resolve_command_list().unwrap();
        let event = context
            .event_list_push(ResourceRepositionEvent::default())
            .unwrap();

        context.on_lost_device();
        assert_eq!(context.queued_command_list_count(), 0);
        assert!(context.event_list_get(event).is_none());
        assert_eq!(context.command_list_id_under_construction(), 3);
        assert_eq!(context.resolve_command_list().unwrap(), 3);
    }

    #[test]
    fn test_wait_for_committed() {
        let device = DummyDevice::new();
        let context = deferred(&device);
        let id = context.resolve_command_list().unwrap();
        assert!(!context.wait_for_committed(id, Duration::from_millis(1)));
        context
            .commit_to_immediate(device.immediate().as_ref(), None)
            .unwrap();
        assert!(context.wait_for_committed(id, Duration::from_millis(1)));
    }
}
