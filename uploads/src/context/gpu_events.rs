use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::backend::GpuContext;
use crate::commit::CommandListId;

// Device markers are shared by every context on a device, so they come from
// one process-wide counter and map back to per-context command list ids.
static NEXT_DEVICE_MARKER: AtomicU64 = AtomicU64::new(1);

/// Tracks which committed command lists the GPU has finished.
#[derive(Debug, Default)]
pub struct GpuEventStack {
    pending: Mutex<VecDeque<(u64, CommandListId)>>,
    recorded: AtomicU64,
    completed: AtomicU64,
}

impl GpuEventStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask `context` to report when the work executed so far, up to `id`, is done.
    pub fn record(&self, context: &dyn GpuContext, id: CommandListId) {
        let marker = NEXT_DEVICE_MARKER.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().push_back((marker, id));
        self.recorded.fetch_max(id, Ordering::AcqRel);
        context.signal_marker(marker);
    }

    /// Retire every marker `context` reports complete and return the completed watermark.
    pub fn update(&self, context: &dyn GpuContext) -> CommandListId {
        let device_completed = context.completed_marker();
        let mut pending = self.pending.lock();
        while let Some(&(marker, id)) = pending.front() {
            if marker > device_completed {
                break;
            }
            pending.pop_front();
            self.completed.fetch_max(id, Ordering::AcqRel);
        }
        self.completed.load(Ordering::Acquire)
    }

    /// Highest command list id known to be finished by the GPU.
    pub fn command_list_id_completed_by_gpu(&self) -> CommandListId {
        self.completed.load(Ordering::Acquire)
    }

    /// Forget outstanding markers after device loss; lost work counts as retired.
    pub fn reset(&self) {
        self.pending.lock().clear();
        self.completed
            .fetch_max(self.recorded.load(Ordering::Acquire), Ordering::AcqRel);
    }
}
