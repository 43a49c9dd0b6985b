use crate::error::UploadError;

/// Tuning knobs for a [`ThreadContext`](super::ThreadContext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadContextConfig {
    /// Number of slots in the resource-reposition event ring.
    pub event_list_slots: usize,
    /// Whether retired command lists report metrics through `pop_metrics`.
    pub record_metrics: bool,
    /// Metrics kept before the oldest are discarded.
    pub metrics_capacity: usize,
    /// Queue depth above which resolving logs a warning.
    pub queue_warning_threshold: usize,
    /// Queue depth at which resolving waits for the committer, `None` to never wait.
    pub max_queued_command_lists: Option<usize>,
    /// Capacity of the frame-priority queue created alongside the context.
    pub frame_priority_capacity: usize,
}

impl ThreadContextConfig {
    pub fn new() -> Self {
        Self {
            event_list_slots: 4,
            record_metrics: true,
            metrics_capacity: 256,
            queue_warning_threshold: 64,
            max_queued_command_lists: None,
            frame_priority_capacity: 16,
        }
    }

    pub fn with_event_list_slots(mut self, slots: usize) -> Self {
        self.event_list_slots = slots;
        self
    }

    pub fn with_metrics(mut self, record: bool, capacity: usize) -> Self {
        self.record_metrics = record;
        self.metrics_capacity = capacity;
        self
    }

    pub fn with_queue_warning_threshold(mut self, threshold: usize) -> Self {
        self.queue_warning_threshold = threshold;
        self
    }

    pub fn with_max_queued_command_lists(mut self, limit: Option<usize>) -> Self {
        self.max_queued_command_lists = limit;
        self
    }

    pub fn with_frame_priority_capacity(mut self, capacity: usize) -> Self {
        self.frame_priority_capacity = capacity;
        self
    }

    /// Reject configurations a context cannot run with.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.event_list_slots == 0 {
            return Err(UploadError::InvalidParameter(
                "event_list_slots must be non-zero".to_string(),
            ));
        }
        if self.record_metrics && self.metrics_capacity == 0 {
            return Err(UploadError::InvalidParameter(
                "metrics_capacity must be non-zero when metrics are recorded".to_string(),
            ));
        }
        if self.max_queued_command_lists == Some(0) {
            return Err(UploadError::InvalidParameter(
                "max_queued_command_lists must be at least 1".to_string(),
            ));
        }
        if self.frame_priority_capacity == 0 {
            return Err(UploadError::InvalidParameter(
                "frame_priority_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ThreadContextConfig {
    fn default() -> Self {
        Self::new()
    }
}
