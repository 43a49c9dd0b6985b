use std::time::{Duration, Instant};

use crate::backend::DeviceCommandList;
use crate::error::UploadError;

use super::CommitStep;

/// Monotonic id of a resolved command list. Ids start at 1; 0 means "none".
pub type CommandListId = u64;

/// Timing of one command list from first recorded work to retirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandListMetrics {
    /// Id the list was resolved as.
    pub id: CommandListId,
    /// When recording of this list began.
    pub processing_start: Instant,
    /// When recording ended.
    pub processing_end: Instant,
    /// When the list was resolved.
    pub resolve_time: Instant,
    /// When the list executed on the immediate context.
    pub commit_time: Option<Instant>,
    /// Time between the retirement of the previous list (or the start of the
    /// commit pass) and the moment the committer picked this list up.
    /// Includes yields to pending frame-priority work.
    pub frame_priority_stall_time: Duration,
    /// Frame active when the list was committed.
    pub frame_id: u64,
}

impl CommandListMetrics {
    /// Metrics of a list whose recording starts at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            id: 0,
            processing_start: now,
            processing_end: now,
            resolve_time: now,
            commit_time: None,
            frame_priority_stall_time: Duration::ZERO,
            frame_id: 0,
        }
    }

    /// Time between the start of recording and the resolve.
    pub fn processing_time(&self) -> Duration {
        self.processing_end.saturating_duration_since(self.processing_start)
    }

    /// Time spent in the queue between resolve and commit.
    pub fn queued_time(&self) -> Option<Duration> {
        self.commit_time
            .map(|commit| commit.saturating_duration_since(self.resolve_time))
    }
}

/// How far a command list got through its commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CommitProgress {
    /// Nothing has run yet, or the pre-command-list copies failed.
    #[default]
    Pending,
    /// Recorded work executed; only the post-command-list copies remain.
    Executed,
    /// The backend rejected the recorded work, which is gone with it.
    ExecuteFailed(UploadError),
}

/// Resolved work of one producer, waiting in the queue for the committer.
#[derive(Debug)]
pub struct CommandList {
    pub id: CommandListId,
    /// Recorded GPU work; `None` once handed to the immediate context.
    pub device_command_list: Option<DeviceCommandList>,
    pub commit_step: CommitStep,
    pub metrics: CommandListMetrics,
    pub progress: CommitProgress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_durations() {
        let start = Instant::now();
        let mut metrics = CommandListMetrics::new(start);
        assert_eq!(metrics.processing_time(), Duration::ZERO);
        assert_eq!(metrics.queued_time(), None);

        metrics.processing_end = start + Duration::from_millis(5);
        metrics.resolve_time = metrics.processing_end;
        metrics.commit_time = Some(start + Duration::from_millis(12));
        assert_eq!(metrics.processing_time(), Duration::from_millis(5));
        assert_eq!(metrics.queued_time(), Some(Duration::from_millis(7)));
    }
}
