use std::collections::VecDeque;

use parking_lot::Mutex;

/// Queue-set ids that must be committed before the current frame is presented.
///
/// Producers push a barrier id when they have work the frame depends on; the
/// committer keeps draining while the queue is non-empty, and whoever retires
/// the frame-critical work pops the id. The queue is bounded.
#[derive(Debug)]
pub struct FramePriorityQueue {
    pending: Mutex<VecDeque<u32>>,
    capacity: usize,
}

impl FramePriorityQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Push `queue_set_id`, yielding while the queue is full.
    pub fn barrier(&self, queue_set_id: u32) {
        loop {
            {
                let mut pending = self.pending.lock();
                if pending.len() < self.capacity {
                    pending.push_back(queue_set_id);
                    break;
                }
            }
            std::thread::yield_now();
        }
        log::debug!("Frame priority barrier {queue_set_id} raised");
    }

    /// Oldest pending id without removing it.
    pub fn front(&self) -> Option<u32> {
        self.pending.lock().front().copied()
    }

    /// Remove and return the oldest pending id.
    pub fn pop(&self) -> Option<u32> {
        let id = self.pending.lock().pop_front();
        if let Some(id) = id {
            log::debug!("Frame priority barrier {id} cleared");
        }
        id
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }
}

impl Default for FramePriorityQueue {
    fn default() -> Self {
        Self::new(16)
    }
}
