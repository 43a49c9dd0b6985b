//! Ring of resource-reposition events.
//!
//! When a defrag moves data from one buffer to another, clients that still
//! hold offsets into the old buffer need to learn where their bytes went.
//! The uploading thread pushes a [`ResourceRepositionEvent`] into a small
//! ring of slots; clients look events up by id, and the returned
//! [`EventListRef`] keeps the slot from being reused until it is dropped.
//!
//! There is one writer and any number of readers. A slot is only rewritten
//! when no reader references it; if the ring wraps onto a referenced slot the
//! push fails with [`UploadError::EventSlotInUse`], which means the ring is
//! too small for the number of events clients keep alive.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::error::UploadError;
use crate::resources::Resource;
use crate::types::{DefragStep, resolve_offset};

/// Id of a pushed event. Ids start at 1; 0 marks an empty slot.
pub type EventListId = u32;

/// A buffer's live bytes were moved to new offsets, possibly in a new resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceRepositionEvent {
    pub original_resource: Option<Arc<Resource>>,
    pub new_resource: Option<Arc<Resource>>,
    pub defrag_steps: Vec<DefragStep>,
}

impl ResourceRepositionEvent {
    pub fn new(
        original_resource: Arc<Resource>,
        new_resource: Arc<Resource>,
        defrag_steps: Vec<DefragStep>,
    ) -> Self {
        Self {
            original_resource: Some(original_resource),
            new_resource: Some(new_resource),
            defrag_steps,
        }
    }

    /// Whether `resource` is the one that was moved.
    pub fn affects(&self, resource: &Resource) -> bool {
        self.original_resource
            .as_ref()
            .is_some_and(|original| original.id() == resource.id())
    }

    /// New offset of `size` bytes that lived at `offset` in the original resource.
    pub fn resolve_offset(&self, offset: u32, size: u32) -> Option<u32> {
        resolve_offset(offset, size, &self.defrag_steps)
    }
}

#[derive(Debug, Default)]
struct EventSlot {
    id: AtomicU32,
    client_references: AtomicU32,
    event: RwLock<ResourceRepositionEvent>,
}

/// Fixed ring of event slots with per-slot reference counts.
#[derive(Debug)]
pub struct EventList {
    slots: Box<[EventSlot]>,
    write_index: Mutex<usize>,
    written: AtomicU32,
    published: AtomicU32,
    processed: AtomicU32,
}

impl EventList {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: (0..slot_count.max(1)).map(|_| EventSlot::default()).collect(),
            write_index: Mutex::new(0),
            written: AtomicU32::new(0),
            published: AtomicU32::new(0),
            processed: AtomicU32::new(0),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Store `event` in the next slot and return its id.
    ///
    /// # Errors
    ///
    /// [`UploadError::EventSlotInUse`] when a reader still references the slot
    /// the ring has wrapped onto. Nothing is written in that case.
    pub fn push(&self, event: ResourceRepositionEvent) -> Result<EventListId, UploadError> {
        let mut write_index = self.write_index.lock();
        let index = *write_index;
        let slot = &self.slots[index];

        let references = slot.client_references.load(Ordering::SeqCst);
        let mut guard = match (references, slot.event.try_write()) {
            (0, Some(guard)) => guard,
            (references, _) => {
                log::error!(
                    "Event list slot {index} still has {} client references; increase event_list_slots",
                    references.max(1)
                );
                return Err(UploadError::EventSlotInUse {
                    slot: index,
                    references: references.max(1),
                });
            }
        };

        *guard = event;
        let id = self.written.load(Ordering::Relaxed) + 1;
        // Publish the id while the payload is still locked so a reader that
        // acquires the lock afterwards observes both together
        slot.id.store(id, Ordering::SeqCst);
        drop(guard);
        self.written.store(id, Ordering::Release);

        *write_index = (index + 1) % self.slots.len();
        log::debug!("Pushed reposition event {id} into slot {index}");
        Ok(id)
    }

    /// Look up the event with `id`, holding its slot until the guard drops.
    ///
    /// Returns `None` when the id was never pushed, has been overwritten, or
    /// is being overwritten right now.
    pub fn get(&self, id: EventListId) -> Option<EventListRef<'_>> {
        if id == 0 {
            return None;
        }
        let slot = self.slots.iter().find(|slot| slot.id.load(Ordering::SeqCst) == id)?;

        slot.client_references.fetch_add(1, Ordering::SeqCst);
        let undo = || {
            slot.client_references.fetch_sub(1, Ordering::SeqCst);
            None
        };
        if slot.id.load(Ordering::SeqCst) != id {
            return undo();
        }
        let Some(guard) = slot.event.try_read() else {
            return undo();
        };
        if slot.id.load(Ordering::SeqCst) != id {
            drop(guard);
            return undo();
        }

        Some(EventListRef {
            list: self,
            slot,
            id,
            guard: Some(guard),
        })
    }

    /// Mark every event up to `id` as visible to clients.
    pub fn publish(&self, id: EventListId) {
        self.published.store(id, Ordering::Release);
    }

    /// Id of the most recently pushed event.
    pub fn written_id(&self) -> EventListId {
        self.written.load(Ordering::Acquire)
    }

    /// Id most recently passed to [`publish`](Self::publish).
    pub fn published_id(&self) -> EventListId {
        self.published.load(Ordering::Acquire)
    }

    /// Highest id a client marked as processed.
    pub fn processed_id(&self) -> EventListId {
        self.processed.load(Ordering::Acquire)
    }

    /// Outstanding references on the slot holding `id`, 0 if it is not in the ring.
    pub fn client_references(&self, id: EventListId) -> u32 {
        self.slots
            .iter()
            .find(|slot| slot.id.load(Ordering::SeqCst) == id)
            .map_or(0, |slot| slot.client_references.load(Ordering::SeqCst))
    }

    /// Empty every slot. Referenced slots lose their id but keep the payload until released.
    pub fn clear(&self) {
        let _write_index = self.write_index.lock();
        for (index, slot) in self.slots.iter().enumerate() {
            slot.id.store(0, Ordering::SeqCst);
            match slot.event.try_write() {
                Some(mut event) => *event = ResourceRepositionEvent::default(),
                None => log::warn!("Event list slot {index} cleared while a client holds it"),
            }
        }
    }

    fn release(&self, slot: &EventSlot, id: EventListId, silent: bool) {
        slot.client_references.fetch_sub(1, Ordering::SeqCst);
        if !silent {
            self.processed.fetch_max(id, Ordering::AcqRel);
        }
    }
}

/// Read access to one pushed event.
///
/// Dropping the guard releases the slot silently.
/// [`mark_processed`](Self::mark_processed) releases it and raises the
/// processed watermark.
pub struct EventListRef<'a> {
    list: &'a EventList,
    slot: &'a EventSlot,
    id: EventListId,
    guard: Option<RwLockReadGuard<'a, ResourceRepositionEvent>>,
}

impl EventListRef<'_> {
    pub fn id(&self) -> EventListId {
        self.id
    }

    /// Release the slot, optionally without touching the processed watermark.
    pub fn release(mut self, silent: bool) {
        self.release_inner(silent);
    }

    /// Release the slot and record that the client has applied this event.
    pub fn mark_processed(self) {
        self.release(false);
    }

    fn release_inner(&mut self, silent: bool) {
        // The payload lock goes first so a writer that sees zero references can always take it
        if self.guard.take().is_some() {
            self.list.release(self.slot, self.id, silent);
        }
    }
}

impl Deref for EventListRef<'_> {
    type Target = ResourceRepositionEvent;

    fn deref(&self) -> &Self::Target {
        match &self.guard {
            Some(guard) => guard,
            None => unreachable!("event guard used after release"),
        }
    }
}

impl Drop for EventListRef<'_> {
    fn drop(&mut self) {
        self.release_inner(true);
    }
}

impl std::fmt::Debug for EventListRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListRef")
            .field("id", &self.id)
            .field("event", &self.guard.as_deref())
            .finish()
    }
}

static_assertions::assert_impl_all!(EventList: Send, Sync);
