//! Outbound response slots and the handles that fill them.
//!
//! Every parsed request gets a slot in the server-wide [`Outbox`] arena and a
//! [`ResponseHandle`] pointing at it by [`SlotId`]. Connections hold the ids
//! of their slots in FIFO order, so responses go out in request order no
//! matter which handle finishes first. Ids are never reused: once a
//! connection is torn down and its slots discarded, a late handle finds
//! nothing and finishing it does nothing.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;

use crate::http::response::Response;
use crate::http::writer::serialize_response;
use crate::server::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

#[derive(Debug)]
enum Slot {
    Pending,
    Ready(BytesMut),
}

#[derive(Debug, Default)]
struct Slots {
    next_id: u64,
    slots: HashMap<SlotId, Slot>,
}

/// Shared arena of queue slots.
#[derive(Debug, Clone)]
pub struct Outbox {
    slots: Arc<Mutex<Slots>>,
    notifier: Notifier,
}

impl Outbox {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots::default())),
            notifier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // a panicking handler can't leave a slot half-written
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a new pending slot.
    pub fn open(&self) -> SlotId {
        let mut slots = self.lock();
        let id = SlotId(slots.next_id);
        slots.next_id += 1;
        slots.slots.insert(id, Slot::Pending);
        id
    }

    /// Opens a slot and pairs it with a fresh handle.
    pub fn handle(&self) -> (SlotId, ResponseHandle) {
        let id = self.open();
        let handle = ResponseHandle {
            response: Response::default(),
            slot: Some(SlotRef {
                id,
                outbox: self.clone(),
            }),
        };
        (id, handle)
    }

    /// Stores the wire bytes and marks the slot ready.
    ///
    /// Returns false if the slot is gone or was already completed.
    pub fn complete(&self, id: SlotId, data: BytesMut) -> bool {
        let mut slots = self.lock();
        match slots.slots.get_mut(&id) {
            Some(slot) if matches!(slot, Slot::Pending) => {
                *slot = Slot::Ready(data);
                true
            }
            _ => false,
        }
    }

    pub fn is_ready(&self, id: SlotId) -> bool {
        matches!(self.lock().slots.get(&id), Some(Slot::Ready(_)))
    }

    /// Removes a ready slot and hands its bytes to the writer.
    pub fn take_ready(&self, id: SlotId) -> Option<BytesMut> {
        let mut slots = self.lock();
        if !matches!(slots.slots.get(&id), Some(Slot::Ready(_))) {
            return None;
        }
        match slots.slots.remove(&id) {
            Some(Slot::Ready(data)) => Some(data),
            _ => None,
        }
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.lock().slots.contains_key(&id)
    }

    /// Drops slots, finalized or not. Later handles for them become no-ops.
    pub fn discard(&self, ids: impl IntoIterator<Item = SlotId>) {
        let mut slots = self.lock();
        for id in ids {
            slots.slots.remove(&id);
        }
    }

    /// Number of live slots across all connections.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct SlotRef {
    id: SlotId,
    outbox: Outbox,
}

/// The user-facing side of a queued response.
///
/// Dereferences to the [`Response`] being built. Call [`finish`] (or
/// [`send`]) when done; a handle dropped without finishing is finished
/// automatically with whatever it holds. The handle is `Send` and may be
/// finished on any thread.
///
/// [`finish`]: ResponseHandle::finish
/// [`send`]: ResponseHandle::send
#[derive(Debug)]
pub struct ResponseHandle {
    response: Response,
    slot: Option<SlotRef>,
}

impl ResponseHandle {
    pub fn slot_id(&self) -> Option<SlotId> {
        self.slot.as_ref().map(|s| s.id)
    }

    /// Serializes the response into its slot and marks it ready.
    ///
    /// Returns false when the connection is already gone; nothing is
    /// written in that case.
    pub fn finish(mut self) -> bool {
        self.finalize()
    }

    /// Replaces the response wholesale, then finishes.
    pub fn send(mut self, response: Response) -> bool {
        self.response = response;
        self.finalize()
    }

    fn finalize(&mut self) -> bool {
        let Some(slot) = self.slot.take() else {
            return false;
        };
        let delivered = slot
            .outbox
            .complete(slot.id, serialize_response(&self.response));
        if delivered {
            slot.outbox.notifier.notify();
        }
        delivered
    }
}

impl Deref for ResponseHandle {
    type Target = Response;

    fn deref(&self) -> &Response {
        &self.response
    }
}

impl DerefMut for ResponseHandle {
    fn deref_mut(&mut self) -> &mut Response {
        &mut self.response
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::StatusCode;
    use crate::server::notify::WakeSocket;

    fn outbox() -> (WakeSocket, Outbox) {
        let (wake, notifier) = WakeSocket::bind().unwrap();
        (wake, Outbox::new(notifier))
    }

    #[test]
    fn finish_marks_slot_ready_once() {
        let (_wake, outbox) = outbox();
        let (id, mut handle) = outbox.handle();
        assert_eq!(handle.slot_id(), Some(id));
        assert!(!outbox.is_ready(id));

        handle.set_status(StatusCode::NotFound);
        handle.set_body("nope");
        assert!(handle.finish());
        assert!(outbox.is_ready(id));

        assert!(!outbox.complete(id, BytesMut::from(&b"again"[..])));
        assert_eq!(
            &outbox.take_ready(id).unwrap()[..],
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\n\r\nnope"
        );
        assert!(outbox.is_empty());
    }

    #[test]
    fn drop_finishes_handle() {
        let (_wake, outbox) = outbox();
        let (id, handle) = outbox.handle();
        drop(handle);

        assert!(outbox.is_ready(id));
    }

    #[test]
    fn finishing_discarded_slot_is_noop() {
        let (_wake, outbox) = outbox();
        let (id, handle) = outbox.handle();
        outbox.discard([id]);

        assert!(!handle.finish());
        assert!(!outbox.contains(id));
        assert!(outbox.take_ready(id).is_none());
    }

    #[test]
    fn take_ready_ignores_pending_slots() {
        let (_wake, outbox) = outbox();
        let (id, handle) = outbox.handle();

        assert!(outbox.take_ready(id).is_none());
        assert!(outbox.contains(id));
        drop(handle);
    }

    #[test]
    fn handle_can_finish_on_another_thread() {
        let (wake, outbox) = outbox();
        let (id, mut handle) = outbox.handle();

        std::thread::spawn(move || {
            handle.set_body("from afar");
            handle.finish()
        })
        .join()
        .unwrap();

        assert!(outbox.is_ready(id));
        // the datagram may still be in flight on a loaded machine
        let _ = wake.drain();
    }
}
