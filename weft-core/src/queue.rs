//! Global run-queue: a fixed-size ring of runnable mailboxes.
//!
//! Producers fetch-and-add the tail, store the mailbox pointer, then publish
//! the slot with a release store of its flag. Consumers check the flag at
//! the head, claim the slot by CAS on the head, and clear the flag. FIFO
//! among mailboxes; a mailbox appears at most once (enforced by the mailbox
//! scheduling state, not by the ring).
//!
//! Capacity is sized generously: active mailboxes ≤ active services, far
//! below 64 K. Overflow means the deployment is misconfigured and is fatal.

use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};

use crate::mailbox::Mailbox;

const QUEUE_SIZE: usize = 0x10000;

struct Slot {
    mailbox: AtomicPtr<Mailbox>,
    published: AtomicBool,
}

pub struct GlobalQueue {
    head: AtomicU32,
    tail: AtomicU32,
    slots: Box<[Slot]>,
}

impl GlobalQueue {
    pub fn new() -> Self {
        let slots = (0..QUEUE_SIZE)
            .map(|_| Slot {
                mailbox: AtomicPtr::new(ptr::null_mut()),
                published: AtomicBool::new(false),
            })
            .collect();
        GlobalQueue {
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            slots,
        }
    }

    /// Enqueue a runnable mailbox.
    pub fn push(&self, mailbox: Arc<Mailbox>) {
        let tail = self.tail.fetch_add(1, Ordering::AcqRel);
        let head = self.head.load(Ordering::Acquire);
        assert!(
            tail.wrapping_sub(head) < QUEUE_SIZE as u32,
            "global run-queue overflow ({QUEUE_SIZE} slots); more runnable mailboxes than the ring can hold"
        );
        let slot = &self.slots[tail as usize & (QUEUE_SIZE - 1)];
        // Ownership of one Arc reference moves into the slot until a
        // consumer claims it.
        slot.mailbox
            .store(Arc::into_raw(mailbox).cast_mut(), Ordering::Relaxed);
        slot.published.store(true, Ordering::Release);
    }

    /// Dequeue the next runnable mailbox. Returns `None` when the queue is
    /// empty or another consumer won the head; callers treat both as "try
    /// again later".
    pub fn pop(&self) -> Option<Arc<Mailbox>> {
        let head = self.head.load(Ordering::Acquire);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }
        let slot = &self.slots[head as usize & (QUEUE_SIZE - 1)];
        if !slot.published.load(Ordering::Acquire) {
            // Producer reserved the slot but has not published it yet.
            return None;
        }
        if self
            .head
            .compare_exchange(head, head.wrapping_add(1), Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        // The CAS makes this thread the sole owner of the slot.
        let raw = slot.mailbox.swap(ptr::null_mut(), Ordering::Relaxed);
        slot.published.store(false, Ordering::Release);
        debug_assert!(!raw.is_null());
        Some(unsafe { Arc::from_raw(raw) })
    }
}

impl Default for GlobalQueue {
    fn default() -> Self {
        GlobalQueue::new()
    }
}

impl Drop for GlobalQueue {
    fn drop(&mut self) {
        // Reclaim the Arc references still parked in the ring.
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;

    fn mailbox(index: u32) -> Arc<Mailbox> {
        Mailbox::new(Handle::from_raw(index))
    }

    #[test]
    fn fifo_among_mailboxes() {
        let queue = GlobalQueue::new();
        for index in 1..=5 {
            queue.push(mailbox(index));
        }
        for index in 1..=5 {
            let popped = queue.pop().expect("queue should not be empty");
            assert_eq!(popped.handle(), Handle::from_raw(index));
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn empty_pop_is_none() {
        let queue = GlobalQueue::new();
        assert!(queue.pop().is_none());
    }

    #[test]
    fn slot_references_survive_queue_drop() {
        let queue = GlobalQueue::new();
        let parked = mailbox(9);
        queue.push(parked.clone());
        drop(queue);
        // The ring's reference was reclaimed; ours is the only one left.
        assert_eq!(Arc::strong_count(&parked), 1);
    }

    #[test]
    fn concurrent_producers_and_consumers_lose_nothing() {
        let queue = Arc::new(GlobalQueue::new());
        let total = 1000u32;

        std::thread::scope(|scope| {
            for producer in 0..4u32 {
                let queue = queue.clone();
                scope.spawn(move || {
                    for i in 0..total / 4 {
                        queue.push(mailbox(producer * total + i + 1));
                    }
                });
            }

            let mut popped = 0;
            while popped < total {
                if queue.pop().is_some() {
                    popped += 1;
                }
            }
        });
        assert!(queue.pop().is_none());
    }
}
