//! Per-service mailboxes.
//!
//! A mailbox is a growable FIFO of messages plus the scheduling state that
//! decides whether it sits in the global run-queue. The state machine:
//!
//! - `Out`: not runnable; the next push enqueues it.
//! - `In`: in the global run-queue, or currently being dispatched from.
//! - `Dispatching`: being dispatched with a locked session set.
//! - `Locked`: dispatch finished while the session lock was held; the
//!   matching response re-enqueues it.
//!
//! A push whose session matches the locked session jumps to the head of the
//! queue and releases the lock (the response path). Exactly one worker at a
//! time dequeues from a given mailbox; the run-queue discipline guarantees
//! it because a mailbox is present there at most once.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handle::Handle;
use crate::message::Message;
use crate::queue::GlobalQueue;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ScheduleState {
    Out,
    In,
    Dispatching,
    Locked,
}

struct MailboxInner {
    queue: VecDeque<Message>,
    state: ScheduleState,
    lock_session: i32,
    release: bool,
}

pub struct Mailbox {
    handle: Handle,
    inner: Mutex<MailboxInner>,
}

impl Mailbox {
    /// A new mailbox starts in the `In` state so the bootstrap enqueue can
    /// schedule it without a state transition.
    pub fn new(handle: Handle) -> Arc<Mailbox> {
        Arc::new(Mailbox {
            handle,
            inner: Mutex::new(MailboxInner {
                queue: VecDeque::with_capacity(DEFAULT_CAPACITY),
                state: ScheduleState::In,
                lock_session: 0,
                release: false,
            }),
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current ring capacity; grows by doubling as the queue backs up.
    pub fn capacity(&self) -> usize {
        self.inner.lock().queue.capacity()
    }

    /// Append a message, or insert it at the head when its session matches
    /// the locked session (which also releases the lock). Enqueues the
    /// mailbox on the global run-queue when it becomes runnable.
    pub fn push(self: &Arc<Self>, global: &GlobalQueue, message: Message) {
        let mut inner = self.inner.lock();
        if inner.lock_session != 0 && message.session == inner.lock_session {
            inner.queue.push_front(message);
            Self::unlock_inner(&mut inner, self, global);
        } else {
            inner.queue.push_back(message);
            if inner.lock_session == 0 && inner.state == ScheduleState::Out {
                inner.state = ScheduleState::In;
                global.push(self.clone());
            }
        }
    }

    /// Pop the head message. Leaving the mailbox empty transitions it to
    /// `Out`.
    pub fn pop(&self) -> Option<Message> {
        let mut inner = self.inner.lock();
        let message = inner.queue.pop_front();
        if message.is_none() {
            inner.state = ScheduleState::Out;
        }
        message
    }

    /// Arm the session lock for the next request/response exchange. Must be
    /// called while the owner is dispatching (state `In`, no lock set).
    pub fn lock(&self, session: i32) {
        let mut inner = self.inner.lock();
        assert_eq!(inner.lock_session, 0, "mailbox session lock already set");
        assert_eq!(inner.state, ScheduleState::In);
        inner.state = ScheduleState::Dispatching;
        inner.lock_session = session;
    }

    /// Drop the session lock without a matching response.
    pub fn unlock(self: &Arc<Self>, global: &GlobalQueue) {
        let mut inner = self.inner.lock();
        Self::unlock_inner(&mut inner, self, global);
    }

    fn unlock_inner(inner: &mut MailboxInner, this: &Arc<Self>, global: &GlobalQueue) {
        if inner.state == ScheduleState::Locked {
            inner.state = ScheduleState::In;
            global.push(this.clone());
        } else {
            assert_eq!(inner.state, ScheduleState::Dispatching);
        }
        inner.lock_session = 0;
    }

    /// Re-enqueue after a dispatch. While a session lock is pending the
    /// mailbox parks in `Locked` instead and waits for the response push.
    pub fn push_global(self: &Arc<Self>, global: &GlobalQueue) {
        let mut inner = self.inner.lock();
        assert_ne!(inner.state, ScheduleState::Out);
        if inner.state == ScheduleState::Dispatching {
            inner.state = ScheduleState::Locked;
        }
        if inner.lock_session == 0 {
            inner.state = ScheduleState::In;
            global.push(self.clone());
        }
    }

    /// Enqueue without a state transition; the mailbox must already count as
    /// scheduled (used for the bootstrap message after init).
    pub fn force_push(self: &Arc<Self>, global: &GlobalQueue) {
        let inner = self.inner.lock();
        assert_ne!(inner.state, ScheduleState::Out);
        drop(inner);
        global.push(self.clone());
    }

    /// Flag the mailbox for drainage and make sure a worker will encounter
    /// it once more.
    pub fn mark_release(self: &Arc<Self>, global: &GlobalQueue) {
        let mut inner = self.inner.lock();
        assert!(!inner.release, "mailbox already marked for release");
        inner.release = true;
        if inner.state != ScheduleState::In {
            global.push(self.clone());
        }
    }

    /// Drain the mailbox if it was marked for release, returning the number
    /// of messages dropped; otherwise hand it back to the run-queue for a
    /// later encounter and return 0.
    pub fn release(self: &Arc<Self>, global: &GlobalQueue) -> usize {
        let mut inner = self.inner.lock();
        if inner.release {
            let dropped = inner.queue.len();
            inner.queue.clear();
            inner.state = ScheduleState::Out;
            dropped
        } else {
            assert_ne!(inner.state, ScheduleState::Out);
            global.push(self.clone());
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ptype;

    fn message(session: i32, text: &str) -> Message {
        Message::new(Handle::from_raw(0x100_0001), session, ptype::CLIENT, text.into())
    }

    fn drain_queue(global: &GlobalQueue) -> usize {
        let mut n = 0;
        while global.pop().is_some() {
            n += 1;
        }
        n
    }

    #[test]
    fn push_pop_fifo() {
        let global = GlobalQueue::new();
        let mailbox = Mailbox::new(Handle::from_raw(1));
        for i in 0..10 {
            mailbox.push(&global, message(i, &format!("m{i}")));
        }
        for i in 0..10 {
            let m = mailbox.pop().expect("message expected");
            assert_eq!(m.session, i);
        }
        assert!(mailbox.pop().is_none());
    }

    #[test]
    fn becomes_runnable_once_per_drain_cycle() {
        let global = GlobalQueue::new();
        let mailbox = Mailbox::new(Handle::from_raw(1));

        // Fresh mailboxes count as scheduled; pushes do not re-enqueue.
        mailbox.push(&global, message(0, "a"));
        mailbox.push(&global, message(0, "b"));
        assert_eq!(drain_queue(&global), 0);

        // Draining flips it to Out; the next push enqueues exactly once.
        while mailbox.pop().is_some() {}
        mailbox.push(&global, message(0, "c"));
        mailbox.push(&global, message(0, "d"));
        assert_eq!(drain_queue(&global), 1);
    }

    #[test]
    fn capacity_grows_by_doubling_and_preserves_order() {
        let global = GlobalQueue::new();
        let mailbox = Mailbox::new(Handle::from_raw(1));
        let initial = mailbox.capacity();
        assert!(initial >= DEFAULT_CAPACITY);

        let mut last = initial;
        for i in 0..10_000 {
            mailbox.push(&global, message(i, "x"));
            let cap = mailbox.capacity();
            if cap != last {
                assert!(cap >= last * 2, "growth {last} -> {cap} is not doubling");
                last = cap;
            }
        }
        assert!(mailbox.capacity() >= 10_000);
        for i in 0..10_000 {
            assert_eq!(mailbox.pop().unwrap().session, i);
        }
        drain_queue(&global);
    }

    #[test]
    fn locked_session_response_jumps_the_queue() {
        let global = GlobalQueue::new();
        let mailbox = Mailbox::new(Handle::from_raw(1));

        // Owner is mid-dispatch and locks for session 42.
        mailbox.lock(42);

        mailbox.push(&global, message(99, "other"));
        // Non-matching pushes while locked must not re-enqueue globally.
        assert_eq!(drain_queue(&global), 0);

        // Dispatch ends; the mailbox parks in Locked.
        mailbox.push_global(&global);
        assert_eq!(drain_queue(&global), 0);

        // The matching response jumps the head and re-enqueues.
        mailbox.push(&global, message(42, "reply"));
        assert_eq!(drain_queue(&global), 1);

        assert_eq!(mailbox.pop().unwrap().session, 42);
        assert_eq!(mailbox.pop().unwrap().session, 99);
    }

    #[test]
    fn unlock_without_response_reenqueues() {
        let global = GlobalQueue::new();
        let mailbox = Mailbox::new(Handle::from_raw(1));

        mailbox.lock(7);
        mailbox.push_global(&global);
        assert_eq!(drain_queue(&global), 0);

        mailbox.unlock(&global);
        assert_eq!(drain_queue(&global), 1);

        // Lock released: pushes behave normally again.
        while mailbox.pop().is_some() {}
        mailbox.push(&global, message(7, "late"));
        assert_eq!(mailbox.pop().unwrap().session, 7);
    }

    #[test]
    fn release_drains_marked_mailboxes() {
        let global = GlobalQueue::new();
        let mailbox = Mailbox::new(Handle::from_raw(1));
        mailbox.push(&global, message(1, "a"));
        mailbox.push(&global, message(2, "b"));

        mailbox.mark_release(&global);
        assert_eq!(mailbox.release(&global), 2);
        assert!(mailbox.is_empty());

        // Messages pushed after release are dropped by the next encounter.
        mailbox.push(&global, message(3, "late"));
        assert_eq!(mailbox.release(&global), 1);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn release_unmarked_hands_back_to_queue() {
        let global = GlobalQueue::new();
        let mailbox = Mailbox::new(Handle::from_raw(1));
        mailbox.push(&global, message(1, "a"));
        assert_eq!(mailbox.release(&global), 0);
        assert_eq!(drain_queue(&global), 1);
        assert_eq!(mailbox.len(), 1);
    }
}
