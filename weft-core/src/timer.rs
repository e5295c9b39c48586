//! Hierarchical timing wheel.
//!
//! One near wheel of 256 slots covers the next 2.56 s at 10 ms per tick;
//! four outer levels of 63 slots each cover the rest of the 32-bit tick
//! range. Insertion is O(1); every 256th tick cascades level 0, every
//! 2^(8+6i)th tick cascades level i. Expired timers become
//! `PTYPE_RESPONSE` messages pushed straight into the owner's mailbox.
//!
//! The clock source is monotonic, sampled at 10 ms granularity; the wall
//! clock is read exactly once to remember the second at which tick 0
//! occurred. A sample that jumps more than one tick cascades once per
//! elapsed tick.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::handle::Handle;
use crate::message::Message;
use crate::node::Node;

const NEAR_SHIFT: u32 = 8;
const NEAR: usize = 1 << NEAR_SHIFT;
const NEAR_MASK: u32 = NEAR as u32 - 1;
const LEVEL_SHIFT: u32 = 6;
const LEVEL: usize = 1 << LEVEL_SHIFT;
const LEVEL_MASK: u32 = LEVEL as u32 - 1;

struct TimerNode {
    expire: u32,
    handle: Handle,
    session: i32,
}

struct Wheel {
    time: u32,
    near: [Vec<TimerNode>; NEAR],
    levels: [[Vec<TimerNode>; LEVEL - 1]; 4],
}

impl Wheel {
    fn new() -> Self {
        Wheel {
            time: 0,
            near: std::array::from_fn(|_| Vec::new()),
            levels: std::array::from_fn(|_| std::array::from_fn(|_| Vec::new())),
        }
    }

    fn add(&mut self, node: TimerNode) {
        let time = node.expire;
        let current = self.time;
        if (time | NEAR_MASK) == (current | NEAR_MASK) {
            self.near[(time & NEAR_MASK) as usize].push(node);
            return;
        }
        let mut mask = (NEAR as u32) << LEVEL_SHIFT;
        let mut level = 0usize;
        while level < 3 {
            if (time | (mask - 1)) == (current | (mask - 1)) {
                break;
            }
            mask <<= LEVEL_SHIFT;
            level += 1;
        }
        let slot = ((time >> (NEAR_SHIFT + level as u32 * LEVEL_SHIFT)) & LEVEL_MASK) as usize;
        assert_ne!(slot, 0, "timer expiry {time} at tick {current} maps to a cascade slot");
        self.levels[level][slot - 1].push(node);
    }

    /// Advance the tick counter and cascade whichever level rolled over.
    fn shift(&mut self) {
        let mut mask = NEAR as u32;
        self.time = self.time.wrapping_add(1);
        let current = self.time;
        let mut time = current >> NEAR_SHIFT;
        let mut level = 0usize;
        while current & (mask - 1) == 0 {
            let index = (time & LEVEL_MASK) as usize;
            if index != 0 {
                let nodes = std::mem::take(&mut self.levels[level][index - 1]);
                for node in nodes {
                    self.add(node);
                }
                break;
            }
            if level >= 3 {
                // The whole 32-bit range rolled over.
                break;
            }
            mask <<= LEVEL_SHIFT;
            time >>= LEVEL_SHIFT;
            level += 1;
        }
    }

    /// Drain the current near slot into `due`, preserving insertion order.
    fn execute(&mut self, due: &mut Vec<TimerNode>) {
        let index = (self.time & NEAR_MASK) as usize;
        while !self.near[index].is_empty() {
            due.append(&mut self.near[index]);
        }
    }
}

pub struct Timer {
    wheel: Mutex<Wheel>,
    /// Last sampled centisecond count, exposed as `now()`.
    current: AtomicU32,
    /// Wall-clock second at which tick 0 occurred.
    starttime: u32,
    origin: Instant,
}

impl Timer {
    pub fn new() -> Self {
        let starttime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        Timer {
            wheel: Mutex::new(Wheel::new()),
            current: AtomicU32::new(0),
            starttime,
            origin: Instant::now(),
        }
    }

    /// Current tick (10 ms units since the runtime started).
    pub fn now(&self) -> u32 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn starttime(&self) -> u32 {
        self.starttime
    }

    /// Schedule a `PTYPE_RESPONSE` for `handle` after `ticks` 10 ms ticks.
    /// Non-positive timeouts deliver immediately without touching the wheel.
    pub fn timeout(&self, node: &Node, handle: Handle, ticks: i32, session: i32) {
        if ticks <= 0 {
            if node.push(handle, Message::response(session)).is_err() {
                tracing::warn!(%handle, session, "dropping timeout for retired service");
            }
            return;
        }
        let mut wheel = self.wheel.lock();
        let expire = wheel.time.wrapping_add(ticks as u32);
        wheel.add(TimerNode {
            expire,
            handle,
            session,
        });
    }

    /// Drive the wheel forward `ticks` ticks, delivering expiries in order.
    pub fn advance(&self, node: &Node, ticks: u32) {
        for _ in 0..ticks {
            let due = {
                let mut wheel = self.wheel.lock();
                let mut due = Vec::new();
                // Dispatch timers landing on the current tick first (rare:
                // an expiry inserted for the still-current slot).
                wheel.execute(&mut due);
                wheel.shift();
                wheel.execute(&mut due);
                due
            };
            for timer in due {
                if node.push(timer.handle, Message::response(timer.session)).is_err() {
                    tracing::debug!(handle = %timer.handle, "timer expiry for retired service");
                }
            }
        }
    }

    /// Sample the monotonic clock and advance the wheel by however many
    /// ticks elapsed since the last sample.
    pub fn update(&self, node: &Node) {
        let sample = (self.origin.elapsed().as_millis() / 10) as u32;
        let previous = self.current.load(Ordering::Relaxed);
        if sample != previous {
            self.current.store(sample, Ordering::Relaxed);
            self.advance(node, sample.wrapping_sub(previous));
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Timer::new()
    }
}
