//! The thread pool: workers, timer, socket, and monitor threads.
//!
//! Workers pop runnable mailboxes from the global run-queue and dispatch
//! one message each. A worker that finds the queue empty parks on the pool
//! condvar; the timer and socket threads wake one worker when they inject
//! work, but only if every other worker is already asleep. A spurious
//! wakeup is harmless because workers re-check the queue.
//!
//! Shutdown is cooperative: every thread watches the live service count and
//! exits when it reaches zero; the timer thread additionally asks the
//! socket reactor to exit and broadcasts the condvar so sleepers wake up to
//! observe the condition.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::monitor::WorkerMonitor;
use crate::node::{Node, SocketDrive};
use crate::service;

/// Timer thread cadence; a quarter of the 10 ms tick.
const TIMER_RESOLUTION: Duration = Duration::from_micros(2500);
/// Watchdog sweep interval.
const MONITOR_INTERVAL_SECS: usize = 5;
/// Upper bound on how long a worker stays parked before re-checking for
/// shutdown; guards against a wakeup racing the final broadcast.
const WORKER_PARK: Duration = Duration::from_millis(100);

struct Pool {
    count: usize,
    sleeping: Mutex<usize>,
    wake: Condvar,
    monitors: Vec<Arc<WorkerMonitor>>,
}

impl Pool {
    fn new(count: usize) -> Self {
        Pool {
            count,
            sleeping: Mutex::new(0),
            wake: Condvar::new(),
            monitors: (0..count).map(|_| Arc::new(WorkerMonitor::new())).collect(),
        }
    }

    /// Wake one worker if at most `busy` of them are expected to be awake.
    fn wakeup(&self, busy: usize) {
        if *self.sleeping.lock() >= self.count - busy {
            self.wake.notify_one();
        }
    }
}

fn shutting_down(node: &Node) -> bool {
    node.live_services() == 0
}

fn monitor_main(node: &Arc<Node>, pool: &Pool) {
    'sweep: loop {
        if shutting_down(node) {
            break;
        }
        for monitor in &pool.monitors {
            monitor.check(node);
        }
        for _ in 0..MONITOR_INTERVAL_SECS {
            if shutting_down(node) {
                break 'sweep;
            }
            thread::sleep(Duration::from_secs(1));
        }
    }
}

fn timer_main(node: &Arc<Node>, pool: &Pool) {
    loop {
        node.timer.update(node);
        if shutting_down(node) {
            break;
        }
        pool.wakeup(pool.count - 1);
        thread::sleep(TIMER_RESOLUTION);
    }
    // Wake the socket thread, then every parked worker, so all of them
    // observe the shutdown condition.
    node.reactor.exit();
    pool.wake.notify_all();
}

fn socket_main(node: &Arc<Node>, pool: &Pool) {
    loop {
        match node.poll_socket() {
            SocketDrive::Exit => break,
            SocketDrive::More => {
                if shutting_down(node) {
                    break;
                }
            }
            SocketDrive::Wake => pool.wakeup(0),
        }
    }
}

fn worker_main(node: &Arc<Node>, pool: &Pool, id: usize) {
    let monitor = pool.monitors[id].clone();
    loop {
        let empty = service::dispatch_message(node, &monitor);
        if !empty {
            continue;
        }
        if shutting_down(node) {
            break;
        }
        let mut sleeping = pool.sleeping.lock();
        *sleeping += 1;
        // The bounded wait covers the race between this worker deciding to
        // park and the timer thread's final broadcast.
        let _ = pool.wake.wait_for(&mut sleeping, WORKER_PARK);
        *sleeping -= 1;
    }
}

/// Run the scheduler until the live service count reaches zero. Spawns
/// `threads` workers plus the monitor, timer, and socket threads and joins
/// them all before returning.
pub(crate) fn run(node: &Arc<Node>, threads: usize) {
    assert!(threads > 0, "at least one worker thread is required");
    let pool = Arc::new(Pool::new(threads));

    thread::scope(|scope| {
        {
            let node = node.clone();
            let pool = pool.clone();
            thread::Builder::new()
                .name("weft-monitor".to_string())
                .spawn_scoped(scope, move || monitor_main(&node, &pool))
                .expect("failed to spawn monitor thread");
        }
        {
            let node = node.clone();
            let pool = pool.clone();
            thread::Builder::new()
                .name("weft-timer".to_string())
                .spawn_scoped(scope, move || timer_main(&node, &pool))
                .expect("failed to spawn timer thread");
        }
        {
            let node = node.clone();
            let pool = pool.clone();
            thread::Builder::new()
                .name("weft-socket".to_string())
                .spawn_scoped(scope, move || socket_main(&node, &pool))
                .expect("failed to spawn socket thread");
        }
        for id in 0..threads {
            let node = node.clone();
            let pool = pool.clone();
            thread::Builder::new()
                .name(format!("weft-worker-{id}"))
                .spawn_scoped(scope, move || worker_main(&node, &pool, id))
                .expect("failed to spawn worker thread");
        }
    });
}
