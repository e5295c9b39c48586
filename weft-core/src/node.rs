//! The runtime value owning every subsystem.
//!
//! There are no process-wide globals: the environment store, handle
//! registry, run-queue, module table, timer, and socket reactor all hang
//! off one [`Node`], built in dependency order and reached through a
//! runtime handle. Service contexts keep an `Arc` to the node, so the node
//! outlives every service.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use tracing::debug;

use crate::env::EnvStore;
use crate::error::{LaunchError, NameError};
use crate::handle::{Handle, HandleRegistry};
use crate::harbor::Harbor;
use crate::message::{Message, Payload, ptype};
use crate::module::{ModuleLoader, ModuleRegistry, SearchPath, StaticLoader};
use crate::monitor::WorkerMonitor;
use crate::queue::GlobalQueue;
use crate::scheduler;
use crate::service;
use crate::socket::{NullReactor, SocketPoll, SocketReactor};
use crate::timer::Timer;

/// Local name the runtime reports diagnostics to (`PTYPE_TEXT`).
pub const LOGGER_NAME: &str = "logger";

pub struct Node {
    pub(crate) env: EnvStore,
    pub(crate) harbor: Harbor,
    pub(crate) handles: HandleRegistry,
    pub(crate) queue: GlobalQueue,
    pub(crate) modules: ModuleRegistry,
    pub(crate) timer: Timer,
    pub(crate) reactor: Box<dyn SocketReactor>,
    /// Live service count; the scheduler shuts down when it reaches zero.
    pub(crate) total: AtomicI32,
    monitor_exit: AtomicU32,
}

/// What the socket thread should do after one poll.
pub(crate) enum SocketDrive {
    Exit,
    /// More completions pending; poll again before waking anyone.
    More,
    /// Delivered one event; wake a worker.
    Wake,
}

impl Node {
    fn new(
        harbor: u8,
        search: SearchPath,
        loader: Box<dyn ModuleLoader>,
        reactor: Box<dyn SocketReactor>,
    ) -> Arc<Node> {
        // Init order: env → harbor → handles → run-queue → modules → timer
        // → socket. Teardown happens in reverse as the node drops.
        Arc::new(Node {
            env: EnvStore::new(),
            harbor: Harbor::new(harbor),
            handles: HandleRegistry::new(harbor),
            queue: GlobalQueue::new(),
            modules: ModuleRegistry::new(search, loader),
            timer: Timer::new(),
            reactor,
            total: AtomicI32::new(0),
            monitor_exit: AtomicU32::new(0),
        })
    }

    /// Deliver a message into the destination's mailbox. The message comes
    /// back when the destination is gone.
    pub(crate) fn push(&self, destination: Handle, message: Message) -> Result<(), Message> {
        match self.handles.grab(destination) {
            Some(ctx) => {
                ctx.mailbox().push(&self.queue, message);
                Ok(())
            }
            None => Err(message),
        }
    }

    pub fn live_services(&self) -> i32 {
        self.total.load(Ordering::Acquire)
    }

    pub(crate) fn monitor_exit(&self) -> Option<Handle> {
        match self.monitor_exit.load(Ordering::Acquire) {
            0 => None,
            raw => Some(Handle::from_raw(raw)),
        }
    }

    pub(crate) fn set_monitor_exit(&self, handle: Handle) {
        self.monitor_exit.store(handle.raw(), Ordering::Release);
    }

    pub(crate) fn flag_endless(&self, handle: Handle) {
        if let Some(ctx) = self.handles.grab(handle) {
            ctx.set_endless();
        }
    }

    /// Surface a runtime diagnostic through the logger service; fall back
    /// to tracing when none is registered (early bootstrap, tests).
    pub(crate) fn report(&self, source: Handle, text: String) {
        if let Some(logger) = self.handles.find_name(LOGGER_NAME) {
            let message = Message::new(source, 0, ptype::TEXT, Payload::new(text.clone().into_bytes()));
            if self.push(logger, message).is_ok() {
                return;
            }
        }
        debug!(source = %source, "{text}");
    }

    /// One socket-thread iteration: poll the reactor and forward the event
    /// to its owner as a `PTYPE_SOCKET` message.
    pub(crate) fn poll_socket(&self) -> SocketDrive {
        match self.reactor.poll() {
            SocketPoll::Exit => SocketDrive::Exit,
            SocketPoll::Event { event, more } => {
                let owner = event.owner;
                let wire = crate::socket::SocketMessage {
                    kind: event.kind,
                    id: event.id,
                    ud: event.ud,
                    buffer: event.data,
                };
                let message =
                    Message::new(Handle::NULL, 0, ptype::SOCKET, Payload::new(wire.encode()));
                if self.push(owner, message).is_err() {
                    debug!(owner = %owner, "socket event for retired service dropped");
                }
                if more { SocketDrive::More } else { SocketDrive::Wake }
            }
        }
    }
}

/// Builder for a [`Runtime`], configured in the bootstrap order the
/// subsystems need.
pub struct RuntimeBuilder {
    harbor: u8,
    module_path: String,
    loader: Box<dyn ModuleLoader>,
    reactor: Box<dyn SocketReactor>,
}

impl RuntimeBuilder {
    /// Node id, 1..=255.
    pub fn harbor(mut self, harbor: u8) -> Self {
        assert!(harbor != 0, "node id 0 is reserved");
        self.harbor = harbor;
        self
    }

    /// `;`-separated `?`-placeholder search path handed to the loader.
    pub fn module_path(mut self, path: &str) -> Self {
        self.module_path = path.to_string();
        self
    }

    pub fn loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn reactor(mut self, reactor: impl SocketReactor + 'static) -> Self {
        self.reactor = Box::new(reactor);
        self
    }

    pub fn build(self) -> Runtime {
        Runtime {
            node: Node::new(
                self.harbor,
                SearchPath::parse(&self.module_path),
                self.loader,
                self.reactor,
            ),
        }
    }
}

/// The assembled runtime. Launch services, then call [`Runtime::run`]; it
/// returns once every service has exited.
pub struct Runtime {
    node: Arc<Node>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder {
            harbor: 1,
            module_path: String::new(),
            loader: Box::new(StaticLoader::new()),
            reactor: Box::new(NullReactor::new()),
        }
    }

    pub fn env(&self) -> &EnvStore {
        &self.node.env
    }

    /// Create a service from a module name, run its init, and schedule its
    /// mailbox. On init failure the service is retired and its mailbox
    /// drained.
    pub fn launch(&self, module: &str, param: Option<&str>) -> Result<Handle, LaunchError> {
        service::launch(&self.node, module, param)
    }

    /// Bind a local name outside the command surface (bootstrap wiring).
    pub fn bind_name(&self, handle: Handle, name: &str) -> Result<(), NameError> {
        self.node.handles.bind_name(handle, name).map(|_| ())
    }

    /// Install the transport service that carries inter-node traffic.
    pub fn set_transport(&self, handle: Handle) {
        self.node.harbor.set_remote(handle);
    }

    /// Issue a command on behalf of a launched service; bootstrap helper.
    pub fn command(&self, handle: Handle, cmd: &str, param: Option<&str>) -> Option<String> {
        self.node.handles.grab(handle)?.command(cmd, param)
    }

    pub fn live_services(&self) -> i32 {
        self.node.live_services()
    }

    /// Run the worker pool plus the timer, socket, and monitor threads.
    /// Blocks until the live service count reaches zero.
    pub fn run(&self, threads: usize) {
        scheduler::run(&self.node, threads);
    }

    /// One worker-loop iteration without the thread pool; deterministic
    /// drive for embedders and tests. Returns `true` when the run-queue was
    /// empty.
    pub fn dispatch_once(&self, monitor: &WorkerMonitor) -> bool {
        service::dispatch_message(&self.node, monitor)
    }

    /// Drive the timer wheel forward without the timer thread.
    pub fn advance_timer(&self, ticks: u32) {
        self.node.timer.advance(&self.node, ticks);
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("node", &self.node.harbor.node())
            .field("live_services", &self.live_services())
            .finish()
    }
}
