//! # Weft core
//!
//! A lightweight actor runtime for concurrent server applications. The
//! runtime multiplexes thousands of services onto a small pool of worker
//! threads; every service owns a private mailbox, handles one message at a
//! time, and communicates only by asynchronous message passing.
//!
//! ## Architecture
//!
//! - **Handle registry**: 32-bit handles (high 8 bits node id, low 24 bits
//!   slot index) mapped to refcounted service contexts, plus the sorted
//!   name directory.
//! - **Mailboxes**: growable per-service FIFOs with a session lock for
//!   request/response pre-emption, scheduled through a lock-free global
//!   run-queue of runnable mailboxes.
//! - **Scheduler**: N worker threads pulling mailboxes, a timer thread
//!   driving the wheel every 2.5 ms, a socket thread pumping the reactor,
//!   and a monitor thread sweeping the watchdog every 5 s.
//! - **Timer wheel**: 5-level hierarchical wheel at 10 ms per tick with
//!   O(1) insertion and tick-driven cascade.
//! - **Command surface**: text commands (`TIMEOUT`, `REG`, `KILL`,
//!   `LAUNCH`, …) issued through the service context.
//!
//! The module loader, socket reactor, and inter-node transport are
//! external collaborators behind the [`ModuleLoader`], [`SocketReactor`],
//! and transport-service contracts.

pub mod command;
pub mod env;
pub mod error;
pub mod handle;
pub mod harbor;
pub mod mailbox;
pub mod message;
pub mod module;
pub mod monitor;
pub mod node;
pub mod queue;
mod scheduler;
pub mod service;
pub mod socket;
pub mod timer;

pub use env::EnvStore;
pub use error::{EnvError, LaunchError, NameError, ServiceError, SocketError};
pub use handle::Handle;
pub use harbor::{GLOBALNAME_LENGTH, RemoteMessage, RemoteName, RemoteTarget};
pub use message::{MAX_PAYLOAD, Message, Payload, ptype};
pub use module::{
    MAX_MODULE_TYPE, ModuleLoader, SearchPath, Service, ServiceModule, StaticLoader,
};
pub use monitor::WorkerMonitor;
pub use node::{LOGGER_NAME, Runtime, RuntimeBuilder};
pub use service::{ServiceContext, current_handle};
pub use socket::{
    NullReactor, SocketEvent, SocketEventKind, SocketMessage, SocketPoll, SocketReactor,
};
