//! Service contexts and the dispatch path.
//!
//! A context ties a module instance to its handle and mailbox. References
//! are counted by `Arc`: the registry holds one, the launch path holds one
//! until it returns, and every in-flight grab holds one. When the last
//! reference drops, the instance is released, the mailbox is marked for
//! drainage, and the node's live total falls. Once the total reaches zero
//! the scheduler threads shut down.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::LaunchError;
use crate::handle::Handle;
use crate::harbor::RemoteTarget;
use crate::mailbox::Mailbox;
use crate::message::{MAX_PAYLOAD, Message, Payload, ptype};
use crate::module::Service;
use crate::monitor::WorkerMonitor;
use crate::node::Node;

thread_local! {
    static CURRENT_HANDLE: Cell<u32> = const { Cell::new(0) };
}

/// Handle of the service whose callback is running on this thread, if any.
pub fn current_handle() -> Option<Handle> {
    match CURRENT_HANDLE.get() {
        0 => None,
        raw => Some(Handle::from_raw(raw)),
    }
}

struct CurrentHandleGuard;

impl CurrentHandleGuard {
    fn enter(handle: Handle) -> Self {
        CURRENT_HANDLE.set(handle.raw());
        CurrentHandleGuard
    }
}

impl Drop for CurrentHandleGuard {
    fn drop(&mut self) {
        CURRENT_HANDLE.set(0);
    }
}

pub struct ServiceContext {
    pub(crate) node: Arc<Node>,
    handle: Handle,
    module: String,
    mailbox: Arc<Mailbox>,
    /// The module instance. `None` only while the context is being torn
    /// down. Dispatch holds this lock for the duration of the callback,
    /// which is what serializes a service's callbacks.
    instance: Mutex<Option<Box<dyn Service>>>,
    session: AtomicI32,
    initialized: AtomicBool,
    endless: AtomicBool,
}

impl ServiceContext {
    fn new(
        node: Arc<Node>,
        handle: Handle,
        module: &str,
        instance: Box<dyn Service>,
    ) -> Arc<ServiceContext> {
        node.total.fetch_add(1, Ordering::AcqRel);
        Arc::new(ServiceContext {
            mailbox: Mailbox::new(handle),
            node,
            handle,
            module: module.to_string(),
            instance: Mutex::new(Some(instance)),
            session: AtomicI32::new(0),
            initialized: AtomicBool::new(false),
            endless: AtomicBool::new(false),
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    /// Allocate the next session id: a positive 31-bit integer, wrapping.
    pub fn new_session(&self) -> i32 {
        self.session
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |session| {
                Some(session.wrapping_add(1) & 0x7fff_ffff)
            })
            .map(|previous| previous.wrapping_add(1) & 0x7fff_ffff)
            .unwrap_or(0)
    }

    /// The session `LOCK` arms: the one the next allocation will return.
    pub(crate) fn peek_next_session(&self) -> i32 {
        self.session.load(Ordering::Acquire).wrapping_add(1) & 0x7fff_ffff
    }

    pub(crate) fn initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn set_endless(&self) {
        self.endless.store(true, Ordering::Release);
    }

    /// Read and clear the endless-loop flag (the `ENDLESS` command).
    pub fn take_endless(&self) -> bool {
        self.endless.swap(false, Ordering::AcqRel)
    }

    /// Send a message. `source` defaults to this service; a null
    /// destination performs no send and just returns the (possibly
    /// allocated) session, which is how callers mint request sessions.
    ///
    /// `message_type` is a `ptype` value optionally OR-ed with
    /// `TAG_ALLOCSESSION` and `TAG_DONTCOPY`; the tags are stripped before
    /// delivery. Payload buffers are always moved, never copied, so
    /// `TAG_DONTCOPY` only exists for wire compatibility.
    pub fn send(
        &self,
        source: Option<Handle>,
        destination: Handle,
        message_type: u32,
        session: i32,
        payload: Payload,
    ) -> i32 {
        let (message_type, session) = self.filter_tags(message_type, session);
        let source = source.unwrap_or(self.handle);
        if destination.is_null() {
            return session;
        }
        if self.node.harbor.is_remote(destination) {
            self.node.harbor.send(
                &self.node,
                RemoteTarget::Handle(destination),
                source,
                message_type,
                session,
                payload,
            );
        } else {
            let message = Message::new(source, session, message_type, payload);
            if let Err(dropped) = self.node.push(destination, message) {
                warn!(
                    source = %source,
                    destination = %destination,
                    size = dropped.payload.len(),
                    "drop message to retired service"
                );
                self.node.report(
                    Handle::NULL,
                    format!(
                        "Drop message from {source} to {destination} (type={message_type})(size={})",
                        dropped.payload.len()
                    ),
                );
            }
        }
        session
    }

    /// Send to a textual address: `:hex`, `.local-name`, or a bare global
    /// name routed through the transport service.
    pub fn send_name(
        &self,
        address: &str,
        message_type: u32,
        session: i32,
        payload: Payload,
    ) -> i32 {
        if let Some(destination) = Handle::parse_hex(address) {
            return self.send(None, destination, message_type, session, payload);
        }
        if let Some(local) = address.strip_prefix('.') {
            return match self.node.handles.find_name(local) {
                Some(destination) => self.send(None, destination, message_type, session, payload),
                None => {
                    warn!(address, "drop message to unknown local name");
                    session
                }
            };
        }
        let (message_type, session) = self.filter_tags(message_type, session);
        self.node.harbor.send(
            &self.node,
            RemoteTarget::Named(address.to_string()),
            self.handle,
            message_type,
            session,
            payload,
        );
        session
    }

    /// Resolve a `:hex` or `.name` address to a handle.
    pub fn query_name(&self, address: &str) -> Option<Handle> {
        if let Some(handle) = Handle::parse_hex(address) {
            return Some(handle);
        }
        if let Some(local) = address.strip_prefix('.') {
            return self.node.handles.find_name(local);
        }
        warn!(address, "global name queries are not supported");
        None
    }

    /// Socket pass-throughs: services drive the reactor through their
    /// context, never directly. Completions come back as `PTYPE_SOCKET`
    /// messages addressed to this service.
    pub fn socket_listen(
        &self,
        host: &str,
        port: u16,
        backlog: i32,
    ) -> Result<i32, crate::error::SocketError> {
        self.node.reactor.listen(self.handle, host, port, backlog)
    }

    pub fn socket_connect(&self, host: &str, port: u16) -> Result<i32, crate::error::SocketError> {
        self.node.reactor.connect(self.handle, host, port)
    }

    pub fn socket_send(&self, id: i32, data: Vec<u8>) -> Result<(), crate::error::SocketError> {
        self.node.reactor.send(id, data)
    }

    pub fn socket_close(&self, id: i32) {
        self.node.reactor.close(self.handle, id);
    }

    pub fn socket_start(&self, id: i32) {
        self.node.reactor.start(self.handle, id);
    }

    fn filter_tags(&self, message_type: u32, session: i32) -> (u32, i32) {
        let mut session = session;
        if message_type & ptype::TAG_ALLOCSESSION != 0 {
            assert_eq!(session, 0, "ALLOCSESSION requires a zero session");
            session = self.new_session();
        }
        (message_type & ptype::MASK, session)
    }

    /// Run the service callback for one message.
    fn invoke(&self, message: Message) {
        assert!(self.initialized(), "dispatch before init completed");
        debug_assert!(message.payload.len() <= MAX_PAYLOAD);
        let mut slot = self.instance.lock();
        let Some(instance) = slot.as_mut() else {
            // Context mid-teardown; the message dies with the mailbox.
            return;
        };
        let _guard = CurrentHandleGuard::enter(self.handle);
        instance.message(self, message);
    }

    #[cfg(test)]
    pub(crate) fn for_tests(node: Arc<Node>, handle: Handle) -> Arc<ServiceContext> {
        node.total.fetch_add(1, Ordering::AcqRel);
        Arc::new(ServiceContext {
            mailbox: Mailbox::new(handle),
            node,
            handle,
            module: "test".to_string(),
            instance: Mutex::new(None),
            session: AtomicI32::new(0),
            initialized: AtomicBool::new(true),
            endless: AtomicBool::new(false),
        })
    }
}

impl Drop for ServiceContext {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.get_mut().as_mut() {
            instance.release();
        }
        *self.instance.get_mut() = None;
        self.mailbox.mark_release(&self.node.queue);
        self.node.total.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("handle", &self.handle)
            .field("module", &self.module)
            .finish()
    }
}

/// Create a service from `module_name`, register its handle, and run its
/// init. On success the mailbox is scheduled and the launch is reported; on
/// failure the handle is retired and the mailbox drained.
pub(crate) fn launch(
    node: &Arc<Node>,
    module_name: &str,
    param: Option<&str>,
) -> Result<Handle, LaunchError> {
    let module = node
        .modules
        .query(module_name)
        .ok_or_else(|| LaunchError::UnknownModule(module_name.to_string()))?;
    let instance = module.create();

    let (handle, ctx) = node
        .handles
        .register(|handle| ServiceContext::new(node.clone(), handle, module_name, instance));

    let init_result = {
        let mut slot = ctx.instance.lock();
        let _guard = CurrentHandleGuard::enter(handle);
        match slot.as_mut() {
            Some(instance) => instance.init(&ctx, param),
            None => unreachable!("instance taken before init"),
        }
    };

    match init_result {
        Ok(()) => {
            ctx.initialized.store(true, Ordering::Release);
            ctx.mailbox.force_push(&node.queue);
            info!(module = module_name, %handle, "service launched");
            node.report(
                handle,
                format!("LAUNCH {module_name} {}", param.unwrap_or("")),
            );
            Ok(handle)
        }
        Err(source) => {
            node.report(handle, format!("FAILED launch {module_name}"));
            let mailbox = ctx.mailbox.clone();
            node.handles.retire(handle);
            drop(ctx);
            let dropped = mailbox.release(&node.queue);
            if dropped > 0 {
                warn!(module = module_name, dropped, "drained mailbox of failed launch");
            }
            Err(LaunchError::Init {
                module: module_name.to_string(),
                source,
            })
        }
    }
}

/// One worker-loop iteration: pop a runnable mailbox, dispatch one message,
/// hand the mailbox back. Returns `true` when the run-queue was empty and
/// the worker should consider sleeping.
pub(crate) fn dispatch_message(node: &Arc<Node>, monitor: &WorkerMonitor) -> bool {
    let Some(mailbox) = node.queue.pop() else {
        return true;
    };
    let handle = mailbox.handle();

    let Some(ctx) = node.handles.grab(handle) else {
        // Owner is gone; drain the mailbox if it was marked, otherwise park
        // it back until the mark arrives.
        let dropped = mailbox.release(&node.queue);
        if dropped > 0 {
            node.report(
                Handle::NULL,
                format!("Drop message queue {handle} ({dropped} messages)"),
            );
        }
        return false;
    };

    let Some(message) = mailbox.pop() else {
        return false;
    };

    monitor.trigger(message.source, handle);
    ctx.invoke(message);
    monitor.trigger(Handle::NULL, Handle::NULL);

    debug_assert!(Arc::ptr_eq(&mailbox, ctx.mailbox()));
    mailbox.push_global(&node.queue);
    false
}
