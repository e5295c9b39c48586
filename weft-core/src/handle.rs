//! Service handles and the global handle registry.
//!
//! A handle is a 32-bit identifier: the high 8 bits are the node id
//! (constant per process), the low 24 bits a per-node slot index. Index 0 is
//! reserved. The registry maps handles to live service contexts through a
//! power-of-two slot table probed from a rotating cursor, and keeps the
//! sorted name directory under the same reader/writer lock.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::NameError;
use crate::service::ServiceContext;

/// 32-bit service identifier. High 8 bits: node id. Low 24 bits: slot index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    pub const NODE_SHIFT: u32 = 24;
    pub const INDEX_MASK: u32 = 0x00ff_ffff;

    /// The reserved all-zero handle, used as a null source.
    pub const NULL: Handle = Handle(0);

    pub fn from_raw(raw: u32) -> Handle {
        Handle(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn index(self) -> u32 {
        self.0 & Self::INDEX_MASK
    }

    pub fn node(self) -> u8 {
        (self.0 >> Self::NODE_SHIFT) as u8
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Command-surface representation, e.g. `:c0ffee`.
    pub fn hex(self) -> String {
        format!(":{:x}", self.0)
    }

    /// Parse the `:hex` command-surface representation.
    pub fn parse_hex(text: &str) -> Option<Handle> {
        let digits = text.strip_prefix(':')?;
        u32::from_str_radix(digits, 16).ok().map(Handle)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ":{:08x}", self.0)
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({self})")
    }
}

const DEFAULT_SLOT_SIZE: usize = 4;

struct RegistryInner {
    /// Next candidate slot index; rotates so retired indices are not
    /// immediately reused.
    index: u32,
    /// Power-of-two table of live contexts, probed by `index & (len - 1)`.
    slots: Vec<Option<Arc<ServiceContext>>>,
    /// Sorted name directory, binary-searched.
    names: Vec<(Arc<str>, Handle)>,
}

pub struct HandleRegistry {
    /// Node id pre-shifted into the high byte.
    node_bits: u32,
    inner: RwLock<RegistryInner>,
}

impl HandleRegistry {
    pub fn new(node: u8) -> Self {
        HandleRegistry {
            node_bits: u32::from(node) << Handle::NODE_SHIFT,
            inner: RwLock::new(RegistryInner {
                index: 1,
                slots: vec![None; DEFAULT_SLOT_SIZE],
                names: Vec::new(),
            }),
        }
    }

    /// Allocate a handle and publish the context built for it. The build
    /// closure runs under the writer lock and must not call back into the
    /// registry.
    pub fn register<F>(&self, build: F) -> (Handle, Arc<ServiceContext>)
    where
        F: FnOnce(Handle) -> Arc<ServiceContext>,
    {
        let mut inner = self.inner.write();
        loop {
            let size = inner.slots.len();
            for probe in 0..size as u32 {
                let index = inner.index.wrapping_add(probe) & Handle::INDEX_MASK;
                if index == 0 {
                    // Reserved.
                    continue;
                }
                let hash = index as usize & (size - 1);
                if inner.slots[hash].is_none() {
                    let handle = Handle(index | self.node_bits);
                    let ctx = build(handle);
                    inner.slots[hash] = Some(ctx.clone());
                    inner.index = index + 1;
                    return (handle, ctx);
                }
            }
            self.grow(&mut inner);
        }
    }

    fn grow(&self, inner: &mut RegistryInner) {
        let new_size = inner.slots.len() * 2;
        assert!(
            new_size - 1 <= Handle::INDEX_MASK as usize,
            "handle space exhausted: {} slots in use",
            inner.slots.len()
        );
        let mut slots = vec![None; new_size];
        for ctx in inner.slots.drain(..).flatten() {
            let hash = ctx.handle().index() as usize & (new_size - 1);
            debug_assert!(slots[hash].is_none());
            slots[hash] = Some(ctx);
        }
        inner.slots = slots;
    }

    /// Look a context up and take a reference to it so a concurrent retire
    /// cannot free it underfoot.
    pub fn grab(&self, handle: Handle) -> Option<Arc<ServiceContext>> {
        let inner = self.inner.read();
        let hash = handle.index() as usize & (inner.slots.len() - 1);
        match &inner.slots[hash] {
            Some(ctx) if ctx.handle() == handle => Some(ctx.clone()),
            _ => None,
        }
    }

    /// Drop the registry's reference to a handle and unbind its names.
    /// Unknown handles are ignored.
    pub fn retire(&self, handle: Handle) {
        let retired = {
            let mut inner = self.inner.write();
            let hash = handle.index() as usize & (inner.slots.len() - 1);
            let occupied = inner.slots[hash]
                .as_ref()
                .is_some_and(|ctx| ctx.handle() == handle);
            if occupied {
                inner.names.retain(|(_, bound)| *bound != handle);
                inner.slots[hash].take()
            } else {
                None
            }
        };
        // The context reference is released outside the lock; this may be
        // the last one, running the service teardown.
        drop(retired);
    }

    /// Retire every live handle. Sweeps until a full pass finds none, so
    /// services launched while the sweep runs are retired too.
    pub fn retire_all(&self) {
        loop {
            let mut retired = 0;
            let mut index = 0;
            loop {
                let found = {
                    let inner = self.inner.read();
                    if index >= inner.slots.len() {
                        break;
                    }
                    inner.slots[index].as_ref().map(|ctx| ctx.handle())
                };
                if let Some(handle) = found {
                    retired += 1;
                    self.retire(handle);
                }
                index += 1;
            }
            if retired == 0 {
                return;
            }
        }
    }

    pub fn find_name(&self, name: &str) -> Option<Handle> {
        let inner = self.inner.read();
        inner
            .names
            .binary_search_by(|(bound, _)| bound.as_ref().cmp(name))
            .ok()
            .map(|at| inner.names[at].1)
    }

    /// Bind `name` to `handle` in the sorted directory.
    pub fn bind_name(&self, handle: Handle, name: &str) -> Result<Arc<str>, NameError> {
        let mut inner = self.inner.write();
        match inner
            .names
            .binary_search_by(|(bound, _)| bound.as_ref().cmp(name))
        {
            Ok(_) => Err(NameError::Exists(name.to_string())),
            Err(at) => {
                let interned: Arc<str> = Arc::from(name);
                inner.names.insert(at, (interned.clone(), handle));
                Ok(interned)
            }
        }
    }

    /// Number of live handles, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.inner.read().slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn names_snapshot(&self) -> Vec<(String, Handle)> {
        self.inner
            .read()
            .names
            .iter()
            .map(|(n, h)| (n.to_string(), *h))
            .collect()
    }
}
