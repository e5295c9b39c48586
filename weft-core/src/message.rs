//! Messages exchanged between services.
//!
//! A message carries its source handle, a correlation session, a protocol
//! type tag, and an owned payload. Payload ownership transfers to the
//! destination service at dispatch; whatever the callback does not keep is
//! dropped by the runtime.

use crate::handle::Handle;

/// Protocol type tags carried by every message, plus the sender-side flag
/// bits that are stripped before delivery.
pub mod ptype {
    /// Plain text, consumed by the logger service.
    pub const TEXT: u32 = 0;
    /// Response to an earlier request (timer expiries, replies).
    pub const RESPONSE: u32 = 1;
    /// User traffic.
    pub const CLIENT: u32 = 3;
    /// Transport control (global name registration).
    pub const SYSTEM: u32 = 4;
    /// Inter-node traffic routed through the transport service.
    pub const HARBOR: u32 = 5;
    /// Socket reactor events.
    pub const SOCKET: u32 = 6;

    /// The payload is already owned by the runtime; do not copy it.
    pub const TAG_DONTCOPY: u32 = 0x10000;
    /// Allocate a fresh session for this send; the given session must be 0.
    pub const TAG_ALLOCSESSION: u32 = 0x20000;

    /// Mask selecting the type value out of a tagged type word.
    pub const MASK: u32 = 0xff;
}

/// Payload length is capped so the length still fits the low 24 bits of the
/// wire representation.
pub const MAX_PAYLOAD: usize = 0x00ff_ffff;

/// Move-only message payload. The buffer is freed when the payload is
/// dropped; a service that wants to keep the bytes takes them out.
#[derive(Default)]
pub struct Payload(Option<Box<[u8]>>);

impl Payload {
    pub fn none() -> Self {
        Payload(None)
    }

    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Payload(Some(bytes.into().into_boxed_slice()))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_deref().unwrap_or(&[])
    }

    /// Take ownership of the buffer, leaving the payload empty.
    pub fn take(&mut self) -> Option<Box<[u8]>> {
        self.0.take()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::new(bytes)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::new(text.into_bytes())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::new(text.as_bytes().to_vec())
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Payload({} bytes)", self.len())
    }
}

/// One message in a service mailbox.
#[derive(Debug)]
pub struct Message {
    /// Handle of the sender; `Handle::NULL` for runtime-internal sources
    /// (timer expiries, socket events).
    pub source: Handle,
    /// Correlation session; 0 when the sender expects no reply.
    pub session: i32,
    /// Protocol type tag (`ptype::*`, flags already stripped).
    pub ptype: u32,
    pub payload: Payload,
}

impl Message {
    pub fn new(source: Handle, session: i32, ptype: u32, payload: Payload) -> Self {
        debug_assert_eq!(ptype & !ptype::MASK, 0, "tag bits must be stripped");
        Message {
            source,
            session,
            ptype,
            payload,
        }
    }

    /// A timer or reply message with no payload.
    pub fn response(session: i32) -> Self {
        Message::new(Handle::NULL, session, ptype::RESPONSE, Payload::none())
    }
}
