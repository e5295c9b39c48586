//! Socket reactor interface.
//!
//! The reactor itself is an external collaborator; the runtime only drives
//! its `poll` loop from the socket thread and translates each completion
//! into a `PTYPE_SOCKET` message for the owning service. Events cross the
//! mailbox as an encoded [`SocketMessage`] so services decode them with the
//! same codec everywhere.

use parking_lot::{Condvar, Mutex};

use crate::error::SocketError;
use crate::handle::Handle;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum SocketEventKind {
    Data = 1,
    Connect = 2,
    Close = 3,
    Accept = 4,
    Error = 5,
}

impl SocketEventKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(SocketEventKind::Data),
            2 => Some(SocketEventKind::Connect),
            3 => Some(SocketEventKind::Close),
            4 => Some(SocketEventKind::Accept),
            5 => Some(SocketEventKind::Error),
            _ => None,
        }
    }
}

/// One completion reported by the reactor.
#[derive(Debug)]
pub struct SocketEvent {
    pub kind: SocketEventKind,
    /// Reactor-assigned socket id.
    pub id: i32,
    /// Kind-specific count (bytes for `Data`, accepted id for `Accept`).
    pub ud: i32,
    /// Service that owns the socket.
    pub owner: Handle,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub enum SocketPoll {
    /// An event was produced; `more` means further completions are already
    /// pending and the runtime should poll again before waking a worker.
    Event { event: SocketEvent, more: bool },
    /// The reactor was asked to exit.
    Exit,
}

/// External socket reactor contract. Only `poll` and `exit` are required;
/// the pass-through operations default to unsupported so partial reactors
/// stay honest.
pub trait SocketReactor: Send + Sync {
    /// Block until a completion or exit.
    fn poll(&self) -> SocketPoll;

    /// Make the next (or current) `poll` return [`SocketPoll::Exit`].
    fn exit(&self);

    fn listen(&self, _owner: Handle, _host: &str, _port: u16, _backlog: i32) -> Result<i32, SocketError> {
        Err(SocketError::Unsupported)
    }

    fn connect(&self, _owner: Handle, _host: &str, _port: u16) -> Result<i32, SocketError> {
        Err(SocketError::Unsupported)
    }

    fn send(&self, _id: i32, _data: Vec<u8>) -> Result<(), SocketError> {
        Err(SocketError::Unsupported)
    }

    fn close(&self, _owner: Handle, _id: i32) {}

    fn start(&self, _owner: Handle, _id: i32) {}
}

/// Wire form of a socket event inside a `PTYPE_SOCKET` payload:
/// kind byte, socket id, ud (both little-endian i32), then the buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct SocketMessage {
    pub kind: SocketEventKind,
    pub id: i32,
    pub ud: i32,
    pub buffer: Vec<u8>,
}

impl SocketMessage {
    pub const HEADER_LEN: usize = 9;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_LEN + self.buffer.len());
        out.push(self.kind as u8);
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.ud.to_le_bytes());
        out.extend_from_slice(&self.buffer);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<SocketMessage> {
        if bytes.len() < Self::HEADER_LEN {
            return None;
        }
        let kind = SocketEventKind::from_u8(bytes[0])?;
        let id = i32::from_le_bytes(bytes[1..5].try_into().ok()?);
        let ud = i32::from_le_bytes(bytes[5..9].try_into().ok()?);
        Some(SocketMessage {
            kind,
            id,
            ud,
            buffer: bytes[Self::HEADER_LEN..].to_vec(),
        })
    }
}

/// Reactor used when no real one is plugged in: `poll` parks until `exit`.
pub struct NullReactor {
    exited: Mutex<bool>,
    wake: Condvar,
}

impl NullReactor {
    pub fn new() -> Self {
        NullReactor {
            exited: Mutex::new(false),
            wake: Condvar::new(),
        }
    }
}

impl Default for NullReactor {
    fn default() -> Self {
        NullReactor::new()
    }
}

impl SocketReactor for NullReactor {
    fn poll(&self) -> SocketPoll {
        let mut exited = self.exited.lock();
        while !*exited {
            self.wake.wait(&mut exited);
        }
        SocketPoll::Exit
    }

    fn exit(&self) {
        *self.exited.lock() = true;
        self.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_message_roundtrip() {
        let message = SocketMessage {
            kind: SocketEventKind::Data,
            id: 42,
            ud: -7,
            buffer: b"payload".to_vec(),
        };
        assert_eq!(SocketMessage::decode(&message.encode()), Some(message));
    }

    #[test]
    fn empty_buffer_roundtrip() {
        let message = SocketMessage {
            kind: SocketEventKind::Close,
            id: 1,
            ud: 0,
            buffer: Vec::new(),
        };
        assert_eq!(SocketMessage::decode(&message.encode()), Some(message));
    }

    #[test]
    fn truncated_or_unknown_input_is_rejected() {
        assert_eq!(SocketMessage::decode(&[1, 2, 3]), None);
        let mut bytes = SocketMessage {
            kind: SocketEventKind::Data,
            id: 0,
            ud: 0,
            buffer: Vec::new(),
        }
        .encode();
        bytes[0] = 99;
        assert_eq!(SocketMessage::decode(&bytes), None);
    }

    #[test]
    fn null_reactor_exits() {
        let reactor = NullReactor::new();
        reactor.exit();
        assert!(matches!(reactor.poll(), SocketPoll::Exit));
    }
}
