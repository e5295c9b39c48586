//! Inter-node plumbing: node-id handling and the transport-service contract.
//!
//! The transport itself is an external collaborator, modeled as a normal
//! service. The runtime forwards global-name registrations to it as
//! `PTYPE_SYSTEM` messages and remote sends as `PTYPE_HARBOR` messages,
//! both carrying the codecs defined here.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::warn;

use crate::error::NameError;
use crate::handle::Handle;
use crate::message::{Message, Payload, ptype};
use crate::node::Node;

/// Longest global name carried on the wire.
pub const GLOBALNAME_LENGTH: usize = 16;

/// A global name binding forwarded to the transport service.
#[derive(Debug, PartialEq, Eq)]
pub struct RemoteName {
    pub name: String,
    pub handle: Handle,
}

impl RemoteName {
    /// Text form `name :hex`, matching the command surface conventions.
    pub fn encode(&self) -> Vec<u8> {
        format!("{} {}", self.name, self.handle.hex()).into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Option<RemoteName> {
        let text = std::str::from_utf8(bytes).ok()?;
        let (name, handle) = text.split_once(' ')?;
        Some(RemoteName {
            name: name.to_string(),
            handle: Handle::parse_hex(handle)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RemoteTarget {
    Handle(Handle),
    Named(String),
}

/// A message bound for another node, wrapped for the transport service.
#[derive(Debug, PartialEq, Eq)]
pub struct RemoteMessage {
    pub target: RemoteTarget,
    pub ptype: u32,
    pub payload: Vec<u8>,
}

impl RemoteMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match &self.target {
            RemoteTarget::Handle(handle) => {
                out.push(0);
                out.extend_from_slice(&handle.raw().to_le_bytes());
            }
            RemoteTarget::Named(name) => {
                out.push(1);
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
            }
        }
        out.push(self.ptype as u8);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<RemoteMessage> {
        let (target, rest) = match *bytes.first()? {
            0 => {
                let raw = u32::from_le_bytes(bytes.get(1..5)?.try_into().ok()?);
                (RemoteTarget::Handle(Handle::from_raw(raw)), bytes.get(5..)?)
            }
            1 => {
                let len = *bytes.get(1)? as usize;
                let name = std::str::from_utf8(bytes.get(2..2 + len)?).ok()?;
                (RemoteTarget::Named(name.to_string()), bytes.get(2 + len..)?)
            }
            _ => return None,
        };
        Some(RemoteMessage {
            target,
            ptype: u32::from(*rest.first()?),
            payload: rest[1..].to_vec(),
        })
    }
}

pub struct Harbor {
    /// Node id pre-shifted into the high byte of a handle.
    node_bits: u32,
    /// Handle of the transport service; 0 until one registers.
    remote: AtomicU32,
}

impl Harbor {
    pub fn new(node: u8) -> Self {
        Harbor {
            node_bits: u32::from(node) << Handle::NODE_SHIFT,
            remote: AtomicU32::new(0),
        }
    }

    pub fn node(&self) -> u8 {
        (self.node_bits >> Handle::NODE_SHIFT) as u8
    }

    /// A handle is remote when it carries node bits for some other node.
    pub fn is_remote(&self, handle: Handle) -> bool {
        let bits = handle.raw() & !Handle::INDEX_MASK;
        bits != 0 && bits != self.node_bits
    }

    /// Install the transport service that carries inter-node traffic.
    pub fn set_remote(&self, handle: Handle) {
        self.remote.store(handle.raw(), Ordering::Release);
    }

    fn remote(&self) -> Option<Handle> {
        match self.remote.load(Ordering::Acquire) {
            0 => None,
            raw => Some(Handle::from_raw(raw)),
        }
    }

    /// Publish a global name binding through the transport service.
    pub fn register(&self, node: &Node, name: &str, handle: Handle) -> Result<(), NameError> {
        if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NameError::Numeric(name.to_string()));
        }
        let name = truncate_name(name);
        let Some(remote) = self.remote() else {
            return Err(NameError::NoTransport(name.to_string()));
        };
        let binding = RemoteName {
            name,
            handle,
        };
        let message = Message::new(
            Handle::NULL,
            0,
            ptype::SYSTEM,
            Payload::new(binding.encode()),
        );
        if node.push(remote, message).is_err() {
            warn!(handle = %handle, "transport service gone, dropping name registration");
        }
        Ok(())
    }

    /// Forward a message for another node to the transport service.
    pub fn send(
        &self,
        node: &Node,
        target: RemoteTarget,
        source: Handle,
        message_type: u32,
        session: i32,
        payload: Payload,
    ) {
        assert!(
            message_type != ptype::SYSTEM && message_type != ptype::HARBOR,
            "transport control types cannot be sent remotely"
        );
        let Some(remote) = self.remote() else {
            warn!(destination = ?target, "no transport service, dropping remote message");
            return;
        };
        let wrapped = RemoteMessage {
            target,
            ptype: message_type,
            payload: payload.as_bytes().to_vec(),
        };
        let message = Message::new(source, session, ptype::HARBOR, Payload::new(wrapped.encode()));
        if node.push(remote, message).is_err() {
            warn!("transport service gone, dropping remote message");
        }
    }
}

fn truncate_name(name: &str) -> String {
    if name.len() <= GLOBALNAME_LENGTH {
        return name.to_string();
    }
    let mut cut = GLOBALNAME_LENGTH;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    name[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_detection_uses_node_bits() {
        let harbor = Harbor::new(3);
        assert!(!harbor.is_remote(Handle::from_raw(0x0300_0001)));
        assert!(harbor.is_remote(Handle::from_raw(0x0400_0001)));
        // Handles without node bits are always local.
        assert!(!harbor.is_remote(Handle::from_raw(0x0000_0001)));
    }

    #[test]
    fn remote_name_roundtrip() {
        let binding = RemoteName {
            name: "gateway".to_string(),
            handle: Handle::from_raw(0x0200_0042),
        };
        assert_eq!(RemoteName::decode(&binding.encode()), Some(binding));
    }

    #[test]
    fn remote_message_roundtrip() {
        let by_handle = RemoteMessage {
            target: RemoteTarget::Handle(Handle::from_raw(0x0200_0001)),
            ptype: ptype::CLIENT,
            payload: b"hello".to_vec(),
        };
        assert_eq!(RemoteMessage::decode(&by_handle.encode()), Some(by_handle));

        let by_name = RemoteMessage {
            target: RemoteTarget::Named("gateway".to_string()),
            ptype: ptype::TEXT,
            payload: Vec::new(),
        };
        assert_eq!(RemoteMessage::decode(&by_name.encode()), Some(by_name));
    }

    #[test]
    fn garbage_remote_messages_are_rejected() {
        assert_eq!(RemoteMessage::decode(&[]), None);
        assert_eq!(RemoteMessage::decode(&[7, 0, 0]), None);
        assert_eq!(RemoteMessage::decode(&[1, 200, b'x']), None);
    }

    #[test]
    fn long_names_are_truncated_to_wire_length() {
        assert_eq!(
            truncate_name("abcdefghijklmnopqrstuvwxyz"),
            "abcdefghijklmnop"
        );
        assert_eq!(truncate_name("short"), "short");
    }
}
