//! Stub inter-node transport.
//!
//! Implements the transport-service contract (global name registrations
//! arrive as `PTYPE_SYSTEM`, remote sends as `PTYPE_HARBOR`) without any
//! actual networking: registrations are acknowledged in the log, remote
//! messages are dropped loudly. A real cluster transport replaces this
//! module under the same name.

use tracing::{info, warn};

use weft_core::{Message, RemoteMessage, RemoteName, Service, ServiceContext, ServiceError, ptype};

#[derive(Default)]
pub struct Transport {
    master: String,
    address: String,
}

impl Service for Transport {
    fn init(&mut self, _ctx: &ServiceContext, param: Option<&str>) -> Result<(), ServiceError> {
        // Launched as "master-address local-address node-id".
        let param = param.unwrap_or("");
        let mut words = param.split_whitespace();
        match (words.next(), words.next()) {
            (Some(master), Some(address)) => {
                self.master = master.to_string();
                self.address = address.to_string();
                info!(master, address, "transport stub online, clustering disabled");
                Ok(())
            }
            _ => Err(ServiceError::BadParameter(format!(
                "transport wants 'master address node-id', got '{param}'"
            ))),
        }
    }

    fn message(&mut self, _ctx: &ServiceContext, message: Message) {
        match message.ptype {
            ptype::SYSTEM => match RemoteName::decode(message.payload.as_bytes()) {
                Some(binding) => info!(
                    name = %binding.name,
                    handle = %binding.handle,
                    "global name registered with stub transport"
                ),
                None => warn!("undecodable name registration dropped"),
            },
            ptype::HARBOR => match RemoteMessage::decode(message.payload.as_bytes()) {
                Some(remote) => warn!(
                    destination = ?remote.target,
                    size = remote.payload.len(),
                    "remote message dropped, stub transport has no peers"
                ),
                None => warn!("undecodable remote message dropped"),
            },
            _ => {}
        }
    }

    fn release(&mut self) {
        info!(
            master = %self.master,
            address = %self.address,
            "transport stub offline"
        );
    }
}
