//! Stub cluster master.
//!
//! When `standalone` is configured this node hosts the master role itself:
//! the service owning the cluster-wide name directory that every node's
//! transport reports into. This stub keeps the directory in memory and
//! serves no sockets; a real master replaces this module under the same
//! name.

use std::collections::HashMap;

use tracing::{info, warn};

use weft_core::{Handle, Message, RemoteName, Service, ServiceContext, ServiceError, ptype};

#[derive(Default)]
pub struct Master {
    address: String,
    names: HashMap<String, Handle>,
}

impl Service for Master {
    fn init(&mut self, _ctx: &ServiceContext, param: Option<&str>) -> Result<(), ServiceError> {
        // Launched with the address the master would listen on.
        match param.filter(|address| !address.is_empty()) {
            Some(address) => {
                self.address = address.to_string();
                info!(address, "master stub online, listener disabled");
                Ok(())
            }
            None => Err(ServiceError::BadParameter(
                "master wants a listen address".to_string(),
            )),
        }
    }

    fn message(&mut self, _ctx: &ServiceContext, message: Message) {
        match message.ptype {
            ptype::SYSTEM => match RemoteName::decode(message.payload.as_bytes()) {
                Some(binding) => {
                    let previous = self.names.insert(binding.name.clone(), binding.handle);
                    match previous {
                        Some(old) if old != binding.handle => info!(
                            name = %binding.name,
                            old = %old,
                            new = %binding.handle,
                            "cluster name rebound"
                        ),
                        _ => info!(
                            name = %binding.name,
                            handle = %binding.handle,
                            "cluster name recorded"
                        ),
                    }
                }
                None => warn!("undecodable cluster name dropped"),
            },
            ptype::HARBOR => {
                warn!("remote message at the master dropped, stub has no peers");
            }
            _ => {}
        }
    }

    fn release(&mut self) {
        info!(
            address = %self.address,
            names = self.names.len(),
            "master stub offline"
        );
    }
}
