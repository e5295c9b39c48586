//! The logger service: sink for `PTYPE_TEXT` diagnostics.
//!
//! Every runtime-surfaced error and launch/kill notice arrives here as a
//! text message. With a file argument the service appends to it; without
//! one the lines flow into the tracing subscriber.

use std::fs::{File, OpenOptions};
use std::io::Write;

use tracing::{info, warn};

use weft_core::{Message, Service, ServiceContext, ServiceError, ptype};

#[derive(Default)]
pub struct Logger {
    output: Option<File>,
}

impl Service for Logger {
    fn init(&mut self, _ctx: &ServiceContext, param: Option<&str>) -> Result<(), ServiceError> {
        if let Some(path) = param.filter(|path| !path.is_empty()) {
            self.output = Some(OpenOptions::new().create(true).append(true).open(path)?);
        }
        Ok(())
    }

    fn message(&mut self, _ctx: &ServiceContext, message: Message) {
        if message.ptype != ptype::TEXT {
            return;
        }
        let text = String::from_utf8_lossy(message.payload.as_bytes());
        match &mut self.output {
            Some(file) => {
                if writeln!(file, "[{}] {text}", message.source).is_err() {
                    warn!("log file write failed, line lost");
                }
            }
            None => info!(target: "weft", source = %message.source, "{text}"),
        }
    }

    fn release(&mut self) {
        if let Some(file) = &mut self.output {
            let _ = file.flush();
        }
    }
}
