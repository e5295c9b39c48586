//! Demo service: answers every `PTYPE_CLIENT` message with its own payload.

use weft_core::{Message, Payload, Service, ServiceContext, ServiceError, ptype};

pub struct Echo;

impl Service for Echo {
    fn init(&mut self, ctx: &ServiceContext, param: Option<&str>) -> Result<(), ServiceError> {
        let name = param.unwrap_or(".echo");
        ctx.command("REG", Some(name));
        Ok(())
    }

    fn message(&mut self, ctx: &ServiceContext, mut message: Message) {
        if message.ptype != ptype::CLIENT {
            return;
        }
        let payload = match message.payload.take() {
            Some(bytes) => Payload::new(bytes.into_vec()),
            None => Payload::none(),
        };
        ctx.send(
            None,
            message.source,
            ptype::RESPONSE,
            message.session,
            payload,
        );
    }
}
