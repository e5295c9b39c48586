//! Built-in service modules.
//!
//! The dynamic module ABI stays behind the loader trait; these are the
//! in-process modules every node ships with.

mod echo;
mod logger;
mod master;
mod transport;

pub use echo::Echo;
pub use logger::Logger;
pub use master::Master;
pub use transport::Transport;

use weft_core::{Service, StaticLoader};

/// The module set the bootstrap registers.
pub fn builtin_loader() -> StaticLoader {
    StaticLoader::new()
        .register("logger", || Box::new(Logger::default()) as Box<dyn Service>)
        .register("master", || Box::new(Master::default()) as Box<dyn Service>)
        .register("transport", || {
            Box::new(Transport::default()) as Box<dyn Service>
        })
        .register("echo", || Box::new(Echo) as Box<dyn Service>)
}
