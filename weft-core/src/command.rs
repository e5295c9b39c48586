//! Text command surface.
//!
//! Services drive the runtime through `ctx.command(cmd, param)`. Handle
//! arguments accept `:hex` (raw handle) and `.name` (local directory)
//! forms; answers come back as strings, `None` meaning "nothing to say"
//! (which includes failures, which are logged).

use tracing::warn;

use crate::handle::Handle;
use crate::message::{Payload, ptype};
use crate::service::{self, ServiceContext};

impl ServiceContext {
    pub fn command(&self, cmd: &str, param: Option<&str>) -> Option<String> {
        match cmd {
            "TIMEOUT" => self.cmd_timeout(param),
            "LOCK" => self.cmd_lock(),
            "UNLOCK" => self.cmd_unlock(),
            "REG" => self.cmd_reg(param),
            "QUERY" => self.cmd_query(param),
            "NAME" => self.cmd_name(param),
            "NOW" => Some(self.node.timer.now().to_string()),
            "STARTTIME" => Some(self.node.timer.starttime().to_string()),
            "EXIT" => {
                self.handle_exit(Handle::NULL);
                None
            }
            "KILL" => self.cmd_kill(param),
            "LAUNCH" => self.cmd_launch(param),
            "GETENV" => self.node.env.get(param?),
            "SETENV" => self.cmd_setenv(param),
            "ENDLESS" => self.take_endless().then(|| "1".to_string()),
            "ABORT" => {
                self.node.handles.retire_all();
                None
            }
            "MONITOR" => self.cmd_monitor(param),
            "MQLEN" => Some(self.mailbox().len().to_string()),
            _ => {
                warn!(cmd, "unknown command");
                None
            }
        }
    }

    fn cmd_timeout(&self, param: Option<&str>) -> Option<String> {
        let ticks: i32 = match param.and_then(|p| p.split_whitespace().next()) {
            Some(ticks) => match ticks.parse() {
                Ok(ticks) => ticks,
                Err(_) => {
                    warn!(param, "TIMEOUT wants a tick count");
                    return None;
                }
            },
            None => {
                warn!("TIMEOUT without a tick count");
                return None;
            }
        };
        let session = self.new_session();
        self.node.timer.timeout(&self.node, self.handle(), ticks, session);
        Some(session.to_string())
    }

    fn cmd_lock(&self) -> Option<String> {
        if self.initialized() {
            self.mailbox().lock(self.peek_next_session());
        }
        None
    }

    fn cmd_unlock(&self) -> Option<String> {
        if self.initialized() {
            self.mailbox().unlock(&self.node.queue);
        }
        None
    }

    fn cmd_reg(&self, param: Option<&str>) -> Option<String> {
        match param {
            None | Some("") => Some(self.handle().hex()),
            Some(name) if name.starts_with('.') => {
                match self.node.handles.bind_name(self.handle(), &name[1..]) {
                    Ok(interned) => Some(interned.to_string()),
                    Err(err) => {
                        warn!(%err, "REG failed");
                        None
                    }
                }
            }
            Some(name) => {
                if let Err(err) = self.node.harbor.register(&self.node, name, self.handle()) {
                    warn!(%err, "REG of global name failed");
                }
                None
            }
        }
    }

    fn cmd_query(&self, param: Option<&str>) -> Option<String> {
        let name = param?.strip_prefix('.')?;
        self.node.handles.find_name(name).map(|handle| handle.hex())
    }

    fn cmd_name(&self, param: Option<&str>) -> Option<String> {
        let param = param?;
        let mut words = param.split_whitespace();
        let (Some(name), Some(addr)) = (words.next(), words.next()) else {
            warn!(param, "NAME wants 'name :handle'");
            return None;
        };
        let handle = Handle::parse_hex(addr)?;
        if handle.is_null() {
            return None;
        }
        if let Some(local) = name.strip_prefix('.') {
            match self.node.handles.bind_name(handle, local) {
                Ok(interned) => Some(interned.to_string()),
                Err(err) => {
                    warn!(%err, "NAME failed");
                    None
                }
            }
        } else {
            if let Err(err) = self.node.harbor.register(&self.node, name, handle) {
                warn!(%err, "NAME of global name failed");
            }
            None
        }
    }

    fn cmd_kill(&self, param: Option<&str>) -> Option<String> {
        let param = param?;
        let target = match self.query_name(param) {
            Some(handle) if !handle.is_null() => handle,
            _ => {
                warn!(param, "can't kill");
                return None;
            }
        };
        self.handle_exit(target);
        None
    }

    fn cmd_launch(&self, param: Option<&str>) -> Option<String> {
        let param = param?;
        let mut words = param.splitn(2, char::is_whitespace);
        let module = words.next()?;
        let args = words.next().map(str::trim).filter(|args| !args.is_empty());
        match service::launch(&self.node, module, args) {
            Ok(handle) => Some(handle.hex()),
            Err(err) => {
                warn!(%err, "LAUNCH failed");
                None
            }
        }
    }

    fn cmd_setenv(&self, param: Option<&str>) -> Option<String> {
        let param = param?;
        let (key, value) = param.split_once(' ')?;
        if let Err(err) = self.node.env.set(key, value) {
            warn!(%err, "SETENV failed");
        }
        None
    }

    fn cmd_monitor(&self, param: Option<&str>) -> Option<String> {
        match param {
            None | Some("") => self.node.monitor_exit().map(|handle| handle.hex()),
            Some(addr) => {
                let handle = match self.query_name(addr) {
                    Some(handle) => handle,
                    None => {
                        warn!(addr, "can't monitor");
                        Handle::NULL
                    }
                };
                self.node.set_monitor_exit(handle);
                None
            }
        }
    }

    /// Retire `target` (or this service for a null target), notifying the
    /// monitor-exit service first when one is configured.
    fn handle_exit(&self, target: Handle) {
        let target = if target.is_null() {
            self.node.report(self.handle(), "KILL self".to_string());
            self.handle()
        } else {
            self.node.report(self.handle(), format!("KILL {}", target.hex()));
            target
        };
        if let Some(monitor) = self.node.monitor_exit() {
            self.send(Some(target), monitor, ptype::CLIENT, 0, Payload::none());
        }
        self.node.handles.retire(target);
    }
}
