//! Service modules and the loader seam.
//!
//! A module is a named factory for service instances. The runtime resolves
//! modules by name through a [`ModuleLoader`], caching up to
//! [`MAX_MODULE_TYPE`] distinct types. Dynamic-library loading lives behind
//! the loader trait; the runtime itself only sees trait objects. The
//! [`SearchPath`] type parses the `;`-separated `?`-placeholder patterns a
//! path-based loader resolves names against.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::ServiceError;
use crate::message::Message;
use crate::service::ServiceContext;

/// Most distinct module types a node will load.
pub const MAX_MODULE_TYPE: usize = 32;

/// A service instance. One exists per launched service; the runtime
/// serializes all calls on a given instance.
pub trait Service: Send {
    /// Runs once, right after the service's handle is registered. The
    /// context is live: the service may send messages, issue commands, and
    /// schedule timers. An error retires the service before it ever
    /// dispatches.
    fn init(&mut self, ctx: &ServiceContext, param: Option<&str>) -> Result<(), ServiceError>;

    /// Handle one message. The message is owned; whatever the service does
    /// not keep is dropped on return.
    fn message(&mut self, ctx: &ServiceContext, message: Message);

    /// Runs when the last reference to the service goes away.
    fn release(&mut self) {}
}

/// A named service factory.
pub trait ServiceModule: Send + Sync {
    fn create(&self) -> Box<dyn Service>;
}

/// Closures double as modules, so built-ins register as
/// `loader.register("echo", || Box::new(Echo::default()))`.
impl<F> ServiceModule for F
where
    F: Fn() -> Box<dyn Service> + Send + Sync,
{
    fn create(&self) -> Box<dyn Service> {
        self()
    }
}

/// Resolves module names to implementations.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, name: &str, search: &SearchPath) -> Option<Arc<dyn ServiceModule>>;
}

/// A `;`-separated list of path patterns, each containing a single `?`
/// placeholder for the module name.
#[derive(Clone, Debug, Default)]
pub struct SearchPath {
    patterns: Vec<String>,
}

impl SearchPath {
    pub fn parse(path: &str) -> SearchPath {
        SearchPath {
            patterns: path
                .split(';')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Expand every pattern for `name`. Patterns without a `?` are invalid
    /// and skipped with a warning.
    pub fn candidates(&self, name: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter_map(|pattern| match pattern.find('?') {
                Some(at) => {
                    let mut candidate = String::with_capacity(pattern.len() + name.len());
                    candidate.push_str(&pattern[..at]);
                    candidate.push_str(name);
                    candidate.push_str(&pattern[at + 1..]);
                    Some(candidate)
                }
                None => {
                    warn!(pattern, "invalid service path pattern, no '?' placeholder");
                    None
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// A loader over a fixed set of in-process modules. This is the default
/// seam for built-in services; a dynamic-library loader would implement
/// [`ModuleLoader`] the same way.
#[derive(Default)]
pub struct StaticLoader {
    modules: HashMap<String, Arc<dyn ServiceModule>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        StaticLoader::default()
    }

    pub fn register(mut self, name: &str, module: impl ServiceModule + 'static) -> Self {
        self.modules.insert(name.to_string(), Arc::new(module));
        self
    }
}

impl ModuleLoader for StaticLoader {
    fn load(&self, name: &str, _search: &SearchPath) -> Option<Arc<dyn ServiceModule>> {
        self.modules.get(name).cloned()
    }
}

/// Caches loaded modules by name. Loading is serialized and double-checked
/// under the lock, so one module type loads at most once.
pub struct ModuleRegistry {
    search: SearchPath,
    loader: Box<dyn ModuleLoader>,
    loaded: Mutex<Vec<(String, Arc<dyn ServiceModule>)>>,
}

impl ModuleRegistry {
    pub fn new(search: SearchPath, loader: Box<dyn ModuleLoader>) -> Self {
        ModuleRegistry {
            search,
            loader,
            loaded: Mutex::new(Vec::new()),
        }
    }

    pub fn query(&self, name: &str) -> Option<Arc<dyn ServiceModule>> {
        let mut loaded = self.loaded.lock();
        if let Some((_, module)) = loaded.iter().find(|(cached, _)| cached == name) {
            return Some(module.clone());
        }
        if loaded.len() >= MAX_MODULE_TYPE {
            warn!(name, limit = MAX_MODULE_TYPE, "module table full");
            return None;
        }
        let module = self.loader.load(name, &self.search)?;
        loaded.push((name.to_string(), module.clone()));
        Some(module)
    }
}
