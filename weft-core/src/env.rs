//! Process-wide environment store.
//!
//! Holds the key/value pairs loaded from the config file at startup plus
//! anything services publish via `SETENV`. Keys are write-once: setting an
//! existing key is an error, so configuration cannot be silently clobbered
//! after bootstrap.

use dashmap::DashMap;

use crate::error::EnvError;

pub struct EnvStore {
    vars: DashMap<String, String>,
}

impl EnvStore {
    pub fn new() -> Self {
        EnvStore {
            vars: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).map(|v| v.value().clone())
    }

    /// Set a key for the first time.
    pub fn set(&self, key: &str, value: &str) -> Result<(), EnvError> {
        match self.vars.entry(key.to_string()) {
            dashmap::Entry::Occupied(_) => Err(EnvError::Duplicate(key.to_string())),
            dashmap::Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                Ok(())
            }
        }
    }

    /// Read a key, storing and returning `default` when it is unset.
    pub fn or_insert(&self, key: &str, default: &str) -> String {
        self.vars
            .entry(key.to_string())
            .or_insert_with(|| default.to_string())
            .value()
            .clone()
    }
}

impl Default for EnvStore {
    fn default() -> Self {
        EnvStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let env = EnvStore::new();
        env.set("thread", "8").unwrap();
        assert_eq!(env.get("thread").as_deref(), Some("8"));
        assert_eq!(env.get("missing"), None);
    }

    #[test]
    fn duplicate_set_is_rejected() {
        let env = EnvStore::new();
        env.set("harbor", "1").unwrap();
        assert_eq!(
            env.set("harbor", "2"),
            Err(EnvError::Duplicate("harbor".to_string()))
        );
        // The first value survives.
        assert_eq!(env.get("harbor").as_deref(), Some("1"));
    }

    #[test]
    fn or_insert_only_writes_once() {
        let env = EnvStore::new();
        assert_eq!(env.or_insert("start", "main"), "main");
        assert_eq!(env.or_insert("start", "other"), "main");
    }
}
