use std::ffi::{OsStr, OsString};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

/// Process-wide lock for tests that mutate environment variables.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Holds [`ENV_LOCK`] for a sync test, starts with the given variables unset
/// and puts their previous values back on drop.
pub struct ScopedEnv {
    saved: Vec<(&'static str, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    pub fn cleared(keys: &[&'static str]) -> Self {
        let lock = ENV_LOCK.blocking_lock();
        let saved = keys
            .iter()
            .map(|key| (*key, std::env::var_os(key)))
            .collect();
        for key in keys {
            std::env::remove_var(key);
        }
        Self { saved, _lock: lock }
    }

    pub fn set(&self, key: &str, value: impl AsRef<OsStr>) {
        std::env::set_var(key, value);
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}
