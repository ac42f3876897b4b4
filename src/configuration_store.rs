//! A thread-safe in-memory holder for the currently active campaign
//! configuration. Readers (selection passes, the scheduler's fire-time
//! re-validation) and the writer (the host's configuration downloader) access
//! it concurrently.

use std::sync::{Arc, RwLock};

use crate::Configuration;

/// `ConfigurationStore` provides thread-safe (`Sync`) storage for the active
/// [`Configuration`].
///
/// A `Configuration` is immutable and only ever replaced as a whole; readers
/// receive a snapshot unaffected by later writes.
#[derive(Default)]
pub struct ConfigurationStore {
    configuration: RwLock<Option<Arc<Configuration>>>,
}

impl ConfigurationStore {
    /// Create a new empty configuration store.
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    /// Get the currently active configuration. Returns `None` if no
    /// configuration has been stored yet.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        // Err() is possible only if the lock is poisoned (writer panicked
        // while holding the lock), which should never happen.
        let configuration = self
            .configuration
            .read()
            .expect("thread holding configuration lock should not panic");

        configuration.clone()
    }

    /// Replace the active configuration.
    pub fn set_configuration(&self, config: Arc<Configuration>) {
        let mut slot = self
            .configuration
            .write()
            .expect("thread holding configuration lock should not panic");

        *slot = Some(config);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::ConfigurationStore;
    use crate::{model::ConfigResponse, Configuration};

    #[test]
    fn can_set_configuration_from_another_thread() {
        let store = Arc::new(ConfigurationStore::new());

        assert!(store.get_configuration().is_none());

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.set_configuration(Arc::new(Configuration::from_config_response(
                    ConfigResponse {
                        created_at: Utc::now(),
                        campaigns: Vec::new(),
                        experiments: Vec::new(),
                        settings: Default::default(),
                    },
                )))
            })
            .join();
        }

        assert!(store.get_configuration().is_some());
    }
}
