use std::sync::Arc;

use crate::config::Config;
use crate::services::notify::Notifier;
use crate::store::Store;

/// Shared handles the service operations run against. Built once at startup
/// by the process wiring and cloned per request; nothing here is mutable.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }
}
