use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;

use crate::{config::AppConfig, sync::SyncQueue};

/// Runtime toggle state for the Dynamic Now filter. Flipping or setting
/// `enabled` always resets `show_hidden`, so a user re-enabling the filter
/// starts from the suppressed view rather than a stale peek.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DynamicNowState {
    pub enabled: bool,
    pub show_hidden: bool,
}

impl DynamicNowState {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.show_hidden = false;
    }

    pub fn toggle(&mut self) {
        self.set_enabled(!self.enabled);
    }

    pub fn set_show_hidden(&mut self, show_hidden: bool) {
        self.show_hidden = show_hidden;
    }
}

#[derive(Clone)]
pub struct AppContext {
    config: Arc<AppConfig>,
    shutdown: Arc<Notify>,
    queue: Arc<SyncQueue>,
    dynamic_now: Arc<RwLock<DynamicNowState>>,
}

impl AppContext {
    pub fn new(config: AppConfig, queue: Arc<SyncQueue>) -> Self {
        let dynamic_now = DynamicNowState {
            enabled: config.dynamic_now.enabled,
            show_hidden: config.dynamic_now.show_hidden,
        };
        Self {
            config: Arc::new(config),
            shutdown: Arc::new(Notify::new()),
            queue,
            dynamic_now: Arc::new(RwLock::new(dynamic_now)),
        }
    }

    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    pub fn queue(&self) -> Arc<SyncQueue> {
        Arc::clone(&self.queue)
    }

    pub fn dynamic_now(&self) -> DynamicNowState {
        *self.dynamic_now.read()
    }

    pub fn update_dynamic_now(&self, update: impl FnOnce(&mut DynamicNowState)) -> DynamicNowState {
        let mut state = self.dynamic_now.write();
        update(&mut state);
        *state
    }

    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}
