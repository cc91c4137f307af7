pub mod lobby;
pub mod machine;
pub mod waitlist;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{config::AppConfig, dao::lobby_store::Backends, error::ServiceError};

pub type SharedState = Arc<AppState>;

/// Central application state storing the storage backends and runtime
/// configuration shared by every request handler and background task.
pub struct AppState {
    backends: RwLock<Option<Backends>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until storage backends are installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            backends: RwLock::new(None),
            degraded: degraded_tx,
            config,
        })
    }

    /// Obtain handles to the current storage backends, if installed.
    pub async fn backends(&self) -> Option<Backends> {
        let guard = self.backends.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the storage backends or fail with the degraded-mode error.
    pub async fn require_backends(&self) -> Result<Backends, ServiceError> {
        self.backends().await.ok_or(ServiceError::Degraded)
    }

    /// Install storage backends and leave degraded mode.
    pub async fn install_backends(&self, backends: Backends) {
        {
            let mut guard = self.backends.write().await;
            *guard = Some(backends);
        }
        self.update_degraded(false);
    }

    /// Remove the current storage backends and enter degraded mode.
    pub async fn clear_backends(&self) {
        {
            let mut guard = self.backends.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.backends.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Runtime configuration the state was built with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Update and broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }

        let _ = self.degraded.send(value);
    }
}
