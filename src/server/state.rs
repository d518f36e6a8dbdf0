use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::AuthenticationGate;
use crate::config::Settings;
use crate::connection_manager::ConnectionRegistry;
use crate::notification::NotificationDispatcher;
use crate::preferences::PreferenceStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ConnectionRegistry>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub auth_gate: Arc<AuthenticationGate>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, preferences: Arc<dyn PreferenceStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let auth_gate = Arc::new(AuthenticationGate::new(
            registry.clone(),
            preferences.clone(),
            Duration::from_millis(settings.preferences.lookup_timeout_ms),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(registry.clone()));

        Self {
            settings: Arc::new(settings),
            registry,
            preferences,
            auth_gate,
            dispatcher,
            start_time: Instant::now(),
        }
    }
}
