mod settings;

pub use settings::{PreferencesConfig, ServerConfig, Settings, WebSocketConfig};
