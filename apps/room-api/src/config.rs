use std::time::Duration;

/// Room API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP and WebSocket server binds to.
    pub port: u16,
    /// Browser origin allowed by CORS (e.g. `http://localhost:3000`).
    pub client_url: String,
    /// How long an empty room survives before the idle reaper deletes it.
    pub room_idle_timeout_secs: u64,
    /// Interval between server-sent WebSocket pings.
    pub ws_ping_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            client_url: "http://localhost:3000".to_string(),
            room_idle_timeout_secs: 60,
            ws_ping_interval_secs: 25,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; missing or unparsable values keep their
    /// default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed_var("PORT").unwrap_or(defaults.port),
            client_url: std::env::var("CLIENT_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.client_url),
            room_idle_timeout_secs: parsed_var("ROOM_IDLE_TIMEOUT_SECS")
                .unwrap_or(defaults.room_idle_timeout_secs),
            ws_ping_interval_secs: parsed_var("WS_PING_INTERVAL_SECS")
                .unwrap_or(defaults.ws_ping_interval_secs),
        }
    }

    pub fn room_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.room_idle_timeout_secs)
    }

    pub fn ws_ping_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic.
        Duration::from_secs(self.ws_ping_interval_secs.max(1))
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
