//! Handler configuration types.

use std::time::Duration;

/// Client session handler configuration.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Client identifier, used to tag log lines.
    pub client_id: String,
    /// Keep-alive interval in seconds (0 = no built-in write-idle timer).
    pub keep_alive: u16,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            keep_alive: 60,
        }
    }
}

impl HandlerConfig {
    /// Create a new config for the given client.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    /// Set keep-alive interval in seconds.
    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    /// Interval after which an idle writer triggers a ping, if enabled.
    pub fn keep_alive_interval(&self) -> Option<Duration> {
        match self.keep_alive {
            0 => None,
            secs => Some(Duration::from_secs(secs as u64)),
        }
    }
}
