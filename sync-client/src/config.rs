use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Where the authority lives, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Quiet period after the last `schedule_sync` before a sync actually goes out.
    pub debounce: Duration,
    /// How long to wait before reopening a dropped push channel.
    pub reconnect_delay: Duration,
    /// How long the user must be idle before a remote dataset is put on screen.
    pub idle_delay: Duration,
    /// Upper bound on a single sync round trip. Does not apply to the push channel.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            debounce: Duration::from_millis(500),
            reconnect_delay: Duration::from_secs(5),
            idle_delay: Duration::from_millis(1800),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}
