use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Per-endpoint back-off after the remote side signalled a rate limit.
#[derive(Debug, Clone)]
pub struct Cooldown {
    window: Duration,
    until: Arc<DashMap<String, Instant>>,
}

impl Cooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            until: Arc::new(DashMap::new()),
        }
    }

    pub fn start(&self, endpoint: &str) {
        self.until
            .insert(endpoint.to_string(), Instant::now() + self.window);
    }

    pub fn is_active(&self, endpoint: &str) -> bool {
        let now = Instant::now();
        let active = self
            .until
            .get(endpoint)
            .is_some_and(|until| now < *until);
        if !active {
            self.until.remove_if(endpoint, |_, until| now >= *until);
        }
        active
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
