//! Push-style health check.
//!
//! When a URL is configured, received packets trigger an HTTP `HEAD` to it
//! (dead-man switch services such as healthchecks.io). Pings are throttled
//! and run on their own task so a slow endpoint never delays routing.

use std::time::Duration;

use log::{debug, warn};
use tokio::time::{timeout, Instant};

pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HealthReporter {
    url: String,
    client: reqwest::Client,
    throttle: Duration,
    timeout: Duration,
    last_ping: Option<Instant>,
}

impl HealthReporter {
    pub fn new(url: impl Into<String>, throttle: Duration, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            throttle,
            timeout,
            last_ping: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Claim the next ping slot. Returns `false` while throttled.
    pub fn should_ping(&mut self, now: Instant) -> bool {
        match self.last_ping {
            Some(last) if now.duration_since(last) < self.throttle => false,
            _ => {
                self.last_ping = Some(now);
                true
            }
        }
    }

    /// Fire a ping in the background if the throttle allows it.
    pub fn ping(&mut self) {
        if !self.should_ping(Instant::now()) {
            return;
        }
        let client = self.client.clone();
        let url = self.url.clone();
        let limit = self.timeout;
        tokio::spawn(async move {
            match timeout(limit, client.head(&url).send()).await {
                Ok(Ok(resp)) if resp.status().is_success() => {
                    debug!("Health check ping ok ({})", resp.status());
                }
                Ok(Ok(resp)) => warn!("Health check ping returned {}", resp.status()),
                Ok(Err(e)) => warn!("Health check ping failed: {}", e),
                Err(_) => warn!("Health check ping timed out after {}s", limit.as_secs()),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttles_pings() {
        let mut reporter =
            HealthReporter::new("http://localhost/ping", DEFAULT_THROTTLE, DEFAULT_TIMEOUT);
        let t0 = Instant::now();
        assert!(reporter.should_ping(t0));
        assert!(!reporter.should_ping(t0 + Duration::from_secs(59)));
        assert!(reporter.should_ping(t0 + Duration::from_secs(60)));
        assert!(!reporter.should_ping(t0 + Duration::from_secs(61)));
    }
}
