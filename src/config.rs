use std::time::Duration;

/// Capped exponential backoff between reconnect attempts.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub api_base_url: String,
    /// Push endpoint; the session token is appended as `?token=`.
    pub ws_url: String,
    pub typing_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000/ws/chat/".to_string(),
            typing_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            command_buffer: 256,
        }
    }
}

impl SessionConfig {
    pub(crate) fn push_url(&self, token: &str) -> String {
        let separator = if self.ws_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}token={}",
            self.ws_url,
            separator,
            urlencoding::encode(token)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..8).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 8, 16, 30, 30, 30]);
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_push_url_encodes_token() {
        let config = SessionConfig::default();
        assert_eq!(
            config.push_url("a b+c"),
            "ws://localhost:8000/ws/chat/?token=a%20b%2Bc"
        );
    }
}
