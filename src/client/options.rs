//! Connection options and client configuration.

use embassy_time::Duration;

pub use crate::packet::LastWill;
use crate::packet::Connect;

/// Default deadline for request/response exchanges.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default slice of time a single read waits for inbound data.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings fixed when the client is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientConfig {
    /// Bound on every acknowledgment wait and on writing or reading a whole packet.
    pub command_timeout: Duration,
    /// How long one service cycle waits for inbound data before checking timers.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Options for a single connection attempt.
///
/// ```ignore
/// let options = MqttOptions::new("sensor-42")
///     .with_keep_alive(30)
///     .with_credentials("user", b"secret")
///     .with_will(LastWill {
///         topic: "sensor-42/status",
///         payload: b"offline",
///         qos: QoS::AtLeastOnce,
///         retain: true,
///     });
/// ```
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MqttOptions<'a> {
    pub client_id: &'a str,
    /// Keepalive interval in seconds, `0` disables keepalive.
    pub keep_alive_secs: u16,
    pub clean_session: bool,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
    pub will: Option<LastWill<'a>>,
}

impl<'a> MqttOptions<'a> {
    pub fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            keep_alive_secs: 60,
            clean_session: true,
            username: None,
            password: None,
            will: None,
        }
    }

    pub fn with_keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub fn with_clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    pub fn with_credentials(mut self, username: &'a str, password: &'a [u8]) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    pub fn with_will(mut self, will: LastWill<'a>) -> Self {
        self.will = Some(will);
        self
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs as u64)
    }

    pub(crate) fn to_connect(&self) -> Connect<'a> {
        let mut connect = Connect::new(self.client_id, self.keep_alive_secs, self.clean_session);
        connect.username = self.username;
        connect.password = self.password;
        connect.will = self.will;
        connect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::QoS;

    #[test]
    fn defaults() {
        let options = MqttOptions::new("dev");
        assert_eq!(options.keep_alive_secs, 60);
        assert!(options.clean_session);
        assert!(options.username.is_none());

        let config = ClientConfig::default();
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn builder_fills_connect_packet() {
        let will = LastWill {
            topic: "dev/status",
            payload: b"gone",
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        let connect = MqttOptions::new("dev")
            .with_keep_alive(0)
            .with_clean_session(false)
            .with_credentials("u", b"p")
            .with_will(will)
            .to_connect();
        assert_eq!(connect.client_id, "dev");
        assert_eq!(connect.keep_alive, 0);
        assert!(!connect.clean_session);
        assert_eq!(connect.username, Some("u"));
        assert_eq!(connect.password, Some(&b"p"[..]));
        assert_eq!(connect.will, Some(will));
    }
}
