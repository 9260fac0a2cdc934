use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Client configuration parameters for the registry session
///
/// Covers connection establishment against the seeds, per-request deadlines,
/// liveness heartbeats and how a lost connection is probed back to health.
///
/// # Key Configuration Areas
/// - Seed connection (per-seed handshake timeout)
/// - Register/unregister/metadata request deadlines
/// - Heartbeat cadence and deadline
/// - Graceful close
/// - HTTP/2 keepalive and compression
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Maximum time to wait for a seed to complete the transport handshake
    /// Default: 1 second
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Maximum time to wait for a register, unregister or metadata RPC
    /// Default: 3 seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Interval between liveness heartbeats
    /// Default: 1 second
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_in_ms: u64,

    /// Deadline for a single heartbeat
    /// Default: 1 second
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_in_ms: u64,

    /// Grace period for unregistering local members on close
    /// Default: 1 second
    #[serde(default = "default_close_timeout")]
    pub close_timeout_in_ms: u64,

    /// Interval between health probes while connected
    /// Default: 1 second
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_in_ms: u64,

    /// TCP keepalive duration for idle connections
    /// Default: 5 minutes (300s)
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_in_secs: u64,

    /// Interval for HTTP/2 keepalive pings
    /// Default: 1 minute (60s)
    #[serde(default = "default_h2_keep_alive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,

    /// Timeout for HTTP/2 keepalive pings
    /// Default: 20 seconds
    #[serde(default = "default_h2_keep_alive_timeout")]
    pub http2_keep_alive_timeout_in_secs: u64,

    /// Enable Gzip compression for registry traffic
    /// Default: true (enabled)
    #[serde(default = "default_enable_compression")]
    pub enable_compression: bool,

    /// Backoff used to probe the registry after the connection drops
    #[serde(default)]
    pub reconnect: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            heartbeat_interval_in_ms: default_heartbeat_interval(),
            heartbeat_timeout_in_ms: default_heartbeat_timeout(),
            close_timeout_in_ms: default_close_timeout(),
            health_check_interval_in_ms: default_health_check_interval(),
            tcp_keepalive_in_secs: default_tcp_keepalive(),
            http2_keep_alive_interval_in_secs: default_h2_keep_alive_interval(),
            http2_keep_alive_timeout_in_secs: default_h2_keep_alive_timeout(),
            enable_compression: default_enable_compression(),
            reconnect: BackoffPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("connect timeout", self.connect_timeout_in_ms),
            ("request timeout", self.request_timeout_in_ms),
            ("heartbeat interval", self.heartbeat_interval_in_ms),
            ("heartbeat timeout", self.heartbeat_timeout_in_ms),
            ("health check interval", self.health_check_interval_in_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(ConfigError::Message(format!("{name} must be > 0"))));
            }
        }

        if self.http2_keep_alive_timeout_in_secs >= self.http2_keep_alive_interval_in_secs {
            return Err(Error::Config(ConfigError::Message(format!(
                "keepalive timeout {}s must be < interval {}s",
                self.http2_keep_alive_timeout_in_secs, self.http2_keep_alive_interval_in_secs
            ))));
        }

        self.reconnect.validate()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_in_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_in_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_in_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_in_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_in_ms)
    }
}

fn default_connect_timeout() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    3000
}
fn default_heartbeat_interval() -> u64 {
    1000
}
fn default_heartbeat_timeout() -> u64 {
    1000
}
fn default_close_timeout() -> u64 {
    1000
}
fn default_health_check_interval() -> u64 {
    1000
}
fn default_tcp_keepalive() -> u64 {
    300
}
fn default_h2_keep_alive_interval() -> u64 {
    60
}
fn default_h2_keep_alive_timeout() -> u64 {
    20
}
fn default_enable_compression() -> bool {
    true
}
