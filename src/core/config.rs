//! Transport configuration.
//!
//! One configuration targets exactly one home server `address:port`. Values
//! are validated once at build time; the transport itself never re-checks
//! them.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::constants::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_IRT, DEFAULT_MAX_PACKET_SIZE, DEFAULT_MRC, DEFAULT_MRD,
    DEFAULT_MRT, DEFAULT_RECONNECT_DELAY, MAX_MAX_PACKET_SIZE, MIN_MAX_PACKET_SIZE,
};
use super::error::ConfigError;
use crate::packet::PacketCode;

/// Shared secret between this client and the home server.
///
/// Zeroized on drop so the secret does not linger in freed memory.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wrap raw secret bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Retransmission policy for one packet code (RFC 5080 shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Initial retransmission time.
    pub irt: Duration,
    /// Maximum retransmission time; the doubling backoff is capped here.
    pub mrt: Duration,
    /// Maximum transmission count; 0 disables the count limit.
    pub mrc: u32,
    /// Maximum retransmission duration; zero disables the duration limit.
    pub mrd: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            irt: DEFAULT_IRT,
            mrt: DEFAULT_MRT,
            mrc: DEFAULT_MRC,
            mrd: DEFAULT_MRD,
        }
    }
}

/// Per-code retry policies with a fallback default.
#[derive(Debug, Clone, Default)]
pub struct RetrySchedule {
    default: RetryPolicy,
    by_code: HashMap<PacketCode, RetryPolicy>,
}

impl RetrySchedule {
    /// The policy for a given request code.
    pub fn for_code(&self, code: PacketCode) -> RetryPolicy {
        self.by_code.get(&code).copied().unwrap_or(self.default)
    }
}

/// Validated transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Address and port of the home server.
    pub server_addr: SocketAddr,
    /// Local address to bind outgoing sockets to; unspecified if `None`.
    pub local_addr: Option<IpAddr>,
    /// Shared secret.
    pub secret: Secret,
    /// Maximum packet size; also the per-connection buffer size.
    pub max_packet_size: usize,
    /// Tear down a connection after this long with nothing in flight.
    /// Zero disables idle teardown.
    pub idle_timeout: Duration,
    /// Delay before re-opening after a failed connection attempt.
    pub reconnect_delay: Duration,
    /// Fire-and-forget mode: never await or match replies.
    pub replicate: bool,
    /// Retransmission policies.
    pub retry: RetrySchedule,
}

impl TransportConfig {
    /// Start building a configuration for the given home server.
    pub fn builder(server_addr: SocketAddr) -> TransportConfigBuilder {
        TransportConfigBuilder {
            server_addr,
            local_addr: None,
            secret: Secret::new(Vec::new()),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            replicate: false,
            retry: RetrySchedule::default(),
        }
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug)]
pub struct TransportConfigBuilder {
    server_addr: SocketAddr,
    local_addr: Option<IpAddr>,
    secret: Secret,
    max_packet_size: usize,
    idle_timeout: Duration,
    reconnect_delay: Duration,
    replicate: bool,
    retry: RetrySchedule,
}

impl TransportConfigBuilder {
    /// Set the shared secret.
    pub fn secret(mut self, secret: impl Into<Secret>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Bind outgoing sockets to this local address.
    pub fn local_addr(mut self, addr: IpAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    /// Set the maximum packet size.
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Set the idle timeout; zero disables idle teardown.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the reconnect delay.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Enable or disable replicate (fire-and-forget) mode.
    pub fn replicate(mut self, enabled: bool) -> Self {
        self.replicate = enabled;
        self
    }

    /// Set the fallback retry policy.
    pub fn retry_default(mut self, policy: RetryPolicy) -> Self {
        self.retry.default = policy;
        self
    }

    /// Override the retry policy for one packet code.
    pub fn retry_override(mut self, code: PacketCode, policy: RetryPolicy) -> Self {
        self.retry.by_code.insert(code, policy);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<TransportConfig, ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if self.max_packet_size < MIN_MAX_PACKET_SIZE || self.max_packet_size > MAX_MAX_PACKET_SIZE
        {
            return Err(ConfigError::PacketSizeOutOfRange {
                value: self.max_packet_size,
            });
        }

        Ok(TransportConfig {
            server_addr: self.server_addr,
            local_addr: self.local_addr,
            secret: self.secret,
            max_packet_size: self.max_packet_size,
            idle_timeout: self.idle_timeout,
            reconnect_delay: self.reconnect_delay,
            replicate: self.replicate,
            retry: self.retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:1812".parse().unwrap()
    }

    #[test]
    fn test_build_defaults() {
        let config = TransportConfig::builder(addr())
            .secret("s3cr3t")
            .build()
            .unwrap();

        assert_eq!(config.max_packet_size, DEFAULT_MAX_PACKET_SIZE);
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert!(!config.replicate);
        assert_eq!(config.secret.as_bytes(), b"s3cr3t");
    }

    #[test]
    fn test_empty_secret_rejected() {
        let err = TransportConfig::builder(addr()).build().unwrap_err();
        assert_eq!(err, ConfigError::EmptySecret);
    }

    #[test]
    fn test_packet_size_bounds() {
        let err = TransportConfig::builder(addr())
            .secret("x")
            .max_packet_size(63)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::PacketSizeOutOfRange { value: 63 });

        let err = TransportConfig::builder(addr())
            .secret("x")
            .max_packet_size(70_000)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::PacketSizeOutOfRange { value: 70_000 });

        assert!(
            TransportConfig::builder(addr())
                .secret("x")
                .max_packet_size(64)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_retry_override() {
        let short = RetryPolicy {
            irt: Duration::from_secs(1),
            mrt: Duration::from_secs(1),
            mrc: 2,
            mrd: Duration::from_secs(10),
        };
        let config = TransportConfig::builder(addr())
            .secret("x")
            .retry_override(PacketCode::AccountingRequest, short)
            .build()
            .unwrap();

        assert_eq!(config.retry.for_code(PacketCode::AccountingRequest), short);
        assert_eq!(
            config.retry.for_code(PacketCode::AccessRequest),
            RetryPolicy::default()
        );
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::from("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret(..)");
    }
}
