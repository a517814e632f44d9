//! Protocol constants.
//!
//! These values are fixed by RFC 2865/2866 and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// RADIUS packet header size (code + id + length + authenticator).
pub const HEADER_LEN: usize = 20;

/// Authenticator field size.
pub const AUTHENTICATOR_LEN: usize = 16;

/// Smallest structurally valid packet (a bare header).
pub const MIN_PACKET_LEN: usize = HEADER_LEN;

/// Largest packet the protocol permits on the wire.
pub const MAX_PACKET_LEN: usize = 4096;

/// Largest attribute value (the attribute length field is one octet).
pub const MAX_ATTR_VALUE_LEN: usize = 253;

/// Wire size of the Proxy-State attribute we append (type + len + u32 nonce).
pub const PROXY_STATE_OVERHEAD: usize = 6;

/// Wire size of a Message-Authenticator attribute (type + len + 16-byte HMAC).
pub const MESSAGE_AUTHENTICATOR_OVERHEAD: usize = 18;

// =============================================================================
// IDENTIFIER SPACE
// =============================================================================

/// Number of request identifiers per connection.
///
/// One shared ID space for all packet codes sent on a connection: replies
/// carry only the identifier, so per-code spaces would make lookup ambiguous.
pub const ID_SPACE: usize = 256;

/// Hard cap on in-flight requests per connection (the identifier space size).
pub const MAX_IN_FLIGHT: usize = ID_SPACE;

// =============================================================================
// DEFAULTS (configuration)
// =============================================================================

/// Default maximum packet size.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 4096;

/// Lower bound for a configured maximum packet size.
pub const MIN_MAX_PACKET_SIZE: usize = 64;

/// Upper bound for a configured maximum packet size.
pub const MAX_MAX_PACKET_SIZE: usize = 65535;

/// Default idle timeout before an unused connection is torn down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay before re-opening a connection after an open failure.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default initial retransmission time (RFC 5080 IRT).
pub const DEFAULT_IRT: Duration = Duration::from_secs(2);

/// Default maximum retransmission time (RFC 5080 MRT).
pub const DEFAULT_MRT: Duration = Duration::from_secs(16);

/// Default maximum transmission count (RFC 5080 MRC).
pub const DEFAULT_MRC: u32 = 5;

/// Default maximum retransmission duration (RFC 5080 MRD).
pub const DEFAULT_MRD: Duration = Duration::from_secs(30);
