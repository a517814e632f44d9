//! Error types for the transport.

use thiserror::Error;

use super::constants::{MAX_ATTR_VALUE_LEN, MAX_MAX_PACKET_SIZE, MIN_MAX_PACKET_SIZE};

/// Errors that can occur when encoding a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The output buffer cannot hold a packet header.
    #[error("buffer too small for a packet header")]
    BufferTooSmall,

    /// An attribute value exceeds the one-octet length field.
    #[error("attribute {typ} value is {len} bytes, maximum is {MAX_ATTR_VALUE_LEN}")]
    AttributeTooLong {
        /// Attribute type.
        typ: u8,
        /// Value length in bytes.
        len: usize,
    },

    /// The encoded packet would exceed the maximum packet size.
    #[error("packet exceeds maximum size of {max} bytes")]
    PacketTooLarge {
        /// Configured maximum packet size.
        max: usize,
    },
}

/// Errors that can occur when signing a packet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignError {
    /// The buffer is shorter than its header claims.
    #[error("packet truncated")]
    Truncated,

    /// A Message-Authenticator attribute exists but has the wrong length.
    #[error("malformed Message-Authenticator attribute")]
    MalformedAuthenticator,
}

/// Errors that can occur when verifying a reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The buffer is shorter than its header claims.
    #[error("packet truncated")]
    Truncated,

    /// The Message-Authenticator HMAC does not match.
    #[error("invalid Message-Authenticator")]
    BadMessageAuthenticator,

    /// The response authenticator does not match.
    #[error("invalid response authenticator")]
    BadResponseAuthenticator,
}

/// Errors raised during configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The shared secret must not be empty.
    #[error("a shared secret must be given")]
    EmptySecret,

    /// `max_packet_size` is outside the permitted range.
    #[error(
        "max_packet_size {value} out of range \
         [{MIN_MAX_PACKET_SIZE}, {MAX_MAX_PACKET_SIZE}]"
    )]
    PacketSizeOutOfRange {
        /// The rejected value.
        value: usize,
    },
}

/// Errors from the per-connection ID tracker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackError {
    /// All 256 identifiers on this connection are in use.
    #[error("identifier space exhausted")]
    IdSpaceExhausted,
}
