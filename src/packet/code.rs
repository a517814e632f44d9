//! RADIUS packet codes and reply classification.

use std::fmt;

use crate::core::types::Outcome;

/// RADIUS packet code (RFC 2865/2866/5176).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketCode {
    /// Access-Request.
    AccessRequest = 1,
    /// Access-Accept.
    AccessAccept = 2,
    /// Access-Reject.
    AccessReject = 3,
    /// Accounting-Request.
    AccountingRequest = 4,
    /// Accounting-Response.
    AccountingResponse = 5,
    /// Access-Challenge.
    AccessChallenge = 11,
    /// Status-Server.
    StatusServer = 12,
    /// Disconnect-Request.
    DisconnectRequest = 40,
    /// Disconnect-ACK.
    DisconnectAck = 41,
    /// Disconnect-NAK.
    DisconnectNak = 42,
    /// CoA-Request.
    CoaRequest = 43,
    /// CoA-ACK.
    CoaAck = 44,
    /// CoA-NAK.
    CoaNak = 45,
}

impl PacketCode {
    /// Decode a code byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::AccessRequest),
            2 => Some(Self::AccessAccept),
            3 => Some(Self::AccessReject),
            4 => Some(Self::AccountingRequest),
            5 => Some(Self::AccountingResponse),
            11 => Some(Self::AccessChallenge),
            12 => Some(Self::StatusServer),
            40 => Some(Self::DisconnectRequest),
            41 => Some(Self::DisconnectAck),
            42 => Some(Self::DisconnectNak),
            43 => Some(Self::CoaRequest),
            44 => Some(Self::CoaAck),
            45 => Some(Self::CoaNak),
            _ => None,
        }
    }

    /// Whether this code is a request the client may originate.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Self::AccessRequest
                | Self::AccountingRequest
                | Self::StatusServer
                | Self::DisconnectRequest
                | Self::CoaRequest
        )
    }

    /// The request code a reply of this code answers, if any.
    pub fn expected_request(self) -> Option<PacketCode> {
        match self {
            Self::AccessAccept | Self::AccessReject | Self::AccessChallenge => {
                Some(Self::AccessRequest)
            }
            Self::AccountingResponse => Some(Self::AccountingRequest),
            Self::DisconnectAck | Self::DisconnectNak => Some(Self::DisconnectRequest),
            Self::CoaAck | Self::CoaNak => Some(Self::CoaRequest),
            _ => None,
        }
    }

    /// The result category a reply of this code maps to, if it is a reply
    /// code we handle.
    pub fn reply_outcome(self) -> Option<Outcome> {
        match self {
            Self::AccessAccept
            | Self::AccountingResponse
            | Self::DisconnectAck
            | Self::CoaAck => Some(Outcome::Success),
            Self::AccessChallenge => Some(Outcome::Updated),
            Self::AccessReject | Self::DisconnectNak | Self::CoaNak => Some(Outcome::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for PacketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AccessRequest => "Access-Request",
            Self::AccessAccept => "Access-Accept",
            Self::AccessReject => "Access-Reject",
            Self::AccountingRequest => "Accounting-Request",
            Self::AccountingResponse => "Accounting-Response",
            Self::AccessChallenge => "Access-Challenge",
            Self::StatusServer => "Status-Server",
            Self::DisconnectRequest => "Disconnect-Request",
            Self::DisconnectAck => "Disconnect-ACK",
            Self::DisconnectNak => "Disconnect-NAK",
            Self::CoaRequest => "CoA-Request",
            Self::CoaAck => "CoA-ACK",
            Self::CoaNak => "CoA-NAK",
        };
        f.write_str(s)
    }
}

/// Map a reply code byte to a result category for a request of `request`
/// code.
///
/// Unknown codes, non-reply codes, and replies whose code family does not
/// match the request all classify as [`Outcome::Invalid`]: the transaction
/// was genuinely answered, just not with anything we can act on.
pub fn classify_reply(reply_code: u8, request: PacketCode) -> Outcome {
    let Some(code) = PacketCode::from_u8(reply_code) else {
        return Outcome::Invalid;
    };
    let Some(outcome) = code.reply_outcome() else {
        return Outcome::Invalid;
    };
    if code.expected_request() != Some(request) {
        return Outcome::Invalid;
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for byte in 0..=u8::MAX {
            if let Some(code) = PacketCode::from_u8(byte) {
                assert_eq!(code as u8, byte);
            }
        }
    }

    #[test]
    fn test_classify_accept() {
        assert_eq!(
            classify_reply(2, PacketCode::AccessRequest),
            Outcome::Success
        );
        assert_eq!(
            classify_reply(3, PacketCode::AccessRequest),
            Outcome::Rejected
        );
        assert_eq!(
            classify_reply(11, PacketCode::AccessRequest),
            Outcome::Updated
        );
    }

    #[test]
    fn test_classify_unknown_code() {
        assert_eq!(
            classify_reply(99, PacketCode::AccessRequest),
            Outcome::Invalid
        );
        assert_eq!(
            classify_reply(0, PacketCode::AccessRequest),
            Outcome::Invalid
        );
    }

    #[test]
    fn test_classify_non_reply_code() {
        // A request code arriving as a "reply" is invalid, not success.
        assert_eq!(
            classify_reply(1, PacketCode::AccessRequest),
            Outcome::Invalid
        );
    }

    #[test]
    fn test_classify_class_mismatch() {
        // Accounting-Response answering an Access-Request.
        assert_eq!(
            classify_reply(5, PacketCode::AccessRequest),
            Outcome::Invalid
        );
        // Access-Accept answering an Accounting-Request.
        assert_eq!(
            classify_reply(2, PacketCode::AccountingRequest),
            Outcome::Invalid
        );
    }

    #[test]
    fn test_is_request() {
        assert!(PacketCode::AccessRequest.is_request());
        assert!(PacketCode::CoaRequest.is_request());
        assert!(!PacketCode::AccessAccept.is_request());
        assert!(!PacketCode::CoaNak.is_request());
    }
}
