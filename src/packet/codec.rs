//! Wire encode, structural validation, signing, and reply verification.
//!
//! Packet layout (RFC 2865):
//!
//! ```text
//! 0               1               2               3
//! +---------------+---------------+---------------+---------------+
//! |     Code      |  Identifier   |            Length             |
//! +---------------+---------------+---------------+---------------+
//! |                      Authenticator (16)                       |
//! +---------------------------------------------------------------+
//! |  Attributes: (type, length, value)*                           |
//! +---------------------------------------------------------------+
//! ```
//!
//! Signing covers two mechanisms: the header authenticator (MD5 over packet
//! and secret, RFC 2865 §3) and the optional Message-Authenticator attribute
//! (HMAC-MD5, RFC 3579 §3.2).

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};

use super::attr::{self, Attribute};
use super::code::PacketCode;
use crate::core::constants::{
    AUTHENTICATOR_LEN, HEADER_LEN, MAX_ATTR_VALUE_LEN, MAX_PACKET_LEN, MIN_PACKET_LEN,
};
use crate::core::error::{EncodeError, SignError, VerifyError};

type HmacMd5 = Hmac<Md5>;

/// Header material of a sent request, kept for verifying its reply.
#[derive(Debug, Clone, Copy)]
pub struct OriginalHeader {
    /// Request packet code.
    pub code: PacketCode,
    /// Request identifier.
    pub id: u8,
    /// Request authenticator as it went out on the wire (post-signing).
    pub authenticator: [u8; AUTHENTICATOR_LEN],
}

/// Encode a request into `buf`.
///
/// The authenticator is written as given: random bytes for an
/// Access-Request, zeros otherwise (the zeros are overwritten by
/// [`sign`]). Returns the encoded length.
pub fn encode(
    buf: &mut [u8],
    code: PacketCode,
    id: u8,
    authenticator: &[u8; AUTHENTICATOR_LEN],
    attrs: &[Attribute],
) -> Result<usize, EncodeError> {
    if buf.len() < HEADER_LEN {
        return Err(EncodeError::BufferTooSmall);
    }

    buf[0] = code as u8;
    buf[1] = id;
    buf[4..HEADER_LEN].copy_from_slice(authenticator);

    let mut len = HEADER_LEN;
    for attr in attrs {
        if attr.value.len() > MAX_ATTR_VALUE_LEN {
            return Err(EncodeError::AttributeTooLong {
                typ: attr.typ,
                len: attr.value.len(),
            });
        }
        let alen = attr.wire_len();
        if len + alen > buf.len() {
            return Err(EncodeError::PacketTooLarge { max: buf.len() });
        }
        buf[len] = attr.typ;
        buf[len + 1] = alen as u8;
        buf[len + 2..len + alen].copy_from_slice(&attr.value);
        len += alen;
    }

    buf[2..4].copy_from_slice(&(len as u16).to_be_bytes());
    Ok(len)
}

/// Append one attribute to an already-encoded packet, adjusting the length
/// header. The caller must have checked that `value.len() + 2` bytes fit.
pub fn append_attr(packet: &mut [u8], len: &mut usize, typ: u8, value: &[u8]) {
    let alen = 2 + value.len();
    debug_assert!(*len + alen <= packet.len());

    packet[*len] = typ;
    packet[*len + 1] = alen as u8;
    packet[*len + 2..*len + alen].copy_from_slice(value);
    *len += alen;
    packet[2..4].copy_from_slice(&(*len as u16).to_be_bytes());
}

/// Structural validation of a received frame.
///
/// Checks only shape: plausible length, nonzero code, and an attribute walk
/// that terminates exactly at the header length. Trailing datagram padding
/// beyond the header length is tolerated per RFC 2865 §3.
pub fn is_well_formed(buf: &[u8]) -> bool {
    if buf.len() < MIN_PACKET_LEN {
        return false;
    }
    if buf[0] == 0 {
        return false;
    }
    let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    if len < HEADER_LEN || len > buf.len() || len > MAX_PACKET_LEN {
        return false;
    }

    let mut pos = HEADER_LEN;
    while pos < len {
        if pos + 2 > len {
            return false;
        }
        let alen = buf[pos + 1] as usize;
        if alen < 2 || pos + alen > len {
            return false;
        }
        pos += alen;
    }
    pos == len
}

/// Sign a packet in place.
///
/// For a request pass `original = None`; for a response pass the request's
/// authenticator. Fills the Message-Authenticator attribute if one is
/// present, then computes the header authenticator. An Access-Request
/// keeps its random authenticator.
pub fn sign(
    buf: &mut [u8],
    original: Option<&[u8; AUTHENTICATOR_LEN]>,
    secret: &[u8],
) -> Result<(), SignError> {
    let len = packet_len(buf).ok_or(SignError::Truncated)?;

    if let Some(orig) = original {
        buf[4..HEADER_LEN].copy_from_slice(orig);
    }

    if let Some(pos) = attr::find_attr(buf, len, attr::types::MESSAGE_AUTHENTICATOR) {
        if buf[pos + 1] as usize != 2 + AUTHENTICATOR_LEN {
            return Err(SignError::MalformedAuthenticator);
        }
        buf[pos + 2..pos + 2 + AUTHENTICATOR_LEN].fill(0);
        let mac = hmac_md5(secret, &buf[..len]);
        buf[pos + 2..pos + 2 + AUTHENTICATOR_LEN].copy_from_slice(&mac);
    }

    if original.is_some() || buf[0] != PacketCode::AccessRequest as u8 {
        let digest = md5_packet(&buf[..len], secret);
        buf[4..HEADER_LEN].copy_from_slice(&digest);
    }

    Ok(())
}

/// Verify a reply's integrity against the original request.
///
/// Checks the Message-Authenticator HMAC when the reply carries one, then
/// the response authenticator (MD5 over the reply with the request
/// authenticator substituted into the header, RFC 2865 §3).
pub fn verify(
    reply: &[u8],
    original: &OriginalHeader,
    secret: &[u8],
) -> Result<(), VerifyError> {
    let len = packet_len(reply).ok_or(VerifyError::Truncated)?;

    let mut scratch = reply[..len].to_vec();
    scratch[4..HEADER_LEN].copy_from_slice(&original.authenticator);

    if let Some(pos) = attr::find_attr(&scratch, len, attr::types::MESSAGE_AUTHENTICATOR) {
        if scratch[pos + 1] as usize != 2 + AUTHENTICATOR_LEN {
            return Err(VerifyError::BadMessageAuthenticator);
        }
        let mut received = [0u8; AUTHENTICATOR_LEN];
        received.copy_from_slice(&reply[pos + 2..pos + 2 + AUTHENTICATOR_LEN]);
        scratch[pos + 2..pos + 2 + AUTHENTICATOR_LEN].fill(0);
        if hmac_md5(secret, &scratch) != received {
            return Err(VerifyError::BadMessageAuthenticator);
        }
        scratch[pos + 2..pos + 2 + AUTHENTICATOR_LEN].copy_from_slice(&received);
    }

    let digest = md5_packet(&scratch, secret);
    if digest != reply[4..HEADER_LEN] {
        return Err(VerifyError::BadResponseAuthenticator);
    }

    Ok(())
}

/// Header length field, validated against the buffer.
fn packet_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    if len < HEADER_LEN || len > buf.len() {
        return None;
    }
    Some(len)
}

fn md5_packet(packet: &[u8], secret: &[u8]) -> [u8; AUTHENTICATOR_LEN] {
    let mut hasher = Md5::new();
    hasher.update(packet);
    hasher.update(secret);
    hasher.finalize().into()
}

fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; AUTHENTICATOR_LEN] {
    // HMAC accepts keys of any length; construction cannot fail.
    let mut mac = HmacMd5::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::DEFAULT_MAX_PACKET_SIZE;

    const SECRET: &[u8] = b"s3cr3t";

    fn encode_request(code: PacketCode, id: u8, attrs: &[Attribute]) -> Vec<u8> {
        let mut buf = vec![0u8; DEFAULT_MAX_PACKET_SIZE];
        let auth = if code == PacketCode::AccessRequest {
            rand::random()
        } else {
            [0u8; AUTHENTICATOR_LEN]
        };
        let len = encode(&mut buf, code, id, &auth, attrs).unwrap();
        buf.truncate(len);
        buf
    }

    fn make_reply(request: &[u8], code: u8, attrs: &[Attribute]) -> Vec<u8> {
        let mut buf = vec![0u8; DEFAULT_MAX_PACKET_SIZE];
        let mut req_auth = [0u8; AUTHENTICATOR_LEN];
        req_auth.copy_from_slice(&request[4..HEADER_LEN]);
        let len = encode(
            &mut buf,
            PacketCode::from_u8(code).unwrap(),
            request[1],
            &[0u8; AUTHENTICATOR_LEN],
            attrs,
        )
        .unwrap();
        buf.truncate(len);
        sign(&mut buf, Some(&req_auth), SECRET).unwrap();
        buf
    }

    fn original_of(request: &[u8], code: PacketCode) -> OriginalHeader {
        let mut auth = [0u8; AUTHENTICATOR_LEN];
        auth.copy_from_slice(&request[4..HEADER_LEN]);
        OriginalHeader {
            code,
            id: request[1],
            authenticator: auth,
        }
    }

    #[test]
    fn test_encode_header() {
        let attrs = [Attribute::text(attr::types::USER_NAME, "steve")];
        let pkt = encode_request(PacketCode::AccessRequest, 0x3c, &attrs);

        // code=1, id=0x3c, length = 20 + 7 = 0x001b
        assert_eq!(hex::encode(&pkt[..4]), "013c001b");
        assert_eq!(&pkt[HEADER_LEN..], &[1, 7, b's', b't', b'e', b'v', b'e']);
    }

    #[test]
    fn test_encode_attribute_too_long() {
        let mut buf = vec![0u8; DEFAULT_MAX_PACKET_SIZE];
        let attrs = [Attribute::new(1, vec![0u8; 254])];
        let err = encode(
            &mut buf,
            PacketCode::AccessRequest,
            0,
            &[0u8; AUTHENTICATOR_LEN],
            &attrs,
        )
        .unwrap_err();
        assert_eq!(err, EncodeError::AttributeTooLong { typ: 1, len: 254 });
    }

    #[test]
    fn test_encode_overflows_buffer() {
        let mut buf = vec![0u8; 64];
        let attrs = [
            Attribute::new(1, vec![0u8; 40]),
            Attribute::new(1, vec![0u8; 40]),
        ];
        let err = encode(
            &mut buf,
            PacketCode::AccessRequest,
            0,
            &[0u8; AUTHENTICATOR_LEN],
            &attrs,
        )
        .unwrap_err();
        assert_eq!(err, EncodeError::PacketTooLarge { max: 64 });
    }

    #[test]
    fn test_append_attr_adjusts_length() {
        let mut buf = vec![0u8; 128];
        let mut len = encode(
            &mut buf,
            PacketCode::AccessRequest,
            7,
            &[0u8; AUTHENTICATOR_LEN],
            &[],
        )
        .unwrap();
        append_attr(&mut buf, &mut len, attr::types::PROXY_STATE, &[1, 2, 3, 4]);

        assert_eq!(len, HEADER_LEN + 6);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]) as usize, len);
        assert_eq!(&buf[HEADER_LEN..len], &[33, 6, 1, 2, 3, 4]);
    }

    #[test]
    fn test_well_formed() {
        let pkt = encode_request(PacketCode::AccessRequest, 1, &[]);
        assert!(is_well_formed(&pkt));

        // Trailing padding beyond the header length is tolerated.
        let mut padded = pkt.clone();
        padded.extend_from_slice(&[0u8; 8]);
        assert!(is_well_formed(&padded));
    }

    #[test]
    fn test_malformed_rejected() {
        // Too short.
        assert!(!is_well_formed(&[0u8; 10]));

        // Zero code.
        let mut pkt = encode_request(PacketCode::AccessRequest, 1, &[]);
        pkt[0] = 0;
        assert!(!is_well_formed(&pkt));

        // Length field larger than the datagram.
        let mut pkt = encode_request(PacketCode::AccessRequest, 1, &[]);
        pkt[2..4].copy_from_slice(&100u16.to_be_bytes());
        assert!(!is_well_formed(&pkt));

        // Attribute walk runs past the end.
        let attrs = [Attribute::text(1, "steve")];
        let mut pkt = encode_request(PacketCode::AccessRequest, 1, &attrs);
        pkt[HEADER_LEN + 1] = 40;
        assert!(!is_well_formed(&pkt));

        // Attribute with length < 2.
        let mut pkt = encode_request(PacketCode::AccessRequest, 1, &attrs);
        pkt[HEADER_LEN + 1] = 1;
        assert!(!is_well_formed(&pkt));
    }

    #[test]
    fn test_accounting_sign_and_verify_reply() {
        let attrs = [Attribute::new(attr::types::ACCT_STATUS_TYPE, vec![0, 0, 0, 1])];
        let mut req = encode_request(PacketCode::AccountingRequest, 9, &attrs);
        sign(&mut req, None, SECRET).unwrap();
        // Accounting-Request authenticator is MD5(packet || secret), not zeros.
        assert_ne!(&req[4..HEADER_LEN], &[0u8; AUTHENTICATOR_LEN]);

        let original = original_of(&req, PacketCode::AccountingRequest);
        let reply = make_reply(&req, 5, &[]);
        assert!(verify(&reply, &original, SECRET).is_ok());
    }

    #[test]
    fn test_verify_detects_tampered_authenticator() {
        let mut req = encode_request(PacketCode::AccountingRequest, 9, &[]);
        sign(&mut req, None, SECRET).unwrap();
        let original = original_of(&req, PacketCode::AccountingRequest);

        let mut reply = make_reply(&req, 5, &[]);
        reply[4] ^= 0xff;
        assert_eq!(
            verify(&reply, &original, SECRET),
            Err(VerifyError::BadResponseAuthenticator)
        );
    }

    #[test]
    fn test_verify_detects_wrong_secret() {
        let mut req = encode_request(PacketCode::AccountingRequest, 9, &[]);
        sign(&mut req, None, SECRET).unwrap();
        let original = original_of(&req, PacketCode::AccountingRequest);

        let reply = make_reply(&req, 5, &[]);
        assert_eq!(
            verify(&reply, &original, b"wrong"),
            Err(VerifyError::BadResponseAuthenticator)
        );
    }

    #[test]
    fn test_message_authenticator_round_trip() {
        let attrs = [Attribute::text(attr::types::USER_NAME, "steve")];
        let mut req = encode_request(PacketCode::AccessRequest, 0x11, &attrs);
        let mut len = req.len();
        req.resize(len + MESSAGE_AUTH_LEN, 0);
        append_attr(
            &mut req,
            &mut len,
            attr::types::MESSAGE_AUTHENTICATOR,
            &[0u8; AUTHENTICATOR_LEN],
        );
        sign(&mut req, None, SECRET).unwrap();

        // The HMAC was filled in.
        let pos = attr::find_attr(&req, len, attr::types::MESSAGE_AUTHENTICATOR).unwrap();
        assert_ne!(&req[pos + 2..pos + 18], &[0u8; AUTHENTICATOR_LEN]);

        let original = original_of(&req, PacketCode::AccessRequest);
        let reply = make_reply(
            &req,
            2,
            &[Attribute::new(
                attr::types::MESSAGE_AUTHENTICATOR,
                vec![0u8; AUTHENTICATOR_LEN],
            )],
        );
        assert!(verify(&reply, &original, SECRET).is_ok());

        // Tampering with the reply's Message-Authenticator is detected.
        let mut bad = reply.clone();
        let pos = attr::find_attr(&bad, bad.len(), attr::types::MESSAGE_AUTHENTICATOR).unwrap();
        bad[pos + 2] ^= 0x01;
        assert_eq!(
            verify(&bad, &original, SECRET),
            Err(VerifyError::BadMessageAuthenticator)
        );
    }

    const MESSAGE_AUTH_LEN: usize = 18;
}
