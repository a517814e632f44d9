//! RADIUS wire codec.
//!
//! - **Codes**: [`PacketCode`] plus the reply-classification tables
//! - **Attributes**: opaque [`Attribute`] pairs and raw-packet iteration
//! - **Codec**: encode, structural validation, signing, reply verification
//!
//! The transport treats packets as opaque beyond the code byte, the length
//! field, Proxy-State, and Message-Authenticator.

pub mod attr;
pub mod code;
pub mod codec;

pub use attr::{AttrIter, Attribute};
pub use code::{PacketCode, classify_reply};
pub use codec::{OriginalHeader, append_attr, encode, is_well_formed, sign, verify};
