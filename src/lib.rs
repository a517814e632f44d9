//! # radrelay
//!
//! A client-side RADIUS UDP transport. It sends authentication and
//! accounting requests to one home server, matches replies to outstanding
//! requests by wire identifier, retransmits on timeout, and multiplexes
//! many concurrently in-flight transactions over a small pool of connected
//! sockets.
//!
//! - **Connection pool**: each connection carries up to 256 in-flight
//!   requests (the protocol's identifier space); capacity exhaustion opens
//!   another connection, idle connections tear themselves down
//! - **Selection policy**: new work prefers the connection that has gone
//!   longest without a confirmed reply, surfacing unhealthy links
//! - **Integrity**: response authenticators and Message-Authenticator
//!   attributes are verified against the original request before a reply is
//!   accepted
//! - **Sans-I/O core**: the transport is an event-driven state machine;
//!   socket and timer access stay behind small traits, so the whole core is
//!   testable with scripted I/O
//!
//! ## Feature Flags
//!
//! - `client` (default): tokio driver and the [`RadiusClient`] async API
//!
//! ## Modules
//!
//! - [`core`]: constants, errors, configuration, host-facing types
//! - [`packet`]: wire codec (encode, validate, sign, verify)
//! - [`transport`]: dispatcher, connections, ID tracking, event model
//! - [`client`]: tokio driver (requires the `client` feature)
//!
//! ## Example
//!
//! ```no_run
//! use radrelay::client::RadiusClient;
//! use radrelay::core::TransportConfig;
//! use radrelay::packet::{attr, Attribute, PacketCode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TransportConfig::builder("192.0.2.1:1812".parse()?)
//!     .secret("s3cr3t")
//!     .build()?;
//!
//! let client = RadiusClient::connect(config);
//! let outcome = client
//!     .submit(
//!         PacketCode::AccessRequest,
//!         vec![Attribute::text(attr::types::USER_NAME, "steve")],
//!     )
//!     .outcome()
//!     .await?;
//! println!("outcome: {outcome}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod packet;
pub mod transport;

// Tokio driver (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        Completion, Outcome, RetryPolicy, Secret, SubmitOutcome, TransportConfig, TxnId,
    };
    pub use crate::packet::{Attribute, PacketCode};
    pub use crate::transport::{ConnId, Dispatcher, Effect, Event, PacketIo, Request};

    #[cfg(feature = "client")]
    pub use crate::client::{ClientError, InFlight, RadiusClient};
}

// Re-export commonly used items at crate root
pub use crate::core::{Outcome, RetryPolicy, TransportConfig, TxnId};
pub use crate::packet::{Attribute, PacketCode};

#[cfg(feature = "client")]
pub use crate::client::RadiusClient;
