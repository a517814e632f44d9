//! Host-facing async client (requires the `client` feature).

mod client;

pub use client::{ClientError, InFlight, RadiusClient};
