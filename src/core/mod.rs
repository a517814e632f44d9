//! Core constants, error types, configuration, and host-facing types.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{RetryPolicy, RetrySchedule, Secret, TransportConfig, TransportConfigBuilder};
pub use error::{ConfigError, EncodeError, SignError, TrackError, VerifyError};
pub use types::{Completion, Outcome, SubmitOutcome, TxnId};
