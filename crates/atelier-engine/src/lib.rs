//! Stability REST client and the interactive generation session built on it.

pub mod codec;
pub mod config;
pub mod endpoints;
pub mod wire;

mod client;
mod dryrun;
mod error;
mod session;
mod transport;

pub use client::{ImageGenerator, StabilityClient};
pub use config::ClientConfig;
pub use dryrun::{DryrunTransport, DRYRUN_DIMENSION};
pub use endpoints::endpoint_for;
pub use error::{GenerationError, MalformedResponse, SessionError};
pub use session::{GenerationOutcome, GenerationSession};
pub use transport::{HttpTransport, Transport, DEFAULT_REQUEST_TIMEOUT};
