//! Proof-of-Humanity for POHA validators.
//!
//! A validator may only produce blocks while it holds a non-expired human
//! verification. Verifications are tracked by a [`HumanityRegistry`] inside
//! the node, or delegated to an external service through a
//! [`HumanityGateway`]:
//!
//! - [`SimulatorGateway`]: a local HTTP service backed by its own registry,
//!   for development networks
//! - [`RemoteGateway`]: HTTP client for a real verification service speaking
//!   the same protocol

pub mod error;
pub mod gateway;
pub mod protocol;
pub mod record;
pub mod registry;
pub mod remote;
pub mod simulator;

pub use error::HumanityError;
pub use gateway::HumanityGateway;
pub use record::{HumanVerificationRecord, TokenStatus, VerificationStatus};
pub use registry::{HumanityRegistry, RegistryConfig};
pub use remote::RemoteGateway;
pub use simulator::SimulatorGateway;
