//! Consensus for the POHA chain.
//!
//! Block production is an AND gate:
//! - **Proof-of-Authority**: the producer must be in the [`ValidatorSet`] and
//!   it must be its turn in the round-robin leader schedule.
//! - **Proof-of-Humanity**: the producer must hold a current human
//!   verification, whose token it stamps on every block it seals.
//!
//! ## Module overview
//!
//! - [`validator_set`]: ordered validator membership and leader schedule.
//! - [`authority`]: the PoA engine (registration, mining loop, block checks).
//! - [`verifier`]: where human proofs are checked (registry or gateway).
//! - [`hybrid`]: the registration state machine tying the two together.
//! - [`error`]: consensus error types.

pub mod authority;
pub mod error;
pub mod hybrid;
pub mod validator_set;
pub mod verifier;

pub use authority::{AuthorityConfig, AuthorityConsensus};
pub use error::ConsensusError;
pub use hybrid::{HybridConsensus, RegistrationState};
pub use validator_set::ValidatorSet;
pub use verifier::HumanityVerifier;
