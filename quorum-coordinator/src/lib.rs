//! Coordination of t-of-n threshold decryption rounds.
//!
//! A round gathers the participants' public keys, has a message encrypted
//! under them, collects at least `t` partial decryption shares (verifying
//! each one before it counts), and finally has the shares combined into
//! the recovered plaintext. All cryptography happens behind the
//! [`ThresholdService`] seam.

mod aggregate;
mod config;
mod directory;
mod encrypt;
mod error;
mod partial;
mod round;
mod service;
mod verify;

pub use aggregate::Aggregator;
pub use config::{InvalidSharePolicy, QuorumPolicy, RoundConfig, RoundConfigBuilder};
pub use directory::KeyDirectory;
pub use encrypt::Encryptor;
pub use error::{Error, ServiceError, Stage};
pub use partial::ShareRequestor;
pub use round::{Coordinator, Fault, Round, RoundFailure, RoundId, RoundReport, RoundState};
pub use service::ThresholdService;
pub use verify::ShareVerifier;

pub use quorum_types as types;
