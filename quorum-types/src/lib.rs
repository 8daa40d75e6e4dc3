mod ciphertext;
mod key;
mod participant;
mod share;

pub use ciphertext::{CiphertextBundle, Commitment};
pub use key::PublicKeyShare;
pub use participant::{InvalidParams, ParticipantId, ThresholdParams};
pub use share::{ForeignShare, PartialShare, ShareSet};
