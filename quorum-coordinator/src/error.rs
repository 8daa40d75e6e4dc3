use std::error::Error as StdError;
use std::fmt;

use quorum_types::{InvalidParams, ParticipantId};

/// The step of a round a remote call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    KeyFetch,
    KeyValidation,
    Encrypt,
    PartialDecrypt,
    Verify,
    Decrypt,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::KeyFetch => "key fetch",
            Self::KeyValidation => "key validation",
            Self::Encrypt => "encrypt",
            Self::PartialDecrypt => "partial decrypt",
            Self::Verify => "share verification",
            Self::Decrypt => "decrypt",
        };
        f.write_str(s)
    }
}

/// Failure of a single exchange with the threshold service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Network or serialisation fault.
    #[error("transport failure: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),

    /// The service answered a well-formed request with a non-success status.
    #[error("service rejected request with status {0}")]
    Rejected(u16),
}

impl ServiceError {
    pub fn transport<E>(e: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Transport(Box::new(e))
    }

    /// Attach the round stage and participant the failed call was made for.
    pub(crate) fn at(self, stage: Stage, participant: Option<ParticipantId>) -> Error {
        match self {
            Self::Transport(source) => Error::Transport {
                stage,
                participant,
                source,
            },
            Self::Rejected(status) => Error::Rejected {
                stage,
                participant,
                status,
            },
        }
    }
}

impl From<quorum_client::Error> for ServiceError {
    fn from(e: quorum_client::Error) -> Self {
        match e.status() {
            Some(s) => Self::Rejected(s.as_u16()),
            None => Self::transport(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Params(#[from] InvalidParams),

    #[error("no public key available for participant {0}")]
    KeyUnavailable(ParticipantId),

    #[error("public key of participant {0} was refused by the service")]
    KeyInvalid(ParticipantId),

    #[error("expected {expected} public keys, got {actual}")]
    KeyCountMismatch { expected: usize, actual: usize },

    #[error("participant {0} is not part of the committee")]
    UnknownParticipant(ParticipantId),

    #[error("{stage} failed{}: {source}", for_participant(.participant))]
    Transport {
        stage: Stage,
        participant: Option<ParticipantId>,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{stage} rejected{} with status {status}", for_participant(.participant))]
    Rejected {
        stage: Stage,
        participant: Option<ParticipantId>,
        status: u16,
    },

    #[error("invalid share from participant {0}")]
    ShareInvalid(ParticipantId),

    #[error("shares were collected for a different ciphertext")]
    CommitmentMismatch,

    #[error("insufficient shares: required {required}, available {available}")]
    InsufficientShares { required: usize, available: usize },

    #[error("recovered plaintext does not match the expected value")]
    IntegrityMismatch,

    #[error("round is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: crate::RoundState,
        actual: crate::RoundState,
    },
}

impl Error {
    /// The participant this error is attributable to, if any.
    pub fn participant(&self) -> Option<ParticipantId> {
        match self {
            Self::KeyUnavailable(p)
            | Self::KeyInvalid(p)
            | Self::UnknownParticipant(p)
            | Self::ShareInvalid(p) => Some(*p),
            Self::Transport { participant, .. } | Self::Rejected { participant, .. } => {
                *participant
            }
            _ => None,
        }
    }

    /// The stage of a failed remote call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Transport { stage, .. } | Self::Rejected { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

fn for_participant(p: &Option<ParticipantId>) -> String {
    p.map(|p| format!(" for participant {p}")).unwrap_or_default()
}
