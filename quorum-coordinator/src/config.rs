use std::time::Duration;

use bon::Builder;
use quorum_types::{ParticipantId, ThresholdParams};
use serde::{Deserialize, Serialize};

/// How many of the collected shares are handed to the combiner.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuorumPolicy {
    /// Every admitted share.
    #[default]
    AtLeast,
    /// Exactly `t` shares, those of the lowest participant ids.
    Exact,
}

/// What a round does when a share fails verification.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidSharePolicy {
    /// Fail the round.
    #[default]
    Abort,
    /// Record the fault and wait for shares from other participants.
    Substitute,
}

#[derive(Debug, Clone, Builder)]
pub struct RoundConfig {
    /// Label used in logs.
    #[builder(into, default = String::from("coordinator"))]
    pub(crate) label: String,

    pub(crate) params: ThresholdParams,

    /// Verify every share before it counts towards the threshold.
    #[builder(default = true)]
    pub(crate) verify: bool,

    /// Ask the service to validate every key before encrypting.
    #[builder(default)]
    pub(crate) validate_keys: bool,

    #[builder(default)]
    pub(crate) quorum: QuorumPolicy,

    #[builder(default)]
    pub(crate) on_invalid_share: InvalidSharePolicy,

    /// Participants asked for shares. Defaults to the whole committee.
    pub(crate) candidates: Option<Vec<ParticipantId>>,

    /// Upper bound on the time spent collecting shares.
    pub(crate) collect_timeout: Option<Duration>,
}

impl RoundConfig {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn params(&self) -> ThresholdParams {
        self.params
    }

    pub fn verify(&self) -> bool {
        self.verify
    }

    pub fn validate_keys(&self) -> bool {
        self.validate_keys
    }

    pub fn quorum(&self) -> QuorumPolicy {
        self.quorum
    }

    pub fn on_invalid_share(&self) -> InvalidSharePolicy {
        self.on_invalid_share
    }

    pub fn candidates(&self) -> Option<&[ParticipantId]> {
        self.candidates.as_deref()
    }

    pub fn collect_timeout(&self) -> Option<Duration> {
        self.collect_timeout
    }
}
