use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a participant in a t-of-n committee.
///
/// Valid ids range over `0..n` and stay stable across every call of a round.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(u64);

impl ParticipantId {
    pub const fn new(i: u64) -> Self {
        Self(i)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u64> for ParticipantId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<usize> for ParticipantId {
    fn from(value: usize) -> Self {
        Self(value as u64)
    }
}

impl From<ParticipantId> for u64 {
    fn from(value: ParticipantId) -> Self {
        value.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The `(t, n)` pair of a threshold round with `1 <= t <= n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThresholdParams {
    threshold: usize,
    size: usize,
}

impl ThresholdParams {
    pub fn new(threshold: usize, size: usize) -> Result<Self, InvalidParams> {
        if threshold == 0 || threshold > size {
            return Err(InvalidParams { threshold, size });
        }
        Ok(Self { threshold, size })
    }

    /// Minimum number of partial shares needed to recover a plaintext.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of participants.
    pub fn size(&self) -> usize {
        self.size
    }

    /// How many participants may fail before the threshold becomes unreachable.
    pub fn fault_tolerance(&self) -> usize {
        self.size - self.threshold
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        id.index() < self.size
    }

    /// Iterate over all participant ids `0..n` in ascending order.
    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + use<> {
        (0..self.size as u64).map(ParticipantId::new)
    }
}

impl fmt::Display for ThresholdParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-of-{}", self.threshold, self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid threshold parameters: t = {threshold}, n = {size} (need 1 <= t <= n)")]
pub struct InvalidParams {
    pub threshold: usize,
    pub size: usize,
}
