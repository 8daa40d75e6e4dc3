use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::{Commitment, ParticipantId};

/// One participant's partial decryption of one commitment.
#[derive(Clone, PartialEq, Eq)]
pub struct PartialShare {
    participant: ParticipantId,
    commitment: Commitment,
    bytes: Bytes,
}

impl PartialShare {
    pub fn new<B: Into<Bytes>>(participant: ParticipantId, commitment: Commitment, b: B) -> Self {
        Self {
            participant,
            commitment,
            bytes: b.into(),
        }
    }

    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// The commitment this share was requested for.
    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_for(&self, c: &Commitment) -> bool {
        &self.commitment == c
    }
}

impl fmt::Debug for PartialShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialShare")
            .field("participant", &self.participant)
            .field("commitment", &self.commitment)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Partial shares of a single commitment, at most one per participant.
#[derive(Debug, Clone)]
pub struct ShareSet {
    commitment: Commitment,
    shares: BTreeMap<ParticipantId, PartialShare>,
}

impl ShareSet {
    pub fn new(commitment: Commitment) -> Self {
        Self {
            commitment,
            shares: BTreeMap::new(),
        }
    }

    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    /// Insert a share unless its participant already contributed one.
    ///
    /// Returns `Ok(true)` if the share was added and `Ok(false)` if the
    /// participant was already present, in which case the set is unchanged.
    /// Shares issued for another commitment are refused.
    pub fn admit(&mut self, share: PartialShare) -> Result<bool, ForeignShare> {
        if !share.is_for(&self.commitment) {
            return Err(ForeignShare {
                participant: share.participant,
            });
        }
        if self.shares.contains_key(&share.participant) {
            return Ok(false);
        }
        self.shares.insert(share.participant, share);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Does this set hold at least `t` shares?
    pub fn reaches(&self, t: usize) -> bool {
        self.shares.len() >= t
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.shares.contains_key(&id)
    }

    pub fn get(&self, id: ParticipantId) -> Option<&PartialShare> {
        self.shares.get(&id)
    }

    /// Participants with an admitted share, in ascending order.
    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.shares.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticipantId, &PartialShare)> {
        self.shares.iter().map(|(i, s)| (*i, s))
    }

    /// A copy restricted to the `k` lowest participant ids.
    pub fn lowest(&self, k: usize) -> Self {
        Self {
            commitment: self.commitment.clone(),
            shares: self
                .shares
                .iter()
                .take(k)
                .map(|(i, s)| (*i, s.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("share of participant {participant} was issued for a different commitment")]
pub struct ForeignShare {
    pub participant: ParticipantId,
}
