use std::borrow::Cow;
use std::sync::Arc;

use quorum_types::{CiphertextBundle, PublicKeyShare, ShareSet, ThresholdParams};
use tracing::debug;

use crate::{Error, QuorumPolicy, Stage, ThresholdService};

/// Combines partial shares into the plaintext of a ciphertext.
pub struct Aggregator<S> {
    service: Arc<S>,
    quorum: QuorumPolicy,
}

impl<S> Clone for Aggregator<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            quorum: self.quorum,
        }
    }
}

impl<S: ThresholdService> Aggregator<S> {
    pub fn new(service: Arc<S>, quorum: QuorumPolicy) -> Self {
        Self { service, quorum }
    }

    pub async fn decrypt(
        &self,
        bundle: &CiphertextBundle,
        keys: &[PublicKeyShare],
        shares: &ShareSet,
        params: ThresholdParams,
    ) -> Result<Vec<u8>, Error> {
        if keys.len() != params.size() {
            return Err(Error::KeyCountMismatch {
                expected: params.size(),
                actual: keys.len(),
            });
        }
        if !shares.reaches(params.threshold()) {
            return Err(Error::InsufficientShares {
                required: params.threshold(),
                available: shares.len(),
            });
        }
        if shares.commitment() != bundle.commitment() {
            return Err(Error::CommitmentMismatch);
        }
        if let Some(id) = shares.participants().find(|id| !params.contains(*id)) {
            return Err(Error::UnknownParticipant(id));
        }
        let shares = match self.quorum {
            QuorumPolicy::AtLeast => Cow::Borrowed(shares),
            QuorumPolicy::Exact => Cow::Owned(shares.lowest(params.threshold())),
        };
        let plain = self
            .service
            .decrypt(bundle, keys, &shares, params)
            .await
            .map_err(|e| e.at(Stage::Decrypt, None))?;
        debug!(%params, shares = %shares.len(), commitment = %bundle.commitment(), "combined");
        Ok(plain)
    }
}
