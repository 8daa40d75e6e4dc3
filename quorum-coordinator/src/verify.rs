use std::sync::Arc;

use quorum_types::{Commitment, PartialShare, PublicKeyShare};
use tracing::warn;

use crate::{Error, Stage, ThresholdService};

/// Checks a partial share against its issuer's public key.
pub struct ShareVerifier<S> {
    service: Arc<S>,
}

impl<S> Clone for ShareVerifier<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

impl<S: ThresholdService> ShareVerifier<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// Succeeds only if the service accepts `share` for `key` and `commitment`.
    ///
    /// A share issued for another commitment is refused without asking the
    /// service.
    pub async fn verify(
        &self,
        key: &PublicKeyShare,
        commitment: &Commitment,
        share: &PartialShare,
    ) -> Result<(), Error> {
        let id = share.participant();
        if !share.is_for(commitment) {
            warn!(participant = %id, %commitment, "share for foreign commitment");
            return Err(Error::ShareInvalid(id));
        }
        match self.service.verify_share(key, commitment, share).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(participant = %id, %commitment, "share rejected by service");
                Err(Error::ShareInvalid(id))
            }
            Err(e) => Err(e.at(Stage::Verify, Some(id))),
        }
    }
}
