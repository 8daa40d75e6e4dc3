use std::sync::Arc;

use quorum_types::{Commitment, ParticipantId, PartialShare, ThresholdParams};
use tracing::trace;

use crate::{Error, Stage, ThresholdService};

/// Asks individual participants for their partial decryptions.
pub struct ShareRequestor<S> {
    service: Arc<S>,
    params: ThresholdParams,
}

impl<S> Clone for ShareRequestor<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            params: self.params,
        }
    }
}

impl<S: ThresholdService> ShareRequestor<S> {
    pub fn new(service: Arc<S>, params: ThresholdParams) -> Self {
        Self { service, params }
    }

    pub async fn request_partial_share(
        &self,
        id: ParticipantId,
        commitment: &Commitment,
    ) -> Result<PartialShare, Error> {
        if !self.params.contains(id) {
            return Err(Error::UnknownParticipant(id));
        }
        let share = self
            .service
            .partial_decrypt(id, commitment)
            .await
            .map_err(|e| e.at(Stage::PartialDecrypt, Some(id)))?;
        if share.participant() != id || !share.is_for(commitment) {
            return Err(Error::ShareInvalid(id));
        }
        trace!(participant = %id, %commitment, "received partial share");
        Ok(share)
    }
}
