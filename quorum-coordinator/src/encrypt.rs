use std::sync::Arc;

use quorum_types::{CiphertextBundle, PublicKeyShare, ThresholdParams};
use tracing::debug;

use crate::{Error, Stage, ThresholdService};

/// Has messages encrypted under the committee's keys.
pub struct Encryptor<S> {
    service: Arc<S>,
}

impl<S> Clone for Encryptor<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

impl<S: ThresholdService> Encryptor<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// Encrypt `msg` so that any `t` of the `n` key holders can decrypt it.
    ///
    /// `keys` must hold exactly one key per participant, in id order.
    pub async fn encrypt(
        &self,
        msg: &[u8],
        keys: &[PublicKeyShare],
        params: ThresholdParams,
    ) -> Result<CiphertextBundle, Error> {
        if keys.len() != params.size() {
            return Err(Error::KeyCountMismatch {
                expected: params.size(),
                actual: keys.len(),
            });
        }
        let bundle = self
            .service
            .encrypt(msg, keys, params)
            .await
            .map_err(|e| e.at(Stage::Encrypt, None))?;
        debug!(%params, commitment = %bundle.commitment(), len = %msg.len(), "encrypted");
        Ok(bundle)
    }
}
