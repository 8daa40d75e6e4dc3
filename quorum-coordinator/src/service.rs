use async_trait::async_trait;
use quorum_client::Client;
use quorum_types::{
    CiphertextBundle, Commitment, ParticipantId, PartialShare, PublicKeyShare, ShareSet,
    ThresholdParams,
};

use crate::ServiceError;

/// The threshold-cryptography engine a coordinator talks to.
///
/// Every operation may fail with a transport fault or a service rejection.
/// Implementations must not retain state across calls that would change the
/// outcome of later calls, except for the keys each participant holds.
#[async_trait]
pub trait ThresholdService: Send + Sync {
    /// Public key of participant `id` in a committee of size `n`.
    async fn public_key(&self, id: ParticipantId, n: usize)
    -> Result<PublicKeyShare, ServiceError>;

    /// Is `key` acceptable in a committee of size `n`?
    async fn is_valid(&self, key: &PublicKeyShare, n: usize) -> Result<bool, ServiceError>;

    async fn encrypt(
        &self,
        msg: &[u8],
        keys: &[PublicKeyShare],
        params: ThresholdParams,
    ) -> Result<CiphertextBundle, ServiceError>;

    /// Partial decryption of `commitment` by participant `id`.
    async fn partial_decrypt(
        &self,
        id: ParticipantId,
        commitment: &Commitment,
    ) -> Result<PartialShare, ServiceError>;

    /// `Ok(false)` means the share does not belong to `key` and `commitment`.
    async fn verify_share(
        &self,
        key: &PublicKeyShare,
        commitment: &Commitment,
        share: &PartialShare,
    ) -> Result<bool, ServiceError>;

    async fn decrypt(
        &self,
        bundle: &CiphertextBundle,
        keys: &[PublicKeyShare],
        shares: &ShareSet,
        params: ThresholdParams,
    ) -> Result<Vec<u8>, ServiceError>;
}

#[async_trait]
impl ThresholdService for Client {
    async fn public_key(
        &self,
        id: ParticipantId,
        n: usize,
    ) -> Result<PublicKeyShare, ServiceError> {
        Ok(Client::public_key(self, id, n).await?)
    }

    async fn is_valid(&self, key: &PublicKeyShare, n: usize) -> Result<bool, ServiceError> {
        Ok(Client::is_valid(self, key, n).await?)
    }

    async fn encrypt(
        &self,
        msg: &[u8],
        keys: &[PublicKeyShare],
        params: ThresholdParams,
    ) -> Result<CiphertextBundle, ServiceError> {
        Ok(Client::encrypt(self, msg, keys, params.threshold(), params.size()).await?)
    }

    async fn partial_decrypt(
        &self,
        id: ParticipantId,
        commitment: &Commitment,
    ) -> Result<PartialShare, ServiceError> {
        Ok(Client::partial_decrypt(self, id, commitment).await?)
    }

    async fn verify_share(
        &self,
        key: &PublicKeyShare,
        commitment: &Commitment,
        share: &PartialShare,
    ) -> Result<bool, ServiceError> {
        Ok(Client::verify_share(self, key, commitment, share).await?)
    }

    async fn decrypt(
        &self,
        bundle: &CiphertextBundle,
        keys: &[PublicKeyShare],
        shares: &ShareSet,
        params: ThresholdParams,
    ) -> Result<Vec<u8>, ServiceError> {
        Ok(Client::decrypt(self, bundle, keys, shares, params.threshold(), params.size()).await?)
    }
}
