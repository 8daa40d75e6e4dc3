//! An in-process threshold service for tests.
//!
//! The "cryptography" is keyed blake3 hashing. The engine knows every
//! participant's secret, so combining only checks that enough correct
//! shares are present. This is good enough to exercise coordination logic
//! and nothing else.

mod server;

use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use blake3::Hasher;
use quorum_coordinator::{ServiceError, ThresholdService};
use quorum_types::{
    CiphertextBundle, Commitment, ParticipantId, PartialShare, PublicKeyShare, ShareSet,
    ThresholdParams,
};

pub use server::MockServer;

/// Status code used for refusals, mirroring the real service.
pub const REJECTED: u16 = 451;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MockError {
    #[error("unknown participant {0}")]
    UnknownParticipant(ParticipantId),

    #[error("invalid threshold parameters")]
    InvalidParams,

    #[error("public key does not belong to the committee")]
    InvalidKey,

    #[error("secret key missing or malformed")]
    InvalidSecret,

    #[error("shares do not decrypt the ciphertext")]
    Undecryptable,

    #[error("participant {0} is offline")]
    Offline(ParticipantId),
}

impl MockError {
    pub fn status(&self) -> u16 {
        match self {
            Self::UnknownParticipant(_) => 404,
            Self::InvalidParams | Self::InvalidKey | Self::InvalidSecret => 400,
            Self::Undecryptable => REJECTED,
            Self::Offline(_) => 503,
        }
    }
}

impl From<MockError> for ServiceError {
    fn from(e: MockError) -> Self {
        match e {
            MockError::Offline(_) => {
                ServiceError::transport(io::Error::new(io::ErrorKind::ConnectionRefused, e))
            }
            e => ServiceError::Rejected(e.status()),
        }
    }
}

/// How often each operation was invoked.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub public_key: usize,
    pub is_valid: usize,
    pub encrypt: usize,
    pub partial_decrypt: usize,
    pub verify_share: usize,
    pub decrypt: usize,
}

#[derive(Debug, Default)]
struct Counters {
    public_key: AtomicUsize,
    is_valid: AtomicUsize,
    encrypt: AtomicUsize,
    partial_decrypt: AtomicUsize,
    verify_share: AtomicUsize,
    decrypt: AtomicUsize,
}

fn bump(c: &AtomicUsize) {
    c.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug)]
pub struct MockEngine {
    seed: [u8; 32],
    size: usize,
    /// Participants producing corrupt shares.
    faulty: BTreeSet<ParticipantId>,
    /// Participants that never answer share requests.
    silent: BTreeSet<ParticipantId>,
    /// Participants that cannot be reached.
    offline: BTreeSet<ParticipantId>,
    counters: Counters,
}

impl MockEngine {
    pub fn new(size: usize) -> Self {
        Self::with_seed([0; 32], size)
    }

    pub fn with_seed(seed: [u8; 32], size: usize) -> Self {
        Self {
            seed,
            size,
            faulty: BTreeSet::new(),
            silent: BTreeSet::new(),
            offline: BTreeSet::new(),
            counters: Counters::default(),
        }
    }

    pub fn with_faulty<I: IntoIterator<Item = ParticipantId>>(mut self, ids: I) -> Self {
        self.faulty.extend(ids);
        self
    }

    pub fn with_silent<I: IntoIterator<Item = ParticipantId>>(mut self, ids: I) -> Self {
        self.silent.extend(ids);
        self
    }

    pub fn with_offline<I: IntoIterator<Item = ParticipantId>>(mut self, ids: I) -> Self {
        self.offline.extend(ids);
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_silent(&self, id: ParticipantId) -> bool {
        self.silent.contains(&id)
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            public_key: c.public_key.load(Ordering::Relaxed),
            is_valid: c.is_valid.load(Ordering::Relaxed),
            encrypt: c.encrypt.load(Ordering::Relaxed),
            partial_decrypt: c.partial_decrypt.load(Ordering::Relaxed),
            verify_share: c.verify_share.load(Ordering::Relaxed),
            decrypt: c.decrypt.load(Ordering::Relaxed),
        }
    }

    pub fn secret_key(&self, id: ParticipantId) -> Option<[u8; 32]> {
        if id.index() >= self.size {
            return None;
        }
        let mut h = Hasher::new();
        h.update(&self.seed);
        h.update(b"secret");
        h.update(&u64::from(id).to_le_bytes());
        Some(*h.finalize().as_bytes())
    }

    pub fn public_key(&self, id: ParticipantId, n: usize) -> Result<PublicKeyShare, MockError> {
        bump(&self.counters.public_key);
        if id.index() >= n {
            return Err(MockError::UnknownParticipant(id));
        }
        let sk = self
            .secret_key(id)
            .ok_or(MockError::UnknownParticipant(id))?;
        Ok(PublicKeyShare::from(public_of(&sk).to_vec()))
    }

    /// Public key derived from caller supplied secret key material.
    pub fn public_key_of(&self, sk: &[u8]) -> Result<PublicKeyShare, MockError> {
        bump(&self.counters.public_key);
        let sk: [u8; 32] = sk.try_into().map_err(|_| MockError::InvalidSecret)?;
        Ok(PublicKeyShare::from(public_of(&sk).to_vec()))
    }

    pub fn is_valid(&self, key: &[u8], n: usize) -> bool {
        bump(&self.counters.is_valid);
        self.owner(key, n).is_some()
    }

    pub fn encrypt(
        &self,
        msg: &[u8],
        keys: &[PublicKeyShare],
        t: usize,
        n: usize,
    ) -> Result<CiphertextBundle, MockError> {
        bump(&self.counters.encrypt);
        self.check_keys(keys, t, n)?;
        let gamma: [u8; 32] = rand::random();
        let iv: [u8; 16] = rand::random();
        let key = self.data_key(&gamma);
        Ok(CiphertextBundle::new(
            keystream_xor(&key, &iv, msg),
            Commitment::new(gamma.to_vec()),
            params_tag(&key, t, n).to_vec(),
            message_tag(&key, msg).to_vec(),
            iv.to_vec(),
        ))
    }

    pub fn partial_decrypt(
        &self,
        id: ParticipantId,
        commitment: &Commitment,
    ) -> Result<PartialShare, MockError> {
        bump(&self.counters.partial_decrypt);
        if self.offline.contains(&id) {
            return Err(MockError::Offline(id));
        }
        let sk = self
            .secret_key(id)
            .ok_or(MockError::UnknownParticipant(id))?;
        let mut share = share_of(&sk, commitment.as_bytes());
        if self.faulty.contains(&id) {
            share[0] ^= 0xff
        }
        Ok(PartialShare::new(id, commitment.clone(), share.to_vec()))
    }

    /// Partial decryption with caller supplied secret key material.
    pub fn partial_decrypt_with(&self, sk: &[u8], gamma: &[u8]) -> Result<Vec<u8>, MockError> {
        bump(&self.counters.partial_decrypt);
        let sk: [u8; 32] = sk.try_into().map_err(|_| MockError::InvalidSecret)?;
        Ok(share_of(&sk, gamma).to_vec())
    }

    pub fn verify_share(&self, key: &[u8], gamma: &[u8], share: &[u8]) -> bool {
        bump(&self.counters.verify_share);
        let Some(sk) = self.owner(key, self.size).and_then(|id| self.secret_key(id)) else {
            return false;
        };
        share == share_of(&sk, gamma).as_slice()
    }

    pub fn decrypt<'a, I>(
        &self,
        bundle: &CiphertextBundle,
        keys: &[PublicKeyShare],
        parts: I,
        t: usize,
        n: usize,
    ) -> Result<Vec<u8>, MockError>
    where
        I: IntoIterator<Item = (ParticipantId, &'a [u8])>,
    {
        bump(&self.counters.decrypt);
        self.check_keys(keys, t, n)?;
        let gamma = bundle.commitment().as_bytes();
        let mut count = 0;
        for (id, share) in parts {
            let sk = self
                .secret_key(id)
                .filter(|_| id.index() < n)
                .ok_or(MockError::Undecryptable)?;
            if share != share_of(&sk, gamma).as_slice() {
                return Err(MockError::Undecryptable);
            }
            count += 1
        }
        if count < t {
            return Err(MockError::Undecryptable);
        }
        let key = self.data_key(gamma);
        if bundle.sa1()[..] != params_tag(&key, t, n) {
            return Err(MockError::Undecryptable);
        }
        let msg = keystream_xor(&key, bundle.iv(), bundle.payload());
        if bundle.sa2()[..] != message_tag(&key, &msg) {
            return Err(MockError::Undecryptable);
        }
        Ok(msg)
    }

    fn owner(&self, key: &[u8], n: usize) -> Option<ParticipantId> {
        (0..n.min(self.size) as u64)
            .map(ParticipantId::new)
            .find(|id| {
                self.secret_key(*id)
                    .is_some_and(|sk| public_of(&sk).as_slice() == key)
            })
    }

    fn check_keys(&self, keys: &[PublicKeyShare], t: usize, n: usize) -> Result<(), MockError> {
        if t == 0 || t > n || n > self.size || keys.len() != n {
            return Err(MockError::InvalidParams);
        }
        for (i, k) in keys.iter().enumerate() {
            let sk = self
                .secret_key(ParticipantId::from(i))
                .ok_or(MockError::InvalidKey)?;
            if k.as_bytes() != public_of(&sk).as_slice() {
                return Err(MockError::InvalidKey);
            }
        }
        Ok(())
    }

    fn data_key(&self, gamma: &[u8]) -> [u8; 32] {
        let mut h = Hasher::new();
        h.update(&self.seed);
        h.update(b"master");
        let master = *h.finalize().as_bytes();
        *blake3::keyed_hash(&master, gamma).as_bytes()
    }
}

fn public_of(sk: &[u8; 32]) -> [u8; 32] {
    *blake3::keyed_hash(sk, b"public").as_bytes()
}

fn share_of(sk: &[u8; 32], gamma: &[u8]) -> [u8; 32] {
    *blake3::keyed_hash(sk, gamma).as_bytes()
}

fn params_tag(key: &[u8; 32], t: usize, n: usize) -> [u8; 32] {
    let mut h = Hasher::new_keyed(key);
    h.update(b"params");
    h.update(&(t as u64).to_le_bytes());
    h.update(&(n as u64).to_le_bytes());
    *h.finalize().as_bytes()
}

fn message_tag(key: &[u8; 32], msg: &[u8]) -> [u8; 32] {
    let mut h = Hasher::new_keyed(key);
    h.update(b"message");
    h.update(msg);
    *h.finalize().as_bytes()
}

fn keystream_xor(key: &[u8; 32], iv: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = vec![0; data.len()];
    let mut h = Hasher::new_keyed(key);
    h.update(b"stream");
    h.update(iv);
    h.finalize_xof().fill(&mut out);
    for (o, d) in out.iter_mut().zip(data) {
        *o ^= d
    }
    out
}

#[async_trait]
impl ThresholdService for MockEngine {
    async fn public_key(
        &self,
        id: ParticipantId,
        n: usize,
    ) -> Result<PublicKeyShare, ServiceError> {
        Ok(MockEngine::public_key(self, id, n)?)
    }

    async fn is_valid(&self, key: &PublicKeyShare, n: usize) -> Result<bool, ServiceError> {
        Ok(MockEngine::is_valid(self, key.as_bytes(), n))
    }

    async fn encrypt(
        &self,
        msg: &[u8],
        keys: &[PublicKeyShare],
        params: ThresholdParams,
    ) -> Result<CiphertextBundle, ServiceError> {
        Ok(MockEngine::encrypt(
            self,
            msg,
            keys,
            params.threshold(),
            params.size(),
        )?)
    }

    async fn partial_decrypt(
        &self,
        id: ParticipantId,
        commitment: &Commitment,
    ) -> Result<PartialShare, ServiceError> {
        if self.is_silent(id) {
            std::future::pending::<()>().await
        }
        Ok(MockEngine::partial_decrypt(self, id, commitment)?)
    }

    async fn verify_share(
        &self,
        key: &PublicKeyShare,
        commitment: &Commitment,
        share: &PartialShare,
    ) -> Result<bool, ServiceError> {
        Ok(MockEngine::verify_share(
            self,
            key.as_bytes(),
            commitment.as_bytes(),
            share.as_bytes(),
        ))
    }

    async fn decrypt(
        &self,
        bundle: &CiphertextBundle,
        keys: &[PublicKeyShare],
        shares: &ShareSet,
        params: ThresholdParams,
    ) -> Result<Vec<u8>, ServiceError> {
        let parts = shares.iter().map(|(i, s)| (i, s.as_bytes()));
        Ok(MockEngine::decrypt(
            self,
            bundle,
            keys,
            parts,
            params.threshold(),
            params.size(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use quorum_types::{ParticipantId, ShareSet};

    use super::{MockEngine, MockError};

    #[test]
    fn any_threshold_subset_decrypts() {
        let e = MockEngine::new(4);
        let keys = (0..4u64)
            .map(|i| e.public_key(ParticipantId::new(i), 4).unwrap())
            .collect::<Vec<_>>();
        let b = e.encrypt(b"hello", &keys, 2, 4).unwrap();

        let mut set = ShareSet::new(b.commitment().clone());
        for i in [3u64, 1] {
            let s = e.partial_decrypt(ParticipantId::new(i), b.commitment()).unwrap();
            assert!(e.verify_share(keys[i as usize].as_bytes(), b.commitment().as_bytes(), s.as_bytes()));
            set.admit(s).unwrap();
        }
        let parts = set.iter().map(|(i, s)| (i, s.as_bytes()));
        assert_eq!(e.decrypt(&b, &keys, parts, 2, 4).unwrap(), b"hello");

        let one = set.lowest(1);
        let parts = one.iter().map(|(i, s)| (i, s.as_bytes()));
        assert_eq!(e.decrypt(&b, &keys, parts, 2, 4), Err(MockError::Undecryptable));
    }

    #[test]
    fn faulty_shares_fail_verification() {
        let p = ParticipantId::new(1);
        let e = MockEngine::new(2).with_faulty([p]);
        let k = e.public_key(p, 2).unwrap();
        let keys = [e.public_key(ParticipantId::new(0), 2).unwrap(), k.clone()];
        let b = e.encrypt(b"x", &keys, 1, 2).unwrap();
        let s = e.partial_decrypt(p, b.commitment()).unwrap();
        assert!(!e.verify_share(k.as_bytes(), b.commitment().as_bytes(), s.as_bytes()));
        assert!(e.is_valid(k.as_bytes(), 2));
        assert!(!e.is_valid(b"nope", 2));
    }
}
