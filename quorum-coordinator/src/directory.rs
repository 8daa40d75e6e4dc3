use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::{fs, io};

use futures::future::try_join_all;
use parking_lot::RwLock;
use quorum_types::{ParticipantId, PublicKeyShare};
use tracing::{debug, warn};

use crate::{Error, ServiceError, Stage, ThresholdService};

/// Public keys of a committee, indexed by participant id.
///
/// Keys are looked up locally first and fetched from the service on a miss.
/// Once bound, a key never changes for the lifetime of the directory.
pub struct KeyDirectory<S> {
    service: Arc<S>,
    size: usize,
    remote: bool,
    keys: RwLock<BTreeMap<ParticipantId, PublicKeyShare>>,
}

impl<S: ThresholdService> KeyDirectory<S> {
    pub fn new(service: Arc<S>, size: usize) -> Self {
        Self {
            service,
            size,
            remote: true,
            keys: RwLock::new(BTreeMap::new()),
        }
    }

    /// Preload keys. Ids outside of the committee are ignored.
    pub fn with_keys<I>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = (ParticipantId, PublicKeyShare)>,
    {
        for (id, k) in keys {
            self.insert(id, k);
        }
        self
    }

    /// Preload keys from `{id}-pk` files in `dir`. Missing files are skipped.
    pub fn with_key_dir<P: AsRef<Path>>(self, dir: P) -> io::Result<Self> {
        let dir = dir.as_ref();
        for id in (0..self.size as u64).map(ParticipantId::new) {
            let path = dir.join(format!("{id}-pk"));
            match fs::read(&path) {
                Ok(bytes) => {
                    self.insert(id, PublicKeyShare::from(bytes));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(participant = %id, path = %path.display(), "no key file")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self)
    }

    /// Whether keys missing locally may be fetched from the service.
    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    pub fn cached(&self, id: ParticipantId) -> Option<PublicKeyShare> {
        self.keys.read().get(&id).cloned()
    }

    /// Bind `key` to `id` unless a key is already bound.
    ///
    /// Returns the key bound to `id` afterwards.
    pub fn insert(&self, id: ParticipantId, key: PublicKeyShare) -> Option<PublicKeyShare> {
        if id.index() >= self.size {
            warn!(participant = %id, size = %self.size, "ignoring key outside of committee");
            return None;
        }
        let mut keys = self.keys.write();
        Some(keys.entry(id).or_insert(key).clone())
    }

    pub async fn get_public_key(&self, id: ParticipantId) -> Result<PublicKeyShare, Error> {
        if let Some(k) = self.cached(id) {
            return Ok(k);
        }
        if id.index() >= self.size || !self.remote {
            return Err(Error::KeyUnavailable(id));
        }
        match self.service.public_key(id, self.size).await {
            Ok(k) => {
                debug!(participant = %id, "public key fetched");
                self.insert(id, k).ok_or(Error::KeyUnavailable(id))
            }
            Err(ServiceError::Rejected(status)) => {
                warn!(participant = %id, %status, "service has no key");
                Err(Error::KeyUnavailable(id))
            }
            Err(e) => Err(e.at(Stage::KeyFetch, Some(id))),
        }
    }

    /// Keys of `ids`, in the order given.
    ///
    /// Missing keys are fetched concurrently. Fails if any id has no key.
    pub async fn get_public_keys<I>(&self, ids: I) -> Result<Vec<PublicKeyShare>, Error>
    where
        I: IntoIterator<Item = ParticipantId>,
    {
        try_join_all(ids.into_iter().map(|id| self.get_public_key(id))).await
    }

    /// Ask the service whether the key bound to `id` is valid.
    pub async fn validate(&self, id: ParticipantId) -> Result<(), Error> {
        let key = self.get_public_key(id).await?;
        match self.service.is_valid(&key, self.size).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::KeyInvalid(id)),
            Err(e) => Err(e.at(Stage::KeyValidation, Some(id))),
        }
    }
}
