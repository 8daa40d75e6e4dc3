use std::collections::BTreeMap;
use std::time::Duration;

use bon::Builder;
use bytes::Bytes;
use quorum_types::ParticipantId;
use url::Url;

#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Log label.
    #[builder(into, default = String::from("quorum"))]
    pub(crate) label: String,

    /// Base URL of the threshold encryption service.
    pub(crate) base_url: Url,

    /// Base URL of the service which encrypts, verifies shares and combines.
    ///
    /// Defaults to `base_url`.
    pub(crate) combiner_url: Option<Url>,

    /// Base URLs of individual participants.
    ///
    /// Public key and partial decryption requests for a participant go to
    /// its own URL if present, otherwise to `base_url`.
    #[builder(default)]
    pub(crate) participants: BTreeMap<ParticipantId, Url>,

    /// Secret key material passed through with key and share requests.
    #[builder(default)]
    pub(crate) secrets: BTreeMap<ParticipantId, Bytes>,

    /// Timeout of a single request.
    #[builder(default = Duration::from_secs(30))]
    pub(crate) timeout: Duration,
}

impl Config {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn combiner_url(&self) -> &Url {
        self.combiner_url.as_ref().unwrap_or(&self.base_url)
    }

    pub fn participant_url(&self, id: ParticipantId) -> &Url {
        self.participants.get(&id).unwrap_or(&self.base_url)
    }

    pub fn secret(&self, id: ParticipantId) -> Option<&Bytes> {
        self.secrets.get(&id)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
