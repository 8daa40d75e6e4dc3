use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fmt, fs};

use anyhow::{Context, Result, bail};
use quorum_client::Config as ClientConfig;
use quorum_coordinator::{InvalidSharePolicy, QuorumPolicy, RoundConfig};
use quorum_types::{InvalidParams, ParticipantId, PublicKeyShare, ThresholdParams};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Bs58Bytes;

/// Configuration of a coordinator and the committee it works with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub threshold: usize,
    pub size: usize,
    pub service: ServiceConfig,
    #[serde(default)]
    pub round: RoundSection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<ParticipantConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub url: Url,
    /// Where encryption, share verification and combination requests go.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combiner: Option<Url>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSection {
    #[serde(default = "default_verify")]
    pub verify: bool,
    #[serde(default)]
    pub validate_keys: bool,
    #[serde(default)]
    pub quorum: QuorumPolicy,
    #[serde(default)]
    pub on_invalid_share: InvalidSharePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<ParticipantId>>,
    /// Share collection timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect_timeout: Option<u64>,
    /// Directory with `{id}-pk` public key files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys_dir: Option<PathBuf>,
}

impl Default for RoundSection {
    fn default() -> Self {
        Self {
            verify: default_verify(),
            validate_keys: false,
            quorum: QuorumPolicy::default(),
            on_invalid_share: InvalidSharePolicy::default(),
            candidates: None,
            collect_timeout: None,
            keys_dir: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    pub id: ParticipantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Bs58Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<Bs58Bytes>,
}

fn default_timeout() -> u64 {
    30
}

fn default_verify() -> bool {
    true
}

impl CoordinatorConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::read_string(&data)
    }

    pub fn read_string(s: &str) -> Result<Self> {
        let config = toml::from_str(s)?;
        Ok(config)
    }

    pub fn params(&self) -> Result<ThresholdParams, InvalidParams> {
        ThresholdParams::new(self.threshold, self.size)
    }

    pub fn client_config<L: Into<String>>(&self, label: L) -> ClientConfig {
        ClientConfig::builder()
            .label(label)
            .base_url(self.service.url.clone())
            .maybe_combiner_url(self.service.combiner.clone())
            .participants(
                self.participants
                    .iter()
                    .filter_map(|p| Some((p.id, p.url.clone()?)))
                    .collect(),
            )
            .secrets(
                self.participants
                    .iter()
                    .filter_map(|p| Some((p.id, p.secret_key.clone()?.into_bytes())))
                    .collect(),
            )
            .timeout(Duration::from_secs(self.service.timeout))
            .build()
    }

    /// Build the round configuration.
    ///
    /// Fails if the threshold parameters are invalid or if a participant
    /// that may be asked for a share is unreachable (see [`Self::unroutable`]).
    pub fn round_config<L: Into<String>>(&self, label: L) -> Result<RoundConfig> {
        let r = &self.round;
        let params = self.params()?;
        let missing = self.unroutable()?;
        if !missing.is_empty() {
            bail!(
                "no endpoint or secret key for share candidates {missing:?}, \
                 add a [[participants]] entry with `url` or `secret_key`"
            )
        }
        let c = RoundConfig::builder()
            .label(label)
            .params(params)
            .verify(r.verify)
            .validate_keys(r.validate_keys)
            .quorum(r.quorum)
            .on_invalid_share(r.on_invalid_share)
            .maybe_candidates(r.candidates.clone())
            .maybe_collect_timeout(r.collect_timeout.map(Duration::from_secs))
            .build();
        Ok(c)
    }

    /// Share candidates with neither their own endpoint nor a secret key.
    ///
    /// A partial decryption request does not name the participant, so the
    /// shared service URL can not answer it on a participant's behalf.
    pub fn unroutable(&self) -> Result<Vec<ParticipantId>, InvalidParams> {
        let params = self.params()?;
        let routable = |id: &ParticipantId| {
            self.participants
                .iter()
                .any(|p| p.id == *id && (p.url.is_some() || p.secret_key.is_some()))
        };
        let candidates: Vec<ParticipantId> = match &self.round.candidates {
            Some(c) => c.iter().copied().filter(|id| params.contains(*id)).collect(),
            None => params.participants().collect(),
        };
        Ok(candidates.into_iter().filter(|id| !routable(id)).collect())
    }

    /// Public keys given inline.
    pub fn public_keys(&self) -> impl Iterator<Item = (ParticipantId, PublicKeyShare)> + '_ {
        self.participants.iter().filter_map(|p| {
            let k = p.public_key.as_ref()?;
            Some((p.id, PublicKeyShare::from(k.as_bytes().clone())))
        })
    }
}

impl fmt::Display for CoordinatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = toml::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}
