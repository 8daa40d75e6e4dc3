use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::try_join_all;
use quorum_types::{
    CiphertextBundle, ParticipantId, PartialShare, PublicKeyShare, ShareSet, ThresholdParams,
};
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::{
    Aggregator, Encryptor, Error, InvalidSharePolicy, KeyDirectory, RoundConfig, ServiceError,
    ShareRequestor, ShareVerifier, Stage, ThresholdService,
};

/// Progress of a round. States only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoundState {
    Idle,
    KeysGathered,
    Encrypted,
    CollectingShares,
    Verified,
    Decrypted,
    Succeeded,
    Failed,
}

impl RoundState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoundId(u64);

impl RoundId {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A participant that failed to contribute a share.
#[derive(Debug)]
pub struct Fault {
    pub participant: ParticipantId,
    pub error: Error,
}

/// A single decryption round.
#[derive(Debug)]
pub struct Round {
    id: RoundId,
    params: ThresholdParams,
    state: RoundState,
    failed_in: Option<RoundState>,
    keys: Vec<PublicKeyShare>,
    bundle: Option<CiphertextBundle>,
    shares: Option<ShareSet>,
    faults: Vec<Fault>,
    timings: Vec<(RoundState, Duration)>,
    since: Instant,
}

impl Round {
    pub fn new(id: RoundId, params: ThresholdParams) -> Self {
        Self {
            id,
            params,
            state: RoundState::Idle,
            failed_in: None,
            keys: Vec::new(),
            bundle: None,
            shares: None,
            faults: Vec::new(),
            timings: Vec::new(),
            since: Instant::now(),
        }
    }

    pub fn id(&self) -> RoundId {
        self.id
    }

    pub fn params(&self) -> ThresholdParams {
        self.params
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    /// The state a failed round was in when it failed.
    pub fn failed_in(&self) -> Option<RoundState> {
        self.failed_in
    }

    pub fn keys(&self) -> &[PublicKeyShare] {
        &self.keys
    }

    pub fn bundle(&self) -> Option<&CiphertextBundle> {
        self.bundle.as_ref()
    }

    pub fn shares(&self) -> Option<&ShareSet> {
        self.shares.as_ref()
    }

    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    /// Time spent before entering each state.
    pub fn timings(&self) -> &[(RoundState, Duration)] {
        &self.timings
    }

    /// Add a share to this round's share set.
    ///
    /// Only shares issued for this round's commitment are accepted, and
    /// only while shares are being collected. Returns `false` if the
    /// participant already contributed.
    pub fn admit(&mut self, share: PartialShare) -> Result<bool, Error> {
        let id = share.participant();
        if self.state > RoundState::CollectingShares {
            return Err(Error::InvalidState {
                expected: RoundState::CollectingShares,
                actual: self.state,
            });
        }
        if !self.params.contains(id) {
            return Err(Error::UnknownParticipant(id));
        }
        let Some(set) = self.shares.as_mut() else {
            return Err(Error::InvalidState {
                expected: RoundState::CollectingShares,
                actual: self.state,
            });
        };
        set.admit(share).map_err(|e| Error::ShareInvalid(e.participant))
    }

    fn share_count(&self) -> usize {
        self.shares.as_ref().map(ShareSet::len).unwrap_or(0)
    }

    fn ensure(&self, s: RoundState) -> Result<(), Error> {
        if self.state == s {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: s,
                actual: self.state,
            })
        }
    }

    fn advance(&mut self, next: RoundState) {
        debug_assert!(next > self.state);
        let now = Instant::now();
        let elapsed = now.duration_since(self.since);
        self.since = now;
        self.timings.push((next, elapsed));
        debug!(round = %self.id, from = ?self.state, to = ?next, ?elapsed, "round advanced");
        self.state = next;
    }

    fn fail(&mut self, e: &Error) {
        if self.state.is_terminal() {
            return;
        }
        warn!(round = %self.id, state = ?self.state, err = %e, "round failed");
        self.failed_in = Some(self.state);
        self.advance(RoundState::Failed)
    }

    /// Pass `r` through, failing the round on error.
    fn check<T>(&mut self, r: Result<T, Error>) -> Result<T, Error> {
        if let Err(e) = &r {
            self.fail(e)
        }
        r
    }
}

/// Outcome of a successful round.
#[derive(Debug)]
pub struct RoundReport {
    pub round: RoundId,
    pub plaintext: Vec<u8>,
    pub bundle: CiphertextBundle,
    /// Participants whose shares were admitted.
    pub contributors: Vec<ParticipantId>,
    pub faults: Vec<Fault>,
    pub timings: Vec<(RoundState, Duration)>,
}

impl RoundReport {
    pub fn elapsed(&self) -> Duration {
        self.timings.iter().map(|(_, d)| *d).sum()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("round {round} failed in state {state:?}: {error}")]
pub struct RoundFailure {
    pub round: RoundId,
    pub state: RoundState,
    pub error: Error,
    pub faults: Vec<Fault>,
}

impl RoundFailure {
    fn new(round: Round, error: Error) -> Self {
        Self {
            round: round.id,
            state: round.failed_in.unwrap_or(round.state),
            error,
            faults: round.faults,
        }
    }
}

/// Drives rounds through key gathering, encryption, share collection and
/// decryption.
pub struct Coordinator<S> {
    config: RoundConfig,
    directory: Arc<KeyDirectory<S>>,
    encryptor: Encryptor<S>,
    requestor: ShareRequestor<S>,
    verifier: ShareVerifier<S>,
    aggregator: Aggregator<S>,
    next_round: AtomicU64,
}

impl<S: ThresholdService + 'static> Coordinator<S> {
    pub fn new(config: RoundConfig, service: Arc<S>) -> Self {
        let dir = KeyDirectory::new(service.clone(), config.params.size());
        Self::assemble(config, service, Arc::new(dir))
    }

    /// Use a preloaded key directory for the committee.
    pub fn with_directory(
        config: RoundConfig,
        service: Arc<S>,
        directory: Arc<KeyDirectory<S>>,
    ) -> Result<Self, Error> {
        if directory.size() != config.params.size() {
            return Err(Error::KeyCountMismatch {
                expected: config.params.size(),
                actual: directory.size(),
            });
        }
        Ok(Self::assemble(config, service, directory))
    }

    fn assemble(config: RoundConfig, service: Arc<S>, directory: Arc<KeyDirectory<S>>) -> Self {
        Self {
            encryptor: Encryptor::new(service.clone()),
            requestor: ShareRequestor::new(service.clone(), config.params),
            verifier: ShareVerifier::new(service.clone()),
            aggregator: Aggregator::new(service, config.quorum),
            config,
            directory,
            next_round: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<KeyDirectory<S>> {
        &self.directory
    }

    pub fn begin(&self) -> Round {
        let id = RoundId(self.next_round.fetch_add(1, Ordering::Relaxed));
        Round::new(id, self.config.params)
    }

    /// Run a complete round for `msg`.
    ///
    /// The message is encrypted, decrypted by the committee and the recovered
    /// plaintext compared against `msg`.
    pub async fn run(&self, msg: &[u8]) -> Result<RoundReport, RoundFailure> {
        let mut round = self.begin();
        info!(
            node = %self.config.label,
            round = %round.id,
            params = %self.config.params,
            verify = %self.config.verify,
            "round started"
        );
        match self.drive(&mut round, msg).await {
            Ok((bundle, plaintext)) => {
                round.advance(RoundState::Succeeded);
                let report = RoundReport {
                    round: round.id,
                    plaintext,
                    bundle,
                    contributors: round
                        .shares
                        .as_ref()
                        .map(|s| s.participants().collect())
                        .unwrap_or_default(),
                    faults: round.faults,
                    timings: round.timings,
                };
                info!(
                    node = %self.config.label,
                    round = %report.round,
                    contributors = ?report.contributors,
                    faults = %report.faults.len(),
                    elapsed = ?report.elapsed(),
                    "round succeeded"
                );
                Ok(report)
            }
            Err(e) => {
                round.fail(&e);
                Err(RoundFailure::new(round, e))
            }
        }
    }

    async fn drive(
        &self,
        round: &mut Round,
        msg: &[u8],
    ) -> Result<(CiphertextBundle, Vec<u8>), Error> {
        self.gather_keys(round).await?;
        let bundle = self.encrypt(round, msg).await?;
        self.collect_shares(round).await?;
        let plaintext = self.decrypt(round).await?;
        if plaintext != msg {
            return Err(Error::IntegrityMismatch);
        }
        Ok((bundle, plaintext))
    }

    /// Bind a public key to every participant.
    pub async fn gather_keys(&self, round: &mut Round) -> Result<(), Error> {
        round.ensure(RoundState::Idle)?;
        let r = self.fetch_keys().await;
        round.keys = round.check(r)?;
        round.advance(RoundState::KeysGathered);
        Ok(())
    }

    async fn fetch_keys(&self) -> Result<Vec<PublicKeyShare>, Error> {
        let keys = self
            .directory
            .get_public_keys(self.config.params.participants())
            .await?;
        if self.config.validate_keys {
            let ids = self.config.params.participants();
            try_join_all(ids.map(|id| self.directory.validate(id))).await?;
        }
        Ok(keys)
    }

    pub async fn encrypt(&self, round: &mut Round, msg: &[u8]) -> Result<CiphertextBundle, Error> {
        round.ensure(RoundState::KeysGathered)?;
        let r = self.encryptor.encrypt(msg, &round.keys, round.params).await;
        let bundle = round.check(r)?;
        round.shares = Some(ShareSet::new(bundle.commitment().clone()));
        round.bundle = Some(bundle.clone());
        round.advance(RoundState::Encrypted);
        Ok(bundle)
    }

    /// Collect (and unless disabled, verify) at least `t` shares.
    ///
    /// Requests go out to all candidates at once. Outstanding requests are
    /// cancelled as soon as `t` shares are admitted.
    pub async fn collect_shares(&self, round: &mut Round) -> Result<(), Error> {
        round.ensure(RoundState::Encrypted)?;
        round.advance(RoundState::CollectingShares);
        let r = self.collect(round).await;
        round.check(r)?;
        if !self.config.verify {
            warn!(round = %round.id, "share verification is disabled");
        }
        round.advance(RoundState::Verified);
        Ok(())
    }

    async fn collect(&self, round: &mut Round) -> Result<(), Error> {
        let t = round.params.threshold();

        let Some(commitment) = round.shares.as_ref().map(|s| s.commitment().clone()) else {
            return Err(Error::InvalidState {
                expected: RoundState::Encrypted,
                actual: round.state,
            });
        };

        let mut tasks = JoinSet::new();
        let mut owners = HashMap::new();

        for id in self.candidates()? {
            let key = round
                .keys
                .get(id.index())
                .cloned()
                .ok_or(Error::KeyUnavailable(id))?;
            let requestor = self.requestor.clone();
            let verifier = self.config.verify.then(|| self.verifier.clone());
            let c = commitment.clone();
            let handle = tasks.spawn(async move {
                let result = async {
                    let share = requestor.request_partial_share(id, &c).await?;
                    if let Some(v) = verifier {
                        v.verify(&key, &c, &share).await?
                    }
                    Ok::<_, Error>(share)
                }
                .await;
                (id, result)
            });
            owners.insert(handle.id(), id);
        }

        let deadline = self.config.collect_timeout.map(|d| Instant::now() + d);

        while round.share_count() < t {
            if round.share_count() + tasks.len() < t {
                warn!(
                    round = %round.id,
                    shares = %round.share_count(),
                    outstanding = %tasks.len(),
                    faults = %round.faults.len(),
                    "threshold no longer reachable"
                );
                break;
            }

            let next = match deadline {
                Some(d) => match timeout_at(d, tasks.join_next_with_id()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(round = %round.id, outstanding = %tasks.len(), "share collection timed out");
                        break;
                    }
                },
                None => tasks.join_next_with_id().await,
            };

            let Some(joined) = next else { break };

            let (id, result) = match joined {
                Ok((_, r)) => r,
                Err(err) => {
                    let Some(&id) = owners.get(&err.id()) else {
                        error!(round = %round.id, %err, "share task of unknown participant failed");
                        continue;
                    };
                    error!(round = %round.id, participant = %id, %err, "share task failed");
                    let e = ServiceError::transport(err).at(Stage::PartialDecrypt, Some(id));
                    (id, Err(e))
                }
            };

            match result.and_then(|share| round.admit(share)) {
                Ok(true) => {
                    debug!(round = %round.id, participant = %id, shares = %round.share_count(), "share admitted")
                }
                Ok(false) => {
                    debug!(round = %round.id, participant = %id, "duplicate share ignored")
                }
                Err(e) => self.on_fault(round, id, e)?,
            }
        }

        if !tasks.is_empty() {
            debug!(round = %round.id, cancelled = %tasks.len(), "cancelling outstanding requests");
            tasks.abort_all();
        }

        let available = round.share_count();
        if available < t {
            return Err(Error::InsufficientShares {
                required: t,
                available,
            });
        }
        Ok(())
    }

    fn on_fault(&self, round: &mut Round, id: ParticipantId, e: Error) -> Result<(), Error> {
        match e {
            Error::ShareInvalid(p) if self.config.on_invalid_share == InvalidSharePolicy::Abort => {
                Err(Error::ShareInvalid(p))
            }
            e => {
                warn!(round = %round.id, participant = %id, err = %e, "participant fault");
                round.faults.push(Fault {
                    participant: id,
                    error: e,
                });
                Ok(())
            }
        }
    }

    /// The participants to ask for shares, deduplicated and in order.
    fn candidates(&self) -> Result<Vec<ParticipantId>, Error> {
        let params = self.config.params;
        let Some(ids) = self.config.candidates() else {
            return Ok(params.participants().collect());
        };
        let mut seen = BTreeSet::new();
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if !params.contains(id) {
                return Err(Error::UnknownParticipant(id));
            }
            if seen.insert(id) {
                out.push(id)
            }
        }
        Ok(out)
    }

    /// Combine the collected shares.
    pub async fn decrypt(&self, round: &mut Round) -> Result<Vec<u8>, Error> {
        round.ensure(RoundState::Verified)?;
        let r = match (&round.bundle, &round.shares) {
            (Some(b), Some(s)) => {
                self.aggregator
                    .decrypt(b, &round.keys, s, round.params)
                    .await
            }
            _ => Err(Error::InvalidState {
                expected: RoundState::Verified,
                actual: round.state,
            }),
        };
        let plaintext = round.check(r)?;
        round.advance(RoundState::Decrypted);
        Ok(plaintext)
    }
}
