use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quorum_coordinator::{
    Aggregator, Coordinator, Encryptor, Error, InvalidSharePolicy, KeyDirectory, QuorumPolicy,
    RoundConfig, RoundState, ServiceError, ShareRequestor, ShareVerifier, Stage, ThresholdService,
};
use quorum_types::{
    CiphertextBundle, Commitment, ParticipantId, PartialShare, PublicKeyShare, ShareSet,
    ThresholdParams,
};
use quorum_utils::logging::init_logging;
use quorum_utils::mock::MockEngine;
use tokio::time::timeout;

fn ids<const N: usize>(xs: [u64; N]) -> Vec<ParticipantId> {
    xs.into_iter().map(ParticipantId::new).collect()
}

fn params(t: usize, n: usize) -> ThresholdParams {
    ThresholdParams::new(t, n).unwrap()
}

#[tokio::test]
async fn two_of_four_round() {
    init_logging();

    let engine = Arc::new(MockEngine::new(4));
    let config = RoundConfig::builder().params(params(2, 4)).build();
    let coordinator = Coordinator::new(config, engine.clone());

    let report = coordinator.run(b"hello").await.unwrap();
    assert_eq!(report.plaintext, b"hello");
    assert!(report.contributors.len() >= 2);
    assert!(report.faults.is_empty());
    assert_eq!(
        report.timings.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
        [
            RoundState::KeysGathered,
            RoundState::Encrypted,
            RoundState::CollectingShares,
            RoundState::Verified,
            RoundState::Decrypted,
            RoundState::Succeeded,
        ]
    );
    assert_eq!(engine.calls().public_key, 4);
    assert_eq!(engine.calls().encrypt, 1);
    assert_eq!(engine.calls().decrypt, 1);
}

#[tokio::test]
async fn one_of_two_round() {
    init_logging();

    let engine = Arc::new(MockEngine::new(2));
    let config = RoundConfig::builder().params(params(1, 2)).build();
    let coordinator = Coordinator::new(config, engine);

    let report = coordinator.run(b"single share").await.unwrap();
    assert_eq!(report.plaintext, b"single share");
    assert!(!report.contributors.is_empty());
}

#[tokio::test]
async fn chosen_candidates_contribute() {
    init_logging();

    let engine = Arc::new(MockEngine::new(4));
    let config = RoundConfig::builder()
        .params(params(2, 4))
        .candidates(ids([0, 2]))
        .quorum(QuorumPolicy::Exact)
        .build();
    let coordinator = Coordinator::new(config, engine.clone());

    let report = coordinator.run(b"hello").await.unwrap();
    assert_eq!(report.contributors, ids([0, 2]));
    assert_eq!(engine.calls().partial_decrypt, 2);
    assert_eq!(engine.calls().verify_share, 2);
}

#[tokio::test]
async fn repeated_rounds_agree() {
    init_logging();

    let engine = Arc::new(MockEngine::new(4));
    let config = RoundConfig::builder().params(params(3, 4)).build();
    let coordinator = Coordinator::new(config, engine.clone());

    let a = coordinator.run(b"same input").await.unwrap();
    let b = coordinator.run(b"same input").await.unwrap();
    assert_eq!(a.plaintext, b.plaintext);
    assert_ne!(a.round, b.round);
    // keys are cached by the directory
    assert_eq!(engine.calls().public_key, 4);
}

#[tokio::test]
async fn directory_keeps_order_and_caches() {
    let engine = Arc::new(MockEngine::new(4));
    let dir = KeyDirectory::new(engine.clone(), 4);

    let keys = dir.get_public_keys(ids([2, 0, 1])).await.unwrap();
    assert_eq!(engine.calls().public_key, 3);
    for (k, i) in keys.iter().zip([2, 0, 1]) {
        assert_eq!(*k, engine.public_key(ParticipantId::new(i), 4).unwrap());
    }

    let again = dir.get_public_key(ParticipantId::new(0)).await.unwrap();
    assert_eq!(again, keys[1]);
    // three lookups above plus the three comparisons
    assert_eq!(engine.calls().public_key, 6);
    assert_eq!(dir.len(), 3);
}

#[tokio::test]
async fn directory_without_remote() {
    let engine = Arc::new(MockEngine::new(4));
    let k0 = engine.public_key(ParticipantId::new(0), 4).unwrap();
    let dir = KeyDirectory::new(engine.clone(), 4)
        .with_remote(false)
        .with_keys([(ParticipantId::new(0), k0.clone())]);

    assert_eq!(dir.get_public_key(ParticipantId::new(0)).await.unwrap(), k0);
    assert!(matches!(
        dir.get_public_key(ParticipantId::new(1)).await,
        Err(Error::KeyUnavailable(p)) if p == ParticipantId::new(1)
    ));
    assert!(matches!(
        dir.get_public_key(ParticipantId::new(9)).await,
        Err(Error::KeyUnavailable(_))
    ));
    assert_eq!(engine.calls().public_key, 1);
}

#[tokio::test]
async fn directory_reads_key_files() {
    let engine = Arc::new(MockEngine::new(3));
    let path = std::env::temp_dir().join(format!("quorum-keys-{}", std::process::id()));
    std::fs::create_dir_all(&path).unwrap();
    let k1 = engine.public_key(ParticipantId::new(1), 3).unwrap();
    std::fs::write(path.join("1-pk"), k1.as_bytes()).unwrap();

    let dir = KeyDirectory::new(engine, 3)
        .with_remote(false)
        .with_key_dir(&path)
        .unwrap();
    std::fs::remove_dir_all(&path).unwrap();

    assert_eq!(dir.len(), 1);
    assert_eq!(dir.cached(ParticipantId::new(1)), Some(k1));
}

#[tokio::test]
async fn bound_keys_never_change() {
    let engine = Arc::new(MockEngine::new(2));
    let dir = KeyDirectory::new(engine, 2);
    let p = ParticipantId::new(0);
    let a = PublicKeyShare::from(vec![1, 2, 3]);
    assert_eq!(dir.insert(p, a.clone()), Some(a.clone()));
    assert_eq!(dir.insert(p, PublicKeyShare::from(vec![4])), Some(a.clone()));
    assert_eq!(dir.get_public_key(p).await.unwrap(), a);
}

#[tokio::test]
async fn key_count_mismatch_is_local() {
    let engine = Arc::new(MockEngine::new(4));
    let enc = Encryptor::new(engine.clone());
    let keys = (0..3u64)
        .map(|i| engine.public_key(ParticipantId::new(i), 4).unwrap())
        .collect::<Vec<_>>();

    let r = enc.encrypt(b"hello", &keys, params(2, 4)).await;
    assert!(matches!(
        r,
        Err(Error::KeyCountMismatch {
            expected: 4,
            actual: 3
        })
    ));
    assert_eq!(engine.calls().encrypt, 0);
}

#[tokio::test]
async fn shares_of_another_round_are_refused() {
    init_logging();

    let engine = Arc::new(MockEngine::new(4));
    let config = RoundConfig::builder().params(params(2, 4)).build();
    let coordinator = Coordinator::new(config, engine.clone());
    let requestor = ShareRequestor::new(engine.clone(), params(2, 4));
    let verifier = ShareVerifier::new(engine.clone());
    let p1 = ParticipantId::new(1);

    let mut a = coordinator.begin();
    coordinator.gather_keys(&mut a).await.unwrap();
    let bundle_a = coordinator.encrypt(&mut a, b"first").await.unwrap();

    let mut b = coordinator.begin();
    coordinator.gather_keys(&mut b).await.unwrap();
    let bundle_b = coordinator.encrypt(&mut b, b"second").await.unwrap();
    assert_ne!(bundle_a.commitment(), bundle_b.commitment());

    let share_a = requestor
        .request_partial_share(p1, bundle_a.commitment())
        .await
        .unwrap();

    assert!(matches!(b.admit(share_a.clone()), Err(Error::ShareInvalid(p)) if p == p1));

    let key = b.keys()[1].clone();
    let r = verifier.verify(&key, bundle_b.commitment(), &share_a).await;
    assert!(matches!(r, Err(Error::ShareInvalid(p)) if p == p1));

    // same bytes claimed for the other commitment
    let forged = PartialShare::new(p1, bundle_b.commitment().clone(), share_a.as_bytes().to_vec());
    let r = verifier.verify(&key, bundle_b.commitment(), &forged).await;
    assert!(matches!(r, Err(Error::ShareInvalid(p)) if p == p1));
    assert_eq!(engine.calls().verify_share, 1);

    assert!(a.admit(share_a).unwrap());
}

#[tokio::test]
async fn steps_run_in_order() {
    let engine = Arc::new(MockEngine::new(2));
    let config = RoundConfig::builder().params(params(1, 2)).build();
    let coordinator = Coordinator::new(config, engine);

    let mut r = coordinator.begin();
    assert!(matches!(
        coordinator.encrypt(&mut r, b"early").await,
        Err(Error::InvalidState {
            expected: RoundState::KeysGathered,
            actual: RoundState::Idle
        })
    ));
    assert_eq!(r.state(), RoundState::Idle);
}

#[tokio::test]
async fn partial_shares_are_deterministic() {
    init_logging();

    let engine = Arc::new(MockEngine::new(4));
    let config = RoundConfig::builder().params(params(2, 4)).build();
    let coordinator = Coordinator::new(config, engine.clone());
    let requestor = ShareRequestor::new(engine.clone(), params(2, 4));
    let p1 = ParticipantId::new(1);

    let mut r = coordinator.begin();
    coordinator.gather_keys(&mut r).await.unwrap();
    let bundle = coordinator.encrypt(&mut r, b"hello").await.unwrap();

    let a = requestor
        .request_partial_share(p1, bundle.commitment())
        .await
        .unwrap();
    let b = requestor
        .request_partial_share(p1, bundle.commitment())
        .await
        .unwrap();
    assert_eq!(a.as_bytes(), b.as_bytes());
    assert_eq!(a.commitment(), b.commitment());
    assert_eq!(engine.calls().partial_decrypt, 2);

    assert!(r.admit(a).unwrap());
    assert!(!r.admit(b).unwrap());
    assert_eq!(r.shares().map(ShareSet::len), Some(1));
}

#[tokio::test]
async fn admission_before_encryption_is_out_of_order() {
    let engine = Arc::new(MockEngine::new(4));
    let config = RoundConfig::builder().params(params(2, 4)).build();
    let coordinator = Coordinator::new(config, engine.clone());
    let requestor = ShareRequestor::new(engine.clone(), params(2, 4));
    let p1 = ParticipantId::new(1);

    let mut other = coordinator.begin();
    coordinator.gather_keys(&mut other).await.unwrap();
    let bundle = coordinator.encrypt(&mut other, b"hello").await.unwrap();
    let share = requestor
        .request_partial_share(p1, bundle.commitment())
        .await
        .unwrap();

    let mut r = coordinator.begin();
    coordinator.gather_keys(&mut r).await.unwrap();
    assert!(matches!(
        r.admit(share),
        Err(Error::InvalidState {
            expected: RoundState::CollectingShares,
            actual: RoundState::KeysGathered
        })
    ));
}

#[tokio::test]
async fn invalid_share_aborts_by_default() {
    init_logging();

    let p1 = ParticipantId::new(1);
    let engine = Arc::new(MockEngine::new(4).with_faulty([p1]));
    let config = RoundConfig::builder()
        .params(params(2, 4))
        .candidates(ids([0, 1]))
        .build();
    let coordinator = Coordinator::new(config, engine.clone());

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(matches!(e.error, Error::ShareInvalid(p) if p == p1));
    assert_eq!(e.state, RoundState::CollectingShares);
    assert_eq!(engine.calls().decrypt, 0);
}

#[tokio::test]
async fn invalid_share_is_substituted() {
    init_logging();

    let p1 = ParticipantId::new(1);
    let engine = Arc::new(MockEngine::new(4).with_faulty([p1]));
    let config = RoundConfig::builder()
        .params(params(3, 4))
        .on_invalid_share(InvalidSharePolicy::Substitute)
        .build();
    let coordinator = Coordinator::new(config, engine);

    let report = coordinator.run(b"hello").await.unwrap();
    assert_eq!(report.plaintext, b"hello");
    assert_eq!(report.contributors, ids([0, 2, 3]));
    assert!(report.faults.iter().all(|f| f.participant == p1));
}

#[tokio::test]
async fn unverified_bad_share_fails_decryption() {
    init_logging();

    let p1 = ParticipantId::new(1);
    let engine = Arc::new(MockEngine::new(4).with_faulty([p1]));
    let config = RoundConfig::builder()
        .params(params(2, 4))
        .candidates(ids([0, 1]))
        .verify(false)
        .build();
    let coordinator = Coordinator::new(config, engine.clone());

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(e.error.is_rejected());
    assert_eq!(e.error.stage(), Some(Stage::Decrypt));
    assert_eq!(e.state, RoundState::Verified);
    assert_eq!(engine.calls().verify_share, 0);
}

#[tokio::test]
async fn too_many_faults() {
    init_logging();

    let engine = Arc::new(MockEngine::new(4).with_faulty(ids([1, 2])));
    let config = RoundConfig::builder()
        .params(params(3, 4))
        .on_invalid_share(InvalidSharePolicy::Substitute)
        .build();
    let coordinator = Coordinator::new(config, engine);

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(matches!(
        e.error,
        Error::InsufficientShares { required: 3, .. }
    ));
    let mut faulty = e.faults.iter().map(|f| f.participant).collect::<Vec<_>>();
    faulty.sort();
    assert_eq!(faulty, ids([1, 2]));
}

#[tokio::test]
async fn unreachable_participants_are_faults() {
    init_logging();

    let engine = Arc::new(MockEngine::new(4).with_offline(ids([0, 1, 2])));
    let config = RoundConfig::builder().params(params(2, 4)).build();
    let coordinator = Coordinator::new(config, engine);

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(matches!(
        e.error,
        Error::InsufficientShares {
            required: 2,
            available: _
        }
    ));
    assert_eq!(e.faults.len(), 3);
    for f in &e.faults {
        assert!(f.error.is_transport());
        assert_eq!(f.error.stage(), Some(Stage::PartialDecrypt));
        assert_eq!(f.error.participant(), Some(f.participant));
    }
}

#[tokio::test]
async fn silent_participant_is_cancelled() {
    init_logging();

    let engine = Arc::new(MockEngine::new(4).with_silent(ids([3])));
    let config = RoundConfig::builder().params(params(3, 4)).build();
    let coordinator = Coordinator::new(config, engine);

    let report = timeout(Duration::from_secs(5), coordinator.run(b"hello"))
        .await
        .expect("round does not wait for silent participant")
        .unwrap();
    assert_eq!(report.contributors, ids([0, 1, 2]));
}

#[tokio::test]
async fn collection_times_out() {
    init_logging();

    let engine = Arc::new(MockEngine::new(4).with_silent(ids([1, 2, 3])));
    let config = RoundConfig::builder()
        .params(params(2, 4))
        .collect_timeout(Duration::from_millis(100))
        .build();
    let coordinator = Coordinator::new(config, engine);

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(matches!(
        e.error,
        Error::InsufficientShares {
            required: 2,
            available: 1
        }
    ));
    assert_eq!(e.state, RoundState::CollectingShares);
}

#[tokio::test]
async fn unknown_candidate() {
    let engine = Arc::new(MockEngine::new(4));
    let config = RoundConfig::builder()
        .params(params(2, 4))
        .candidates(ids([0, 7]))
        .build();
    let coordinator = Coordinator::new(config, engine);

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(matches!(e.error, Error::UnknownParticipant(p) if p == ParticipantId::new(7)));
}

#[tokio::test]
async fn foreign_key_fails_validation() {
    init_logging();

    let engine = Arc::new(MockEngine::new(4));
    let dir = KeyDirectory::new(engine.clone(), 4)
        .with_keys([(ParticipantId::new(2), PublicKeyShare::from(vec![0; 32]))]);
    let config = RoundConfig::builder()
        .params(params(2, 4))
        .validate_keys(true)
        .build();
    let coordinator = Coordinator::with_directory(config, engine, Arc::new(dir)).unwrap();

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(matches!(e.error, Error::KeyInvalid(p) if p == ParticipantId::new(2)));
    assert_eq!(e.state, RoundState::Idle);
}

#[tokio::test]
async fn aggregation_needs_threshold() {
    let engine = Arc::new(MockEngine::new(4));
    let p = params(3, 4);
    let keys = (0..4u64)
        .map(|i| engine.public_key(ParticipantId::new(i), 4).unwrap())
        .collect::<Vec<_>>();
    let bundle = engine.encrypt(b"hello", &keys, 3, 4).unwrap();

    let mut set = ShareSet::new(bundle.commitment().clone());
    for i in [0u64, 1, 2, 3] {
        let s = engine
            .partial_decrypt(ParticipantId::new(i), bundle.commitment())
            .unwrap();
        set.admit(s).unwrap();
    }

    let agg = Aggregator::new(engine.clone(), QuorumPolicy::Exact);
    assert_eq!(agg.decrypt(&bundle, &keys, &set, p).await.unwrap(), b"hello");

    let two = set.lowest(2);
    let r = agg.decrypt(&bundle, &keys, &two, p).await;
    assert!(matches!(
        r,
        Err(Error::InsufficientShares {
            required: 3,
            available: 2
        })
    ));
    assert_eq!(engine.calls().decrypt, 1);
}

/// Panics when asked for the share of one participant.
struct Crashing {
    engine: MockEngine,
    victim: ParticipantId,
}

#[async_trait]
impl ThresholdService for Crashing {
    async fn public_key(
        &self,
        id: ParticipantId,
        n: usize,
    ) -> Result<PublicKeyShare, ServiceError> {
        ThresholdService::public_key(&self.engine, id, n).await
    }

    async fn is_valid(&self, key: &PublicKeyShare, n: usize) -> Result<bool, ServiceError> {
        ThresholdService::is_valid(&self.engine, key, n).await
    }

    async fn encrypt(
        &self,
        msg: &[u8],
        keys: &[PublicKeyShare],
        params: ThresholdParams,
    ) -> Result<CiphertextBundle, ServiceError> {
        ThresholdService::encrypt(&self.engine, msg, keys, params).await
    }

    async fn partial_decrypt(
        &self,
        id: ParticipantId,
        commitment: &Commitment,
    ) -> Result<PartialShare, ServiceError> {
        if id == self.victim {
            panic!("participant {id} crashed")
        }
        ThresholdService::partial_decrypt(&self.engine, id, commitment).await
    }

    async fn verify_share(
        &self,
        key: &PublicKeyShare,
        commitment: &Commitment,
        share: &PartialShare,
    ) -> Result<bool, ServiceError> {
        ThresholdService::verify_share(&self.engine, key, commitment, share).await
    }

    async fn decrypt(
        &self,
        bundle: &CiphertextBundle,
        keys: &[PublicKeyShare],
        shares: &ShareSet,
        params: ThresholdParams,
    ) -> Result<Vec<u8>, ServiceError> {
        ThresholdService::decrypt(&self.engine, bundle, keys, shares, params).await
    }
}

#[tokio::test]
async fn crashed_share_task_is_a_fault() {
    init_logging();

    let p1 = ParticipantId::new(1);
    let service = Arc::new(Crashing {
        engine: MockEngine::new(3),
        victim: p1,
    });
    let config = RoundConfig::builder().params(params(3, 3)).build();
    let coordinator = Coordinator::new(config, service);

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(matches!(
        e.error,
        Error::InsufficientShares {
            required: 3,
            available: _
        }
    ));
    assert_eq!(e.faults.len(), 1);
    assert_eq!(e.faults[0].participant, p1);
    assert_eq!(e.faults[0].error.participant(), Some(p1));
    assert_eq!(e.faults[0].error.stage(), Some(Stage::PartialDecrypt));
    assert!(e.faults[0].error.is_transport());
}
