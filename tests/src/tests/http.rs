use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use quorum_client::{Client, Config};
use quorum_coordinator::{Coordinator, Error, KeyDirectory, RoundConfig, RoundState, Stage};
use quorum_types::{ParticipantId, PublicKeyShare, ShareSet, ThresholdParams};
use quorum_utils::config::CoordinatorConfig;
use quorum_utils::logging::init_logging;
use quorum_utils::mock::MockEngine;
use tokio::time::timeout;
use url::Url;

use crate::MockService;

fn ids<const N: usize>(xs: [u64; N]) -> Vec<ParticipantId> {
    xs.into_iter().map(ParticipantId::new).collect()
}

fn participant_urls(svc: &MockService, n: u64) -> BTreeMap<ParticipantId, Url> {
    (0..n)
        .map(ParticipantId::new)
        .map(|i| (i, svc.participant_url(i)))
        .collect()
}

#[tokio::test]
async fn round_from_config_file() {
    init_logging();

    let svc = MockService::start(MockEngine::new(4)).await;

    let toml = format!(
        r#"
threshold = 2
size = 4

[service]
url = "{}"
timeout = 5

[round]
candidates = [0, 2]

[[participants]]
id = 0
url = "{}"

[[participants]]
id = 2
url = "{}"
"#,
        svc.url(),
        svc.participant_url(ParticipantId::new(0)),
        svc.participant_url(ParticipantId::new(2)),
    );
    let config = CoordinatorConfig::read_string(&toml).unwrap();
    let client = Arc::new(Client::new(config.client_config("test")));
    let round = config.round_config("test").unwrap();
    let coordinator = Coordinator::new(round, client);

    let report = coordinator.run(b"Hello, world!").await.unwrap();
    assert_eq!(report.plaintext, b"Hello, world!");
    assert_eq!(report.contributors, ids([0, 2]));
    assert!(report.faults.is_empty());
    assert_eq!(svc.engine().calls().partial_decrypt, 2);
    assert_eq!(svc.engine().calls().verify_share, 2);
}

#[tokio::test]
async fn config_without_share_routing_is_refused() {
    init_logging();

    let svc = MockService::start(MockEngine::new(4)).await;

    let toml = format!(
        r#"
threshold = 2
size = 4

[service]
url = "{}"

[round]
candidates = [0, 2]
"#,
        svc.url()
    );
    let config = CoordinatorConfig::read_string(&toml).unwrap();
    assert_eq!(config.unroutable().unwrap(), ids([0, 2]));
    assert!(config.round_config("test").is_err());
    assert_eq!(svc.engine().calls().partial_decrypt, 0);
}

#[tokio::test]
async fn per_participant_endpoints() {
    init_logging();

    let svc = MockService::start(MockEngine::new(2)).await;
    let config = Config::builder()
        .base_url(svc.url().clone())
        .participants(participant_urls(&svc, 2))
        .build();
    let client = Arc::new(Client::new(config));
    let round = RoundConfig::builder()
        .params(ThresholdParams::new(1, 2).unwrap())
        .build();
    let coordinator = Coordinator::new(round, client);

    let report = coordinator.run(b"one share suffices").await.unwrap();
    assert_eq!(report.plaintext, b"one share suffices");
    assert_eq!(report.contributors.len(), 1);
}

#[tokio::test]
async fn secret_keys_passed_through() {
    init_logging();

    let svc = MockService::start(MockEngine::new(3)).await;
    let secrets: BTreeMap<ParticipantId, Bytes> = (0..3u64)
        .map(ParticipantId::new)
        .map(|i| (i, Bytes::from(svc.engine().secret_key(i).unwrap().to_vec())))
        .collect();
    let config = Config::builder()
        .base_url(svc.url().clone())
        .secrets(secrets)
        .build();
    let client = Arc::new(Client::new(config));
    let round = RoundConfig::builder()
        .params(ThresholdParams::new(2, 3).unwrap())
        .build();
    let coordinator = Coordinator::new(round, client);

    let report = coordinator.run(b"pass-through").await.unwrap();
    assert_eq!(report.plaintext, b"pass-through");
    assert!(report.faults.is_empty());
}

#[tokio::test]
async fn silent_participant_does_not_stall_round() {
    init_logging();

    let svc = MockService::start(MockEngine::new(4).with_silent(ids([3]))).await;
    let config = Config::builder()
        .base_url(svc.url().clone())
        .participants(participant_urls(&svc, 4))
        .build();
    let client = Arc::new(Client::new(config));
    let round = RoundConfig::builder()
        .params(ThresholdParams::new(3, 4).unwrap())
        .build();
    let coordinator = Coordinator::new(round, client);

    let report = timeout(Duration::from_secs(10), coordinator.run(b"hello"))
        .await
        .expect("round completes without the silent participant")
        .unwrap();
    assert_eq!(report.contributors, ids([0, 1, 2]));
}

#[tokio::test]
async fn silent_participant_hits_client_timeout() {
    init_logging();

    let svc = MockService::start(MockEngine::new(2).with_silent(ids([1]))).await;
    let config = Config::builder()
        .base_url(svc.url().clone())
        .participants(participant_urls(&svc, 2))
        .timeout(Duration::from_millis(500))
        .build();
    let client = Arc::new(Client::new(config));
    let round = RoundConfig::builder()
        .params(ThresholdParams::new(2, 2).unwrap())
        .build();
    let coordinator = Coordinator::new(round, client);

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(matches!(
        e.error,
        Error::InsufficientShares {
            required: 2,
            available: 1
        }
    ));
    assert_eq!(e.faults.len(), 1);
    assert_eq!(e.faults[0].participant, ParticipantId::new(1));
    assert!(e.faults[0].error.is_transport());
    assert_eq!(e.faults[0].error.stage(), Some(Stage::PartialDecrypt));
}

#[tokio::test]
async fn rejected_share_fails_round() {
    init_logging();

    let p1 = ParticipantId::new(1);
    let svc = MockService::start(MockEngine::new(4).with_faulty([p1])).await;
    let config = Config::builder()
        .base_url(svc.url().clone())
        .participants(participant_urls(&svc, 4))
        .build();
    let client = Arc::new(Client::new(config));
    let round = RoundConfig::builder()
        .params(ThresholdParams::new(2, 4).unwrap())
        .candidates(ids([0, 1]))
        .build();
    let coordinator = Coordinator::new(round, client);

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(matches!(e.error, Error::ShareInvalid(p) if p == p1));
    assert_eq!(e.state, RoundState::CollectingShares);
    assert_eq!(svc.engine().calls().decrypt, 0);
}

#[tokio::test]
async fn unreachable_service() {
    init_logging();

    let port = portpicker::pick_unused_port().unwrap();
    let config = Config::builder()
        .base_url(format!("http://127.0.0.1:{port}/").parse().unwrap())
        .timeout(Duration::from_secs(2))
        .build();
    let client = Arc::new(Client::new(config));
    let round = RoundConfig::builder()
        .params(ThresholdParams::new(1, 2).unwrap())
        .build();
    let coordinator = Coordinator::new(round, client);

    let e = coordinator.run(b"hello").await.unwrap_err();
    assert!(e.error.is_transport());
    assert_eq!(e.error.stage(), Some(Stage::KeyFetch));
    assert_eq!(e.state, RoundState::Idle);
}

#[tokio::test]
async fn key_validity() {
    init_logging();

    let svc = MockService::start(MockEngine::new(2)).await;
    let config = Config::builder().base_url(svc.url().clone()).build();
    let client = Arc::new(Client::new(config));

    let dir = KeyDirectory::new(client.clone(), 2);
    dir.validate(ParticipantId::new(0)).await.unwrap();
    dir.validate(ParticipantId::new(1)).await.unwrap();

    let bogus = PublicKeyShare::from(vec![7; 32]);
    assert!(!client.is_valid(&bogus, 2).await.unwrap());
}

#[tokio::test]
async fn combiner_refuses_too_few_shares() {
    init_logging();

    let svc = MockService::start(MockEngine::new(3)).await;
    let config = Config::builder().base_url(svc.url().clone()).build();
    let client = Client::new(config);

    let mut keys = Vec::new();
    for i in 0..3u64 {
        keys.push(client.public_key(ParticipantId::new(i), 3).await.unwrap());
    }
    let bundle = client.encrypt(b"hello", &keys, 2, 3).await.unwrap();

    let share = svc
        .engine()
        .partial_decrypt(ParticipantId::new(0), bundle.commitment())
        .unwrap();
    let mut set = ShareSet::new(bundle.commitment().clone());
    set.admit(share).unwrap();

    let e = client.decrypt(&bundle, &keys, &set, 2, 3).await.unwrap_err();
    assert_eq!(e.status().map(|s| s.as_u16()), Some(451));

    let share = svc
        .engine()
        .partial_decrypt(ParticipantId::new(2), bundle.commitment())
        .unwrap();
    set.admit(share).unwrap();
    let plain = client.decrypt(&bundle, &keys, &set, 2, 3).await.unwrap();
    assert_eq!(plain, b"hello");
}
