use std::sync::Arc;
use std::time::Duration;

use poha_consensus::{
    AuthorityConfig, AuthorityConsensus, ConsensusError, HumanityVerifier, HybridConsensus,
    RegistrationState, ValidatorSet,
};
use poha_crypto::{derive_address, keypair_from_seed, sign_block};
use poha_humanity::{HumanityRegistry, RegistryConfig, SimulatorGateway};
use poha_ledger::{Blockchain, MemoryLedger};
use poha_types::{Address, Block, KeyPair, Timestamp};
use poha_utils::ShutdownController;
use proptest::prelude::*;
use tokio::sync::mpsc;

struct Node {
    hybrid: HybridConsensus,
    ledger: Arc<MemoryLedger>,
    produced_rx: mpsc::Receiver<Block>,
}

fn address_of(seed: u8) -> Address {
    derive_address(&keypair_from_seed(&[seed; 32]).public)
}

fn node(
    seed: u8,
    validators: Vec<Address>,
    verifier: HumanityVerifier,
    shutdown: &Arc<ShutdownController>,
) -> Node {
    node_on(seed, validators, verifier, shutdown, Arc::new(MemoryLedger::new()))
}

fn node_on(
    seed: u8,
    validators: Vec<Address>,
    verifier: HumanityVerifier,
    shutdown: &Arc<ShutdownController>,
    ledger: Arc<MemoryLedger>,
) -> Node {
    let (produced_tx, produced_rx) = mpsc::channel(16);
    let authority = AuthorityConsensus::new(
        keypair_from_seed(&[seed; 32]),
        ValidatorSet::new(validators),
        AuthorityConfig {
            block_time: Duration::from_millis(30),
            max_block_transactions: 10,
        },
        ledger.clone(),
        produced_tx,
        Arc::clone(shutdown),
    );
    Node {
        hybrid: HybridConsensus::new(authority, verifier, ledger.clone()),
        ledger,
        produced_rx,
    }
}

fn signed_block(keys: &KeyPair, proof: &str) -> Block {
    let genesis = Block::genesis();
    let block = Block::unsigned(
        1,
        genesis.hash,
        Timestamp::now(),
        vec![],
        derive_address(&keys.public),
        proof.to_string(),
    );
    sign_block(block, &keys.private)
}

fn verified(registry: &HumanityRegistry, address: &Address) -> String {
    let token = registry.register_verification(address);
    registry.complete_verification(address, &token).unwrap();
    token
}

#[tokio::test]
async fn verified_validator_block_is_accepted() {
    let shutdown = Arc::new(ShutdownController::new());
    let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
    let v1 = address_of(1);
    let tok1 = verified(&registry, &v1);

    let n = node(1, vec![v1.clone()], HumanityVerifier::Internal(registry.clone()), &shutdown);
    n.hybrid.register_as_validator().await.unwrap();
    assert_eq!(n.hybrid.state().await, RegistrationState::Validator);

    let block = signed_block(&keypair_from_seed(&[1; 32]), &tok1);
    n.hybrid.verify_block(&block).await.unwrap();
}

#[tokio::test]
async fn unknown_validator_is_unauthorized() {
    let shutdown = Arc::new(ShutdownController::new());
    let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
    let v1 = address_of(1);
    let n = node(1, vec![v1], HumanityVerifier::Internal(registry.clone()), &shutdown);

    let proof = verified(&registry, &Address::from("unknown"));
    let block = Block::unsigned(
        1,
        Block::genesis().hash,
        Timestamp::now(),
        vec![],
        Address::from("unknown"),
        proof,
    );
    assert!(matches!(
        n.hybrid.verify_block(&block).await,
        Err(ConsensusError::UnauthorizedValidator(v)) if v == "unknown"
    ));
}

#[tokio::test]
async fn authorized_block_with_foreign_proof_is_rejected() {
    let shutdown = Arc::new(ShutdownController::new());
    let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
    let v1 = address_of(1);
    let v2 = address_of(2);
    verified(&registry, &v1);
    let tok2 = verified(&registry, &v2);

    let n = node(1, vec![v1.clone(), v2], HumanityVerifier::Internal(registry), &shutdown);

    let keys = keypair_from_seed(&[1; 32]);
    for proof in [tok2.as_str(), "", "forged"] {
        let block = signed_block(&keys, proof);
        assert!(matches!(
            n.hybrid.verify_block(&block).await,
            Err(ConsensusError::InvalidHumanProof(_))
        ));
    }
}

#[tokio::test]
async fn unverified_node_cannot_register_or_mine() {
    let shutdown = Arc::new(ShutdownController::new());
    let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
    let v1 = address_of(1);
    registry.register_verification(&v1);

    let n = node(1, vec![v1], HumanityVerifier::Internal(registry), &shutdown);
    assert!(matches!(
        n.hybrid.register_as_validator().await,
        Err(ConsensusError::HumanVerificationRequired { url: None, .. })
    ));
    assert_eq!(n.hybrid.state().await, RegistrationState::Unregistered);

    assert!(matches!(
        n.hybrid.start_mining().await,
        Err(ConsensusError::NotAValidator(_))
    ));
    assert!(!n.hybrid.is_mining().await);
}

#[tokio::test]
async fn verified_human_outside_the_set_is_not_a_validator() {
    let shutdown = Arc::new(ShutdownController::new());
    let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
    let v1 = address_of(1);
    verified(&registry, &v1);

    let n = node(1, vec![address_of(2)], HumanityVerifier::Internal(registry), &shutdown);
    assert!(matches!(
        n.hybrid.register_as_validator().await,
        Err(ConsensusError::NotAValidator(_))
    ));
    assert_eq!(n.hybrid.state().await, RegistrationState::Unregistered);
}

#[tokio::test]
async fn start_mining_registers_and_produces() {
    let shutdown = Arc::new(ShutdownController::new());
    let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
    let v1 = address_of(1);
    let tok1 = verified(&registry, &v1);

    let mut n = node(1, vec![v1], HumanityVerifier::Internal(registry), &shutdown);
    n.hybrid.start_mining().await.unwrap();
    assert_eq!(n.hybrid.state().await, RegistrationState::Validator);

    let block = tokio::time::timeout(Duration::from_secs(2), n.produced_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(block.human_proof, tok1);
    assert!(n.ledger.height().await >= 1);

    n.hybrid.stop_mining().await;
    assert!(!n.hybrid.is_mining().await);
    shutdown.shutdown();
}

#[tokio::test]
async fn simulator_flow_requires_completion_then_verifies_across_nodes() {
    let shutdown = Arc::new(ShutdownController::new());
    let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
    let sim = SimulatorGateway::start(0, registry.clone(), &shutdown).await.unwrap();
    let v1 = address_of(1);
    let validators = vec![v1.clone()];

    let producer = node(1, validators.clone(), HumanityVerifier::Simulator(sim.clone()), &shutdown);
    let url = match producer.hybrid.register_as_validator().await {
        Err(ConsensusError::HumanVerificationRequired { url: Some(url), .. }) => url,
        other => panic!("expected verification request, got {other:?}"),
    };
    assert!(url.starts_with(sim.base_url()));
    assert_eq!(producer.hybrid.state().await, RegistrationState::Unregistered);

    let token = registry.record(&v1).unwrap().token;
    registry.complete_verification(&v1, &token).unwrap();

    producer.hybrid.register_as_validator().await.unwrap();
    assert_eq!(producer.hybrid.authority().human_proof().await.as_deref(), Some(token.as_str()));

    let block = producer.hybrid.authority().produce_block().await.unwrap().unwrap();

    let observer = node(9, validators, HumanityVerifier::Simulator(sim), &shutdown);
    observer.hybrid.verify_block(&block).await.unwrap();
    shutdown.shutdown();
}

#[tokio::test]
async fn on_chain_proof_is_reused() {
    let shutdown = Arc::new(ShutdownController::new());
    let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
    let sim = SimulatorGateway::start(0, registry.clone(), &shutdown).await.unwrap();
    let v1 = address_of(1);
    let token = verified(&registry, &v1);

    let ledger = Arc::new(MemoryLedger::new());
    ledger
        .add_block(signed_block(&keypair_from_seed(&[1; 32]), &token))
        .await
        .unwrap();

    let n = node_on(1, vec![v1.clone()], HumanityVerifier::Simulator(sim), &shutdown, ledger);
    n.hybrid.register_as_validator().await.unwrap();

    assert_eq!(n.hybrid.authority().human_proof().await, Some(token.clone()));
    assert_eq!(registry.record(&v1).unwrap().token, token);
    shutdown.shutdown();
}

#[tokio::test]
async fn lapsed_verification_ends_mining_and_registration() {
    let shutdown = Arc::new(ShutdownController::new());
    let registry = Arc::new(HumanityRegistry::new(RegistryConfig {
        ttl: Duration::from_secs(2),
        sweep_interval: Duration::from_secs(60),
    }));
    let v1 = address_of(1);
    verified(&registry, &v1);

    let Node {
        hybrid,
        ledger,
        mut produced_rx,
    } = node(1, vec![v1.clone()], HumanityVerifier::Internal(registry.clone()), &shutdown);
    hybrid.start_mining().await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(1), produced_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.index, 1);
    let drain = tokio::spawn(async move { while produced_rx.recv().await.is_some() {} });

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(!registry.is_human_verified(&v1));
    assert!(!hybrid.is_mining().await);
    assert_eq!(hybrid.state().await, RegistrationState::Unregistered);
    assert_eq!(hybrid.authority().human_proof().await, None);

    let height = ledger.height().await;
    assert!(hybrid.authority().produce_block().await.unwrap().is_none());
    assert!(matches!(
        hybrid.start_mining().await,
        Err(ConsensusError::NotAValidator(_))
    ));
    assert_eq!(ledger.height().await, height);
    drain.abort();
    shutdown.shutdown();
}

#[tokio::test]
async fn pending_verification_keeps_its_link() {
    let shutdown = Arc::new(ShutdownController::new());
    let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
    let sim = SimulatorGateway::start(0, registry.clone(), &shutdown).await.unwrap();
    let v1 = address_of(1);
    let n = node(1, vec![v1.clone()], HumanityVerifier::Simulator(sim), &shutdown);

    let mut urls = Vec::new();
    for _ in 0..2 {
        match n.hybrid.register_as_validator().await {
            Err(ConsensusError::HumanVerificationRequired { url: Some(url), .. }) => urls.push(url),
            other => panic!("expected verification request, got {other:?}"),
        }
    }
    assert_eq!(urls[0], urls[1]);

    let first = registry.record(&v1).unwrap().token;
    assert!(urls[0].contains(&first));
    registry.complete_verification(&v1, &first).unwrap();

    n.hybrid.register_as_validator().await.unwrap();
    assert_eq!(n.hybrid.authority().human_proof().await, Some(first));
    shutdown.shutdown();
}

proptest! {
    #[test]
    fn outsiders_rejected_regardless_of_proof(name in "[a-zA-Z0-9_]{1,24}", proof in "[a-f0-9]{0,64}") {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let shutdown = Arc::new(ShutdownController::new());
            let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
            let n = node(1, vec![address_of(1)], HumanityVerifier::Internal(registry), &shutdown);

            let block = Block::unsigned(
                1,
                Block::genesis().hash,
                Timestamp::new(1),
                vec![],
                Address::from(name),
                proof,
            );
            let result = n.hybrid.verify_block(&block).await;
            prop_assert!(matches!(result, Err(ConsensusError::UnauthorizedValidator(_))));
            Ok(())
        })?;
    }
}
