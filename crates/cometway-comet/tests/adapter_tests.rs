mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use cometway_comet::{
    transaction_hash, AdapterState, Comet, CometConfig, CometError, CometExecTxResult,
    CometValidatorUpdate, ErrorCode,
};
use cometway_proto::{
    request, response, CheckTxRequest, CheckTxType, EchoRequest, PrepareProposalRequest,
};
use common::{chain_hash, test_config, wait_for_state, EngineHarness, TestApp};

fn adapter(app: &Arc<TestApp>, config: CometConfig) -> Comet {
    cometway_log::init_tracing_test();
    Comet::new(app.clone(), "test-node", config)
}

/// Start the adapter and complete the handshake as the engine would
async fn running(app: &Arc<TestApp>, config: CometConfig) -> (Comet, EngineHarness) {
    let socket = config.socket_path();
    let mut comet = adapter(app, config);
    comet.start().unwrap();
    let mut engine = EngineHarness::connect(&socket).await;
    engine.info().await;
    wait_for_state(&comet, AdapterState::Running).await;
    (comet, engine)
}

#[tokio::test]
async fn test_bring_up_reaches_running_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let socket = config.socket_path();
    let app = Arc::new(TestApp::default());

    let (mut comet, mut engine) = running(&app, config).await;
    assert!(comet.status());
    assert!(comet.error().is_none());
    assert_eq!(comet.error_code(), ErrorCode::None);
    assert!(dir.path().join("config").join("genesis.json").exists());
    assert!(dir.path().join("config").join("config.toml").exists());

    comet.stop().await;
    assert_eq!(comet.state(), AdapterState::Stopped);
    assert!(comet.status());
    assert!(engine.receive().await.is_none());
    assert!(!socket.exists());

    // a second stop is harmless
    comet.stop().await;
    assert_eq!(comet.state(), AdapterState::Stopped);
}

#[tokio::test]
async fn test_state_transitions_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, _engine) = running(&app, test_config(dir.path())).await;
    comet.stop().await;

    let seen: Vec<AdapterState> = app.transitions.lock().unwrap().iter().map(|t| t.1).collect();
    assert_eq!(
        seen,
        vec![
            AdapterState::Started,
            AdapterState::Configuring,
            AdapterState::Configured,
            AdapterState::StartingAbci,
            AdapterState::StartedAbci,
            AdapterState::StartingEngine,
            AdapterState::StartedEngine,
            AdapterState::TestingEngine,
            AdapterState::TestedEngine,
            AdapterState::Running,
            AdapterState::Finished,
            AdapterState::Stopped,
        ]
    );
}

#[tokio::test]
async fn test_init_chain_then_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&app, test_config(dir.path())).await;

    let init = engine.init_chain(1).await;
    assert_eq!(app.init_chain_calls.load(Ordering::SeqCst), 1);
    assert_eq!(init.app_hash, app.app_hash());
    assert!(init.validators.is_empty());
    let params = init.consensus_params.unwrap();
    assert_eq!(params.feature.unwrap().pbts_enable_height, Some(1));
    assert_eq!(params.synchrony.unwrap().message_delay.unwrap().seconds, 5);

    let genesis_hash = app.app_hash();
    let finalized = engine.finalize(1, 1, &[b"a", b"bb"]).await;
    assert_eq!(finalized.tx_results.len(), 2);
    assert_eq!(finalized.tx_results[1].gas_used, 2);
    assert_eq!(finalized.tx_results[1].data, b"bb".to_vec());
    assert_eq!(
        finalized.app_hash,
        chain_hash(&genesis_hash, 1, &[b"a".to_vec(), b"bb".to_vec()])
    );
    let commit = engine.commit().await;
    assert_eq!(commit.retain_height, 0);

    engine.produce(2, 11).await;
    assert_eq!(app.height(), 12);
    assert_eq!(engine.commit().await.retain_height, 2);

    // the engine's next handshake sees the committed height
    let info = engine.info().await;
    assert_eq!(info.last_block_height, 12);
    assert_eq!(info.last_block_app_hash, app.app_hash());
    assert_eq!(info.version, "1.0.0");

    assert!(comet.status());
    comet.stop().await;
}

#[tokio::test]
async fn test_init_chain_honours_initial_height() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&app, test_config(dir.path())).await;

    engine.init_chain(100).await;
    assert_eq!(app.height(), 99);
    engine.finalize(100, 100, &[]).await;
    assert_eq!(app.height(), 100);
    assert!(comet.status());
    comet.stop().await;
}

#[tokio::test]
async fn test_out_of_sequence_height_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&app, test_config(dir.path())).await;

    engine.init_chain(1).await;
    engine.produce(1, 2).await;
    engine
        .send(EngineHarness::finalize_request(4, 4, &[b"skipped"]))
        .await;
    assert!(engine.receive().await.is_none());

    wait_for_state(&comet, AdapterState::Terminated).await;
    assert!(!comet.status());
    assert_eq!(comet.error_code(), ErrorCode::Fatal);
    let error = comet.error().unwrap();
    assert!(error.contains("height 4"), "{error}");
    assert_eq!(app.height(), 2);

    comet.stop().await;
    assert_eq!(comet.state(), AdapterState::Stopped);
    // status stays false until the next start
    assert!(!comet.status());
}

#[tokio::test]
async fn test_result_count_mismatch_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&app, test_config(dir.path())).await;

    engine.init_chain(1).await;
    app.short_results.store(true, Ordering::SeqCst);
    engine
        .send(EngineHarness::finalize_request(1, 1, &[b"a", b"b"]))
        .await;
    assert!(engine.receive().await.is_none());

    wait_for_state(&comet, AdapterState::Terminated).await;
    assert!(!comet.status());
    assert!(comet.error().unwrap().contains("2 transactions"));
    comet.stop().await;
}

fn block_hash(height: i64) -> Vec<u8> {
    height.to_be_bytes().repeat(4)
}

#[tokio::test]
async fn test_info_on_another_connection_keeps_the_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, mut consensus) = running(&app, test_config(dir.path())).await;
    consensus.init_chain(1).await;
    consensus.produce(1, 2).await;

    let mut query = EngineHarness::connect(&comet.config().socket_path()).await;
    assert_eq!(query.info().await.last_block_height, 2);
    consensus.produce(3, 1).await;
    assert_eq!(app.blocks()[2].prev_hash, block_hash(2));

    // status queries racing live blocks
    let queries = tokio::spawn(async move {
        let mut last = 0;
        for _ in 0..50 {
            let height = query.info().await.last_block_height;
            assert!(height >= last, "Info went back from {last} to {height}");
            last = height;
        }
        query
    });
    consensus.produce(4, 30).await;
    let _query = queries.await.unwrap();

    assert!(comet.status(), "{:?}", comet.error());
    assert_eq!(app.height(), 33);
    let blocks = app.blocks();
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].height, pair[0].height + 1);
        assert_eq!(pair[1].prev_hash, block_hash(pair[0].height as i64));
    }
    comet.stop().await;
}

#[tokio::test]
async fn test_validator_updates_are_forwarded() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&app, test_config(dir.path())).await;
    engine.init_chain(1).await;

    app.validator_updates.lock().unwrap().insert(
        1,
        vec![
            CometValidatorUpdate {
                public_key: vec![1; 32],
                power: 10,
            },
            CometValidatorUpdate {
                public_key: vec![2; 32],
                power: 0,
            },
        ],
    );
    let finalized = engine.finalize(1, 1, &[]).await;
    assert_eq!(finalized.validator_updates.len(), 2);
    for update in &finalized.validator_updates {
        assert_eq!(update.pub_key_type, "ed25519");
    }
    assert_eq!(finalized.validator_updates[0].pub_key_bytes, vec![1; 32]);
    assert_eq!(finalized.validator_updates[0].power, 10);
    // power 0 removes a validator and goes through unchanged
    assert_eq!(finalized.validator_updates[1].pub_key_bytes, vec![2; 32]);
    assert_eq!(finalized.validator_updates[1].power, 0);
    engine.commit().await;

    assert!(engine.finalize(2, 2, &[]).await.validator_updates.is_empty());
    assert!(comet.status());
    comet.stop().await;
}

#[tokio::test]
async fn test_negative_validator_power_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&app, test_config(dir.path())).await;
    engine.init_chain(1).await;

    app.validator_updates.lock().unwrap().insert(
        1,
        vec![CometValidatorUpdate {
            public_key: vec![3; 32],
            power: -1,
        }],
    );
    engine.send(EngineHarness::finalize_request(1, 1, &[])).await;
    assert!(engine.receive().await.is_none());

    wait_for_state(&comet, AdapterState::Terminated).await;
    assert!(!comet.status());
    assert_eq!(comet.error_code(), ErrorCode::Fatal);
    assert!(comet.error().unwrap().contains("negative power -1"));
    comet.stop().await;
}

#[tokio::test]
async fn test_finalized_transactions_are_cached_by_hash() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&app, test_config(dir.path())).await;
    engine.init_chain(1).await;

    let hash = transaction_hash(b"bb");
    assert!(comet.transaction_status(&hash).is_none());
    engine.finalize(1, 1, &[b"a", b"bb"]).await;
    engine.commit().await;

    let status = comet.transaction_status(&hash.to_lowercase()).unwrap();
    assert_eq!(status.height, 1);
    assert_eq!(status.index, 1);
    assert_eq!(
        status.result,
        CometExecTxResult {
            code: 0,
            data: b"bb".to_vec(),
            gas_wanted: 2,
            gas_used: 2,
        }
    );
    assert_eq!(comet.transaction_status(&transaction_hash(b"a")).unwrap().index, 0);
    // only submitted transactions have a record
    assert!(comet.transaction_by_hash(&hash).is_none());

    comet.set_transaction_cache_size(0);
    assert!(comet.transaction_status(&hash).is_none());
    engine.finalize(2, 2, &[b"c"]).await;
    assert!(comet.transaction_status(&transaction_hash(b"c")).is_none());
    comet.stop().await;
}

#[tokio::test]
async fn test_missing_genesis_terminates_at_configuring() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let config = CometConfig {
        genesis: None,
        ..test_config(dir.path())
    };
    let mut comet = adapter(&app, config);
    comet.start().unwrap();

    wait_for_state(&comet, AdapterState::Terminated).await;
    assert!(!comet.status());
    assert_eq!(comet.error_code(), ErrorCode::Config);
    assert!(app
        .transitions
        .lock()
        .unwrap()
        .iter()
        .all(|(_, to)| *to != AdapterState::Configured));

    comet.stop().await;
    assert_eq!(comet.state(), AdapterState::Stopped);
}

#[tokio::test]
async fn test_handshake_timeout_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let config = CometConfig {
        handshake_timeout_ms: 200,
        ..test_config(dir.path())
    };
    let mut comet = adapter(&app, config);
    comet.start().unwrap();

    wait_for_state(&comet, AdapterState::Terminated).await;
    assert_eq!(comet.error_code(), ErrorCode::AbciTimeout);
    comet.stop().await;
    assert_eq!(comet.state(), AdapterState::Stopped);
}

#[tokio::test]
async fn test_stop_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let mut comet = adapter(&app, test_config(dir.path()));

    // never started
    comet.stop().await;
    assert_eq!(comet.state(), AdapterState::Stopped);

    comet.start().unwrap();
    comet.stop().await;
    assert_eq!(comet.state(), AdapterState::Stopped);
    assert!(comet.status());
}

#[tokio::test]
async fn test_pause_at_configured() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let mut comet = adapter(&app, test_config(dir.path()));

    comet.set_pause_state(Some(AdapterState::Configured));
    comet.start().unwrap();
    comet
        .wait_pause_state(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(comet.state(), AdapterState::Configured);
    assert_eq!(comet.pause_state(), Some(AdapterState::Configured));

    // held: nothing listens on the socket yet
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(comet.state(), AdapterState::Configured);

    comet.stop().await;
    assert_eq!(comet.state(), AdapterState::Stopped);
    assert_eq!(comet.pause_state(), None);
}

#[tokio::test]
async fn test_pause_released_continues_bring_up() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let socket = config.socket_path();
    let app = Arc::new(TestApp::default());
    let mut comet = adapter(&app, config);

    comet.set_pause_state(Some(AdapterState::StartedAbci));
    comet.start().unwrap();
    comet
        .wait_pause_state(Duration::from_secs(5))
        .await
        .unwrap();
    assert!(socket.exists());

    comet.set_pause_state(None);
    let mut engine = EngineHarness::connect(&socket).await;
    engine.info().await;
    wait_for_state(&comet, AdapterState::Running).await;
    comet.stop().await;
}

#[tokio::test]
async fn test_wait_pause_state_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let config = CometConfig {
        genesis: None,
        ..test_config(dir.path())
    };
    let mut comet = adapter(&app, config);

    comet.set_pause_state(Some(AdapterState::Running));
    comet.start().unwrap();
    let err = comet
        .wait_pause_state(Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CometError::Failed {
            code: ErrorCode::Config,
            ..
        }
    ));
    comet.stop().await;
}

#[tokio::test]
async fn test_replay_matches_live_processing() {
    // live node
    let live_dir = tempfile::tempdir().unwrap();
    let live = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&live, test_config(live_dir.path())).await;
    engine.init_chain(1).await;
    engine.produce(1, 5).await;
    comet.stop().await;

    // restarting reports the committed height, the engine carries on from it
    comet.start().unwrap();
    let mut engine = EngineHarness::connect(&comet.config().socket_path()).await;
    let info = engine.info().await;
    assert_eq!(info.last_block_height, 5);
    wait_for_state(&comet, AdapterState::Running).await;
    engine.produce(6, 1).await;
    assert_eq!(live.height(), 6);
    assert!(comet.status());
    comet.stop().await;

    // a fresh node replaying the same blocks towards height 6
    let replay_dir = tempfile::tempdir().unwrap();
    let replayed = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&replayed, test_config(replay_dir.path())).await;
    engine.init_chain(1).await;
    for block in live.blocks() {
        let txs: Vec<&[u8]> = block.txs.iter().map(Vec::as_slice).collect();
        engine.finalize(block.height as i64, 6, &txs).await;
        engine.commit().await;
    }
    comet.stop().await;

    assert_eq!(replayed.height(), live.height());
    assert_eq!(replayed.app_hash(), live.app_hash());
    let replay_targets: Vec<u64> = replayed
        .blocks()
        .iter()
        .map(|b| b.syncing_to_height)
        .collect();
    assert_eq!(replay_targets, vec![6; 6]);
    let live_targets: Vec<u64> = live.blocks().iter().map(|b| b.syncing_to_height).collect();
    assert_eq!(live_targets, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_syncing_height_never_below_block_height() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&app, test_config(dir.path())).await;
    engine.init_chain(1).await;
    // engines that leave the field unset send 0
    engine.finalize(1, 0, &[]).await;
    assert_eq!(app.blocks()[0].syncing_to_height, 1);
    comet.stop().await;
}

#[tokio::test]
async fn test_mempool_and_proposals() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let (mut comet, mut engine) = running(&app, test_config(dir.path())).await;

    let check = |tx: &[u8], kind: CheckTxType| {
        request::Value::CheckTx(CheckTxRequest {
            tx: tx.to_vec(),
            r#type: kind.into(),
        })
    };
    match engine.call(check(b"good", CheckTxType::Check)).await.value {
        Some(response::Value::CheckTx(res)) => {
            assert_eq!(res.code, 0);
            assert_eq!(res.gas_wanted, 4);
        }
        other => panic!("unexpected response {other:?}"),
    }
    match engine.call(check(b"xbad", CheckTxType::Recheck)).await.value {
        Some(response::Value::CheckTx(res)) => assert_eq!(res.code, 1),
        other => panic!("unexpected response {other:?}"),
    }

    let proposal = PrepareProposalRequest {
        max_tx_bytes: 20,
        txs: vec![
            b"drop-me".to_vec(),
            b"first".to_vec(),
            b"second".to_vec(),
            b"third-too-long".to_vec(),
            b"x".to_vec(),
        ],
        height: 1,
        ..Default::default()
    };
    match engine
        .call(request::Value::PrepareProposal(proposal))
        .await
        .value
    {
        Some(response::Value::PrepareProposal(res)) => {
            // 7 + 8 bytes encoded; the 16-byte tx does not fit, the last one does
            assert_eq!(
                res.txs,
                vec![b"first".to_vec(), b"second".to_vec(), b"x".to_vec()]
            );
        }
        other => panic!("unexpected response {other:?}"),
    }

    match engine
        .call(request::Value::Echo(EchoRequest {
            message: "ping".to_string(),
        }))
        .await
        .value
    {
        Some(response::Value::Echo(res)) => assert_eq!(res.message, "ping"),
        other => panic!("unexpected response {other:?}"),
    }
    assert!(comet.status());
    comet.stop().await;
}

#[tokio::test]
async fn test_outbound_calls_need_a_running_engine_rpc() {
    let dir = tempfile::tempdir().unwrap();
    let app = Arc::new(TestApp::default());
    let mut comet = adapter(&app, test_config(dir.path()));

    assert_eq!(comet.send_transaction(b"tx".to_vec()), 0);
    assert!(!comet.check_transaction("ABCDEF"));
    assert!(!comet.get_block(1));

    // running, but no RPC port configured
    comet.start().unwrap();
    let mut engine = EngineHarness::connect(&comet.config().socket_path()).await;
    engine.info().await;
    wait_for_state(&comet, AdapterState::Running).await;
    assert_eq!(comet.send_transaction(b"tx".to_vec()), 0);
    assert!(!comet.check_transaction("not-hex"));
    assert!(comet.transaction(1).is_none());
    assert!(matches!(
        comet.rpc_call("status", serde_json::json!({})).await,
        Err(CometError::Rpc(_))
    ));
    comet.stop().await;
    assert!(app.sent.lock().unwrap().is_empty());
}
