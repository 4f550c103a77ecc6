//! End-to-end lifecycle tests against the in-memory daemon:
//! create -> sign -> go online -> send -> status -> bump.
//!
//! The daemon builds and signs with the crate's own codec, so every check
//! the lifecycle runs on daemon output is exercised for real, and the
//! tamper knobs make sure each one fires.

mod common;

use chain_btc::amount::Amount;
use chain_btc::config::TxConfig;
use chain_btc::error::{BtcError, RejectKind};
use chain_btc::fee::FeeSpec;
use chain_btc::lifecycle::{BumpTx, NewTx, SignOutcome, SignedTx, UnsignedTx};
use chain_btc::params::{ChainParams, Coin, RBF_SEQUENCE};
use chain_btc::network::BtcNetwork;
use chain_btc::rpc::DaemonSession;
use chain_btc::signer::SigningKey;
use chain_btc::status::TxStatus;
use common::*;

fn params() -> ChainParams {
    ChainParams::new(Coin::Btc, BtcNetwork::Mainnet)
}

fn keys() -> Vec<SigningKey> {
    vec![
        SigningKey::new(ADDR_SRC, "L1-test-key"),
        SigningKey::new(ADDR_SRC_BECH32, "L2-test-key"),
    ]
}

fn new_tx() -> NewTx {
    let mut tx = NewTx::new(params());
    tx.add_unspent([unspent(0x01, 0, 100_000), unspent(0x02, 1, 60_000)]).unwrap();
    tx.add_output(format!("{ADDR_DEST},0.0005").parse().unwrap());
    tx.add_output("C".parse().unwrap());
    tx
}

async fn session(daemon: MockDaemon) -> DaemonSession<MockDaemon> {
    DaemonSession::connect(daemon, &TxConfig::default()).await.unwrap()
}

async fn create(daemon: MockDaemon) -> (DaemonSession<MockDaemon>, UnsignedTx) {
    let s = session(daemon).await;
    let fee: FeeSpec = "10s".parse().unwrap();
    let tx = new_tx()
        .create(&s, &TestBook, &TxConfig::default(), Some(fee))
        .await
        .unwrap();
    (s, tx)
}

async fn sign(s: &DaemonSession<MockDaemon>, tx: UnsignedTx) -> SignedTx {
    match tx.sign(s, &keys(), &TxConfig::default()).await.unwrap() {
        SignOutcome::Signed(signed) => signed,
        SignOutcome::Failed { reason, .. } => panic!("signing failed: {reason}"),
    }
}

// ─── Session bootstrap ─────────────────────────────────────────────

#[tokio::test]
async fn connect_caches_chain_info() {
    let s = session(MockDaemon::new()).await;
    let info = s.info();
    assert_eq!(info.blockcount, 800_000);
    assert_eq!(info.network, BtcNetwork::Mainnet);
    assert_eq!(info.relay_fee_per_kb, Amount::from_sat(1_000));
    assert!(info.segwit_active);
    assert!(info.caps.sign_with_key);
    assert!(!info.caps.deployment_info);
}

#[tokio::test]
async fn slow_daemon_call_times_out() {
    let daemon = MockDaemon {
        slow_blockcount: true,
        ..MockDaemon::new()
    };
    let cfg = TxConfig {
        rpc_timeout_secs: 0,
        ..TxConfig::default()
    };
    match DaemonSession::connect(daemon, &cfg).await {
        Err(BtcError::RpcTimeout { method, .. }) => assert_eq!(method, "getblockcount"),
        Err(e) => panic!("expected timeout, got {e}"),
        Ok(_) => panic!("expected timeout"),
    }
}

// ─── Create ────────────────────────────────────────────────────────

#[tokio::test]
async fn create_selects_inputs_and_settles_change() {
    let (_, tx) = create(MockDaemon::new()).await;
    let data = &tx.record().data;

    // The larger unspent alone covers 50000 + 226 * 10.
    assert_eq!(data.inputs.len(), 1);
    assert_eq!(data.inputs[0].amount, Amount::from_sat(100_000));
    assert_eq!(data.inputs[0].sequence, Some(RBF_SEQUENCE));
    assert_eq!(data.fee().unwrap(), Amount::from_sat(2_260));

    // Sorted by amount: change 47740 before the 50000 payment.
    assert_eq!(data.outputs[0].amount, Amount::from_sat(47_740));
    assert!(data.outputs[0].is_change);
    assert_eq!(data.outputs[0].dest.addr(), Some(ADDR_CHANGE));
    assert_eq!(data.outputs[1].dest.addr(), Some(ADDR_DEST));
    assert_eq!(data.send_amount().unwrap(), Amount::from_sat(50_000));

    let id = tx.record().content_id();
    assert_eq!(id.len(), 6);
    assert_eq!(tx.record().deserialize().unwrap().content_id(), id);
    assert_eq!(tx.record().blockcount, 800_000);
}

#[tokio::test]
async fn network_fee_estimate_is_used_without_user_fee() {
    let s = session(MockDaemon::new()).await;
    let tx = new_tx().create(&s, &TestBook, &TxConfig::default(), None).await.unwrap();
    // 0.0001/kB over 226 bytes
    assert_eq!(tx.record().data.fee().unwrap(), Amount::from_sat(2_207));
}

#[tokio::test]
async fn fee_estimate_falls_back_to_estimatefee() {
    let daemon = MockDaemon {
        smart_fee: None,
        ..MockDaemon::new()
    };
    let state = daemon.state();
    let s = session(daemon).await;
    let tx = new_tx().create(&s, &TestBook, &TxConfig::default(), None).await.unwrap();
    assert_eq!(tx.record().data.fee().unwrap(), Amount::from_sat(4_414));
    assert!(state.lock().unwrap().calls.iter().any(|c| c == "estimatefee"));
}

#[tokio::test]
async fn out_of_bounds_fee_is_rejected_before_any_daemon_call() {
    for (fee, low) in [("0.000001", true), ("0.01", false)] {
        let daemon = MockDaemon::new();
        let state = daemon.state();
        let s = session(daemon).await;
        let n_boot = state.lock().unwrap().calls.len();

        let err = new_tx()
            .create(&s, &TestBook, &TxConfig::default(), Some(fee.parse().unwrap()))
            .await
            .unwrap_err();
        if low {
            assert!(matches!(err, BtcError::FeeTooLow { .. }), "{err}");
        } else {
            assert!(matches!(err, BtcError::FeeTooHigh { .. }), "{err}");
        }
        assert_eq!(state.lock().unwrap().calls.len(), n_boot);
    }
}

#[tokio::test]
async fn insufficient_funds() {
    let s = session(MockDaemon::new()).await;
    let mut tx = NewTx::new(params());
    tx.add_unspent([unspent(0x01, 0, 100_000), unspent(0x02, 1, 60_000)]).unwrap();
    tx.add_output(format!("{ADDR_DEST},0.002").parse().unwrap());
    tx.add_output("C".parse().unwrap());
    let err = tx
        .create(&s, &TestBook, &TxConfig::default(), Some("10s".parse().unwrap()))
        .await
        .unwrap_err();
    match err {
        BtcError::InsufficientFunds { available, .. } => assert_eq!(available, Amount::from_sat(160_000)),
        other => panic!("unexpected {other}"),
    }
}

#[tokio::test]
async fn missing_change_output_is_refused() {
    let daemon = MockDaemon::new();
    let state = daemon.state();
    let s = session(daemon).await;
    let mut tx = NewTx::new(params());
    tx.add_unspent([unspent(0x01, 0, 100_000)]).unwrap();
    tx.add_output(format!("{ADDR_DEST},0.0009").parse().unwrap());
    let err = tx
        .create(&s, &TestBook, &TxConfig::default(), Some("10s".parse().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, BtcError::NoChangeOutput), "{err}");
    assert!(!state.lock().unwrap().calls.iter().any(|c| c == "createrawtransaction"));
}

#[test]
fn same_outpoint_cannot_be_offered_twice() {
    let mut tx = NewTx::new(params());
    tx.add_unspent([unspent(0x01, 0, 100_000), unspent(0x01, 1, 5_000)]).unwrap();
    let err = tx.add_unspent([unspent(0x02, 0, 1_000), unspent(0x01, 0, 100_000)]).unwrap_err();
    assert!(matches!(err, BtcError::DuplicateInput(ref o) if o.ends_with(":0")), "{err}");

    let mut tx = NewTx::new(params());
    assert!(matches!(
        tx.add_unspent([unspent(0x03, 2, 1_000), unspent(0x03, 2, 1_000)]),
        Err(BtcError::DuplicateInput(_))
    ));
}

#[tokio::test]
async fn paying_an_address_twice_is_refused() {
    let s = session(MockDaemon::new()).await;
    let mut tx = NewTx::new(params());
    tx.add_unspent([unspent(0x01, 0, 100_000)]).unwrap();
    tx.add_output(format!("{ADDR_DEST},0.0002").parse().unwrap());
    tx.add_output(format!("{ADDR_DEST},0.0003").parse().unwrap());
    tx.add_output("C".parse().unwrap());
    let err = tx
        .create(&s, &TestBook, &TxConfig::default(), Some("10s".parse().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, BtcError::DuplicateAddress(ref a) if a == ADDR_DEST), "{err}");
}

#[tokio::test]
async fn segwit_output_needs_active_segwit() {
    let daemon = MockDaemon {
        segwit_inactive: true,
        ..MockDaemon::new()
    };
    let state = daemon.state();
    let s = session(daemon).await;
    assert!(!s.info().segwit_active);

    let mut tx = NewTx::new(params());
    tx.add_unspent([unspent(0x01, 0, 100_000)]).unwrap();
    tx.add_output(format!("{ADDR_SRC_BECH32},0.0005").parse().unwrap());
    tx.add_output("C".parse().unwrap());
    let err = tx
        .create(&s, &TestBook, &TxConfig::default(), Some("10s".parse().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, BtcError::SegwitUnsupported(_)), "{err}");
    assert!(!state.lock().unwrap().calls.iter().any(|c| c == "createrawtransaction"));

    // Legacy outputs are still fine.
    assert!(new_tx()
        .create(&s, &TestBook, &TxConfig::default(), Some("10s".parse().unwrap()))
        .await
        .is_ok());
}

#[tokio::test]
async fn daemon_for_another_coin_is_refused() {
    let ltc = MockDaemon {
        params: ChainParams::new(Coin::Ltc, BtcNetwork::Mainnet),
        ..MockDaemon::new()
    };
    let s = session(ltc).await;
    assert_eq!(s.info().network, BtcNetwork::Mainnet);
    let err = new_tx()
        .create(&s, &TestBook, &TxConfig::default(), Some("10s".parse().unwrap()))
        .await
        .unwrap_err();
    match err {
        BtcError::WrongChain { expected, actual } => {
            assert_eq!(expected, "BTC mainnet");
            assert!(actual.contains("12a765e31ffd4059"), "{actual}");
        }
        other => panic!("unexpected {other}"),
    }
}

#[tokio::test]
async fn wrong_chain_is_refused() {
    let daemon = MockDaemon {
        chain: "test",
        ..MockDaemon::new()
    };
    let s = session(daemon).await;
    let err = new_tx()
        .create(&s, &TestBook, &TxConfig::default(), Some("10s".parse().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, BtcError::WrongChain { .. }));
}

#[tokio::test]
async fn daemon_altering_created_transaction_is_caught() {
    let daemon = MockDaemon {
        tamper: Tamper::CreateLocktime,
        ..MockDaemon::new()
    };
    let s = session(daemon).await;
    let err = new_tx()
        .create(&s, &TestBook, &TxConfig::default(), Some("10s".parse().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, BtcError::TxHexMismatch(_)));
}

// ─── Sign / send ───────────────────────────────────────────────────

#[tokio::test]
async fn full_lifecycle_keeps_content_id() {
    let (s, tx) = create(MockDaemon::new()).await;
    let content_id = tx.record().content_id().to_string();

    let signed = sign(&s, tx).await;
    assert_eq!(signed.record().content_id(), content_id);
    let dtx = signed.record().deserialize().unwrap();
    assert_eq!(dtx.txid, signed.coin_txid());
    assert_eq!(dtx.content_id(), content_id);
    assert_eq!(dtx.size, 226);

    let online = signed.go_online(&s).await.unwrap();
    let sent = online.send(&s).await.unwrap();
    assert_eq!(sent.record().content_id(), content_id);

    match sent.status(&s).await.unwrap() {
        TxStatus::InMempool { replaceable, time_received } => {
            assert!(replaceable);
            assert_eq!(time_received.map(|t| t.timestamp()), Some(1_700_000_000));
        }
        other => panic!("unexpected status {other}"),
    }
}

#[tokio::test]
async fn segwit_input_signs_within_size_tolerance() {
    let s = session(MockDaemon::new()).await;
    let mut tx = NewTx::new(params());
    tx.add_unspent([segwit_unspent(0x03, 0, 100_000)]).unwrap();
    tx.add_output(format!("{ADDR_DEST},0.0005").parse().unwrap());
    tx.add_output("C".parse().unwrap());
    let tx = tx
        .create(&s, &TestBook, &TxConfig::default(), Some("10s".parse().unwrap()))
        .await
        .unwrap();
    assert_eq!(tx.record().data.fee().unwrap(), Amount::from_sat(1_470));

    let signed = sign(&s, tx).await;
    let dtx = signed.record().deserialize().unwrap();
    assert!(dtx.has_witness);
    assert_eq!(dtx.vsize(), 147);
}

#[tokio::test]
async fn signer_error_is_a_soft_failure() {
    let daemon = MockDaemon {
        sign_error: Some("Invalid private key".into()),
        ..MockDaemon::new()
    };
    let (s, tx) = create(daemon).await;
    let id = tx.record().content_id().to_string();
    match tx.sign(&s, &keys(), &TxConfig::default()).await.unwrap() {
        SignOutcome::Failed { tx, reason } => {
            assert!(reason.contains("Invalid private key"));
            assert_eq!(tx.record().content_id(), id);
        }
        SignOutcome::Signed(_) => panic!("signing should have failed"),
    }
}

#[tokio::test]
async fn incomplete_signature_is_a_soft_failure() {
    let daemon = MockDaemon {
        sign_incomplete: true,
        ..MockDaemon::new()
    };
    let (s, tx) = create(daemon).await;
    assert!(matches!(
        tx.sign(&s, &keys(), &TxConfig::default()).await.unwrap(),
        SignOutcome::Failed { .. }
    ));
}

#[tokio::test]
async fn daemon_altering_signed_transaction_is_fatal() {
    for tamper in [Tamper::SignAmount, Tamper::SignSequence] {
        let daemon = MockDaemon {
            tamper,
            ..MockDaemon::new()
        };
        let (s, tx) = create(daemon).await;
        let err = tx.sign(&s, &keys(), &TxConfig::default()).await.unwrap_err();
        assert!(matches!(err, BtcError::TxHexMismatch(_)), "{tamper:?}: {err}");
        assert_eq!(err.exit_code(), 2);
        assert!(err.is_fatal());
    }
}

#[tokio::test]
async fn malformed_witness_is_fatal() {
    let daemon = MockDaemon {
        tamper: Tamper::SignDropWitnessKey,
        ..MockDaemon::new()
    };
    let s = session(daemon).await;
    let mut tx = NewTx::new(params());
    tx.add_unspent([segwit_unspent(0x03, 0, 100_000)]).unwrap();
    tx.add_output(format!("{ADDR_DEST},0.0005").parse().unwrap());
    tx.add_output("C".parse().unwrap());
    let tx = tx
        .create(&s, &TestBook, &TxConfig::default(), Some("10s".parse().unwrap()))
        .await
        .unwrap();
    let err = tx.sign(&s, &keys(), &TxConfig::default()).await.unwrap_err();
    assert!(matches!(err, BtcError::BadSignatures(_)));
}

#[tokio::test]
async fn bad_size_estimate_fails_closed() {
    let (s, tx) = create(MockDaemon::new()).await;
    let cfg = TxConfig {
        vsize_adj: Some(1.2),
        ..TxConfig::default()
    };
    match tx.sign(&s, &keys(), &cfg).await.unwrap_err() {
        BtcError::BadTxSizeEstimate { ratio, suggested_adj } => {
            assert!(ratio > 1.05);
            assert!(suggested_adj < 1.0);
        }
        other => panic!("unexpected {other}"),
    }
}

#[tokio::test]
async fn broadcast_rejections_are_classified() {
    for (text, kind) in [
        ("non-final (code 64)", RejectKind::NonFinal),
        (
            "mandatory-script-verify-flag-failed (Signature must use SIGHASH_FORKID)",
            RejectKind::ReplayProtectionRequired,
        ),
        ("bad-txns-inputs-missingorspent", RejectKind::Generic),
    ] {
        let daemon = MockDaemon {
            reject: Some(text.into()),
            ..MockDaemon::new()
        };
        let (s, tx) = create(daemon).await;
        let online = sign(&s, tx).await.go_online(&s).await.unwrap();
        match online.send(&s).await.unwrap_err() {
            BtcError::BroadcastRejected { kind: k, message } => {
                assert_eq!(k, kind);
                assert_eq!(message, text);
            }
            other => panic!("unexpected {other}"),
        }
    }
}

#[tokio::test]
async fn signed_transaction_for_other_chain_cannot_go_online() {
    let (s, tx) = create(MockDaemon::new()).await;
    let signed = sign(&s, tx).await;
    let testnet = session(MockDaemon {
        chain: "test",
        ..MockDaemon::new()
    })
    .await;
    assert!(matches!(
        signed.go_online(&testnet).await,
        Err(BtcError::WrongChain { .. })
    ));
}

// ─── Bump ──────────────────────────────────────────────────────────

#[tokio::test]
async fn bump_takes_fee_from_chosen_output() {
    let (s, tx) = create(MockDaemon::new()).await;
    let old_id = tx.record().content_id().to_string();
    let sent = sign(&s, tx).await.go_online(&s).await.unwrap().send(&s).await.unwrap();
    let old_inputs = sent.record().data.inputs.clone();

    let bump = BumpTx::from_sent(sent).unwrap();
    // old fee 2260 + relay fee 221
    assert_eq!(
        bump.min_fee(s.info().relay_fee_per_kb, &TxConfig::default()).unwrap(),
        Amount::from_sat(2_481)
    );
    let bumped = bump
        .create(&s, 0, "20s".parse().unwrap(), &TxConfig::default())
        .await
        .unwrap();
    let data = &bumped.record().data;
    assert_eq!(data.fee().unwrap(), Amount::from_sat(4_520));
    assert_eq!(data.inputs, old_inputs);
    assert_eq!(data.outputs[0].amount, Amount::from_sat(45_480));
    assert_ne!(bumped.record().content_id(), old_id);
}

#[tokio::test]
async fn bump_rejects_low_fee_and_bad_index() {
    let (s, tx) = create(MockDaemon::new()).await;
    let signed = sign(&s, tx).await;

    let bump = BumpTx::from_signed(signed.clone()).unwrap();
    assert!(matches!(
        bump.create(&s, 0, "10s".parse().unwrap(), &TxConfig::default()).await,
        Err(BtcError::FeeTooLow { .. })
    ));

    let bump = BumpTx::from_signed(signed.clone()).unwrap();
    assert!(matches!(
        bump.create(&s, 5, "20s".parse().unwrap(), &TxConfig::default()).await,
        Err(BtcError::InvalidOutputIndex(5))
    ));

    // Output 0 holds 47740; a fee of 0.0005 needs 47740 more than the old one.
    let bump = BumpTx::from_signed(signed).unwrap();
    assert!(matches!(
        bump.create(&s, 0, "0.0005".parse().unwrap(), &TxConfig::default()).await,
        Err(BtcError::OutputTooSmall { .. })
    ));
}

#[tokio::test]
async fn non_rbf_transaction_cannot_be_bumped() {
    let s = session(MockDaemon::new()).await;
    let cfg = TxConfig {
        no_rbf: true,
        ..TxConfig::default()
    };
    let tx = new_tx()
        .create(&s, &TestBook, &cfg, Some("10s".parse().unwrap()))
        .await
        .unwrap();
    assert!(!tx.record().data.is_replaceable());
    let signed = sign(&s, tx).await;
    assert!(matches!(BumpTx::from_signed(signed), Err(BtcError::NotReplaceable)));
}
