//! Integration tests for the runtime: signed calls end to end, nonce
//! discipline, snapshots, and concurrent callers.

use std::sync::Arc;
use std::thread;

use redpacket_contracts::call::{Call, SignedCall};
use redpacket_contracts::red_packet::DistributorError;
use redpacket_contracts::runtime::{Event, Outcome, Runtime, RuntimeConfig, RuntimeError};
use redpacket_protocol::crypto::Keypair;
use redpacket_protocol::identity::Address;
use redpacket_protocol::ledger::{LedgerError, LedgerEvent};

/// Helper: signs `call` with the signer's current nonce and executes it.
fn run(rt: &Runtime, who: &Keypair, call: Call) -> Result<Outcome, RuntimeError> {
    let nonce = rt.nonce_of(&who.address());
    let signed = SignedCall::sign(who, nonce, call)?;
    Ok(rt.execute(&signed)?.outcome)
}

/// A runtime whose admin holds `supply` and has deposited one packet.
fn runtime_with_packet(supply: u64, amount: u64, shares: u64) -> (Runtime, Keypair) {
    let admin = Keypair::generate();
    let mut config = RuntimeConfig::new(admin.address());
    config.logging.filter = "redpacket_contracts=debug".into();
    let _ = config.logging.try_init();
    config.token.total_supply = supply;
    let rt = Runtime::new(config).unwrap();

    run(&rt, &admin, Call::Init).unwrap();
    run(
        &rt,
        &admin,
        Call::Approve {
            spender: rt.distributor_address(),
            amount,
        },
    )
    .unwrap();
    let outcome = run(
        &rt,
        &admin,
        Call::Deposit {
            amount,
            share_count: shares,
        },
    )
    .unwrap();
    assert_eq!(outcome, Outcome::Deposited { packet_id: 0 });
    (rt, admin)
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn deposit_and_claim_through_signed_calls() -> anyhow::Result<()> {
    let (rt, admin) = runtime_with_packet(1_000_000, 1_000, 10);
    let alice = Keypair::generate();
    let pool = rt.distributor_address();

    assert_eq!(rt.balance_of(&pool), 1_000);
    assert_eq!(rt.balance_of(&admin.address()), 999_000);
    assert_eq!(rt.nonce_of(&admin.address()), 3);

    let receipt = rt.execute(&SignedCall::sign(&alice, 0, Call::Claim { packet_id: 0 })?)?;
    assert_eq!(
        receipt.outcome,
        Outcome::Claimed {
            packet_id: 0,
            amount: 100
        }
    );
    assert_eq!(receipt.caller, alice.address());
    assert_eq!(receipt.sequence, 4);
    assert_eq!(
        receipt.events[0],
        Event::Ledger(LedgerEvent::Transfer {
            from: pool,
            to: alice.address(),
            amount: 100
        })
    );
    assert_eq!(rt.balance_of(&alice.address()), 100);
    assert_eq!(rt.balance_of(&pool), 900);
    assert!(rt.has_claimed(0, &alice.address()));

    let again = run(&rt, &alice, Call::Claim { packet_id: 0 });
    assert!(matches!(
        again,
        Err(RuntimeError::Distributor(DistributorError::AlreadyClaimed { .. }))
    ));
    assert_eq!(rt.balance_of(&pool), 900);
    Ok(())
}

#[test]
fn deposit_without_approval_is_rejected_without_side_effects() {
    let admin = Keypair::generate();
    let rt = Runtime::new(RuntimeConfig::new(admin.address())).unwrap();
    run(&rt, &admin, Call::Init).unwrap();
    let root = rt.state_root();

    let err = run(
        &rt,
        &admin,
        Call::Deposit {
            amount: 10,
            share_count: 2,
        },
    )
    .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Distributor(DistributorError::InsufficientAllowance { .. })
    ));
    assert_eq!(rt.next_packet_id(), 0);
    assert_eq!(rt.nonce_of(&admin.address()), 1);
    assert_eq!(rt.state_root(), root);
}

#[test]
fn default_config_accepts_large_share_counts() {
    let (rt, _admin) = runtime_with_packet(1_000_000, 1_000_000, 20_000);
    let packet = rt.packet(0).unwrap();
    assert_eq!(packet.share_count, 20_000);
    assert_eq!(packet.share_value, 50);

    let alice = Keypair::generate();
    assert_eq!(
        run(&rt, &alice, Call::Claim { packet_id: 0 }).unwrap(),
        Outcome::Claimed {
            packet_id: 0,
            amount: 50
        }
    );
    assert_eq!(rt.outstanding(), 999_950);
}

#[test]
fn transfer_multi_and_transfer_from_via_runtime() {
    let admin = Keypair::generate();
    let rt = Runtime::new(RuntimeConfig::new(admin.address())).unwrap();
    run(&rt, &admin, Call::Init).unwrap();

    let bob = Keypair::generate();
    let carol = Keypair::generate();
    let items = vec![
        redpacket_protocol::ledger::TransferItem {
            from: admin.address(),
            to: bob.address(),
            amount: 500,
        },
        redpacket_protocol::ledger::TransferItem {
            from: admin.address(),
            to: carol.address(),
            amount: 250,
        },
    ];
    run(&rt, &admin, Call::TransferMulti { items }).unwrap();
    assert_eq!(rt.balance_of(&bob.address()), 500);

    run(
        &rt,
        &bob,
        Call::Approve {
            spender: carol.address(),
            amount: 200,
        },
    )
    .unwrap();
    run(
        &rt,
        &carol,
        Call::TransferFrom {
            owner: bob.address(),
            to: carol.address(),
            amount: 200,
        },
    )
    .unwrap();
    assert_eq!(rt.balance_of(&carol.address()), 450);
    assert_eq!(rt.allowance(&bob.address(), &carol.address()), 0);

    let over = run(
        &rt,
        &carol,
        Call::TransferFrom {
            owner: bob.address(),
            to: carol.address(),
            amount: 1,
        },
    );
    assert!(matches!(
        over,
        Err(RuntimeError::Ledger(LedgerError::InsufficientAllowance { .. }))
    ));
}

// ---------------------------------------------------------------------------
// Nonces and signatures
// ---------------------------------------------------------------------------

#[test]
fn replayed_call_is_rejected() {
    let (rt, _) = runtime_with_packet(10_000, 100, 5);
    let alice = Keypair::generate();
    let signed = SignedCall::sign(&alice, 0, Call::Claim { packet_id: 0 }).unwrap();

    rt.execute(&signed).unwrap();
    let replay = rt.execute(&signed);
    assert!(matches!(
        replay,
        Err(RuntimeError::BadNonce {
            expected: 1,
            got: 0,
            ..
        })
    ));
    assert_eq!(rt.balance_of(&alice.address()), 20);
}

#[test]
fn out_of_order_nonce_is_rejected() {
    let (rt, _) = runtime_with_packet(10_000, 100, 5);
    let alice = Keypair::generate();
    let ahead = SignedCall::sign(&alice, 3, Call::Claim { packet_id: 0 }).unwrap();
    assert!(matches!(rt.execute(&ahead), Err(RuntimeError::BadNonce { .. })));
    assert_eq!(rt.nonce_of(&alice.address()), 0);
}

#[test]
fn tampered_signature_is_rejected() {
    let (rt, admin) = runtime_with_packet(10_000, 100, 5);
    let thief = Keypair::generate();
    let nonce = rt.nonce_of(&admin.address());

    // Signed by the thief, but claims to come from the admin.
    let mut forged = SignedCall::sign(
        &thief,
        nonce,
        Call::Transfer {
            to: thief.address(),
            amount: 9_000,
        },
    )
    .unwrap();
    forged.signer = admin.public_key();

    assert!(matches!(rt.execute(&forged), Err(RuntimeError::Call(_))));
    assert_eq!(rt.balance_of(&thief.address()), 0);
    assert_eq!(rt.nonce_of(&admin.address()), nonce);
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[test]
fn snapshot_round_trip_preserves_everything() -> anyhow::Result<()> {
    let (rt, admin) = runtime_with_packet(10_000, 1_000, 3);
    let alice = Keypair::generate();
    run(&rt, &alice, Call::Claim { packet_id: 0 })?;

    let json = rt.export_state()?;
    let restored = Runtime::from_state(&json)?;

    assert_eq!(restored.state_root(), rt.state_root());
    assert_eq!(restored.sequence(), rt.sequence());
    assert_eq!(restored.balance_of(&alice.address()), 333);
    assert_eq!(restored.nonce_of(&admin.address()), 3);
    assert_eq!(restored.packet(0), rt.packet(0));
    assert_eq!(restored.token_address(), rt.token_address());

    // Claims recorded before the snapshot still count after it.
    let again = run(&restored, &alice, Call::Claim { packet_id: 0 });
    assert!(matches!(
        again,
        Err(RuntimeError::Distributor(DistributorError::AlreadyClaimed { .. }))
    ));
    Ok(())
}

/// Exports a runtime with one fully claimed 1000/1 packet and applies
/// `edit` to the JSON before restoring it.
fn restore_edited(edit: impl FnOnce(&mut serde_json::Value)) -> Result<Runtime, RuntimeError> {
    let (rt, _admin) = runtime_with_packet(10_000, 1_000, 1);
    let alice = Keypair::generate();
    run(&rt, &alice, Call::Claim { packet_id: 0 }).unwrap();

    let mut state: serde_json::Value = serde_json::from_str(&rt.export_state().unwrap()).unwrap();
    edit(&mut state);
    Runtime::from_state(&state.to_string())
}

#[test]
fn edited_snapshot_with_broken_packet_is_rejected() {
    assert!(restore_edited(|_| {}).is_ok());

    let zero_shares = restore_edited(|state| {
        state["distributor"]["packets"][0]["share_count"] = 0.into();
    });
    assert!(matches!(
        zero_shares,
        Err(RuntimeError::Distributor(DistributorError::Corrupt(_)))
    ));

    let wrong_value = restore_edited(|state| {
        state["distributor"]["packets"][0]["share_value"] = 999.into();
    });
    assert!(matches!(
        wrong_value,
        Err(RuntimeError::Distributor(DistributorError::Corrupt(_)))
    ));

    let skipped_id = restore_edited(|state| {
        state["distributor"]["next_packet_id"] = 7.into();
    });
    assert!(matches!(
        skipped_id,
        Err(RuntimeError::Distributor(DistributorError::Corrupt(_)))
    ));
}

#[test]
fn edited_snapshot_without_backing_balance_is_rejected() {
    // Reopen the packet's only share: it now owes 1000 it does not hold.
    let reopened = restore_edited(|state| {
        state["distributor"]["packets"][0]["claimed"] = serde_json::json!([]);
    });
    assert!(matches!(
        reopened,
        Err(RuntimeError::Distributor(DistributorError::Corrupt(_)))
    ));
}

#[test]
fn garbage_snapshot_is_rejected() {
    assert!(matches!(
        Runtime::from_state("{\"not\": \"a world\"}"),
        Err(RuntimeError::Snapshot(_))
    ));
}

#[test]
fn config_file_deploys_runtime() -> anyhow::Result<()> {
    let admin = Keypair::generate();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("runtime.json");
    std::fs::write(
        &path,
        format!(
            r#"{{"token":{{"name":"Lucky","symbol":"LCK","total_supply":500,"admin":"{}"}},
                "distributor":{{"max_share_count":2}},
                "distributor_label":"lucky-packets"}}"#,
            admin.address()
        ),
    )?;

    let rt = Runtime::new(RuntimeConfig::from_file(&path)?)?;
    assert_eq!(rt.distributor_address(), Address::for_contract("lucky-packets"));
    run(&rt, &admin, Call::Init)?;
    assert_eq!(rt.total_supply(), 500);

    run(
        &rt,
        &admin,
        Call::Approve {
            spender: rt.distributor_address(),
            amount: 100,
        },
    )?;
    let too_many = run(
        &rt,
        &admin,
        Call::Deposit {
            amount: 100,
            share_count: 3,
        },
    );
    assert!(matches!(
        too_many,
        Err(RuntimeError::Distributor(DistributorError::InvalidArgument(_)))
    ));
    Ok(())
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_double_claim_pays_once() {
    let (rt, _) = runtime_with_packet(10_000, 1_000, 10);
    let rt = Arc::new(rt);
    let alice = Keypair::generate();

    // Same signer, distinct envelopes for the same nonce: at most one can
    // pass the nonce check, and the claimed set stops any other route.
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let rt = Arc::clone(&rt);
            let signed = SignedCall::sign(&alice, 0, Call::Claim { packet_id: 0 }).unwrap();
            thread::spawn(move || rt.execute(&signed).is_ok())
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(rt.balance_of(&alice.address()), 100);
    assert_eq!(rt.balance_of(&rt.distributor_address()), 900);
}

#[test]
fn concurrent_claimants_never_exceed_share_count() {
    let (rt, _) = runtime_with_packet(10_000, 1_000, 5);
    let rt = Arc::new(rt);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let rt = Arc::clone(&rt);
            thread::spawn(move || {
                let who = Keypair::generate();
                let signed = SignedCall::sign(&who, 0, Call::Claim { packet_id: 0 }).unwrap();
                match rt.execute(&signed) {
                    Ok(_) => true,
                    Err(RuntimeError::Distributor(DistributorError::PacketExhausted(0))) => false,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            })
        })
        .collect();
    let paid = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(paid, 5);
    assert_eq!(rt.balance_of(&rt.distributor_address()), 0);
    assert_eq!(rt.packet(0).unwrap().remaining_shares(), 0);
    assert_eq!(rt.outstanding(), 0);
}
