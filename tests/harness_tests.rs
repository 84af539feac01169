//! Tests for the harness, ledger session and configuration

use std::io::Write;

use rand::rngs::StdRng;
use rand::SeedableRng;
use script_contracts::config::HarnessConfig;
use script_contracts::contract::{
    CoinToss, CoinTossChoice, PayToKey, SpendTiming, SpendingContract, WinningPlayer,
};
use script_contracts::harness::ScriptHarness;
use script_contracts::keys::{KeyProvider, Secp256k1Provider};
use script_contracts::ledger::{InMemoryLedger, LedgerClient};
use script_contracts::{ContractError, Script, Transaction, VerifyOutcome};

fn create_test_ledger(balance: i64) -> InMemoryLedger {
    let _ = env_logger::builder().is_test(true).try_init();
    let receive = Secp256k1Provider::new().generate_key_pair(&mut StdRng::seed_from_u64(77));
    InMemoryLedger::new(balance, receive.public_key())
}

#[test]
fn test_funding_beyond_balance() {
    let mut ledger = create_test_ledger(500_000);
    let mut harness = ScriptHarness::new(&mut ledger, HarnessConfig::default()).unwrap();
    let contract = PayToKey::new(harness.provider(), &mut StdRng::seed_from_u64(1));

    match harness.execute(&contract, 500_001) {
        Err(ContractError::InsufficientFunds { needed, available }) => {
            assert_eq!(needed, 500_001);
            assert_eq!(available, 500_000);
        }
        other => panic!("expected InsufficientFunds, got {:?}", other.map(|r| r.outcome)),
    }
}

#[test]
fn test_funding_below_fee() {
    let mut ledger = create_test_ledger(10_000_000);
    let mut harness = ScriptHarness::new(&mut ledger, HarnessConfig::default()).unwrap();
    let contract = PayToKey::new(harness.provider(), &mut StdRng::seed_from_u64(2));
    assert!(matches!(
        harness.execute(&contract, 150_000),
        Err(ContractError::InsufficientFunds { .. })
    ));
}

#[test]
fn test_dropping_harness_closes_session() {
    let mut ledger = create_test_ledger(10_000_000);
    {
        let mut harness = ScriptHarness::new(&mut ledger, HarnessConfig::default()).unwrap();
        let contract = PayToKey::new(harness.provider(), &mut StdRng::seed_from_u64(3));
        // Early return through `?` still releases the session
        let result = harness.execute(&contract, i64::MAX);
        assert!(result.is_err());
    }
    assert!(ledger.is_closed());
    let empty = Transaction {
        version: 1,
        inputs: vec![],
        outputs: vec![],
        lock_time: 0,
    };
    assert!(matches!(ledger.broadcast(&empty), Err(ContractError::Ledger(_))));
}

#[test]
fn test_rejected_spends_leave_balance_untouched() {
    let mut ledger = create_test_ledger(10_000_000);
    {
        let mut harness = ScriptHarness::new(&mut ledger, HarnessConfig::default()).unwrap();
        for seed in 0..3 {
            let toss = CoinToss::new(
                harness.provider(),
                &mut StdRng::seed_from_u64(30 + seed),
                CoinTossChoice::Zero,
                CoinTossChoice::Zero,
                WinningPlayer::Head,
            );
            let report = harness.run(&toss).unwrap();
            assert!(!report.outcome.is_accepted());
        }
    }
    assert_eq!(ledger.balance(), 10_000_000);
    assert!(ledger.broadcasts().is_empty());
}

#[test]
fn test_accepted_spend_debits_funding() {
    let mut ledger = create_test_ledger(10_000_000);
    {
        let mut harness = ScriptHarness::new(&mut ledger, HarnessConfig::default()).unwrap();
        let contract = PayToKey::new(harness.provider(), &mut StdRng::seed_from_u64(6));
        assert!(harness.execute(&contract, 2_500_000).unwrap().outcome.is_accepted());
    }
    assert_eq!(ledger.balance(), 7_500_000);
}

#[test]
fn test_manual_flow_matches_execute() {
    let mut ledger = create_test_ledger(10_000_000);
    let mut harness = ScriptHarness::new(&mut ledger, HarnessConfig::default()).unwrap();
    let contract = PayToKey::new(harness.provider(), &mut StdRng::seed_from_u64(4));

    let locking = contract.locking_script().unwrap();
    let funded = harness.create_funding_output(&locking, 1_000_000).unwrap();
    let destination = harness.receive_script().unwrap();
    let mut tx = harness
        .create_spending_skeleton(&funded, &destination, SpendTiming::default())
        .unwrap();

    let unlocking = contract.unlocking_script(harness.provider(), &tx, 0).unwrap();
    tx.inputs[0].script_sig = unlocking.to_bytes();
    assert_eq!(
        harness.verify(&unlocking, &locking, &tx, 0).unwrap(),
        VerifyOutcome::Accepted
    );

    // Changing the output after signing invalidates the signature
    tx.outputs[0].value -= 1;
    assert!(!harness.verify(&unlocking, &locking, &tx, 0).unwrap().is_accepted());
}

#[test]
fn test_config_from_file() {
    let path = std::env::temp_dir().join(format!("harness-config-{}.json", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{ "fee": 50000, "funding_amount": 250000 }}"#).unwrap();
    }
    let config = HarnessConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.fee, 50_000);
    assert_eq!(config.funding_amount, 250_000);

    let mut ledger = create_test_ledger(10_000_000);
    let mut harness = ScriptHarness::new(&mut ledger, config).unwrap();
    let contract = PayToKey::new(harness.provider(), &mut StdRng::seed_from_u64(5));
    let report = harness.run(&contract).unwrap();
    assert!(report.outcome.is_accepted());
    assert_eq!(report.spending.outputs[0].value, 200_000);
}

#[test]
fn test_timing_reaches_skeleton() {
    let mut ledger = create_test_ledger(10_000_000);
    let mut harness = ScriptHarness::new(&mut ledger, HarnessConfig::default()).unwrap();
    let locking = Script::from_bytes(vec![0x51]);
    let funded = harness.create_funding_output(&locking, 1_000_000).unwrap();
    let timing = SpendTiming {
        lock_time: 1_500_000_000,
        sequence: 0xfffffffe,
    };
    let tx = harness
        .create_spending_skeleton(&funded, &locking, timing)
        .unwrap();
    assert_eq!(tx.lock_time, 1_500_000_000);
    assert_eq!(tx.inputs[0].sequence, 0xfffffffe);
}
