//! Deposit cycle tests against in-memory SQLite and simulated hardware.

mod common;

use std::time::Duration;

use common::{harness, harness_with_failing_commit, interrupted_deposit, ACCOUNT};
use totem_core::{DepositState, DrawerStatus, EntryKind, ErrorKind};
use totem_engine::{EngineError, HwError, SimulatedHardware};

// =============================================================================
// Outcomes
// =============================================================================

#[tokio::test]
async fn light_load_is_rejected_and_returned() {
    let h = harness(SimulatedHardware::new().with_weights([2.0])).await;

    let tx = h.kiosk.run_deposit(ACCOUNT).await.unwrap();

    assert_eq!(tx.state, DepositState::Rejected);
    assert_eq!(tx.message, "below minimum weight");
    assert_eq!(tx.credits_awarded, None);
    assert!(!h.hw.is_locked());
    assert_eq!(h.hw.unlock_calls(), 1);
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 0);
    assert!(h.kiosk.get_history(ACCOUNT, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn minimum_weight_earns_one_credit() {
    let h = harness(SimulatedHardware::new().with_weights([3.4])).await;

    let tx = h.kiosk.run_deposit(ACCOUNT).await.unwrap();

    assert_eq!(tx.state, DepositState::Accepted);
    assert_eq!(tx.credits_awarded, Some(1));
    assert!(tx.ended_at.is_some());
    assert!(!h.hw.is_locked());

    let history = h.kiosk.get_history(ACCOUNT, None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, EntryKind::Earn);
    assert_eq!(history[0].credit_delta, 1);
    assert_eq!(history[0].transaction_id, tx.id);
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 1);
}

#[tokio::test]
async fn credits_round_down_to_whole_increments() {
    let h = harness(SimulatedHardware::new().with_weights([7.0])).await;

    let tx = h.kiosk.run_deposit(ACCOUNT).await.unwrap();

    assert_eq!(tx.credits_awarded, Some(2));
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 2);

    let status = h.kiosk.get_transaction_status(&tx.id).await.unwrap();
    assert_eq!(status.state, DepositState::Accepted);
    assert_eq!(status.weight_kg, Some(7.0));
    assert_eq!(status.credits_awarded, Some(2));
}

#[tokio::test]
async fn drawer_never_closed_times_out_and_unlocks() {
    let h = harness(SimulatedHardware::new().never_closes()).await;

    let err = h.kiosk.run_deposit(ACCOUNT).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }));

    let deposits = h.db.deposits().list_for_account(ACCOUNT, 10).await.unwrap();
    assert_eq!(deposits[0].state, DepositState::Failed);
    assert_eq!(deposits[0].error_kind, Some(ErrorKind::Timeout));
    assert!(!h.hw.is_locked());
    assert_eq!(h.hw.read_calls(), 0);
    assert!(h.kiosk.drawer_status().await.unwrap().is_idle());
}

#[tokio::test]
async fn persistent_scale_fault_fails_after_bounded_retries() {
    let h = harness(SimulatedHardware::new()).await;
    for _ in 0..10 {
        h.hw.push_read_error(HwError::Transient("unstable reading".into()));
    }

    let err = h.kiosk.run_deposit(ACCOUNT).await.unwrap_err();
    match err {
        EngineError::SensorFault { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected SensorFault, got {other:?}"),
    }

    assert_eq!(h.hw.read_calls(), 4);
    assert!(!h.hw.is_locked());
    let deposits = h.db.deposits().list_for_account(ACCOUNT, 10).await.unwrap();
    assert_eq!(deposits[0].error_kind, Some(ErrorKind::SensorFault));
}

#[tokio::test]
async fn transient_scale_noise_is_absorbed() {
    let h = harness(SimulatedHardware::new().with_default_weight(3.4)).await;
    h.hw.push_read_error(HwError::Transient("unstable reading".into()));

    let tx = h.kiosk.run_deposit(ACCOUNT).await.unwrap();
    assert_eq!(tx.state, DepositState::Accepted);
    assert_eq!(h.hw.read_calls(), 2);
}

#[tokio::test]
async fn ledger_failure_never_reports_accepted() {
    let h = harness_with_failing_commit(SimulatedHardware::new().with_weights([3.4])).await;

    let err = h.kiosk.run_deposit(ACCOUNT).await.unwrap_err();
    assert!(matches!(err, EngineError::LedgerWrite(_)));

    let deposits = h.db.deposits().list_for_account(ACCOUNT, 10).await.unwrap();
    assert_eq!(deposits[0].state, DepositState::Failed);
    assert_eq!(deposits[0].error_kind, Some(ErrorKind::LedgerWrite));
    assert_eq!(deposits[0].credits_awarded, None);
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 0);
    assert!(!h.hw.is_locked());
}

#[tokio::test]
async fn rejected_deposit_keeps_outcome_when_unlock_fails() {
    let h = harness(SimulatedHardware::new().with_weights([1.0])).await;
    h.hw.fail_unlock(HwError::Unavailable("actuator jammed".into()));

    let tx = h.kiosk.run_deposit(ACCOUNT).await.unwrap();
    assert_eq!(tx.state, DepositState::Rejected);
    assert!(tx.message.contains("drawer did not unlock"));

    let stored = h.kiosk.get_transaction_status(&tx.id).await.unwrap();
    assert_eq!(stored.message, tx.message);
}

#[tokio::test]
async fn lock_failure_surfaces_hardware_unavailable() {
    let h = harness(SimulatedHardware::new()).await;
    h.hw.fail_lock(HwError::Unavailable("actuator offline".into()));

    let err = h.kiosk.start_deposit(ACCOUNT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareUnavailable);
    assert!(h.kiosk.drawer_status().await.unwrap().is_idle());

    h.hw.clear_faults();
    h.hw.push_weight(3.4);
    assert!(h.kiosk.run_deposit(ACCOUNT).await.is_ok());
}

// =============================================================================
// Background Cycle & Mutual Exclusion
// =============================================================================

#[tokio::test]
async fn started_deposit_runs_in_background() {
    let hw = SimulatedHardware::new()
        .closes_after(Duration::from_millis(50))
        .with_weights([6.8]);
    let h = harness(hw).await;

    let id = h.kiosk.start_deposit(ACCOUNT).await.unwrap();

    let status = h.kiosk.get_transaction_status(&id).await.unwrap();
    assert!(!status.state.is_terminal());
    assert_eq!(
        h.kiosk.drawer_status().await.unwrap(),
        DrawerStatus::Busy {
            transaction_id: id.clone()
        }
    );

    let done = h
        .kiosk
        .await_transaction(&id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(done.state, DepositState::Accepted);
    assert_eq!(done.credits_awarded, Some(2));
    assert!(h.kiosk.drawer_status().await.unwrap().is_idle());
}

#[tokio::test]
async fn concurrent_starts_yield_one_deposit_and_one_busy() {
    let hw = SimulatedHardware::new()
        .with_lock_delay(Duration::from_millis(30))
        .with_weights([3.4]);
    let h = harness(hw).await;

    let (a, b) = tokio::join!(
        h.kiosk.start_deposit(ACCOUNT),
        h.kiosk.start_deposit("other-account")
    );

    let (winner, loser) = match (a, b) {
        (Ok(id), Err(e)) | (Err(e), Ok(id)) => (id, e),
        other => panic!("expected one success and one failure, got {other:?}"),
    };
    assert!(matches!(loser, EngineError::Busy { .. }));
    assert_eq!(h.hw.lock_calls(), 1);

    let done = h
        .kiosk
        .await_transaction(&winner, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(done.state.is_terminal());
}

#[tokio::test]
async fn new_deposit_allowed_after_terminal_state() {
    let h = harness(SimulatedHardware::new().with_weights([2.0, 3.4])).await;

    let first = h.kiosk.run_deposit(ACCOUNT).await.unwrap();
    let second = h.kiosk.run_deposit(ACCOUNT).await.unwrap();

    assert_eq!(first.state, DepositState::Rejected);
    assert_eq!(second.state, DepositState::Accepted);
    assert_ne!(first.id, second.id);
}

// =============================================================================
// Replay & Recovery
// =============================================================================

#[tokio::test]
async fn replaying_evaluation_credits_once() {
    let h = harness(SimulatedHardware::new()).await;
    let tx = interrupted_deposit(&h.db, DepositState::Evaluating, Some(7.0)).await;

    let first = h.kiosk.engine().resume(&tx.id).await.unwrap();
    let second = h.kiosk.engine().resume(&tx.id).await.unwrap();

    assert_eq!(first.state, DepositState::Accepted);
    assert_eq!(second.state, DepositState::Accepted);
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 2);
    assert_eq!(h.kiosk.get_history(ACCOUNT, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn recovery_finishes_interrupted_evaluation() {
    let h = harness(SimulatedHardware::new()).await;
    interrupted_deposit(&h.db, DepositState::Evaluating, Some(3.4)).await;

    let recovered = h.kiosk.recover().await.unwrap().unwrap();

    assert_eq!(recovered.state, DepositState::Accepted);
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 1);
    assert!(h.kiosk.drawer_status().await.unwrap().is_idle());
}

#[tokio::test]
async fn recovery_fails_interrupted_cycle_and_frees_drawer() {
    let h = harness(SimulatedHardware::new()).await;
    let tx = interrupted_deposit(&h.db, DepositState::AwaitingClose, None).await;

    assert!(!h.kiosk.drawer_status().await.unwrap().is_idle());
    let busy = h.kiosk.start_deposit(ACCOUNT).await.unwrap_err();
    assert!(matches!(busy, EngineError::Busy { transaction_id: Some(ref id), .. } if *id == tx.id));

    let recovered = h.kiosk.recover().await.unwrap().unwrap();
    assert_eq!(recovered.state, DepositState::Failed);
    assert_eq!(recovered.error_kind, Some(ErrorKind::Interrupted));
    assert_eq!(h.hw.unlock_calls(), 1);
    assert!(h.kiosk.drawer_status().await.unwrap().is_idle());
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 0);

    assert!(h.kiosk.recover().await.unwrap().is_none());
}
