//! Redemption and credit ledger tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{harness, ACCOUNT};
use totem_core::{DepositState, EntryKind, ErrorKind};
use totem_engine::{CreditLedger, EngineError, HardwareAdapter, HwError, SimulatedHardware};

#[tokio::test]
async fn redeem_spends_one_credit_and_unlocks() {
    let h = harness(SimulatedHardware::new()).await;
    CreditLedger::earn(&h.db, ACCOUNT, 1, "deposit-1", "Deposit of 3.400 kg")
        .await
        .unwrap();

    let request = h.kiosk.redeem(ACCOUNT).await.unwrap();

    assert!(request.is_unlocked());
    assert_eq!(request.credits_spent, 1);
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 0);
    assert_eq!(h.hw.unlock_calls(), 1);

    let history = h.kiosk.get_history(ACCOUNT, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, EntryKind::Spend);
    assert_eq!(history[0].credit_delta, -1);
    assert_eq!(history[0].id, request.ledger_entry_id);
}

#[tokio::test]
async fn redeem_without_credits_leaves_drawer_locked() {
    let h = harness(SimulatedHardware::new()).await;
    h.hw.lock().await.unwrap();

    let err = h.kiosk.redeem(ACCOUNT).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::InsufficientCredits {
            balance: 0,
            requested: 1
        }
    ));
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 0);
    assert!(h.kiosk.get_history(ACCOUNT, None).await.unwrap().is_empty());
    assert!(h.hw.is_locked());
    assert_eq!(h.hw.unlock_calls(), 0);
}

#[tokio::test]
async fn unlock_failure_after_spend_is_not_refunded() {
    let h = harness(SimulatedHardware::new()).await;
    CreditLedger::earn(&h.db, ACCOUNT, 1, "deposit-1", "deposit")
        .await
        .unwrap();
    h.hw.fail_unlock(HwError::Unavailable("actuator jammed".into()));

    let err = h
        .kiosk
        .redeem_with_id(ACCOUNT, "req-jammed")
        .await
        .unwrap_err();

    match &err {
        EngineError::UnlockAfterSpend { request_id, .. } => assert_eq!(request_id, "req-jammed"),
        other => panic!("expected UnlockAfterSpend, got {other:?}"),
    }
    assert!(!err.is_retryable());
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 0);

    let pending = h.db.redemptions().list_pending_unlock().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "req-jammed");
}

#[tokio::test]
async fn redeem_is_refused_while_a_deposit_is_active() {
    let h = harness(SimulatedHardware::new().never_closes()).await;
    CreditLedger::earn(&h.db, ACCOUNT, 1, "deposit-0", "deposit")
        .await
        .unwrap();

    let id = h.kiosk.start_deposit(ACCOUNT).await.unwrap();
    let err = h.kiosk.redeem(ACCOUNT).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Busy);
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 1);

    let done = h
        .kiosk
        .await_transaction(&id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(done.state, DepositState::Failed);
    assert!(h.kiosk.redeem(ACCOUNT).await.is_ok());
}

#[tokio::test]
async fn retry_with_request_id_after_lost_record_spends_once() {
    let h = harness(SimulatedHardware::new()).await;
    CreditLedger::earn(&h.db, ACCOUNT, 2, "deposit-0", "deposit")
        .await
        .unwrap();

    // First attempt spent, then failed before the request was recorded
    CreditLedger::spend(&h.db, ACCOUNT, 1, "req-retry", "Redeemed for new oil")
        .await
        .unwrap();
    assert_eq!(h.hw.unlock_calls(), 0);

    let request = h.kiosk.redeem_with_id(ACCOUNT, "req-retry").await.unwrap();

    assert!(request.is_unlocked());
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 1);
    assert_eq!(h.hw.unlock_calls(), 1);
}

#[tokio::test]
async fn deposit_is_refused_while_a_redemption_unlocks() {
    let h = harness(SimulatedHardware::new().with_unlock_delay(Duration::from_millis(150))).await;
    CreditLedger::earn(&h.db, ACCOUNT, 1, "deposit-0", "deposit")
        .await
        .unwrap();

    let kiosk = h.kiosk.clone();
    let redemption = tokio::spawn(async move { kiosk.redeem(ACCOUNT).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = h.kiosk.start_deposit("other-account").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Busy {
            transaction_id: None,
            ..
        }
    ));
    assert_eq!(h.hw.lock_calls(), 0);

    let request = redemption.await.unwrap().unwrap();
    assert!(request.is_unlocked());
    assert!(h.kiosk.drawer_status().await.unwrap().is_idle());
}

#[tokio::test]
async fn concurrent_redeems_never_overdraw() {
    let h = harness(SimulatedHardware::new()).await;
    CreditLedger::earn(&h.db, ACCOUNT, 1, "deposit-1", "deposit")
        .await
        .unwrap();

    let (a, b) = tokio::join!(h.kiosk.redeem(ACCOUNT), h.kiosk.redeem(ACCOUNT));

    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 0);
}

#[tokio::test]
async fn concurrent_ledger_spends_never_overdraw() {
    let h = harness(SimulatedHardware::new()).await;
    let ledger: Arc<dyn CreditLedger> = Arc::new(h.db.clone());
    ledger.earn(ACCOUNT, 1, "deposit-1", "deposit").await.unwrap();

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let request_id = format!("req-{i}");
                ledger.spend(ACCOUNT, 1, &request_id, "redeem").await
            })
        })
        .collect();

    let mut spent = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => spent += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::InsufficientCredits),
        }
    }

    assert_eq!(spent, 1);
    assert_eq!(ledger.balance(ACCOUNT).await.unwrap(), 0);
}

#[tokio::test]
async fn deposit_then_redeem_until_empty() {
    let h = harness(SimulatedHardware::new().with_weights([7.0])).await;

    let tx = h.kiosk.run_deposit(ACCOUNT).await.unwrap();
    assert_eq!(tx.credits_awarded, Some(2));

    h.kiosk.redeem(ACCOUNT).await.unwrap();
    h.kiosk.redeem(ACCOUNT).await.unwrap();
    let err = h.kiosk.redeem(ACCOUNT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientCredits);

    let kinds: Vec<EntryKind> = h
        .kiosk
        .get_history(ACCOUNT, None)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(kinds, vec![EntryKind::Spend, EntryKind::Spend, EntryKind::Earn]);
    assert_eq!(h.kiosk.get_balance(ACCOUNT).await.unwrap(), 0);
}
