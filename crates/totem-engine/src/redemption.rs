//! # Redemption Coordinator
//!
//! Spends credits and opens the drawer so the user can take a bottle of new oil.
//!
//! ## Flow
//! ```text
//! redeem(account, request_id)
//!      │
//!      ├── request already unlocked? ──────────────► return it (no spend)
//!      │
//!      ├── claim drawer slot
//!      ├── deposit active? ────────────────────────► ErrBusy
//!      │
//!      ├── ledger.spend(cost, request_id) ─────────► ErrInsufficientCredits
//!      │        (atomic, idempotent per request)        (no hardware call)
//!      ├── record RedemptionRequest
//!      │
//!      └── drawer.unlock()
//!               ├── ok ───► mark unlocked, return request
//!               └── err ──► record failure, ErrUnlockAfterSpend
//!                           (credit stays spent; retry with the same id)
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::drawer::Drawer;
use crate::error::{EngineError, EngineResult};
use crate::store::{CreditLedger, DepositStore, RedemptionStore};
use totem_core::validation::{validate_account_id, validate_credit_amount, validate_request_id};
use totem_core::{RedemptionRequest, ValidationError};

/// Description written on every SPEND entry.
const SPEND_DESCRIPTION: &str = "Redeemed for new oil";

/// Credit spend plus drawer unlock.
#[derive(Clone)]
pub struct RedemptionCoordinator {
    drawer: Arc<Drawer>,
    ledger: Arc<dyn CreditLedger>,
    deposits: Arc<dyn DepositStore>,
    redemptions: Arc<dyn RedemptionStore>,
    cost: i64,
}

impl RedemptionCoordinator {
    /// Creates a coordinator charging `cost` credits per redemption.
    pub fn new(
        drawer: Arc<Drawer>,
        ledger: Arc<dyn CreditLedger>,
        deposits: Arc<dyn DepositStore>,
        redemptions: Arc<dyn RedemptionStore>,
        cost: i64,
    ) -> EngineResult<Self> {
        validate_credit_amount(cost)?;

        Ok(RedemptionCoordinator {
            drawer,
            ledger,
            deposits,
            redemptions,
            cost,
        })
    }

    pub fn cost(&self) -> i64 {
        self.cost
    }

    /// Spends `cost` credits and unlocks the drawer.
    ///
    /// Replaying a `request_id` never spends twice: an unlocked request is
    /// returned as recorded, a request whose unlock failed gets another unlock
    /// attempt.
    pub async fn redeem(&self, account_id: &str, request_id: &str) -> EngineResult<RedemptionRequest> {
        validate_account_id(account_id)?;
        validate_request_id(request_id)?;

        let _slot = self.drawer.claim()?;

        let existing = self.redemptions.get(request_id).await?;
        if let Some(request) = &existing {
            ensure_owner(account_id, &request.account_id)?;
            if request.is_unlocked() {
                info!(request_id, account_id, "Redemption replayed");
                return Ok(request.clone());
            }
        }

        if let Some(active) = self.deposits.find_active(self.drawer.id()).await? {
            return Err(EngineError::Busy {
                drawer_id: self.drawer.id().to_string(),
                transaction_id: Some(active.id),
            });
        }

        let request = match existing {
            Some(pending) => {
                warn!(request_id, account_id, "Retrying unlock for a spent redemption");
                pending
            }
            None => {
                // A spend already committed under this id is returned, not repeated
                let entry = self
                    .ledger
                    .spend(account_id, self.cost, request_id, SPEND_DESCRIPTION)
                    .await?;
                ensure_owner(account_id, &entry.account_id)?;

                let request = RedemptionRequest::for_spend(request_id, &entry);
                self.redemptions.insert(&request).await?;
                info!(
                    request_id,
                    account_id,
                    credits = request.credits_spent,
                    "Credits spent"
                );
                request
            }
        };

        self.unlock_for(request).await
    }

    async fn unlock_for(&self, mut request: RedemptionRequest) -> EngineResult<RedemptionRequest> {
        match self.drawer.unlock().await {
            Ok(()) => {
                let at = Utc::now();
                if let Err(e) = self.redemptions.mark_unlocked(&request.id, at).await {
                    warn!(request_id = %request.id, error = %e, "Could not record unlock time");
                }
                request.unlocked_at = Some(at);
                info!(request_id = %request.id, drawer_id = %self.drawer.id(), "Drawer unlocked for redemption");
                Ok(request)
            }
            Err(failure) => {
                error!(
                    request_id = %request.id,
                    account_id = %request.account_id,
                    error = %failure,
                    "Drawer did not unlock after spend"
                );
                if let Err(e) = self
                    .redemptions
                    .record_unlock_failure(&request.id, &failure.to_string())
                    .await
                {
                    warn!(request_id = %request.id, error = %e, "Could not record unlock failure");
                }
                Err(EngineError::UnlockAfterSpend {
                    request_id: request.id,
                    message: failure.to_string(),
                })
            }
        }
    }
}

fn ensure_owner(account_id: &str, owner: &str) -> EngineResult<()> {
    if account_id != owner {
        return Err(ValidationError::InvalidFormat {
            field: "request_id".to_string(),
            reason: "already used by another account".to_string(),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
