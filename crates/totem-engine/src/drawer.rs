//! # Drawer
//!
//! Wraps a raw [`HardwareAdapter`] with everything the engine needs to call it
//! safely: per-call timeouts, bounded retries of transient faults with
//! exponential backoff, drawer-closed polling and the per-drawer slot.
//!
//! ## Call Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  drawer.read_weight()                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  attempt 1 ── timeout(call_timeout, hw.read_weight()) ──► Ok(kg)        │
//! │       │                                                      │          │
//! │       │ Transient / call timed out                           ▼          │
//! │       ▼                                              Weight::from_kg    │
//! │  sleep(backoff: 100ms, 200ms, 400ms … ≤ max_backoff)                    │
//! │       │                                                                 │
//! │  attempt 2 … attempt 1 + max_retries                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  HwFailure { attempts, error }                                          │
//! │                                                                         │
//! │  Unavailable → no retry, HwFailure at once                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Slot
//! Checking "is this drawer idle?" and creating a transaction must not
//! interleave with another caller doing the same. The slot is a
//! `tokio::sync::Mutex<()>` held only around that check-then-create (and
//! around a redemption). Claiming never waits: a held slot means busy. The persisted non-terminal transaction, not the
//! slot, is what keeps the drawer busy for the rest of a deposit.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::hardware::{HardwareAdapter, HwError};
use totem_core::Weight;

// =============================================================================
// Timeouts
// =============================================================================

/// Timing knobs for one drawer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawerTimeouts {
    /// How long AWAITING_CLOSE may last.
    pub close_timeout: Duration,
    /// Interval between drawer-closed polls.
    pub poll_interval: Duration,
    /// Bound on every single hardware call.
    pub call_timeout: Duration,
    /// Retries after the first attempt for transient faults.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for DrawerTimeouts {
    fn default() -> Self {
        DrawerTimeouts {
            close_timeout: Duration::from_secs(90),
            poll_interval: Duration::from_millis(250),
            call_timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
        }
    }
}

/// A hardware call that failed for good.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed after {attempts} attempt(s): {error}")]
pub struct HwFailure {
    pub operation: &'static str,
    pub attempts: u32,
    pub error: HwError,
}

// =============================================================================
// Drawer
// =============================================================================

/// One physical drawer and its hardware.
pub struct Drawer {
    id: String,
    hardware: Arc<dyn HardwareAdapter>,
    timeouts: DrawerTimeouts,
    slot: Mutex<()>,
}

impl std::fmt::Debug for Drawer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drawer")
            .field("id", &self.id)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Drawer {
    pub fn new(
        id: impl Into<String>,
        hardware: Arc<dyn HardwareAdapter>,
        timeouts: DrawerTimeouts,
    ) -> Self {
        Drawer {
            id: id.into(),
            hardware,
            timeouts,
            slot: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timeouts(&self) -> &DrawerTimeouts {
        &self.timeouts
    }

    /// Takes exclusive use of the drawer's check-then-act section.
    ///
    /// Never queues: while another caller holds the slot (a deposit being
    /// created, a redemption unlocking) this returns `EngineError::Busy`.
    pub fn claim(&self) -> EngineResult<MutexGuard<'_, ()>> {
        self.slot.try_lock().map_err(|_| {
            debug!(drawer_id = %self.id, "Drawer slot already held");
            EngineError::Busy {
                drawer_id: self.id.clone(),
                transaction_id: None,
            }
        })
    }

    pub async fn lock(&self) -> Result<(), HwFailure> {
        let hw = &self.hardware;
        self.with_retries("lock", || hw.lock()).await
    }

    pub async fn unlock(&self) -> Result<(), HwFailure> {
        let hw = &self.hardware;
        self.with_retries("unlock", || hw.unlock()).await
    }

    /// Reads the scale, rejecting NaN and negative readings as transient noise.
    pub async fn read_weight(&self) -> Result<Weight, HwFailure> {
        let hw = &self.hardware;
        self.with_retries("read_weight", || async move {
            let kg = hw.read_weight().await?;
            Weight::from_kg(kg).map_err(|e| HwError::Transient(e.to_string()))
        })
        .await
    }

    /// Polls the drawer-closed signal until it is set or `close_timeout` passes.
    ///
    /// ## Returns
    /// - `Ok(true)` closed
    /// - `Ok(false)` timed out
    /// - `Err` the switch is unavailable
    pub async fn wait_closed(&self) -> Result<bool, HwFailure> {
        let poll = async {
            loop {
                let hw = &self.hardware;
                match self.with_retries("is_drawer_closed", || hw.is_drawer_closed()).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(failure) if failure.error.is_transient() => {
                        warn!(drawer_id = %self.id, error = %failure, "Drawer-closed poll failed, polling again");
                    }
                    Err(failure) => return Err(failure),
                }
                tokio::time::sleep(self.timeouts.poll_interval).await;
            }
        };

        match tokio::time::timeout(self.timeouts.close_timeout, poll).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(failure)) => Err(failure),
            Err(_) => Ok(false),
        }
    }

    /// Unlock whose failure is logged, not returned.
    pub async fn best_effort_unlock(&self) -> bool {
        match self.unlock().await {
            Ok(()) => true,
            Err(failure) => {
                warn!(drawer_id = %self.id, error = %failure, "Best-effort unlock failed");
                false
            }
        }
    }

    async fn with_retries<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, HwFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HwError>>,
    {
        let mut backoff = self.create_backoff();
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let result = match tokio::time::timeout(self.timeouts.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(HwError::Transient(format!(
                    "no answer within {:?}",
                    self.timeouts.call_timeout
                ))),
            };

            match result {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(drawer_id = %self.id, operation, attempts, "Hardware call recovered");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_transient() && attempts <= self.timeouts.max_retries => {
                    let delay = backoff.next_backoff().unwrap_or(self.timeouts.max_backoff);
                    warn!(
                        drawer_id = %self.id,
                        operation,
                        attempt = attempts,
                        ?delay,
                        %error,
                        "Transient hardware fault, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(HwFailure {
                        operation,
                        attempts,
                        error,
                    })
                }
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.timeouts.initial_backoff,
            max_interval: self.timeouts.max_backoff,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        // current_interval starts at the crate default otherwise
        backoff.reset();
        backoff
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedHardware;

    fn fast() -> DrawerTimeouts {
        DrawerTimeouts {
            close_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
            call_timeout: Duration::from_millis(200),
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    fn drawer(hw: &Arc<SimulatedHardware>) -> Drawer {
        Drawer::new("drawer-1", hw.clone(), fast())
    }

    #[tokio::test]
    async fn test_transient_reads_are_retried() {
        let hw = Arc::new(SimulatedHardware::new().with_default_weight(3.4));
        hw.push_read_error(HwError::Transient("noise".into()));
        hw.push_read_error(HwError::Transient("noise".into()));

        let weight = drawer(&hw).read_weight().await.unwrap();
        assert_eq!(weight.grams(), 3_400);
        assert_eq!(hw.read_calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let hw = Arc::new(SimulatedHardware::new());
        for _ in 0..10 {
            hw.push_read_error(HwError::Transient("noise".into()));
        }

        let failure = drawer(&hw).read_weight().await.unwrap_err();
        assert_eq!(failure.attempts, 4);
        assert_eq!(hw.read_calls(), 4);
    }

    #[tokio::test]
    async fn test_invalid_reading_counts_as_transient() {
        let hw = Arc::new(SimulatedHardware::new().with_weights([f64::NAN, 7.0]));
        let weight = drawer(&hw).read_weight().await.unwrap();
        assert_eq!(weight.grams(), 7_000);
    }

    #[tokio::test]
    async fn test_unavailable_is_not_retried() {
        let hw = Arc::new(SimulatedHardware::new());
        hw.fail_lock(HwError::Unavailable("offline".into()));

        let failure = drawer(&hw).lock().await.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(hw.lock_calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let hw = Arc::new(SimulatedHardware::new().with_lock_delay(Duration::from_secs(5)));
        let timeouts = DrawerTimeouts {
            call_timeout: Duration::from_millis(20),
            max_retries: 1,
            ..fast()
        };
        let drawer = Drawer::new("drawer-1", hw.clone(), timeouts);

        let failure = drawer.lock().await.unwrap_err();
        assert!(failure.error.is_transient());
        assert_eq!(failure.attempts, 2);
    }

    #[tokio::test]
    async fn test_wait_closed() {
        let hw = Arc::new(SimulatedHardware::new().closes_after(Duration::from_millis(20)));
        let drawer = drawer(&hw);
        drawer.lock().await.unwrap();
        assert!(drawer.wait_closed().await.unwrap());

        let hw = Arc::new(SimulatedHardware::new().never_closes());
        let drawer = Drawer::new("drawer-1", hw.clone(), fast());
        drawer.lock().await.unwrap();
        assert!(!drawer.wait_closed().await.unwrap());
    }

    #[tokio::test]
    async fn test_best_effort_unlock_swallows_failure() {
        let hw = Arc::new(SimulatedHardware::new());
        hw.fail_unlock(HwError::Unavailable("jammed".into()));
        assert!(!drawer(&hw).best_effort_unlock().await);
    }
}
