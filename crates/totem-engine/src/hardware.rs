//! # Hardware Boundary
//!
//! The drawer lock actuator, the drawer-closed switch and the scale, behind
//! one async trait.
//!
//! ## Adapter Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      HardwareAdapter                                    │
//! │                                                                         │
//! │  lock()              → Ok | HwError     actuator engages                │
//! │  unlock()            → Ok | HwError     actuator releases               │
//! │  read_weight()       → kg | HwError     raw scale reading               │
//! │  is_drawer_closed()  → bool | HwError   pollable drawer-closed signal   │
//! │                                                                         │
//! │  HwError::Transient    → retried by Drawer (bounded, backoff)           │
//! │  HwError::Unavailable  → surfaced at once                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Adapters are raw: no timeouts, no retries. [`Drawer`](crate::drawer::Drawer)
//! adds both.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

// =============================================================================
// Error
// =============================================================================

/// Hardware call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HwError {
    /// Momentary fault (noisy reading, bus hiccup). Worth retrying.
    #[error("transient hardware fault: {0}")]
    Transient(String),

    /// Device offline or refusing commands.
    #[error("hardware unavailable: {0}")]
    Unavailable(String),
}

impl HwError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HwError::Transient(_))
    }
}

// =============================================================================
// Adapter Trait
// =============================================================================

/// One drawer's worth of hardware.
#[async_trait]
pub trait HardwareAdapter: Send + Sync {
    async fn lock(&self) -> Result<(), HwError>;

    async fn unlock(&self) -> Result<(), HwError>;

    /// Scale reading in kilograms.
    async fn read_weight(&self) -> Result<f64, HwError>;

    /// True once the user has pushed the drawer shut.
    async fn is_drawer_closed(&self) -> Result<bool, HwError>;
}

// =============================================================================
// Simulated Hardware
// =============================================================================

#[derive(Debug)]
struct SimState {
    locked: bool,
    locked_at: Option<Instant>,
    /// Delay after lock before the drawer reports closed. `None` = never.
    close_after: Option<Duration>,
    readings: VecDeque<Result<f64, HwError>>,
    default_weight_kg: f64,
    lock_fault: Option<HwError>,
    unlock_fault: Option<HwError>,
    lock_delay: Duration,
    unlock_delay: Duration,
    lock_calls: u32,
    unlock_calls: u32,
    read_calls: u32,
}

/// Scripted in-process hardware for the kiosk shell and for tests.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use totem_engine::hardware::SimulatedHardware;
///
/// // User needs half a second to close the drawer; first reading is 3.4 kg
/// let hw = SimulatedHardware::new()
///     .closes_after(Duration::from_millis(500))
///     .with_weights([3.4]);
/// assert!(!hw.is_locked());
/// ```
#[derive(Debug)]
pub struct SimulatedHardware {
    state: Mutex<SimState>,
}

impl SimulatedHardware {
    /// A drawer that closes as soon as it is locked and weighs 0 kg.
    pub fn new() -> Self {
        SimulatedHardware {
            state: Mutex::new(SimState {
                locked: false,
                locked_at: None,
                close_after: Some(Duration::ZERO),
                readings: VecDeque::new(),
                default_weight_kg: 0.0,
                lock_fault: None,
                unlock_fault: None,
                lock_delay: Duration::ZERO,
                unlock_delay: Duration::ZERO,
                lock_calls: 0,
                unlock_calls: 0,
                read_calls: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues scale readings, consumed one per `read_weight`.
    pub fn with_weights(self, weights: impl IntoIterator<Item = f64>) -> Self {
        self.state().readings.extend(weights.into_iter().map(Ok));
        self
    }

    /// Reading returned once the queue is empty.
    pub fn with_default_weight(self, kg: f64) -> Self {
        self.state().default_weight_kg = kg;
        self
    }

    /// Drawer-closed signal arrives `delay` after lock.
    pub fn closes_after(self, delay: Duration) -> Self {
        self.state().close_after = Some(delay);
        self
    }

    /// Drawer-closed signal never arrives.
    pub fn never_closes(self) -> Self {
        self.state().close_after = None;
        self
    }

    /// `lock()` sleeps this long before answering.
    pub fn with_lock_delay(self, delay: Duration) -> Self {
        self.state().lock_delay = delay;
        self
    }

    /// `unlock()` sleeps this long before answering.
    pub fn with_unlock_delay(self, delay: Duration) -> Self {
        self.state().unlock_delay = delay;
        self
    }

    pub fn push_weight(&self, kg: f64) {
        self.state().readings.push_back(Ok(kg));
    }

    pub fn push_read_error(&self, error: HwError) {
        self.state().readings.push_back(Err(error));
    }

    /// Every `lock()` fails with `error` until cleared.
    pub fn fail_lock(&self, error: HwError) {
        self.state().lock_fault = Some(error);
    }

    /// Every `unlock()` fails with `error` until cleared.
    pub fn fail_unlock(&self, error: HwError) {
        self.state().unlock_fault = Some(error);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.lock_fault = None;
        state.unlock_fault = None;
    }

    /// Simulates the user pushing the drawer shut now.
    pub fn close_now(&self) {
        self.state().close_after = Some(Duration::ZERO);
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    pub fn lock_calls(&self) -> u32 {
        self.state().lock_calls
    }

    pub fn unlock_calls(&self) -> u32 {
        self.state().unlock_calls
    }

    pub fn read_calls(&self) -> u32 {
        self.state().read_calls
    }
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareAdapter for SimulatedHardware {
    async fn lock(&self) -> Result<(), HwError> {
        let delay = {
            let mut state = self.state();
            state.lock_calls += 1;
            state.lock_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(fault) = state.lock_fault.clone() {
            return Err(fault);
        }
        state.locked = true;
        state.locked_at = Some(Instant::now());
        debug!("simulated drawer locked");
        Ok(())
    }

    async fn unlock(&self) -> Result<(), HwError> {
        let delay = {
            let mut state = self.state();
            state.unlock_calls += 1;
            state.unlock_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(fault) = state.unlock_fault.clone() {
            return Err(fault);
        }
        state.locked = false;
        state.locked_at = None;
        debug!("simulated drawer unlocked");
        Ok(())
    }

    async fn read_weight(&self) -> Result<f64, HwError> {
        let mut state = self.state();
        state.read_calls += 1;
        match state.readings.pop_front() {
            Some(reading) => reading,
            None => Ok(state.default_weight_kg),
        }
    }

    async fn is_drawer_closed(&self) -> Result<bool, HwError> {
        let state = self.state();
        let closed = match (state.locked_at, state.close_after) {
            (Some(at), Some(after)) => at.elapsed() >= after,
            _ => false,
        };
        Ok(closed)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
