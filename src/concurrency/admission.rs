//! Per-host admission gate
//!
//! Bounds the number of API calls in flight against one registry host. The
//! cap is a tokio [`Semaphore`] sized to the host's `max_connections`, so it
//! holds structurally; the bookkeeping counters (in-flight, completed, last
//! completion) live under one host-scoped mutex and are only touched by
//! [`AdmissionGate::admit`] and [`AdmissionGuard`]'s drop.
//!
//! An optional watchdog covers the case where permits leak anyway: a waiter
//! that sees no call complete for longer than the stall window replaces the
//! semaphore with a fresh one and zeroes the in-flight count. Guards issued
//! before the reset belong to the old generation and leave the new counters
//! alone.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Snapshot of a host's admission counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionStats {
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub completed: u64,
    pub resets: u64,
}

#[derive(Debug)]
struct AdmissionState {
    semaphore: Arc<Semaphore>,
    generation: u64,
    in_flight: usize,
    peak_in_flight: usize,
    completed: u64,
    last_completed: Instant,
    resets: u64,
}

#[derive(Debug)]
pub struct AdmissionGate {
    host: String,
    max_connections: usize,
    poll_interval: Duration,
    watchdog: Option<Duration>,
    state: Mutex<AdmissionState>,
}

impl AdmissionGate {
    pub fn new(
        host: impl Into<String>,
        max_connections: usize,
        poll_interval: Duration,
        watchdog: Option<Duration>,
    ) -> Arc<Self> {
        let max_connections = max_connections.max(1);
        Arc::new(Self {
            host: host.into(),
            max_connections,
            poll_interval,
            watchdog,
            state: Mutex::new(AdmissionState {
                semaphore: Arc::new(Semaphore::new(max_connections)),
                generation: 0,
                in_flight: 0,
                peak_in_flight: 0,
                completed: 0,
                last_completed: Instant::now(),
                resets: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        // Counters stay consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until a slot is free, then take it
    ///
    /// `action` only labels the debug lines emitted while waiting.
    pub async fn admit(self: &Arc<Self>, action: &str) -> AdmissionGuard {
        loop {
            let (semaphore, generation) = {
                let state = self.lock();
                (Arc::clone(&state.semaphore), state.generation)
            };

            if semaphore.available_permits() == 0 {
                tracing::debug!(
                    host = %self.host,
                    action,
                    "too many connections, waiting for a free slot"
                );
            }

            // Without a watchdog the waiter keeps its place in the semaphore queue.
            let acquired = match self.watchdog {
                None => semaphore.acquire_owned().await.ok(),
                Some(_) => tokio::time::timeout(self.poll_interval, semaphore.acquire_owned())
                    .await
                    .ok()
                    .and_then(|permit| permit.ok()),
            };

            match acquired {
                Some(permit) => {
                    let mut state = self.lock();
                    if state.generation != generation {
                        // Reset happened while we waited; retry on the new semaphore.
                        continue;
                    }
                    state.in_flight += 1;
                    state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
                    tracing::debug!(
                        host = %self.host,
                        queue = state.in_flight,
                        max = self.max_connections,
                        action,
                        "admitted"
                    );
                    return AdmissionGuard {
                        gate: Arc::clone(self),
                        generation,
                        _permit: permit,
                    };
                }
                None => self.check_watchdog(generation),
            }
        }
    }

    fn check_watchdog(&self, generation: u64) {
        let Some(stall) = self.watchdog else {
            return;
        };
        let mut state = self.lock();
        if state.generation != generation || state.last_completed.elapsed() <= stall {
            return;
        }
        tracing::warn!(
            host = %self.host,
            in_flight = state.in_flight,
            stalled_secs = state.last_completed.elapsed().as_secs(),
            "no call completed within the watchdog window, resetting admission counter"
        );
        state.semaphore = Arc::new(Semaphore::new(self.max_connections));
        state.generation += 1;
        state.in_flight = 0;
        state.resets += 1;
        state.last_completed = Instant::now();
    }

    /// Record a finished call; returns the new completed total when the
    /// guard belongs to the current generation
    fn release(&self, generation: u64) -> Option<u64> {
        let mut state = self.lock();
        if state.generation != generation {
            return None;
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        state.completed += 1;
        state.last_completed = Instant::now();
        Some(state.completed)
    }

    pub fn stats(&self) -> AdmissionStats {
        let state = self.lock();
        AdmissionStats {
            in_flight: state.in_flight,
            peak_in_flight: state.peak_in_flight,
            completed: state.completed,
            resets: state.resets,
        }
    }
}

/// Slot held for the duration of one call
#[derive(Debug)]
pub struct AdmissionGuard {
    gate: Arc<AdmissionGate>,
    generation: u64,
    _permit: OwnedSemaphorePermit,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if let Some(completed) = self.gate.release(self.generation) {
            if completed % 10 == 0 {
                tracing::info!(host = %self.gate.host, "completed {} api calls", completed);
            }
        }
    }
}
