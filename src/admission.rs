//! Job Admission Controller
//!
//! Bounds how many recognizer invocations run at once. Callers beyond the
//! limit wait in a FIFO queue and are woken one by one as slots free up.
//!
//! A released slot is handed directly to the head waiter inside the same
//! critical section, so the running count never dips while jobs are waiting
//! and no later arrival can overtake a queued one. Slots are RAII guards:
//! dropping an [`AdmissionSlot`] releases it, whichever way the job ended.
//!
//! The state lives behind a `std::sync::Mutex`. Critical sections are short
//! and never cross an `.await`, which also lets the guards release from `Drop`.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::config::AdmissionConfig;

/// Admission failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The wait queue reached its configured depth
    #[error("Too many jobs waiting ({0}), try again later")]
    QueueFull(usize),
    /// The same job id is already waiting
    #[error("Job {0} is already waiting for admission")]
    AlreadyQueued(String),
    /// The grant channel closed without a slot being handed over
    #[error("Admission grant for job {0} was lost")]
    GrantLost(String),
}

/// A caller waiting for a slot
struct Waiter {
    job_id: String,
    ticket: u64,
    grant: oneshot::Sender<()>,
}

/// Internal state of the controller
struct AdmissionState {
    /// Slots currently held
    running: usize,
    /// Callers waiting for a slot, oldest first
    waiters: VecDeque<Waiter>,
    next_ticket: u64,
}

/// Point-in-time view of the controller, used by the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionSnapshot {
    pub max_concurrent: usize,
    pub running: usize,
    pub queued: usize,
    /// 0 means unbounded
    pub max_queue_depth: usize,
}

/// Process-wide gate in front of the recognizer
pub struct AdmissionController {
    max_concurrent: usize,
    max_queue_depth: usize,
    state: Mutex<AdmissionState>,
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig) -> Arc<Self> {
        Self::with_limits(config.max_concurrent, config.max_queue_depth)
    }

    /// `max_concurrent` is clamped to at least one; a `max_queue_depth` of 0
    /// leaves the queue unbounded.
    pub fn with_limits(max_concurrent: usize, max_queue_depth: usize) -> Arc<Self> {
        let max_concurrent = max_concurrent.max(1);
        info!(
            "Admission controller: {} concurrent job(s), queue depth {}",
            max_concurrent,
            if max_queue_depth == 0 {
                "unbounded".to_string()
            } else {
                max_queue_depth.to_string()
            }
        );
        Arc::new(Self {
            max_concurrent,
            max_queue_depth,
            state: Mutex::new(AdmissionState {
                running: 0,
                waiters: VecDeque::new(),
                next_ticket: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        // The state stays consistent even if a holder panicked: every
        // critical section is a handful of field updates.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Waits until a slot is free and takes it.
    ///
    /// Returns immediately when capacity is available. Otherwise the caller is
    /// queued behind every earlier waiter and suspended until a slot is handed
    /// to it. Dropping the returned future while queued removes the caller from
    /// the queue; if a slot had already been handed over it is released again.
    pub async fn acquire(self: &Arc<Self>, job_id: &str) -> Result<AdmissionSlot, AdmissionError> {
        let (ticket, rx, position) = {
            let mut state = self.lock();

            if state.running < self.max_concurrent && state.waiters.is_empty() {
                state.running += 1;
                debug!(
                    "Job {} admitted immediately ({}/{})",
                    job_id, state.running, self.max_concurrent
                );
                return Ok(AdmissionSlot::new(Arc::clone(self), job_id));
            }

            if state.waiters.iter().any(|w| w.job_id == job_id) {
                return Err(AdmissionError::AlreadyQueued(job_id.to_string()));
            }

            if self.max_queue_depth > 0 && state.waiters.len() >= self.max_queue_depth {
                warn!(
                    "Rejecting job {}: {} job(s) already waiting",
                    job_id,
                    state.waiters.len()
                );
                return Err(AdmissionError::QueueFull(state.waiters.len()));
            }

            let (tx, rx) = oneshot::channel();
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.waiters.push_back(Waiter {
                job_id: job_id.to_string(),
                ticket,
                grant: tx,
            });
            (ticket, rx, state.waiters.len())
        };

        info!("Job {} queued for admission at position {}", job_id, position);

        let mut pending = PendingAdmission {
            controller: self.as_ref(),
            ticket,
            rx,
            settled: false,
        };

        let granted = (&mut pending.rx).await;
        pending.settled = true;

        match granted {
            Ok(()) => {
                debug!("Job {} admitted from queue", job_id);
                Ok(AdmissionSlot::new(Arc::clone(self), job_id))
            }
            Err(_) => Err(AdmissionError::GrantLost(job_id.to_string())),
        }
    }

    /// Gives a slot back: the head waiter inherits it, otherwise the running
    /// count drops. Must be called with the lock held.
    fn release_locked(state: &mut AdmissionState) -> Option<String> {
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.grant.send(()).is_ok() {
                return Some(waiter.job_id);
            }
            // receiver gone without withdrawing; try the next one
            debug!("Skipping abandoned waiter {}", waiter.job_id);
        }
        state.running = state.running.saturating_sub(1);
        None
    }

    fn release(&self, job_id: &str) {
        let mut state = self.lock();
        match Self::release_locked(&mut state) {
            Some(next) => debug!("Job {} released its slot to job {}", job_id, next),
            None => debug!(
                "Job {} released its slot ({}/{})",
                job_id, state.running, self.max_concurrent
            ),
        }
    }

    /// Slots currently held
    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Callers currently waiting
    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    /// 1-based position of a waiting job, `None` if it is not waiting
    pub fn queue_position(&self, job_id: &str) -> Option<usize> {
        self.lock()
            .waiters
            .iter()
            .position(|w| w.job_id == job_id)
            .map(|p| p + 1)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn snapshot(&self) -> AdmissionSnapshot {
        let state = self.lock();
        AdmissionSnapshot {
            max_concurrent: self.max_concurrent,
            running: state.running,
            queued: state.waiters.len(),
            max_queue_depth: self.max_queue_depth,
        }
    }
}

/// Withdraws a waiter whose `acquire` future is dropped before completing.
struct PendingAdmission<'a> {
    controller: &'a AdmissionController,
    ticket: u64,
    rx: oneshot::Receiver<()>,
    settled: bool,
}

impl Drop for PendingAdmission<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.controller.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.ticket == self.ticket) {
            state.waiters.remove(pos);
            debug!("Withdrew abandoned admission request (ticket {})", self.ticket);
        } else {
            // `rx` is still alive, so the slot was handed to us: pass it on
            let next = AdmissionController::release_locked(&mut state);
            debug!(
                "Returned slot granted to abandoned request (ticket {}), next: {:?}",
                self.ticket, next
            );
        }
    }
}

/// Permission to run one recognizer invocation.
///
/// Released exactly once, either by [`AdmissionSlot::release`] or on drop.
pub struct AdmissionSlot {
    controller: Arc<AdmissionController>,
    job_id: String,
    released: bool,
}

impl AdmissionSlot {
    fn new(controller: Arc<AdmissionController>, job_id: &str) -> Self {
        Self {
            controller,
            job_id: job_id.to_string(),
            released: false,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Releases the slot now rather than at end of scope
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.controller.release(&self.job_id);
        }
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn admits_immediately_below_capacity() {
        let controller = AdmissionController::with_limits(2, 0);

        let a = controller.acquire("a").await.unwrap();
        let b = controller.acquire("b").await.unwrap();
        assert_eq!(controller.running(), 2);
        assert_eq!(controller.queued(), 0);

        drop(a);
        b.release();
        assert_eq!(controller.running(), 0);
    }

    #[tokio::test]
    async fn never_exceeds_max_concurrent() {
        let controller = AdmissionController::with_limits(3, 0);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..12 {
            let controller = Arc::clone(&controller);
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _slot = controller.acquire(&format!("job-{}", i)).await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(15)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(controller.running(), 0);
        assert_eq!(controller.queued(), 0);
    }

    #[tokio::test]
    async fn waiters_are_admitted_in_arrival_order() {
        let controller = AdmissionController::with_limits(1, 0);
        let order = Arc::new(Mutex::new(Vec::new()));
        let blocker = controller.acquire("blocker").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..5 {
            let task_controller = Arc::clone(&controller);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let slot = task_controller.acquire(&format!("job-{}", i)).await.unwrap();
                order.lock().unwrap().push(i);
                tokio::time::sleep(Duration::from_millis(2)).await;
                drop(slot);
            }));
            let c = Arc::clone(&controller);
            wait_until(move || c.queued() == i + 1).await;
        }

        assert_eq!(controller.queue_position("job-0"), Some(1));
        assert_eq!(controller.queue_position("job-4"), Some(5));

        drop(blocker);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(controller.running(), 0);
    }

    #[tokio::test]
    async fn release_hands_slot_to_head_waiter() {
        let controller = AdmissionController::with_limits(1, 0);
        let held = controller.acquire("first").await.unwrap();

        let waiting = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.acquire("second").await })
        };
        let c = Arc::clone(&controller);
        wait_until(move || c.queued() == 1).await;

        held.release();
        // handed over, not freed
        assert_eq!(controller.running(), 1);
        assert_eq!(controller.queued(), 0);

        let slot = waiting.await.unwrap().unwrap();
        assert_eq!(slot.job_id(), "second");
        drop(slot);
        assert_eq!(controller.running(), 0);
    }

    #[tokio::test]
    async fn rejects_when_queue_is_full() {
        let controller = AdmissionController::with_limits(1, 1);
        let _held = controller.acquire("held").await.unwrap();

        let _waiting = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.acquire("waiting").await })
        };
        let c = Arc::clone(&controller);
        wait_until(move || c.queued() == 1).await;

        let rejected = controller.acquire("overflow").await;
        assert_eq!(rejected.err(), Some(AdmissionError::QueueFull(1)));
    }

    #[tokio::test]
    async fn same_job_cannot_wait_twice() {
        let controller = AdmissionController::with_limits(1, 0);
        let _held = controller.acquire("held").await.unwrap();

        let _waiting = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.acquire("dup").await })
        };
        let c = Arc::clone(&controller);
        wait_until(move || c.queued() == 1).await;

        let second = controller.acquire("dup").await;
        assert_eq!(
            second.err(),
            Some(AdmissionError::AlreadyQueued("dup".to_string()))
        );
    }

    #[tokio::test]
    async fn aborted_waiter_leaves_the_queue() {
        let controller = AdmissionController::with_limits(1, 0);
        let held = controller.acquire("held").await.unwrap();

        let waiting = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.acquire("gone").await })
        };
        let c = Arc::clone(&controller);
        wait_until(move || c.queued() == 1).await;

        waiting.abort();
        let _ = waiting.await;
        assert_eq!(controller.queued(), 0);

        drop(held);
        assert_eq!(controller.running(), 0);
    }

    #[tokio::test]
    async fn slot_granted_to_dropped_request_is_returned() {
        let controller = AdmissionController::with_limits(1, 0);
        let held = controller.acquire("held").await.unwrap();

        let mut pending = Box::pin(controller.acquire("late"));
        assert!(futures::poll!(pending.as_mut()).is_pending());
        assert_eq!(controller.queued(), 1);

        // the grant is sent but never observed
        drop(held);
        assert_eq!(controller.running(), 1);

        drop(pending);
        assert_eq!(controller.running(), 0);
        assert_eq!(controller.queued(), 0);
    }

    #[tokio::test]
    async fn snapshot_reports_limits() {
        let controller = AdmissionController::with_limits(0, 4);
        let snapshot = controller.snapshot();
        assert_eq!(
            snapshot,
            AdmissionSnapshot {
                max_concurrent: 1,
                running: 0,
                queued: 0,
                max_queue_depth: 4,
            }
        );
    }
}
