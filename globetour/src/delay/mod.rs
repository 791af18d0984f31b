//! Cancelable, redirectable single-slot delay.
//!
//! [`DelayGate`] holds at most one pending wait. The waiter gets a
//! [`DelayWait`] future that completes exactly once. While the wait is
//! pending, [`DelayGate::redirect`] replaces its timer so the *same* future
//! completes after the new duration, measured from the redirect call. This is
//! how a live "time per slide" change reaches the slide already on screen.
//!
//! # Slot invariant
//!
//! The completion sender and the timer task live in one [`DelaySlot`], so a
//! pending completion always has a running timer and vice versa.
//!
//! ```text
//! wait(17s) ──► [slot: tx + timer(17s)]
//!                   │ redirect(1s)
//!                   ▼
//!               [slot: tx + timer(1s)] ──expire──► tx.send(Elapsed), slot empty
//! ```
//!
//! Dropping a [`DelayWait`] before it completes frees its slot and aborts its
//! timer, so an abandoned waiter never blocks the next `wait`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Errors from [`DelayGate`] misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelayError {
    /// A second wait was requested while one is outstanding.
    #[error("A delay is already pending")]
    AlreadyPending,
}

/// How a [`DelayWait`] completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    /// The (possibly redirected) timer expired.
    Elapsed,
    /// The wait was cancelled before expiry.
    Cancelled,
}

/// Future returned by [`DelayGate::wait`].
#[derive(Debug)]
pub struct DelayWait {
    rx: oneshot::Receiver<DelayOutcome>,
    slot: SharedSlot,
    wait_id: u64,
}

impl Future for DelayWait {
    type Output = DelayOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(DelayOutcome::Cancelled))
    }
}

impl Drop for DelayWait {
    fn drop(&mut self) {
        let abandoned = {
            let mut guard = self.slot.lock();
            match guard.as_ref() {
                Some(current) if current.wait_id == self.wait_id => guard.take(),
                _ => None,
            }
        };
        if let Some(slot) = abandoned {
            slot.timer.abort();
            debug!("Pending delay abandoned by its waiter");
        }
    }
}

#[derive(Debug)]
struct DelaySlot {
    /// Identifies the [`DelayWait`] this slot completes.
    wait_id: u64,
    /// Bumped on every redirect so a superseded timer cannot fire.
    generation: u64,
    completion: oneshot::Sender<DelayOutcome>,
    timer: JoinHandle<()>,
    deadline: Instant,
}

type SharedSlot = Arc<Mutex<Option<DelaySlot>>>;

/// Single-slot timer with redirect support.
///
/// Timers are spawned on the current tokio runtime, so `wait` and
/// `redirect` must be called from within one.
#[derive(Debug, Default)]
pub struct DelayGate {
    slot: SharedSlot,
    next_wait_id: AtomicU64,
}

impl DelayGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a wait of `duration`.
    ///
    /// # Errors
    ///
    /// [`DelayError::AlreadyPending`] if a wait is already outstanding.
    pub fn wait(&self, duration: Duration) -> Result<DelayWait, DelayError> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(DelayError::AlreadyPending);
        }

        let (completion, rx) = oneshot::channel();
        let wait_id = self.next_wait_id.fetch_add(1, Ordering::Relaxed);
        let generation = 0;
        let timer = arm(Arc::clone(&self.slot), generation, duration);
        *slot = Some(DelaySlot {
            wait_id,
            generation,
            completion,
            timer,
            deadline: Instant::now() + duration,
        });
        trace!(duration_ms = duration.as_millis() as u64, "Delay armed");
        Ok(DelayWait {
            rx,
            slot: Arc::clone(&self.slot),
            wait_id,
        })
    }

    /// Re-arm the pending wait to expire `duration` from now.
    ///
    /// The original [`DelayWait`] is the one that completes. Returns `false`
    /// (and does nothing) when no wait is pending.
    pub fn redirect(&self, duration: Duration) -> bool {
        let mut guard = self.slot.lock();
        let Some(slot) = guard.as_mut() else {
            return false;
        };

        slot.timer.abort();
        slot.generation += 1;
        slot.timer = arm(Arc::clone(&self.slot), slot.generation, duration);
        slot.deadline = Instant::now() + duration;
        debug!(
            duration_ms = duration.as_millis() as u64,
            "Pending delay redirected"
        );
        true
    }

    /// Cancel the pending wait, completing it with [`DelayOutcome::Cancelled`].
    ///
    /// Returns `false` when no wait is pending.
    pub fn cancel(&self) -> bool {
        let Some(slot) = self.slot.lock().take() else {
            return false;
        };
        slot.timer.abort();
        let _ = slot.completion.send(DelayOutcome::Cancelled);
        debug!("Pending delay cancelled");
        true
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Time left on the pending wait, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.slot
            .lock()
            .as_ref()
            .map(|slot| slot.deadline.saturating_duration_since(Instant::now()))
    }
}

impl Drop for DelayGate {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.lock().take() {
            slot.timer.abort();
            let _ = slot.completion.send(DelayOutcome::Cancelled);
        }
    }
}

/// Spawn the timer task for `generation`.
///
/// On expiry the task empties the slot only if it still belongs to the same
/// generation, then fulfils the completion outside the lock.
fn arm(slot: SharedSlot, generation: u64, duration: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        let fired = {
            let mut guard = slot.lock();
            match guard.as_ref() {
                Some(current) if current.generation == generation => guard.take(),
                _ => None,
            }
        };
        if let Some(fired) = fired {
            trace!("Delay elapsed");
            let _ = fired.completion.send(DelayOutcome::Elapsed);
        }
    })
}
