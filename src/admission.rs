//! Admission control for scoring requests.
//!
//! Bounds the number of in-flight scoring operations. Excess load is rejected
//! immediately rather than queued, so callers can translate the rejection into
//! backpressure (`429 Too Many Requests` with a `Retry-After` hint).
//!
//! Every admitted request holds an [`AdmissionTicket`] that carries a deadline.
//! Work driven through [`AdmissionTicket::run`] is abandoned when the deadline
//! passes: the future is dropped, the ticket's capacity is returned, and the
//! caller receives [`OracleError::DeadlineExceeded`].
//!
//! # Example
//!
//! ```rust
//! use medchain_oracle::admission::AdmissionController;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> medchain_oracle::Result<()> {
//! let controller = AdmissionController::with_limits(
//!     1,
//!     Duration::from_secs(5),
//!     Duration::from_secs(1),
//! );
//!
//! let ticket = controller.admit()?;
//! assert!(controller.admit().is_err());
//!
//! let answer = ticket.run(async { Ok(42) }).await?;
//! assert_eq!(answer, 42);
//!
//! drop(ticket);
//! assert!(controller.admit().is_ok());
//! # Ok(())
//! # }
//! ```

use crate::config::AdmissionConfig;
use crate::error::{OracleError, Result};
use crate::observability;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared accounting behind a controller and all of its tickets.
#[derive(Debug)]
struct AdmissionInner {
    capacity: usize,
    deadline: Duration,
    retry_after: Duration,
    in_flight: AtomicUsize,
    admitted: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
    released: AtomicU64,
}

impl AdmissionInner {
    fn decrement(&self) -> usize {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.released.fetch_add(1, Ordering::Relaxed);
        let now = previous.saturating_sub(1);
        observability::set_admission_in_flight(now);
        now
    }
}

/// Bounded counter of in-flight scoring requests.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    inner: Arc<AdmissionInner>,
}

impl AdmissionController {
    /// Create a controller from configuration.
    pub fn new(config: &AdmissionConfig) -> Self {
        Self::with_limits(config.capacity, config.deadline, config.retry_after)
    }

    /// Create a controller with explicit limits.
    pub fn with_limits(capacity: usize, deadline: Duration, retry_after: Duration) -> Self {
        Self {
            inner: Arc::new(AdmissionInner {
                capacity,
                deadline,
                retry_after,
                in_flight: AtomicUsize::new(0),
                admitted: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                timed_out: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Claim one unit of capacity, or fail fast with `CapacityExceeded`.
    pub fn admit(&self) -> Result<AdmissionTicket> {
        let inner = &self.inner;

        loop {
            let current = inner.in_flight.load(Ordering::Acquire);
            if current >= inner.capacity {
                inner.rejected.fetch_add(1, Ordering::Relaxed);
                observability::record_admission_rejected();
                debug!(in_flight = current, capacity = inner.capacity, "Admission rejected");
                return Err(OracleError::CapacityExceeded {
                    retry_after: inner.retry_after,
                });
            }
            if inner
                .in_flight
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                inner.admitted.fetch_add(1, Ordering::Relaxed);
                observability::set_admission_in_flight(current + 1);
                break;
            }
        }

        let admitted_at = Instant::now();
        let ticket = AdmissionTicket {
            id: Uuid::new_v4(),
            admitted_at,
            deadline: admitted_at + inner.deadline,
            released: AtomicBool::new(false),
            inner: Arc::clone(inner),
        };
        debug!(ticket = %ticket.id, "Admission granted");
        Ok(ticket)
    }

    /// Maximum concurrent tickets.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Tickets currently held.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Per-request deadline applied to new tickets.
    pub fn deadline(&self) -> Duration {
        self.inner.deadline
    }

    /// Snapshot of the controller's counters.
    pub fn stats(&self) -> AdmissionStats {
        let inner = &self.inner;
        AdmissionStats {
            capacity: inner.capacity,
            in_flight: inner.in_flight.load(Ordering::Acquire),
            admitted: inner.admitted.load(Ordering::Relaxed),
            rejected: inner.rejected.load(Ordering::Relaxed),
            timed_out: inner.timed_out.load(Ordering::Relaxed),
            released: inner.released.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time admission counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    pub capacity: usize,
    pub in_flight: usize,
    pub admitted: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub released: u64,
}

impl AdmissionStats {
    /// True when no further ticket can be admitted.
    pub fn is_saturated(&self) -> bool {
        self.in_flight >= self.capacity
    }
}

/// One in-flight request's claim on capacity.
///
/// Capacity is returned exactly once: by [`release`](Self::release), by
/// deadline expiry inside [`run`](Self::run), or when the ticket is dropped.
#[derive(Debug)]
pub struct AdmissionTicket {
    id: Uuid,
    admitted_at: Instant,
    deadline: Instant,
    released: AtomicBool,
    inner: Arc<AdmissionInner>,
}

impl AdmissionTicket {
    /// Ticket identifier, used for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Instant after which the owning request is failed.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether capacity has already been returned.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Return this ticket's capacity. Returns `false` if it was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        let in_flight = self.inner.decrement();
        debug!(
            ticket = %self.id,
            held_ms = self.admitted_at.elapsed().as_millis() as u64,
            in_flight,
            "Admission released"
        );
        true
    }

    /// Drive `work` to completion before the ticket's deadline.
    ///
    /// On expiry `work` is dropped mid-flight, the ticket is released and
    /// `DeadlineExceeded` is returned.
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout_at(self.deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                self.inner.timed_out.fetch_add(1, Ordering::Relaxed);
                observability::record_admission_timeout();
                self.release();
                warn!(ticket = %self.id, deadline_ms = self.inner.deadline.as_millis() as u64, "Request deadline exceeded");
                Err(OracleError::DeadlineExceeded(self.inner.deadline))
            }
        }
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.release();
    }
}
