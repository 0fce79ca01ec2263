use crate::errors::FleetError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admission control for remote executions: at most `limit` slots are held
/// at once. Waiting for a slot suspends the caller instead of polling.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    limit: usize,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn admit(&self) -> Result<Slot, FleetError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FleetError::interrupted("Concurrency gate closed"))?;
        // The permit is held before the counter moves, so the count never passes the limit.
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Slot {
            in_flight: self.in_flight.clone(),
            admitted_at: now,
            _permit: permit,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Wakes every pending `admit` with an error. Held slots stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// One admitted execution. Dropping it releases the slot.
#[derive(Debug)]
pub struct Slot {
    in_flight: Arc<AtomicUsize>,
    admitted_at: usize,
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    /// In-flight count right after this slot was admitted.
    pub fn admitted_at(&self) -> usize {
        self.admitted_at
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // Runs before `_permit` is dropped, keeping the count at or under the limit.
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::ConcurrencyGate;
    use std::time::Duration;

    #[tokio::test]
    async fn admit_blocks_at_limit_until_a_slot_is_released() {
        let gate = ConcurrencyGate::new(2);
        let first = gate.admit().await.expect("first slot");
        let _second = gate.admit().await.expect("second slot");
        assert_eq!(gate.in_flight(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(50), gate.admit()).await;
        assert!(blocked.is_err(), "third admission must wait");

        drop(first);
        let third = tokio::time::timeout(Duration::from_millis(200), gate.admit())
            .await
            .expect("slot freed")
            .expect("gate open");
        assert_eq!(third.admitted_at(), 2);
        assert_eq!(gate.peak(), 2);
    }

    #[tokio::test]
    async fn close_fails_pending_admissions() {
        let gate = ConcurrencyGate::new(1);
        let _held = gate.admit().await.expect("slot");
        gate.close();
        assert!(gate.admit().await.is_err());
    }

    #[test]
    fn zero_limit_is_raised_to_one() {
        assert_eq!(ConcurrencyGate::new(0).limit(), 1);
    }
}
