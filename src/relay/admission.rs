use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Caps the number of handlers in flight.
///
/// Overflow policy is reject: when the cap is reached the datagram
/// is dropped and the client times out.
#[derive(Debug, Clone)]
pub struct Admission {
    semaphore: Option<Arc<Semaphore>>,
}

/// Held by a handler for its whole lifetime. Frees the slot on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl Admission {
    /// 0 means unbounded.
    pub fn new(max_in_flight: usize) -> Self {
        if max_in_flight == 0 {
            return Self { semaphore: None };
        }
        Self {
            semaphore: Some(Arc::new(Semaphore::new(max_in_flight))),
        }
    }

    /// Takes a slot or returns None if all slots are in use.
    pub fn try_admit(&self) -> Option<AdmissionPermit> {
        let semaphore = match &self.semaphore {
            Some(semaphore) => semaphore,
            None => return Some(AdmissionPermit { _permit: None }),
        };

        match semaphore.clone().try_acquire_owned() {
            Ok(permit) => Some(AdmissionPermit { _permit: Some(permit) }),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => None,
        }
    }
}
