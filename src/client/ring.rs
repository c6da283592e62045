//! The fixed-capacity ring buffer of unacknowledged payloads.
//!
//! The guarding `Mutex` is a plain `std::sync::Mutex`: every critical section
//! below is non-blocking pure bookkeeping, never held across an `.await`.
//! Backpressure (§4.3, invariant 4) is implemented with a paired
//! `tokio::sync::Notify` rather than a condition variable, which is the
//! idiomatic async analog recommended by the design notes.

use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::Notify;

use crate::error::{Error, Result};

/// Shared state guarded by the queue lock.
struct Inner {
    slots: Vec<Option<Bytes>>,
    first: usize,
    last: usize,
    len: usize,
}

impl Inner {
    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// The client-side ring buffer, §3/§4.3/§4.5.
pub struct RingBuffer {
    inner: Mutex<Inner>,
    not_full: Notify,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        RingBuffer {
            inner: Mutex::new(Inner {
                slots: vec![None; capacity],
                first: 0,
                last: 0,
                len: 0,
            }),
            not_full: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `payload`, blocking (asynchronously) while the ring is full
    /// until the ack reader frees a slot.
    pub async fn push(&self, payload: Bytes) {
        loop {
            // Register for notification before re-checking the condition, not
            // after: otherwise a `notify_waiters` landing between the lock
            // release below and the `.notified()` call would be missed, and
            // this task would wait for a signal that may never come again.
            let notified = self.not_full.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.len < inner.capacity() {
                    let last = inner.last;
                    let capacity = inner.capacity();
                    inner.slots[last] = Some(payload);
                    inner.last = (last + 1) % capacity;
                    inner.len += 1;
                    return;
                }
            }
            notified.await;
        }
    }

    /// Release the first `n` slots, as the ack reader pops acknowledged
    /// bytes. Returns `Error::InvariantViolation` if `n` exceeds the
    /// current length: the peer acknowledged more than was ever sent.
    pub fn pop(&self, n: usize) -> Result<()> {
        let was_full;
        {
            let mut inner = self.inner.lock().unwrap();
            was_full = inner.len == inner.capacity();
            if n > inner.len {
                return Err(Error::InvariantViolation(format!(
                    "ack reader popped {} slots but only {} were queued",
                    n, inner.len
                )));
            }
            let capacity = inner.capacity();
            for i in 0..n {
                let idx = (inner.first + i) % capacity;
                inner.slots[idx] = None;
            }
            inner.first = (inner.first + n) % capacity;
            inner.len -= n;
        }
        if was_full && n > 0 {
            self.not_full.notify_waiters();
        }
        Ok(())
    }

    /// Walk the ring in logical (insertion) order and hand each occupied
    /// payload to `f`. Used by the flusher to rebuild `blob_in` after a
    /// reconnect (§4.4 rebuild invariant).
    pub fn for_each_in_order(&self, mut f: impl FnMut(&Bytes)) {
        let inner = self.inner.lock().unwrap();
        let capacity = inner.capacity();
        for i in 0..inner.len {
            let idx = (inner.first + i) % capacity;
            if let Some(payload) = &inner.slots[idx] {
                f(payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn push_then_pop_round_trips_in_order() {
        let ring = RingBuffer::new(4);
        ring.push(Bytes::from_static(b"a")).await;
        ring.push(Bytes::from_static(b"b")).await;
        ring.push(Bytes::from_static(b"c")).await;
        assert_eq!(ring.len(), 3);

        let mut seen = Vec::new();
        ring.for_each_in_order(|p| seen.push(p.clone()));
        assert_eq!(seen, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")]);

        ring.pop(2).unwrap();
        assert_eq!(ring.len(), 1);
        let mut seen = Vec::new();
        ring.for_each_in_order(|p| seen.push(p.clone()));
        assert_eq!(seen, vec![Bytes::from_static(b"c")]);
    }

    #[tokio::test]
    async fn pop_more_than_queued_is_an_error() {
        let ring = RingBuffer::new(4);
        ring.push(Bytes::from_static(b"a")).await;
        assert!(ring.pop(2).is_err());
    }

    #[tokio::test]
    async fn full_buffer_backpressure_s3() {
        let ring = Arc::new(RingBuffer::new(4));
        for i in 0..4u8 {
            ring.push(Bytes::from(vec![i])).await;
        }
        assert_eq!(ring.len(), 4);

        let producer_ring = ring.clone();
        let blocked = tokio::spawn(async move {
            producer_ring.push(Bytes::from_static(b"fifth")).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        ring.pop(2).unwrap();
        blocked.await.unwrap();
        assert_eq!(ring.len(), 4);
    }

    #[tokio::test]
    async fn wraps_around_capacity() {
        let ring = RingBuffer::new(3);
        ring.push(Bytes::from_static(b"1")).await;
        ring.push(Bytes::from_static(b"2")).await;
        ring.push(Bytes::from_static(b"3")).await;
        ring.pop(2).unwrap();
        ring.push(Bytes::from_static(b"4")).await;
        ring.push(Bytes::from_static(b"5")).await;

        let mut seen = Vec::new();
        ring.for_each_in_order(|p| seen.push(p.clone()));
        assert_eq!(
            seen,
            vec![Bytes::from_static(b"3"), Bytes::from_static(b"4"), Bytes::from_static(b"5")]
        );
    }
}
