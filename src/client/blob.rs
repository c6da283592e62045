//! The outbound blob: a double-buffered byte vector guarded by its own lock,
//! distinct from the ring buffer's queue lock (§4.3, §5 "two locks,
//! ordered").

use std::sync::Mutex;

/// `blob_in` accumulates newly framed payloads; `blob_out` holds whatever
/// was swapped in for the flusher to write. They never need to be accessed
/// together except during `swap`/`rebuild`.
pub struct Blob {
    inner: Mutex<Vec<u8>>,
}

impl Blob {
    pub fn new() -> Self {
        Blob {
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Append already-framed bytes to the inbound blob (called by the
    /// producer immediately after appending to the ring, under the ring
    /// lock's release but the blob lock's acquisition — see
    /// `RingBuffer::push` call sites).
    pub fn append(&self, framed: &[u8]) {
        self.inner.lock().unwrap().extend_from_slice(framed);
    }

    /// Atomically take the current contents, leaving the blob empty for the
    /// next accumulation period. Returns `None` if there was nothing to
    /// write.
    pub fn take(&self) -> Option<Vec<u8>> {
        let mut guard = self.inner.lock().unwrap();
        if guard.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut *guard))
        }
    }

    /// Replace the blob's contents wholesale. Used by the flusher to rebuild
    /// `blob_in` from the ring buffer's logical contents after a reconnect.
    pub fn replace(&self, contents: Vec<u8>) {
        *self.inner.lock().unwrap() = contents;
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl Default for Blob {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_empties_and_returns_contents() {
        let blob = Blob::new();
        assert!(blob.take().is_none());
        blob.append(b"abc");
        blob.append(b"def");
        let taken = blob.take().unwrap();
        assert_eq!(taken, b"abcdef");
        assert!(blob.is_empty());
    }

    #[test]
    fn replace_overwrites_wholesale() {
        let blob = Blob::new();
        blob.append(b"stale");
        blob.replace(b"fresh".to_vec());
        assert_eq!(blob.take().unwrap(), b"fresh");
    }
}
