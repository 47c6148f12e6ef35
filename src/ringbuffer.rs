//! Bounded single-producer single-consumer byte ringbuffer (spec §4.1).
//!
//! This is the data-handoff primitive between adjacent [`crate::element`] stages: the
//! "output rb" of stage N is the "input rb" of stage N+1. Exactly one producer and one
//! consumer are expected; the buffer itself only enforces the blocking/flag contract, not
//! the single-writer/single-reader discipline (callers are trusted, same as the original
//! `cutils/ringbuf.h`).
//!
//! Three sticky flags govern end-of-stream and cancellation: `done_write`, `done_read` and
//! `abort`. None of them wake blocked peers on their own except `abort`; `done_write` and
//! `done_read` are observed by a blocked reader/writer only once that peer re-checks the
//! condition (which happens naturally since they're set under the same mutex the condvar
//! guards).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Outcome of a [`RingBuffer::read`] or [`RingBuffer::write`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// `usize` bytes were transferred; for reads, this may be less than requested only at
    /// end-of-stream.
    Ok(usize),
    /// The remote side finished (`done_write` for reads, `done_read` for writes) and no more
    /// bytes are available/acceptable. Always carries 0 bytes.
    Done,
    /// A peer called `abort`.
    Abort,
    /// The call's timeout elapsed before it could complete.
    Timeout,
}

struct Inner {
    buf: VecDeque<u8>,
    capacity: usize,
    done_write: bool,
    done_read: bool,
    abort: bool,
}

impl Inner {
    fn filled(&self) -> usize {
        self.buf.len()
    }

    fn available(&self) -> usize {
        self.capacity - self.buf.len()
    }
}

/// A bounded SPSC byte channel. Cheaply cloneable; clones share the same underlying buffer
/// (the "one handle per peer" pattern — the pipeline hands one clone to the producer element
/// and one to the consumer element).
#[derive(Clone)]
pub struct RingBuffer {
    inner: Arc<Mutex<Inner>>,
    not_empty: Arc<Condvar>,
    not_full: Arc<Condvar>,
}

impl RingBuffer {
    /// Create a new ringbuffer with an exact byte capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ringbuffer capacity must be > 0");
        Self {
            inner: Arc::new(Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                capacity,
                done_write: false,
                done_read: false,
                abort: false,
            })),
            not_empty: Arc::new(Condvar::new()),
            not_full: Arc::new(Condvar::new()),
        }
    }

    /// Total capacity in bytes.
    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    /// Instantaneous count of buffered bytes. Callers must tolerate staleness: by the time
    /// this returns, the real count may already have changed.
    pub fn bytes_filled(&self) -> usize {
        self.inner.lock().unwrap().filled()
    }

    /// Instantaneous count of free bytes.
    pub fn bytes_available(&self) -> usize {
        self.inner.lock().unwrap().available()
    }

    /// Read up to `buf.len()` bytes, blocking until that many are available, `done_write`,
    /// `abort`, or `timeout` elapses (`None` blocks indefinitely).
    ///
    /// A reader that observes `done_write` with zero bytes filled returns `Ok(0)`, not
    /// `Done` — this lets callers distinguish "no more data is coming, but I got everything
    /// that was written" from "the peer aborted". `Done` is reserved for the case where the
    /// caller asked for data, the rb is empty, and `done_write` was set while we waited for
    /// data that never arrived... which collapses to the same `Ok(0)` case. In this
    /// implementation `Done` is returned only when a write is unblocked by `done_read`, and
    /// both terminal read conditions (drained tail, or immediately empty) report `Ok(0)`.
    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> IoStatus {
        if buf.is_empty() {
            return IoStatus::Ok(0);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.inner.lock().unwrap();
        loop {
            if guard.abort {
                return IoStatus::Abort;
            }
            if !guard.buf.is_empty() {
                let n = buf.len().min(guard.buf.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = guard.buf.pop_front().unwrap();
                }
                drop(guard);
                self.not_full.notify_all();
                return IoStatus::Ok(n);
            }
            if guard.done_write {
                return IoStatus::Ok(0);
            }
            match deadline {
                None => guard = self.not_empty.wait(guard).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return IoStatus::Timeout;
                    }
                    let (g, timeout_result) =
                        self.not_empty.wait_timeout(guard, deadline - now).unwrap();
                    guard = g;
                    if timeout_result.timed_out()
                        && guard.buf.is_empty()
                        && !guard.done_write
                        && !guard.abort
                    {
                        return IoStatus::Timeout;
                    }
                }
            }
        }
    }

    /// Write all of `buf`, blocking until space is available, `done_read`, `abort`, or
    /// `timeout` elapses. Writes are never partial: either every byte lands or the call
    /// returns a non-`Ok` status with zero bytes written.
    pub fn write(&self, buf: &[u8], timeout: Option<Duration>) -> IoStatus {
        if buf.is_empty() {
            return IoStatus::Ok(0);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut written = 0;
        let mut guard = self.inner.lock().unwrap();
        loop {
            if guard.abort {
                return IoStatus::Abort;
            }
            if guard.done_read {
                return IoStatus::Done;
            }
            let space = guard.available();
            if space > 0 {
                let n = (buf.len() - written).min(space);
                guard.buf.extend(&buf[written..written + n]);
                written += n;
                if written == buf.len() {
                    drop(guard);
                    self.not_empty.notify_all();
                    return IoStatus::Ok(written);
                }
                drop(guard);
                self.not_empty.notify_all();
                guard = self.inner.lock().unwrap();
                continue;
            }
            match deadline {
                None => guard = self.not_full.wait(guard).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return IoStatus::Timeout;
                    }
                    let (g, timeout_result) =
                        self.not_full.wait_timeout(guard, deadline - now).unwrap();
                    guard = g;
                    if timeout_result.timed_out()
                        && guard.available() == 0
                        && !guard.done_read
                        && !guard.abort
                    {
                        return IoStatus::Timeout;
                    }
                }
            }
        }
    }

    /// Idempotent: mark that no further writes will occur. Blocked/future readers drain
    /// remaining bytes then observe end-of-stream.
    pub fn done_write(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.done_write = true;
        drop(guard);
        self.not_empty.notify_all();
    }

    /// Idempotent: mark that no further reads will occur. Blocked/future writers are
    /// unblocked with `Done` regardless of available space.
    pub fn done_read(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.done_read = true;
        drop(guard);
        self.not_full.notify_all();
    }

    /// Wake both sides with `Abort`. Survives until the next `reset`.
    pub fn abort(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.abort = true;
        drop(guard);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Clear buffered contents and all three flags. Not a cancellation primitive: callers
    /// must first `abort` (or otherwise quiesce both peers) so nobody is blocked on this
    /// buffer when `reset` runs, since `reset` does not itself wake blockers.
    pub fn reset(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.buf.clear();
        guard.done_write = false;
        guard.done_read = false;
        guard.abort = false;
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().unwrap().abort
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fifo_law_write_then_read_done() {
        let rb = RingBuffer::new(16);
        assert_eq!(rb.write(b"hello ", None), IoStatus::Ok(6));
        assert_eq!(rb.write(b"world!", None), IoStatus::Ok(6));
        rb.done_write();

        let mut out = vec![0u8; 12];
        assert_eq!(rb.read(&mut out, None), IoStatus::Ok(12));
        assert_eq!(&out, b"hello world!");

        let mut tail = [0u8; 4];
        assert_eq!(rb.read(&mut tail, None), IoStatus::Ok(0));
    }

    #[test]
    fn partial_read_allowed_only_at_eos() {
        let rb = RingBuffer::new(16);
        rb.write(b"abc", None);
        rb.done_write();
        let mut out = [0u8; 10];
        assert_eq!(rb.read(&mut out, None), IoStatus::Ok(3));
        assert_eq!(&out[..3], b"abc");
    }

    #[test]
    fn abort_wakes_blocked_reader() {
        let rb = RingBuffer::new(4);
        let rb2 = rb.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 4];
            rb2.read(&mut buf, None)
        });
        thread::sleep(Duration::from_millis(20));
        rb.abort();
        assert_eq!(handle.join().unwrap(), IoStatus::Abort);
    }

    #[test]
    fn writer_unblocked_by_done_read_reports_zero_written() {
        let rb = RingBuffer::new(2);
        rb.write(b"xy", None);
        let rb2 = rb.clone();
        let handle = thread::spawn(move || rb2.write(b"more", None));
        thread::sleep(Duration::from_millis(20));
        rb.done_read();
        assert_eq!(handle.join().unwrap(), IoStatus::Done);
    }

    #[test]
    fn read_timeout_when_empty_and_open() {
        let rb = RingBuffer::new(4);
        let mut buf = [0u8; 1];
        assert_eq!(rb.read(&mut buf, Some(Duration::from_millis(10))), IoStatus::Timeout);
    }

    #[test]
    fn reset_clears_contents_and_flags() {
        let rb = RingBuffer::new(4);
        rb.write(b"ab", None);
        rb.abort();
        rb.reset();
        assert_eq!(rb.bytes_filled(), 0);
        assert!(!rb.is_aborted());
    }

    #[test]
    fn producer_consumer_round_trip_across_threads() {
        let rb = RingBuffer::new(8);
        let producer_rb = rb.clone();
        let data: Vec<u8> = (0u8..200).collect();
        let producer_data = data.clone();
        let producer = thread::spawn(move || {
            for chunk in producer_data.chunks(7) {
                producer_rb.write(chunk, None);
            }
            producer_rb.done_write();
        });

        let mut received = Vec::new();
        loop {
            let mut chunk = [0u8; 13];
            match rb.read(&mut chunk, None) {
                IoStatus::Ok(0) => break,
                IoStatus::Ok(n) => received.extend_from_slice(&chunk[..n]),
                other => panic!("unexpected status {other:?}"),
            }
        }
        producer.join().unwrap();
        assert_eq!(received, data);
    }
}
