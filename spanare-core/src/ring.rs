//! Bounded ring buffer with blocking, timeout-bounded push and pop.
//!
//! A single mutex guards both cursors and the slot array. Two condition
//! variables carry the wakeups: `not_empty` after a push, `not_full` after a
//! pop. One slot is always left unused so that `head == tail` means empty
//! and `head + 1 == tail` (masked) means full; a ring created with capacity
//! `N` therefore holds at most `N - 1` items.
//!
//! The fill level is mirrored into an atomic so status readers never touch
//! the data-path mutex.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

/// Ring buffer error conditions.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("ring buffer full, item dropped after waiting")]
    Full,
    #[error("ring buffer closed")]
    Closed,
    #[error("invalid ring capacity {0} (must be a power of two, at least 2)")]
    InvalidCapacity(usize),
}

struct Cursors<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    open: bool,
}

impl<T> Cursors<T> {
    #[inline]
    fn fill(&self, mask: usize) -> usize {
        self.head.wrapping_sub(self.tail) & mask
    }
}

/// Fixed-capacity multi-producer multi-consumer queue.
pub struct RingBuffer<T> {
    state: Mutex<Cursors<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    mask: usize,
    len: AtomicUsize,
    full_count: AtomicU64,
    pinned: Option<PinnedRegion>,
}

impl<T> RingBuffer<T> {
    /// Creates a ring with `capacity` slots.
    ///
    /// `capacity` must be a power of two so cursor arithmetic is a mask.
    /// The slot array is locked into RAM where the platform allows it; a
    /// failure to lock is logged and otherwise ignored.
    pub fn with_capacity(capacity: usize) -> Result<Self, RingError> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(RingError::InvalidCapacity(capacity));
        }

        let slots: Box<[Option<T>]> = (0..capacity).map(|_| None).collect();
        let pinned = PinnedRegion::lock(
            slots.as_ptr() as *const u8,
            std::mem::size_of_val(&*slots),
        );

        debug!(capacity, pinned = pinned.is_some(), "Ring buffer allocated");

        Ok(Self {
            state: Mutex::new(Cursors {
                slots,
                head: 0,
                tail: 0,
                open: true,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            mask: capacity - 1,
            len: AtomicUsize::new(0),
            full_count: AtomicU64::new(0),
            pinned,
        })
    }

    /// Appends `item`, waiting up to `timeout` for space.
    ///
    /// When the wait runs out the item is dropped, the full counter is
    /// incremented and `RingError::Full` is returned.
    pub fn push(&self, item: T, timeout: Duration) -> Result<(), RingError> {
        let deadline = deadline_after(timeout);
        let mut state = self.state.lock();

        loop {
            if !state.open {
                return Err(RingError::Closed);
            }

            let next = (state.head + 1) & self.mask;
            if next != state.tail {
                let head = state.head;
                state.slots[head] = Some(item);
                state.head = next;
                self.len.store(state.fill(self.mask), Ordering::Release);
                drop(state);
                self.not_empty.notify_one();
                return Ok(());
            }

            if !self.wait(&self.not_full, &mut state, deadline) {
                self.full_count.fetch_add(1, Ordering::Relaxed);
                return Err(RingError::Full);
            }
        }
    }

    /// Removes the oldest item, waiting up to `timeout` for one to arrive.
    ///
    /// `Duration::ZERO` never waits. Items still buffered when the ring is
    /// closed can be drained; after that `None` is returned immediately.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = deadline_after(timeout);
        let mut state = self.state.lock();

        loop {
            if state.head != state.tail {
                let tail = state.tail;
                let item = state.slots[tail].take();
                state.tail = (tail + 1) & self.mask;
                self.len.store(state.fill(self.mask), Ordering::Release);
                drop(state);
                self.not_full.notify_one();
                return item;
            }

            if !state.open || !self.wait(&self.not_empty, &mut state, deadline) {
                return None;
            }
        }
    }

    /// Non-blocking pop.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        self.pop(Duration::ZERO)
    }

    /// Marks the ring closed and wakes every waiter.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.open = false;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Items currently buffered. Read without taking the ring mutex.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots, including the one kept free.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Maximum number of items the ring can hold at once.
    #[inline]
    pub fn usable_capacity(&self) -> usize {
        self.mask
    }

    /// Pushes that were dropped because the ring stayed full.
    #[inline]
    pub fn full_count(&self) -> u64 {
        self.full_count.load(Ordering::Relaxed)
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned.is_some()
    }

    /// Waits on `cv` until notified or `deadline`. Returns `false` once the
    /// deadline has passed.
    fn wait(
        &self,
        cv: &Condvar,
        state: &mut MutexGuard<'_, Cursors<T>>,
        deadline: Option<Instant>,
    ) -> bool {
        match deadline {
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return false;
                }
                cv.wait_until(state, deadline);
                true
            }
            None => {
                cv.wait(state);
                true
            }
        }
    }
}

/// `None` means the timeout is too large to represent; wait indefinitely.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// A memory range locked with `mlock`, unlocked again on drop.
struct PinnedRegion {
    addr: usize,
    len: usize,
}

impl PinnedRegion {
    #[cfg(unix)]
    fn lock(ptr: *const u8, len: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        // SAFETY: `ptr..ptr+len` is the live slot allocation owned by the ring,
        // which outlives this region.
        let rc = unsafe { libc::mlock(ptr as *const libc::c_void, len) };
        if rc != 0 {
            warn!(
                bytes = len,
                error = %std::io::Error::last_os_error(),
                "Could not lock ring buffer memory"
            );
            return None;
        }
        Some(Self {
            addr: ptr as usize,
            len,
        })
    }

    #[cfg(not(unix))]
    fn lock(_ptr: *const u8, len: usize) -> Option<Self> {
        warn!(bytes = len, "Memory locking unsupported on this platform");
        None
    }
}

impl Drop for PinnedRegion {
    #[cfg(unix)]
    fn drop(&mut self) {
        // SAFETY: same range passed to `mlock` in `PinnedRegion::lock`.
        unsafe {
            libc::munlock(self.addr as *const libc::c_void, self.len);
        }
    }

    #[cfg(not(unix))]
    fn drop(&mut self) {}
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // Unlock before the slot array is freed.
        self.pinned.take();
    }
}
