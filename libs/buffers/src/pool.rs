use core::{
    cell::{RefCell, UnsafeCell},
    fmt,
    future::poll_fn,
    ops::{Deref, DerefMut},
    ptr,
    task::Poll,
};

use array_init::array_init;
use embassy_sync::{
    blocking_mutex::{raw::RawMutex, Mutex},
    waitqueue::MultiWakerRegistration,
};

use crate::buffer::Buffer;

/// Number of tasks that can wait for a buffer at the same time without being woken spuriously.
pub const MAX_WAITERS: usize = 4;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PoolError {
    /// No buffer is free right now.
    Exhausted,
    /// The buffer was checked out from a different pool. It went back to that pool instead.
    Foreign,
}

/// Fixed set of `POOL` buffers with `SIZE` bytes each.
///
/// The buffers never leave the pool. Allocation hands out a [`PoolBuffer`], a handle with
/// exclusive access to one slot, and the slot becomes free again when the handle is dropped or
/// passed to [`BufferPool::free`]. Handles are small, so queues of them do not copy payloads
/// around. Allocation waits until a buffer is free, which pushes the backpressure to whoever
/// needs a buffer next.
///
/// Some buffers can be held back with [`BufferPool::with_reserve`]. Those are only handed out
/// by [`BufferPool::allocate_reserved`].
pub struct BufferPool<M: RawMutex, const POOL: usize, const SIZE: usize> {
    slots: [UnsafeCell<Buffer<SIZE>>; POOL],
    state: Mutex<M, RefCell<PoolState<POOL>>>,
}

// Safety: a slot is only accessed through the one `PoolBuffer` that checked it out. Checking out
// and returning slots happens under the mutex.
unsafe impl<M: RawMutex + Sync, const POOL: usize, const SIZE: usize> Sync
    for BufferPool<M, POOL, SIZE>
{
}

impl<M: RawMutex, const POOL: usize, const SIZE: usize> BufferPool<M, POOL, SIZE> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_reserve(0)
    }

    /// Create a pool that keeps `reserve` buffers for [`Self::allocate_reserved`].
    #[must_use]
    pub fn with_reserve(reserve: usize) -> Self {
        Self {
            slots: array_init(|_| UnsafeCell::new(Buffer::new())),
            state: Mutex::new(RefCell::new(PoolState::new(reserve.min(POOL)))),
        }
    }

    /// Wait for a free buffer outside of the reserve. The buffer is empty and open.
    pub async fn allocate(&self) -> PoolBuffer<'_, M, POOL, SIZE> {
        self.acquire(false).await
    }

    /// Wait for a free buffer, the reserve included.
    pub async fn allocate_reserved(&self) -> PoolBuffer<'_, M, POOL, SIZE> {
        self.acquire(true).await
    }

    /// Take a buffer outside of the reserve if one is free right now.
    pub fn try_allocate(&self) -> Result<PoolBuffer<'_, M, POOL, SIZE>, PoolError> {
        let index = self.state.lock(|cell| cell.borrow_mut().take(false));
        match index {
            Some(index) => Ok(self.checked_out(index)),
            None => {
                debug!("buffer pool exhausted");
                Err(PoolError::Exhausted)
            }
        }
    }

    /// Return a buffer and wake the tasks waiting for one.
    ///
    /// Dropping the handle has the same effect. Buffers of another pool are rejected, they
    /// return to their own pool.
    pub fn free(&self, buffer: PoolBuffer<'_, M, POOL, SIZE>) -> Result<(), PoolError> {
        if ptr::eq(buffer.pool, self) {
            drop(buffer);
            Ok(())
        } else {
            error!("buffer returned to a foreign pool");
            Err(PoolError::Foreign)
        }
    }

    /// Number of free buffers, the reserve included.
    pub fn available(&self) -> usize {
        self.state.lock(|cell| cell.borrow().available)
    }

    /// Number of checked out buffers.
    pub fn in_use(&self) -> usize {
        POOL - self.available()
    }

    async fn acquire(&self, reserved: bool) -> PoolBuffer<'_, M, POOL, SIZE> {
        let index = poll_fn(|cx| {
            self.state.lock(|cell| {
                let mut state = cell.borrow_mut();
                match state.take(reserved) {
                    Some(index) => Poll::Ready(index),
                    None => {
                        state.wakers.register(cx.waker());
                        Poll::Pending
                    }
                }
            })
        })
        .await;
        self.checked_out(index)
    }

    fn checked_out(&self, index: usize) -> PoolBuffer<'_, M, POOL, SIZE> {
        let mut buffer = PoolBuffer { pool: self, index };
        buffer.reset();
        buffer
    }

    fn release(&self, index: usize) {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            state.put(index);
            state.wakers.wake();
        });
    }
}

impl<M: RawMutex, const POOL: usize, const SIZE: usize> Default for BufferPool<M, POOL, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

struct PoolState<const POOL: usize> {
    taken: [bool; POOL],
    available: usize,
    reserve: usize,
    wakers: MultiWakerRegistration<MAX_WAITERS>,
}

impl<const POOL: usize> PoolState<POOL> {
    fn new(reserve: usize) -> Self {
        Self {
            taken: [false; POOL],
            available: POOL,
            reserve,
            wakers: MultiWakerRegistration::new(),
        }
    }

    fn take(&mut self, reserved: bool) -> Option<usize> {
        let keep = if reserved { 0 } else { self.reserve };
        if self.available <= keep {
            return None;
        }
        let index = self.taken.iter().position(|taken| !taken)?;
        self.taken[index] = true;
        self.available -= 1;
        Some(index)
    }

    fn put(&mut self, index: usize) {
        debug_assert!(self.taken[index]);
        self.taken[index] = false;
        self.available += 1;
    }
}

/// Exclusive handle to one buffer of a [`BufferPool`].
///
/// Dereferences to the [`Buffer`]. The buffer goes back to its pool when the handle is dropped.
pub struct PoolBuffer<'p, M: RawMutex, const POOL: usize, const SIZE: usize> {
    pool: &'p BufferPool<M, POOL, SIZE>,
    index: usize,
}

impl<M: RawMutex, const POOL: usize, const SIZE: usize> PoolBuffer<'_, M, POOL, SIZE> {
    /// Slot of the buffer in its pool.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl<M: RawMutex, const POOL: usize, const SIZE: usize> Deref for PoolBuffer<'_, M, POOL, SIZE> {
    type Target = Buffer<SIZE>;

    fn deref(&self) -> &Buffer<SIZE> {
        // Safety: the slot stays checked out, and thereby exclusive to this handle, until the
        // handle is dropped.
        unsafe { &*self.pool.slots[self.index].get() }
    }
}

impl<M: RawMutex, const POOL: usize, const SIZE: usize> DerefMut
    for PoolBuffer<'_, M, POOL, SIZE>
{
    fn deref_mut(&mut self) -> &mut Buffer<SIZE> {
        // Safety: see `deref`, and `&mut self` rules out other borrows through this handle.
        unsafe { &mut *self.pool.slots[self.index].get() }
    }
}

impl<M: RawMutex, const POOL: usize, const SIZE: usize> Drop for PoolBuffer<'_, M, POOL, SIZE> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl<M: RawMutex, const POOL: usize, const SIZE: usize> fmt::Debug
    for PoolBuffer<'_, M, POOL, SIZE>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("index", &self.index)
            .field("buffer", &**self)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use core::pin::pin;

    use embassy_futures::join::join;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use futures_executor::block_on;
    use futures_util::FutureExt;

    use super::{BufferPool, PoolError};

    #[test]
    fn allocated_buffers_are_reset() {
        let pool = BufferPool::<NoopRawMutex, 1, 4>::new();
        let mut buffer = pool.try_allocate().unwrap();
        buffer.extend_from_slice(&[1, 2, 3, 4]).unwrap();
        assert!(buffer.is_closed());
        pool.free(buffer).unwrap();
        let buffer = pool.try_allocate().unwrap();
        assert!(buffer.is_unused());
        assert!(!buffer.is_closed());
    }

    #[test]
    fn counts_stay_consistent() {
        let pool = BufferPool::<NoopRawMutex, 3, 4>::new();
        assert_eq!(pool.available(), 3);
        let a = pool.try_allocate().unwrap();
        let b = pool.try_allocate().unwrap();
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.in_use(), 2);
        pool.free(a).unwrap();
        assert_eq!(pool.available() + pool.in_use(), 3);
        drop(b);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn try_allocate_reports_exhaustion() {
        let pool = BufferPool::<NoopRawMutex, 1, 4>::new();
        let buffer = pool.try_allocate().unwrap();
        assert_eq!(pool.try_allocate().err(), Some(PoolError::Exhausted));
        pool.free(buffer).unwrap();
        assert!(pool.try_allocate().is_ok());
    }

    #[test]
    fn buffer_of_other_pool_is_rejected() {
        let pool = BufferPool::<NoopRawMutex, 2, 4>::new();
        let other = BufferPool::<NoopRawMutex, 2, 4>::new();
        let held = pool.try_allocate().unwrap();
        let stranger = other.try_allocate().unwrap();

        assert_eq!(pool.free(stranger), Err(PoolError::Foreign));
        assert_eq!(pool.available(), 1);
        assert_eq!(other.available(), 2);

        // the real buffer still finds its way back
        pool.free(held).unwrap();
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn allocate_blocks_until_free() {
        let pool = BufferPool::<NoopRawMutex, 2, 4>::new();
        let a = pool.try_allocate().unwrap();
        let b = pool.try_allocate().unwrap();

        let mut pending = pin!(pool.allocate());
        assert!(pending.as_mut().now_or_never().is_none());
        assert!(pending.as_mut().now_or_never().is_none());

        pool.free(a).unwrap();
        let c = pending.now_or_never().expect("a buffer was freed");
        assert_eq!(pool.available(), 0);
        pool.free(b).unwrap();
        pool.free(c).unwrap();
    }

    #[test]
    fn reserve_is_only_for_reserved_allocations() {
        let pool = BufferPool::<NoopRawMutex, 2, 4>::with_reserve(1);
        let a = pool.try_allocate().unwrap();
        assert_eq!(pool.try_allocate().err(), Some(PoolError::Exhausted));
        assert!(pool.allocate().now_or_never().is_none());
        let reserved = pool
            .allocate_reserved()
            .now_or_never()
            .expect("reserve is free");
        assert_eq!(pool.available(), 0);
        pool.free(reserved).unwrap();
        pool.free(a).unwrap();
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn waiting_task_gets_buffer_from_other_task() {
        let pool = BufferPool::<NoopRawMutex, 1, 8>::new();
        let pool = &pool;
        let held = pool.try_allocate().unwrap();

        let (buffer, ()) = block_on(join(pool.allocate(), async move {
            pool.free(held).unwrap();
        }));
        assert!(buffer.is_unused());
        pool.free(buffer).unwrap();
    }

    #[test]
    fn checked_out_buffers_are_distinct() {
        let pool = BufferPool::<NoopRawMutex, 4, 2>::new();
        let mut held = Vec::new();
        for round in 0..32u8 {
            if round % 3 == 2 {
                if let Some(buffer) = held.pop() {
                    pool.free(buffer).unwrap();
                }
            } else if let Ok(mut buffer) = pool.try_allocate() {
                buffer.write(round).unwrap();
                held.push(buffer);
            }
            assert!(held.len() <= 4);
            assert_eq!(pool.in_use(), held.len());
            // every checked out buffer has its own slot and carries the byte its owner wrote
            let mut slots = Vec::new();
            let mut markers = Vec::new();
            for buffer in &held {
                assert!(!slots.contains(&buffer.index()));
                slots.push(buffer.index());
                let marker = buffer.peek().unwrap();
                assert!(!markers.contains(&marker));
                markers.push(marker);
            }
        }
    }
}
