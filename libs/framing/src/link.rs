use buffers::{BufferPool, PoolBuffer, PoolError};
use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Channel, Receiver},
};

use crate::{
    format::FrameFormat, framer::Framer, message::Notification, parser::Parser,
    reporter::Reporter,
};

/// Buffers only the reporter may take, so error notifications still go out when every other
/// buffer is in flight.
pub const ERROR_RESERVE: usize = 1;

/// Shared state of one serial link.
///
/// The link borrows its payload buffers from a [`BufferPool`] and owns both queues. The queues
/// carry [`PoolBuffer`] handles, the payloads themselves stay in the pool. Parser, framer and
/// reporter borrow the link, so a link that lives in a `static` can serve tasks on any executor:
///
/// ```text
/// transport rx -> Parser -> inbound queue -> consumer -> Link::release
/// consumer / Reporter -> outbound queue -> Framer -> transport tx
/// ```
///
/// Both queues hold `POOL` handles, so posting to them never waits.
///
/// The pool needs a buffer for frames on top of the one held back for error reports:
///
/// ```compile_fail
/// use embassy_sync::blocking_mutex::raw::NoopRawMutex;
/// use framing::Link;
///
/// let pool = Link::<NoopRawMutex, 1, 24>::new_pool();
/// ```
pub struct Link<'p, M: RawMutex, const POOL: usize, const SIZE: usize> {
    pool: &'p BufferPool<M, POOL, SIZE>,
    inbound: Channel<M, PoolBuffer<'p, M, POOL, SIZE>, POOL>,
    outbound: Channel<M, PoolBuffer<'p, M, POOL, SIZE>, POOL>,
    format: FrameFormat,
}

impl<'p, M: RawMutex, const POOL: usize, const SIZE: usize> Link<'p, M, POOL, SIZE> {
    const FITS_NOTIFICATION: () = assert!(
        SIZE >= Notification::LEN,
        "payload buffers must hold a notification"
    );

    const HAS_FRAME_BUFFER: () = assert!(
        POOL > ERROR_RESERVE,
        "the pool needs a frame buffer besides the error reserve"
    );

    /// Create a pool that holds back [`ERROR_RESERVE`] buffers for error reports.
    #[must_use]
    pub fn new_pool() -> BufferPool<M, POOL, SIZE> {
        let () = Self::FITS_NOTIFICATION;
        let () = Self::HAS_FRAME_BUFFER;
        BufferPool::with_reserve(ERROR_RESERVE)
    }

    /// Create a link on top of `pool`, which should come from [`Link::new_pool`].
    #[must_use]
    pub const fn new(pool: &'p BufferPool<M, POOL, SIZE>, format: FrameFormat) -> Self {
        let () = Self::FITS_NOTIFICATION;
        let () = Self::HAS_FRAME_BUFFER;
        Self {
            pool,
            inbound: Channel::new(),
            outbound: Channel::new(),
            format,
        }
    }

    pub const fn format(&self) -> &FrameFormat {
        &self.format
    }

    pub const fn pool(&self) -> &'p BufferPool<M, POOL, SIZE> {
        self.pool
    }

    pub fn parser(&self) -> Parser<'_, 'p, M, POOL, SIZE> {
        Parser::new(self)
    }

    pub fn framer(&self) -> Framer<'_, 'p, M, POOL, SIZE> {
        Framer::new(self)
    }

    pub fn reporter(&self) -> Reporter<'_, 'p, M, POOL, SIZE> {
        Reporter::new(self)
    }

    /// Queue of validated payloads. Every payload starts with its frame length byte.
    pub fn inbound(&self) -> Receiver<'_, M, PoolBuffer<'p, M, POOL, SIZE>, POOL> {
        self.inbound.receiver()
    }

    /// Wait for the next validated payload.
    pub async fn receive(&self) -> PoolBuffer<'p, M, POOL, SIZE> {
        self.inbound.receive().await
    }

    /// Queue a payload for transmission. The framer returns it to the pool once it was sent.
    pub async fn send(&self, mut payload: PoolBuffer<'p, M, POOL, SIZE>) {
        payload.close();
        self.outbound.send(payload).await;
    }

    /// Hand a payload buffer back to the pool of this link.
    ///
    /// Buffers of another pool are rejected with [`PoolError::Foreign`] and go back to their own
    /// pool.
    pub fn release(&self, buffer: PoolBuffer<'_, M, POOL, SIZE>) -> Result<(), PoolError> {
        self.pool.free(buffer)
    }

    pub(crate) async fn deliver(&self, payload: PoolBuffer<'p, M, POOL, SIZE>) {
        self.inbound.send(payload).await;
    }

    pub(crate) async fn next_outbound(&self) -> PoolBuffer<'p, M, POOL, SIZE> {
        self.outbound.receive().await
    }
}

#[cfg(test)]
mod tests {
    use core::mem::size_of;

    use buffers::{BufferPool, PoolError};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use futures_executor::block_on;
    use futures_util::FutureExt;

    use super::Link;
    use crate::{format::FrameFormat, parser::ParserState};

    type SmallLink<'p> = Link<'p, NoopRawMutex, 2, 8>;

    #[test]
    fn one_buffer_is_held_back() {
        let pool = SmallLink::new_pool();
        let link = SmallLink::new(&pool, FrameFormat::DEFAULT);
        let buffer = link.pool().try_allocate().unwrap();
        assert!(link.pool().try_allocate().is_err());
        assert_eq!(link.pool().available(), 1);
        link.release(buffer).unwrap();
        assert_eq!(link.pool().available(), 2);
    }

    #[test]
    fn smallest_pool_starts_frames_at_once() {
        let pool = SmallLink::new_pool();
        let link = SmallLink::new(&pool, FrameFormat::DEFAULT);
        let mut parser = link.parser();
        for byte in [0x03, 0xAF, 0xEF] {
            block_on(parser.push(byte));
        }
        assert!(parser.push(0x09).now_or_never().is_some());
        assert_eq!(parser.state(), ParserState::ReadPayload(5));
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn sent_payloads_are_closed() {
        let pool = SmallLink::new_pool();
        let link = SmallLink::new(&pool, FrameFormat::DEFAULT);
        let mut buffer = link.pool().try_allocate().unwrap();
        buffer.write(1).unwrap();
        block_on(link.send(buffer));
        let queued = block_on(link.next_outbound());
        assert!(queued.is_closed());
        assert_eq!(queued.as_slice(), &[1]);
        link.release(queued).unwrap();
    }

    #[test]
    fn buffer_of_other_pool_is_not_released() {
        let pool = SmallLink::new_pool();
        let link = SmallLink::new(&pool, FrameFormat::DEFAULT);
        let other = BufferPool::<NoopRawMutex, 2, 8>::new();

        let stranger = other.try_allocate().unwrap();
        assert_eq!(link.release(stranger), Err(PoolError::Foreign));
        assert_eq!(link.pool().available(), 2);
        assert_eq!(other.available(), 2);

        // the reserve still only serves error reports
        let buffer = link.pool().try_allocate().unwrap();
        assert_eq!(link.pool().try_allocate().err(), Some(PoolError::Exhausted));
        link.release(buffer).unwrap();
    }

    #[test]
    fn queues_carry_handles() {
        assert_eq!(
            size_of::<Link<'static, NoopRawMutex, 4, 24>>(),
            size_of::<Link<'static, NoopRawMutex, 4, 240>>()
        );
    }
}
