use core::convert::Infallible;

use buffers::Buffer;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_io_async::Write;

use crate::{error::LinkError, link::Link};

/// Sends the payloads queued on a [`Link`].
///
/// Every payload goes out as preamble, payload (which starts with the length byte) and the XOR of
/// everything before it. The transport is flushed after each frame and the payload buffer goes
/// back to the pool.
pub struct Framer<'a, 'p, M: RawMutex, const POOL: usize, const SIZE: usize> {
    link: &'a Link<'p, M, POOL, SIZE>,
}

impl<'a, 'p, M: RawMutex, const POOL: usize, const SIZE: usize> Framer<'a, 'p, M, POOL, SIZE> {
    pub(crate) const fn new(link: &'a Link<'p, M, POOL, SIZE>) -> Self {
        Self { link }
    }

    /// Send queued payloads until the transport fails.
    pub async fn run<W: Write>(&mut self, tx: &mut W) -> Result<Infallible, LinkError<W::Error>> {
        loop {
            let payload = self.link.next_outbound().await;
            let sent = self.send_frame(tx, &payload).await;
            drop(payload);
            sent.map_err(LinkError::Io)?;
        }
    }

    /// Write one frame around `payload` without touching the queue.
    pub async fn send_frame<W: Write>(
        &self,
        tx: &mut W,
        payload: &Buffer<SIZE>,
    ) -> Result<(), W::Error> {
        let preamble = &self.link.format().preamble;
        let checksum = preamble
            .iter()
            .chain(payload.as_slice())
            .fold(0, |acc, byte| acc ^ byte);
        trace!("sending frame with {} payload bytes", payload.len());
        tx.write_all(preamble).await?;
        tx.write_all(payload.as_slice()).await?;
        tx.write_all(&[checksum]).await?;
        tx.flush().await
    }
}
