use buffers::PoolBuffer;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::{error::ProtocolError, link::Link, message::Notification};

/// Sends notifications to the control center through the framer.
pub struct Reporter<'a, 'p, M: RawMutex, const POOL: usize, const SIZE: usize> {
    link: &'a Link<'p, M, POOL, SIZE>,
}

impl<'a, 'p, M: RawMutex, const POOL: usize, const SIZE: usize>
    Reporter<'a, 'p, M, POOL, SIZE>
{
    pub(crate) const fn new(link: &'a Link<'p, M, POOL, SIZE>) -> Self {
        Self { link }
    }

    /// Queue an error notification. It may use the buffer the link holds back for errors.
    pub async fn report_error(&self, error: ProtocolError) {
        let buffer = self.link.pool().allocate_reserved().await;
        self.post(buffer, Notification::error(error.code())).await;
    }

    /// Acknowledge a message of type `kind`.
    pub async fn send_ack(&self, kind: u8) {
        let buffer = self.link.pool().allocate().await;
        self.post(buffer, Notification::ack(kind)).await;
    }

    async fn post(&self, mut buffer: PoolBuffer<'p, M, POOL, SIZE>, notification: Notification) {
        match notification.write_to(&mut *buffer) {
            Ok(()) => self.link.send(buffer).await,
            Err(_) => {
                error!("notification does not fit into a payload buffer");
                drop(buffer);
            }
        }
    }
}
