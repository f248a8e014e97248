use core::{cell::RefCell, convert::Infallible};

use buffers::{BufferFull, DoubleBuffer};
use embassy_sync::{
    blocking_mutex::{raw::RawMutex, Mutex},
    signal::Signal,
};
use embassy_time::{with_timeout, Duration};
use embedded_io_async::{ErrorType, Read, Write};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialConfig {
    /// How long a reader waits for a full receive buffer before it takes a partial one.
    pub rx_timeout: Duration,
}

impl SerialConfig {
    pub const DEFAULT: Self = Self {
        rx_timeout: Duration::from_millis(25),
    };
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Byte transport between a UART interrupt and the tasks using the link.
///
/// Both directions use a [`DoubleBuffer`] of `N` bytes. The interrupt fills the receive pair and
/// drains the transmit pair, tasks do the opposite. Every access to a pair happens inside its
/// mutex, so a swap never races a read or write from the other side.
///
/// The interrupt side calls [`SerialPort::on_rx`] for every received byte and
/// [`SerialPort::on_tx`] whenever the transmitter can take the next byte. It learns that there
/// is something to send by awaiting [`SerialPort::tx_pending`].
pub struct SerialPort<M: RawMutex, const N: usize> {
    rx: Mutex<M, RefCell<DoubleBuffer<N>>>,
    tx: Mutex<M, RefCell<DoubleBuffer<N>>>,
    /// posted when a receive buffer was closed
    rx_closed: Signal<M, ()>,
    /// posted when a transmit buffer was drained
    tx_open: Signal<M, ()>,
    /// posted when a transmit buffer was handed to the interrupt
    tx_pending: Signal<M, ()>,
    config: SerialConfig,
}

impl<M: RawMutex, const N: usize> SerialPort<M, N> {
    pub const fn new(config: SerialConfig) -> Self {
        Self {
            rx: Mutex::new(RefCell::new(DoubleBuffer::new())),
            tx: Mutex::new(RefCell::new(DoubleBuffer::new())),
            rx_closed: Signal::new(),
            tx_open: Signal::new(),
            tx_pending: Signal::new(),
            config,
        }
    }

    pub fn split(&self) -> (SerialRx<'_, M, N>, SerialTx<'_, M, N>) {
        (SerialRx { port: self }, SerialTx { port: self })
    }

    /// Store a received byte.
    ///
    /// Fails while the receive buffer is closed and not yet swapped. The caller should keep the
    /// byte (or leave it in the data register) and try again later.
    pub fn on_rx(&self, byte: u8) -> Result<(), BufferFull> {
        let closed = self
            .rx
            .lock(|cell| {
                let mut pair = cell.borrow_mut();
                pair.put(byte)?;
                Ok(pair.write_buffer().is_closed())
            })
            .map_err(|err| {
                warn!("receive overrun");
                err
            })?;
        if closed {
            self.rx_closed.signal(());
        }
        Ok(())
    }

    /// Next byte to transmit, if any.
    pub fn on_tx(&self) -> Option<u8> {
        let (byte, drained) = self.tx.lock(|cell| {
            let mut pair = cell.borrow_mut();
            if pair.is_swappable() {
                pair.swap();
            }
            if !pair.read_buffer().is_closed() {
                return (None, false);
            }
            let byte = pair.get_take();
            (byte, !pair.read_buffer().is_closed())
        });
        if drained {
            self.tx_open.signal(());
        }
        byte
    }

    /// Wait until bytes were handed over for transmission.
    pub async fn tx_pending(&self) {
        self.tx_pending.wait().await;
    }

    /// Wait for the next received byte.
    ///
    /// Bytes only become readable once their buffer was closed. If no buffer closes within
    /// [`SerialConfig::rx_timeout`] a partially filled one is closed so its bytes do not get
    /// stuck.
    pub async fn next_byte(&self) -> u8 {
        loop {
            if let Some(byte) = self.try_next_byte() {
                return byte;
            }
            if with_timeout(self.config.rx_timeout, self.rx_closed.wait())
                .await
                .is_err()
            {
                self.force_rx();
            }
        }
    }

    /// Take a received byte without waiting.
    pub fn try_next_byte(&self) -> Option<u8> {
        self.rx.lock(|cell| {
            let mut pair = cell.borrow_mut();
            if pair.is_swappable() {
                pair.swap();
            }
            if pair.read_buffer().is_closed() {
                pair.get_take()
            } else {
                None
            }
        })
    }

    fn force_rx(&self) {
        let pending = self.rx.lock(|cell| {
            let mut pair = cell.borrow_mut();
            let buffer = pair.write_buffer();
            if buffer.is_unused() || buffer.is_closed() {
                return 0;
            }
            let pending = buffer.len();
            pair.close_write();
            pending
        });
        if pending > 0 {
            debug!("receive timeout, taking {} buffered bytes", pending);
        }
    }

    /// Queue a byte for transmission, waiting while both transmit buffers are in use.
    pub async fn put_byte(&self, byte: u8) {
        loop {
            let stored = self.tx.lock(|cell| {
                let mut pair = cell.borrow_mut();
                if pair.is_swappable() {
                    pair.swap();
                }
                pair.put(byte).is_ok()
            });
            if stored {
                self.hand_over();
                return;
            }
            self.tx_open.wait().await;
        }
    }

    /// Hand the current transmit buffer over even if it is not full and wait until it was sent.
    pub async fn flush(&self) {
        self.tx.lock(|cell| {
            let mut pair = cell.borrow_mut();
            if !pair.write_buffer().is_unused() {
                pair.close_write();
            }
        });
        loop {
            let idle = self.tx.lock(|cell| {
                let mut pair = cell.borrow_mut();
                if pair.is_swappable() {
                    pair.swap();
                }
                !pair.read_buffer().is_closed() && !pair.write_buffer().is_closed()
            });
            if idle {
                return;
            }
            self.tx_pending.signal(());
            self.tx_open.wait().await;
        }
    }

    fn hand_over(&self) {
        let swapped = self.tx.lock(|cell| {
            let mut pair = cell.borrow_mut();
            if pair.is_swappable() {
                pair.swap();
                true
            } else {
                false
            }
        });
        if swapped {
            self.tx_pending.signal(());
        }
    }
}

/// Receiving half of a [`SerialPort`].
pub struct SerialRx<'a, M: RawMutex, const N: usize> {
    port: &'a SerialPort<M, N>,
}

impl<M: RawMutex, const N: usize> ErrorType for SerialRx<'_, M, N> {
    type Error = Infallible;
}

impl<M: RawMutex, const N: usize> Read for SerialRx<'_, M, N> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Some((first, rest)) = buf.split_first_mut() else {
            return Ok(0);
        };
        *first = self.port.next_byte().await;
        let mut count = 1;
        for slot in rest {
            match self.port.try_next_byte() {
                Some(byte) => {
                    *slot = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

/// Transmitting half of a [`SerialPort`].
pub struct SerialTx<'a, M: RawMutex, const N: usize> {
    port: &'a SerialPort<M, N>,
}

impl<M: RawMutex, const N: usize> ErrorType for SerialTx<'_, M, N> {
    type Error = Infallible;
}

impl<M: RawMutex, const N: usize> Write for SerialTx<'_, M, N> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            self.port.put_byte(byte).await;
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.port.flush().await;
        Ok(())
    }
}
