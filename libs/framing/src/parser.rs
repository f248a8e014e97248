use core::convert::Infallible;

use buffers::PoolBuffer;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_io_async::Read;

use crate::{
    error::{LinkError, ProtocolError},
    format::{FrameFormat, PREAMBLE_LEN},
    link::Link,
};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParserState {
    /// Waiting for the preamble, this many bytes of it matched so far.
    SeekPreamble(usize),
    ReadLength,
    /// Bytes left in the frame, the checksum included.
    ReadPayload(u8),
    /// Like [`ParserState::SeekPreamble`] after a fault, except that mismatches are not reported.
    ErrorRecovery(usize),
}

impl ParserState {
    /// The parser is outside of a frame and looking for the next preamble.
    #[must_use]
    pub const fn is_seeking(self) -> bool {
        matches!(self, Self::SeekPreamble(_) | Self::ErrorRecovery(_))
    }
}

/// What the caller of [`Decoder::step`] has to do with the byte.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    Idle,
    /// A frame with this length byte starts. Get a buffer and store the length byte in it.
    Begin(u8),
    Store(u8),
    /// The checksum matched, the frame is complete.
    Complete,
    /// The frame in progress (if any) is dropped.
    Fault(ProtocolError),
}

/// Byte by byte frame decoder without any storage of its own.
#[derive(Debug, Clone)]
pub struct Decoder {
    format: FrameFormat,
    capacity: usize,
    state: ParserState,
    checksum: u8,
}

impl Decoder {
    /// Create a decoder for payload buffers of `capacity` bytes.
    #[must_use]
    pub const fn new(format: FrameFormat, capacity: usize) -> Self {
        Self {
            format,
            capacity,
            state: ParserState::SeekPreamble(0),
            checksum: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ParserState {
        self.state
    }

    pub fn step(&mut self, byte: u8) -> Step {
        self.checksum ^= byte;
        match self.state {
            ParserState::SeekPreamble(matched) => {
                if self.format.preamble[matched] == byte {
                    self.state = if matched + 1 == PREAMBLE_LEN {
                        ParserState::ReadLength
                    } else {
                        ParserState::SeekPreamble(matched + 1)
                    };
                    Step::Idle
                } else {
                    self.resync(matched, byte);
                    Step::Fault(ProtocolError::PreambleMismatch(matched as u8))
                }
            }
            ParserState::ErrorRecovery(matched) => {
                self.resync(matched, byte);
                Step::Idle
            }
            ParserState::ReadLength => self.begin(byte),
            ParserState::ReadPayload(remaining) if remaining > 1 => {
                self.state = ParserState::ReadPayload(remaining - 1);
                Step::Store(byte)
            }
            ParserState::ReadPayload(_) => {
                if self.checksum == 0 {
                    self.state = ParserState::SeekPreamble(0);
                    Step::Complete
                } else {
                    self.resync(0, byte);
                    Step::Fault(ProtocolError::ChecksumMismatch)
                }
            }
        }
    }

    fn begin(&mut self, length: u8) -> Step {
        let shortest = self.format.min_len.max(PREAMBLE_LEN as u8 + 2);
        if length < shortest {
            self.resync(0, length);
            return Step::Fault(ProtocolError::FrameTooShort(length));
        }
        // the length byte and every byte up to the checksum end up in the buffer
        let remaining = length - PREAMBLE_LEN as u8 - 1;
        if usize::from(remaining) > self.capacity {
            self.resync(0, length);
            return Step::Fault(ProtocolError::FrameTooLong(length));
        }
        self.state = ParserState::ReadPayload(remaining);
        Step::Begin(length)
    }

    /// Drop the frame in progress and keep whatever preamble prefix the stream now ends with.
    fn resync(&mut self, matched: usize, byte: u8) {
        let matched = self.format.advance(matched, byte);
        self.checksum = self.format.preamble_checksum(matched);
        self.state = if matched == PREAMBLE_LEN {
            ParserState::ReadLength
        } else {
            ParserState::ErrorRecovery(matched)
        };
    }
}

/// Turns the received byte stream into validated payload buffers.
///
/// Complete frames go to the inbound queue of the [`Link`], starting with their length byte.
/// Preamble and checksum are stripped. Faults are answered with an error notification.
pub struct Parser<'a, 'p, M: RawMutex, const POOL: usize, const SIZE: usize> {
    link: &'a Link<'p, M, POOL, SIZE>,
    decoder: Decoder,
    buffer: Option<PoolBuffer<'p, M, POOL, SIZE>>,
}

impl<'a, 'p, M: RawMutex, const POOL: usize, const SIZE: usize> Parser<'a, 'p, M, POOL, SIZE> {
    pub(crate) const fn new(link: &'a Link<'p, M, POOL, SIZE>) -> Self {
        Self {
            link,
            decoder: Decoder::new(*link.format(), SIZE),
            buffer: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ParserState {
        self.decoder.state()
    }

    /// Feed one received byte. Waits while the pool has no buffer for a new frame.
    pub async fn push(&mut self, byte: u8) {
        match self.decoder.step(byte) {
            Step::Idle => {}
            Step::Begin(length) => {
                let mut buffer = self.link.pool().allocate().await;
                // the decoder checked the frame against the buffer capacity
                let _ = buffer.write(length);
                self.buffer = Some(buffer);
            }
            Step::Store(byte) => {
                if let Some(buffer) = self.buffer.as_mut() {
                    let _ = buffer.write(byte);
                }
            }
            Step::Complete => {
                if let Some(mut buffer) = self.buffer.take() {
                    buffer.close();
                    trace!("received frame with {} payload bytes", buffer.len());
                    self.link.deliver(buffer).await;
                }
            }
            Step::Fault(error) => {
                warn!("frame dropped: {:?}", error);
                // back to the pool
                self.buffer = None;
                self.link.reporter().report_error(error).await;
            }
        }
    }

    /// Parse everything `rx` delivers. Only returns when the transport fails.
    pub async fn run<R: Read>(&mut self, rx: &mut R) -> Result<Infallible, LinkError<R::Error>> {
        let mut byte = [0];
        loop {
            rx.read_exact(&mut byte).await?;
            self.push(byte[0]).await;
        }
    }
}
