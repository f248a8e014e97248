/// Returned when a byte is written to a closed buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferFull;

/// Fixed capacity byte buffer with separate write and read cursors.
///
/// The buffer is filled by exactly one writer until it is closed, either because it is full or
/// because the writer closed it explicitly. Afterwards exactly one reader drains it. Draining is
/// also the hand back signal: as soon as the last unread byte is taken the closed flag is cleared
/// again, so the owner of a drained buffer can reuse it without another call.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Buffer<const N: usize> {
    data: [u8; N],
    put: usize,
    get: usize,
    closed: bool,
}

impl<const N: usize> Buffer<N> {
    pub const fn new() -> Self {
        Self {
            data: [0; N],
            put: 0,
            get: 0,
            closed: false,
        }
    }

    /// Reopen the buffer and forget its contents.
    pub fn reset(&mut self) {
        self.put = 0;
        self.get = 0;
        self.closed = false;
    }

    /// Append a byte. Reaching the capacity closes the buffer.
    pub fn write(&mut self, byte: u8) -> Result<(), BufferFull> {
        if self.closed || self.put >= N {
            return Err(BufferFull);
        }
        self.data[self.put] = byte;
        self.put += 1;
        if self.put >= N {
            self.closed = true;
        }
        Ok(())
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), BufferFull> {
        bytes.iter().try_for_each(|&byte| self.write(byte))
    }

    /// Next unread byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.data[self.get])
        }
    }

    /// Consume the next unread byte.
    ///
    /// Once the buffer is empty after this call it is opened again. This also applies when the
    /// buffer was already empty, so reading a closed empty buffer reopens it.
    pub fn read(&mut self) -> Option<u8> {
        let byte = self.peek();
        if byte.is_some() {
            self.get += 1;
        }
        if self.is_empty() {
            self.closed = false;
        }
        byte
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn open(&mut self) {
        self.closed = false;
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.get >= self.put
    }

    /// Nothing was written since the last reset.
    #[must_use]
    pub const fn is_unused(&self) -> bool {
        self.put == 0
    }

    /// Number of unread bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.put - self.get
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// The unread bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.get..self.put]
    }
}

impl<const N: usize> Default for Buffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
