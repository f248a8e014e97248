use crate::buffer::{Buffer, BufferFull};

/// Index of one of the two slots of a [`DoubleBuffer`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    const fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    const fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// Ping-pong pair of buffers.
///
/// The producer fills the write buffer while the consumer drains the read buffer. Once the
/// producer closed the write buffer and the consumer drained (and thereby reopened) the read
/// buffer, the pair can be swapped. Swapping never happens on its own.
///
/// The pair itself is not synchronized. The producer must only ever touch the write buffer and
/// the consumer only the read buffer, and swaps must be serialized with both of them. Wrap the
/// pair in a mutex when producer and consumer run in different contexts.
#[derive(Debug, Clone)]
pub struct DoubleBuffer<const N: usize> {
    slots: [Buffer<N>; 2],
    write: Slot,
}

impl<const N: usize> DoubleBuffer<N> {
    pub const fn new() -> Self {
        Self {
            slots: [Buffer::new(), Buffer::new()],
            write: Slot::First,
        }
    }

    #[must_use]
    pub const fn write_buffer_handle(&self) -> Slot {
        self.write
    }

    #[must_use]
    pub const fn read_buffer_handle(&self) -> Slot {
        self.write.other()
    }

    #[must_use]
    pub fn buffer(&self, slot: Slot) -> &Buffer<N> {
        &self.slots[slot.index()]
    }

    #[must_use]
    pub fn write_buffer(&self) -> &Buffer<N> {
        self.buffer(self.write_buffer_handle())
    }

    #[must_use]
    pub fn read_buffer(&self) -> &Buffer<N> {
        self.buffer(self.read_buffer_handle())
    }

    fn write_buffer_mut(&mut self) -> &mut Buffer<N> {
        &mut self.slots[self.write.index()]
    }

    fn read_buffer_mut(&mut self) -> &mut Buffer<N> {
        &mut self.slots[self.write.other().index()]
    }

    /// Append a byte to the write buffer.
    pub fn put(&mut self, byte: u8) -> Result<(), BufferFull> {
        self.write_buffer_mut().write(byte)
    }

    #[must_use]
    pub fn get_peek(&self) -> Option<u8> {
        self.read_buffer().peek()
    }

    /// Take a byte from the read buffer. Draining it reopens it.
    pub fn get_take(&mut self) -> Option<u8> {
        self.read_buffer_mut().read()
    }

    /// Close a partially filled write buffer so it can be handed over.
    pub fn close_write(&mut self) {
        self.write_buffer_mut().close();
    }

    /// Give up on the rest of the read buffer.
    pub fn open_read(&mut self) {
        self.read_buffer_mut().open();
    }

    /// The producer finished the write buffer and the consumer is done with the read buffer.
    #[must_use]
    pub fn is_swappable(&self) -> bool {
        !self.read_buffer().is_closed() && self.write_buffer().is_closed()
    }

    /// Exchange the roles of the two buffers.
    ///
    /// The old write buffer becomes the read buffer and keeps its contents. The new write buffer
    /// is reset. Callers check [`Self::is_swappable`] first.
    pub fn swap(&mut self) {
        self.write = self.write.other();
        self.write_buffer_mut().reset();
    }
}

impl<const N: usize> Default for DoubleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
