use embedded_io_async::ReadExactError;

/// Faults detected while decoding the incoming byte stream.
///
/// Every one of them is answered with an error notification and sends the parser back to
/// looking for a preamble.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// The byte at this zero based preamble position did not match.
    PreambleMismatch(u8),
    /// The length byte is below the minimum frame length.
    FrameTooShort(u8),
    /// The frame would not fit into a payload buffer.
    FrameTooLong(u8),
    ChecksumMismatch,
}

impl ProtocolError {
    /// Error code carried in the notification payload.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::PreambleMismatch(position) => position.saturating_add(1),
            Self::ChecksumMismatch => 4,
            Self::FrameTooShort(_) | Self::FrameTooLong(_) => 5,
        }
    }
}

/// Failure of the byte transport below the parser or framer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError<E> {
    Io(E),
    /// The transport will not deliver any more bytes.
    Closed,
}

impl<E> From<ReadExactError<E>> for LinkError<E> {
    fn from(value: ReadExactError<E>) -> Self {
        match value {
            ReadExactError::UnexpectedEof => Self::Closed,
            ReadExactError::Other(err) => Self::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use embedded_io_async::ReadExactError;

    use super::{LinkError, ProtocolError};

    #[test]
    fn codes_match_notification_table() {
        assert_eq!(ProtocolError::PreambleMismatch(0).code(), 1);
        assert_eq!(ProtocolError::PreambleMismatch(1).code(), 2);
        assert_eq!(ProtocolError::PreambleMismatch(2).code(), 3);
        assert_eq!(ProtocolError::ChecksumMismatch.code(), 4);
        assert_eq!(ProtocolError::FrameTooShort(3).code(), 5);
        assert_eq!(ProtocolError::FrameTooLong(200).code(), 5);
    }

    #[test]
    fn end_of_stream_closes_link() {
        assert_eq!(
            LinkError::<u8>::from(ReadExactError::UnexpectedEof),
            LinkError::Closed
        );
        assert_eq!(
            LinkError::from(ReadExactError::Other(7u8)),
            LinkError::Io(7)
        );
    }
}
