//! Payload layout shared with the control center.
//!
//! A payload buffer starts with the frame length byte followed by the destination address, the
//! source address and the message type. Everything after that is message specific.

use buffers::{Buffer, BufferFull};

use crate::format::FrameFormat;

pub const CONTROL_CENTER_ADDRESS: u8 = 1;
pub const NODE_ADDRESS: u8 = 2;

pub const MSG_ACK: u8 = 0x0A;
pub const MSG_ERR: u8 = 0x0B;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub length: u8,
    pub destination: u8,
    pub source: u8,
    pub kind: u8,
}

impl Header {
    pub const LEN: usize = 4;

    /// Split a received payload into its header and the message data.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<(Self, &[u8])> {
        let (&[length, destination, source, kind], data) = payload.split_first_chunk::<4>()?;
        Some((
            Self {
                length,
                destination,
                source,
                kind,
            },
            data,
        ))
    }
}

/// Single byte message sent from this node to the control center.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Notification {
    pub destination: u8,
    pub kind: u8,
    pub data: u8,
}

impl Notification {
    /// Bytes a notification occupies in a payload buffer.
    pub const LEN: usize = Header::LEN + 1;

    /// Report an error code.
    #[must_use]
    pub const fn error(code: u8) -> Self {
        Self {
            destination: CONTROL_CENTER_ADDRESS,
            kind: MSG_ERR,
            data: code,
        }
    }

    /// Acknowledge a message of type `kind`.
    #[must_use]
    pub const fn ack(kind: u8) -> Self {
        Self {
            destination: CONTROL_CENTER_ADDRESS,
            kind: MSG_ACK,
            data: kind,
        }
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; Self::LEN] {
        let length = FrameFormat::frame_len(Self::LEN - 1) as u8;
        [length, self.destination, NODE_ADDRESS, self.kind, self.data]
    }

    /// Replace the contents of `buffer` with this notification and close it.
    pub fn write_to<const N: usize>(self, buffer: &mut Buffer<N>) -> Result<(), BufferFull> {
        buffer.reset();
        buffer.extend_from_slice(&self.to_bytes())?;
        buffer.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use buffers::{Buffer, BufferFull};

    use super::{Header, Notification, CONTROL_CENTER_ADDRESS, MSG_ACK, MSG_ERR, NODE_ADDRESS};

    #[test]
    fn ack_matches_wire_layout() {
        assert_eq!(Notification::ack(5).to_bytes(), [0x09, 0x01, 0x02, 0x0A, 0x05]);
    }

    #[test]
    fn error_goes_to_control_center() {
        let mut buffer = Buffer::<24>::new();
        buffer.write(0xFF).unwrap();
        Notification::error(4).write_to(&mut buffer).unwrap();
        assert!(buffer.is_closed());
        assert_eq!(
            buffer.as_slice(),
            &[9, CONTROL_CENTER_ADDRESS, NODE_ADDRESS, MSG_ERR, 4]
        );
    }

    #[test]
    fn small_buffer_is_rejected() {
        let mut buffer = Buffer::<4>::new();
        assert_eq!(Notification::ack(1).write_to(&mut buffer), Err(BufferFull));
    }

    #[test]
    fn header_splits_payload() {
        let (header, data) = Header::parse(&[0x0B, 0x02, 0x01, 0x07, 0x10, 0x20]).unwrap();
        assert_eq!(
            header,
            Header {
                length: 0x0B,
                destination: NODE_ADDRESS,
                source: CONTROL_CENTER_ADDRESS,
                kind: 0x07,
            }
        );
        assert_eq!(data, &[0x10, 0x20]);

        let ack = Notification::ack(3).to_bytes();
        let (header, data) = Header::parse(&ack).unwrap();
        assert_eq!(header.kind, MSG_ACK);
        assert_eq!(data, &[3]);
    }

    #[test]
    fn short_payload_has_no_header() {
        assert_eq!(Header::parse(&[0x09, 0x01, 0x02]), None);
    }
}
