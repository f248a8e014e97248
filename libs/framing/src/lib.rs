//! Framing of payload buffers on a serial link.
//!
//! Frames look like this on the wire:
//!
//! ```text
//! +----------------+--------+------------------------+----------+
//! | preamble (3 B) | length | destination, source,   | checksum |
//! |                |        | type, data...          |          |
//! +----------------+--------+------------------------+----------+
//! ```
//!
//! `length` counts the whole frame. The checksum is the XOR of every byte before it, so the XOR
//! over a complete frame is zero. Payload buffers carry the length byte and everything up to the
//! checksum.
//!
//! A [`Link`] borrows a pool of payload buffers and owns the two queues. Its [`Parser`] turns
//! received bytes into payloads, its [`Framer`] sends queued payloads and its [`Reporter`]
//! answers faults with error notifications.

#![cfg_attr(any(not(test), target_arch = "arm"), no_std)]

pub(crate) mod fmt;

pub mod error;
pub mod format;
pub mod framer;
pub mod link;
pub mod message;
pub mod parser;
pub mod reporter;

pub use error::{LinkError, ProtocolError};
pub use format::{FrameFormat, PREAMBLE_LEN};
pub use framer::Framer;
pub use link::{Link, ERROR_RESERVE};
pub use message::{Header, Notification};
pub use parser::{Decoder, Parser, ParserState, Step};
pub use reporter::Reporter;
