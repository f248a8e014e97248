//! Storage primitives for the serial link.
//!
//! Everything in here has a capacity fixed at compile time:
//!
//! * [`Buffer`] is a single byte buffer that is written once, closed and then drained.
//! * [`DoubleBuffer`] pairs two buffers so an interrupt can fill (or drain) one while a task
//!   works on the other.
//! * [`BufferPool`] keeps buffers for whole packets and hands out [`PoolBuffer`] handles to them.
//!   Tasks wait when every buffer is in flight.

#![cfg_attr(any(not(test), target_arch = "arm"), no_std)]

pub(crate) mod fmt;

pub mod buffer;
pub mod double_buffer;
pub mod pool;

pub use buffer::{Buffer, BufferFull};
pub use double_buffer::{DoubleBuffer, Slot};
pub use pool::{BufferPool, PoolBuffer, PoolError};
