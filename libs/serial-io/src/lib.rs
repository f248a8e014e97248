//! Double buffered serial transport.
//!
//! A [`SerialPort`] sits between the UART interrupt and the tasks of the link. The interrupt
//! feeds received bytes in with [`SerialPort::on_rx`] and pulls bytes to send with
//! [`SerialPort::on_tx`]. Tasks use the [`embedded_io_async`] halves returned by
//! [`SerialPort::split`].

#![cfg_attr(any(not(test), target_arch = "arm"), no_std)]

pub(crate) mod fmt;

mod port;

pub use port::{SerialConfig, SerialPort, SerialRx, SerialTx};
