use crate::bootloader::Status;
use crate::command::Command;
use crate::programmer::Stage;
use std::result::Result as StdResult;
use thiserror::Error;

/// Errors which can occur during device setup, communication and flashing.
#[derive(Debug, Error)]
pub enum Error {
    /// No USB device with the configured vendor and product ID is connected.
    #[error("no device with ID {vendor_id:04x}:{product_id:04x} found")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// The device exists but could not be opened or its interface could not be claimed.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(#[source] rusb::Error),

    /// An error occurred during the raw USB communication.
    #[error("USB transfer failed: {0}")]
    Usb(#[from] rusb::Error),

    /// An interrupt transfer moved fewer bytes than a full frame.
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    /// The device answered with a command type the request does not allow. `reply` is the raw
    /// command byte of the received frame.
    #[error("unexpected reply 0x{reply:02x} to {request:?}")]
    ProtocolMismatch { request: Command, reply: u8 },

    /// A numeric argument lies outside the bounds the protocol can express.
    #[error("{what} {value} out of range [{min}, {max}]")]
    Range {
        what: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    /// A payload does not fit into a single frame.
    #[error("payload of {0} bytes does not fit into a frame")]
    PayloadTooLong(usize),

    /// A programming request would touch flash outside the application window.
    #[error("{length} bytes at 0x{address:08x} lie outside the application flash")]
    AddressOutOfWindow { address: u32, length: usize },

    /// The firmware image ended in the middle of a block.
    #[error("firmware image truncated at offset 0x{offset:x}: read {actual} of {expected} bytes")]
    TransferTruncated {
        offset: usize,
        expected: usize,
        actual: usize,
    },

    /// Flash contents read back differ from the firmware image.
    #[error("verification failed at 0x{address:08x}")]
    VerificationMismatch { address: u32 },

    /// The bootloader reported an error status where the flashing sequence requires success.
    #[error("could not reach {stage:?}: bootloader reported {status:?}")]
    StatusFailed { stage: Stage, status: Status },

    /// Reading the firmware image failed.
    #[error("firmware image: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand for a Result with the crate's own Error type.
pub type Result<T> = StdResult<T, Error>;
