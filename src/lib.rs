//! This crate provides a way to interact with a microcontroller running the PDC002 bootloader
//! connected via USB and exposes all bootloader functions.
//!
//! The bootloader speaks a fixed 64-byte packet protocol over a pair of interrupt endpoints (see
//! [`packet`]). On top of that, [`Bootloader`] implements the command set and
//! [`FlashProgrammer`] the complete erase, program, verify and reset sequence.
//!
//! # Example: Basic flashing
//! ```rust, no_run
//! use pdc002::{Context, DeviceConfig, FlashOptions, FlashProgrammer};
//! use std::fs::File;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut image = File::open("firmware.bin")?;
//!
//! // Find the bootloader and claim its interface
//! let context = Context::new()?;
//! let mut bootloader = context.open(&DeviceConfig::default())?;
//!
//! // Erase, program, verify and start the new firmware
//! let report = FlashProgrammer::new(&mut bootloader, FlashOptions::default()).run(&mut image)?;
//!
//! for mismatch in &report.mismatches {
//!     println!("{}", mismatch);
//! }
//! println!("Done!");
//! # Ok(())
//! # }
//! ```
//!
//! Single commands are available on [`Bootloader`] directly, and the [`Operation`] trait gives
//! progress feedback for multi-command erase, program and read operations. Any type
//! implementing [`Transport`] can stand in for the USB connection.

mod bootloader;
mod command;
mod context;
mod error;
mod flash;
pub mod messages;
mod operation;
pub mod packet;
mod programmer;
mod transport;

pub use bootloader::{
    Bootloader, Status, MAX_PROG_DATA, MAX_READ_BIG, MAX_READ_SMALL, READ_CHUNK_SIZE,
};
pub use command::{Command, Reply};
pub use context::{
    Context, DeviceConfig, DeviceInfo, UsbContext, ENDPOINT_IN, ENDPOINT_OUT, INTERFACE,
    PRODUCT_ID, VENDOR_ID,
};
pub use error::{Error, Result};
pub use flash::{
    application_blocks, in_application_window, Block, APPLICATION_BASE, APPLICATION_BLOCKS,
    APPLICATION_END, BLOCK_SIZE, FLASH_BASE, PROG_CHUNK_SIZE, READ_BIG_CHUNK_SIZE,
};
pub use operation::{Erase, Operation, Program, Read};
pub use packet::{Frame, Packet};
pub use programmer::{
    FlashOptions, FlashProgrammer, FlashReport, Mismatch, NoObserver, Observer, Stage,
    PROGRAM_BLOCK_SIZE, VERIFY_CHUNK_SIZE,
};
pub use transport::{Transport, UsbTransport};

/// Default timeout for all usb transactions.
pub const TIMEOUT: std::time::Duration = std::time::Duration::from_millis(1000);
