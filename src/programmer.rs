//! The complete firmware update sequence.
//!
//! A run walks through a fixed list of stages. Each stage is only entered after the previous
//! one succeeded, and the first failure ends the run without any retry or rollback:
//!
//! 1. status check
//! 2. flash unlock
//! 3. erase of all application blocks
//! 4. flash lock, followed by another unlock
//! 5. programming in [`PROGRAM_BLOCK_SIZE`] blocks of [`PROG_CHUNK_SIZE`] chunks
//! 6. verification in [`VERIFY_CHUNK_SIZE`] chunks
//! 7. reset into the application
//!
//! Verification mismatches are reported but do not end the run unless
//! [`FlashOptions::abort_on_mismatch`] is set.
//!
//! [`PROG_CHUNK_SIZE`]: crate::flash::PROG_CHUNK_SIZE

use crate::bootloader::{Bootloader, Status};
use crate::error::{Error, Result};
use crate::flash::{application_blocks, APPLICATION_BASE};
use crate::operation::{Erase, Operation, Program};
use crate::transport::Transport;
use log::{info, warn};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

/// The firmware image is read and programmed in blocks of this size.
pub const PROGRAM_BLOCK_SIZE: usize = 0x400;

/// The firmware image is verified in chunks of this size, one `READ_BIG` each.
pub const VERIFY_CHUNK_SIZE: usize = 0x40;

/// Progress of a flashing run. Stages are passed strictly in declaration order.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum Stage {
    Idle,
    StatusChecked,
    Unlocked,
    Erased,
    Locked,
    ReUnlocked,
    Programmed,
    Verified,
    Reset,
}

impl Stage {
    /// The stage following this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Idle => Some(Stage::StatusChecked),
            Stage::StatusChecked => Some(Stage::Unlocked),
            Stage::Unlocked => Some(Stage::Erased),
            Stage::Erased => Some(Stage::Locked),
            Stage::Locked => Some(Stage::ReUnlocked),
            Stage::ReUnlocked => Some(Stage::Programmed),
            Stage::Programmed => Some(Stage::Verified),
            Stage::Verified => Some(Stage::Reset),
            Stage::Reset => None,
        }
    }
}

/// Tunables of a flashing run.
#[derive(Clone, Debug, Default)]
pub struct FlashOptions {
    /// End the run at the first verification mismatch instead of collecting all of them.
    pub abort_on_mismatch: bool,
}

/// A verification chunk whose flash contents differ from the image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mismatch {
    pub address: u32,
    pub expected: Vec<u8>,
    pub actual: Vec<u8>,
}

impl Mismatch {
    /// Offset of the first differing byte within the chunk.
    pub fn first_difference(&self) -> Option<usize> {
        self.expected
            .iter()
            .zip(self.actual.iter())
            .position(|(e, a)| e != a)
            .or_else(|| {
                if self.expected.len() != self.actual.len() {
                    Some(self.expected.len().min(self.actual.len()))
                } else {
                    None
                }
            })
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "verification failed for block of length 0x{:x} at address 0x{:08x}",
            self.expected.len(),
            self.address
        )?;
        writeln!(f, "  expected: {:02x?}", self.expected)?;
        write!(f, "  actual:   {:02x?}", self.actual)
    }
}

/// Outcome of a completed run.
#[derive(Clone, Debug)]
pub struct FlashReport {
    /// Last stage reached.
    pub stage: Stage,

    /// Number of image bytes sent with `PROG`.
    pub bytes_programmed: usize,

    /// Number of [`VERIFY_CHUNK_SIZE`] chunks read back.
    pub chunks_verified: usize,

    /// All verification mismatches, in address order.
    pub mismatches: Vec<Mismatch>,
}

impl FlashReport {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            bytes_programmed: 0,
            chunks_verified: 0,
            mismatches: Vec::new(),
        }
    }

    /// Whether the flash contents matched the image everywhere.
    pub fn is_verified(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Receives progress feedback during a run. All methods default to doing nothing.
pub trait Observer {
    /// Work towards `stage` begins. `total` is the number of units (blocks or bytes) the
    /// following [`progress`] calls count up to, or 0 for single-command stages.
    ///
    /// [`progress`]: #method.progress
    fn start(&mut self, _stage: Stage, _total: usize) {}

    fn progress(&mut self, _done: usize) {}

    /// `stage` has been reached.
    fn reached(&mut self, _stage: Stage) {}

    fn mismatch(&mut self, _mismatch: &Mismatch) {}
}

/// An observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoObserver;

impl Observer for NoObserver {}

/// Drives a complete firmware update over a bootloader connection.
pub struct FlashProgrammer<'a, T: Transport, O: Observer = NoObserver> {
    bootloader: &'a mut Bootloader<T>,
    options: FlashOptions,
    observer: O,
    report: FlashReport,
}

impl<'a, T: Transport> FlashProgrammer<'a, T, NoObserver> {
    pub fn new(bootloader: &'a mut Bootloader<T>, options: FlashOptions) -> Self {
        Self::with_observer(bootloader, options, NoObserver)
    }
}

impl<'a, T: Transport, O: Observer> FlashProgrammer<'a, T, O> {
    pub fn with_observer(bootloader: &'a mut Bootloader<T>, options: FlashOptions, observer: O) -> Self {
        Self {
            bootloader,
            options,
            observer,
            report: FlashReport::new(),
        }
    }

    /// The stage reached so far.
    pub fn stage(&self) -> Stage {
        self.report.stage
    }

    /// Gives back the observer, e.g. to finish progress displays.
    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Runs the whole sequence with `image` as a flat binary to be placed at
    /// [`APPLICATION_BASE`]. The image is read twice: once for programming and once for
    /// verification.
    ///
    /// [`APPLICATION_BASE`]: crate::flash::APPLICATION_BASE
    pub fn run<R: Read + Seek>(&mut self, image: &mut R) -> Result<FlashReport> {
        info!("checking status...");
        self.observer.start(Stage::StatusChecked, 0);
        let status = self.bootloader.status_request()?;
        self.guard(status, Stage::StatusChecked)?;

        info!("unlocking flash...");
        self.observer.start(Stage::Unlocked, 0);
        let status = self.bootloader.flash_unlock()?;
        self.guard(status, Stage::Unlocked)?;

        info!("erasing...");
        self.erase()?;
        self.advance(Stage::Erased);

        info!("locking flash...");
        self.observer.start(Stage::Locked, 0);
        let status = self.bootloader.flash_lock()?;
        self.guard(status, Stage::Locked)?;

        // The known-good sequence locks and unlocks once more between erasing and programming.
        info!("unlocking flash...");
        self.observer.start(Stage::ReUnlocked, 0);
        let status = self.bootloader.flash_unlock()?;
        self.guard(status, Stage::ReUnlocked)?;

        info!("programming...");
        self.program(image)?;
        self.advance(Stage::Programmed);

        info!("verifying...");
        self.verify(image)?;
        self.advance(Stage::Verified);

        info!("resetting...");
        self.observer.start(Stage::Reset, 0);
        let status = self.bootloader.reset()?;
        self.guard(status, Stage::Reset)?;

        if self.report.is_verified() {
            info!("programming complete!");
        } else {
            warn!(
                "programming complete with {} verification mismatches",
                self.report.mismatches.len()
            );
        }
        Ok(self.report.clone())
    }

    fn advance(&mut self, stage: Stage) {
        debug_assert_eq!(self.report.stage.next(), Some(stage));
        self.report.stage = stage;
        self.observer.reached(stage);
    }

    fn guard(&mut self, status: Status, stage: Stage) -> Result<()> {
        if status.is_success() {
            self.advance(stage);
            Ok(())
        } else {
            Err(Error::StatusFailed { stage, status })
        }
    }

    fn erase(&mut self) -> Result<()> {
        let mut erase = Erase::blocks(&mut *self.bootloader, application_blocks());
        self.observer.start(Stage::Erased, erase.total());
        for step in &mut erase {
            self.observer.progress(step?);
        }
        Ok(())
    }

    fn program<R: Read + Seek>(&mut self, image: &mut R) -> Result<()> {
        let total = image.seek(SeekFrom::End(0))? as usize;
        image.seek(SeekFrom::Start(0))?;
        self.observer.start(Stage::Programmed, total);

        let mut block = vec![0u8; PROGRAM_BLOCK_SIZE];
        let mut offset = 0;
        loop {
            let length = read_full(image, &mut block)?;
            if length == 0 {
                break;
            }
            if length != PROGRAM_BLOCK_SIZE {
                return Err(Error::TransferTruncated {
                    offset,
                    expected: PROGRAM_BLOCK_SIZE,
                    actual: length,
                });
            }

            let address = APPLICATION_BASE.wrapping_add(offset as u32);
            let mut program = Program::at(&mut *self.bootloader, &block, address);
            for step in &mut program {
                self.observer.progress(offset + step?);
            }

            offset += length;
            self.report.bytes_programmed = offset;
        }
        Ok(())
    }

    fn verify<R: Read + Seek>(&mut self, image: &mut R) -> Result<()> {
        let total = image.seek(SeekFrom::End(0))? as usize;
        image.seek(SeekFrom::Start(0))?;
        self.observer.start(Stage::Verified, total);

        let mut expected = [0u8; VERIFY_CHUNK_SIZE];
        let mut offset = 0;
        loop {
            let length = read_full(image, &mut expected)?;
            if length == 0 {
                break;
            }
            if length != VERIFY_CHUNK_SIZE {
                return Err(Error::TransferTruncated {
                    offset,
                    expected: VERIFY_CHUNK_SIZE,
                    actual: length,
                });
            }

            let address = APPLICATION_BASE.wrapping_add(offset as u32);
            let actual = self.bootloader.read_big(address, VERIFY_CHUNK_SIZE)?;
            if actual[..] != expected[..] {
                let mismatch = Mismatch {
                    address,
                    expected: expected.to_vec(),
                    actual,
                };
                warn!("{}", mismatch);
                self.observer.mismatch(&mismatch);
                self.report.mismatches.push(mismatch);
                if self.options.abort_on_mismatch {
                    return Err(Error::VerificationMismatch { address });
                }
            }

            offset += length;
            self.report.chunks_verified += 1;
            self.observer.progress(offset);
        }
        Ok(())
    }
}

/// Fills `buffer` from `reader` as far as possible. Returns less than `buffer.len()` only at the
/// end of the stream.
fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
