//! Runs complete flashing sequences against a simulated PDC002 bootloader.

use pdc002::packet::{self, Frame};
use pdc002::{
    Block, Bootloader, Command, Error, FlashOptions, FlashProgrammer, Stage, Transport,
    APPLICATION_BASE, APPLICATION_END, FLASH_BASE, READ_BIG_CHUNK_SIZE,
};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::io::Cursor;

const FLASH_SIZE: usize = 0x1_0000;

/// The device erases the whole 1 KiB page containing the requested block.
const PAGE_SIZE: usize = 0x400;

/// A bootloader with 64 KiB of flash that behaves like the real device: erasing sets bytes to
/// `0xff`, programming can only clear bits, and both require the flash to be unlocked.
struct SimulatedDevice {
    flash: Vec<u8>,
    unlocked: bool,
    erased: Vec<u8>,
    reset: bool,
    /// Bits that stay set whatever is programmed, as (address, mask).
    stuck_bits: Vec<(u32, u8)>,
    /// Status requests answer with an error when set.
    failing: Option<Command>,
    pending: VecDeque<Frame>,
}

impl SimulatedDevice {
    fn new() -> Self {
        Self {
            flash: vec![0x00; FLASH_SIZE],
            unlocked: false,
            erased: Vec::new(),
            reset: false,
            stuck_bits: Vec::new(),
            failing: None,
            pending: VecDeque::new(),
        }
    }

    fn offset(address: u32) -> usize {
        (address - FLASH_BASE) as usize
    }

    fn memory(&self, address: u32, length: usize) -> &[u8] {
        let offset = Self::offset(address);
        &self.flash[offset..offset + length]
    }

    fn status(&mut self, command: Command) {
        let reply = if self.failing == Some(command) {
            Command::StatusError
        } else {
            Command::StatusSuccess
        };
        self.pending
            .push_back(packet::encode(reply.code(), &[]).unwrap());
    }
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl Transport for SimulatedDevice {
    fn write_frame(&mut self, frame: &Frame) -> pdc002::Result<()> {
        assert!(self.pending.is_empty(), "new request before all replies were read");
        assert_eq!(packet::validate(frame), Ok(()));
        assert!(!self.reset, "request after reset");

        let (kind, payload) = packet::decode(frame);
        match Command::try_from(kind) {
            Ok(Command::StatusRequest) => self.status(Command::StatusRequest),
            Ok(Command::FlashUnlock) => {
                self.unlocked = self.failing != Some(Command::FlashUnlock);
                self.status(Command::FlashUnlock);
            }
            Ok(Command::FlashLock) => {
                self.unlocked = false;
                self.status(Command::FlashLock);
            }
            Ok(Command::Erase) => {
                let address = le_u32(payload);
                if self.unlocked {
                    let offset = Self::offset(address) / PAGE_SIZE * PAGE_SIZE;
                    for byte in &mut self.flash[offset..offset + PAGE_SIZE] {
                        *byte = 0xff;
                    }
                    self.erased.push(payload[1]);
                }
            }
            Ok(Command::Prog) => {
                let address = le_u32(payload);
                let length = payload[4] as usize;
                assert!(length <= 40);
                assert!(address >= APPLICATION_BASE);
                assert!(address + length as u32 <= APPLICATION_END);
                if self.unlocked {
                    for (i, &data) in payload[5..5 + length].iter().enumerate() {
                        let target = address + i as u32;
                        let stuck = self
                            .stuck_bits
                            .iter()
                            .filter(|(a, _)| *a == target)
                            .fold(0u8, |mask, (_, m)| mask | m);
                        let offset = Self::offset(target);
                        self.flash[offset] &= data | stuck;
                    }
                }
            }
            Ok(Command::ReadBig) => {
                let address = le_u32(payload);
                let count = u16::from_le_bytes([payload[4], payload[5]]) as usize;
                let data = self.memory(address, count).to_vec();
                for chunk in data.chunks(READ_BIG_CHUNK_SIZE) {
                    self.pending
                        .push_back(packet::encode(Command::ReadBig.code(), chunk).unwrap());
                }
            }
            Ok(Command::Reset) => {
                self.status(Command::Reset);
                self.reset = self.failing != Some(Command::Reset);
            }
            other => panic!("unexpected request {:?}", other),
        }
        Ok(())
    }

    fn read_frame(&mut self) -> pdc002::Result<Frame> {
        self.pending
            .pop_front()
            .ok_or(Error::Usb(rusb::Error::Timeout))
    }
}

fn firmware(length: usize) -> Vec<u8> {
    (0..length).map(|i| (i * 31 + i / 256) as u8).collect()
}

#[test]
fn flashes_and_starts_firmware() {
    let image = firmware(0x1800);
    let mut bootloader = Bootloader::new(SimulatedDevice::new());

    let report = FlashProgrammer::new(&mut bootloader, FlashOptions::default())
        .run(&mut Cursor::new(&image))
        .unwrap();

    assert_eq!(report.stage, Stage::Reset);
    assert!(report.is_verified());
    assert_eq!(report.bytes_programmed, image.len());
    assert_eq!(report.chunks_verified, image.len() / 0x40);

    let device = bootloader.into_transport();
    assert!(device.reset);
    assert_eq!(device.erased, (0x2c..=0xf8).collect::<Vec<u8>>());
    assert_eq!(device.memory(APPLICATION_BASE, image.len()), &image[..]);

    // Erased but unprogrammed application flash, untouched flash below it
    let end = APPLICATION_BASE + image.len() as u32;
    assert_eq!(
        Block::from_index(0xf8).begin() as usize / PAGE_SIZE,
        (APPLICATION_END as usize - 1) / PAGE_SIZE
    );
    assert!(device
        .memory(end, (APPLICATION_END - end) as usize)
        .iter()
        .all(|&b| b == 0xff));
    assert!(device.memory(FLASH_BASE, 0x2c00).iter().all(|&b| b == 0x00));
}

#[test]
fn fills_the_whole_application_window() {
    let image = firmware((APPLICATION_END - APPLICATION_BASE) as usize);
    let mut bootloader = Bootloader::new(SimulatedDevice::new());

    let report = FlashProgrammer::new(&mut bootloader, FlashOptions::default())
        .run(&mut Cursor::new(&image))
        .unwrap();
    assert!(report.is_verified());

    let device = bootloader.into_transport();
    assert_eq!(device.memory(APPLICATION_BASE, image.len()), &image[..]);
}

#[test]
fn stuck_bits_are_reported_without_aborting() {
    let image = vec![0x00u8; 0x400];
    let mut device = SimulatedDevice::new();
    device.stuck_bits.push((APPLICATION_BASE + 10, 0x80));
    device.stuck_bits.push((APPLICATION_BASE + 0x3ff, 0x01));
    let mut bootloader = Bootloader::new(device);

    let report = FlashProgrammer::new(&mut bootloader, FlashOptions::default())
        .run(&mut Cursor::new(&image))
        .unwrap();

    assert_eq!(report.stage, Stage::Reset);
    assert_eq!(report.chunks_verified, 0x10);
    let addresses: Vec<u32> = report.mismatches.iter().map(|m| m.address).collect();
    assert_eq!(addresses, vec![APPLICATION_BASE, APPLICATION_BASE + 0x3c0]);
    assert_eq!(report.mismatches[0].first_difference(), Some(10));
    assert_eq!(report.mismatches[0].actual[10], 0x80);
    assert!(bootloader.into_transport().reset);
}

#[test]
fn abort_on_mismatch_skips_reset() {
    let image = vec![0x00u8; 0x400];
    let mut device = SimulatedDevice::new();
    device.stuck_bits.push((APPLICATION_BASE + 0x100, 0x01));
    let mut bootloader = Bootloader::new(device);

    let options = FlashOptions {
        abort_on_mismatch: true,
    };
    let result = FlashProgrammer::new(&mut bootloader, options).run(&mut Cursor::new(&image));
    match result {
        Err(Error::VerificationMismatch { address }) => {
            assert_eq!(address, APPLICATION_BASE + 0x100)
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(!bootloader.into_transport().reset);
}

#[test]
fn failed_unlock_stops_before_erasing() {
    let mut device = SimulatedDevice::new();
    device.failing = Some(Command::FlashUnlock);
    let mut bootloader = Bootloader::new(device);

    let mut programmer = FlashProgrammer::new(&mut bootloader, FlashOptions::default());
    let result = programmer.run(&mut Cursor::new(firmware(0x400)));
    assert!(matches!(
        result,
        Err(Error::StatusFailed {
            stage: Stage::Unlocked,
            ..
        })
    ));
    assert_eq!(programmer.stage(), Stage::StatusChecked);

    let device = bootloader.into_transport();
    assert!(device.erased.is_empty());
    assert!(device.flash.iter().all(|&b| b == 0x00));
}

#[test]
fn failed_reset_is_reported() {
    let image = firmware(0x400);
    let mut device = SimulatedDevice::new();
    device.failing = Some(Command::Reset);
    let mut bootloader = Bootloader::new(device);

    let result = FlashProgrammer::new(&mut bootloader, FlashOptions::default())
        .run(&mut Cursor::new(&image));
    assert!(matches!(
        result,
        Err(Error::StatusFailed {
            stage: Stage::Reset,
            ..
        })
    ));

    // Flash has been written nonetheless
    let device = bootloader.into_transport();
    assert_eq!(device.memory(APPLICATION_BASE, image.len()), &image[..]);
}

#[test]
fn reads_memory_of_any_length() {
    let mut device = SimulatedDevice::new();
    for (i, byte) in device.flash.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    let expected = device.memory(FLASH_BASE + 0x123, 0x987).to_vec();
    let mut bootloader = Bootloader::new(device);

    let mut buffer = vec![0u8; 0x987];
    bootloader.read(FLASH_BASE + 0x123, &mut buffer).unwrap();
    assert_eq!(buffer, expected);

    assert_eq!(
        bootloader.read_big(FLASH_BASE + 0x123, 41).unwrap(),
        &expected[..41]
    );
}
