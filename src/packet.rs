//! Framing of the PDC002 packet protocol.
//!
//! Every transfer in either direction is a single 64-byte frame:
//!
//! | offset | size | content                                  |
//! |-------:|-----:|------------------------------------------|
//! | 0      | 2    | magic `ff 55`                            |
//! | 2      | 6    | timestamp (constant filler)              |
//! | 8      | 1    | command type                             |
//! | 9      | 1    | payload length                           |
//! | 10     | 52   | payload, zero padded                     |
//! | 62     | 1    | byte sum of offsets 8 to 61              |
//! | 63     | 1    | byte sum of offsets 0 to 61              |

use crate::command::Command;
use crate::error::{Error, Result};
use std::result::Result as StdResult;

/// Size of every frame on the wire.
pub const FRAME_SIZE: usize = 64;

/// Maximum number of payload bytes a frame can carry.
pub const MAX_PAYLOAD: usize = 52;

/// Start-of-frame marker.
pub const MAGIC: [u8; 2] = [0xff, 0x55];

/// The device expects a timestamp but never checks it.
pub const TIMESTAMP: [u8; 6] = [0x16, 0x2e, 0xde, 0xdc, 0x2e, 0x13];

const TYPE_OFFSET: usize = 8;
const LENGTH_OFFSET: usize = 9;
const PAYLOAD_OFFSET: usize = 10;
const PAYLOAD_CHECKSUM_OFFSET: usize = 62;
const FRAME_CHECKSUM_OFFSET: usize = 63;

/// A raw frame as it is sent over or received from the interrupt endpoints.
pub type Frame = [u8; FRAME_SIZE];

/// A decoded frame: command type and payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    /// Raw command type. Kept as a byte because replies are not guaranteed to carry a known
    /// command.
    pub kind: u8,

    /// Payload bytes, without padding.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Creates a packet for a known command.
    pub fn new(command: Command, payload: &[u8]) -> Self {
        Self {
            kind: command.code(),
            payload: payload.to_vec(),
        }
    }

    /// Serialises the packet into a frame. See [`encode`].
    pub fn to_frame(&self) -> Result<Frame> {
        encode(self.kind, &self.payload)
    }

    /// Reconstructs a packet from a frame. See [`decode`].
    pub fn from_frame(frame: &Frame) -> Self {
        let (kind, payload) = decode(frame);
        Self {
            kind,
            payload: payload.to_vec(),
        }
    }

    /// Returns the command this packet carries if its type is a known command code.
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.kind).ok()
    }
}

/// Wrapping byte sum used for both frame checksums.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// Builds a frame from a command type and a payload of at most [`MAX_PAYLOAD`] bytes.
///
/// # Examples
///
/// ```rust
/// use pdc002::packet::{encode, FRAME_SIZE};
///
/// let frame = encode(0x03, &[]).unwrap();
/// assert_eq!(frame.len(), FRAME_SIZE);
/// assert_eq!(frame[8], 0x03);
/// assert_eq!(frame[9], 0x00);
/// ```
pub fn encode(kind: u8, payload: &[u8]) -> Result<Frame> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::PayloadTooLong(payload.len()));
    }

    let mut frame = [0u8; FRAME_SIZE];
    frame[..MAGIC.len()].copy_from_slice(&MAGIC);
    frame[MAGIC.len()..TYPE_OFFSET].copy_from_slice(&TIMESTAMP);
    frame[TYPE_OFFSET] = kind;
    frame[LENGTH_OFFSET] = payload.len() as u8;
    frame[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);

    frame[PAYLOAD_CHECKSUM_OFFSET] = checksum(&frame[TYPE_OFFSET..PAYLOAD_CHECKSUM_OFFSET]);
    frame[FRAME_CHECKSUM_OFFSET] = checksum(&frame[..PAYLOAD_CHECKSUM_OFFSET]);

    Ok(frame)
}

/// Splits a frame into command type and payload.
///
/// Nothing is validated: neither magic nor checksums are looked at, since the bootloader does
/// not frame its replies strictly. A length byte pointing past the end of the frame yields
/// whatever bytes remain. Use [`validate`] to check a frame explicitly.
pub fn decode(frame: &Frame) -> (u8, &[u8]) {
    let kind = frame[TYPE_OFFSET];
    let length = frame[LENGTH_OFFSET] as usize;
    let end = (PAYLOAD_OFFSET + length).min(FRAME_SIZE);
    (kind, &frame[PAYLOAD_OFFSET..end])
}

/// Reasons a frame fails [`validate`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FrameError {
    /// The frame does not start with [`MAGIC`].
    #[error("bad magic {:02x} {:02x}", .0[0], .0[1])]
    BadMagic([u8; 2]),

    /// The length byte exceeds [`MAX_PAYLOAD`].
    #[error("payload length {0} too large")]
    BadLength(u8),

    /// The checksum over type, length and payload is wrong.
    #[error("payload checksum 0x{actual:02x}, expected 0x{expected:02x}")]
    PayloadChecksum { expected: u8, actual: u8 },

    /// The checksum over the whole frame is wrong.
    #[error("frame checksum 0x{actual:02x}, expected 0x{expected:02x}")]
    FrameChecksum { expected: u8, actual: u8 },
}

/// Checks magic, payload length and both checksums of a frame. The client never calls this on
/// its own.
pub fn validate(frame: &Frame) -> StdResult<(), FrameError> {
    let magic = [frame[0], frame[1]];
    if magic != MAGIC {
        return Err(FrameError::BadMagic(magic));
    }

    if frame[LENGTH_OFFSET] as usize > MAX_PAYLOAD {
        return Err(FrameError::BadLength(frame[LENGTH_OFFSET]));
    }

    let expected = checksum(&frame[TYPE_OFFSET..PAYLOAD_CHECKSUM_OFFSET]);
    let actual = frame[PAYLOAD_CHECKSUM_OFFSET];
    if expected != actual {
        return Err(FrameError::PayloadChecksum { expected, actual });
    }

    let expected = checksum(&frame[..PAYLOAD_CHECKSUM_OFFSET]);
    let actual = frame[FRAME_CHECKSUM_OFFSET];
    if expected != actual {
        return Err(FrameError::FrameChecksum { expected, actual });
    }

    Ok(())
}
