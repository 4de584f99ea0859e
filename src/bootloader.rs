use crate::command::{Command, Reply};
use crate::error::{Error, Result};
use crate::flash::{Block, READ_BIG_CHUNK_SIZE};
use crate::operation::Read;
use crate::packet::{self, Packet, MAX_PAYLOAD};
use crate::transport::Transport;
use log::{debug, warn};

/// Size of the `PROG` header: little-endian address and a length byte.
const PROG_HEADER: usize = 5;

/// Maximum data bytes a single `PROG` frame can carry.
pub const MAX_PROG_DATA: usize = MAX_PAYLOAD - PROG_HEADER;

/// Largest count accepted by `READ_SMALL`.
pub const MAX_READ_SMALL: usize = 64;

/// Largest count accepted by `READ_BIG`.
pub const MAX_READ_BIG: usize = 0xffff;

/// Chunk size used by [`Bootloader::read`] for memory dumps.
pub const READ_CHUNK_SIZE: usize = 0x400;

/// Status the bootloader reports for lock, unlock, reset and status requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Success,
    Error,
}

impl Status {
    /// Parses the command type of a status reply.
    pub fn from_code(code: u8) -> Option<Self> {
        match Command::try_from(code) {
            Ok(Command::StatusSuccess) => Some(Status::Success),
            Ok(Command::StatusError) => Some(Status::Error),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

/// Client for the PDC002 bootloader command set.
///
/// Every operation writes exactly one frame and then reads all replies the command produces
/// before returning, so there is never more than one exchange in flight.
pub struct Bootloader<T: Transport> {
    transport: T,
}

impl<T: Transport> Bootloader<T> {
    /// Wraps a transport. The bootloader holds it exclusively until [`into_transport`] is called.
    ///
    /// [`into_transport`]: #method.into_transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Asks whether the bootloader is ready.
    pub fn status_request(&mut self) -> Result<Status> {
        self.status_command(Command::StatusRequest)
    }

    /// Locks the flash against writes.
    pub fn flash_lock(&mut self) -> Result<Status> {
        self.status_command(Command::FlashLock)
    }

    /// Unlocks the flash for erasing and programming.
    pub fn flash_unlock(&mut self) -> Result<Status> {
        self.status_command(Command::FlashUnlock)
    }

    /// Leaves the bootloader and starts the application.
    pub fn reset(&mut self) -> Result<Status> {
        self.status_command(Command::Reset)
    }

    /// Erases a single block. The bootloader does not acknowledge this command.
    pub fn erase(&mut self, block: Block) -> Result<()> {
        debug!("erase block 0x{:02x}", block.index());
        self.send(Command::Erase, &block.erase_request())
    }

    /// Programs up to [`MAX_PROG_DATA`] bytes at `address`. The bootloader does not acknowledge
    /// this command, and the flash must have been erased and unlocked beforehand.
    pub fn prog(&mut self, address: u32, data: &[u8]) -> Result<()> {
        if data.len() > MAX_PROG_DATA {
            return Err(Error::Range {
                what: "PROG length",
                value: data.len(),
                min: 0,
                max: MAX_PROG_DATA,
            });
        }

        let mut request = Vec::with_capacity(PROG_HEADER + data.len());
        request.extend_from_slice(&address.to_le_bytes());
        request.push(data.len() as u8);
        request.extend_from_slice(data);
        debug!("prog {} bytes at 0x{:08x}", data.len(), address);
        self.send(Command::Prog, &request)
    }

    /// Reads between 1 and [`MAX_READ_SMALL`] bytes with a single reply frame.
    pub fn read_small(&mut self, address: u32, count: usize) -> Result<Vec<u8>> {
        check_count("READ_SMALL count", count, MAX_READ_SMALL)?;

        let mut request = [0u8; 5];
        request[0..4].copy_from_slice(&address.to_le_bytes());
        request[4] = count as u8;
        debug!("read_small {} bytes at 0x{:08x}", count, address);
        self.send(Command::ReadSmall, &request)?;

        let reply = self.receive()?;
        expect_echo(Command::ReadSmall, &reply)?;
        Ok(reply.payload)
    }

    /// Reads between 1 and [`MAX_READ_BIG`] bytes. The bootloader answers with one frame per
    /// [`READ_BIG_CHUNK_SIZE`] bytes, which are concatenated in arrival order.
    ///
    /// The request payload is 6 bytes: the little-endian address followed by the count as a
    /// little-endian `u16`. Counts up to 255 leave the last byte zero, so the first five bytes
    /// match the one-byte count form.
    pub fn read_big(&mut self, address: u32, count: usize) -> Result<Vec<u8>> {
        check_count("READ_BIG count", count, MAX_READ_BIG)?;

        let mut request = [0u8; 6];
        request[0..4].copy_from_slice(&address.to_le_bytes());
        request[4..6].copy_from_slice(&(count as u16).to_le_bytes());
        debug!("read_big {} bytes at 0x{:08x}", count, address);
        self.send(Command::ReadBig, &request)?;

        let replies = (count + READ_BIG_CHUNK_SIZE - 1) / READ_BIG_CHUNK_SIZE;
        let mut data = Vec::with_capacity(replies * READ_BIG_CHUNK_SIZE);
        for _ in 0..replies {
            let reply = self.receive()?;
            expect_echo(Command::ReadBig, &reply)?;
            data.extend_from_slice(&reply.payload);
        }

        if data.len() < count {
            warn!(
                "read_big at 0x{:08x} returned {} of {} bytes",
                address,
                data.len(),
                count
            );
        }
        data.truncate(count);
        Ok(data)
    }

    /// Reads target memory of any size into a buffer in [`READ_CHUNK_SIZE`] pieces.
    pub fn read(&mut self, address: u32, buffer: &mut [u8]) -> Result<()> {
        use crate::operation::Operation;
        Read::at(self, buffer, address).execute()
    }

    /// Sends a command that is answered with a single status frame.
    fn status_command(&mut self, command: Command) -> Result<Status> {
        debug_assert_eq!(command.reply(), Reply::Status);
        debug!("{:?}", command);
        self.send(command, &[])?;

        let reply = self.receive()?;
        let status = Status::from_code(reply.kind).ok_or(Error::ProtocolMismatch {
            request: command,
            reply: reply.kind,
        })?;
        debug!("{:?} -> {:?}", command, status);
        Ok(status)
    }

    fn send(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        if let Some(length) = command.request_len() {
            debug_assert_eq!(payload.len(), length, "{:?} request length", command);
        }
        let frame = packet::encode(command.code(), payload)?;
        self.transport.write_frame(&frame)
    }

    fn receive(&mut self) -> Result<Packet> {
        let frame = self.transport.read_frame()?;
        Ok(Packet::from_frame(&frame))
    }
}

fn check_count(what: &'static str, count: usize, max: usize) -> Result<()> {
    if count < 1 || count > max {
        Err(Error::Range {
            what,
            value: count,
            min: 1,
            max,
        })
    } else {
        Ok(())
    }
}

fn expect_echo(request: Command, reply: &Packet) -> Result<()> {
    debug_assert_eq!(request.reply(), Reply::Echo);
    if reply.kind == request.code() {
        Ok(())
    } else {
        Err(Error::ProtocolMismatch {
            request,
            reply: reply.kind,
        })
    }
}
