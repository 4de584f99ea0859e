//! Command codes understood by the PDC002 bootloader.

/// What the bootloader sends back after receiving a command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reply {
    /// Nothing is sent back.
    None,

    /// A single frame whose command type is [`Command::StatusSuccess`] or
    /// [`Command::StatusError`].
    Status,

    /// One or more frames carrying the request's own command type and the requested data.
    Echo,
}

/// Commands of the PDC002 packet protocol. The discriminant is the byte at offset 8 of a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Command {
    StatusError = 0x01,
    StatusSuccess = 0x02,
    StatusRequest = 0x03,
    FlashLock = 0x04,
    FlashUnlock = 0x05,
    Erase = 0x08,
    Prog = 0x09,
    ReadSmall = 0x0a,
    ReadBig = 0x0b,
    Reset = 0x17,
}

impl Command {
    /// All commands, in ascending code order.
    pub const ALL: [Command; 10] = [
        Command::StatusError,
        Command::StatusSuccess,
        Command::StatusRequest,
        Command::FlashLock,
        Command::FlashUnlock,
        Command::Erase,
        Command::Prog,
        Command::ReadSmall,
        Command::ReadBig,
        Command::Reset,
    ];

    /// The raw command byte.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The reply the bootloader answers this command with. The two status codes only ever
    /// travel from the device to the host and have no reply.
    pub fn reply(self) -> Reply {
        match self {
            Command::StatusRequest | Command::FlashLock | Command::FlashUnlock | Command::Reset => {
                Reply::Status
            }
            Command::ReadSmall | Command::ReadBig => Reply::Echo,
            Command::StatusError | Command::StatusSuccess | Command::Erase | Command::Prog => {
                Reply::None
            }
        }
    }

    /// Fixed length of the request payload, if the command has one. `Prog` carries a variable
    /// amount of data behind its 5-byte header and returns `None`.
    pub fn request_len(self) -> Option<usize> {
        match self {
            Command::StatusRequest | Command::FlashLock | Command::FlashUnlock | Command::Reset => {
                Some(0)
            }
            Command::Erase => Some(4),
            Command::ReadSmall => Some(5),
            Command::ReadBig => Some(6),
            Command::StatusError | Command::StatusSuccess | Command::Prog => None,
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        command as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    /// Looks up a command by its code and hands back unknown codes unchanged.
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .iter()
            .copied()
            .find(|command| command.code() == code)
            .ok_or(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for command in Command::ALL.iter() {
            assert_eq!(Command::try_from(command.code()), Ok(*command));
        }
        assert_eq!(Command::try_from(0x06), Err(0x06));
        assert_eq!(Command::try_from(0xff), Err(0xff));
    }

    #[test]
    fn reply_metadata() {
        assert_eq!(Command::StatusRequest.reply(), Reply::Status);
        assert_eq!(Command::Reset.reply(), Reply::Status);
        assert_eq!(Command::Erase.reply(), Reply::None);
        assert_eq!(Command::Prog.reply(), Reply::None);
        assert_eq!(Command::ReadBig.reply(), Reply::Echo);
        assert_eq!(Command::ReadSmall.request_len(), Some(5));
        assert_eq!(Command::Prog.request_len(), None);
    }
}
