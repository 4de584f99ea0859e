use std::ops::RangeInclusive;

/// Address of the first byte in the target microcontroller's flash.
pub const FLASH_BASE: u32 = 0x0800_0000;

/// Granularity of the erase command's block index.
pub const BLOCK_SIZE: u32 = 0x100;

/// First byte of the application image.
pub const APPLICATION_BASE: u32 = 0x0800_2c00;

/// One past the last byte of the application image.
pub const APPLICATION_END: u32 = 0x0800_fc00;

/// Erase blocks covering the application image.
pub const APPLICATION_BLOCKS: RangeInclusive<u8> = 0x2c..=0xf8;

/// Maximum number of data bytes per `PROG` command the bootloader accepts.
pub const PROG_CHUNK_SIZE: usize = 0x28;

/// Number of data bytes each `READ_BIG` reply frame carries.
pub const READ_BIG_CHUNK_SIZE: usize = 0x28;

/// An erase block in the PDC002's flash memory.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub struct Block(u8);

impl Block {
    /// Creates a block from its index, starting at 0 at [`FLASH_BASE`], with each block being
    /// [`BLOCK_SIZE`] bytes.
    pub fn from_index(index: u8) -> Self {
        Self(index)
    }

    /// Refers to the block containing the given address. Returns `None` for addresses outside
    /// the 64 KiB the index can express.
    pub fn from_address(address: u32) -> Option<Self> {
        let offset = address.checked_sub(FLASH_BASE)? / BLOCK_SIZE;
        if offset > u32::from(u8::MAX) {
            None
        } else {
            Some(Self(offset as u8))
        }
    }

    /// The block index.
    pub fn index(self) -> u8 {
        self.0
    }

    /// The first address in a block.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pdc002::{Block, APPLICATION_BASE};
    ///
    /// assert_eq!(Block::from_index(0x2c).begin(), APPLICATION_BASE);
    /// ```
    pub fn begin(self) -> u32 {
        FLASH_BASE + u32::from(self.0) * BLOCK_SIZE
    }

    /// Returns the address of the last byte of a block.
    pub fn end(self) -> u32 {
        self.begin() + BLOCK_SIZE - 1
    }

    /// Payload of the `ERASE` command for this block: the block's start address in
    /// little-endian order, i.e. `00 <index> 00 08`.
    pub fn erase_request(self) -> [u8; 4] {
        self.begin().to_le_bytes()
    }
}

impl From<Block> for u8 {
    fn from(val: Block) -> Self {
        val.0
    }
}

impl From<u8> for Block {
    fn from(index: u8) -> Self {
        Self(index)
    }
}

/// Iterates over all blocks of the application image in ascending order.
pub fn application_blocks() -> impl Iterator<Item = Block> {
    APPLICATION_BLOCKS.map(Block::from_index)
}

/// Whether `length` bytes starting at `address` lie within the application image.
pub fn in_application_window(address: u32, length: usize) -> bool {
    address >= APPLICATION_BASE && u64::from(address) + length as u64 <= u64::from(APPLICATION_END)
}
