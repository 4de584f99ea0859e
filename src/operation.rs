//! Long-running bootloader operations that report progress as they go.

use std::iter::Enumerate;
use std::slice::{Chunks, ChunksMut};
use std::vec;

use crate::bootloader::{Bootloader, READ_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::flash::{in_application_window, Block, PROG_CHUNK_SIZE};
use crate::transport::Transport;

/// An operation split into many bootloader commands. Each step yields the amount of work done so
/// far (blocks or bytes) out of [`total`]. The iterator is fused after the first error.
///
/// [`total`]: #tymethod.total
pub trait Operation: Iterator<Item = Result<usize>> {
    fn total(&self) -> usize;

    /// Runs the operation to completion, returning the first error.
    fn execute(&mut self) -> Result<()> {
        for step in self {
            step?;
        }
        Ok(())
    }
}

/// Erases blocks one by one, in the order given.
pub struct Erase<'a, T: Transport> {
    handle: &'a mut Bootloader<T>,
    blocks: vec::IntoIter<Block>,
    count: usize,
    done: bool,
}

impl<T: Transport> Operation for Erase<'_, T> {
    fn total(&self) -> usize {
        self.count
    }
}

impl<T: Transport> Iterator for Erase<'_, T> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let block = match self.blocks.next() {
            Some(block) => block,
            None => {
                self.done = true;
                return None;
            }
        };

        Some(match self.handle.erase(block) {
            Ok(()) => Ok(self.count - self.blocks.len()),
            Err(error) => {
                // Ensure that the iterator is fused after an error occurs
                self.done = true;
                Err(error)
            }
        })
    }
}

impl<'a, T: Transport> Erase<'a, T> {
    pub fn blocks<I: IntoIterator<Item = Block>>(handle: &'a mut Bootloader<T>, blocks: I) -> Self {
        let blocks: Vec<Block> = blocks.into_iter().collect();
        Self {
            handle,
            done: blocks.is_empty(),
            count: blocks.len(),
            blocks: blocks.into_iter(),
        }
    }
}

/// Programs a buffer into application flash in [`PROG_CHUNK_SIZE`] pieces. Every chunk is
/// checked against the application window before it is sent.
pub struct Program<'a, 'd, T: Transport> {
    handle: &'a mut Bootloader<T>,
    address: u32,
    chunks: Enumerate<Chunks<'d, u8>>,
    length: usize,
    done: bool,
}

impl<T: Transport> Operation for Program<'_, '_, T> {
    fn total(&self) -> usize {
        self.length
    }
}

impl<T: Transport> Iterator for Program<'_, '_, T> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some((i, chunk)) = self.chunks.next() {
            let offset = i * PROG_CHUNK_SIZE;
            let address = self.address.wrapping_add(offset as u32);
            let result = if in_application_window(address, chunk.len()) {
                self.handle.prog(address, chunk)
            } else {
                Err(Error::AddressOutOfWindow {
                    address,
                    length: chunk.len(),
                })
            };
            Some(match result {
                Ok(()) => Ok(offset + chunk.len()),
                Err(error) => {
                    self.done = true;
                    Err(error)
                }
            })
        } else {
            self.done = true;
            None
        }
    }
}

impl<'a, 'd, T: Transport> Program<'a, 'd, T> {
    pub fn at(handle: &'a mut Bootloader<T>, data: &'d [u8], address: u32) -> Self {
        Self {
            handle,
            address,
            chunks: data.chunks(PROG_CHUNK_SIZE).enumerate(),
            length: data.len(),
            done: data.is_empty(),
        }
    }
}

/// Reads target memory into a buffer in [`READ_CHUNK_SIZE`] pieces.
pub struct Read<'a, 'd, T: Transport> {
    handle: &'a mut Bootloader<T>,
    address: u32,
    chunks: Enumerate<ChunksMut<'d, u8>>,
    length: usize,
    done: bool,
}

impl<T: Transport> Operation for Read<'_, '_, T> {
    fn total(&self) -> usize {
        self.length
    }
}

impl<T: Transport> Iterator for Read<'_, '_, T> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some((i, chunk)) = self.chunks.next() {
            let offset = i * READ_CHUNK_SIZE;
            let address = self.address.wrapping_add(offset as u32);
            let result = self
                .handle
                .read_big(address, chunk.len())
                .and_then(|data| {
                    if data.len() == chunk.len() {
                        chunk.copy_from_slice(&data);
                        Ok(())
                    } else {
                        Err(Error::ShortTransfer {
                            expected: chunk.len(),
                            actual: data.len(),
                        })
                    }
                });
            Some(match result {
                Ok(()) => Ok(offset + chunk.len()),
                Err(error) => {
                    self.done = true;
                    Err(error)
                }
            })
        } else {
            self.done = true;
            None
        }
    }
}

impl<'a, 'd, T: Transport> Read<'a, 'd, T> {
    pub fn at(handle: &'a mut Bootloader<T>, buffer: &'d mut [u8], address: u32) -> Self {
        Self {
            handle,
            address,
            length: buffer.len(),
            done: buffer.is_empty(),
            chunks: buffer.chunks_mut(READ_CHUNK_SIZE).enumerate(),
        }
    }
}
