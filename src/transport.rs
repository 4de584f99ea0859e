//! Raw frame transfers between host and bootloader.

use crate::error::{Error, Result};
use crate::packet::{Frame, FRAME_SIZE};
use log::{debug, trace, warn};
use rusb::{DeviceHandle, UsbContext};
use std::time::Duration;

/// Blocking exchange of whole frames with the bootloader.
///
/// The bootloader client only ever has one exchange in flight, so implementations need not
/// buffer or reorder anything.
pub trait Transport {
    /// Sends a frame to the device.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Receives the next frame from the device.
    fn read_frame(&mut self) -> Result<Frame>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn read_frame(&mut self) -> Result<Frame> {
        (**self).read_frame()
    }
}

/// Transport over the PDC002's interrupt endpoints.
///
/// Owns the device handle and the claimed interface for the lifetime of a session. The interface
/// is released when the transport is dropped, on every exit path.
pub struct UsbTransport<T: UsbContext> {
    // USB device handle for the raw communication.
    handle: DeviceHandle<T>,

    interface: u8,
    endpoint_out: u8,
    endpoint_in: u8,
    timeout: Duration,
}

impl<T: UsbContext> UsbTransport<T> {
    /// Claims `interface` on an opened device. On failure, the handle is dropped and nothing is
    /// left claimed.
    pub(crate) fn claim(
        mut handle: DeviceHandle<T>,
        interface: u8,
        endpoint_out: u8,
        endpoint_in: u8,
        timeout: Duration,
    ) -> Result<Self> {
        handle
            .claim_interface(interface)
            .map_err(Error::DeviceUnavailable)?;
        debug!("claimed interface {}", interface);

        Ok(Self {
            handle,
            interface,
            endpoint_out,
            endpoint_in,
            timeout,
        })
    }

    /// Timeout applied to every transfer.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Underlying device handle.
    pub fn handle(&self) -> &DeviceHandle<T> {
        &self.handle
    }
}

impl<T: UsbContext> Transport for UsbTransport<T> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let written = self
            .handle
            .write_interrupt(self.endpoint_out, frame, self.timeout)?;
        if written != FRAME_SIZE {
            return Err(Error::ShortTransfer {
                expected: FRAME_SIZE,
                actual: written,
            });
        }
        trace!("> {:02x?}", &frame[..]);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let mut frame = [0u8; FRAME_SIZE];
        let read = self
            .handle
            .read_interrupt(self.endpoint_in, &mut frame, self.timeout)?;
        if read != FRAME_SIZE {
            return Err(Error::ShortTransfer {
                expected: FRAME_SIZE,
                actual: read,
            });
        }
        trace!("< {:02x?}", &frame[..]);
        Ok(frame)
    }
}

impl<T: UsbContext> Drop for UsbTransport<T> {
    fn drop(&mut self) {
        match self.handle.release_interface(self.interface) {
            Ok(()) => debug!("released interface {}", self.interface),
            Err(error) => warn!("could not release interface {}: {}", self.interface, error),
        }
    }
}
