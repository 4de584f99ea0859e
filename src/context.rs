use crate::bootloader::Bootloader;
use crate::error::{Error, Result};
use crate::transport::UsbTransport;
use log::{debug, info};
use std::time::Duration;

pub use rusb::UsbContext;

/// USB vendor ID of the PDC002 bootloader.
pub const VENDOR_ID: u16 = 0x0716;

/// USB product ID of the PDC002 bootloader.
pub const PRODUCT_ID: u16 = 0x5036;

/// Interface carrying the interrupt endpoints.
pub const INTERFACE: u8 = 0;

/// Interrupt OUT endpoint (host to device).
pub const ENDPOINT_OUT: u8 = 0x01;

/// Interrupt IN endpoint (device to host).
pub const ENDPOINT_IN: u8 = 0x81;

/// Where to find the bootloader and how to talk to it.
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
    pub endpoint_out: u8,
    pub endpoint_in: u8,

    /// Timeout for every single interrupt transfer.
    pub timeout: Duration,

    /// Detach a kernel driver bound to the interface (usually usbhid) before claiming it.
    pub detach_kernel_driver: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_ID,
            product_id: PRODUCT_ID,
            interface: INTERFACE,
            endpoint_out: ENDPOINT_OUT,
            endpoint_in: ENDPOINT_IN,
            timeout: crate::TIMEOUT,
            detach_kernel_driver: true,
        }
    }
}

impl DeviceConfig {
    /// Whether a device with these IDs is the configured bootloader.
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        vendor_id == self.vendor_id && product_id == self.product_id
    }
}

/// Location of a matching device on the USB.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
    /// USB bus ID the device is connected to.
    pub usb_bus_number: u8,

    /// USB device address of the device.
    pub usb_bus_address: u8,
}

/// Entry point for finding and opening PDC002 bootloaders.
pub struct Context {
    pub usb_context: rusb::Context,
}

impl Context {
    pub fn new() -> Result<Self> {
        let usb_context = rusb::Context::new().map_err(Error::DeviceUnavailable)?;
        Ok(Context { usb_context })
    }

    /// Lists all connected devices matching the configured vendor and product ID.
    pub fn find_devices(&self, config: &DeviceConfig) -> Result<Vec<DeviceInfo>> {
        Ok(self
            .matching_devices(config)?
            .iter()
            .map(|device| DeviceInfo {
                usb_bus_number: device.bus_number(),
                usb_bus_address: device.address(),
            })
            .collect())
    }

    /// Opens the first matching device and claims its interface. The session ends when the
    /// returned bootloader (and with it the transport) is dropped.
    pub fn open(&self, config: &DeviceConfig) -> Result<Bootloader<UsbTransport<rusb::Context>>> {
        let device = self
            .matching_devices(config)?
            .into_iter()
            .next()
            .ok_or(Error::DeviceNotFound {
                vendor_id: config.vendor_id,
                product_id: config.product_id,
            })?;

        info!(
            "opening {:04x}:{:04x} at bus {} address {}",
            config.vendor_id,
            config.product_id,
            device.bus_number(),
            device.address()
        );
        let mut handle = device.open().map_err(Error::DeviceUnavailable)?;

        if config.detach_kernel_driver {
            // Not supported on every platform; claiming reports the real problem if any.
            if let Err(error) = handle.set_auto_detach_kernel_driver(true) {
                debug!("kernel driver auto-detach unavailable: {}", error);
            }
        }

        let transport = UsbTransport::claim(
            handle,
            config.interface,
            config.endpoint_out,
            config.endpoint_in,
            config.timeout,
        )?;
        Ok(Bootloader::new(transport))
    }

    fn matching_devices(&self, config: &DeviceConfig) -> Result<Vec<rusb::Device<rusb::Context>>> {
        let mut devices = Vec::new();
        for device in self.usb_context.devices()?.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(_) => continue,
            };
            if config.matches(descriptor.vendor_id(), descriptor.product_id()) {
                devices.push(device);
            }
        }
        Ok(devices)
    }
}
