//! BulkUSB transport: a USB bulk-in/bulk-out endpoint pair (§4.2).
//!
//! Grounded in the teacher's `ThermalPrinter::new` (device open, kernel
//! driver detach, interface claim), generalized to scan every interface for
//! the first one exposing both a bulk-in and a bulk-out endpoint rather than
//! assuming interface 0 (§9: "the correct behavior is to scan").

use std::time::Duration;

use log::{debug, trace, warn};
use rusb::UsbContext;

use super::UsbFilter;
use crate::error::{NiimbotError, Result};

const WRITE_TIMEOUT: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct BulkUsb {
    handle: rusb::DeviceHandle<rusb::GlobalContext>,
    interface: u8,
    in_endpoint: u8,
    out_endpoint: u8,
}

fn matches_filter<T: UsbContext>(device: &rusb::Device<T>, filter: &UsbFilter) -> bool {
    match device.device_descriptor() {
        Ok(desc) => desc.vendor_id() == filter.vendor_id && desc.product_id() == filter.product_id,
        Err(_) => false,
    }
}

/// Scan every interface of the device's active (or first) configuration for
/// one exposing both a bulk-in and a bulk-out endpoint.
fn find_bulk_interface<T: UsbContext>(
    device: &rusb::Device<T>,
) -> Result<(u8, u8, u8)> {
    let config = device
        .active_config_descriptor()
        .or_else(|_| device.config_descriptor(0))
        .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;

    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            let mut in_ep = None;
            let mut out_ep = None;
            for endpoint in descriptor.endpoint_descriptors() {
                if endpoint.transfer_type() != rusb::TransferType::Bulk {
                    continue;
                }
                match endpoint.direction() {
                    rusb::Direction::In => in_ep = Some(endpoint.address()),
                    rusb::Direction::Out => out_ep = Some(endpoint.address()),
                }
            }
            if let (Some(in_ep), Some(out_ep)) = (in_ep, out_ep) {
                return Ok((interface.number(), in_ep, out_ep));
            }
        }
    }
    Err(NiimbotError::TransportUnavailable)
}

impl BulkUsb {
    pub fn open(filter: UsbFilter) -> Result<Self> {
        let devices = rusb::DeviceList::new().map_err(|e| NiimbotError::TransportIo(e.to_string()))?;
        let device = devices
            .iter()
            .find(|d| matches_filter(d, &filter))
            .ok_or(NiimbotError::TransportUnavailable)?;

        let (interface, in_endpoint, out_endpoint) = find_bulk_interface(&device)?;
        debug!(
            "claiming USB interface {interface} (in=0x{in_endpoint:02X}, out=0x{out_endpoint:02X})"
        );

        let mut handle = device.open().map_err(|e| NiimbotError::TransportIo(e.to_string()))?;
        if handle.active_configuration().is_err() {
            let _ = handle.set_active_configuration(1);
        }
        if let Ok(true) = handle.kernel_driver_active(interface) {
            handle
                .detach_kernel_driver(interface)
                .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;
        }
        handle
            .claim_interface(interface)
            .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;

        Ok(Self {
            handle,
            interface,
            in_endpoint,
            out_endpoint,
        })
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        trace!("usb write {} bytes", data.len());
        self.handle
            .write_bulk(self.out_endpoint, data, WRITE_TIMEOUT)
            .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;
        Ok(())
    }

    pub fn read_available(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let mut buf = [0u8; 256];
        match self.handle.read_bulk(self.in_endpoint, &mut buf, READ_TIMEOUT) {
            Ok(n) => {
                trace!("usb read {n} bytes");
                out.extend_from_slice(&buf[..n]);
                Ok(())
            }
            Err(rusb::Error::Timeout) => Ok(()),
            Err(e) => Err(NiimbotError::TransportIo(e.to_string())),
        }
    }

    pub fn close(mut self) -> Result<()> {
        if let Err(e) = self.handle.release_interface(self.interface) {
            warn!("failed to release USB interface cleanly: {e}");
        }
        Ok(())
    }
}
