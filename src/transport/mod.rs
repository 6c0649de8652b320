//! Byte-chunk delivery to and from the printer (§4.2).
//!
//! Two variants exist because different printer families accept different
//! physical links. Per §9's "Dynamic dispatch → variants" guidance, this is
//! expressed as an enum with a small operation set rather than a trait
//! object hierarchy — there are exactly two shapes, and no caller ever adds
//! a third at runtime.
//!
//! Both variants are single-owner for the duration of a job and not
//! re-entrant: two overlapping requests from the same transport are
//! undefined behavior. [`crate::router::ResponseRouter`] is the only caller
//! that should ever touch a `Transport`.

pub mod ble;
#[cfg(test)]
pub mod mock;
pub mod usb;

use crate::error::Result;

/// Filter used to find a BulkUSB device by USB vendor/product ID.
#[derive(Debug, Clone, Copy)]
pub struct UsbFilter {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Filter used to find a BLE GATT device by advertised service UUID.
#[derive(Debug, Clone, Copy)]
pub struct BleFilter {
    pub service_uuid: uuid::Uuid,
    pub characteristic_uuid: uuid::Uuid,
}

/// How to locate and open the printer.
#[derive(Debug, Clone, Copy)]
pub enum TransportConfig {
    BulkUsb(UsbFilter),
    BleGatt(BleFilter),
}

/// A byte-chunk transport to the printer: either a USB bulk endpoint pair
/// or a BLE GATT write+notify characteristic.
pub enum Transport {
    BulkUsb(usb::BulkUsb),
    BleGatt(ble::BleGatt),
    /// In-memory loopback used only by the test suite (§"Test tooling" in
    /// SPEC_FULL.md) to drive [`crate::router::ResponseRouter`] and
    /// [`crate::job::PrintJob`] without real hardware.
    #[cfg(test)]
    Mock(mock::MockTransport),
}

impl Transport {
    pub fn open(cfg: TransportConfig) -> Result<Self> {
        match cfg {
            TransportConfig::BulkUsb(filter) => Ok(Transport::BulkUsb(usb::BulkUsb::open(filter)?)),
            TransportConfig::BleGatt(filter) => Ok(Transport::BleGatt(ble::BleGatt::open(filter)?)),
        }
    }

    /// Write `data` to the device. BLE fragments internally to MTU-sized
    /// chunks (§4.2); USB performs one bulk-out transfer.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Transport::BulkUsb(t) => t.write(data),
            Transport::BleGatt(t) => t.write(data),
            #[cfg(test)]
            Transport::Mock(t) => t.write(data),
        }
    }

    /// Pull any bytes the transport has available right now into `out`.
    /// USB performs one bulk-in transfer; BLE drains its notification queue.
    /// Either may append zero bytes per call.
    pub fn read_available(&mut self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Transport::BulkUsb(t) => t.read_available(out),
            Transport::BleGatt(t) => t.read_available(out),
            #[cfg(test)]
            Transport::Mock(t) => t.read_available(out),
        }
    }

    pub fn close(self) -> Result<()> {
        match self {
            Transport::BulkUsb(t) => t.close(),
            Transport::BleGatt(t) => t.close(),
            #[cfg(test)]
            Transport::Mock(t) => t.close(),
        }
    }
}
