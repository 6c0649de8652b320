//! BleGatt transport: one GATT service exposing a write+notify
//! characteristic (§4.2).
//!
//! Grounded in the `btleplug` usage pattern shown by comparable
//! Bluetooth-thermal-printer clients in the example pack (cat-printer BLE
//! pipelines built on `btleplug` + `tokio`): scan for the service UUID,
//! connect, subscribe to notifications, and drive every async call from a
//! small dedicated Tokio runtime so the rest of this crate can stay
//! synchronous per §5's single-threaded cooperative model.
//!
//! The notification stream is drained on its own dedicated OS thread
//! (running its own single-threaded Tokio runtime) rather than via
//! `tokio::spawn` on `runtime`: a `current_thread` runtime only polls
//! spawned tasks while some `block_on` call is in flight on that runtime,
//! and `read_available` does not call `block_on` — it just locks the inbox.
//! A `tokio::spawn`-ed drain task would therefore only ever advance
//! incidentally, whenever `write`/`close` happened to pump the runtime, and
//! every `transceive` poll loop (which only reads, never writes, while
//! waiting) would stall until its response had already arrived and sat
//! unread. The dedicated thread's runtime is blocked on nothing but the
//! notification stream, so it keeps draining regardless of what the main
//! runtime is doing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use futures_util::StreamExt;
use log::{trace, warn};

use super::BleFilter;
use crate::error::{NiimbotError, Result};

/// Default ATT MTU is 23 bytes; 3 bytes of ATT header leaves 20 usable.
const MTU_MINUS_3: usize = 20;
const SCAN_DURATION: Duration = Duration::from_secs(4);

pub struct BleGatt {
    runtime: tokio::runtime::Runtime,
    peripheral: Peripheral,
    characteristic: Characteristic,
    inbox: Arc<Mutex<VecDeque<u8>>>,
}

impl BleGatt {
    pub fn open(filter: BleFilter) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;

        let (peripheral, characteristic) = runtime.block_on(async { Self::connect(filter).await })?;

        let inbox: Arc<Mutex<VecDeque<u8>>> = Arc::new(Mutex::new(VecDeque::new()));
        spawn_notification_drain(peripheral.clone(), inbox.clone());

        Ok(Self {
            runtime,
            peripheral,
            characteristic,
            inbox,
        })
    }

    async fn connect(filter: BleFilter) -> Result<(Peripheral, Characteristic)> {
        let manager = Manager::new()
            .await
            .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;
        let central = adapters.into_iter().next().ok_or(NiimbotError::TransportUnavailable)?;

        central
            .start_scan(ScanFilter {
                services: vec![filter.service_uuid],
            })
            .await
            .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;
        tokio::time::sleep(SCAN_DURATION).await;

        let peripherals = central
            .peripherals()
            .await
            .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;

        let mut found = None;
        for p in peripherals {
            if let Ok(Some(props)) = p.properties().await {
                if props.services.contains(&filter.service_uuid) {
                    found = Some(p);
                    break;
                }
            }
        }
        let peripheral = found.ok_or(NiimbotError::TransportUnavailable)?;

        peripheral
            .connect()
            .await
            .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == filter.characteristic_uuid)
            .ok_or(NiimbotError::TransportUnavailable)?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;

        Ok((peripheral, characteristic))
    }

    /// Fragment `data` into chunks no larger than MTU-3 and write them
    /// sequentially (§4.2, §8 scenario 8).
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        for chunk in fragment(data) {
            trace!("ble write chunk of {} bytes", chunk.len());
            self.runtime
                .block_on(
                    self.peripheral
                        .write(&self.characteristic, chunk, WriteType::WithoutResponse),
                )
                .map_err(|e| NiimbotError::TransportIo(e.to_string()))?;
        }
        Ok(())
    }

    /// Drain whatever notification bytes have arrived since the last call.
    pub fn read_available(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let mut guard = self.inbox.lock().unwrap();
        out.extend(guard.drain(..));
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        if let Err(e) = self.runtime.block_on(self.peripheral.disconnect()) {
            warn!("failed to disconnect BLE peripheral cleanly: {e}");
        }
        Ok(())
    }
}

/// Split `data` into sequential chunks of at most `MTU_MINUS_3` bytes each,
/// in order, matching the size of the writes `write()` issues over GATT.
fn fragment(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.chunks(MTU_MINUS_3)
}

/// Continuously drain `peripheral`'s notification stream into `inbox` on a
/// dedicated OS thread with its own runtime, independent of whatever
/// `BleGatt::runtime` is doing. Runs until the notification stream ends
/// (peripheral disconnect) or fails to start.
fn spawn_notification_drain(peripheral: Peripheral, inbox: Arc<Mutex<VecDeque<u8>>>) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("ble notification thread failed to start a runtime: {e}");
                return;
            }
        };
        runtime.block_on(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(notifications) => notifications,
                Err(e) => {
                    warn!("ble notifications stream unavailable: {e}");
                    return;
                }
            };
            while let Some(data) = notifications.next().await {
                trace!("ble notification: {} bytes", data.value.len());
                inbox.lock().unwrap().extend(data.value);
            }
        });
    });
}
