//! A framed wire protocol, transport layer, and print-job state machine for
//! NIIMBOT thermal label printers, reachable over USB bulk or BLE GATT.
//!
//! [`Session`] is the entry point: open one against a [`TransportConfig`],
//! then use it to query device info, send a raster image as a print job, or
//! poll a heartbeat. Everything below `Session` — [`codec`], [`router`],
//! [`job`] — is exposed for callers who need lower-level control (building a
//! custom retry policy, driving the protocol over a transport this crate
//! doesn't implement, etc.) but `Session` is the way most consumers should
//! talk to a printer.

pub mod catalog;
pub mod codec;
pub mod error;
pub mod info;
pub mod job;
pub mod protocol;
pub mod raster;
pub mod router;
pub mod transport;

pub use catalog::{spec, Model, ModelSpec};
pub use error::{BadFrame, JobStep, NiimbotError, Result};
pub use info::{Heartbeat, InfoKey, InfoValue, RfidInfo, TriState};
pub use job::{CancelToken, PrintJob};
pub use raster::{Rotation, Threshold};
pub use transport::{BleFilter, Transport, TransportConfig, UsbFilter};

use info::InfoService;
use router::ResponseRouter;

/// An open connection to one printer.
///
/// Owns the [`Transport`] and the [`ResponseRouter`] that serializes
/// requests over it; a `Session` is not `Clone` and not meant to be shared
/// across threads without external synchronization, matching the
/// one-request-in-flight contract described on [`Transport`].
pub struct Session {
    router: ResponseRouter,
}

impl Session {
    /// Open a transport per `config` and wrap it in a session ready to
    /// issue requests.
    pub fn connect(config: TransportConfig) -> Result<Self> {
        let transport = Transport::open(config)?;
        Ok(Self {
            router: ResponseRouter::new(transport),
        })
    }

    /// Query a single read-only attribute (`GET_INFO`).
    pub fn info(&mut self, key: InfoKey) -> Result<InfoValue> {
        InfoService::new(&mut self.router).get_info(key)
    }

    /// Poll the printer's heartbeat: cover state, battery, paper presence,
    /// and RFID-read state.
    pub fn heartbeat(&mut self) -> Result<Heartbeat> {
        InfoService::new(&mut self.router).heartbeat()
    }

    /// Read the RFID tag embedded in the loaded label roll, if any.
    pub fn get_rfid(&mut self) -> Result<Option<RfidInfo>> {
        InfoService::new(&mut self.router).get_rfid()
    }

    /// Configure and run a print job against `model` for the given RGBA
    /// frame, blocking until the job completes or fails. `configure` gets
    /// the job's builder methods (`density`, `label_type`, `copies`, ...)
    /// before it is sent; reach for [`PrintJob`] and [`ResponseRouter`]
    /// directly instead of `Session::print` if a caller needs a
    /// [`CancelToken`] to cancel the job from another thread while it runs.
    pub fn print(
        &mut self,
        model: &ModelSpec,
        width: u32,
        height: u32,
        rgba: &[u8],
        configure: impl FnOnce(PrintJob) -> PrintJob,
    ) -> Result<()> {
        let job = configure(PrintJob::new(model));
        job.begin(&mut self.router, width, height, rgba)
    }

    /// Close the underlying transport, releasing the USB interface or
    /// disconnecting the BLE peripheral.
    pub fn close(self) -> Result<()> {
        self.router.into_transport().close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn session_wraps_a_mock_transport_for_info_queries() {
        // GET_INFO(Density)'s expected response type is the key's own code (1).
        let frame = codec::encode_a(InfoKey::Density as u8, &[3]).unwrap();
        let mut router = ResponseRouter::new(Transport::Mock(MockTransport::new(vec![frame])));
        let value = InfoService::new(&mut router).get_info(InfoKey::Density).unwrap();
        assert_eq!(value, InfoValue::Integer(3));
    }
}
