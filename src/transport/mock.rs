//! In-memory loopback transport for the test suite. Simulates a printer
//! that replies with a scripted sequence of frames so
//! [`crate::router::ResponseRouter`] and [`crate::job::PrintJob`] can be
//! exercised without real USB/BLE hardware, mirroring the teacher's
//! (now hardware-only) connect-and-print test with a hardware-free
//! counterpart.

use std::collections::VecDeque;

use crate::error::Result;

pub struct MockTransport {
    pub written: Vec<Vec<u8>>,
    /// Raw bytes to hand back on each `read_available` call, one `Vec<u8>`
    /// chunk per call. Once exhausted, further reads return nothing.
    responses: VecDeque<Vec<u8>>,
}

impl MockTransport {
    pub fn new(responses: Vec<Vec<u8>>) -> Self {
        // Every test that exercises the router/job state machine goes
        // through a `MockTransport`, so this is the one place that needs to
        // turn logging on; `try_init` is idempotent so repeated construction
        // across tests in the same binary is harmless. Run with
        // `cargo test -- --nocapture` to see the crate's `trace!`/`debug!`/
        // `warn!` output at each protocol step.
        let _ = env_logger::try_init();
        Self {
            written: Vec::new(),
            responses: responses.into(),
        }
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.written.push(data.to_vec());
        Ok(())
    }

    pub fn read_available(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if let Some(chunk) = self.responses.pop_front() {
            out.extend(chunk);
        }
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }
}
