//! The print-job state machine (§4.6).
//!
//! ```text
//! IDLE -> SET_DENSITY -> SET_TYPE -> START_PRINT -> START_PAGE -> SET_DIM
//!      -> (SET_QTY?) -> STREAM_ROWS -> END_PAGE -> WAIT -> END_PRINT -> DONE
//! ```
//!
//! Builder configuration is grounded in `mkienitz-brother_ql`'s
//! `PrintJob::new(..).page_count(..).high_dpi(..)` chain: callers configure
//! a job with chained setters before calling [`PrintJob::begin`], rather
//! than assembling one monolithic options struct up front.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::catalog::ModelSpec;
use crate::error::{JobStep, NiimbotError, Result};
use crate::protocol;
use crate::raster::{rasterize, ImageRows, Rotation, Threshold};
use crate::router::ResponseRouter;

const SETTLE_DELAY: Duration = Duration::from_millis(300);
const END_PRINT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const END_PRINT_TIMEOUT: Duration = Duration::from_secs(20);

/// A cooperative cancellation flag shared between a caller and an in-flight
/// [`PrintJob`] (§5: "cancel() is cooperative — it sets a flag that is
/// checked at each suspension point").
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A print job configured against a target [`ModelSpec`], not yet sent.
pub struct PrintJob<'a> {
    model: &'a ModelSpec,
    density: u8,
    label_type: u8,
    copies: u16,
    rotation: Rotation,
    threshold: Threshold,
    cancel: CancelToken,
}

impl<'a> PrintJob<'a> {
    pub fn new(model: &'a ModelSpec) -> Self {
        Self {
            model,
            density: 3,
            label_type: 1,
            copies: 1,
            rotation: Rotation::R0,
            threshold: Threshold::Fixed128,
            cancel: CancelToken::new(),
        }
    }

    pub fn density(mut self, density: u8) -> Self {
        self.density = density;
        self
    }

    pub fn label_type(mut self, label_type: u8) -> Self {
        self.label_type = label_type;
        self
    }

    pub fn copies(mut self, copies: u16) -> Self {
        self.copies = copies;
        self
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn validate(&self) -> Result<()> {
        if self.density > self.model.max_density {
            return Err(NiimbotError::DensityExceedsModel {
                requested: self.density,
                max: self.model.max_density,
            });
        }
        if !self.model.supports_label_type(self.label_type) {
            return Err(NiimbotError::LabelTypeNotSupported(self.label_type));
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            // Not part of the public error taxonomy's happy-path steps;
            // callers observe cancellation through `begin`'s Err return and
            // the best-effort cleanup that already ran.
            return Err(NiimbotError::Timeout);
        }
        Ok(())
    }

    /// Drive the job to completion against `router`: from `SET_DENSITY`
    /// through `END_PRINT` polling. On any error (including a pending
    /// cancellation) this runs the best-effort `END_PAGE`/`END_PRINT`
    /// cleanup described in §5 before returning.
    pub fn begin(
        self,
        router: &mut ResponseRouter,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<()> {
        self.validate()?;

        let frame = crate::raster::RasterFrame::new(width, height, rgba);
        let bitmap = rasterize(
            &frame,
            self.density,
            self.rotation,
            self.threshold,
            self.model.max_width_px,
        )?;

        let result = self.run(router, &bitmap);
        if result.is_err() {
            self.cleanup(router);
        }
        result
    }

    /// A closure `ResponseRouter::transceive_cancellable` can poll between
    /// rounds without this job's steps each having to check `self.cancel`
    /// twice (once before the call, once inside its poll loop).
    fn cancel_check(&self) -> impl Fn() -> bool + '_ {
        || self.cancel.is_cancelled()
    }

    fn run(&self, router: &mut ResponseRouter, bitmap: &crate::raster::MonoBitmap) -> Result<()> {
        self.check_cancelled()?;
        info!("job: set density={}", self.density);
        ack_or_reject(
            router.transceive_cancellable(
                protocol::SET_LABEL_DENSITY,
                &[self.density],
                protocol::expected_plus_sixteen(protocol::SET_LABEL_DENSITY),
                &self.cancel_check(),
            )?,
            JobStep::SetDensity,
        )?;

        self.check_cancelled()?;
        info!("job: set label type={}", self.label_type);
        ack_or_reject(
            router.transceive_cancellable(
                protocol::SET_LABEL_TYPE,
                &[self.label_type],
                protocol::expected_plus_sixteen(protocol::SET_LABEL_TYPE),
                &self.cancel_check(),
            )?,
            JobStep::SetLabelType,
        )?;

        self.check_cancelled()?;
        ack_or_reject(
            router.transceive_cancellable(
                protocol::START_PRINT,
                &[1],
                protocol::expected_plus_one(protocol::START_PRINT),
                &self.cancel_check(),
            )?,
            JobStep::StartPrint,
        )?;

        self.check_cancelled()?;
        ack_or_reject(
            router.transceive_cancellable(
                protocol::START_PAGE_PRINT,
                &[1],
                protocol::expected_plus_one(protocol::START_PAGE_PRINT),
                &self.cancel_check(),
            )?,
            JobStep::StartPage,
        )?;

        self.check_cancelled()?;
        let mut dim_payload = Vec::with_capacity(4);
        dim_payload.extend_from_slice(&(bitmap.height as u16).to_be_bytes());
        dim_payload.extend_from_slice(&(bitmap.width as u16).to_be_bytes());
        ack_or_reject(
            router.transceive_cancellable(
                protocol::SET_DIMENSION,
                &dim_payload,
                protocol::expected_plus_one(protocol::SET_DIMENSION),
                &self.cancel_check(),
            )?,
            JobStep::SetDimension,
        )?;

        if self.copies > 1 {
            self.check_cancelled()?;
            ack_or_reject(
                router.transceive_cancellable(
                    protocol::SET_QUANTITY,
                    &self.copies.to_be_bytes(),
                    protocol::expected_plus_one(protocol::SET_QUANTITY),
                    &self.cancel_check(),
                )?,
                JobStep::SetQuantity,
            )?;
        }

        self.check_cancelled()?;
        for payload in ImageRows::new(bitmap) {
            router.send_row(protocol::IMAGE_ROW, &payload)?;
        }

        self.check_cancelled()?;
        ack_or_reject(
            router.transceive_cancellable(
                protocol::END_PAGE_PRINT,
                &[1],
                protocol::expected_plus_one(protocol::END_PAGE_PRINT),
                &self.cancel_check(),
            )?,
            JobStep::EndPage,
        )?;

        sleep(SETTLE_DELAY);

        self.poll_end_print(router)
    }

    fn poll_end_print(&self, router: &mut ResponseRouter) -> Result<()> {
        let deadline = Instant::now() + END_PRINT_TIMEOUT;
        loop {
            self.check_cancelled()?;
            let packet = router.transceive_cancellable(
                protocol::END_PRINT,
                &[1],
                protocol::expected_plus_one(protocol::END_PRINT),
                &self.cancel_check(),
            )?;
            if packet.payload.first() == Some(&1) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(NiimbotError::EndPrintTimeout);
            }
            sleep(END_PRINT_RETRY_INTERVAL);
        }
    }

    /// Best-effort `END_PAGE -> END_PRINT` cleanup; errors are logged and
    /// swallowed (§7: "`cancel()` runs a best-effort cleanup that swallows
    /// errors").
    fn cleanup(&self, router: &mut ResponseRouter) {
        if let Err(e) = router.transceive(
            protocol::END_PAGE_PRINT,
            &[1],
            protocol::expected_plus_one(protocol::END_PAGE_PRINT),
        ) {
            warn!("cleanup: END_PAGE_PRINT failed: {e}");
        }
        if let Err(e) = router.transceive(
            protocol::END_PRINT,
            &[1],
            protocol::expected_plus_one(protocol::END_PRINT),
        ) {
            warn!("cleanup: END_PRINT failed: {e}");
        }
    }
}

fn ack_or_reject(packet: crate::codec::Packet, step: JobStep) -> Result<()> {
    match packet.payload.first() {
        Some(&ack) if ack != 0 => Ok(()),
        _ => Err(NiimbotError::PrinterRejected(step)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, Model};
    use crate::codec;
    use crate::transport::mock::MockTransport;
    use crate::transport::Transport;

    fn ack(kind: u8) -> Vec<u8> {
        codec::encode_a(kind, &[1]).unwrap()
    }

    #[test]
    fn happy_path_emits_expected_byte_stream() {
        let spec = catalog::spec(Model::B21);
        let width = 16u32;
        let height = 4u32;
        let rgba = vec![255u8; (width * height * 4) as usize]; // all white, no ink

        let responses = vec![
            ack(protocol::expected_plus_sixteen(protocol::SET_LABEL_DENSITY)),
            ack(protocol::expected_plus_sixteen(protocol::SET_LABEL_TYPE)),
            ack(protocol::expected_plus_one(protocol::START_PRINT)),
            ack(protocol::expected_plus_one(protocol::START_PAGE_PRINT)),
            ack(protocol::expected_plus_one(protocol::SET_DIMENSION)),
            ack(protocol::expected_plus_one(protocol::END_PAGE_PRINT)),
            ack(protocol::expected_plus_one(protocol::END_PRINT)),
        ];
        let mut router = ResponseRouter::new(Transport::Mock(MockTransport::new(responses)));

        let job = PrintJob::new(spec).density(3).label_type(1);
        job.begin(&mut router, width, height, &rgba).unwrap();

        let Transport::Mock(mock) = router.into_transport() else {
            panic!("expected mock transport");
        };

        // SET_DENSITY, SET_LABEL_TYPE, START_PRINT, START_PAGE, SET_DIMENSION,
        // height IMAGE_ROWs, END_PAGE, END_PRINT.
        assert_eq!(mock.written.len(), 6 + height as usize + 1);

        let (kind, payload) = decode(&mock.written[0]);
        assert_eq!(kind, protocol::SET_LABEL_DENSITY);
        assert_eq!(payload, vec![3]);

        let (kind, payload) = decode(&mock.written[1]);
        assert_eq!(kind, protocol::SET_LABEL_TYPE);
        assert_eq!(payload, vec![1]);

        let (kind, _) = decode(&mock.written[2]);
        assert_eq!(kind, protocol::START_PRINT);

        let (kind, _) = decode(&mock.written[3]);
        assert_eq!(kind, protocol::START_PAGE_PRINT);

        let (kind, payload) = decode(&mock.written[4]);
        assert_eq!(kind, protocol::SET_DIMENSION);
        assert_eq!(payload[0..2], (height as u16).to_be_bytes());
        assert_eq!(payload[2..4], (width as u16).to_be_bytes());

        for row in 0..height as usize {
            let (kind, payload) = decode(&mock.written[5 + row]);
            assert_eq!(kind, protocol::IMAGE_ROW);
            assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), row as u16);
        }

        let (kind, _) = decode(&mock.written[5 + height as usize]);
        assert_eq!(kind, protocol::END_PAGE_PRINT);

        let (kind, _) = decode(&mock.written[6 + height as usize]);
        assert_eq!(kind, protocol::END_PRINT);
    }

    fn decode(bytes: &[u8]) -> (u8, Vec<u8>) {
        match codec::decode_one(bytes).unwrap() {
            codec::Decoded::Frame(pkt, _) => (pkt.kind, pkt.payload),
            codec::Decoded::NeedMore => panic!("expected a full frame"),
        }
    }

    #[test]
    fn end_print_polls_until_ack() {
        let spec = catalog::spec(Model::B21);
        let width = 8u32;
        let height = 1u32;
        let rgba = vec![255u8; (width * height * 4) as usize];

        let mut responses = vec![
            ack(protocol::expected_plus_sixteen(protocol::SET_LABEL_DENSITY)),
            ack(protocol::expected_plus_sixteen(protocol::SET_LABEL_TYPE)),
            ack(protocol::expected_plus_one(protocol::START_PRINT)),
            ack(protocol::expected_plus_one(protocol::START_PAGE_PRINT)),
            ack(protocol::expected_plus_one(protocol::SET_DIMENSION)),
            ack(protocol::expected_plus_one(protocol::END_PAGE_PRINT)),
        ];
        let end_print_type = protocol::expected_plus_one(protocol::END_PRINT);
        responses.push(codec::encode_a(end_print_type, &[0]).unwrap());
        responses.push(codec::encode_a(end_print_type, &[0]).unwrap());
        responses.push(codec::encode_a(end_print_type, &[1]).unwrap());

        let mut router = ResponseRouter::new(Transport::Mock(MockTransport::new(responses)));
        let job = PrintJob::new(spec);
        job.begin(&mut router, width, height, &rgba).unwrap();
    }

    #[test]
    fn rejection_aborts_with_step() {
        let spec = catalog::spec(Model::B21);
        let width = 8u32;
        let height = 1u32;
        let rgba = vec![255u8; (width * height * 4) as usize];

        let responses = vec![codec::encode_a(
            protocol::expected_plus_sixteen(protocol::SET_LABEL_DENSITY),
            &[0],
        )
        .unwrap()];
        let mut router = ResponseRouter::new(Transport::Mock(MockTransport::new(responses)));
        let job = PrintJob::new(spec);
        let result = job.begin(&mut router, width, height, &rgba);
        assert!(matches!(
            result,
            Err(NiimbotError::PrinterRejected(JobStep::SetDensity))
        ));
    }

    #[test]
    fn density_above_model_max_is_rejected_before_sending() {
        let spec = catalog::spec(Model::D11); // max_density = 3
        let width = 8u32;
        let height = 1u32;
        let rgba = vec![255u8; (width * height * 4) as usize];

        let mut router = ResponseRouter::new(Transport::Mock(MockTransport::new(vec![])));
        let job = PrintJob::new(spec).density(5);
        let result = job.begin(&mut router, width, height, &rgba);
        assert!(matches!(
            result,
            Err(NiimbotError::DensityExceedsModel { requested: 5, max: 3 })
        ));
    }

    #[test]
    fn cancelling_before_begin_stops_the_job_before_any_request_is_sent() {
        let spec = catalog::spec(Model::B21);
        let width = 8u32;
        let height = 1u32;
        let rgba = vec![255u8; (width * height * 4) as usize];

        let mut router = ResponseRouter::new(Transport::Mock(MockTransport::new(vec![])));
        let job = PrintJob::new(spec);
        job.cancel_token().cancel();
        let result = job.begin(&mut router, width, height, &rgba);
        assert!(result.is_err());

        let Transport::Mock(mock) = router.into_transport() else {
            panic!("expected mock transport");
        };
        // The job never got past its first cancellation check, so
        // SET_LABEL_DENSITY (and every step after it) was never sent; only
        // the best-effort END_PAGE/END_PRINT cleanup frames may have gone out.
        let sent_density = mock.written.iter().any(|frame| {
            matches!(
                codec::decode_one(frame),
                Ok(codec::Decoded::Frame(pkt, _)) if pkt.kind == protocol::SET_LABEL_DENSITY
            )
        });
        assert!(!sent_density, "a cancelled job must not send SET_LABEL_DENSITY");
    }

    #[test]
    fn cancelling_mid_end_print_poll_stops_the_job_without_exhausting_the_poll_budget() {
        let spec = catalog::spec(Model::B21);
        let width = 8u32;
        let height = 1u32;
        let rgba = vec![255u8; (width * height * 4) as usize];

        let responses = vec![
            ack(protocol::expected_plus_sixteen(protocol::SET_LABEL_DENSITY)),
            ack(protocol::expected_plus_sixteen(protocol::SET_LABEL_TYPE)),
            ack(protocol::expected_plus_one(protocol::START_PRINT)),
            ack(protocol::expected_plus_one(protocol::START_PAGE_PRINT)),
            ack(protocol::expected_plus_one(protocol::SET_DIMENSION)),
            ack(protocol::expected_plus_one(protocol::END_PAGE_PRINT)),
            // No END_PRINT ack ever arrives: the printer stalls the paper
            // advance forever.
        ];
        let mut router = ResponseRouter::new(Transport::Mock(MockTransport::new(responses)));
        let job = PrintJob::new(spec);
        let cancel = job.cancel_token();

        // Cancel from another thread partway through, the way a caller
        // driving `begin()` on a worker thread would.
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            cancel.cancel();
        });

        let start = Instant::now();
        let result = job.begin(&mut router, width, height, &rgba);
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(NiimbotError::Timeout)));
        // Without the router checking cancellation between polling rounds,
        // this would run for up to the full 20s END_PRINT cap instead.
        assert!(
            elapsed < Duration::from_secs(5),
            "job did not observe cancellation promptly: {elapsed:?}"
        );
    }
}
