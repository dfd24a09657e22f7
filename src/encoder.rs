//! Encoder worker: the producer half of the pipeline.
//!
//! Free-running once released by the timing loop's first second boundary.
//! Each iteration encodes one LTC frame into the ring, then backs off while
//! four or more frames are queued, so ring occupancy stays between one and
//! four frames and the output stage can never be starved by a healthy worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::gpio::{GpioBank, Level, Pin};
use crate::ltc::FrameEncoder;
use crate::ring::SampleRing;
use crate::timecode::SmpteTimecode;
use crate::{BACKPRESSURE_BYTES, SAMPLES_PER_FRAME};

/// Back-pressure poll interval while the ring is full enough.
const BACKOFF_POLL: Duration = Duration::from_millis(10);

/// One-deep hand-off cell for seed timecodes.
///
/// The timing loop deposits a seed at an aligned second boundary; the worker
/// applies it between frames. Library state is therefore only ever touched
/// from the worker thread.
#[derive(Default)]
pub struct SeedSlot(Mutex<Option<SmpteTimecode>>);

impl SeedSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit a seed, replacing any seed not yet picked up.
    pub fn offer(&self, tc: SmpteTimecode) {
        *self.0.lock() = Some(tc);
    }

    pub fn take(&self) -> Option<SmpteTimecode> {
        self.0.lock().take()
    }
}

pub struct EncoderWorker<E, G: ?Sized> {
    encoder: E,
    ring: Arc<SampleRing>,
    pins: Arc<G>,
    seed: Arc<SeedSlot>,
    start: Arc<Barrier>,
    shutdown: Arc<AtomicBool>,
}

impl<E, G> EncoderWorker<E, G>
where
    E: FrameEncoder,
    G: GpioBank + ?Sized,
{
    pub fn new(
        encoder: E,
        ring: Arc<SampleRing>,
        pins: Arc<G>,
        seed: Arc<SeedSlot>,
        start: Arc<Barrier>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        EncoderWorker {
            encoder,
            ring,
            pins,
            seed,
            start,
            shutdown,
        }
    }

    /// Block at the startup rendezvous, then produce frames until shutdown.
    /// Any library failure is returned as-is: the worker does not attempt to
    /// recover or reseed on its own.
    pub fn run(mut self) -> Result<()> {
        self.start.wait();
        debug!("encoder released");

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            if let Some(tc) = self.seed.take() {
                debug!("seeding encoder at {tc}");
                self.encoder.set_timecode(&tc)?;
            }

            self.pins.write(Pin::EncoderActive, Level::High);
            self.encoder.encode_frame()?;

            let frame = self.encoder.buffer();
            if frame.len() != SAMPLES_PER_FRAME {
                return Err(Error::Encoder(format!(
                    "library produced {} samples for one frame, expected {}",
                    frame.len(),
                    SAMPLES_PER_FRAME
                )));
            }
            self.ring.write_bulk(frame)?;
            self.encoder.flush();

            // Pace production off ring occupancy: hold at most four frames.
            while self.ring.bytes_used() >= BACKPRESSURE_BYTES {
                if self.shutdown.load(Ordering::Relaxed) {
                    self.pins.write(Pin::EncoderActive, Level::Low);
                    return Ok(());
                }
                thread::sleep(BACKOFF_POLL);
            }
            self.pins.write(Pin::EncoderActive, Level::Low);

            self.encoder.inc_timecode()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::MemoryPins;
    use crate::ltc::testing::PatternEncoder;
    use crate::RING_CAPACITY;
    use std::time::Instant;

    struct Rig {
        ring: Arc<SampleRing>,
        pins: Arc<MemoryPins>,
        seed: Arc<SeedSlot>,
        start: Arc<Barrier>,
        shutdown: Arc<AtomicBool>,
    }

    fn rig() -> Rig {
        Rig {
            ring: Arc::new(SampleRing::new(RING_CAPACITY)),
            pins: Arc::new(MemoryPins::new()),
            seed: Arc::new(SeedSlot::new()),
            start: Arc::new(Barrier::new(2)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    fn spawn_worker(rig: &Rig, encoder: PatternEncoder) -> thread::JoinHandle<Result<()>> {
        let worker = EncoderWorker::new(
            encoder,
            rig.ring.clone(),
            rig.pins.clone(),
            rig.seed.clone(),
            rig.start.clone(),
            rig.shutdown.clone(),
        );
        thread::spawn(move || worker.run())
    }

    fn read_frame(ring: &SampleRing) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while ring.bytes_used() < SAMPLES_PER_FRAME {
            assert!(Instant::now() < deadline, "worker never fed the ring");
            thread::yield_now();
        }
        let mut frame = vec![0u8; SAMPLES_PER_FRAME];
        ring.read_bulk(&mut frame).unwrap();
        frame
    }

    #[test]
    fn frames_arrive_in_production_order() {
        let rig = rig();
        let encoder = PatternEncoder::new();
        let produced = encoder.produced();
        let handle = spawn_worker(&rig, encoder);
        rig.start.wait();

        let mut received = Vec::new();
        for _ in 0..20 {
            received.extend(read_frame(&rig.ring));
        }
        let produced = produced.lock();
        assert!(produced.len() >= received.len());
        assert_eq!(&produced[..received.len()], &received[..]);

        rig.shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn occupancy_never_exceeds_four_frames() {
        let rig = rig();
        let handle = spawn_worker(&rig, PatternEncoder::new());
        rig.start.wait();

        // Let the worker hit the back-pressure wait, then watch occupancy
        // while draining a few frames.
        thread::sleep(Duration::from_millis(100));
        for _ in 0..10 {
            assert!(rig.ring.bytes_used() <= BACKPRESSURE_BYTES);
            let _ = read_frame(&rig.ring);
            thread::sleep(Duration::from_millis(25));
        }
        assert!(rig.ring.bytes_used() <= BACKPRESSURE_BYTES);

        rig.shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn seed_is_applied_between_frames() {
        let rig = rig();
        let encoder = PatternEncoder::new();
        let seeds = encoder.seeds();
        let handle = spawn_worker(&rig, encoder);
        rig.start.wait();

        let _ = read_frame(&rig.ring);
        let tc = SmpteTimecode::new(2024, 5, 4, 3, 2, 1, 0, 0).unwrap();
        rig.seed.offer(tc);

        let deadline = Instant::now() + Duration::from_secs(5);
        while seeds.lock().is_empty() {
            assert!(Instant::now() < deadline, "seed never applied");
            let _ = read_frame(&rig.ring);
        }
        assert_eq!(seeds.lock().as_slice(), &[tc]);

        rig.shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn shutdown_breaks_the_backpressure_wait() {
        let rig = rig();
        let handle = spawn_worker(&rig, PatternEncoder::new());
        rig.start.wait();

        // Nobody consumes; the worker parks at four queued frames.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(rig.ring.bytes_used(), BACKPRESSURE_BYTES);

        rig.shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
        // The worker lowers its own activity pin on the way out.
        assert_eq!(rig.pins.last(Pin::EncoderActive), Some(Level::Low));
    }

    #[test]
    fn library_failure_is_fatal() {
        let rig = rig();
        let handle = spawn_worker(&rig, PatternEncoder::failing());
        rig.start.wait();
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, Error::Encoder(_)));
    }

    #[test]
    fn encoder_active_pin_toggles_around_frames() {
        let rig = rig();
        let handle = spawn_worker(&rig, PatternEncoder::new());
        rig.start.wait();

        for _ in 0..3 {
            let _ = read_frame(&rig.ring);
        }
        rig.shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();

        let writes = rig.pins.writes_to(Pin::EncoderActive);
        assert!(!writes.is_empty());
        assert_eq!(writes[0], Level::High);
        // Strict alternation: high before each frame, low after the wait.
        for pair in writes.chunks(2) {
            assert_eq!(pair[0], Level::High);
            if let Some(low) = pair.get(1) {
                assert_eq!(*low, Level::Low);
            }
        }
    }
}
