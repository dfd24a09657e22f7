//! Runtime wiring: one owned value from program start to steady state.
//!
//! Builds the ring, barrier, seed slot and shutdown flag, spawns the encoder
//! worker and the timing loop on their configured cores, and owns the thread
//! handles. Either thread failing (or an external shutdown request) brings
//! the other one down through the shared flag; the closing sequence drives
//! every pin low.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};

use log::{error, info};

use crate::announce::Announce;
use crate::clock::WallClock;
use crate::config::GeneratorConfig;
use crate::encoder::{EncoderWorker, SeedSlot};
use crate::error::{Error, Result};
use crate::gpio::GpioBank;
use crate::ltc::FrameEncoder;
use crate::ring::SampleRing;
use crate::rt;
use crate::timing::TimingLoop;
use crate::RING_CAPACITY;

pub struct Generator {
    shutdown: Arc<AtomicBool>,
    pins: Arc<dyn GpioBank>,
    encoder_thread: Option<JoinHandle<Result<()>>>,
    timer_thread: Option<JoinHandle<Result<()>>>,
}

impl Generator {
    /// Initialize pins, then start both realtime threads.
    pub fn spawn<C, E, A>(
        config: GeneratorConfig,
        clock: C,
        pins: Arc<dyn GpioBank>,
        encoder: E,
        announcer: A,
    ) -> Result<Generator>
    where
        C: WallClock + Send + 'static,
        E: FrameEncoder + 'static,
        A: Announce + Send + 'static,
    {
        pins.all_low();

        let ring = Arc::new(SampleRing::new(RING_CAPACITY));
        let seed = Arc::new(SeedSlot::new());
        let barrier = Arc::new(Barrier::new(2));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = EncoderWorker::new(
            encoder,
            ring.clone(),
            pins.clone(),
            seed.clone(),
            barrier.clone(),
            shutdown.clone(),
        );
        let encoder_thread = {
            let shutdown = shutdown.clone();
            let barrier = barrier.clone();
            let pin_cpus = config.pin_cpus;
            let cpu = config.encoder_cpu;
            thread::Builder::new()
                .name("ltc-encoder".to_string())
                .spawn(move || {
                    if pin_cpus {
                        if let Err(e) = rt::pin_current_thread(cpu) {
                            error!("encoder thread setup failed: {e}");
                            shutdown.store(true, Ordering::Relaxed);
                            // Release the peer from the rendezvous before
                            // bailing out.
                            barrier.wait();
                            return Err(e);
                        }
                    }
                    let result = worker.run();
                    if let Err(e) = &result {
                        error!("encoder worker failed: {e}");
                    }
                    shutdown.store(true, Ordering::Relaxed);
                    result
                })?
        };

        let mut timing = TimingLoop::new(
            clock,
            ring,
            pins.clone(),
            announcer,
            seed,
            barrier.clone(),
            shutdown.clone(),
        );
        let timer_thread = {
            let shutdown = shutdown.clone();
            let pin_cpus = config.pin_cpus;
            let cpu = config.timer_cpu;
            thread::Builder::new()
                .name("ltc-timer".to_string())
                .spawn(move || {
                    let setup = if pin_cpus {
                        rt::pin_current_thread(cpu).and_then(|()| rt::set_max_priority())
                    } else {
                        Ok(())
                    };
                    if let Err(e) = setup {
                        error!("timer thread setup failed: {e}");
                        shutdown.store(true, Ordering::Relaxed);
                        barrier.wait();
                        return Err(e);
                    }
                    let result = timing.run();
                    if let Err(e) = &result {
                        error!("timing loop failed: {e}");
                    }
                    shutdown.store(true, Ordering::Relaxed);
                    result
                })?
        };

        info!(
            "generator running (encoder on CPU {}, timer on CPU {})",
            config.encoder_cpu, config.timer_cpu
        );
        Ok(Generator {
            shutdown,
            pins,
            encoder_thread: Some(encoder_thread),
            timer_thread: Some(timer_thread),
        })
    }

    /// Shared flag other parties (e.g. a signal handler) may set to stop
    /// both threads.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Request shutdown and wait for both threads.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        self.join_inner()
    }

    /// Wait for the threads to end on their own (fatal error or an external
    /// shutdown request), then drive all pins low.
    pub fn join(mut self) -> Result<()> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<()> {
        let encoder = self
            .encoder_thread
            .take()
            .map(|t| t.join().unwrap_or(Err(Error::Panicked("encoder"))));
        let timer = self
            .timer_thread
            .take()
            .map(|t| t.join().unwrap_or(Err(Error::Panicked("timer"))));

        self.pins.all_low();
        info!("generator stopped");

        match (encoder, timer) {
            (Some(Err(e)), _) => Err(e),
            (_, Some(Err(e))) => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::UdpAnnouncer;
    use crate::clock::SystemClock;
    use crate::gpio::{Level, MemoryPins, Pin};
    use crate::ltc::testing::PatternEncoder;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    /// End-to-end smoke run against the real clock: release happens at the
    /// first second boundary, samples flow, shutdown leaves every pin low.
    #[test]
    fn runs_and_shuts_down_cleanly_on_the_system_clock() {
        let pins = Arc::new(MemoryPins::new());
        let config = GeneratorConfig {
            pin_cpus: false,
            ..GeneratorConfig::default()
        };
        // The discard port; nothing listens, the send itself succeeds.
        let announcer = UdpAnnouncer::new(Ipv4Addr::LOCALHOST, 9).unwrap();

        let shared: Arc<dyn GpioBank> = pins.clone();
        let generator = Generator::spawn(
            config,
            SystemClock,
            shared,
            PatternEncoder::new(),
            announcer,
        )
        .unwrap();

        // Across the first boundary and into steady state.
        std::thread::sleep(Duration::from_millis(2_200));
        generator.stop().unwrap();

        assert!(
            pins.write_count(Pin::Data) >= 1_000,
            "only {} DATA samples seen",
            pins.write_count(Pin::Data)
        );
        for pin in Pin::ALL {
            assert_eq!(pins.last(pin), Some(Level::Low), "{pin} left high");
        }
    }

    /// A shutdown request landing before the first second boundary must not
    /// strand the worker at the startup rendezvous: both threads still join.
    #[test]
    fn shutdown_before_the_first_boundary_does_not_hang() {
        let pins = Arc::new(MemoryPins::new());
        let config = GeneratorConfig {
            pin_cpus: false,
            ..GeneratorConfig::default()
        };
        let announcer = UdpAnnouncer::new(Ipv4Addr::LOCALHOST, 9).unwrap();

        let shared: Arc<dyn GpioBank> = pins.clone();
        let generator = Generator::spawn(
            config,
            SystemClock,
            shared,
            PatternEncoder::new(),
            announcer,
        )
        .unwrap();

        // Stop immediately; the timer thread has almost certainly not seen
        // a boundary yet and the worker is parked at the barrier.
        generator.stop().unwrap();
    }
}
