//! The realtime timing loop.
//!
//! A busy-poll of `CLOCK_REALTIME`, quantized into 2 µs tick buckets
//! (`u = tv_nsec / 2000`, 0..500000 per second). Two events derive from the
//! bucket value: a second boundary at `u == 0` and an output edge every 125
//! buckets (250 µs, 4000 edges per second). The loop runs far faster than
//! either event, so each bucket is observed many times; events fire only on
//! the rising transition into a new bucket.
//!
//! Per second boundary the loop checks that the previous second delivered
//! exactly 4000 edges, manages the STABLE indicator, hands the encoder a
//! fresh seed when (re)gaining stability, and emits the announce datagram.
//! Per edge it delivers one buffered sample to the DATA pin, refilling its
//! one-frame chunk from the ring every 160 edges. The loop never sleeps;
//! the only blocking it ever does is at startup, before edges begin.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::announce::Announce;
use crate::clock::{WallClock, WallTime};
use crate::encoder::SeedSlot;
use crate::error::{Error, Result};
use crate::gpio::{GpioBank, Level, Pin};
use crate::ring::SampleRing;
use crate::timecode::SmpteTimecode;
use crate::{EDGES_PER_SECOND, EDGE_TICKS, SAMPLES_PER_FRAME, TICK_NS};

/// How long release may wait for the encoder's first frame.
const PRIME_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TimingLoop<C, G: ?Sized, A> {
    clock: C,
    ring: Arc<SampleRing>,
    pins: Arc<G>,
    announcer: A,
    seed: Arc<SeedSlot>,
    start: Arc<Barrier>,
    shutdown: Arc<AtomicBool>,

    // Loop-local state, never visible outside.
    chunk: [u8; SAMPLES_PER_FRAME],
    chunk_pos: usize,
    last_tick: Option<u32>,
    first_pass: bool,
    rendezvoused: bool,
    released: bool,
    stable: bool,
    cnt_e: u32,
    framecount: u32,
    heartbeat: Level,
    safety: Level,
}

impl<C, G, A> TimingLoop<C, G, A>
where
    C: WallClock,
    G: GpioBank + ?Sized,
    A: Announce,
{
    pub fn new(
        clock: C,
        ring: Arc<SampleRing>,
        pins: Arc<G>,
        announcer: A,
        seed: Arc<SeedSlot>,
        start: Arc<Barrier>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        TimingLoop {
            clock,
            ring,
            pins,
            announcer,
            seed,
            start,
            shutdown,
            chunk: [0u8; SAMPLES_PER_FRAME],
            chunk_pos: 0,
            last_tick: None,
            first_pass: true,
            rendezvoused: false,
            released: false,
            stable: false,
            cnt_e: 0,
            framecount: 0,
            heartbeat: Level::Low,
            safety: Level::Low,
        }
    }

    /// Spin until shutdown or a fatal realtime violation.
    pub fn run(&mut self) -> Result<()> {
        info!("timing loop running");
        let mut result = Ok(());
        while !self.shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.step() {
                result = Err(e);
                break;
            }
        }
        // The worker parks at the startup barrier before anything else. If
        // the loop ends before the first boundary ever happened, meet it now
        // so it can observe the flag instead of waiting forever.
        self.shutdown.store(true, Ordering::Relaxed);
        if !self.rendezvoused {
            self.rendezvoused = true;
            self.start.wait();
        }
        info!("timing loop stopped");
        result
    }

    /// One clock observation. Fires at most one boundary and one edge.
    pub fn step(&mut self) -> Result<()> {
        let now = self.clock.now();
        let tick = now.nsec / TICK_NS;

        // The loop revisits each bucket many times; act once per bucket.
        if self.last_tick == Some(tick) {
            return Ok(());
        }
        self.last_tick = Some(tick);

        if self.first_pass {
            // Dump cycles until the first second boundary.
            if tick != 0 {
                return Ok(());
            }
            self.first_pass = false;
        }

        if tick == 0 {
            self.on_second_boundary(now)?;
        }
        if tick % EDGE_TICKS == 0 && self.released {
            self.on_edge()?;
        }
        Ok(())
    }

    fn on_second_boundary(&mut self, now: WallTime) -> Result<()> {
        if !self.released {
            self.release(now)?;
        } else if self.cnt_e == EDGES_PER_SECOND {
            if !self.stable {
                // A clean second of edges: trust the clock and hand the
                // encoder the timecode observed at this boundary.
                self.seed.offer(SmpteTimecode::from_wall_second(now.sec)?);
                self.stable = true;
                self.pins.write(Pin::Stable, Level::High);
                info!("clock stable at second {}", now.sec);
            } else {
                self.heartbeat = self.heartbeat.toggled();
                self.pins.write(Pin::Heartbeat, self.heartbeat);
            }
        } else {
            // Step, slew or scheduling trouble. Distrust the second, leave
            // the encoder alone; the next clean second re-seeds it.
            if self.stable {
                warn!(
                    "second {} delivered {} edges over {} frames, expected {}",
                    now.sec, self.cnt_e, self.framecount, EDGES_PER_SECOND
                );
            }
            self.stable = false;
            self.pins.write(Pin::Stable, Level::Low);
        }

        if let Err(e) = self.announcer.announce(now) {
            error!("announce failed: {e}");
        }
        self.cnt_e = 0;
        self.framecount = 0;
        Ok(())
    }

    /// First aligned second: seed the encoder, meet it at the barrier, wait
    /// for the first frame to land in the ring, then let edges fire.
    fn release(&mut self, now: WallTime) -> Result<()> {
        self.seed.offer(SmpteTimecode::from_wall_second(now.sec)?);
        info!("first second boundary at {}; releasing encoder", now.sec);
        self.rendezvoused = true;
        self.start.wait();
        self.wait_until_primed()?;
        if !self.shutdown.load(Ordering::Relaxed) {
            self.released = true;
        }
        Ok(())
    }

    fn wait_until_primed(&self) -> Result<()> {
        let deadline = Instant::now() + PRIME_TIMEOUT;
        while self.ring.bytes_used() < SAMPLES_PER_FRAME {
            // On shutdown just return; run() exits before the next edge.
            if self.shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Startup("encoder never fed the ring".into()));
            }
            std::hint::spin_loop();
        }
        Ok(())
    }

    fn on_edge(&mut self) -> Result<()> {
        self.cnt_e += 1;
        self.safety = self.safety.toggled();
        self.pins.write(Pin::SafetyClock, self.safety);

        if self.chunk_pos == 0 {
            // Once per frame: one guarded 160-byte copy. Underflow here
            // means the realtime contract is broken; bail out.
            self.ring.read_bulk(&mut self.chunk)?;
            self.framecount += 1;
        }
        let sample = self.chunk[self.chunk_pos];
        self.pins.write(Pin::Data, Level::from_sample(sample));
        self.chunk_pos = (self.chunk_pos + 1) % SAMPLES_PER_FRAME;
        Ok(())
    }
}
