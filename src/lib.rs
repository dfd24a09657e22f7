//! LTC waveform generator, phase-locked to the system realtime clock.
//!
//! Three long-lived parts make up the pipeline:
//! - an encoder worker that turns a running SMPTE timecode into two-level
//!   audio samples (one LTC frame = 160 samples at 4 kHz / 25 fps),
//! - a mutex-guarded ring buffer between the encoder and the output stage,
//! - a timing loop that busy-polls `CLOCK_REALTIME` and drives one sample
//!   onto the DATA pin every 250 µs, resynchronizing at second boundaries.
//!
//! Data flows encoder -> ring -> timing loop -> GPIO. The timing loop paces
//! the encoder indirectly through ring occupancy, and hands it fresh seed
//! timecodes at aligned second boundaries. A per-second UDP broadcast
//! announces the current wall-clock time to downstream receivers.

pub mod announce;
pub mod clock;
pub mod config;
pub mod encoder;
pub mod error;
pub mod generator;
pub mod gpio;
pub mod ltc;
pub mod ring;
pub mod rt;
pub mod timecode;
pub mod timing;

pub use config::GeneratorConfig;
pub use error::{Error, Result};
pub use generator::Generator;

/// Audio sample rate of the LTC waveform in Hz.
pub const SAMPLE_RATE: u32 = 4_000;

/// Video frame rate. Fixed; the 625/50 TV standard is implied.
pub const FPS: u32 = 25;

/// Samples per LTC frame: 80 bits x 2 samples per bit.
pub const SAMPLES_PER_FRAME: usize = (SAMPLE_RATE / FPS) as usize;

/// Edge ticks per wall-clock second; the stability criterion.
pub const EDGES_PER_SECOND: u32 = SAMPLE_RATE;

/// Capacity of the sample ring shared by encoder and timing loop.
pub const RING_CAPACITY: usize = 1_280;

/// Ring occupancy at which the encoder backs off (four frames queued).
pub const BACKPRESSURE_BYTES: usize = 4 * SAMPLES_PER_FRAME;

/// Width of one timing-loop tick bucket in nanoseconds.
pub const TICK_NS: u32 = 2_000;

/// Tick buckets per second (`0 <= u < TICKS_PER_SECOND`).
pub const TICKS_PER_SECOND: u32 = 1_000_000_000 / TICK_NS;

/// Tick buckets between output edges: 250 µs in 2 µs units.
pub const EDGE_TICKS: u32 = TICKS_PER_SECOND / EDGES_PER_SECOND;
