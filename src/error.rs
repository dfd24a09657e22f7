//! Error type shared across the generator.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The encoder tried to write past the ring's capacity. The producer is
    /// required to have waited for room, so this is a flow-control violation.
    #[error("ring overflow: write of {requested} bytes with {used}/{capacity} in use")]
    RingOverflow {
        requested: usize,
        used: usize,
        capacity: usize,
    },

    /// The output stage found fewer bytes than one frame at a chunk boundary.
    /// The realtime contract is broken; continuing would emit garbage.
    #[error("ring underflow: need {requested} bytes, only {available} buffered")]
    RingUnderflow { requested: usize, available: usize },

    /// The LTC library failed (allocation, reinit, unexpected frame size).
    #[error("LTC encoder: {0}")]
    Encoder(String),

    /// A timecode field was out of range or the instant had no local-time
    /// representation.
    #[error("invalid timecode: {0}")]
    Timecode(String),

    /// CPU pinning or scheduler setup failed.
    #[error("scheduling: {0}")]
    Sched(String),

    /// Socket setup or other I/O failed at startup.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Steady state was never reached (e.g. the encoder never fed the ring).
    #[error("startup: {0}")]
    Startup(String),

    /// A worker thread died by panic rather than by returning an error.
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}
