//! Startup configuration.

use std::net::Ipv4Addr;

/// BCM numbers for the five output pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    pub data: u8,
    pub stable: u8,
    pub encoder_active: u8,
    pub heartbeat: u8,
    pub safety_clock: u8,
}

impl Default for PinMap {
    fn default() -> Self {
        PinMap {
            data: 17,
            stable: 18,
            encoder_active: 22,
            heartbeat: 23,
            safety_clock: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Destination of the per-second announce datagram.
    pub broadcast_addr: Ipv4Addr,
    pub broadcast_port: u16,
    /// Core for the encoder worker.
    pub encoder_cpu: usize,
    /// Core for the timing loop.
    pub timer_cpu: usize,
    /// Skip CPU pinning and the SCHED_FIFO raise; useful off-target.
    pub pin_cpus: bool,
    pub pins: PinMap,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            broadcast_addr: Ipv4Addr::new(192, 168, 4, 255),
            broadcast_port: 5000,
            encoder_cpu: 2,
            timer_cpu: 3,
            pin_cpus: true,
            pins: PinMap::default(),
        }
    }
}
