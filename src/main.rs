//! ltcwave: SMPTE LTC on a GPIO pin, phase-locked to the system clock.

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use ltcwave::announce::UdpAnnouncer;
use ltcwave::clock::SystemClock;
use ltcwave::config::{GeneratorConfig, PinMap};
use ltcwave::error::{Error, Result};
use ltcwave::gpio::GpioBank;
use ltcwave::ltc::LibltcEncoder;
use ltcwave::Generator;

#[derive(Parser, Debug)]
#[command(name = "ltcwave", version)]
#[command(about = "Generate 25 fps SMPTE LTC on GPIO, locked to the NTP-disciplined clock")]
struct Args {
    /// Destination address of the per-second TIMESYNC datagram
    #[arg(long, default_value = "192.168.4.255")]
    broadcast_addr: Ipv4Addr,

    /// Destination UDP port of the TIMESYNC datagram
    #[arg(long, default_value_t = 5000)]
    broadcast_port: u16,

    /// CPU the encoder worker is pinned to
    #[arg(long, default_value_t = 2)]
    encoder_cpu: usize,

    /// CPU the timing loop is pinned to
    #[arg(long, default_value_t = 3)]
    timer_cpu: usize,

    /// Skip CPU pinning and the realtime priority raise
    #[arg(long)]
    no_rt: bool,

    /// BCM pin carrying the LTC waveform
    #[arg(long, default_value_t = 17)]
    data_pin: u8,

    /// BCM pin for the clock-stable indicator
    #[arg(long, default_value_t = 18)]
    stable_pin: u8,

    /// BCM pin raised while the encoder writes a frame
    #[arg(long, default_value_t = 22)]
    encoder_pin: u8,

    /// BCM pin for the once-per-second heartbeat
    #[arg(long, default_value_t = 23)]
    heartbeat_pin: u8,

    /// BCM pin for the 2 kHz safety clock
    #[arg(long, default_value_t = 24)]
    safety_pin: u8,
}

impl Args {
    fn into_config(self) -> GeneratorConfig {
        GeneratorConfig {
            broadcast_addr: self.broadcast_addr,
            broadcast_port: self.broadcast_port,
            encoder_cpu: self.encoder_cpu,
            timer_cpu: self.timer_cpu,
            pin_cpus: !self.no_rt,
            pins: PinMap {
                data: self.data_pin,
                stable: self.stable_pin,
                encoder_active: self.encoder_pin,
                heartbeat: self.heartbeat_pin,
                safety_clock: self.safety_pin,
            },
        }
    }
}

#[cfg(feature = "rpi")]
fn build_pins(config: &GeneratorConfig) -> Result<Arc<dyn GpioBank>> {
    Ok(Arc::new(ltcwave::gpio::RpiPins::new(&config.pins)?))
}

#[cfg(not(feature = "rpi"))]
fn build_pins(_config: &GeneratorConfig) -> Result<Arc<dyn GpioBank>> {
    log::warn!("built without the rpi feature; GPIO writes are discarded");
    Ok(Arc::new(ltcwave::gpio::NullPins))
}

fn run(args: Args) -> Result<()> {
    let config = args.into_config();
    let pins = build_pins(&config)?;
    let announcer = UdpAnnouncer::new(config.broadcast_addr, config.broadcast_port)?;
    let encoder = LibltcEncoder::new()?;

    let generator = Generator::spawn(config, SystemClock, pins, encoder, announcer)?;
    let shutdown = generator.shutdown_handle();
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::Relaxed);
    })
    .map_err(|e| Error::Startup(format!("signal handler: {e}")))?;

    info!("generator up; ctrl-c to stop");
    generator.join()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}
