//! Logical output pins.
//!
//! The generator drives five pins; each has exactly one writer (DATA from the
//! output path, ENCODER_ACTIVE from the worker, the rest from the timing
//! loop), but the bank itself is shared between threads. Backends: `rppal`
//! on a Raspberry Pi (feature `rpi`), a discarding bank for host runs, and a
//! recording bank for tests.

use std::fmt;

use parking_lot::Mutex;

/// Sample values below this drive the pin low. The encoder's analog levels
/// sit well on either side of the split.
pub const HIGH_THRESHOLD: u8 = 0xA0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_sample(sample: u8) -> Self {
        if sample < HIGH_THRESHOLD {
            Level::Low
        } else {
            Level::High
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    /// The LTC waveform itself, toggled at 4 kHz.
    Data,
    /// High while every boundary check of the current second passed.
    Stable,
    /// High while the encoder worker is writing a frame.
    EncoderActive,
    /// Toggles once per second once stable.
    Heartbeat,
    /// Toggles on every edge tick; a 2 kHz square wave when healthy.
    SafetyClock,
}

impl Pin {
    pub const ALL: [Pin; 5] = [
        Pin::Data,
        Pin::Stable,
        Pin::EncoderActive,
        Pin::Heartbeat,
        Pin::SafetyClock,
    ];
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pin::Data => "DATA",
            Pin::Stable => "STABLE",
            Pin::EncoderActive => "ENCODER_ACTIVE",
            Pin::Heartbeat => "HEARTBEAT",
            Pin::SafetyClock => "SAFETY_CLOCK",
        };
        f.write_str(name)
    }
}

/// A bank of output pins. Writes must be cheap and non-blocking: the DATA
/// writer runs on the 250 µs edge path.
pub trait GpioBank: Send + Sync {
    fn write(&self, pin: Pin, level: Level);

    /// Drive every pin low (startup and shutdown state).
    fn all_low(&self) {
        for pin in Pin::ALL {
            self.write(pin, Level::Low);
        }
    }
}

/// Discards writes; lets the generator run on machines without GPIO.
#[derive(Debug, Default)]
pub struct NullPins;

impl GpioBank for NullPins {
    fn write(&self, _pin: Pin, _level: Level) {}
}

/// Records every write in order; the assertion surface for scenario tests.
#[derive(Debug, Default)]
pub struct MemoryPins {
    events: Mutex<Vec<(Pin, Level)>>,
}

impl MemoryPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes to one pin, in write order.
    pub fn writes_to(&self, pin: Pin) -> Vec<Level> {
        self.events
            .lock()
            .iter()
            .filter(|(p, _)| *p == pin)
            .map(|(_, l)| *l)
            .collect()
    }

    /// Most recent level written to a pin, if any.
    pub fn last(&self, pin: Pin) -> Option<Level> {
        self.events
            .lock()
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|(_, l)| *l)
    }

    pub fn write_count(&self, pin: Pin) -> usize {
        self.events.lock().iter().filter(|(p, _)| *p == pin).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl GpioBank for MemoryPins {
    fn write(&self, pin: Pin, level: Level) {
        self.events.lock().push((pin, level));
    }
}

/// Raspberry Pi GPIO via rppal, addressed by BCM pin number.
#[cfg(feature = "rpi")]
pub struct RpiPins {
    data: Mutex<rppal::gpio::OutputPin>,
    stable: Mutex<rppal::gpio::OutputPin>,
    encoder_active: Mutex<rppal::gpio::OutputPin>,
    heartbeat: Mutex<rppal::gpio::OutputPin>,
    safety_clock: Mutex<rppal::gpio::OutputPin>,
}

#[cfg(feature = "rpi")]
impl RpiPins {
    pub fn new(map: &crate::config::PinMap) -> crate::error::Result<Self> {
        let gpio = rppal::gpio::Gpio::new()
            .map_err(|e| crate::error::Error::Startup(format!("GPIO init: {e}")))?;
        let mut claim = |bcm: u8| -> crate::error::Result<Mutex<rppal::gpio::OutputPin>> {
            let pin = gpio
                .get(bcm)
                .map_err(|e| crate::error::Error::Startup(format!("GPIO {bcm}: {e}")))?;
            Ok(Mutex::new(pin.into_output_low()))
        };
        Ok(RpiPins {
            data: claim(map.data)?,
            stable: claim(map.stable)?,
            encoder_active: claim(map.encoder_active)?,
            heartbeat: claim(map.heartbeat)?,
            safety_clock: claim(map.safety_clock)?,
        })
    }

    fn slot(&self, pin: Pin) -> &Mutex<rppal::gpio::OutputPin> {
        match pin {
            Pin::Data => &self.data,
            Pin::Stable => &self.stable,
            Pin::EncoderActive => &self.encoder_active,
            Pin::Heartbeat => &self.heartbeat,
            Pin::SafetyClock => &self.safety_clock,
        }
    }
}

#[cfg(feature = "rpi")]
impl GpioBank for RpiPins {
    fn write(&self, pin: Pin, level: Level) {
        let mut out = self.slot(pin).lock();
        match level {
            Level::Low => out.set_low(),
            Level::High => out.set_high(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_threshold_splits_levels() {
        assert_eq!(Level::from_sample(0x00), Level::Low);
        assert_eq!(Level::from_sample(0x53), Level::Low);
        assert_eq!(Level::from_sample(0x9F), Level::Low);
        assert_eq!(Level::from_sample(0xA0), Level::High);
        assert_eq!(Level::from_sample(0xAD), Level::High);
        assert_eq!(Level::from_sample(0xFF), Level::High);
    }

    #[test]
    fn memory_pins_record_in_order() {
        let pins = MemoryPins::new();
        pins.write(Pin::Data, Level::High);
        pins.write(Pin::Stable, Level::High);
        pins.write(Pin::Data, Level::Low);
        assert_eq!(pins.writes_to(Pin::Data), vec![Level::High, Level::Low]);
        assert_eq!(pins.last(Pin::Data), Some(Level::Low));
        assert_eq!(pins.last(Pin::Heartbeat), None);
        assert_eq!(pins.write_count(Pin::Stable), 1);
    }

    #[test]
    fn all_low_touches_every_pin() {
        let pins = MemoryPins::new();
        pins.all_low();
        for pin in Pin::ALL {
            assert_eq!(pins.last(pin), Some(Level::Low));
        }
    }
}
