//! LTC frame encoding, delegated to libltc through `x42ltc-sys`.
//!
//! The generator only needs a narrow slice of the library: seed a timecode,
//! encode one frame of samples, hand the samples over, flush, advance. That
//! contract is the [`FrameEncoder`] trait; [`LibltcEncoder`] is the libltc
//! implementation and the one used in production. A minimal decoder wrapper
//! exists so tests can run the waveform back into timecodes.

use std::os::raw::{c_char, c_int};

use x42ltc_sys as ffi;

use crate::error::{Error, Result};
use crate::timecode::SmpteTimecode;
use crate::{FPS, SAMPLE_RATE};

/// The encode-side contract the worker runs against.
pub trait FrameEncoder: Send {
    /// Seed the running timecode; the next encoded frame starts here.
    fn set_timecode(&mut self, tc: &SmpteTimecode) -> Result<()>;

    /// Encode one full frame into the internal buffer. The buffer must have
    /// been flushed since the previous frame.
    fn encode_frame(&mut self) -> Result<()>;

    /// The samples accumulated by the last `encode_frame` call.
    fn buffer(&self) -> &[u8];

    /// Reset the internal buffer's write pointer.
    fn flush(&mut self);

    /// Advance the running timecode by one frame, rolling time and date.
    fn inc_timecode(&mut self) -> Result<()>;
}

fn fill_smpte(tc: &SmpteTimecode) -> ffi::SMPTETimecode {
    let mut st: ffi::SMPTETimecode = unsafe { std::mem::zeroed() };
    for (slot, byte) in st.timezone.iter_mut().zip(tc.timezone_string().bytes()) {
        *slot = byte as c_char;
    }
    // The library's date fields are two-digit year and 1-based month.
    st.years = tc.year.rem_euclid(100) as u8;
    st.months = tc.month;
    st.days = tc.day;
    st.hours = tc.hours;
    st.mins = tc.minutes;
    st.secs = tc.seconds;
    st.frame = tc.frame;
    st
}

/// libltc encoder configured for the generator's fixed format:
/// 4000 samples/s, 25 fps, 625/50 TV standard, date bits in use.
pub struct LibltcEncoder {
    ptr: *mut ffi::LTCEncoder,
}

impl LibltcEncoder {
    pub fn new() -> Result<Self> {
        let ptr = unsafe {
            ffi::ltc_encoder_create(
                f64::from(SAMPLE_RATE),
                f64::from(FPS),
                ffi::LTC_TV_STANDARD_LTC_TV_625_50,
                ffi::LTC_BG_FLAGS_LTC_USE_DATE as c_int,
            )
        };
        if ptr.is_null() {
            return Err(Error::Encoder("allocation failed".into()));
        }
        Ok(LibltcEncoder { ptr })
    }
}

impl FrameEncoder for LibltcEncoder {
    fn set_timecode(&mut self, tc: &SmpteTimecode) -> Result<()> {
        let mut st = fill_smpte(tc);
        unsafe {
            ffi::ltc_encoder_set_timecode(self.ptr, &mut st);
        }
        Ok(())
    }

    fn encode_frame(&mut self) -> Result<()> {
        unsafe {
            ffi::ltc_encoder_encode_frame(self.ptr);
        }
        Ok(())
    }

    fn buffer(&self) -> &[u8] {
        let mut len: c_int = 0;
        let buf = unsafe { ffi::ltc_encoder_get_bufptr(self.ptr, &mut len, 0) };
        unsafe { std::slice::from_raw_parts(buf, len as usize) }
    }

    fn flush(&mut self) {
        unsafe {
            ffi::ltc_encoder_buffer_flush(self.ptr);
        }
    }

    fn inc_timecode(&mut self) -> Result<()> {
        unsafe {
            ffi::ltc_encoder_inc_timecode(self.ptr);
        }
        Ok(())
    }
}

impl Drop for LibltcEncoder {
    fn drop(&mut self) {
        unsafe {
            ffi::ltc_encoder_free(self.ptr);
        }
    }
}

// The encoder is moved into the worker thread and only ever used there.
unsafe impl Send for LibltcEncoder {}

/// libltc decoder, enough to run generated audio back into timecodes.
pub struct LibltcDecoder {
    ptr: *mut ffi::LTCDecoder,
    position: i64,
}

impl LibltcDecoder {
    pub fn new(samples_per_frame: usize, queue_size: usize) -> Result<Self> {
        let ptr =
            unsafe { ffi::ltc_decoder_create(samples_per_frame as c_int, queue_size as c_int) };
        if ptr.is_null() {
            return Err(Error::Encoder("decoder allocation failed".into()));
        }
        Ok(LibltcDecoder { ptr, position: 0 })
    }

    pub fn write(&mut self, samples: &[u8]) {
        unsafe {
            ffi::ltc_decoder_write(
                self.ptr,
                samples.as_ptr() as *mut ffi::ltcsnd_sample_t,
                samples.len(),
                self.position,
            );
        }
        self.position += samples.len() as i64;
    }

    /// Pop the next decoded frame from the queue, if one is ready.
    pub fn read(&mut self) -> Option<SmpteTimecode> {
        let mut ext: ffi::LTCFrameExt = unsafe { std::mem::zeroed() };
        let got = unsafe { ffi::ltc_decoder_read(self.ptr, &mut ext) };
        if got <= 0 {
            return None;
        }
        let mut st: ffi::SMPTETimecode = unsafe { std::mem::zeroed() };
        unsafe {
            ffi::ltc_frame_to_time(&mut st, &mut ext.ltc, ffi::LTC_BG_FLAGS_LTC_USE_DATE as c_int);
        }
        Some(SmpteTimecode {
            year: 2000 + i32::from(st.years),
            month: st.months,
            day: st.days,
            hours: st.hours,
            minutes: st.mins,
            seconds: st.secs,
            frame: st.frame,
            utc_offset_secs: parse_timezone(&st.timezone),
        })
    }
}

impl Drop for LibltcDecoder {
    fn drop(&mut self) {
        unsafe {
            ffi::ltc_decoder_free(self.ptr);
        }
    }
}

unsafe impl Send for LibltcDecoder {}

fn parse_timezone(raw: &[c_char; 6]) -> i32 {
    let bytes: Vec<u8> = raw.iter().take(5).map(|&c| c as u8).collect();
    let text = match std::str::from_utf8(&bytes) {
        Ok(t) => t,
        Err(_) => return 0,
    };
    if text.len() != 5 {
        return 0;
    }
    let sign = match &text[..1] {
        "+" => 1,
        "-" => -1,
        _ => return 0,
    };
    let hours: i32 = text[1..3].parse().unwrap_or(0);
    let minutes: i32 = text[3..5].parse().unwrap_or(0);
    sign * (hours * 3600 + minutes * 60)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_frame_is_exactly_160_samples() {
        let mut enc = LibltcEncoder::new().unwrap();
        let tc = SmpteTimecode::new(2024, 3, 1, 12, 34, 56, 0, 3600).unwrap();
        enc.set_timecode(&tc).unwrap();
        enc.encode_frame().unwrap();
        assert_eq!(enc.buffer().len(), crate::SAMPLES_PER_FRAME);
        enc.flush();
        assert_eq!(enc.buffer().len(), 0);
    }

    #[test]
    fn waveform_round_trips_through_the_decoder() {
        let mut enc = LibltcEncoder::new().unwrap();
        let start = SmpteTimecode::new(2024, 3, 1, 12, 34, 56, 0, 0).unwrap();
        enc.set_timecode(&start).unwrap();

        let mut dec = LibltcDecoder::new(crate::SAMPLES_PER_FRAME, 32).unwrap();
        let frames = 50u8;
        for _ in 0..frames {
            enc.encode_frame().unwrap();
            dec.write(enc.buffer());
            enc.flush();
            enc.inc_timecode().unwrap();
        }

        let mut decoded = Vec::new();
        while let Some(tc) = dec.read() {
            decoded.push(tc);
        }
        // The decoder needs a little signal to lock; it must still recover
        // most of the stream, contiguously, starting near frame zero.
        assert!(decoded.len() >= 45, "only {} frames decoded", decoded.len());
        let first = decoded[0];
        assert_eq!(
            (first.hours, first.minutes, first.seconds),
            (12, 34, 56),
            "decoder locked onto the wrong second"
        );
        assert!(first.frame <= 2, "first decoded frame was {}", first.frame);
        for (i, tc) in decoded.iter().enumerate() {
            // 25 fps: frames roll into the next second at 24.
            let total = first.frame as usize + i;
            assert_eq!(tc.frame as usize, total % 25, "frame sequence broke at {i}");
            assert_eq!(tc.seconds as usize, 56 + total / 25, "seconds broke at {i}");
            assert_eq!((tc.year, tc.month, tc.day), (2024, 3, 1));
        }
    }

    #[test]
    fn samples_sit_on_either_side_of_the_pin_threshold() {
        use crate::gpio::HIGH_THRESHOLD;

        let mut enc = LibltcEncoder::new().unwrap();
        let tc = SmpteTimecode::new(2024, 3, 1, 0, 0, 0, 0, 0).unwrap();
        enc.set_timecode(&tc).unwrap();
        enc.encode_frame().unwrap();
        let buf = enc.buffer();
        let lows = buf.iter().filter(|&&s| s < HIGH_THRESHOLD).count();
        let highs = buf.len() - lows;
        // A biphase-mark frame spends meaningful time at both levels.
        assert!(lows > 20, "{lows} low samples");
        assert!(highs > 20, "{highs} high samples");
    }
}
