//! SMPTE timecode values.
//!
//! One `SmpteTimecode` describes a single LTC frame's user-visible time:
//! calendar date, time of day, frame within the second, and the local zone's
//! UTC offset. Seeds are derived from wall-clock second boundaries observed
//! by the timing loop; advancing frame-by-frame is the LTC library's job.

use chrono::{DateTime, Datelike, Local, NaiveDate, Offset, TimeZone, Timelike};

use crate::error::{Error, Result};
use crate::FPS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmpteTimecode {
    pub year: i32,
    /// Calendar month, 1..=12.
    pub month: u8,
    pub day: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    /// Frame within the current second, `0..FPS`.
    pub frame: u8,
    /// Local zone offset from UTC in seconds, e.g. +3600 for CET.
    pub utc_offset_secs: i32,
}

impl SmpteTimecode {
    /// Validating constructor: the calendar fields must form a real civil
    /// date and every time field must be in range.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        year: i32,
        month: u8,
        day: u8,
        hours: u8,
        minutes: u8,
        seconds: u8,
        frame: u8,
        utc_offset_secs: i32,
    ) -> Result<Self> {
        if NaiveDate::from_ymd_opt(year, month as u32, day as u32).is_none() {
            return Err(Error::Timecode(format!(
                "{year:04}-{month:02}-{day:02} is not a valid date"
            )));
        }
        if hours > 23 || minutes > 59 || seconds > 59 {
            return Err(Error::Timecode(format!(
                "{hours:02}:{minutes:02}:{seconds:02} out of range"
            )));
        }
        if u32::from(frame) >= FPS {
            return Err(Error::Timecode(format!("frame {frame} >= {FPS} fps")));
        }
        Ok(SmpteTimecode {
            year,
            month,
            day,
            hours,
            minutes,
            seconds,
            frame,
            utc_offset_secs,
        })
    }

    /// Seed for the frame starting exactly at the given Unix second,
    /// decomposed in the system's local time zone. Frame is 0 by definition
    /// of a second boundary.
    pub fn from_wall_second(sec: i64) -> Result<Self> {
        let utc = DateTime::from_timestamp(sec, 0)
            .ok_or_else(|| Error::Timecode(format!("second {sec} out of range")))?;
        Ok(Self::from_datetime(&utc.with_timezone(&Local)))
    }

    /// Decompose an already-zoned instant. Used directly by tests with fixed
    /// offsets; production goes through [`from_wall_second`].
    ///
    /// [`from_wall_second`]: SmpteTimecode::from_wall_second
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        SmpteTimecode {
            year: dt.year(),
            month: dt.month() as u8,
            day: dt.day() as u8,
            hours: dt.hour() as u8,
            minutes: dt.minute() as u8,
            seconds: dt.second() as u8,
            frame: 0,
            utc_offset_secs: dt.offset().fix().local_minus_utc(),
        }
    }

    /// Zone suffix in the `+HHMM` form carried inside an LTC date frame.
    pub fn timezone_string(&self) -> String {
        let sign = if self.utc_offset_secs < 0 { '-' } else { '+' };
        let abs = self.utc_offset_secs.unsigned_abs();
        format!("{}{:02}{:02}", sign, abs / 3600, (abs % 3600) / 60)
    }
}

impl std::fmt::Display for SmpteTimecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frame
        )
    }
}
