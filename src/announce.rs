//! Per-second wall-clock announcement.
//!
//! At every second boundary the timing loop emits one UDP broadcast so that
//! receivers on the local network can align themselves with the generator:
//! `TIMESYNC:<nanoseconds-since-epoch>:<HH>.<MM>.<SS>.00` (ASCII, one line,
//! no newline, local-time fields). Send failures are the caller's to log;
//! they are never fatal.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use chrono::{DateTime, Local, Timelike};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::clock::WallTime;
use crate::error::Result;

/// Sink for per-second announcements.
pub trait Announce {
    /// Emit the datagram for the given second boundary.
    fn announce(&mut self, boundary: WallTime) -> io::Result<()>;
}

/// Render the wire payload for a second boundary. The timestamp field is the
/// boundary instant itself, i.e. a whole second in nanoseconds; the frame
/// field is fixed at zero by definition of a boundary.
pub fn payload(boundary: WallTime) -> String {
    let ns = boundary.sec * 1_000_000_000;
    let (hh, mm, ss) = match DateTime::from_timestamp(boundary.sec, 0) {
        Some(utc) => {
            let local = utc.with_timezone(&Local);
            (local.hour(), local.minute(), local.second())
        }
        // Unrepresentable seconds cannot come from a real clock reading.
        None => (0, 0, 0),
    };
    format!("TIMESYNC:{ns}:{hh:02}.{mm:02}.{ss:02}.00")
}

/// Parse a `TIMESYNC` payload back into its fields. Returns the epoch
/// nanoseconds and the HH/MM/SS components, or `None` for a foreign packet.
pub fn parse_payload(text: &str) -> Option<(i64, u8, u8, u8)> {
    let rest = text.strip_prefix("TIMESYNC:")?;
    let (ns, clock) = rest.split_once(':')?;
    let ns: i64 = ns.parse().ok()?;
    let mut parts = clock.split('.');
    let hh: u8 = parts.next()?.parse().ok()?;
    let mm: u8 = parts.next()?.parse().ok()?;
    let ss: u8 = parts.next()?.parse().ok()?;
    if parts.next()? != "00" || parts.next().is_some() {
        return None;
    }
    if hh > 23 || mm > 59 || ss > 59 {
        return None;
    }
    Some((ns, hh, mm, ss))
}

/// Broadcasts announcements over UDP.
pub struct UdpAnnouncer {
    socket: UdpSocket,
    dest: SocketAddrV4,
}

impl UdpAnnouncer {
    pub fn new(addr: Ipv4Addr, port: u16) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SockAddr::from(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            0,
        )))?;
        Ok(UdpAnnouncer {
            socket: socket.into(),
            dest: SocketAddrV4::new(addr, port),
        })
    }

    pub fn dest(&self) -> SocketAddrV4 {
        self.dest
    }
}

impl Announce for UdpAnnouncer {
    fn announce(&mut self, boundary: WallTime) -> io::Result<()> {
        let text = payload(boundary);
        self.socket.send_to(text.as_bytes(), self.dest)?;
        Ok(())
    }
}
