//! Scheduling setup for the realtime threads.
//!
//! The timing loop's 125 µs jitter budget is only reachable with the thread
//! pinned to its own core and, ideally, scheduled SCHED_FIFO. Pinning is
//! mandatory where supported; the FIFO priority degrades to a warning when
//! the process lacks the privilege.

use log::warn;

use crate::error::{Error, Result};

/// Pin the calling thread to a single CPU.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(cpu: usize) -> Result<()> {
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe {
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
    }
    let rc = unsafe {
        libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set,
        )
    };
    if rc != 0 {
        return Err(Error::Sched(format!(
            "cannot pin thread to CPU {cpu}: {}",
            std::io::Error::from_raw_os_error(rc)
        )));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(cpu: usize) -> Result<()> {
    warn!("CPU pinning not supported on this platform; CPU {cpu} ignored");
    Ok(())
}

/// Raise the calling thread to the maximum SCHED_FIFO priority. Without the
/// privilege the thread stays at normal priority, which is survivable on an
/// otherwise idle core.
#[cfg(target_os = "linux")]
pub fn set_max_priority() -> Result<()> {
    let policy = libc::SCHED_FIFO;
    let max = unsafe { libc::sched_get_priority_max(policy) };
    if max < 0 {
        return Err(Error::Sched("sched_get_priority_max failed".into()));
    }
    let param = libc::sched_param {
        sched_priority: max,
    };
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), policy, &param) };
    if rc == libc::EPERM {
        warn!("SCHED_FIFO needs privileges; continuing at normal priority");
        return Ok(());
    }
    if rc != 0 {
        return Err(Error::Sched(format!(
            "pthread_setschedparam: {}",
            std::io::Error::from_raw_os_error(rc)
        )));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_max_priority() -> Result<()> {
    warn!("realtime priority not supported on this platform");
    Ok(())
}
