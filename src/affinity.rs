//! Optional CPU pinning for quieter numbers.
//!
//! Core migration mid-run perturbs bandwidth and latency figures alike.
//! Pinning is measurement hygiene, never a requirement: the caller logs a
//! failed pin and measures unpinned.

use std::io;

/// Pin the calling thread to `core`.
///
/// # Errors
/// - `InvalidInput` if `core` does not fit the affinity mask.
/// - The OS error if the core is outside the allowed set (cgroups, taskset)
///   or permission is denied.
#[cfg(target_os = "linux")]
pub fn pin_current_thread_to_core(core: usize) -> io::Result<()> {
    let set_bytes = std::mem::size_of::<libc::cpu_set_t>();
    if core >= set_bytes * 8 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("core index {core} does not fit a {set_bytes}-byte affinity mask"),
        ));
    }

    // SAFETY: a zeroed cpu_set_t is a valid empty set, and the bound above
    // keeps CPU_SET inside it. pthread_setaffinity_np returns its error code
    // directly rather than through errno.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);

        match libc::pthread_setaffinity_np(libc::pthread_self(), set_bytes, &set as *const _) {
            0 => Ok(()),
            rc => Err(io::Error::from_raw_os_error(rc)),
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread_to_core(_core: usize) -> io::Result<()> {
    // Don't silently succeed; that would mislabel the numbers as pinned.
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "CPU affinity is not supported on this platform",
    ))
}
