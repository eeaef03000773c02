use std::time::Duration;

/// Sleeps on the monotonic clock where the platform offers it.
pub fn precise_sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    #[cfg(target_os = "linux")]
    linux_sleep(duration);
    #[cfg(not(target_os = "linux"))]
    std::thread::sleep(duration);
}

#[cfg(target_os = "linux")]
fn linux_sleep(duration: Duration) {
    use libc::{CLOCK_MONOTONIC, clock_nanosleep, timespec};

    let req = timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };

    // SAFETY: `req` is a valid timespec and the remainder pointer may be null.
    let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut()) };
    if rc != 0 {
        tracing::debug!(rc, "clock_nanosleep interrupted, falling back to thread::sleep");
        std::thread::sleep(duration);
    }
}
