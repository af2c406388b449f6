//! Signal forwarding for the spawn-and-wait launch strategy
//!
//! With `exec` the target owns its signals. When the entrypoint instead
//! waits on a child, SIGINT, SIGTERM and SIGHUP delivered to the
//! entrypoint (for example `docker stop` signalling PID 1) are passed on
//! to the child so it can shut down; its exit status is then reported.

use std::sync::atomic::{AtomicI32, Ordering};

// 0 means no child is running
static CHILD_PID: AtomicI32 = AtomicI32::new(0);

/// Install the forwarding handlers (once per process)
#[cfg(unix)]
pub fn setup_signal_forwarding() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| unsafe {
        libc::signal(libc::SIGINT, forward_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, forward_signal as libc::sighandler_t);
        libc::signal(libc::SIGHUP, forward_signal as libc::sighandler_t);
    });
}

#[cfg(not(unix))]
pub fn setup_signal_forwarding() {
    // Signal forwarding not supported on non-Unix platforms
}

#[cfg(unix)]
extern "C" fn forward_signal(sig: libc::c_int) {
    let pid = CHILD_PID.load(Ordering::SeqCst);
    if pid > 0 {
        // kill is async-signal-safe
        unsafe {
            libc::kill(pid, sig);
        }
    } else {
        // No child to hand it to: die as the signal would have made us
        unsafe { libc::_exit(128 + sig) }
    }
}

/// Record the child that receives forwarded signals
pub fn forward_signals_to(pid: u32) {
    CHILD_PID.store(i32::try_from(pid).unwrap_or(0), Ordering::SeqCst);
}

/// Stop forwarding (call once the child has been reaped)
pub fn clear_child() {
    CHILD_PID.store(0, Ordering::SeqCst);
}
