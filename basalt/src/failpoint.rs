//! Failure injection for tests.
//!
//! The commit path consults these toggles right before each of its three
//! I/O steps, so a test can make any one of them fail and watch how the
//! buffer pool reports it. Faults are armed per thread and stay armed until
//! disarmed, which keeps parallel tests from tripping each other.

use std::cell::Cell;
use std::io;

/// The I/O steps of the flush protocol where a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSite {
    /// Writing a dirty page's record to the log.
    LogWrite,
    /// Forcing the log to disk.
    LogForce,
    /// Writing the page through to its heap file.
    PageWrite,
}

impl FaultSite {
    fn bit(self) -> u8 {
        match self {
            FaultSite::LogWrite => 1,
            FaultSite::LogForce => 1 << 1,
            FaultSite::PageWrite => 1 << 2,
        }
    }
}

thread_local! {
    static ARMED: Cell<u8> = const { Cell::new(0) };
}

pub fn arm(site: FaultSite) {
    ARMED.with(|armed| armed.set(armed.get() | site.bit()));
}

pub fn disarm_all() {
    ARMED.with(|armed| armed.set(0));
}

/// Fails with an injected I/O error when `site` is armed on this thread.
pub fn trip(site: FaultSite) -> io::Result<()> {
    let hit = ARMED.with(|armed| armed.get() & site.bit() != 0);
    if hit {
        Err(io::Error::other(format!("injected fault at {site:?}")))
    } else {
        Ok(())
    }
}
