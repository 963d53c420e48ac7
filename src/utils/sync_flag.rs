use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Once,
    },
    thread,
    time::{Duration, Instant},
};
use tracing::warn;

type Inner = Arc<AtomicBool>;

const PAUSE_SLICE: Duration = Duration::from_millis(50);

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

extern "C" fn on_sigint(_: nix::libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Routes SIGINT into a process-wide flag instead of killing the process,
/// so polling loops get a chance to release their devices.
pub fn install_interrupt_handler() {
    INSTALL.call_once(|| {
        let action = SigAction::new(
            SigHandler::Handler(on_sigint),
            SaFlags::empty(),
            SigSet::empty(),
        );
        if let Err(e) = unsafe { signal::sigaction(Signal::SIGINT, &action) } {
            warn!("could not install SIGINT handler: {}", e);
        }
    });
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Sleeps for `duration` in short slices. False if Ctrl-C arrived meanwhile.
pub fn pause(duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if interrupted() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(PAUSE_SLICE));
    }
}

pub struct SyncFlagVictim {
    inner: Inner,
}
pub struct SyncFlagAssassin {
    inner: Inner,
}

pub fn new_sync_flag() -> (SyncFlagVictim, SyncFlagAssassin) {
    let inner = Arc::new(AtomicBool::new(true));
    (
        SyncFlagVictim {
            inner: Arc::clone(&inner),
        },
        SyncFlagAssassin { inner },
    )
}

impl Clone for SyncFlagAssassin {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SyncFlagVictim {
    /// False once the assassin fired or Ctrl-C was pressed.
    pub fn is_alive(&self) -> bool {
        self.inner.load(Ordering::Relaxed) && !interrupted()
    }
}

impl SyncFlagAssassin {
    pub fn kill_victim(self) {
        self.inner.store(false, Ordering::Relaxed);
    }
}

impl Drop for SyncFlagAssassin {
    fn drop(&mut self) {
        self.inner.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victim_dies_with_assassin() {
        let (victim, assassin) = new_sync_flag();
        let spare = assassin.clone();
        assert!(victim.is_alive());
        assassin.kill_victim();
        assert!(!victim.is_alive());
        drop(spare);
        assert!(!victim.is_alive());
    }

    #[test]
    fn dropping_assassin_kills() {
        let (victim, assassin) = new_sync_flag();
        drop(assassin);
        assert!(!victim.is_alive());
    }
}
