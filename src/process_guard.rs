//! Child process lifecycle for provisioning steps
//!
//! Steps run in their own process group so that a signal aimed at the runner
//! can be relayed to the whole tree under a package manager (apt-get spawns
//! dpkg, dpkg spawns maintainer scripts). Because the child is not in the
//! terminal's foreground group, Ctrl+C only reaches the runner; the signal
//! thread installed by `init_signal_handlers` forwards it.
//!
//! - Every spawned step is tracked in a global registry until it exits
//! - SIGINT/SIGTERM/SIGHUP: raise the interrupt flag, SIGTERM the tracked
//!   groups, grace period, SIGKILL
//! - The run loop checks the flag before and after each step and returns
//!   `Interrupted`, so `main` owns the exit status
//! - If the runner itself dies, the kernel sends the child SIGTERM

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

static REGISTRY: OnceLock<Mutex<ChildRegistry>> = OnceLock::new();
static INTERRUPT: OnceLock<InterruptFlag> = OnceLock::new();

/// Grace period between SIGTERM and SIGKILL when the operator interrupts a run
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(3);

/// How long the signal thread waits for the run loop to exit on its own
/// after stopping a step
const EXIT_FALLBACK: Duration = Duration::from_secs(2);

/// The first interrupting signal, shared by the signal thread and the runner
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicI32>);

impl InterruptFlag {
    /// The flag raised by `init_signal_handlers`
    pub fn global() -> Self {
        INTERRUPT.get_or_init(InterruptFlag::default).clone()
    }

    /// Record `signal`. Later signals do not replace the first one.
    pub fn raise(&self, signal: i32) {
        let _ = self
            .0
            .compare_exchange(0, signal, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn signal(&self) -> Option<i32> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            sig => Some(sig),
        }
    }
}

/// Running step processes, keyed by PID (which is also their PGID)
#[derive(Debug, Default)]
pub struct ChildRegistry {
    children: HashMap<u32, String>,
    shutting_down: bool,
}

impl ChildRegistry {
    /// Lock the process-wide registry.
    ///
    /// A poisoned lock still holds a usable map, so it is recovered rather
    /// than propagated: cleanup must work even after a panic elsewhere.
    pub fn global() -> MutexGuard<'static, ChildRegistry> {
        REGISTRY
            .get_or_init(|| Mutex::new(ChildRegistry::default()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn track(&mut self, pid: u32, label: impl Into<String>) {
        let label = label.into();
        tracing::debug!(pid, %label, "tracking child process");
        self.children.insert(pid, label);
    }

    pub fn release(&mut self, pid: u32) {
        if let Some(label) = self.children.remove(&pid) {
            tracing::debug!(pid, %label, "child process released");
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// SIGTERM every tracked process group, wait up to `grace`, then SIGKILL
    /// whatever is left. Only the first call does anything.
    ///
    /// Returns how many process groups were signalled.
    pub fn terminate_all(&mut self, grace: Duration) -> usize {
        if self.shutting_down {
            return 0;
        }
        self.shutting_down = true;

        if self.children.is_empty() {
            return 0;
        }

        let targets: Vec<(u32, String)> = self.children.drain().collect();
        for (pid, label) in &targets {
            tracing::warn!(pid, %label, "terminating step");
            signal_tree(*pid, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if targets.iter().all(|(pid, _)| !is_running(*pid)) {
                return targets.len();
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        for (pid, label) in targets.iter().filter(|(pid, _)| is_running(*pid)) {
            tracing::error!(pid, %label, "step ignored SIGTERM, sending SIGKILL");
            signal_tree(*pid, Signal::SIGKILL);
        }
        targets.len()
    }
}

/// Signal the process group led by `pid`, falling back to the process alone
fn signal_tree(pid: u32, sig: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if signal::kill(Pid::from_raw(-raw), sig).is_err() {
        let _ = signal::kill(Pid::from_raw(raw), sig);
    }
}

/// A process counts as running unless it is gone or a zombie
fn is_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if signal::kill(Pid::from_raw(raw), None).is_err() {
        return false;
    }
    // Third field of /proc/<pid>/stat is the state letter
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_none_or(|state| !matches!(state, "Z" | "X")),
        Err(_) => true,
    }
}

/// Keeps a PID in the global registry for as long as it is alive
#[derive(Debug)]
pub struct TrackedChild {
    pid: u32,
}

impl TrackedChild {
    /// Track `pid`. A child spawned after shutdown began is sent SIGTERM
    /// right away, since `terminate_all` will not run again.
    pub fn new(pid: u32, label: impl Into<String>) -> Self {
        let mut registry = ChildRegistry::global();
        let label = label.into();
        if registry.is_shutting_down() {
            tracing::warn!(pid, %label, "step started during shutdown, terminating");
            signal_tree(pid, Signal::SIGTERM);
        }
        registry.track(pid, label);
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// SIGKILL the child's whole process group
    pub fn kill(&self) {
        signal_tree(self.pid, Signal::SIGKILL);
    }
}

impl Drop for TrackedChild {
    fn drop(&mut self) {
        ChildRegistry::global().release(self.pid);
    }
}

/// Install the signal thread that tears down running steps.
///
/// The thread raises `InterruptFlag::global()` before stopping anything, so
/// the runner reports `Interrupted` rather than a step failure and `main`
/// exits with `128 + signal`. If no step was running, or the run loop has
/// not exited within `EXIT_FALLBACK`, the thread exits with the same status.
pub fn init_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::Builder::new()
        .name("signal-relay".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                tracing::warn!(signal = sig, "interrupted, stopping current step");
                InterruptFlag::global().raise(sig);
                let stopped = ChildRegistry::global().terminate_all(INTERRUPT_GRACE);
                if stopped > 0 {
                    std::thread::sleep(EXIT_FALLBACK);
                }
                std::process::exit(128 + sig);
            }
        })?;

    Ok(())
}

/// Extension trait putting a command in its own process group
pub trait CommandProcessGroup {
    /// New process group (PGID = child PID) plus a parent-death signal
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;

        self.process_group(0);
        // SAFETY: prctl is async-signal-safe and touches no shared state
        unsafe {
            self.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
