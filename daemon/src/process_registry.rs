use std::path::PathBuf;
use std::sync::Mutex;

use sysinfo::{Pid as SysPid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, info};

/// OS process identifier.
pub type Pid = u32;

/// A process matched by name, with the details needed to discover the
/// remote client's credentials and install location.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessDetails {
    pub pid: Pid,
    pub exe: Option<PathBuf>,
    pub cmd: Vec<String>,
}

/// Queries against the OS process table.
///
/// Liveness and foreground checks never fail: a process that vanished
/// between enumeration and the query is simply reported as `false`.
pub trait ProcessRegistry: Send + Sync {
    /// PIDs of every process whose executable name matches `name`
    /// (case-insensitive). May be empty.
    fn list_pids_by_name(&self, name: &str) -> Vec<Pid>;

    /// Whether `pid` owns the window that currently has input focus.
    fn is_foreground(&self, pid: Pid) -> bool;

    fn is_running(&self, pid: Pid) -> bool;

    /// Sends a kill signal. Returns whether the signal was delivered; the
    /// process may still be alive when this returns.
    fn terminate(&self, pid: Pid) -> bool;

    /// Kills every foreground instance of `name` and returns the PIDs that
    /// were signalled. Background instances are left alone.
    fn terminate_foreground_instances(&self, name: &str) -> Vec<Pid> {
        let mut terminated = Vec::new();
        for pid in self.list_pids_by_name(name) {
            info!(pid, "found {name}");
            if !self.is_foreground(pid) {
                info!(pid, "process is not in the foreground, leaving it running");
                continue;
            }
            info!(pid, "terminating {name}");
            if self.terminate(pid) {
                terminated.push(pid);
            } else {
                debug!(pid, "kill signal was not delivered");
            }
        }
        terminated
    }
}

/// [`ProcessRegistry`] backed by `sysinfo`.
///
/// The `System` is kept between calls so sysinfo can reuse its buffers;
/// every query refreshes only what it reads.
pub struct SystemProcessRegistry {
    sys: Mutex<System>,
}

impl SystemProcessRegistry {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }

    /// Like [`ProcessRegistry::list_pids_by_name`] but also reads each
    /// match's executable path and command line.
    pub fn find_by_name(&self, name: &str) -> Vec<ProcessDetails> {
        let mut sys = self.lock();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );

        let mut found: Vec<ProcessDetails> = sys
            .processes()
            .values()
            .filter(|p| name_matches(&p.name().to_string_lossy(), name))
            .map(|p| ProcessDetails {
                pid: p.pid().as_u32(),
                exe: p.exe().map(|e| e.to_path_buf()),
                cmd: p
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect(),
            })
            .collect();
        found.sort_by_key(|d| d.pid);
        found
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, System> {
        // A poisoned lock only means another query panicked mid-refresh; the
        // next refresh overwrites whatever it left behind.
        self.sys.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SystemProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry for SystemProcessRegistry {
    fn list_pids_by_name(&self, name: &str) -> Vec<Pid> {
        let mut sys = self.lock();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());

        let mut pids: Vec<Pid> = sys
            .processes()
            .values()
            .filter(|p| name_matches(&p.name().to_string_lossy(), name))
            .map(|p| p.pid().as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }

    fn is_foreground(&self, pid: Pid) -> bool {
        foreground_pid() == Some(pid)
    }

    fn is_running(&self, pid: Pid) -> bool {
        let target = SysPid::from_u32(pid);
        let mut sys = self.lock();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::new(),
        );
        sys.process(target).is_some()
    }

    fn terminate(&self, pid: Pid) -> bool {
        let target = SysPid::from_u32(pid);
        let mut sys = self.lock();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::new(),
        );
        sys.process(target).map(|p| p.kill()).unwrap_or(false)
    }
}

fn name_matches(process_name: &str, wanted: &str) -> bool {
    process_name.eq_ignore_ascii_case(wanted)
}

/// PID owning the focused top-level window.
#[cfg(windows)]
fn foreground_pid() -> Option<Pid> {
    use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId};

    let mut pid: u32 = 0;
    unsafe {
        let hwnd = GetForegroundWindow();
        GetWindowThreadProcessId(hwnd, Some(&mut pid as *mut u32));
    }
    // No focused window (or a window we may not query) yields 0.
    (pid != 0).then_some(pid)
}

/// Window focus is a desktop-session concept only tracked on Windows.
#[cfg(not(windows))]
fn foreground_pid() -> Option<Pid> {
    None
}
